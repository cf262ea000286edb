//! Convolution layers

pub mod transpose;

pub use transpose::{SpatialFullConvolution, SpatialFullConvolutionConfig};
