#![allow(clippy::result_large_err)]

//! Stateful layer objects over the `fullconv-core` passes.

pub mod layers;

pub use layers::{Layer, LayerType, SpatialFullConvolution, SpatialFullConvolutionConfig};
