//! Convolution operations
//!
//! - **layout**: rank-3/rank-4 shape resolution and the full-convolution size formula
//! - **conv2d**: planar convolution primitives with `beta`/`alpha` blending
//! - **transpose**: the spatial full convolution forward and backward passes

pub mod conv2d;
pub mod layout;
pub mod transpose;

pub use conv2d::{
    full_conv2d, full_conv2d_batched, valid_xcorr2d, valid_xcorr2d_batched, weight_grad_xcorr2d,
    weight_grad_xcorr2d_batched,
};
pub use layout::{check_stride, full_conv_extent, full_conv_plane, FilterBank, PlanarLayout};
pub use transpose::{
    accumulate_bias_grad, broadcast_bias, spatial_full_conv2d,
    spatial_full_conv2d_acc_grad_parameters, spatial_full_conv2d_grad_input,
};
