//! # fullconv - spatial full (transposed) convolution
//!
//! Forward pass, input gradient and parameter gradients of a 2D full
//! convolution over `[C, H, W]` or `[N, C, H, W]` feature maps, with a
//! `[Cin, Cout, kH, kW]` filter bank.
//!
//! - `fullconv-core`: tensors, shape resolution, convolution primitives and
//!   the free-function passes over caller-owned buffers
//! - `fullconv-neural`: the [`SpatialFullConvolution`](prelude::SpatialFullConvolution)
//!   layer that owns its parameters and gradient buffers
//!
//! ## Quick Start
//!
//! ```rust
//! use fullconv::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let mut layer = SpatialFullConvolution::<f32>::new(3, 8, (4, 4), (2, 2))?;
//! let input = Tensor::ones(&[2, 3, 5, 5]);
//!
//! let output = layer.update_output(&input)?.clone();
//! assert_eq!(output.shape().dims(), &[2, 8, 12, 12]);
//!
//! let grad_output = Tensor::ones(output.shape().dims());
//! layer.zero_grad_parameters();
//! let grad_input = layer.backward(&input, &grad_output, 1.0)?;
//! assert_eq!(grad_input.shape(), input.shape());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub use fullconv_core as core;
pub use fullconv_neural as neural;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::ops;
    pub use crate::core::{
        spatial_full_conv2d, spatial_full_conv2d_acc_grad_parameters,
        spatial_full_conv2d_grad_input, Result, Shape, Tensor, TensorError,
    };
    pub use crate::neural::{Layer, SpatialFullConvolution, SpatialFullConvolutionConfig};
}

/// The version of the fullconv crates
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert_eq!(version(), VERSION);
    }
}
