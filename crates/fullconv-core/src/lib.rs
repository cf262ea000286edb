#![allow(clippy::result_large_err)]

//! Tensor storage, shape resolution and the spatial full (transposed)
//! convolution passes.

pub mod error;
pub mod numerical_gradient;
pub mod ops;
pub mod shape;
pub mod tensor;
pub mod tensor_view;

pub use error::{Result, TensorError};
pub use numerical_gradient::{check_gradients, GradientCheckConfig, GradientCheckResult};
pub use ops::conv::{
    accumulate_bias_grad, broadcast_bias, spatial_full_conv2d,
    spatial_full_conv2d_acc_grad_parameters, spatial_full_conv2d_grad_input, FilterBank,
    PlanarLayout,
};
pub use shape::Shape;
pub use tensor::Tensor;
pub use tensor_view::TensorView;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports_round_trip() {
        let input = Tensor::<f32>::ones(&[1, 2, 2]);
        let layout = PlanarLayout::from_shape(input.shape(), "lib").unwrap();
        assert_eq!(layout.dims(), vec![1, 2, 2]);
        assert_eq!(Shape::from_slice(&[1, 2, 2]).to_string(), "[1, 2, 2]");
    }
}
