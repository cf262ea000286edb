pub mod conv;

pub use conv::{SpatialFullConvolution, SpatialFullConvolutionConfig};

use fullconv_core::{Result, Tensor};

/// Layer kinds, used for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    ConvTranspose2D,
}

pub trait Layer<T> {
    fn forward(&self, input: &Tensor<T>) -> Result<Tensor<T>>;
    fn parameters(&self) -> Vec<&Tensor<T>>;
    fn parameters_mut(&mut self) -> Vec<&mut Tensor<T>>;
    fn set_training(&mut self, training: bool);
    fn clone_box(&self) -> Box<dyn Layer<T>>;

    fn layer_type(&self) -> LayerType;

    /// Replace the weight tensor, keeping its shape
    fn set_weight(&mut self, weight: Tensor<T>) -> Result<()>;

    /// Replace the bias tensor, keeping its shape
    fn set_bias(&mut self, bias: Option<Tensor<T>>) -> Result<()>;
}
