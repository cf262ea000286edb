//! Spatial Full Convolution Layer Implementation
//!
//! `SpatialFullConvolution` owns its parameters, gradient accumulators and
//! the cached output / input-gradient buffers, and drives the passes in
//! `fullconv_core::ops::conv::transpose` over them. It upsamples
//! `[.., Cin, H, W]` to `[.., Cout, (H-1)*dH+kH, (W-1)*dW+kW]`.

use crate::layers::{Layer, LayerType};
use fullconv_core::ops::conv::{check_stride, FilterBank};
use fullconv_core::{
    spatial_full_conv2d, spatial_full_conv2d_acc_grad_parameters, spatial_full_conv2d_grad_input,
    Result, Tensor, TensorError,
};
use num_traits::{Float, FromPrimitive};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Construction parameters for [`SpatialFullConvolution`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SpatialFullConvolutionConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    /// `(kH, kW)`
    pub kernel_size: (usize, usize),
    /// `(dH, dW)`
    pub stride: (usize, usize),
    /// Seed for the uniform weight init; `None` draws from the thread RNG
    #[cfg_attr(feature = "serialize", serde(default))]
    pub seed: Option<u64>,
}

impl Default for SpatialFullConvolutionConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            out_channels: 1,
            kernel_size: (3, 3),
            stride: (1, 1),
            seed: None,
        }
    }
}

impl SpatialFullConvolutionConfig {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: (usize, usize)) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            ..Self::default()
        }
    }

    /// 2x2 kernel with stride 2: exact 2x upsampling without overlap
    pub fn upsample_2x(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size: (2, 2),
            stride: (2, 2),
            seed: None,
        }
    }

    pub fn with_stride(mut self, stride: (usize, usize)) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_kernel_size(mut self, kernel_size: (usize, usize)) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let operation = "SpatialFullConvolutionConfig";
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(TensorError::invalid_argument_op(
                operation,
                &format!(
                    "channel counts must be positive, got in={} out={}",
                    self.in_channels, self.out_channels
                ),
            ));
        }
        if self.kernel_size.0 == 0 || self.kernel_size.1 == 0 {
            return Err(TensorError::invalid_argument_op(
                operation,
                &format!("kernel size must be positive, got {:?}", self.kernel_size),
            ));
        }
        check_stride(operation, self.stride)
    }
}

/// Spatial full (transposed) convolution layer.
///
/// Weight is `[Cin, Cout, kH, kW]`, bias is `[Cout]`. Inputs may be
/// unbatched `[Cin, H, W]` or batched `[N, Cin, H, W]`.
///
/// The filter geometry is fixed at construction. A weight swapped in
/// through [`Layer::parameters_mut`] with a different shape makes the passes
/// return `Err` until [`reset`](Self::reset) or a matching
/// [`set_weight`](Self::set_weight) restores it.
///
/// # Example
///
/// ```rust
/// use fullconv_core::Tensor;
/// use fullconv_neural::{SpatialFullConvolution, SpatialFullConvolutionConfig};
///
/// let config = SpatialFullConvolutionConfig::upsample_2x(3, 8).with_seed(0);
/// let mut layer = SpatialFullConvolution::<f32>::from_config(&config).unwrap();
///
/// let input = Tensor::ones(&[2, 3, 4, 4]);
/// let output = layer.update_output(&input).unwrap();
/// assert_eq!(output.shape().dims(), &[2, 8, 8, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct SpatialFullConvolution<T> {
    weight: Tensor<T>,
    bias: Tensor<T>,
    grad_weight: Tensor<T>,
    grad_bias: Tensor<T>,
    output: Tensor<T>,
    grad_input: Tensor<T>,
    filters: FilterBank,
    stride: (usize, usize),
    /// Recorded for callers only; both modes run the same passes
    training: bool,
}

impl<T> SpatialFullConvolution<T>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
{
    /// Create a layer with uniformly initialised parameters
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
    ) -> Result<Self> {
        Self::from_config(
            &SpatialFullConvolutionConfig::new(in_channels, out_channels, kernel_size)
                .with_stride(stride),
        )
    }

    pub fn from_config(config: &SpatialFullConvolutionConfig) -> Result<Self> {
        config.validate()?;
        let (kernel_height, kernel_width) = config.kernel_size;
        let filters = FilterBank {
            in_channels: config.in_channels,
            out_channels: config.out_channels,
            kernel_height,
            kernel_width,
        };

        let mut layer = Self::allocate(
            filters,
            Tensor::zeros(&filters.dims()),
            Tensor::zeros(&[config.out_channels]),
            config.stride,
        );
        match config.seed {
            Some(seed) => layer.reset_with_rng(&mut StdRng::seed_from_u64(seed), None)?,
            None => layer.reset(None)?,
        }
        Ok(layer)
    }

    /// Wrap existing parameters.
    ///
    /// The weight must be `[Cin, Cout, kH, kW]` and the bias `[Cout]`.
    pub fn with_parameters(
        weight: Tensor<T>,
        bias: Tensor<T>,
        stride: (usize, usize),
    ) -> Result<Self> {
        let operation = "SpatialFullConvolution::with_parameters";
        check_stride(operation, stride)?;
        let filters = FilterBank::from_shape(weight.shape(), operation)?;
        check_bias_shape(&bias, filters.out_channels, operation)?;
        Ok(Self::allocate(filters, weight, bias, stride))
    }

    fn allocate(
        filters: FilterBank,
        weight: Tensor<T>,
        bias: Tensor<T>,
        stride: (usize, usize),
    ) -> Self {
        let grad_weight = Tensor::zeros(weight.shape().dims());
        let grad_bias = Tensor::zeros(bias.shape().dims());
        let layer = Self {
            weight,
            bias,
            grad_weight,
            grad_bias,
            output: Tensor::zeros(&[0]),
            grad_input: Tensor::zeros(&[0]),
            filters,
            stride,
            training: true,
        };
        layer.warn_if_checkerboard();
        layer
    }

    fn warn_if_checkerboard(&self) {
        let (kh, kw) = self.kernel_size();
        let (sh, sw) = self.stride;
        if kh % sh != 0 || kw % sw != 0 {
            warn!(
                kernel = ?(kh, kw),
                stride = ?(sh, sw),
                "kernel size is not divisible by stride, output may show checkerboard artifacts"
            );
        }
    }

    pub fn in_channels(&self) -> usize {
        self.filters.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.filters.out_channels
    }

    /// `(kH, kW)`
    pub fn kernel_size(&self) -> (usize, usize) {
        self.filters.kernel_size()
    }

    /// `(dH, dW)`
    pub fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub fn weight(&self) -> &Tensor<T> {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor<T> {
        &self.bias
    }

    pub fn grad_weight(&self) -> &Tensor<T> {
        &self.grad_weight
    }

    pub fn grad_bias(&self) -> &Tensor<T> {
        &self.grad_bias
    }

    /// Output of the last successful [`update_output`](Self::update_output)
    pub fn output(&self) -> &Tensor<T> {
        &self.output
    }

    /// Result of the last successful [`update_grad_input`](Self::update_grad_input)
    pub fn grad_input(&self) -> &Tensor<T> {
        &self.grad_input
    }

    /// Mode flag set through [`Layer::set_training`]. Training and
    /// evaluation run the same passes.
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Re-draw weight and bias from `U[-stdv, stdv]`.
    ///
    /// `stdv` defaults to `1 / sqrt(kW * kH * Cin)`. Both tensors are rebuilt
    /// with the construction-time shapes.
    pub fn reset(&mut self, stdv: Option<f64>) -> Result<()> {
        self.reset_with_rng(&mut rand::thread_rng(), stdv)
    }

    /// [`reset`](Self::reset) with a caller-supplied RNG
    pub fn reset_with_rng<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        stdv: Option<f64>,
    ) -> Result<()> {
        let (kh, kw) = self.kernel_size();
        let fan_in = (kw * kh * self.in_channels()) as f64;
        let stdv = stdv.unwrap_or_else(|| 1.0 / fan_in.sqrt());
        if !(stdv.is_finite() && stdv > 0.0) {
            return Err(TensorError::invalid_argument_op(
                "SpatialFullConvolution::reset",
                &format!("stdv must be positive and finite, got {stdv}"),
            ));
        }

        let dist = Uniform::new_inclusive(-stdv, stdv);
        let mut draw = || T::from_f64(dist.sample(rng)).unwrap_or_else(T::zero);
        let weight_dims = self.filters.dims();
        self.weight = Tensor::from_fn(&weight_dims, |_| draw());
        self.bias = Tensor::from_fn(&[self.filters.out_channels], |_| draw());
        debug!(stdv, weight = ?weight_dims, "reset spatial full convolution parameters");
        Ok(())
    }

    /// Replace the weight; the shape must stay `[Cin, Cout, kH, kW]`
    pub fn set_weight(&mut self, weight: Tensor<T>) -> Result<()> {
        let expected = self.filters.dims();
        if weight.shape().dims() != expected {
            return Err(TensorError::shape_mismatch(
                "SpatialFullConvolution::set_weight",
                &format!("{expected:?}"),
                &weight.shape().to_string(),
            ));
        }
        self.weight = weight;
        Ok(())
    }

    /// Replace the bias; the shape must stay `[Cout]`
    pub fn set_bias(&mut self, bias: Tensor<T>) -> Result<()> {
        check_bias_shape(&bias, self.out_channels(), "SpatialFullConvolution::set_bias")?;
        self.bias = bias;
        Ok(())
    }

    /// Forward pass into the cached output buffer
    pub fn update_output(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        spatial_full_conv2d(&mut self.output, input, &self.weight, &self.bias, self.stride)?;
        Ok(&self.output)
    }

    /// Overwrite the cached input gradient with `dL/dinput`
    pub fn update_grad_input(
        &mut self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
    ) -> Result<&Tensor<T>> {
        spatial_full_conv2d_grad_input(
            &mut self.grad_input,
            input,
            grad_output,
            &self.weight,
            self.stride,
        )?;
        Ok(&self.grad_input)
    }

    /// Accumulate `scale * dL/dW` and `scale * dL/db`.
    ///
    /// The accumulators are not cleared first. Call
    /// [`zero_grad_parameters`](Self::zero_grad_parameters) between
    /// iterations, or gradients from consecutive calls add up.
    pub fn acc_grad_parameters(
        &mut self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
        scale: T,
    ) -> Result<()> {
        spatial_full_conv2d_acc_grad_parameters(
            &mut self.grad_weight,
            &mut self.grad_bias,
            input,
            grad_output,
            &self.weight,
            self.stride,
            scale,
        )
    }

    /// [`acc_grad_parameters`](Self::acc_grad_parameters) with `scale = 1`
    pub fn acc_grad_parameters_default(
        &mut self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
    ) -> Result<()> {
        self.acc_grad_parameters(input, grad_output, T::one())
    }

    /// Input gradient followed by parameter accumulation
    pub fn backward(
        &mut self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
        scale: T,
    ) -> Result<&Tensor<T>> {
        self.update_grad_input(input, grad_output)?;
        self.acc_grad_parameters(input, grad_output, scale)?;
        Ok(&self.grad_input)
    }

    pub fn zero_grad_parameters(&mut self) {
        self.grad_weight.zero_();
        self.grad_bias.zero_();
    }

    /// `[grad_weight, grad_bias]`, in the same order as [`Layer::parameters`]
    pub fn gradients(&self) -> Vec<&Tensor<T>> {
        vec![&self.grad_weight, &self.grad_bias]
    }
}

fn check_bias_shape<T>(bias: &Tensor<T>, out_channels: usize, operation: &str) -> Result<()> {
    if bias.shape().dims() != [out_channels] {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("bias of shape [{out_channels}]"),
            &bias.shape().to_string(),
        ));
    }
    Ok(())
}

impl<T> Layer<T> for SpatialFullConvolution<T>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
{
    fn forward(&self, input: &Tensor<T>) -> Result<Tensor<T>> {
        let mut output = Tensor::zeros(&[0]);
        spatial_full_conv2d(&mut output, input, &self.weight, &self.bias, self.stride)?;
        Ok(output)
    }

    fn parameters(&self) -> Vec<&Tensor<T>> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.weight, &mut self.bias]
    }

    /// Records the mode only
    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn clone_box(&self) -> Box<dyn Layer<T>> {
        Box::new(self.clone())
    }

    fn layer_type(&self) -> LayerType {
        LayerType::ConvTranspose2D
    }

    fn set_weight(&mut self, weight: Tensor<T>) -> Result<()> {
        SpatialFullConvolution::set_weight(self, weight)
    }

    fn set_bias(&mut self, bias: Option<Tensor<T>>) -> Result<()> {
        match bias {
            Some(bias) => SpatialFullConvolution::set_bias(self, bias),
            None => Err(TensorError::invalid_argument_op(
                "SpatialFullConvolution::set_bias",
                "spatial full convolution always carries a bias",
            )),
        }
    }
}
