//! Spatial full (transposed) convolution passes
//!
//! The three drivers here validate every argument through [`PlanarLayout`]
//! and [`FilterBank`], then hand fixed-rank ndarray views to the primitives in
//! [`super::conv2d`]. Feature maps are `[C, H, W]` or `[N, C, H, W]`; the
//! weight is stored as `[Cin, Cout, kH, kW]`.
//!
//! Buffers are owned by the caller. A driver that returns `Err` has not
//! written to any of them.

use super::conv2d::{
    full_conv2d, full_conv2d_batched, valid_xcorr2d, valid_xcorr2d_batched, weight_grad_xcorr2d,
    weight_grad_xcorr2d_batched,
};
use super::layout::{check_stride, FilterBank, PlanarLayout};
use crate::{Result, Tensor, TensorError};
use ndarray::{Ix3, Ix4};
use num_traits::Float;
use rayon::prelude::*;
use tracing::debug;

fn contiguous<'a, T>(tensor: &'a Tensor<T>, operation: &str) -> Result<&'a [T]> {
    tensor.as_slice().ok_or_else(|| {
        TensorError::invalid_shape(
            operation,
            "tensor storage is not contiguous",
            tensor.shape().dims(),
        )
    })
}

fn contiguous_mut<'a, T>(tensor: &'a mut Tensor<T>, operation: &str) -> Result<&'a mut [T]> {
    let dims = tensor.shape().to_vec();
    tensor.as_slice_mut().ok_or_else(|| {
        TensorError::invalid_shape(operation, "tensor storage is not contiguous", &dims)
    })
}

fn check_bias<T>(bias: &Tensor<T>, out_channels: usize, operation: &str) -> Result<()> {
    if bias.rank() != 1 {
        return Err(TensorError::invalid_shape(
            operation,
            &format!("bias must be 1D, got {}D", bias.rank()),
            bias.shape().dims(),
        ));
    }
    if bias.numel() != out_channels {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("bias of length {out_channels}"),
            &format!("bias of length {}", bias.numel()),
        ));
    }
    Ok(())
}

/// Resolve the input against the filter bank and return both layouts of the pass
fn resolve_forward<T>(
    input: &Tensor<T>,
    weight: &Tensor<T>,
    stride: (usize, usize),
    operation: &str,
) -> Result<(PlanarLayout, PlanarLayout, FilterBank)> {
    check_stride(operation, stride)?;
    let layout = PlanarLayout::from_shape(input.shape(), operation)?;
    let bank = FilterBank::from_shape(weight.shape(), operation)?;
    if layout.channels() != bank.in_channels {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("{} input channels", bank.in_channels),
            &format!("{} input channels", layout.channels()),
        ));
    }
    let out = layout.full_conv_output(bank.out_channels, bank.kernel_size(), stride)?;
    Ok((layout, out, bank))
}

/// Shared validation of the two backward passes
fn resolve_backward<T>(
    input: &Tensor<T>,
    grad_output: &Tensor<T>,
    weight: &Tensor<T>,
    stride: (usize, usize),
    operation: &str,
) -> Result<(PlanarLayout, FilterBank)> {
    let (layout, expected, bank) = resolve_forward(input, weight, stride, operation)?;
    let grad_layout = PlanarLayout::from_shape(grad_output.shape(), operation)?;

    if grad_layout.channels() != bank.out_channels {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("gradOutput with {} channels", bank.out_channels),
            &format!("{} channels", grad_layout.channels()),
        ));
    }
    if grad_layout != expected {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("gradOutput of shape {:?}", expected.dims()),
            &format!("{:?}", grad_output.shape().dims()),
        ));
    }
    Ok((layout, bank))
}

/// Write `bias[c]` into every element of output plane `c`.
///
/// `output` must already have its final `[C, H, W]` or `[N, C, H, W]` shape.
pub fn broadcast_bias<T>(output: &mut Tensor<T>, bias: &Tensor<T>) -> Result<()>
where
    T: Float + Send + Sync,
{
    let operation = "broadcast_bias";
    let layout = PlanarLayout::from_shape(output.shape(), operation)?;
    check_bias(bias, layout.channels(), operation)?;

    let channels = layout.channels();
    let plane = layout.plane_size();
    let bias = contiguous(bias, operation)?;
    let data = contiguous_mut(output, operation)?;

    data.par_chunks_mut(plane)
        .enumerate()
        .for_each(|(index, chunk)| chunk.fill(bias[index % channels]));
    Ok(())
}

/// Forward pass: `output = bias + full_conv(input, weight^T, stride)`.
///
/// `output` is resized to `[.., Cout, (H-1)*dH+kH, (W-1)*dW+kW]` and fully
/// overwritten. The weight is read through a zero-copy `[Cout, Cin, kH, kW]`
/// view.
pub fn spatial_full_conv2d<T>(
    output: &mut Tensor<T>,
    input: &Tensor<T>,
    weight: &Tensor<T>,
    bias: &Tensor<T>,
    stride: (usize, usize),
) -> Result<()>
where
    T: Float + Send + Sync,
{
    let operation = "spatial_full_conv2d";
    let (layout, out_layout, bank) = resolve_forward(input, weight, stride, operation)?;
    check_bias(bias, bank.out_channels, operation)?;
    let kernel = weight.transpose_view(0, 1)?.into_rank4()?;

    debug!(
        input = ?layout.dims(),
        output = ?out_layout.dims(),
        ?stride,
        "spatial full convolution forward"
    );

    output.resize(&out_layout.dims());
    broadcast_bias(output, bias)?;

    if layout.is_batched() {
        full_conv2d_batched(
            output.view_mut().into_dimensionality::<Ix4>()?,
            T::one(),
            T::one(),
            input.view().into_dimensionality::<Ix4>()?,
            kernel,
            stride,
        )
    } else {
        full_conv2d(
            output.view_mut().into_dimensionality::<Ix3>()?,
            T::one(),
            T::one(),
            input.view().into_dimensionality::<Ix3>()?,
            kernel,
            stride,
        )
    }
}

/// Input gradient: `grad_input = valid_xcorr(grad_output, weight, stride)`.
///
/// `grad_input` is resized to the shape of `input` and overwritten.
pub fn spatial_full_conv2d_grad_input<T>(
    grad_input: &mut Tensor<T>,
    input: &Tensor<T>,
    grad_output: &Tensor<T>,
    weight: &Tensor<T>,
    stride: (usize, usize),
) -> Result<()>
where
    T: Float + Send + Sync,
{
    let operation = "spatial_full_conv2d_grad_input";
    let (layout, _) = resolve_backward(input, grad_output, weight, stride, operation)?;
    let kernel = weight.view().into_dimensionality::<Ix4>()?;

    debug!(
        grad_output = ?grad_output.shape().dims(),
        grad_input = ?layout.dims(),
        ?stride,
        "spatial full convolution input gradient"
    );

    grad_input.resize(&layout.dims());
    if layout.is_batched() {
        valid_xcorr2d_batched(
            grad_input.view_mut().into_dimensionality::<Ix4>()?,
            T::zero(),
            T::one(),
            grad_output.view().into_dimensionality::<Ix4>()?,
            kernel,
            stride,
        )
    } else {
        valid_xcorr2d(
            grad_input.view_mut().into_dimensionality::<Ix3>()?,
            T::zero(),
            T::one(),
            grad_output.view().into_dimensionality::<Ix3>()?,
            kernel,
            stride,
        )
    }
}

/// Add `scale * sum(grad_output[.., c, :, :])` to `grad_bias[c]`.
///
/// Batched sums are formed per sample in parallel and merged in sample
/// order, so the result does not depend on scheduling.
pub fn accumulate_bias_grad<T>(
    grad_bias: &mut Tensor<T>,
    grad_output: &Tensor<T>,
    scale: T,
) -> Result<()>
where
    T: Float + Send + Sync,
{
    let operation = "accumulate_bias_grad";
    let layout = PlanarLayout::from_shape(grad_output.shape(), operation)?;
    check_bias(grad_bias, layout.channels(), operation)?;

    let channels = layout.channels();
    let plane = layout.plane_size();
    let data = contiguous(grad_output, operation)?;
    let plane_sum = |p: &[T]| p.iter().fold(T::zero(), |acc, &v| acc + v);

    let totals: Vec<T> = if layout.is_batched() {
        let partials: Vec<Vec<T>> = data
            .par_chunks(channels * plane)
            .map(|sample| sample.chunks(plane).map(plane_sum).collect())
            .collect();
        let mut totals = vec![T::zero(); channels];
        for partial in &partials {
            for (total, &value) in totals.iter_mut().zip(partial) {
                *total = *total + value;
            }
        }
        totals
    } else {
        data.par_chunks(plane).map(plane_sum).collect()
    };

    let grad_bias = contiguous_mut(grad_bias, operation)?;
    for (g, total) in grad_bias.iter_mut().zip(totals) {
        *g = *g + scale * total;
    }
    Ok(())
}

/// Parameter gradients:
/// `grad_weight += scale * dL/dW` and `grad_bias += scale * dL/db`.
///
/// Both accumulators must already have the weight and bias shapes. They are
/// never zeroed here; calling this twice without zeroing doubles the result.
#[allow(clippy::too_many_arguments)]
pub fn spatial_full_conv2d_acc_grad_parameters<T>(
    grad_weight: &mut Tensor<T>,
    grad_bias: &mut Tensor<T>,
    input: &Tensor<T>,
    grad_output: &Tensor<T>,
    weight: &Tensor<T>,
    stride: (usize, usize),
    scale: T,
) -> Result<()>
where
    T: Float + Send + Sync,
{
    let operation = "spatial_full_conv2d_acc_grad_parameters";
    let (layout, bank) = resolve_backward(input, grad_output, weight, stride, operation)?;

    if grad_weight.shape().dims() != bank.dims() {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("gradWeight of shape {:?}", bank.dims()),
            &format!("{:?}", grad_weight.shape().dims()),
        ));
    }
    check_bias(grad_bias, bank.out_channels, operation)?;

    debug!(
        input = ?layout.dims(),
        grad_output = ?grad_output.shape().dims(),
        ?stride,
        "spatial full convolution parameter gradients"
    );

    accumulate_bias_grad(grad_bias, grad_output, scale)?;

    if layout.is_batched() {
        weight_grad_xcorr2d_batched(
            grad_weight.view_mut().into_dimensionality::<Ix4>()?,
            T::one(),
            scale,
            input.view().into_dimensionality::<Ix4>()?,
            grad_output.view().into_dimensionality::<Ix4>()?,
            stride,
        )
    } else {
        weight_grad_xcorr2d(
            grad_weight.view_mut().into_dimensionality::<Ix4>()?,
            T::one(),
            scale,
            input.view().into_dimensionality::<Ix3>()?,
            grad_output.view().into_dimensionality::<Ix3>()?,
            stride,
        )
    }
}
