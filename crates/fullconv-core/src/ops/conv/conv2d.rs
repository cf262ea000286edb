//! 2D convolution primitives over planar feature maps
//!
//! Three kernels cover every pass of a spatial full convolution:
//!
//! - [`full_conv2d`]: scatter each input pixel through the filter into a
//!   larger output (forward pass)
//! - [`valid_xcorr2d`]: strided valid cross-correlation, gathering a kernel
//!   window for each pixel of a smaller output (input gradient)
//! - [`weight_grad_xcorr2d`]: correlate input planes against gradient planes
//!   to produce a filter-sized result (weight gradient)
//!
//! All primitives write `dst = beta * dst + alpha * result`. A `beta` of zero
//! overwrites `dst` without reading it. Every shape is checked before `dst`
//! is touched.

use super::layout::{check_stride, full_conv_plane};
use crate::{Result, TensorError};
use ndarray::{ArrayView3, ArrayView4, ArrayViewMut2, ArrayViewMut3, ArrayViewMut4, Axis, Zip};
use num_traits::Float;

#[inline]
fn blend<T: Float>(old: T, beta: T, alpha: T, acc: T) -> T {
    if beta == T::zero() {
        alpha * acc
    } else {
        beta * old + alpha * acc
    }
}

fn scale_plane<T: Float>(plane: &mut ArrayViewMut2<'_, T>, beta: T) {
    if beta == T::zero() {
        plane.fill(T::zero());
    } else if beta != T::one() {
        plane.map_inplace(|v| *v = *v * beta);
    }
}

fn check_full_conv(
    operation: &str,
    dst: (usize, usize, usize),
    src: (usize, usize, usize),
    kernel: (usize, usize, usize, usize),
    stride: (usize, usize),
) -> Result<()> {
    check_stride(operation, stride)?;
    let (k_out, k_in, kh, kw) = kernel;
    if src.0 != k_in {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("{k_in} source planes"),
            &format!("{} source planes", src.0),
        ));
    }
    if src.1 == 0 || src.2 == 0 {
        return Err(TensorError::invalid_shape(
            operation,
            "source spatial dimensions must be non-zero",
            &[src.0, src.1, src.2],
        ));
    }
    let (out_h, out_w) = full_conv_plane(operation, (src.1, src.2), (kh, kw), stride)?;
    let expected = (k_out, out_h, out_w);
    if dst != expected {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("destination {expected:?}"),
            &format!("{dst:?}"),
        ));
    }
    Ok(())
}

fn check_valid_xcorr(
    operation: &str,
    dst: (usize, usize, usize),
    src: (usize, usize, usize),
    kernel: (usize, usize, usize, usize),
    stride: (usize, usize),
) -> Result<()> {
    check_stride(operation, stride)?;
    let (k_dst, k_src, kh, kw) = kernel;
    if src.0 != k_src {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("{k_src} source planes"),
            &format!("{} source planes", src.0),
        ));
    }
    if dst.0 != k_dst {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("{k_dst} destination planes"),
            &format!("{} destination planes", dst.0),
        ));
    }
    if dst.1 == 0 || dst.2 == 0 {
        return Err(TensorError::invalid_shape(
            operation,
            "destination spatial dimensions must be non-zero",
            &[dst.0, dst.1, dst.2],
        ));
    }
    let expected = full_conv_plane(operation, (dst.1, dst.2), (kh, kw), stride)?;
    if (src.1, src.2) != expected {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("source spatial extent {expected:?}"),
            &format!("{:?}", (src.1, src.2)),
        ));
    }
    Ok(())
}

fn full_conv2d_unchecked<T>(
    mut dst: ArrayViewMut3<'_, T>,
    beta: T,
    alpha: T,
    src: ArrayView3<'_, T>,
    kernel: ArrayView4<'_, T>,
    stride: (usize, usize),
) where
    T: Float + Send + Sync,
{
    let (sh, sw) = stride;
    Zip::from(dst.outer_iter_mut())
        .and(kernel.outer_iter())
        .par_for_each(|mut plane, filters| {
            scale_plane(&mut plane, beta);
            for (filter, channel) in filters.outer_iter().zip(src.outer_iter()) {
                for ((y, x), &v) in channel.indexed_iter() {
                    let v = alpha * v;
                    for ((ky, kx), &w) in filter.indexed_iter() {
                        let cell = &mut plane[[y * sh + ky, x * sw + kx]];
                        *cell = *cell + v * w;
                    }
                }
            }
        });
}

/// Full (transposed) convolution of one sample.
///
/// * `dst`: `[P, (H-1)*sH+kH, (W-1)*sW+kW]`
/// * `src`: `[Q, H, W]`
/// * `kernel`: `[P, Q, kH, kW]`, usually a transposed view of the stored weight
pub fn full_conv2d<T>(
    dst: ArrayViewMut3<'_, T>,
    beta: T,
    alpha: T,
    src: ArrayView3<'_, T>,
    kernel: ArrayView4<'_, T>,
    stride: (usize, usize),
) -> Result<()>
where
    T: Float + Send + Sync,
{
    check_full_conv("full_conv2d", dst.dim(), src.dim(), kernel.dim(), stride)?;
    full_conv2d_unchecked(dst, beta, alpha, src, kernel, stride);
    Ok(())
}

/// Batched [`full_conv2d`]; samples run in parallel
pub fn full_conv2d_batched<T>(
    mut dst: ArrayViewMut4<'_, T>,
    beta: T,
    alpha: T,
    src: ArrayView4<'_, T>,
    kernel: ArrayView4<'_, T>,
    stride: (usize, usize),
) -> Result<()>
where
    T: Float + Send + Sync,
{
    let (dn, dc, dh, dw) = dst.dim();
    let (sn, sc, shh, sww) = src.dim();
    if dn != sn {
        return Err(TensorError::shape_mismatch(
            "full_conv2d_batched",
            &format!("batch size {sn}"),
            &format!("batch size {dn}"),
        ));
    }
    check_full_conv(
        "full_conv2d_batched",
        (dc, dh, dw),
        (sc, shh, sww),
        kernel.dim(),
        stride,
    )?;

    Zip::from(dst.outer_iter_mut())
        .and(src.outer_iter())
        .par_for_each(|sample_dst, sample_src| {
            full_conv2d_unchecked(sample_dst, beta, alpha, sample_src, kernel, stride)
        });
    Ok(())
}

fn valid_xcorr2d_unchecked<T>(
    mut dst: ArrayViewMut3<'_, T>,
    beta: T,
    alpha: T,
    src: ArrayView3<'_, T>,
    kernel: ArrayView4<'_, T>,
    stride: (usize, usize),
) where
    T: Float + Send + Sync,
{
    let (sh, sw) = stride;
    Zip::from(dst.outer_iter_mut())
        .and(kernel.outer_iter())
        .par_for_each(|mut plane, filters| {
            for ((y, x), cell) in plane.indexed_iter_mut() {
                let mut acc = T::zero();
                for (filter, channel) in filters.outer_iter().zip(src.outer_iter()) {
                    for ((ky, kx), &w) in filter.indexed_iter() {
                        acc = acc + channel[[y * sh + ky, x * sw + kx]] * w;
                    }
                }
                *cell = blend(*cell, beta, alpha, acc);
            }
        });
}

/// Strided valid cross-correlation of one sample.
///
/// * `dst`: `[P, H, W]`
/// * `src`: `[Q, (H-1)*sH+kH, (W-1)*sW+kW]`
/// * `kernel`: `[P, Q, kH, kW]`
///
/// This is the adjoint of [`full_conv2d`] with the same kernel read as
/// `[Q, P, kH, kW]`.
pub fn valid_xcorr2d<T>(
    dst: ArrayViewMut3<'_, T>,
    beta: T,
    alpha: T,
    src: ArrayView3<'_, T>,
    kernel: ArrayView4<'_, T>,
    stride: (usize, usize),
) -> Result<()>
where
    T: Float + Send + Sync,
{
    check_valid_xcorr("valid_xcorr2d", dst.dim(), src.dim(), kernel.dim(), stride)?;
    valid_xcorr2d_unchecked(dst, beta, alpha, src, kernel, stride);
    Ok(())
}

/// Batched [`valid_xcorr2d`]; samples run in parallel
pub fn valid_xcorr2d_batched<T>(
    mut dst: ArrayViewMut4<'_, T>,
    beta: T,
    alpha: T,
    src: ArrayView4<'_, T>,
    kernel: ArrayView4<'_, T>,
    stride: (usize, usize),
) -> Result<()>
where
    T: Float + Send + Sync,
{
    let (dn, dc, dh, dw) = dst.dim();
    let (sn, sc, shh, sww) = src.dim();
    if dn != sn {
        return Err(TensorError::shape_mismatch(
            "valid_xcorr2d_batched",
            &format!("batch size {sn}"),
            &format!("batch size {dn}"),
        ));
    }
    check_valid_xcorr(
        "valid_xcorr2d_batched",
        (dc, dh, dw),
        (sc, shh, sww),
        kernel.dim(),
        stride,
    )?;

    Zip::from(dst.outer_iter_mut())
        .and(src.outer_iter())
        .par_for_each(|sample_dst, sample_src| {
            valid_xcorr2d_unchecked(sample_dst, beta, alpha, sample_src, kernel, stride)
        });
    Ok(())
}

/// Filter gradient of one sample.
///
/// * `dst`: `[P, Q, kH, kW]`
/// * `input`: `[P, H, W]`
/// * `grad`: `[Q, (H-1)*sH+kH, (W-1)*sW+kW]`
///
/// `dst[p, q, ky, kx] = beta * dst + alpha * sum(input[p, y, x] * grad[q, y*sH+ky, x*sW+kx])`
pub fn weight_grad_xcorr2d<T>(
    dst: ArrayViewMut4<'_, T>,
    beta: T,
    alpha: T,
    input: ArrayView3<'_, T>,
    grad: ArrayView3<'_, T>,
    stride: (usize, usize),
) -> Result<()>
where
    T: Float + Send + Sync,
{
    weight_grad_xcorr2d_batched(
        dst,
        beta,
        alpha,
        input.insert_axis(Axis(0)),
        grad.insert_axis(Axis(0)),
        stride,
    )
}

/// Filter gradient summed over every sample of a batch.
///
/// The batch sum is formed per filter cell before `beta`/`alpha` apply, so
/// the destination is written exactly once.
pub fn weight_grad_xcorr2d_batched<T>(
    mut dst: ArrayViewMut4<'_, T>,
    beta: T,
    alpha: T,
    input: ArrayView4<'_, T>,
    grad: ArrayView4<'_, T>,
    stride: (usize, usize),
) -> Result<()>
where
    T: Float + Send + Sync,
{
    let operation = "weight_grad_xcorr2d";
    check_stride(operation, stride)?;
    let (dp, dq, kh, kw) = dst.dim();
    let (in_n, in_c, in_h, in_w) = input.dim();
    let (g_n, g_c, g_h, g_w) = grad.dim();
    if in_n != g_n {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("batch size {in_n}"),
            &format!("batch size {g_n}"),
        ));
    }
    if (in_c, g_c) != (dp, dq) {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("({dp}, {dq}) input/gradient planes"),
            &format!("({in_c}, {g_c})"),
        ));
    }
    if in_h == 0 || in_w == 0 {
        return Err(TensorError::invalid_shape(
            operation,
            "input spatial dimensions must be non-zero",
            &[in_n, in_c, in_h, in_w],
        ));
    }
    let expected = full_conv_plane(operation, (in_h, in_w), (kh, kw), stride)?;
    if (g_h, g_w) != expected {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("gradient spatial extent {expected:?}"),
            &format!("{:?}", (g_h, g_w)),
        ));
    }

    let (sh, sw) = stride;
    Zip::from(dst.outer_iter_mut())
        .and(input.axis_iter(Axis(1)))
        .par_for_each(|mut filters, channel| {
            // filters: [Q, kH, kW], channel: [N, H, W]
            for ((q, ky, kx), cell) in filters.indexed_iter_mut() {
                let mut acc = T::zero();
                for (sample, plane) in channel.outer_iter().enumerate() {
                    let grad_plane = grad.slice(ndarray::s![sample, q, .., ..]);
                    for ((y, x), &v) in plane.indexed_iter() {
                        acc = acc + v * grad_plane[[y * sh + ky, x * sw + kx]];
                    }
                }
                *cell = blend(*cell, beta, alpha, acc);
            }
        });
    Ok(())
}
