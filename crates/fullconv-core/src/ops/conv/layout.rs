//! Planar (channel, height, width) layout resolution for the spatial passes.
//!
//! Feature maps arrive either unbatched as `[C, H, W]` or batched as
//! `[N, C, H, W]`. Everything that reads a channel or spatial extent goes
//! through [`PlanarLayout`] so the batch offset is applied in one place.

use crate::{Result, Shape, TensorError};

/// Output extent of a full convolution along one axis, `(input - 1) * stride + kernel`.
///
/// `None` when `input` is zero or the extent does not fit in `usize`.
pub fn full_conv_extent(input: usize, kernel: usize, stride: usize) -> Option<usize> {
    input.checked_sub(1)?.checked_mul(stride)?.checked_add(kernel)
}

/// Output `(height, width)` of a full convolution over one plane
pub fn full_conv_plane(
    operation: &str,
    plane: (usize, usize),
    kernel: (usize, usize),
    stride: (usize, usize),
) -> Result<(usize, usize)> {
    let height = full_conv_extent(plane.0, kernel.0, stride.0);
    let width = full_conv_extent(plane.1, kernel.1, stride.1);
    match (height, width) {
        (Some(height), Some(width)) if height.checked_mul(width).is_some() => Ok((height, width)),
        _ => Err(TensorError::invalid_shape(
            operation,
            &format!(
                "full convolution of a {plane:?} plane with kernel {kernel:?} \
                 and stride {stride:?} overflows the addressable size"
            ),
            &[plane.0, plane.1],
        )),
    }
}

/// Resolved layout of a rank-3 or rank-4 feature map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanarLayout {
    batch: Option<usize>,
    channels: usize,
    height: usize,
    width: usize,
}

impl PlanarLayout {
    /// Build a layout directly from its parts
    pub fn new(batch: Option<usize>, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Resolve a feature-map shape. Rank 3 is `[C, H, W]`, rank 4 is `[N, C, H, W]`.
    pub fn from_shape(shape: &Shape, operation: &str) -> Result<Self> {
        let dims = shape.dims();
        let layout = match dims.len() {
            3 => Self::new(None, dims[0], dims[1], dims[2]),
            4 => Self::new(Some(dims[0]), dims[1], dims[2], dims[3]),
            rank => {
                return Err(TensorError::invalid_shape(
                    operation,
                    &format!("3D or 4D (batch mode) tensor expected, got {rank}D"),
                    dims,
                ))
            }
        };

        if layout.height == 0 || layout.width == 0 {
            return Err(TensorError::invalid_shape(
                operation,
                "spatial dimensions must be non-zero",
                dims,
            ));
        }
        if layout.channels == 0 {
            return Err(TensorError::invalid_shape(
                operation,
                "channel dimension must be non-zero",
                dims,
            ));
        }

        Ok(layout)
    }

    pub fn batch(&self) -> Option<usize> {
        self.batch
    }

    pub fn is_batched(&self) -> bool {
        self.batch.is_some()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Axis index of the channel dimension
    pub fn channel_axis(&self) -> usize {
        if self.is_batched() {
            1
        } else {
            0
        }
    }

    /// Elements in one `(H, W)` plane
    pub fn plane_size(&self) -> usize {
        self.height * self.width
    }

    /// Full dimension list, batch first when present
    pub fn dims(&self) -> Vec<usize> {
        match self.batch {
            Some(n) => vec![n, self.channels, self.height, self.width],
            None => vec![self.channels, self.height, self.width],
        }
    }

    /// Layout produced by a full convolution with `out_channels` planes
    pub fn full_conv_output(
        &self,
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
    ) -> Result<Self> {
        check_stride("full_conv_output", stride)?;
        let (height, width) =
            full_conv_plane("full_conv_output", (self.height, self.width), kernel, stride)?;
        let output = Self {
            batch: self.batch,
            channels: out_channels,
            height,
            width,
        };
        let dims = output.dims();
        if dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).is_none() {
            return Err(TensorError::invalid_shape(
                "full_conv_output",
                "output element count overflows the addressable size",
                &dims,
            ));
        }
        Ok(output)
    }
}

/// Filter bank of a spatial full convolution, stored as `[Cin, Cout, kH, kW]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterBank {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
}

impl FilterBank {
    pub fn from_shape(shape: &Shape, operation: &str) -> Result<Self> {
        let dims = shape.dims();
        if dims.len() != 4 {
            return Err(TensorError::invalid_shape(
                operation,
                &format!(
                    "weight must be 4D [in_channels, out_channels, kernel_height, \
                     kernel_width], got {}D",
                    dims.len()
                ),
                dims,
            ));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(TensorError::invalid_shape(
                operation,
                "weight dimensions must be non-zero",
                dims,
            ));
        }
        Ok(Self {
            in_channels: dims[0],
            out_channels: dims[1],
            kernel_height: dims[2],
            kernel_width: dims[3],
        })
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        (self.kernel_height, self.kernel_width)
    }

    pub fn dims(&self) -> [usize; 4] {
        [
            self.in_channels,
            self.out_channels,
            self.kernel_height,
            self.kernel_width,
        ]
    }
}

/// Reject zero strides, which would collapse every input pixel onto one output
pub fn check_stride(operation: &str, stride: (usize, usize)) -> Result<()> {
    if stride.0 == 0 || stride.1 == 0 {
        return Err(TensorError::invalid_argument_op(
            operation,
            &format!("stride must be positive, got {stride:?}"),
        ));
    }
    Ok(())
}
