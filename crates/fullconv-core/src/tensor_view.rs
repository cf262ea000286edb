//! Zero-copy tensor views.
//!
//! A [`TensorView`] borrows the storage of a [`Tensor`] and reinterprets its
//! axis order through strides. Axis swaps never move data, which is what lets
//! the forward pass read the weight as `[Cout, Cin, kH, kW]` while it is
//! stored as `[Cin, Cout, kH, kW]`.

use crate::{Result, Shape, Tensor, TensorError};
use ndarray::{ArrayViewD, Ix4};

/// Borrowed, possibly non-contiguous view over tensor storage
#[derive(Debug, Clone)]
pub struct TensorView<'a, T> {
    view: ArrayViewD<'a, T>,
    shape: Shape,
}

impl<'a, T> TensorView<'a, T> {
    /// Create a view over the whole tensor
    pub fn from_tensor(tensor: &'a Tensor<T>) -> Self {
        Self::from_array_view(tensor.view())
    }

    fn from_array_view(view: ArrayViewD<'a, T>) -> Self {
        let shape = Shape::from_slice(view.shape());
        Self { view, shape }
    }

    /// Swap two axes without copying
    pub fn swap_axes(mut self, a: usize, b: usize) -> Result<Self> {
        let rank = self.view.ndim();
        if a >= rank || b >= rank {
            return Err(TensorError::invalid_argument_op(
                "swap_axes",
                &format!("axes ({a}, {b}) out of range for rank {rank}"),
            ));
        }
        self.view.swap_axes(a, b);
        self.shape = Shape::from_slice(self.view.shape());
        Ok(self)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Element strides of the view, in elements rather than bytes
    pub fn strides(&self) -> &[isize] {
        self.view.strides()
    }

    /// True when the view happens to be in row-major order
    pub fn is_contiguous(&self) -> bool {
        self.view.is_standard_layout()
    }

    /// Check whether this view borrows the storage of `tensor`
    pub fn shares_memory_with(&self, tensor: &Tensor<T>) -> bool {
        let base = tensor.view();
        let start = base.as_ptr() as usize;
        let end = start + base.len() * std::mem::size_of::<T>();
        let ptr = self.view.as_ptr() as usize;
        ptr >= start && ptr < end
    }

    /// Convert into a fixed rank-4 view for the convolution kernels
    pub fn into_rank4(self) -> Result<ndarray::ArrayView4<'a, T>> {
        let dims = self.shape.to_vec();
        self.view
            .into_dimensionality::<Ix4>()
            .map_err(|_| TensorError::invalid_shape("into_rank4", "rank 4 view expected", &dims))
    }

    /// Get the value at a specific index
    pub fn get(&self, index: &[usize]) -> Option<T>
    where
        T: Clone,
    {
        if index.len() != self.view.ndim() {
            return None;
        }
        self.view.get(index).cloned()
    }

    /// Materialise the view into an owned, row-major tensor
    pub fn to_tensor(&self) -> Tensor<T>
    where
        T: Clone,
    {
        Tensor::from_array(self.view.to_owned())
    }
}

impl<T> Tensor<T> {
    /// Zero-copy view of this tensor with axes `a` and `b` swapped
    pub fn transpose_view(&self, a: usize, b: usize) -> Result<TensorView<'_, T>> {
        TensorView::from_tensor(self).swap_axes(a, b)
    }
}
