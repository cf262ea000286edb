//! Core Tensor Structure and Properties
//!
//! This module contains the fundamental tensor structure and basic property
//! access methods. Storage is always a standard-layout `ArrayD`, so every
//! tensor can hand out its elements as one contiguous slice.

use crate::{Result, Shape, TensorError};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};

/// Core tensor structure that holds data and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub(in crate::tensor) storage: ArrayD<T>,
    pub(in crate::tensor) shape: Shape,
}

impl<T> Tensor<T> {
    /// Get the shape of the tensor
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Get the underlying data as a slice
    pub fn as_slice(&self) -> Option<&[T]> {
        self.storage.as_slice()
    }

    /// Get the underlying data as a mutable slice
    pub fn as_slice_mut(&mut self) -> Option<&mut [T]> {
        self.storage.as_slice_mut()
    }

    /// Get the value at a specific index
    pub fn get(&self, index: &[usize]) -> Option<T>
    where
        T: Clone,
    {
        if index.len() != self.storage.ndim() {
            return None;
        }
        self.storage.get(index).cloned()
    }

    /// Borrow the storage as a dynamic-rank ndarray view
    pub fn view(&self) -> ArrayViewD<'_, T> {
        self.storage.view()
    }

    /// Borrow the storage mutably as a dynamic-rank ndarray view
    pub fn view_mut(&mut self) -> ArrayViewMutD<'_, T> {
        self.storage.view_mut()
    }

    /// Get the total number of elements
    pub fn numel(&self) -> usize {
        self.shape.size()
    }

    /// Get the number of dimensions (rank)
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Check if tensor data is contiguous in memory
    pub fn is_contiguous(&self) -> bool {
        self.storage.is_standard_layout()
    }
}

impl<T: Clone + num_traits::Zero> Tensor<T> {
    /// Resize the tensor in place.
    ///
    /// Storage is reused when the dimensions already match; otherwise a new
    /// zero-filled buffer is allocated. Callers that resize are expected to
    /// overwrite every element afterwards.
    pub fn resize(&mut self, dims: &[usize]) {
        if self.shape.dims() == dims {
            return;
        }
        self.storage = ArrayD::zeros(IxDyn(dims));
        self.shape = Shape::from_slice(dims);
    }

    /// Set every element to zero
    pub fn zero_(&mut self) {
        self.storage.fill(T::zero());
    }

    /// Set every element to `value`
    pub fn fill(&mut self, value: T) {
        self.storage.fill(value);
    }

    /// Copy the elements out into a flat row-major vector
    pub fn to_vec(&self) -> Vec<T> {
        self.storage.iter().cloned().collect()
    }

    /// Reshape into `dims`, keeping the element order
    pub fn reshape(&self, dims: &[usize]) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if expected != self.numel() {
            return Err(TensorError::invalid_shape(
                "reshape",
                &format!(
                    "cannot reshape {} elements into {:?}",
                    self.numel(),
                    dims
                ),
                dims,
            ));
        }
        Self::from_vec(self.to_vec(), dims)
    }
}
