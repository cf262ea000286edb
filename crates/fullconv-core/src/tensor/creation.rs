//! Tensor Creation and Construction
//!
//! Constructors for tensors from raw data, ndarray arrays and fill patterns.

use super::core::Tensor;
use crate::{Result, Shape, TensorError};
use ndarray::{ArrayD, IxDyn};
use num_traits::{One, Zero};

impl<T: Clone> Tensor<T> {
    /// Create a tensor filled with zeros
    pub fn zeros(shape: &[usize]) -> Self
    where
        T: Zero,
    {
        Self::from_array(ArrayD::zeros(IxDyn(shape)))
    }

    /// Create a tensor filled with ones
    pub fn ones(shape: &[usize]) -> Self
    where
        T: One,
    {
        Self::from_array(ArrayD::ones(IxDyn(shape)))
    }

    /// Create a tensor with every element set to `value`
    pub fn full(shape: &[usize], value: T) -> Self {
        Self::from_array(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// Create a tensor from a vector of data with specified shape
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let total_size: usize = shape.iter().product();
        if data.len() != total_size {
            return Err(TensorError::invalid_shape(
                "from_vec",
                &format!(
                    "Data length {} doesn't match shape {:?} (size {})",
                    data.len(),
                    shape,
                    total_size
                ),
                shape,
            ));
        }

        let array = ArrayD::from_shape_vec(IxDyn(shape), data)?;
        Ok(Self::from_array(array))
    }

    /// Create a tensor from an existing ndarray.
    ///
    /// Arrays in a non-standard layout are copied into row-major order.
    pub fn from_array(array: ArrayD<T>) -> Self {
        let array = if array.is_standard_layout() {
            array
        } else {
            array.as_standard_layout().into_owned()
        };
        let shape = Shape::from_slice(array.shape());
        Self {
            storage: array,
            shape,
        }
    }

    /// Create a tensor by evaluating `f` at every flat row-major position
    pub fn from_fn<F>(shape: &[usize], mut f: F) -> Self
    where
        F: FnMut(usize) -> T,
    {
        let mut position = 0;
        Self::from_array(ArrayD::from_shape_fn(IxDyn(shape), |_| {
            let value = f(position);
            position += 1;
            value
        }))
    }
}
