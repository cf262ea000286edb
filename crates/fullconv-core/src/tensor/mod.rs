//! Tensor Module
//!
//! - **core**: tensor structure, properties, resizing
//! - **creation**: constructors and fill patterns

pub mod core;
pub mod creation;

pub use self::core::Tensor;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_constructors() {
        let zeros = Tensor::<f32>::zeros(&[2, 3]);
        assert_eq!(zeros.shape().dims(), &[2, 3]);
        assert_eq!(zeros.numel(), 6);

        let ones = Tensor::<f32>::ones(&[2, 2]);
        assert_eq!(ones.as_slice(), Some(&[1.0, 1.0, 1.0, 1.0][..]));

        let full = Tensor::<f32>::full(&[3], 5.0);
        assert_eq!(full.to_vec(), vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]).unwrap_err();
        assert!(err.is_shape_error());
    }

    #[test]
    fn test_resize_reallocates_only_on_change() {
        let mut tensor = Tensor::<f32>::full(&[2, 3], 7.0);
        tensor.resize(&[2, 3]);
        assert_eq!(tensor.to_vec(), vec![7.0; 6]);

        tensor.resize(&[1, 2, 4, 4]);
        assert_eq!(tensor.shape().dims(), &[1, 2, 4, 4]);
        assert_eq!(tensor.numel(), 32);
        assert!(tensor.is_contiguous());
    }

    #[test]
    fn test_from_array_normalises_layout() {
        let array = ndarray::Array2::<f32>::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f32)
            .reversed_axes()
            .into_dyn();
        let tensor = Tensor::from_array(array);
        assert!(tensor.is_contiguous());
        assert_eq!(tensor.to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_reshape_and_zero() {
        let mut tensor = Tensor::<f64>::from_fn(&[2, 3], |i| i as f64);
        let reshaped = tensor.reshape(&[3, 2]).unwrap();
        assert_eq!(reshaped.get(&[2, 1]), Some(5.0));
        assert!(tensor.reshape(&[4, 2]).is_err());

        tensor.zero_();
        assert!(tensor.to_vec().iter().all(|&v| v == 0.0));
    }
}
