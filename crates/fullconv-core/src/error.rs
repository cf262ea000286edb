use thiserror::Error;

/// Errors raised by tensor construction, shape resolution and the convolution passes.
///
/// Every operation validates its arguments before touching any buffer, so an
/// `Err` always means no output, gradient or accumulator was modified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("Shape mismatch in operation '{operation}': expected {expected}, got {got}")]
    ShapeMismatch {
        operation: String,
        expected: String,
        got: String,
    },

    #[error("Invalid shape in operation '{operation}': {reason}")]
    InvalidShape {
        operation: String,
        reason: String,
        shape: Option<Vec<usize>>,
    },

    #[error("Invalid argument in operation '{operation}': {reason}")]
    InvalidArgument { operation: String, reason: String },
}

impl TensorError {
    /// Create a shape mismatch error with context
    pub fn shape_mismatch(operation: &str, expected: &str, got: &str) -> Self {
        Self::ShapeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Create an invalid shape error carrying the offending dimensions
    pub fn invalid_shape(operation: &str, reason: &str, shape: &[usize]) -> Self {
        Self::InvalidShape {
            operation: operation.to_string(),
            reason: reason.to_string(),
            shape: Some(shape.to_vec()),
        }
    }

    /// Create an invalid argument error with operation context
    pub fn invalid_argument_op(operation: &str, reason: &str) -> Self {
        Self::InvalidArgument {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Get the operation name for this error
    pub fn operation(&self) -> &str {
        match self {
            Self::ShapeMismatch { operation, .. } => operation,
            Self::InvalidShape { operation, .. } => operation,
            Self::InvalidArgument { operation, .. } => operation,
        }
    }

    /// True for rank and extent errors on a single tensor
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::InvalidShape { .. })
    }

    /// True when two tensors disagree on a dimension they must share
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Convert from ndarray::ShapeError to TensorError
impl From<ndarray::ShapeError> for TensorError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::InvalidShape {
            operation: "tensor_view".to_string(),
            reason: format!("Shape error: {err}"),
            shape: None,
        }
    }
}
