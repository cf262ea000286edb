//! Numerical Gradient Validation Utilities
//!
//! Validates hand-written backward passes by comparing them against finite
//! differences of a scalar loss:
//!
//! ```text
//! dL/dx_i ≈ [L(x + ε e_i) - L(x - ε e_i)] / (2ε)
//! ```
//!
//! # Example
//!
//! ```rust
//! use fullconv_core::numerical_gradient::{check_gradients, GradientCheckConfig};
//! use fullconv_core::Tensor;
//!
//! // L(x) = sum(x^2), dL/dx = 2x
//! let x = Tensor::<f64>::from_vec(vec![1.0, -2.0, 3.0], &[3]).unwrap();
//! let loss = |t: &Tensor<f64>| Ok(t.to_vec().iter().map(|v| v * v).sum::<f64>());
//! let grad = |t: &Tensor<f64>| {
//!     Tensor::from_vec(t.to_vec().iter().map(|v| 2.0 * v).collect(), &[3])
//! };
//!
//! let result = check_gradients(&x, loss, grad, &GradientCheckConfig::default()).unwrap();
//! assert!(result.is_ok(), "{}", result.summary());
//! ```

use crate::{Result, Tensor, TensorError};
use num_traits::{Float, FromPrimitive};
use std::marker::PhantomData;

/// Configuration for numerical gradient checking
#[derive(Debug, Clone)]
pub struct GradientCheckConfig {
    /// Epsilon for finite difference computation
    pub epsilon: f64,
    /// Relative tolerance for gradient comparison
    pub rtol: f64,
    /// Absolute tolerance for gradient comparison
    pub atol: f64,
    /// Record the flat index of every failing element
    pub check_elementwise: bool,
    /// Use central differences (more accurate but 2x slower)
    pub use_central_difference: bool,
}

impl Default for GradientCheckConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-5,
            rtol: 1e-3,
            atol: 1e-5,
            check_elementwise: false,
            use_central_difference: true,
        }
    }
}

impl GradientCheckConfig {
    /// Tighter tolerances, every failure recorded
    pub fn strict() -> Self {
        Self {
            epsilon: 1e-6,
            rtol: 1e-4,
            atol: 1e-6,
            check_elementwise: true,
            use_central_difference: true,
        }
    }

    /// Looser tolerances for single precision
    pub fn relaxed() -> Self {
        Self {
            epsilon: 1e-3,
            rtol: 1e-2,
            atol: 1e-3,
            check_elementwise: false,
            use_central_difference: true,
        }
    }
}

/// Result of gradient checking
#[derive(Debug, Clone)]
pub struct GradientCheckResult {
    /// Whether the gradient check passed
    pub passed: bool,
    /// Maximum relative error found
    pub max_relative_error: f64,
    /// Maximum absolute error found
    pub max_absolute_error: f64,
    /// Number of elements checked
    pub num_elements_checked: usize,
    /// Number of elements that failed tolerance check
    pub num_failures: usize,
    /// Indices of failed elements (if check_elementwise is true)
    pub failed_indices: Vec<usize>,
    /// Detailed error message if check failed
    pub error_message: Option<String>,
}

impl GradientCheckResult {
    pub fn is_ok(&self) -> bool {
        self.passed
    }

    /// Percentage of checked elements that failed
    pub fn failure_rate(&self) -> f64 {
        if self.num_elements_checked == 0 {
            0.0
        } else {
            (self.num_failures as f64 / self.num_elements_checked as f64) * 100.0
        }
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        if self.passed {
            format!(
                "Gradient check passed\n\
                 Elements checked: {}\n\
                 Max relative error: {:.2e}\n\
                 Max absolute error: {:.2e}",
                self.num_elements_checked, self.max_relative_error, self.max_absolute_error
            )
        } else {
            format!(
                "Gradient check FAILED\n\
                 Elements checked: {}\n\
                 Failures: {} ({:.2}%)\n\
                 Max relative error: {:.2e}\n\
                 Max absolute error: {:.2e}\n\
                 {}",
                self.num_elements_checked,
                self.num_failures,
                self.failure_rate(),
                self.max_relative_error,
                self.max_absolute_error,
                self.error_message.as_deref().unwrap_or("")
            )
        }
    }
}

/// Finite-difference checker for scalar losses
pub struct NumericalGradientChecker<T> {
    config: GradientCheckConfig,
    _phantom: PhantomData<T>,
}

impl<T> NumericalGradientChecker<T>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
{
    pub fn new(config: GradientCheckConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    /// Estimate `dL/dx` for every element of `input`
    pub fn compute_numerical_gradient<F>(&self, input: &Tensor<T>, loss: F) -> Result<Tensor<T>>
    where
        F: Fn(&Tensor<T>) -> Result<T>,
    {
        let epsilon = T::from_f64(self.config.epsilon).ok_or_else(|| {
            TensorError::invalid_argument_op(
                "compute_numerical_gradient",
                "epsilon is not representable in the element type",
            )
        })?;
        let dims = input.shape().to_vec();
        let base = input.to_vec();
        let baseline = if self.config.use_central_difference {
            None
        } else {
            Some(loss(input)?)
        };

        let mut gradient = Vec::with_capacity(base.len());
        let mut perturbed = base.clone();
        for i in 0..base.len() {
            perturbed[i] = base[i] + epsilon;
            let f_plus = loss(&Tensor::from_vec(perturbed.clone(), &dims)?)?;

            let grad = match baseline {
                Some(f_x) => (f_plus - f_x) / epsilon,
                None => {
                    perturbed[i] = base[i] - epsilon;
                    let f_minus = loss(&Tensor::from_vec(perturbed.clone(), &dims)?)?;
                    (f_plus - f_minus) / (epsilon + epsilon)
                }
            };
            perturbed[i] = base[i];
            gradient.push(grad);
        }

        Tensor::from_vec(gradient, &dims)
    }

    /// Compare analytical and numerical gradients
    pub fn compare_gradients(
        &self,
        numerical: &Tensor<T>,
        analytical: &Tensor<T>,
    ) -> Result<GradientCheckResult> {
        if numerical.shape() != analytical.shape() {
            return Err(TensorError::shape_mismatch(
                "compare_gradients",
                &numerical.shape().to_string(),
                &analytical.shape().to_string(),
            ));
        }

        let rtol = self.config.rtol;
        let atol = self.config.atol;

        let mut max_rel_error: f64 = 0.0;
        let mut max_abs_error: f64 = 0.0;
        let mut num_failures = 0;
        let mut failed_indices = Vec::new();

        let num_data = numerical.to_vec();
        let ana_data = analytical.to_vec();
        for (i, (num, ana)) in num_data.iter().zip(&ana_data).enumerate() {
            let num_val = num.to_f64().unwrap_or(f64::NAN);
            let ana_val = ana.to_f64().unwrap_or(f64::NAN);

            let abs_error = (num_val - ana_val).abs();
            let rel_error = if ana_val.abs() > 1e-10 {
                abs_error / ana_val.abs()
            } else {
                abs_error
            };

            max_rel_error = max_rel_error.max(rel_error);
            max_abs_error = max_abs_error.max(abs_error);

            // NaN compares false, so test the negation of "within tolerance"
            if !(rel_error <= rtol || abs_error <= atol) {
                num_failures += 1;
                if self.config.check_elementwise {
                    failed_indices.push(i);
                }
            }
        }

        let passed = num_failures == 0;
        let error_message = (!passed).then(|| {
            format!(
                "Gradient mismatch: {} of {} elements exceed tolerance (rtol={}, atol={})",
                num_failures,
                num_data.len(),
                rtol,
                atol
            )
        });

        Ok(GradientCheckResult {
            passed,
            max_relative_error: max_rel_error,
            max_absolute_error: max_abs_error,
            num_elements_checked: num_data.len(),
            num_failures,
            failed_indices,
            error_message,
        })
    }

    /// Full gradient check: compute numerical gradient and compare
    pub fn check<F, G>(
        &self,
        input: &Tensor<T>,
        loss: F,
        gradient: G,
    ) -> Result<GradientCheckResult>
    where
        F: Fn(&Tensor<T>) -> Result<T>,
        G: Fn(&Tensor<T>) -> Result<Tensor<T>>,
    {
        let numerical_grad = self.compute_numerical_gradient(input, loss)?;
        let analytical_grad = gradient(input)?;

        self.compare_gradients(&numerical_grad, &analytical_grad)
    }
}

/// Convenience function for quick gradient checking
pub fn check_gradients<T, F, G>(
    input: &Tensor<T>,
    loss: F,
    gradient: G,
    config: &GradientCheckConfig,
) -> Result<GradientCheckResult>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
    F: Fn(&Tensor<T>) -> Result<T>,
    G: Fn(&Tensor<T>) -> Result<Tensor<T>>,
{
    NumericalGradientChecker::new(config.clone()).check(input, loss, gradient)
}
