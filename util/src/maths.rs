//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Return the euclidian norm of a vector given by its components.
pub fn magnitude<T>(components: &[T]) -> T
where
    T: Float,
{
    components
        .iter()
        .fold(T::zero(), |sum, c| sum + c.powi(2))
        .sqrt()
}

/// Arc cosine in degrees. The cosine is clamped into `[-1, 1]` first as rounding can push it just
/// outside.
pub fn acos_deg<T>(cosine: T) -> T
where
    T: Float,
{
    cosine.max(-T::one()).min(T::one()).acos().to_degrees()
}

#[cfg(test)]
mod test {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_magnitude() {
        assert_eq!(magnitude(&[3f64, 4f64]), 5f64);
        assert_eq!(magnitude::<f64>(&[]), 0f64);
        assert!(approx_eq(magnitude(&[1f64, 1f64, 1f64]), 3f64.sqrt(), 1e-12));
    }

    #[test]
    fn test_acos_deg() {
        assert!(approx_eq(acos_deg(0f64), 90f64, 1e-12));
        assert!(approx_eq(acos_deg(1.0000000001f64), 0f64, 1e-12));
        assert!(approx_eq(acos_deg(-1.5f64), 180f64, 1e-12));
    }
}
