use nalgebra::DVector;

/// Approx assertion for scalars with a tolerance relative to the magnitude of the operands.
#[macro_export]
macro_rules! assert_scalar_rel_eq {
    ($x:expr, $y:expr, reltol = $tol:expr) => {{
        let (x, y): (f64, f64) = ($x, $y);
        let scale = f64::max(1.0, f64::max(x.abs(), y.abs()));
        if (x - y).abs() > $tol * scale {
            panic!(
                "assert_scalar_rel_eq failed: left = {:e}, right = {:e}, reltol = {:e}",
                x, y, $tol
            );
        }
    }};
}

/// Returns `|x - y| / max(|y|, eps)` for vectors of equal length.
pub fn relative_difference(x: &DVector<f64>, y: &DVector<f64>) -> f64 {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length.");
    (x - y).norm() / y.norm().max(f64::EPSILON)
}

/// Returns whether the sequence is sorted in non-increasing order.
pub fn is_non_increasing(values: &[usize]) -> bool {
    values.windows(2).all(|w| w[0] >= w[1])
}
