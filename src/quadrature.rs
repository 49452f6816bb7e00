//! Quadrature rules on the reference triangle and the reference segment.
use nalgebra::{Point1, Point2};

pub type QuadraturePair2d = (Vec<f64>, Vec<Point2<f64>>);
pub type QuadraturePair1d = (Vec<f64>, Vec<Point1<f64>>);

/// Three-point rule on the reference triangle $(0, 0), (1, 0), (0, 1)$, exact for quadratics.
///
/// The weights sum to the area of the reference triangle, $1/2$.
pub fn tri_strength_2() -> QuadraturePair2d {
    let weights = vec![1.0 / 6.0; 3];
    let points = vec![
        Point2::new(1.0 / 6.0, 1.0 / 6.0),
        Point2::new(2.0 / 3.0, 1.0 / 6.0),
        Point2::new(1.0 / 6.0, 2.0 / 3.0),
    ];
    (weights, points)
}

/// Two-point Gauss rule on the reference segment $[0, 1]$, exact for cubics.
pub fn segment_gauss_2() -> QuadraturePair1d {
    let offset = 3.0_f64.sqrt() / 6.0;
    let weights = vec![0.5, 0.5];
    let points = vec![Point1::new(0.5 - offset), Point1::new(0.5 + offset)];
    (weights, points)
}

/// Integrates `f` over the triangle with the given vertices, using the reference rule.
pub fn integrate_over_triangle<F>(vertices: &[Point2<f64>; 3], quadrature: &QuadraturePair2d, mut f: F) -> f64
where
    F: FnMut(&Point2<f64>) -> f64,
{
    let [a, b, c] = vertices;
    let (e1, e2) = (b - a, c - a);
    let jacobian_det = e1.perp(&e2).abs();
    let (weights, points) = quadrature;
    weights
        .iter()
        .zip(points)
        .map(|(w, xi)| {
            let x = a + e1 * xi.x + e2 * xi.y;
            w * f(&x)
        })
        .sum::<f64>()
        * jacobian_det
}

/// Integrates `f` over the segment between `a` and `b`, using the reference rule.
pub fn integrate_over_segment<F>(a: &Point2<f64>, b: &Point2<f64>, quadrature: &QuadraturePair1d, mut f: F) -> f64
where
    F: FnMut(&Point2<f64>) -> f64,
{
    let t = b - a;
    let (weights, points) = quadrature;
    weights
        .iter()
        .zip(points)
        .map(|(w, s)| w * f(&(a + t * s.x)))
        .sum::<f64>()
        * t.norm()
}
