//! Scalar functions on the spatial domain, as they appear in coefficient fields and right-hand sides.
use nalgebra::{Point2, Vector2};
use std::f64::consts::PI;
use std::fmt;
use std::fmt::Debug;

pub trait SpatialFunction: Debug + Send + Sync {
    fn eval(&self, x: &Point2<f64>) -> f64;

    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantFunction(pub f64);

impl SpatialFunction for ConstantFunction {
    fn eval(&self, _x: &Point2<f64>) -> f64 {
        self.0
    }

    fn gradient(&self, _x: &Point2<f64>) -> Vector2<f64> {
        Vector2::zeros()
    }
}

/// The separable mode $A \cos(2 \pi k_1 x_1) \cos(2 \pi k_2 x_2)$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosineMode {
    pub amplitude: f64,
    pub frequencies: [f64; 2],
}

impl SpatialFunction for CosineMode {
    fn eval(&self, x: &Point2<f64>) -> f64 {
        let [k1, k2] = self.frequencies;
        self.amplitude * (2.0 * PI * k1 * x.x).cos() * (2.0 * PI * k2 * x.y).cos()
    }

    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64> {
        let [k1, k2] = self.frequencies;
        let (w1, w2) = (2.0 * PI * k1, 2.0 * PI * k2);
        Vector2::new(
            -self.amplitude * w1 * (w1 * x.x).sin() * (w2 * x.y).cos(),
            -self.amplitude * w2 * (w1 * x.x).cos() * (w2 * x.y).sin(),
        )
    }
}

/// A function given by closures for its value and gradient.
pub struct FnFunction<F, G> {
    value: F,
    gradient: G,
}

impl<F, G> FnFunction<F, G>
where
    F: Fn(&Point2<f64>) -> f64 + Send + Sync,
    G: Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync,
{
    pub fn new(value: F, gradient: G) -> Self {
        Self { value, gradient }
    }
}

impl<F, G> Debug for FnFunction<F, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFunction").finish_non_exhaustive()
    }
}

impl<F, G> SpatialFunction for FnFunction<F, G>
where
    F: Fn(&Point2<f64>) -> f64 + Send + Sync,
    G: Fn(&Point2<f64>) -> Vector2<f64> + Send + Sync,
{
    fn eval(&self, x: &Point2<f64>) -> f64 {
        (self.value)(x)
    }

    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64> {
        (self.gradient)(x)
    }
}
