//! Random variables and their orthonormal polynomial families.
//!
//! Every random variable $Y$ is associated with the polynomials $p_n$ which are orthonormal
//! with respect to the distribution of $Y$. They satisfy the three-term recurrence
//!
//! $$ y\,p_n(y) = \beta_{n+1} p_{n+1}(y) + \alpha_n p_n(y) + \beta_n p_{n-1}(y), $$
//!
//! with $\beta_0 = 0$ and $p_0 = 1$. The coefficients $\alpha_n, \beta_n$ are exactly what is
//! needed to couple neighboring multi-indices in the stochastic Galerkin operator.
use rand::RngCore;
use rand_distr::{Distribution, Normal, Uniform};
use std::fmt::Debug;

pub trait RandomVariable: Debug + Send + Sync {
    /// Draws `n` independent samples.
    fn sample(&self, rng: &mut dyn RngCore, n: usize) -> Vec<f64>;

    /// The recurrence coefficient $\alpha_n$.
    fn alpha(&self, n: usize) -> f64;

    /// The recurrence coefficient $\beta_n$, with $\beta_0 = 0$.
    fn beta(&self, n: usize) -> f64;

    /// Evaluates the orthonormal polynomial $p_n(y)$ by running the recurrence.
    fn evaluate_polynomial(&self, n: usize, y: f64) -> f64 {
        let mut p_prev = 0.0;
        let mut p = 1.0;
        for k in 0..n {
            let beta_next = self.beta(k + 1);
            if beta_next == 0.0 {
                return 0.0;
            }
            let p_next = ((y - self.alpha(k)) * p - self.beta(k) * p_prev) / beta_next;
            p_prev = p;
            p = p_next;
        }
        p
    }
}

/// A uniformly distributed random variable on $[a, b]$ (orthonormal Legendre polynomials).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformRV {
    a: f64,
    b: f64,
}

impl UniformRV {
    /// # Panics
    ///
    /// Panics if `a >= b`.
    pub fn new(a: f64, b: f64) -> Self {
        assert!(a < b, "Interval must be non-empty.");
        Self { a, b }
    }

    fn center(&self) -> f64 {
        0.5 * (self.a + self.b)
    }

    fn half_width(&self) -> f64 {
        0.5 * (self.b - self.a)
    }
}

impl Default for UniformRV {
    fn default() -> Self {
        Self::new(-1.0, 1.0)
    }
}

impl RandomVariable for UniformRV {
    fn sample(&self, rng: &mut dyn RngCore, n: usize) -> Vec<f64> {
        let distribution = Uniform::new_inclusive(self.a, self.b);
        (0..n).map(|_| distribution.sample(rng)).collect()
    }

    fn alpha(&self, _n: usize) -> f64 {
        self.center()
    }

    fn beta(&self, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        self.half_width() * n / (4.0 * n * n - 1.0).sqrt()
    }
}

/// A normally distributed random variable (orthonormal Hermite polynomials).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalRV {
    mu: f64,
    sigma: f64,
}

impl NormalRV {
    /// # Panics
    ///
    /// Panics if `sigma` is not positive.
    pub fn new(mu: f64, sigma: f64) -> Self {
        assert!(sigma > 0.0, "Standard deviation must be positive.");
        Self { mu, sigma }
    }
}

impl Default for NormalRV {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl RandomVariable for NormalRV {
    fn sample(&self, rng: &mut dyn RngCore, n: usize) -> Vec<f64> {
        let distribution = Normal::new(self.mu, self.sigma).expect("sigma is positive by construction");
        (0..n).map(|_| distribution.sample(rng)).collect()
    }

    fn alpha(&self, _n: usize) -> f64 {
        self.mu
    }

    fn beta(&self, n: usize) -> f64 {
        self.sigma * (n as f64).sqrt()
    }
}

/// A degenerate random variable that always takes the same value.
///
/// Associated implicitly with the mean term of a coefficient field. Only $p_0$ is defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeterministicRV {
    value: f64,
}

impl DeterministicRV {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Default for DeterministicRV {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RandomVariable for DeterministicRV {
    fn sample(&self, _rng: &mut dyn RngCore, n: usize) -> Vec<f64> {
        vec![self.value; n]
    }

    fn alpha(&self, _n: usize) -> f64 {
        self.value
    }

    fn beta(&self, _n: usize) -> f64 {
        0.0
    }
}
