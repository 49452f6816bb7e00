//! Expansions of random coefficient fields.
//!
//! A coefficient field is the affine expansion
//!
//! $$ a(x, y) = a_0(x) + \sum_{m \geq 1} a_m(x) y_m $$
//!
//! where $a_0$ is the deterministic mean and the $y_m$ are independent random variables.
//! Terms are addressed by index, with index `0` denoting the mean paired with a
//! [`DeterministicRV`].
use crate::error::{Error, Result};
use crate::function::{ConstantFunction, CosineMode, SpatialFunction};
use crate::multi_index::Multiindex;
use crate::random_variable::{DeterministicRV, RandomVariable, UniformRV};
use nalgebra::Point2;
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A spatial function together with its random variable.
pub type Term = (Arc<dyn SpatialFunction>, Arc<dyn RandomVariable>);

/// Produces the term with the given (one-based) index of a parametric expansion.
pub type TermGenerator = dyn Fn(usize) -> Term + Send + Sync;

/// Expansion with an explicit, finite list of terms.
#[derive(Debug, Clone)]
pub struct ListCoefficientField {
    mean: Arc<dyn SpatialFunction>,
    terms: Vec<Term>,
}

/// Expansion with infinitely many terms which are generated on demand.
///
/// Generated terms are memoized, so the generator is called at most once per index.
pub struct ParametricCoefficientField {
    mean: Arc<dyn SpatialFunction>,
    generator: Arc<TermGenerator>,
    generated: RwLock<Vec<Term>>,
}

impl fmt::Debug for ParametricCoefficientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParametricCoefficientField")
            .field("mean", &self.mean)
            .field("num_generated", &self.generated.read().len())
            .finish()
    }
}

impl ParametricCoefficientField {
    fn term(&self, m: usize) -> Term {
        debug_assert!(m >= 1);
        if let Some(term) = self.generated.read().get(m - 1) {
            return term.clone();
        }
        let mut generated = self.generated.write();
        while generated.len() < m {
            let next = generated.len() + 1;
            generated.push((self.generator)(next));
        }
        generated[m - 1].clone()
    }
}

#[derive(Debug)]
pub enum CoefficientField {
    List(ListCoefficientField),
    Parametric(ParametricCoefficientField),
}

impl CoefficientField {
    /// Creates a finite expansion from the mean and lists of functions and random variables.
    ///
    /// The lists must have equal length.
    pub fn from_list(
        mean: Arc<dyn SpatialFunction>,
        funcs: Vec<Arc<dyn SpatialFunction>>,
        rvs: Vec<Arc<dyn RandomVariable>>,
    ) -> Result<Self> {
        if funcs.len() != rvs.len() {
            return Err(Error::configuration(format!(
                "number of functions ({}) and random variables ({}) must agree",
                funcs.len(),
                rvs.len()
            )));
        }
        Ok(Self::List(ListCoefficientField {
            mean,
            terms: funcs.into_iter().zip(rvs).collect(),
        }))
    }

    /// Creates a finite expansion in which every term shares the same random variable.
    pub fn from_list_with_iid_rvs(
        mean: Arc<dyn SpatialFunction>,
        funcs: Vec<Arc<dyn SpatialFunction>>,
        rv: Arc<dyn RandomVariable>,
    ) -> Self {
        Self::List(ListCoefficientField {
            mean,
            terms: funcs.into_iter().map(|func| (func, rv.clone())).collect(),
        })
    }

    pub fn parametric<G>(mean: Arc<dyn SpatialFunction>, generator: G) -> Self
    where
        G: Fn(usize) -> Term + Send + Sync + 'static,
    {
        Self::Parametric(ParametricCoefficientField {
            mean,
            generator: Arc::new(generator),
            generated: RwLock::new(Vec::new()),
        })
    }

    pub fn parametric_with_iid_rvs<F>(mean: Arc<dyn SpatialFunction>, func: F, rv: Arc<dyn RandomVariable>) -> Self
    where
        F: Fn(usize) -> Arc<dyn SpatialFunction> + Send + Sync + 'static,
    {
        Self::parametric(mean, move |m| (func(m), rv.clone()))
    }

    /// The cosine expansion on the unit square.
    ///
    /// Term $m$ is $\bar\alpha m^{-\sigma} \cos(2\pi s \beta_1(m) x_1) \cos(2\pi s \beta_2(m) x_2)$
    /// with uniform random variables on $[-1, 1]$ and mean $a_0 = 1$. The frequencies
    /// $\beta_1, \beta_2$ enumerate the pairs of non-negative integers along anti-diagonals.
    /// With `num_terms = None` the expansion is unbounded.
    pub fn cosine_expansion(decay: f64, amplitude: f64, freq_scale: f64, num_terms: Option<usize>) -> Self {
        let mean: Arc<dyn SpatialFunction> = Arc::new(ConstantFunction(1.0));
        let rv: Arc<dyn RandomVariable> = Arc::new(UniformRV::default());
        let mode = move |m: usize| -> Arc<dyn SpatialFunction> {
            let k = (-0.5 + (0.25 + 2.0 * m as f64).sqrt()).floor();
            let beta1 = m as f64 - k * (k + 1.0) / 2.0;
            let beta2 = k - beta1;
            Arc::new(CosineMode {
                amplitude: amplitude * (m as f64).powf(-decay),
                frequencies: [freq_scale * beta1, freq_scale * beta2],
            })
        };
        match num_terms {
            Some(n) => Self::from_list_with_iid_rvs(mean, (1..=n).map(mode).collect(), rv),
            None => Self::parametric_with_iid_rvs(mean, mode, rv),
        }
    }

    /// The number of terms including the mean, or `None` for unbounded expansions.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::List(field) => Some(field.terms.len() + 1),
            Self::Parametric(_) => None,
        }
    }

    /// Whether the field has no random terms, i.e. it is deterministic.
    pub fn is_deterministic(&self) -> bool {
        self.len() == Some(1)
    }

    pub fn mean(&self) -> &Arc<dyn SpatialFunction> {
        match self {
            Self::List(field) => &field.mean,
            Self::Parametric(field) => &field.mean,
        }
    }

    /// Returns term `m`, where term `0` is the mean.
    pub fn term(&self, m: usize) -> Result<Term> {
        if m == 0 {
            return Ok((self.mean().clone(), Arc::new(DeterministicRV::default())));
        }
        match self {
            Self::List(field) => field.terms.get(m - 1).cloned().ok_or(Error::Dimension {
                requested: m,
                available: field.terms.len() + 1,
            }),
            Self::Parametric(field) => Ok(field.term(m)),
        }
    }

    /// The random variable of term `m`.
    pub fn rv(&self, m: usize) -> Result<Arc<dyn RandomVariable>> {
        Ok(self.term(m)?.1)
    }

    /// Draws one sample for each of the random variables $y_1, \dots, y_n$.
    pub fn sample_rvs(&self, rng: &mut dyn RngCore, n: usize) -> Result<Vec<f64>> {
        (1..=n)
            .map(|m| Ok(self.rv(m)?.sample(rng, 1)[0]))
            .collect()
    }

    /// Evaluates the realization $a(x, y)$ for the given parameters $y_1, y_2, \dots$.
    pub fn evaluate(&self, x: &Point2<f64>, y: &[f64]) -> Result<f64> {
        let mut value = self.mean().eval(x);
        for (m, y_m) in y.iter().enumerate() {
            let (func, _) = self.term(m + 1)?;
            value += func.eval(x) * y_m;
        }
        Ok(value)
    }

    /// Evaluates the chaos polynomial $P_\mu(y) = \prod_k p_{\mu_k}(y_k)$ for every given index.
    ///
    /// Component `k` of a multi-index refers to the random variable of term `k + 1`,
    /// evaluated at `y[k]`.
    pub fn sample_realization<'a>(
        &self,
        indices: impl IntoIterator<Item = &'a Multiindex>,
        y: &[f64],
    ) -> Result<BTreeMap<Multiindex, f64>> {
        let mut weights = BTreeMap::new();
        for mu in indices {
            if mu.len() > y.len() {
                return Err(Error::Dimension {
                    requested: mu.len(),
                    available: y.len(),
                });
            }
            let mut weight = 1.0;
            for (k, &degree) in mu.as_slice().iter().enumerate() {
                weight *= self.rv(k + 1)?.evaluate_polynomial(degree, y[k]);
            }
            weights.insert(mu.clone(), weight);
        }
        Ok(weights)
    }
}
