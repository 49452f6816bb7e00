//! Adaptive stochastic Galerkin finite element methods for elliptic problems with random
//! coefficients.
//!
//! The solution is represented as a [`MultiVector`](multi_vector::MultiVector): one piecewise
//! linear finite element function per active multi-index of a polynomial chaos expansion. An
//! [`AdaptiveSolver`](adaptive::AdaptiveSolver) alternately solves the coupled Galerkin system
//! with [`pcg`](pcg::pcg), estimates the error with a residual estimator and refines the spatial
//! meshes and the active set of multi-indices.
pub mod adaptive;
pub mod coefficient_field;
pub mod error;
pub mod estimator;
pub mod fem;
pub mod function;
pub mod marking;
pub mod mesh;
pub mod multi_index;
pub mod multi_operator;
pub mod multi_vector;
pub mod pcg;
pub mod quadrature;
pub mod random_variable;
pub mod sampling;
pub mod util;

pub mod io {
    pub mod msh;

    pub use msh::{load_msh_from_bytes, load_msh_from_file};
}

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use error::{Error, Result};

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
