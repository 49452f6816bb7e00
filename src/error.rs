//! Error types shared by the stochastic Galerkin machinery.
use crate::multi_index::Multiindex;
use core::fmt;

/// Errors produced by the stochastic Galerkin core.
///
/// Failures of the finite element and mesh backends are carried unchanged in
/// [`Error::Backend`]. Non-convergence of the iterative solver is *not* an error, see
/// [`PcgOutput`](crate::pcg::PcgOutput).
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid parameters, detected at construction or call time.
    Configuration(String),
    /// A coefficient field term or an indicator array outside of the available range.
    Dimension { requested: usize, available: usize },
    /// The multi-index is not active in the multivector.
    MissingIndex(Multiindex),
    /// Vector-space operation between vectors living on different bases.
    BasisMismatch,
    /// Vector-space operation between multivectors with different active sets.
    ActiveSetMismatch,
    IndefiniteOperator,
    IndefinitePreconditioner,
    Backend(eyre::Report),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(message) => write!(f, "Invalid configuration: {}", message),
            Self::Dimension { requested, available } => {
                write!(f, "Index {} out of range (available: {})", requested, available)
            }
            Self::MissingIndex(mu) => write!(f, "Multi-index {} is not active", mu),
            Self::BasisMismatch => write!(f, "Vectors are defined on different bases"),
            Self::ActiveSetMismatch => write!(f, "Multivectors have different active sets"),
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::Backend(report) => write!(f, "Backend failure: {}", report),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(report) => Some(&**report),
            _ => None,
        }
    }
}

impl From<eyre::Report> for Error {
    fn from(report: eyre::Report) -> Self {
        Self::Backend(report)
    }
}

/// Checks that a bulk parameter lies in `(0, 1]`.
pub(crate) fn check_theta(name: &str, theta: f64) -> Result<()> {
    if theta > 0.0 && theta <= 1.0 {
        Ok(())
    } else {
        Err(Error::configuration(format!("{} must lie in (0, 1], got {}", name, theta)))
    }
}
