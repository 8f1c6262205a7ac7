use crate::cluster::Linkage;
use crate::object::ObjectId;

/// Result alias for `isogloss`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the runner, the distance layer and the analyses.
///
/// Three families matter to callers: configuration errors (detected before
/// any expensive work starts), [`Error::Cancelled`], and computation failures
/// raised while distances or covariance samples are being evaluated.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Vector length mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Found length.
        found: usize,
    },

    /// Invalid number of clusters requested.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// Centroid or Ward linkage requested without covariance-based distances.
    #[error("{linkage:?} linkage requires the covariance distance strategy")]
    IncompatibleLinkage {
        /// The rejected linkage.
        linkage: Linkage,
    },

    /// Location set cannot support a covariance grid.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// A covariance sample was requested against a grid other than the one it
    /// was computed on.
    #[error("covariance sample was computed on a different grid")]
    GridMismatch,

    /// The batch was cancelled through its progress sink.
    #[error("operation cancelled")]
    Cancelled,

    /// A density field cannot be compared (all zero, non-finite, ...).
    #[error("degenerate density for map {object}: {reason}")]
    DegenerateDensity {
        /// The offending map.
        object: ObjectId,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Raised by a [`DensitySurface`](crate::object::DensitySurface).
    #[error("density surface failed: {message}")]
    Surface {
        /// Message from the surface.
        message: String,
    },

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    /// `true` for the distinguished cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// `true` for errors caused by caller configuration rather than by the
    /// computation itself.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::EmptyInput
                | Error::DimensionMismatch { .. }
                | Error::InvalidClusterCount { .. }
                | Error::InvalidParameter { .. }
                | Error::IncompatibleLinkage { .. }
                | Error::DegenerateGeometry(_)
                | Error::GridMismatch
        )
    }
}
