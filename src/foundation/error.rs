/// Convenience result type used across Stratum.
pub type StratumResult<T> = Result<T, StratumError>;

/// Top-level error taxonomy for the boundary APIs.
///
/// Aggregation itself never fails: missing surfaces, reference cycles and stale damage all
/// degrade to best-effort output. Errors only surface where external input enters the crate.
#[derive(thiserror::Error, Debug)]
pub enum StratumError {
    /// A submitted compositor frame is structurally invalid.
    #[error("validation error: {0}")]
    Validation(String),

    /// A surface lifecycle request referenced an unknown or conflicting surface.
    #[error("surface error: {0}")]
    Surface(String),

    /// A scene description could not be turned into surfaces and frames.
    #[error("scene error: {0}")]
    Scene(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StratumError {
    /// Build a [`StratumError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`StratumError::Surface`] value.
    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    /// Build a [`StratumError::Scene`] value.
    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene(msg.into())
    }

    /// Build a [`StratumError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for StratumError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
