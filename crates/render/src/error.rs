use crate::config::ConfigError;
use crate::targets::TargetError;

/// Errors surfaced by [`crate::FogOfWar`].
#[derive(Debug, thiserror::Error)]
pub enum FogError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("scratch target bookkeeping failed: {0}")]
    Target(#[from] TargetError),

    #[error("render backend failed: {0}")]
    Backend(String),

    #[error("fog of war is not active")]
    NotActive,
}

impl FogError {
    pub(crate) fn backend(err: impl std::error::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
