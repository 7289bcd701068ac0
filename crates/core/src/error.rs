use crate::AssetHandle;

/// Result alias that carries the custom [`EffectError`] type.
pub type Result<T> = std::result::Result<T, EffectError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    /// An effect or playback was requested for a recording that does not exist.
    #[error("no recording available at `{0}`")]
    AssetMissing(AssetHandle),
    /// A playback instance could not bind to the asset.
    #[error("failed to prepare playback of `{asset}`: {reason}")]
    Prepare { asset: AssetHandle, reason: String },
    /// A playback instance failed to start or errored mid-playback.
    #[error("playback failed: {0}")]
    Playback(String),
    /// The host could not apply the requested speed/pitch. Never fatal.
    #[error("host cannot apply speed {speed} with pitch {pitch}")]
    UnsupportedRate { speed: f32, pitch: f32 },
    #[error("unknown effect `{0}`")]
    UnknownEffect(String),
    #[error("invalid effect catalog: {0}")]
    InvalidCatalog(String),
    #[error("recording failed: {0}")]
    Record(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl EffectError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Whether the failure should abort the operation that produced it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnsupportedRate { .. })
    }
}

impl From<&str> for EffectError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for EffectError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
