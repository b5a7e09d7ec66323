use crate::client::ClientError;

/// Result alias that carries the custom [`SceneError`] type.
pub type Result<T> = std::result::Result<T, SceneError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// Free-form failure raised by scene setup or by embedders composing the
    /// engine with their own collaborators.
    #[error("{0}")]
    Message(String),
    /// The device-control client rejected a call that was not part of a
    /// regular dispatch (for example a group lookup during init).
    #[error("device client error: {0}")]
    Client(#[from] ClientError),
    /// Pure black has no chromaticity: X+Y+Z is zero.
    #[error("color ({r}, {g}, {b}) has no chromaticity")]
    DegenerateColor { r: f32, g: f32, b: f32 },
    /// A traversal was requested over a sequence with no steps.
    #[error("cannot traverse an empty sequence")]
    EmptySequence,
    /// A color string could not be parsed.
    #[error("invalid color `{0}`")]
    InvalidColor(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl SceneError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SceneError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SceneError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
