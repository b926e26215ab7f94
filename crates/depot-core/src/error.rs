//! Core error types.

/// Errors raised while parsing coordinates or repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The raw path does not match the layout's grammar.
    #[error("malformed {layout} coordinate '{path}': {detail}")]
    MalformedCoordinate {
        layout: String,
        path: String,
        detail: String,
    },

    /// Layout identifier not recognised.
    #[error("unknown layout: {0}")]
    UnknownLayout(String),

    /// A group member reference could not be parsed.
    #[error("invalid repository reference '{reference}': {detail}")]
    InvalidReference { reference: String, detail: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
