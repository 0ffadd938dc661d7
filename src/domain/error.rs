//! Domain error types.

/// A rule or indicator parse failure.
///
/// `fragment` is the offending substring, `position` its byte offset in the
/// full rule text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message} (in '{fragment}')")]
pub struct ParseError {
    pub message: String,
    pub fragment: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, fragment: &str, position: usize) -> Self {
        Self {
            message: message.into(),
            fragment: fragment.to_string(),
            position,
        }
    }

    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for quantlab.
#[derive(Debug, thiserror::Error)]
pub enum QuantError {
    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("unknown indicator: {name}")]
    UnknownIndicator { name: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("data alignment error: {reason}")]
    DataAlignment { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {symbol} at {frequency}")]
    NoData { symbol: String, frequency: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuantError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        QuantError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn alignment(reason: impl Into<String>) -> Self {
        QuantError::DataAlignment {
            reason: reason.into(),
        }
    }
}

impl From<&QuantError> for std::process::ExitCode {
    fn from(err: &QuantError) -> Self {
        let code: u8 = match err {
            QuantError::Io(_) | QuantError::Json(_) => 1,
            QuantError::ConfigParse { .. }
            | QuantError::ConfigMissing { .. }
            | QuantError::ConfigInvalid { .. }
            | QuantError::Configuration { .. } => 2,
            QuantError::RuleParse(_) | QuantError::UnknownIndicator { .. } => 4,
            QuantError::NoData { .. } | QuantError::Data { .. } | QuantError::DataAlignment { .. } => {
                5
            }
        };
        std::process::ExitCode::from(code)
    }
}
