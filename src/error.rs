use thiserror::Error;

/// Everything that can abort a decode pass.
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("not a compound file: identifier bytes do not match")]
    FormatMismatch,

    #[error("truncated input while reading {context}")]
    TruncatedInput { context: String },

    #[error("sector chain integrity: {0}")]
    ChainIntegrity(String),

    #[error("unsupported {kind} sector size exponent: {shift}")]
    UnsupportedSectorSize { kind: &'static str, shift: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CfbError {
    /// "Not this format" is the only error a caller may want to shrug off.
    pub fn is_format_mismatch(&self) -> bool {
        matches!(self, CfbError::FormatMismatch)
    }

    /// Map an I/O failure to `TruncatedInput` when it is an early EOF.
    pub(crate) fn from_read(err: std::io::Error, context: impl Into<String>) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            CfbError::TruncatedInput {
                context: context.into(),
            }
        } else {
            CfbError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, CfbError>;
