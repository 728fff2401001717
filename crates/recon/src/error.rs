use std::fmt;

#[derive(Debug)]
pub enum TaxalignError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty registry URL, zero batch size, etc.).
    ConfigValidation(String),
    /// Missing required column in a tabular input.
    MissingColumn { source: String, column: String },
    /// Catalog Source could not produce its name list.
    Catalog(String),
    /// IO error (file read, TSV write, etc.).
    Io(String),
}

impl fmt::Display for TaxalignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { source, column } => {
                write!(f, "{source}: missing column '{column}'")
            }
            Self::Catalog(msg) => write!(f, "catalog error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for TaxalignError {}

/// Failure reported by a Taxonomic Registry implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Credential rejected (401/403).
    Auth(String),
    /// Request rejected by the registry (400 and other non-retryable 4xx).
    Rejected { status: u16, message: String },
    /// Rate limited after the retry budget was spent.
    RateLimited { attempts: u32 },
    /// 5xx or network failure after the retry budget was spent.
    Upstream(String),
    /// Response body did not have the expected shape.
    Decode(String),
    /// The batch deadline passed before the request could succeed.
    DeadlineExceeded { attempts: u32 },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(msg) => write!(f, "registry auth failed: {msg}"),
            Self::Rejected { status, message } => {
                write!(f, "registry rejected request ({status}): {message}")
            }
            Self::RateLimited { attempts } => {
                write!(f, "registry rate limited after {attempts} attempts")
            }
            Self::Upstream(msg) => write!(f, "registry upstream error: {msg}"),
            Self::Decode(msg) => write!(f, "registry response malformed: {msg}"),
            Self::DeadlineExceeded { attempts } => {
                write!(f, "batch timeout expired during lookup ({attempts} attempts)")
            }
        }
    }
}

impl std::error::Error for RegistryError {}
