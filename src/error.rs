use miette::Diagnostic;
use thiserror::Error;

use camino::Utf8PathBuf;

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("invalid organism name: {0:?}")]
    InvalidOrganism(String),

    #[error("invalid marker/gene name: {0:?}")]
    InvalidMarker(String),

    #[error("invalid page size: {0} (must be at least 1)")]
    InvalidPageSize(u64),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid E-utilities endpoint {url:?}: {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("E-utilities request failed: {0}")]
    EutilsHttp(String),

    #[error("E-utilities returned status {status}: {message}")]
    EutilsStatus { status: u16, message: String },

    #[error("{schema} XML parse error: {message}")]
    XmlParse {
        schema: &'static str,
        message: String,
    },

    #[error("failed to write output: {0}")]
    Output(String),
}

impl QueryError {
    pub(crate) fn xml(schema: &'static str, message: impl Into<String>) -> Self {
        QueryError::XmlParse {
            schema,
            message: message.into(),
        }
    }

    pub(crate) fn output(err: std::io::Error) -> Self {
        QueryError::Output(err.to_string())
    }

    /// Network and HTTP status failures, as opposed to decode or configuration errors.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            QueryError::EutilsHttp(_) | QueryError::EutilsStatus { .. }
        )
    }
}
