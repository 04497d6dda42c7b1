use crate::translator::Format;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between a raw identifier and a parsed record.
///
/// Missing metadata fields are not errors; they surface as `None` on the record.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The document could not be parsed as the format it was declared to be.
    #[error("malformed {format} document: {message}")]
    MalformedDocument { format: Format, message: String },

    /// No parser is registered for the declared content type.
    #[error("unsupported content type: {0:?}")]
    UnsupportedFormat(String),

    /// The resolver answered 200 but ignored content negotiation.
    #[error("expected a JSON or XML response, got content type {0:?}")]
    ContentTypeMismatch(Option<String>),

    #[error("no HTTP backend configured for the resolver")]
    NoBackendConfigured,

    #[error("not a valid DOI: {0:?}")]
    InvalidIdentifier(String),

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub(crate) fn malformed(format: Format, message: impl ToString) -> Self {
        Error::MalformedDocument {
            format,
            message: message.to_string(),
        }
    }
}
