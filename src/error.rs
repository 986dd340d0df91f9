//! Error types for the SOAP engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding, decoding or signing SOAP messages.
///
/// Errors raised by the XML parser, the underlying reader and the numeric
/// parsers are carried unchanged so callers can still match on them.
#[derive(Error, Debug)]
pub enum SoapError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),

    #[error(transparent)]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error(transparent)]
    ParseBool(#[from] std::str::ParseBoolError),

    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("envelope content or fault pointer empty")]
    EnvelopeMisconfigured,

    #[error("fault detail element present but no type supplied")]
    FaultDetailNotSpecified,

    #[error("unable to sign, envelope is empty")]
    EmptyEnvelope,

    #[error("XML document has no root element")]
    EmptyDocument,

    #[error("XML document ended inside <{0}>")]
    UnexpectedEof(String),

    #[error("expected element <{expected}>, found <{found}>")]
    UnexpectedElement { expected: String, found: String },

    #[error("multi-part body is empty")]
    MultipartBodyEmpty,

    #[error("malformed multi-part body: {0}")]
    Multipart(String),

    #[error("multi-part message does not start with a single application/xop+xml part")]
    MissingXopPart,

    #[error("multi-part part {content_id} exceeds {limit} bytes")]
    PartTooLarge { content_id: String, limit: usize },

    #[error("invalid XOP include path (should start with Body): {0}")]
    InvalidIncludePath(String),

    #[error("no field found for path {0}")]
    FieldNotFound(String),

    #[error("field for path {0} is not a byte array")]
    FieldNotArray(String),

    #[error("invalid path to canonicalize: {0:?}")]
    InvalidCanonicalizationPath(String),

    #[error("unsupported content-type in response: {0}")]
    UnsupportedContentType(String),

    #[error("invalid PEM key specified")]
    InvalidPem,

    #[error("encrypted PEM key specified")]
    EncryptedPem,

    #[error(transparent)]
    Pkcs1(#[from] rsa::pkcs1::Error),

    #[error(transparent)]
    Rsa(#[from] rsa::Error),
}

impl SoapError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EnvelopeMisconfigured | Self::FaultDetailNotSpecified | Self::EmptyEnvelope => {
                ErrorKind::Configuration
            }
            Self::Xml(_)
            | Self::Io(_)
            | Self::ParseInt(_)
            | Self::ParseFloat(_)
            | Self::ParseBool(_)
            | Self::Utf8(_)
            | Self::EmptyDocument
            | Self::UnexpectedEof(_)
            | Self::UnexpectedElement { .. }
            | Self::Multipart(_) => ErrorKind::MalformedInput,
            Self::MultipartBodyEmpty
            | Self::MissingXopPart
            | Self::PartTooLarge { .. }
            | Self::InvalidIncludePath(_)
            | Self::FieldNotFound(_)
            | Self::FieldNotArray(_)
            | Self::InvalidCanonicalizationPath(_)
            | Self::UnsupportedContentType(_) => ErrorKind::Protocol,
            Self::InvalidPem | Self::EncryptedPem | Self::Pkcs1(_) | Self::Rsa(_) => {
                ErrorKind::Crypto
            }
        }
    }
}

/// Broad classes of [`SoapError`]. None of them are retried by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Destinations or key material missing before the call
    Configuration,
    /// The input could not be parsed
    MalformedInput,
    /// The input parsed but has an unsupported or inconsistent shape
    Protocol,
    /// Key material or signing failure
    Crypto,
}

impl ErrorKind {
    /// Get the string code for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::MalformedInput => "MALFORMED_INPUT",
            Self::Protocol => "PROTOCOL",
            Self::Crypto => "CRYPTO",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = SoapError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::Configuration.as_str(), "CONFIGURATION");
        assert_eq!(ErrorKind::MalformedInput.as_str(), "MALFORMED_INPUT");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(SoapError::EnvelopeMisconfigured.kind(), ErrorKind::Configuration);
        assert_eq!(SoapError::FaultDetailNotSpecified.kind(), ErrorKind::Configuration);
        assert_eq!(SoapError::MissingXopPart.kind(), ErrorKind::Protocol);
        assert_eq!(SoapError::FieldNotArray("Body".into()).kind(), ErrorKind::Protocol);
        assert_eq!(SoapError::EncryptedPem.kind(), ErrorKind::Crypto);

        let parse = "x".parse::<i32>().unwrap_err();
        assert_eq!(SoapError::from(parse).kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_parse_errors_are_transparent() {
        let parse = "x".parse::<i32>().unwrap_err();
        let message = parse.to_string();
        assert_eq!(SoapError::from(parse).to_string(), message);
    }
}
