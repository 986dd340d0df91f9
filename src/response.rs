//! Inbound SOAP responses.

use crate::config::XopConfig;
use crate::envelope::Envelope;
use crate::error::{Result, SoapError};
use crate::path::Addressable;
use crate::xml::XmlDecode;
use crate::xop::XopDecoder;
use std::collections::HashMap;
use std::io::BufRead;
use tracing::debug;

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaType {
    /// Lowercased `type/subtype`
    pub essence: String,
    /// Parameters with lowercased names and unquoted values
    pub params: HashMap<String, String>,
}

impl MediaType {
    pub fn new(essence: &str) -> Self {
        Self {
            essence: essence.trim().to_ascii_lowercase(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parse a header value leniently: malformed parameters are skipped.
    pub fn parse(value: &str) -> Self {
        let mut fields = split_unquoted(value).into_iter();
        let mut media_type = Self::new(&fields.next().unwrap_or_default());

        for field in fields {
            if let Some((name, value)) = field.split_once('=') {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                media_type = media_type.with_param(name.trim(), value);
            }
        }
        media_type
    }

    pub fn is_multipart(&self) -> bool {
        self.essence.starts_with("multipart/")
    }
}

// Split on `;` outside double quotes.
fn split_unquoted(value: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in value.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ';' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Decode a response body into `envelope` according to its media type.
///
/// `multipart/*` bodies go through the XOP decoder (using the `boundary`
/// parameter), `text/xml` bodies straight into the envelope.
pub fn decode_response<R, C, D>(
    media_type: &MediaType,
    reader: R,
    envelope: &mut Envelope<C, D>,
    config: &XopConfig,
) -> Result<()>
where
    R: BufRead,
    C: XmlDecode + Addressable,
    D: XmlDecode,
{
    if media_type.is_multipart() {
        let boundary = media_type
            .param("boundary")
            .ok_or_else(|| SoapError::Multipart("missing boundary parameter".to_string()))?;
        debug!(boundary, "Decoding multipart response");
        XopDecoder::with_config(reader, boundary, config).decode(envelope)
    } else if media_type.essence.contains("text/xml") {
        envelope.read_from(reader)
    } else {
        Err(SoapError::UnsupportedContentType(media_type.essence.clone()))
    }
}
