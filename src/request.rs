//! Outbound SOAP requests.
//!
//! Transport is left to the caller: a [`Request`] produces the serialized
//! envelope and the HTTP headers to send with it.

use crate::c14n::canonicalize;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::wsse::WsseAuthInfo;
use crate::xml::{Element, XmlEncode};
use std::sync::Arc;
use tracing::debug;

/// Content-Type of a serialized request.
pub const REQUEST_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Default subtree canonicalized before a signed request is sent.
pub const DEFAULT_CANONICALIZATION_ROOT: &str = "Envelope/Body";

/// A single request to a SOAP service.
#[derive(Debug)]
pub struct Request<C> {
    action: String,
    url: String,
    body: C,
    headers: Vec<Element>,
    signer: Option<Arc<WsseAuthInfo>>,
    canonicalization_root: String,
}

impl<C: XmlEncode> Request<C> {
    pub fn new(action: impl Into<String>, url: impl Into<String>, body: C) -> Self {
        Self {
            action: action.into(),
            url: url.into(),
            body,
            headers: Vec::new(),
            signer: None,
            canonicalization_root: DEFAULT_CANONICALIZATION_ROOT.to_string(),
        }
    }

    /// Add an entry to the envelope header. Entries keep their order, and the
    /// security header of a signed request follows them.
    pub fn with_header(mut self, header: impl XmlEncode) -> Self {
        self.headers.push(header.to_element());
        self
    }

    /// Sign the request with WS-Security X.509 credentials.
    pub fn sign_with(mut self, info: Arc<WsseAuthInfo>) -> Self {
        self.signer = Some(info);
        self
    }

    /// Subtree canonicalized after signing, `Envelope/Body` by default.
    pub fn with_canonicalization_root(mut self, root: impl Into<String>) -> Self {
        self.canonicalization_root = root.into();
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &C {
        &self.body
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// HTTP headers to send along with [`Request::serialize`]'s output.
    pub fn http_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", REQUEST_CONTENT_TYPE.to_string()),
            ("SOAPAction", self.action.clone()),
        ]
    }

    /// Serialize the envelope, signing it when credentials are set.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut envelope: Envelope<&C> = Envelope::new(&self.body);
        for header in &self.headers {
            envelope.add_header(header.clone());
        }

        match &self.signer {
            Some(info) => {
                envelope.sign_with(info)?;
                let encoded = canonicalize(&envelope.encode(), &self.canonicalization_root)?;
                debug!(action = %self.action, size = encoded.len(), "Serialized signed request");
                Ok(encoded)
            }
            None => {
                let encoded = envelope.encode();
                debug!(action = %self.action, size = encoded.len(), "Serialized request");
                Ok(encoded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::SOAP_ENV_NS;
    use crate::error::SoapError;

    fn payload() -> Element {
        Element::new("GetPrice")
            .with_default_namespace("urn:stock")
            .with_child(Element::new("Item").with_text("Apples"))
    }

    #[test]
    fn test_unsigned_request() {
        let request = Request::new("urn:GetPrice", "http://example.org/stock", payload())
            .with_header(Element::new("Session").with_text("abc"));

        assert!(!request.is_signed());
        assert_eq!(request.url(), "http://example.org/stock");
        assert_eq!(
            String::from_utf8(request.serialize().unwrap()).unwrap(),
            r#"<Envelope xmlns="http://schemas.xmlsoap.org/soap/envelope/"><Header xmlns="http://schemas.xmlsoap.org/soap/envelope/"><Session>abc</Session></Header><Body xmlns="http://schemas.xmlsoap.org/soap/envelope/"><GetPrice xmlns="urn:stock"><Item>Apples</Item></GetPrice></Body></Envelope>"#
        );
    }

    #[test]
    fn test_http_headers() {
        let request = Request::new("urn:GetPrice", "http://example.org/stock", payload());
        assert_eq!(
            request.http_headers(),
            vec![
                ("Content-Type", "text/xml; charset=\"utf-8\"".to_string()),
                ("SOAPAction", "urn:GetPrice".to_string()),
            ]
        );
    }

    #[test]
    fn test_signed_request_is_canonical() {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let info = Arc::new(WsseAuthInfo::new("CERT", key));
        let request = Request::new("urn:GetPrice", "http://example.org/stock", payload())
            .sign_with(info);

        let serialized = request.serialize().unwrap();
        let root = Element::parse_bytes(&serialized).unwrap();
        assert_eq!(root.namespace.as_deref(), Some(SOAP_ENV_NS));

        let body = root.child("Body").unwrap();
        let op = body.child("GetPrice").unwrap();
        assert_eq!(op.prefix.as_deref(), Some("ns1"));
        assert_eq!(op.child("Item").unwrap().prefix.as_deref(), Some("ns1"));
        assert!(root.child("Header").unwrap().child("Security").is_some());

        // Canonicalizing again changes nothing
        assert_eq!(canonicalize(&serialized, "Envelope/Body").unwrap(), serialized);
    }

    #[test]
    fn test_invalid_canonicalization_root() {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let request = Request::new("urn:GetPrice", "http://example.org/stock", payload())
            .sign_with(Arc::new(WsseAuthInfo::new("CERT", key)))
            .with_canonicalization_root("Envelope/Missing");
        assert!(matches!(
            request.serialize(),
            Err(SoapError::InvalidCanonicalizationPath(_))
        ));
    }
}
