//! SOAP 1.1 envelope codec.
//!
//! The body carries either the caller's content or a [`Fault`], never both.
//! Both destinations are allocated by the caller before decoding; the first
//! element inside `<Body>` decides which of them is filled and the other is
//! cleared.

use crate::error::{Result, SoapError};
use crate::fault::Fault;
use crate::wsse::WSU_NS;
use crate::xml::{Element, XmlDecode, XmlEncode};
use std::fmt;
use std::io::{BufRead, Write};
use tracing::{debug, trace};

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// XML Schema namespace, declared on signed envelopes.
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
/// XML Schema instance namespace, declared on signed envelopes.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// SOAP header: caller-supplied entries, serialized in insertion order.
#[derive(Default)]
pub struct Header {
    entries: Vec<Box<dyn XmlEncode>>,
}

impl Header {
    pub fn push(&mut self, entry: impl XmlEncode + 'static) {
        self.entries.push(Box::new(entry));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Header entries rendered as elements, in order.
    pub fn elements(&self) -> Vec<Element> {
        self.entries.iter().map(|e| e.to_element()).collect()
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.elements()).finish()
    }
}

impl XmlEncode for Header {
    fn to_element(&self) -> Element {
        let mut header = Element::new("Header").with_default_namespace(SOAP_ENV_NS);
        for entry in &self.entries {
            header.push_child(entry.to_element());
        }
        header
    }
}

/// SOAP body.
#[derive(Debug, Clone, PartialEq)]
pub struct Body<C, D = Element> {
    /// `wsu:Id` of the body, set when the message is signed
    pub id: Option<String>,
    pub content: Option<C>,
    pub fault: Option<Fault<D>>,
}

impl<C, D> Body<C, D> {
    pub fn new(content: C) -> Self {
        Self {
            id: None,
            content: Some(content),
            fault: None,
        }
    }
}

fn is_fault(element: &Element) -> bool {
    element.name == "Fault" && element.namespace.as_deref() == Some(SOAP_ENV_NS)
}

impl<C: XmlDecode, D: XmlDecode> XmlDecode for Body<C, D> {
    fn decode(&mut self, element: &Element) -> Result<()> {
        if self.content.is_none() {
            return Err(SoapError::EnvelopeMisconfigured);
        }

        self.id = element
            .attributes
            .iter()
            .find(|a| a.key == "Id" || a.key.ends_with(":Id"))
            .map(|a| a.value.clone());

        // Only the first entry of the body is meaningful.
        match element.elements().next() {
            Some(first) if is_fault(first) => {
                let fault = self.fault.get_or_insert_with(Fault::new);
                fault.decode(first)?;
                self.content = None;
                debug!(code = %fault.code, "Decoded SOAP fault");
            }
            Some(first) => {
                if let Some(content) = self.content.as_mut() {
                    content.decode(first)?;
                }
                self.fault = None;
                trace!(element = %first.name, "Decoded SOAP body content");
            }
            None => {
                self.fault = None;
            }
        }
        Ok(())
    }
}

impl<C: XmlEncode, D: XmlEncode> XmlEncode for Body<C, D> {
    fn to_element(&self) -> Element {
        let mut body = Element::new("Body").with_default_namespace(SOAP_ENV_NS);
        if let Some(id) = &self.id {
            body.set_attr("xmlns:wsu", WSU_NS);
            body.set_attr("wsu:Id", id.as_str());
        }

        if let Some(content) = &self.content {
            body.push_child(content.to_element());
        } else if let Some(fault) = &self.fault {
            body.push_child(fault.to_element());
        }
        body
    }
}

/// A SOAP envelope around caller content `C` with fault detail type `D`.
#[derive(Debug)]
pub struct Envelope<C, D = Element> {
    pub header: Option<Header>,
    pub body: Body<C, D>,
    /// Declare the `xsd`/`xsi` namespaces on the envelope
    pub(crate) schema_namespaces: bool,
}

impl<C, D> Envelope<C, D> {
    /// Envelope with `content` as the body to encode, or the destination to
    /// decode into. A fault in a decoded message must not carry a detail.
    pub fn new(content: C) -> Self {
        Self {
            header: None,
            body: Body::new(content),
            schema_namespaces: false,
        }
    }

    /// Envelope that decodes a fault detail into `detail`.
    pub fn with_fault_detail(content: C, detail: D) -> Self {
        let mut envelope = Self::new(content);
        envelope.body.fault = Some(Fault::with_detail(detail));
        envelope
    }

    /// Append a header entry.
    pub fn add_header(&mut self, entry: impl XmlEncode + 'static) {
        self.header.get_or_insert_with(Header::default).push(entry);
    }

    pub fn content(&self) -> Option<&C> {
        self.body.content.as_ref()
    }

    pub fn content_mut(&mut self) -> Option<&mut C> {
        self.body.content.as_mut()
    }

    pub fn fault(&self) -> Option<&Fault<D>> {
        self.body.fault.as_ref()
    }

    /// The decoded content, or the fault the service returned.
    pub fn into_result(self) -> std::result::Result<C, Fault<D>> {
        match (self.body.content, self.body.fault) {
            (Some(content), _) => Ok(content),
            (None, Some(fault)) => Err(fault),
            (None, None) => Err(Fault::new()),
        }
    }
}

impl<C: XmlDecode, D: XmlDecode> Envelope<C, D> {
    /// Decode a serialized envelope into the destinations held by this envelope.
    pub fn read_from<R: BufRead>(&mut self, reader: R) -> Result<()> {
        if self.body.content.is_none() {
            return Err(SoapError::EnvelopeMisconfigured);
        }

        let root = Element::parse(reader)?;
        self.decode(&root)
    }

    /// Decode `reader` into `content`, and a fault detail into `detail` if given.
    pub fn decode_with<R: BufRead>(reader: R, content: C, detail: Option<D>) -> Result<Self> {
        let mut envelope = match detail {
            Some(detail) => Self::with_fault_detail(content, detail),
            None => Self::new(content),
        };
        envelope.read_from(reader)?;
        Ok(envelope)
    }
}

impl<C: XmlDecode, D: XmlDecode> XmlDecode for Envelope<C, D> {
    fn decode(&mut self, element: &Element) -> Result<()> {
        element.expect_name("Envelope")?;

        // Nothing from a previously decoded message survives.
        self.header = None;
        self.body.id = None;

        if let Some(header) = element.child("Header") {
            let entries = self.header.get_or_insert_with(Header::default);
            for entry in header.elements() {
                entries.push(entry.clone());
            }
        }

        match element.child("Body") {
            Some(body) => self.body.decode(body),
            None => Ok(()),
        }
    }
}

impl<C: XmlEncode, D: XmlEncode> XmlEncode for Envelope<C, D> {
    fn to_element(&self) -> Element {
        let mut envelope = Element::new("Envelope").with_default_namespace(SOAP_ENV_NS);
        if self.schema_namespaces {
            envelope.set_attr("xmlns:xsd", XSD_NS);
            envelope.set_attr("xmlns:xsi", XSI_NS);
        }

        if let Some(header) = &self.header {
            envelope.push_child(header.to_element());
        }
        envelope.push_child(self.body.to_element());
        envelope
    }
}

impl<C: XmlEncode, D: XmlEncode> Envelope<C, D> {
    /// Serialize the envelope.
    pub fn encode(&self) -> Vec<u8> {
        self.to_element().to_bytes()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.to_element().write_to(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct HeaderExample {
        attr1: i32,
        value: String,
    }

    impl XmlEncode for HeaderExample {
        fn to_element(&self) -> Element {
            Element::new("HeaderExample")
                .with_attr("attr1", self.attr1.to_string())
                .with_text(self.value.as_str())
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct ContentField {
        attr1: String,
        attr2: i32,
        value: String,
    }

    impl XmlEncode for ContentField {
        fn to_element(&self) -> Element {
            Element::new("ContentField")
                .with_attr("attr1", self.attr1.as_str())
                .with_attr("attr2", self.attr2.to_string())
                .with_text(self.value.as_str())
        }
    }

    impl XmlDecode for ContentField {
        fn decode(&mut self, element: &Element) -> Result<()> {
            self.attr1 = element.attr("attr1").unwrap_or_default().to_string();
            self.attr2 = element.parse_attr("attr2")?.unwrap_or_default();
            self.value = element.text();
            Ok(())
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct ContentExample {
        attr1: i32,
        field1: ContentField,
    }

    impl XmlEncode for ContentExample {
        fn to_element(&self) -> Element {
            Element::new("ContentExample")
                .with_attr("attr1", self.attr1.to_string())
                .with_child(self.field1.to_element())
        }
    }

    impl XmlDecode for ContentExample {
        fn decode(&mut self, element: &Element) -> Result<()> {
            element.expect_name("ContentExample")?;
            self.attr1 = element.parse_attr("attr1")?.unwrap_or_default();
            if let Some(field) = element.child("ContentField") {
                self.field1.decode(field)?;
            }
            Ok(())
        }
    }

    fn content() -> ContentExample {
        ContentExample {
            attr1: 10,
            field1: ContentField {
                attr1: "test attr".to_string(),
                attr2: 11,
                value: "This is a test string".to_string(),
            },
        }
    }

    #[test]
    fn test_encode_without_headers() {
        let envelope: Envelope<_> = Envelope::new(content());
        assert_eq!(
            String::from_utf8(envelope.encode()).unwrap(),
            r#"<Envelope xmlns="http://schemas.xmlsoap.org/soap/envelope/"><Body xmlns="http://schemas.xmlsoap.org/soap/envelope/"><ContentExample attr1="10"><ContentField attr1="test attr" attr2="11">This is a test string</ContentField></ContentExample></Body></Envelope>"#
        );
    }

    #[test]
    fn test_encode_with_headers() {
        let mut envelope: Envelope<_> = Envelope::new(content());
        envelope.add_header(HeaderExample {
            attr1: 15,
            value: "test header value".to_string(),
        });
        assert_eq!(
            String::from_utf8(envelope.encode()).unwrap(),
            r#"<Envelope xmlns="http://schemas.xmlsoap.org/soap/envelope/"><Header xmlns="http://schemas.xmlsoap.org/soap/envelope/"><HeaderExample attr1="15">test header value</HeaderExample></Header><Body xmlns="http://schemas.xmlsoap.org/soap/envelope/"><ContentExample attr1="10"><ContentField attr1="test attr" attr2="11">This is a test string</ContentField></ContentExample></Body></Envelope>"#
        );
    }

    #[test]
    fn test_headers_keep_insertion_order() {
        let mut envelope: Envelope<_> = Envelope::new(content());
        for attr1 in [3, 1, 2] {
            envelope.add_header(HeaderExample {
                attr1,
                value: String::new(),
            });
        }
        let order: Vec<_> = envelope
            .header
            .as_ref()
            .unwrap()
            .elements()
            .iter()
            .map(|e| e.attr("attr1").unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_round_trip() {
        let sent: Envelope<_> = Envelope::new(content());
        let encoded = sent.encode();

        let decoded =
            Envelope::<ContentExample>::decode_with(encoded.as_slice(), ContentExample::default(), None)
                .unwrap();
        assert_eq!(decoded.content(), Some(&content()));
        assert!(decoded.fault().is_none());
    }

    #[test]
    fn test_reused_envelope_starts_clean() {
        let first = r#"<Envelope xmlns="http://schemas.xmlsoap.org/soap/envelope/"><Header><Session>abc</Session></Header><Body xmlns:wsu="urn:wsu" wsu:Id="Body-1"><Pong/></Body></Envelope>"#;
        let second = r#"<Envelope xmlns="http://schemas.xmlsoap.org/soap/envelope/"><Body><Pong/></Body></Envelope>"#;

        let mut envelope: Envelope<Element> = Envelope::new(Element::default());
        envelope.read_from(first.as_bytes()).unwrap();
        envelope.read_from(first.as_bytes()).unwrap();
        assert_eq!(envelope.header.as_ref().map(Header::len), Some(1));
        assert_eq!(envelope.body.id.as_deref(), Some("Body-1"));

        envelope.read_from(second.as_bytes()).unwrap();
        assert!(envelope.header.is_none());
        assert!(envelope.body.id.is_none());
        assert_eq!(envelope.content().unwrap().name, "Pong");
    }

    #[test]
    fn test_decode_content() {
        let xml = r#"<?xml version="1.0"?>
			<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
				<soap:Body>
					<ContentExample attr1="10">
						<ContentField attr1="test attr" attr2="11">This is a test content string</ContentField>
					</ContentExample>
				</soap:Body>
			</soap:Envelope>"#;

        let mut envelope: Envelope<ContentExample> =
            Envelope::with_fault_detail(ContentExample::default(), Element::default());
        envelope.read_from(xml.as_bytes()).unwrap();

        assert!(envelope.fault().is_none());
        let decoded = envelope.content().unwrap();
        assert_eq!(decoded.attr1, 10);
        assert_eq!(decoded.field1.value, "This is a test content string");
    }

    #[test]
    fn test_decode_fault_clears_content() {
        let xml = r#"<?xml version="1.0"?>
			<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
				<soap:Body>
					<soap:Fault>
						<faultcode>FaultCodeValue</faultcode>
						<faultstring>FaultStringValue</faultstring>
						<faultactor>FaultActorValue</faultactor>
					</soap:Fault>
				</soap:Body>
			</soap:Envelope>"#;

        let envelope =
            Envelope::<ContentExample>::decode_with(xml.as_bytes(), ContentExample::default(), None)
                .unwrap();
        assert!(envelope.content().is_none());
        let fault = envelope.fault().unwrap();
        assert_eq!(fault.to_string(), "soap fault: FaultCodeValue (FaultStringValue)");
        assert!(fault.detail().is_none());

        let err = envelope.into_result().unwrap_err();
        assert_eq!(err.actor, "FaultActorValue");
    }

    #[test]
    fn test_fault_outside_envelope_namespace_is_content() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
				<soap:Body><Fault xmlns="urn:other"><faultcode>x</faultcode></Fault></soap:Body>
			</soap:Envelope>"#;

        let envelope =
            Envelope::<Element>::decode_with(xml.as_bytes(), Element::default(), None).unwrap();
        assert!(envelope.fault().is_none());
        assert_eq!(envelope.content().unwrap().name, "Fault");
    }

    #[test]
    fn test_decode_detail_without_destination() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
				<soap:Body>
					<soap:Fault>
						<faultcode>FaultCodeValue</faultcode>
						<detail><DetailExample attr1="10"/></detail>
					</soap:Fault>
				</soap:Body>
			</soap:Envelope>"#;

        let err = Envelope::<ContentExample>::decode_with(
            xml.as_bytes(),
            ContentExample::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SoapError::FaultDetailNotSpecified));
    }

    #[test]
    fn test_decode_mismatched_tags() {
        let mismatched = r#"<?xml version="1.0"?>
			<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
				<soap:Body>
					<ContentExample attr1="10">
						<ContentField attr1="test attr" attr2="11">This is a test content string</ContentField>
				</soap:Body>
					</ContentExample>
			</soap:Envelope>"#;
        let err = Envelope::<ContentExample>::decode_with(
            mismatched.as_bytes(),
            ContentExample::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SoapError::Xml(_)), "unexpected error: {:?}", err);
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedInput);
    }

    #[test]
    fn test_decode_without_destination() {
        let mut envelope: Envelope<ContentExample> = Envelope::new(ContentExample::default());
        envelope.body.content = None;
        let err = envelope.read_from("not even xml".as_bytes()).unwrap_err();
        assert!(matches!(err, SoapError::EnvelopeMisconfigured));
    }

    #[test]
    fn test_decode_rejects_other_root() {
        let err = Envelope::<ContentExample>::decode_with(
            "<Other/>".as_bytes(),
            ContentExample::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SoapError::UnexpectedElement { .. }));
    }
}
