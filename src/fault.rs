//! SOAP 1.1 Fault structure.

use crate::envelope::SOAP_ENV_NS;
use crate::error::{Result, SoapError};
use crate::xml::{Element, XmlDecode, XmlEncode};
use std::fmt;
use std::io::BufRead;

/// A SOAP fault.
///
/// The optional detail is a destination supplied by the caller before
/// decoding; a `<detail>` element with no destination is an error rather than
/// being dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault<D = Element> {
    pub code: String,
    pub string: String,
    pub actor: String,
    detail: Option<D>,
}

impl<D> Default for Fault<D> {
    fn default() -> Self {
        Self {
            code: String::new(),
            string: String::new(),
            actor: String::new(),
            detail: None,
        }
    }
}

impl<D> Fault<D> {
    /// A fault with no detail destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fault that decodes its `<detail>` into `detail`.
    pub fn with_detail(detail: D) -> Self {
        Self {
            detail: Some(detail),
            ..Self::default()
        }
    }

    /// The detail destination, if one was supplied.
    pub fn detail(&self) -> Option<&D> {
        self.detail.as_ref()
    }

    pub fn detail_mut(&mut self) -> Option<&mut D> {
        self.detail.as_mut()
    }

    pub fn into_detail(self) -> Option<D> {
        self.detail
    }
}

impl<D: XmlDecode> Fault<D> {
    /// Decode a standalone `<Fault>` document.
    pub fn read_from<R: BufRead>(reader: R, detail: Option<D>) -> Result<Self> {
        let root = Element::parse(reader)?;
        let mut fault = Self {
            detail,
            ..Self::default()
        };
        fault.decode(&root)?;
        Ok(fault)
    }

    fn decode_detail(&mut self, element: &Element) -> Result<()> {
        let destination = self
            .detail
            .as_mut()
            .ok_or(SoapError::FaultDetailNotSpecified)?;

        for entry in element.elements() {
            destination.decode_next(entry)?;
        }
        Ok(())
    }
}

impl<D: XmlDecode> XmlDecode for Fault<D> {
    fn decode(&mut self, element: &Element) -> Result<()> {
        element.expect_name("Fault")?;

        for child in element.elements() {
            match child.name.as_str() {
                "faultcode" => self.code = child.text(),
                "faultstring" => self.string = child.text(),
                "faultactor" => self.actor = child.text(),
                "detail" => self.decode_detail(child)?,
                _ => {}
            }
        }
        Ok(())
    }
}

impl<D: XmlEncode> XmlEncode for Fault<D> {
    fn to_element(&self) -> Element {
        let mut fault = Element::new("Fault").with_default_namespace(SOAP_ENV_NS);

        for (name, value) in [
            ("faultcode", &self.code),
            ("faultstring", &self.string),
            ("faultactor", &self.actor),
        ] {
            if !value.is_empty() {
                fault.push_child(Element::new(name).with_text(value.as_str()));
            }
        }

        if let Some(detail) = &self.detail {
            fault.push_child(Element::new("detail").with_child(detail.to_element()));
        }
        fault
    }
}

impl<D> fmt::Display for Fault<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "soap fault: {} ({})", self.code, self.string)
    }
}

impl<D: fmt::Debug> std::error::Error for Fault<D> {}
