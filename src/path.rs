//! Locating a field inside a decoded message by a path of element names.
//!
//! Message types describe their own shape through [`Addressable`]: their
//! element name and an ordered list of fields. [`resolve`] walks that
//! description, so attachment injection needs no knowledge of concrete types.

use crate::error::{Result, SoapError};
use crate::xml::Element;

/// A message type whose fields can be reached by element name.
pub trait Addressable {
    /// Explicit element name of this value, if it declares one.
    fn xml_name(&self) -> Option<&str> {
        None
    }

    /// Name used when this value is the root of a path and declares no element name.
    fn type_name(&self) -> &'static str;

    /// Fields in declaration order.
    fn fields(&mut self) -> Vec<Field<'_>>;

    /// The element name a path must start with when this value is the root.
    fn element_name(&self) -> &str {
        self.xml_name().unwrap_or_else(|| self.type_name())
    }
}

/// One field of an [`Addressable`] value.
pub struct Field<'a> {
    /// Declaration name, used when nothing better is known
    pub ident: &'static str,
    /// Explicit element name
    pub tag: Option<&'a str>,
    pub value: FieldValue<'a>,
}

/// What a field holds, after optional and sequence layers are unwrapped.
pub enum FieldValue<'a> {
    /// The field storing the value's own element name
    XmlName,
    /// Never serialized
    Omit,
    /// An absent optional value or an empty sequence
    Absent,
    /// A byte array; the only valid attachment target
    Bytes(&'a mut Vec<u8>),
    /// Any other leaf (text, numbers, flags)
    Scalar,
    /// A nested message
    Node(&'a mut dyn Addressable),
    /// A nested message whose fields are promoted into the parent
    Embedded(&'a mut dyn Addressable),
}

impl<'a> Field<'a> {
    pub fn new(ident: &'static str, value: FieldValue<'a>) -> Self {
        Self {
            ident,
            tag: None,
            value,
        }
    }

    pub fn tagged(ident: &'static str, tag: &'a str, value: FieldValue<'a>) -> Self {
        Self {
            ident,
            tag: Some(tag),
            value,
        }
    }

    pub fn xml_name() -> Self {
        Self::new("XMLName", FieldValue::XmlName)
    }

    pub fn bytes(ident: &'static str, bytes: &'a mut Vec<u8>) -> Self {
        Self::new(ident, FieldValue::Bytes(bytes))
    }

    pub fn scalar(ident: &'static str) -> Self {
        Self::new(ident, FieldValue::Scalar)
    }

    pub fn node(ident: &'static str, node: &'a mut dyn Addressable) -> Self {
        Self::new(ident, FieldValue::Node(node))
    }

    pub fn embedded(ident: &'static str, node: &'a mut dyn Addressable) -> Self {
        Self::new(ident, FieldValue::Embedded(node))
    }

    /// An optional nested message.
    pub fn optional<T: Addressable + 'a>(ident: &'static str, node: Option<&'a mut T>) -> Self {
        Self::new(ident, FieldValue::optional(node))
    }

    /// A repeated nested message, addressed through its first occurrence.
    pub fn sequence<T: Addressable + 'a>(ident: &'static str, nodes: &'a mut [T]) -> Self {
        Self::new(ident, FieldValue::first_of(nodes))
    }

    pub fn with_tag(mut self, tag: &'a str) -> Self {
        self.tag = Some(tag);
        self
    }
}

impl<'a> FieldValue<'a> {
    pub fn optional<T: Addressable + 'a>(node: Option<&'a mut T>) -> Self {
        match node {
            Some(node) => FieldValue::Node(node),
            None => FieldValue::Absent,
        }
    }

    pub fn first_of<T: Addressable + 'a>(nodes: &'a mut [T]) -> Self {
        match nodes.first_mut() {
            Some(node) => FieldValue::Node(node),
            None => FieldValue::Absent,
        }
    }
}

/// The field a path resolved to.
pub enum Resolved<'a> {
    Bytes(&'a mut Vec<u8>),
    Scalar(&'static str),
    Node(&'a mut dyn Addressable),
}

/// Resolve `path` against `root`. The first segment names the root itself.
pub fn resolve<'a, S: AsRef<str>>(
    root: &'a mut dyn Addressable,
    path: &[S],
) -> Result<Resolved<'a>> {
    let (first, rest) = path.split_first().ok_or_else(|| not_found(path))?;
    if root.element_name() != first.as_ref() {
        return Err(not_found(path));
    }
    if rest.is_empty() {
        return Ok(Resolved::Node(root));
    }

    descend(root, rest).map_err(|err| match err {
        SoapError::FieldNotFound(_) => not_found(path),
        other => other,
    })
}

/// Resolve `path` and require the target to be a byte array.
pub fn resolve_bytes<'a, S: AsRef<str>>(
    root: &'a mut dyn Addressable,
    path: &[S],
) -> Result<&'a mut Vec<u8>> {
    match resolve(root, path)? {
        Resolved::Bytes(bytes) => Ok(bytes),
        Resolved::Scalar(_) | Resolved::Node(_) => Err(SoapError::FieldNotArray(join(path))),
    }
}

fn descend<'a, S: AsRef<str>>(node: &'a mut dyn Addressable, path: &[S]) -> Result<Resolved<'a>> {
    let (segment, rest) = match path.split_first() {
        Some((segment, rest)) => (segment.as_ref(), rest),
        None => return Err(not_found(path)),
    };

    for field in node.fields() {
        let Field { ident, tag, value } = field;
        match value {
            FieldValue::XmlName | FieldValue::Omit | FieldValue::Absent => continue,
            FieldValue::Embedded(inner) => match descend(inner, path) {
                Ok(found) => return Ok(found),
                Err(SoapError::FieldNotFound(_)) => continue,
                Err(err) => return Err(err),
            },
            FieldValue::Bytes(bytes) => {
                if tag.unwrap_or(ident) == segment {
                    return leaf(Resolved::Bytes(bytes), path, rest);
                }
            }
            FieldValue::Scalar => {
                if tag.unwrap_or(ident) == segment {
                    return leaf(Resolved::Scalar(ident), path, rest);
                }
            }
            FieldValue::Node(child) => {
                let matches = match tag {
                    Some(tag) => tag == segment,
                    None => child.xml_name().unwrap_or(ident) == segment,
                };
                if !matches {
                    continue;
                }
                if rest.is_empty() {
                    return Ok(Resolved::Node(child));
                }
                return descend(child, rest);
            }
        }
    }

    Err(not_found(path))
}

// Nothing can be found below a leaf.
fn leaf<'a, S: AsRef<str>>(found: Resolved<'a>, path: &[S], rest: &[S]) -> Result<Resolved<'a>> {
    if rest.is_empty() {
        Ok(found)
    } else {
        Err(not_found(path))
    }
}

fn not_found<S: AsRef<str>>(path: &[S]) -> SoapError {
    SoapError::FieldNotFound(join(path))
}

fn join<S: AsRef<str>>(path: &[S]) -> String {
    path.iter().map(|s| s.as_ref()).collect::<Vec<&str>>().join("/")
}

/// A raw element exposes its child elements; leaves are scalars.
impl Addressable for Element {
    fn xml_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn type_name(&self) -> &'static str {
        "Element"
    }

    fn fields(&mut self) -> Vec<Field<'_>> {
        self.elements_mut()
            .map(|child| {
                if child.elements().next().is_some() {
                    Field::node("Element", child)
                } else {
                    let child: &Element = child;
                    Field::tagged("Element", &child.name, FieldValue::Scalar)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Attachment {
        name: String,
        data: Vec<u8>,
    }

    impl Addressable for Attachment {
        fn type_name(&self) -> &'static str {
            "Attachment"
        }

        fn fields(&mut self) -> Vec<Field<'_>> {
            vec![
                Field::scalar("Name"),
                Field::bytes("Data", &mut self.data),
            ]
        }
    }

    #[derive(Default)]
    struct Common {
        trace: Vec<u8>,
    }

    impl Addressable for Common {
        fn xml_name(&self) -> Option<&str> {
            Some("Common")
        }

        fn type_name(&self) -> &'static str {
            "Common"
        }

        fn fields(&mut self) -> Vec<Field<'_>> {
            vec![
                Field::xml_name(),
                Field::bytes("Trace", &mut self.trace).with_tag("TraceBytes"),
            ]
        }
    }

    #[derive(Default)]
    struct Message {
        common: Common,
        raw: Vec<u8>,
        primary: Option<Attachment>,
        others: Vec<Attachment>,
    }

    impl Addressable for Message {
        fn xml_name(&self) -> Option<&str> {
            Some("Message")
        }

        fn type_name(&self) -> &'static str {
            "MessageType"
        }

        fn fields(&mut self) -> Vec<Field<'_>> {
            vec![
                Field::xml_name(),
                Field::embedded("Common", &mut self.common),
                Field::new("Secret", FieldValue::Omit),
                Field::optional("Primary", self.primary.as_mut()),
                Field::sequence("Other", &mut self.others),
                Field::bytes("Raw", &mut self.raw),
            ]
        }
    }

    fn message() -> Message {
        Message {
            primary: Some(Attachment::default()),
            others: vec![Attachment::default(), Attachment::default()],
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_nested_bytes() {
        let mut msg = message();
        let bytes = resolve_bytes(&mut msg, &["Message", "Primary", "Data"]).unwrap();
        bytes.extend_from_slice(b"payload");
        let primary = msg.primary.unwrap();
        assert_eq!(primary.data, b"payload");
        assert!(primary.name.is_empty());
    }

    #[test]
    fn test_resolve_through_sequence_targets_first_occurrence() {
        let mut msg = message();
        let bytes = resolve_bytes(&mut msg, &["Message", "Other", "Data"]).unwrap();
        *bytes = b"first".to_vec();
        assert_eq!(msg.others[0].data, b"first");
        assert!(msg.others[1].data.is_empty());
    }

    #[test]
    fn test_resolve_promoted_field_by_tag() {
        let mut msg = message();
        let bytes = resolve_bytes(&mut msg, &["Message", "TraceBytes"]).unwrap();
        bytes.push(7);
        assert_eq!(msg.common.trace, vec![7]);

        // The declaration name is shadowed by the explicit tag
        assert!(matches!(
            resolve(&mut msg, &["Message", "Trace"]),
            Err(SoapError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_root_name_mismatch() {
        let mut msg = message();
        let err = resolve(&mut msg, &["MessageType", "Raw"]).err().unwrap();
        assert_eq!(err.to_string(), "no field found for path MessageType/Raw");

        // Without an explicit name the type name is used
        let mut attachment = Attachment::default();
        assert!(resolve_bytes(&mut attachment, &["Attachment", "Data"]).is_ok());
    }

    #[test]
    fn test_omitted_and_absent_fields_are_skipped() {
        let mut msg = Message::default();
        assert!(matches!(
            resolve(&mut msg, &["Message", "Secret"]),
            Err(SoapError::FieldNotFound(_))
        ));
        assert!(matches!(
            resolve(&mut msg, &["Message", "Primary", "Data"]),
            Err(SoapError::FieldNotFound(_))
        ));
        assert!(matches!(
            resolve(&mut msg, &["Message", "Other", "Data"]),
            Err(SoapError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_nothing_below_a_leaf() {
        let mut msg = message();
        assert!(matches!(
            resolve(&mut msg, &["Message", "Raw", "Deeper"]),
            Err(SoapError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_scalar_is_not_an_array() {
        let mut msg = message();
        assert!(matches!(
            resolve_bytes(&mut msg, &["Message", "Primary", "Name"]),
            Err(SoapError::FieldNotArray(_))
        ));
        assert!(matches!(
            resolve_bytes(&mut msg, &["Message", "Primary"]),
            Err(SoapError::FieldNotArray(_))
        ));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let mut msg = message();
        for _ in 0..3 {
            let bytes = resolve_bytes(&mut msg, &["Message", "Raw"]).unwrap();
            bytes.push(1);
        }
        assert_eq!(msg.raw, vec![1, 1, 1]);
    }

    #[test]
    fn test_element_is_addressable() {
        let mut root = Element::parse_bytes(b"<a><b><c>1</c></b></a>").unwrap();
        assert!(matches!(
            resolve(&mut root, &["a", "b"]),
            Ok(Resolved::Node(_))
        ));
        assert!(matches!(
            resolve_bytes(&mut root, &["a", "b", "c"]),
            Err(SoapError::FieldNotArray(_))
        ));
    }
}
