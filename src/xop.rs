//! XOP decoder for MIME multipart SOAP responses.
//!
//! The first part holds the envelope (`application/xop+xml`); `<xop:Include>`
//! placeholders inside it point at later parts by Content-ID. The envelope is
//! decoded into the caller's destinations first, then each referenced part
//! is copied into the byte field found at the placeholder's element path.

use crate::config::XopConfig;
use crate::envelope::Envelope;
use crate::error::{Result, SoapError};
use crate::multipart::MultipartReader;
use crate::path::{resolve_bytes, Addressable};
use crate::pipe::pipe;
use crate::xml::{Element, XmlDecode};
use std::collections::HashMap;
use std::io::{BufRead, BufWriter, Write};
use std::thread;
use tracing::{debug, trace};

/// XOP include namespace.
pub const XOP_NS: &str = "http://www.w3.org/2004/08/xop/include";

const XOP_CONTENT_TYPE: &str = "application/xop+xml";

/// Decoder for one multipart message.
pub struct XopDecoder<R> {
    reader: R,
    boundary: String,
    config: XopConfig,
    /// Content-ID (`<id>`) to element path, starting below the root
    includes: HashMap<String, Vec<String>>,
}

impl<R: BufRead> XopDecoder<R> {
    pub fn new(reader: R, boundary: &str) -> Self {
        Self::with_config(reader, boundary, &XopConfig::default())
    }

    pub fn with_config(reader: R, boundary: &str, config: &XopConfig) -> Self {
        Self {
            reader,
            boundary: boundary.to_string(),
            config: config.clone(),
            includes: HashMap::new(),
        }
    }

    /// Decode the message into `envelope`, then fill in referenced attachments.
    pub fn decode<C, D>(self, envelope: &mut Envelope<C, D>) -> Result<()>
    where
        C: XmlDecode + Addressable,
        D: XmlDecode,
    {
        let Self {
            reader,
            boundary,
            config,
            mut includes,
        } = self;

        let mut parts =
            MultipartReader::new(reader, &boundary).with_max_part_size(config.max_part_size);

        let root_part = parts.next_part()?.ok_or(SoapError::MultipartBodyEmpty)?;
        if !root_part.content_type().contains(XOP_CONTENT_TYPE) {
            return Err(SoapError::MissingXopPart);
        }

        let root = Element::parse(root_part.body.as_slice())?;
        let mut path = Vec::new();
        collect_includes(&root, &mut path, &mut includes);
        debug!(includes = includes.len(), "Parsed XOP root part");

        restream(&root, config.pipe_chunk_size, envelope)?;

        if includes.is_empty() {
            return Ok(());
        }

        while let Some(part) = parts.next_part()? {
            if part.content_type().contains(XOP_CONTENT_TYPE) {
                return Err(SoapError::MissingXopPart);
            }

            let Some(path) = part.content_id().and_then(|id| includes.get(id)) else {
                trace!(content_id = ?part.content_id(), "Ignoring unreferenced part");
                continue;
            };

            if path.first().map(String::as_str) != Some("Body") {
                return Err(SoapError::InvalidIncludePath(path.join("/")));
            }

            let Some(content) = envelope.content_mut() else {
                debug!("Response carries a fault, attachments ignored");
                return Ok(());
            };

            let target = resolve_bytes(content, &path[1..])?;
            debug!(
                path = %path.join("/"),
                size = part.body.len(),
                "Injected XOP attachment"
            );
            *target = part.body;
        }

        Ok(())
    }
}

/// Record every `<xop:Include>` below `element`, keyed by its Content-ID.
fn collect_includes(
    element: &Element,
    path: &mut Vec<String>,
    includes: &mut HashMap<String, Vec<String>>,
) {
    for child in element.elements() {
        if child.name == "Include" && child.namespace.as_deref() == Some(XOP_NS) {
            let href = child.attr("href").unwrap_or_default();
            let cid = href.strip_prefix("cid:").unwrap_or(href);
            includes.insert(format!("<{}>", cid), path.clone());
            continue;
        }

        path.push(child.name.clone());
        collect_includes(child, path, includes);
        path.pop();
    }
}

/// Serialize `root` on a producer thread and decode it on this one.
fn restream<C, D>(root: &Element, chunk_size: usize, envelope: &mut Envelope<C, D>) -> Result<()>
where
    C: XmlDecode,
    D: XmlDecode,
{
    let (writer, reader) = pipe();

    thread::scope(|scope| {
        scope.spawn(move || {
            let mut out = BufWriter::with_capacity(chunk_size.max(1), writer);
            if let Err(err) = root.write_to(&mut out).and_then(|_| out.flush()) {
                let (writer, _) = out.into_parts();
                writer.fail(err);
            }
        });

        envelope.read_from(reader)
    })
}
