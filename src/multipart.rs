//! MIME multipart reader.
//!
//! Reads one part at a time from a buffered stream. Both CRLF and bare LF
//! line endings are accepted, and the line break preceding a delimiter is
//! part of the delimiter rather than of the part body.

use crate::error::{Result, SoapError};
use std::io::{BufRead, Read};
use tracing::trace;

/// Room for a delimiter line's closing dashes, padding and line break.
const DELIMITER_SLACK: usize = 64;

/// One part of a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    /// Headers with lowercased names, in order
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Part {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or_default()
    }

    pub fn content_id(&self) -> Option<&str> {
        self.header("content-id")
    }
}

/// Sequential reader over the parts of a multipart body.
pub struct MultipartReader<R> {
    reader: R,
    delimiter: Vec<u8>,
    max_part_size: Option<usize>,
    started: bool,
    finished: bool,
}

impl<R: BufRead> MultipartReader<R> {
    pub fn new(reader: R, boundary: &str) -> Self {
        Self {
            reader,
            delimiter: format!("--{}", boundary).into_bytes(),
            max_part_size: None,
            started: false,
            finished: false,
        }
    }

    /// Reject parts whose body exceeds `limit` bytes.
    pub fn with_max_part_size(mut self, limit: usize) -> Self {
        self.max_part_size = Some(limit);
        self
    }

    /// Read the next part. `Ok(None)` once the closing delimiter was seen, or
    /// when the stream holds no delimiter at all.
    pub fn next_part(&mut self) -> Result<Option<Part>> {
        if self.finished {
            return Ok(None);
        }

        if !self.started {
            if !self.skip_preamble()? {
                self.finished = true;
                return Ok(None);
            }
            self.started = true;
        }

        let headers = self.read_headers()?;
        let content_id = headers
            .iter()
            .find(|(k, _)| k == "content-id")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let body = self.read_body(&content_id)?;

        trace!(content_id = %content_id, size = body.len(), "Read multipart part");
        Ok(Some(Part { headers, body }))
    }

    fn read_line(&mut self, line: &mut Vec<u8>) -> Result<bool> {
        line.clear();
        Ok(self.reader.read_until(b'\n', line)? > 0)
    }

    /// Classify a line as an opening (`Some(false)`) or closing (`Some(true)`)
    /// delimiter.
    fn delimiter_kind(&self, line: &[u8]) -> Option<bool> {
        let line = trim_line_end(line);
        let rest = line.strip_prefix(self.delimiter.as_slice())?;
        let rest = trim_padding(rest);
        match rest {
            b"" => Some(false),
            b"--" => Some(true),
            _ => None,
        }
    }

    /// Skip everything up to the first delimiter. Returns false on a stream
    /// without any part.
    fn skip_preamble(&mut self) -> Result<bool> {
        let mut line = Vec::new();
        while self.read_line(&mut line)? {
            match self.delimiter_kind(&line) {
                Some(false) => return Ok(true),
                Some(true) => return Ok(false),
                None => continue,
            }
        }
        Ok(false)
    }

    fn read_headers(&mut self) -> Result<Vec<(String, String)>> {
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut line = Vec::new();

        loop {
            if !self.read_line(&mut line)? {
                return Err(SoapError::Multipart(
                    "unexpected end of stream in part headers".to_string(),
                ));
            }

            let text = String::from_utf8_lossy(trim_line_end(&line)).into_owned();
            if text.is_empty() {
                return Ok(headers);
            }

            // Folded continuation line
            if text.starts_with([' ', '\t']) {
                match headers.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(text.trim());
                        continue;
                    }
                    None => {
                        return Err(SoapError::Multipart(format!(
                            "malformed header line: {:?}",
                            text
                        )))
                    }
                }
            }

            let (name, value) = text
                .split_once(':')
                .ok_or_else(|| SoapError::Multipart(format!("malformed header line: {:?}", text)))?;
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    fn read_body(&mut self, content_id: &str) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut chunk = Vec::new();
        let mut line_start = true;

        loop {
            // With a limit, never buffer more than the limit allows plus room
            // for a complete delimiter line.
            let cap = match self.max_part_size {
                Some(limit) => {
                    let remaining = limit.saturating_sub(content_len(&body)).saturating_add(3);
                    remaining.max(self.delimiter.len() + DELIMITER_SLACK) as u64
                }
                None => u64::MAX,
            };

            chunk.clear();
            let read = (&mut self.reader).take(cap).read_until(b'\n', &mut chunk)?;
            if read == 0 {
                return Err(SoapError::Multipart(
                    "unexpected end of stream in part body".to_string(),
                ));
            }

            // A chunk cut short by the cap is never a whole delimiter line.
            let whole_line = chunk.ends_with(b"\n") || (read as u64) < cap;
            if line_start && whole_line {
                if let Some(closing) = self.delimiter_kind(&chunk) {
                    // The line break before the delimiter belongs to it.
                    body.truncate(content_len(&body));
                    self.finished = closing;
                    return Ok(body);
                }
            }
            line_start = chunk.ends_with(b"\n");

            body.extend_from_slice(&chunk);
            if let Some(limit) = self.max_part_size {
                if content_len(&body) > limit {
                    return Err(SoapError::PartTooLarge {
                        content_id: content_id.to_string(),
                        limit,
                    });
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for MultipartReader<R> {
    type Item = Result<Part>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_part().transpose()
    }
}

/// Length of `body` without a trailing line break, which a following
/// delimiter would claim.
fn content_len(body: &[u8]) -> usize {
    if body.ends_with(b"\r\n") {
        body.len() - 2
    } else if body.ends_with(b"\n") {
        body.len() - 1
    } else {
        body.len()
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_padding(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}
