//! Exclusive XML canonicalization, limited to what signed SOAP bodies need.
//!
//! Every element below the selected subtree root that declares a default
//! namespace is rewritten to a generated prefix (`ns1`, `ns2`, ...), one per
//! namespace URI. Unprefixed descendants inherit their parent's prefix.
//! Elements in the SOAP envelope namespace keep their default declaration.
//! Declarations outside the subtree are ignored, so the subtree canonicalizes
//! the same whether it stands alone or sits inside an envelope. Output always
//! uses explicit end tags.
//!
//! Attribute ordering and whitespace normalization are not performed; the
//! input is expected to be a document this crate serialized itself.

use crate::envelope::SOAP_ENV_NS;
use crate::error::{Result, SoapError};
use crate::xml::Element;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Canonicalize the subtree of `xml` addressed by `root_path` and return the
/// whole document.
///
/// `root_path` is a `/`-separated list of local names starting at the
/// document root (`Envelope/Body`); an empty path selects the document root
/// itself.
pub fn canonicalize(xml: &[u8], root_path: &str) -> Result<Vec<u8>> {
    let root = Element::parse_bytes(xml)?;

    // A nameless element standing in for the document node.
    let mut document = Element::default();
    document.push_child(root);

    let mut start = &mut document;
    for segment in root_path.split('/').filter(|s| !s.is_empty()) {
        start = start
            .elements_mut()
            .find(|e| e.name == segment)
            .ok_or_else(|| SoapError::InvalidCanonicalizationPath(root_path.to_string()))?;
    }

    // Only the selected subtree shapes its canonical form.
    let mut state = Canonicalizer::default();
    state.scan_subtree(start);
    state.enter(start);
    state.rewrite_children(start);
    trace!(root_path, prefixes = state.prefixes.len(), "Canonicalized document");

    let root = document
        .elements()
        .next()
        .ok_or(SoapError::EmptyDocument)?;
    Ok(root.to_bytes())
}

#[derive(Default)]
struct Canonicalizer {
    /// Namespace URI to assigned prefix
    prefixes: HashMap<String, String>,
    /// Prefixes declared or used inside the subtree, or already generated
    used: HashSet<String>,
    next: usize,
    /// Prefix declarations in scope at the current element
    scope: Vec<(String, String)>,
}

impl Canonicalizer {
    /// Seed the prefix table with the subtree's own declarations and reserve
    /// every prefix the subtree uses.
    fn scan_subtree(&mut self, element: &Element) {
        for (prefix, uri) in declarations(element) {
            self.used.insert(prefix.clone());
            self.prefixes.entry(uri).or_insert(prefix);
        }
        if let Some(prefix) = &element.prefix {
            self.used.insert(prefix.clone());
        }
        for attr in &element.attributes {
            if let Some((prefix, _)) = attr.key.split_once(':') {
                if prefix != "xmlns" {
                    self.used.insert(prefix.to_string());
                }
            }
        }
        for child in element.elements() {
            self.scan_subtree(child);
        }
    }

    fn enter(&mut self, element: &Element) {
        self.scope.extend(declarations(element));
    }

    fn prefix_for(&mut self, uri: &str) -> String {
        if let Some(prefix) = self.prefixes.get(uri) {
            return prefix.clone();
        }

        let prefix = loop {
            self.next += 1;
            let candidate = format!("ns{}", self.next);
            if !self.used.contains(&candidate) {
                break candidate;
            }
        };
        self.used.insert(prefix.clone());
        self.prefixes.insert(uri.to_string(), prefix.clone());
        prefix
    }

    fn in_scope(&self, prefix: &str, uri: &str) -> bool {
        self.scope
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map_or(false, |(_, u)| u == uri)
    }

    fn rewrite_children(&mut self, element: &mut Element) {
        let parent_prefix = element.prefix.clone();

        for child in element.elements_mut() {
            let depth = self.scope.len();

            match child.attr("xmlns").map(str::to_string) {
                Some(uri) if uri == SOAP_ENV_NS || uri.is_empty() => {}
                Some(uri) => {
                    let prefix = self.prefix_for(&uri);
                    child.remove_attr("xmlns");
                    if !self.in_scope(&prefix, &uri) {
                        child.set_attr(&format!("xmlns:{}", prefix), uri.as_str());
                    }
                    child.prefix = Some(prefix);
                }
                None => {
                    if child.prefix.is_none() {
                        child.prefix = parent_prefix.clone();
                    }
                }
            }

            self.enter(child);
            self.rewrite_children(child);
            self.scope.truncate(depth);
        }
    }
}

fn declarations(element: &Element) -> Vec<(String, String)> {
    element
        .attributes
        .iter()
        .filter_map(|a| {
            a.key
                .strip_prefix("xmlns:")
                .map(|prefix| (prefix.to_string(), a.value.clone()))
        })
        .collect()
}
