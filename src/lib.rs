//! SOAP 1.1 message engine for Zentinel
//!
//! Encodes and decodes SOAP envelopes and faults into caller-owned typed
//! destinations, decodes XOP/MTOM multipart responses, and signs outbound
//! requests with WS-Security X.509 signatures over an exclusively
//! canonicalized body.
//!
//! # Features
//!
//! - Envelope and fault codec with in-place decoding
//! - XOP multipart decoding with attachment injection by element path
//! - Exclusive C14N of a selected subtree
//! - WS-Security X.509 signing (RSA-SHA1)
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_engine::{Envelope, Request};
//!
//! let request = Request::new("urn:GetPrice", url, payload).sign_with(auth_info);
//! let bytes = request.serialize()?;
//!
//! let mut envelope = Envelope::with_fault_detail(PriceResponse::default(), PriceFault::default());
//! envelope.read_from(response_body)?;
//! let price = envelope.into_result()?;
//! ```

pub mod c14n;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fault;
pub mod multipart;
pub mod path;
pub mod pipe;
pub mod request;
pub mod response;
pub mod wsse;
pub mod xml;
pub mod xop;

pub use c14n::canonicalize;
pub use config::SoapEngineConfig;
pub use envelope::{Body, Envelope, Header, SOAP_ENV_NS};
pub use error::{ErrorKind, Result, SoapError};
pub use fault::Fault;
pub use path::{resolve, resolve_bytes, Addressable, Field, FieldValue, Resolved};
pub use request::Request;
pub use response::{decode_response, MediaType};
pub use wsse::{SecurityHeader, WsseAuthIds, WsseAuthInfo};
pub use xml::{Element, Node, XmlDecode, XmlEncode};
pub use xop::{XopDecoder, XOP_NS};
