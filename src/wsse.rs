//! WS-Security X.509 signing of SOAP bodies.
//!
//! The body is canonicalized and digested, the digest goes into a
//! `SignedInfo` block, and `SignedInfo` itself is digested and signed with
//! RSA PKCS#1 v1.5 (SHA-1). The resulting `wsse:Security` header carries the
//! certificate as a binary security token.

use crate::c14n::canonicalize;
use crate::envelope::{Body, Envelope};
use crate::error::{Result, SoapError};
use crate::xml::{Element, XmlEncode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Local, SecondsFormat};
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::debug;

pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

pub const ENCODING_TYPE_BASE64: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
pub const VALUE_TYPE_X509: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";

pub const ALGORITHM_EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ALGORITHM_RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const ALGORITHM_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";

const CERTIFICATE_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const CERTIFICATE_END: &str = "-----END CERTIFICATE-----";
const RSA_KEY_LABEL: &str = "RSA PRIVATE KEY";

/// Signing material. Never mutated after construction, so one instance can
/// be shared by any number of concurrent signing calls.
#[derive(Clone)]
pub struct WsseAuthInfo {
    /// Base64 DER of the X.509 certificate, without PEM armour
    certificate: String,
    key: RsaPrivateKey,
}

impl WsseAuthInfo {
    pub fn new(certificate: impl Into<String>, key: RsaPrivateKey) -> Self {
        Self {
            certificate: certificate.into(),
            key,
        }
    }

    /// Build from the PEM text of a certificate and of an unencrypted PKCS#1
    /// RSA private key.
    pub fn from_pem(certificate_pem: &str, key_pem: &str) -> Result<Self> {
        let certificate: String = certificate_pem
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .collect();
        let certificate = certificate.trim();
        let certificate = certificate
            .strip_prefix(CERTIFICATE_BEGIN)
            .unwrap_or(certificate);
        let certificate = certificate.strip_suffix(CERTIFICATE_END).unwrap_or(certificate);

        let key = parse_private_key(key_pem)?;
        Ok(Self::new(certificate, key))
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// Sign `body`, stamping it with `ids.body_id`, and build the security header.
    pub fn sign<C, D>(&self, body: &mut Body<C, D>, ids: &WsseAuthIds) -> Result<SecurityHeader>
    where
        C: XmlEncode,
        D: XmlEncode,
    {
        body.id = Some(ids.body_id.clone());

        let canonical_body = canonicalize(&body.to_element().to_bytes(), "Body")?;
        let digest_value = STANDARD.encode(Sha1::digest(&canonical_body));

        let signed_info = SignedInfo {
            reference_uri: format!("#{}", ids.body_id),
            digest_value,
        };

        let signed_info_digest = Sha1::digest(signed_info.to_element().to_bytes());
        let signature = self.key.sign_with_rng(
            &mut rand::thread_rng(),
            Pkcs1v15Sign::new::<Sha1>(),
            &signed_info_digest,
        )?;

        debug!(body_id = %ids.body_id, "Signed SOAP body");

        Ok(SecurityHeader {
            token_id: ids.security_token_id.clone(),
            certificate: self.certificate.clone(),
            signed_info,
            signature_value: STANDARD.encode(signature),
        })
    }
}

impl fmt::Debug for WsseAuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsseAuthInfo")
            .field("certificate", &self.certificate)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    let begin = format!("-----BEGIN {}-----", RSA_KEY_LABEL);
    let end = format!("-----END {}-----", RSA_KEY_LABEL);

    let start = pem.find(&begin).ok_or(SoapError::InvalidPem)?;
    // The first PEM block must be the RSA key.
    if pem.find("-----BEGIN ") != Some(start) {
        return Err(SoapError::InvalidPem);
    }
    let stop = pem[start..]
        .find(&end)
        .map(|offset| start + offset + end.len())
        .ok_or(SoapError::InvalidPem)?;
    let block = &pem[start..stop];

    if block.contains("Proc-Type: 4,ENCRYPTED") {
        return Err(SoapError::EncryptedPem);
    }

    Ok(RsaPrivateKey::from_pkcs1_pem(block)?)
}

/// Ids correlating the signature with the body and the security token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsseAuthIds {
    pub security_token_id: String,
    pub body_id: String,
}

impl WsseAuthIds {
    pub fn generate() -> Self {
        Self {
            security_token_id: format!("SecurityToken-{}", generate_token()),
            body_id: format!("Body-{}", generate_token()),
        }
    }
}

/// Hex SHA-1 of the current time and ten random bytes.
fn generate_token() -> String {
    let mut random = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut random);

    let mut hasher = Sha1::new();
    hasher.update(Local::now().to_rfc3339_opts(SecondsFormat::Secs, true).as_bytes());
    hasher.update(random);
    hex::encode(hasher.finalize())
}

/// The signed part of the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInfo {
    /// `#` followed by the body id
    pub reference_uri: String,
    /// Base64 SHA-1 of the canonical body
    pub digest_value: String,
}

fn algorithm(name: &str, uri: &str) -> Element {
    Element::new(name).with_attr("Algorithm", uri)
}

impl XmlEncode for SignedInfo {
    fn to_element(&self) -> Element {
        let reference = Element::new("Reference")
            .with_attr("URI", self.reference_uri.as_str())
            .with_child(
                Element::new("Transforms").with_child(algorithm("Transform", ALGORITHM_EXC_C14N)),
            )
            .with_child(algorithm("DigestMethod", ALGORITHM_SHA1))
            .with_child(Element::new("DigestValue").with_text(self.digest_value.as_str()));

        Element::new("SignedInfo")
            .with_default_namespace(DSIG_NS)
            .with_child(algorithm("CanonicalizationMethod", ALGORITHM_EXC_C14N))
            .with_child(algorithm("SignatureMethod", ALGORITHM_RSA_SHA1))
            .with_child(reference)
    }
}

/// The `wsse:Security` header produced by [`WsseAuthInfo::sign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeader {
    pub token_id: String,
    pub certificate: String,
    pub signed_info: SignedInfo,
    /// Base64 RSA signature over the SHA-1 of `signed_info`
    pub signature_value: String,
}

impl XmlEncode for SecurityHeader {
    fn to_element(&self) -> Element {
        let token = Element::new("BinarySecurityToken")
            .with_prefix("wsse", WSSE_NS)
            .with_attr("xmlns:wsu", WSU_NS)
            .with_attr("wsu:Id", self.token_id.as_str())
            .with_attr("EncodingType", ENCODING_TYPE_BASE64)
            .with_attr("ValueType", VALUE_TYPE_X509)
            .with_text(self.certificate.as_str());

        let key_info = Element::new("KeyInfo").with_child(
            Element::new("SecurityTokenReference")
                .with_prefix("wsse", WSSE_NS)
                .with_attr("xmlns:wsu", WSU_NS)
                .with_child(
                    Element::new("Reference")
                        .with_prefix("wsse", WSSE_NS)
                        .with_attr("ValueType", VALUE_TYPE_X509)
                        .with_attr("URI", format!("#{}", self.token_id)),
                ),
        );

        let signature = Element::new("Signature")
            .with_default_namespace(DSIG_NS)
            .with_child(self.signed_info.to_element())
            .with_child(Element::new("SignatureValue").with_text(self.signature_value.as_str()))
            .with_child(key_info);

        Element::new("Security")
            .with_prefix("wsse", WSSE_NS)
            .with_attr("xmlns:wsse", WSSE_NS)
            .with_child(token)
            .with_child(signature)
    }
}

impl<C: XmlEncode, D: XmlEncode> Envelope<C, D> {
    /// Sign the body and append the security header after any existing headers.
    pub fn sign_with(&mut self, info: &WsseAuthInfo) -> Result<()> {
        if self.body.content.is_none() {
            return Err(SoapError::EmptyEnvelope);
        }

        self.schema_namespaces = true;
        let ids = WsseAuthIds::generate();
        let header = info.sign(&mut self.body, &ids)?;
        self.add_header(header);
        Ok(())
    }
}
