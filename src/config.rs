//! Configuration types for the SOAP engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the SOAP engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoapEngineConfig {
    /// Config version
    pub version: String,

    /// XOP (multipart) decoding limits
    pub xop: XopConfig,

    /// WS-Security signing of outbound requests
    pub signing: SigningConfig,

    /// Canonicalization of outbound requests
    pub canonicalization: CanonicalizationConfig,
}

impl Default for SoapEngineConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            xop: XopConfig::default(),
            signing: SigningConfig::default(),
            canonicalization: CanonicalizationConfig::default(),
        }
    }
}

/// XOP decoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XopConfig {
    /// Maximum size of a single MIME part (bytes)
    pub max_part_size: usize,

    /// Size of the chunks handed from the re-serializer to the decoder (bytes)
    pub pipe_chunk_size: usize,
}

impl Default for XopConfig {
    fn default() -> Self {
        Self {
            max_part_size: 16_777_216, // 16MB
            pipe_chunk_size: 8192,
        }
    }
}

/// Signing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SigningConfig {
    /// Sign outbound requests
    pub enabled: bool,

    /// PEM file holding the X.509 certificate
    pub certificate_path: Option<PathBuf>,

    /// PEM file holding the unencrypted PKCS#1 RSA private key
    pub private_key_path: Option<PathBuf>,
}

/// Canonicalization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalizationConfig {
    /// Element path of the subtree canonicalized before sending a signed request
    pub request_root: String,
}

impl Default for CanonicalizationConfig {
    fn default() -> Self {
        Self {
            request_root: "Envelope/Body".to_string(),
        }
    }
}
