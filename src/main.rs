//! Zentinel SOAP engine command line.
//!
//! Run with: `zentinel-soap-engine --config config.yaml <command>`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_engine::config::SigningConfig;
use zentinel_soap_engine::{
    canonicalize, decode_response, Element, Envelope, MediaType, Request, SoapEngineConfig,
    WsseAuthInfo, XmlEncode,
};

/// SOAP message engine for Zentinel.
///
/// Canonicalizes, signs and decodes SOAP messages from files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Canonicalize a subtree of an XML document
    Canonicalize {
        /// XML document
        file: PathBuf,

        /// Element path of the subtree (defaults to the configured request root)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Wrap a body element in an envelope, signing it when configured
    Sign {
        /// XML file holding the body element
        body: PathBuf,

        /// SOAPAction reported in the log
        #[arg(short, long, default_value = "")]
        action: String,

        /// Certificate PEM (overrides the configuration)
        #[arg(long)]
        certificate: Option<PathBuf>,

        /// Unencrypted PKCS#1 RSA key PEM (overrides the configuration)
        #[arg(long)]
        key: Option<PathBuf>,
    },

    /// Decode a response body and print its content or fault
    Decode {
        /// Response body
        file: PathBuf,

        /// Content-Type header of the response
        #[arg(long, default_value = "text/xml")]
        content_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel SOAP engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config).await?;
    info!(
        signing = config.signing.enabled,
        max_part_size = config.xop.max_part_size,
        request_root = %config.canonicalization.request_root,
        "Configuration loaded"
    );

    let output = match args.command {
        Command::Canonicalize { file, path } => {
            let xml = read_file(&file).await?;
            let path = path.unwrap_or_else(|| config.canonicalization.request_root.clone());
            canonicalize(&xml, &path).with_context(|| format!("Failed to canonicalize {}", path))?
        }
        Command::Sign {
            body,
            action,
            certificate,
            key,
        } => {
            let xml = read_file(&body).await?;
            let payload = Element::parse_bytes(&xml).context("Failed to parse body element")?;

            let signing = SigningConfig {
                enabled: config.signing.enabled || (certificate.is_some() && key.is_some()),
                certificate_path: certificate.or(config.signing.certificate_path.clone()),
                private_key_path: key.or(config.signing.private_key_path.clone()),
            };

            let mut request = Request::new(action, "", payload)
                .with_canonicalization_root(config.canonicalization.request_root.clone());
            if let Some(info) = load_auth_info(&signing).await? {
                request = request.sign_with(Arc::new(info));
            }
            info!(signed = request.is_signed(), action = %request.action(), "Serializing request");
            request.serialize().context("Failed to serialize request")?
        }
        Command::Decode { file, content_type } => {
            let body = read_file(&file).await?;
            let media_type = MediaType::parse(&content_type);
            let mut envelope: Envelope<Element> =
                Envelope::with_fault_detail(Element::default(), Element::default());
            decode_response(&media_type, body.as_slice(), &mut envelope, &config.xop)
                .context("Failed to decode response")?;

            match envelope.into_result() {
                Ok(content) => content.to_element().to_bytes(),
                Err(fault) => {
                    warn!(code = %fault.code, actor = %fault.actor, "Response is a SOAP fault");
                    let mut out = fault.to_string().into_bytes();
                    // The detail slot stays empty when the fault carried none.
                    if let Some(detail) = fault.detail().filter(|d| !d.name.is_empty()) {
                        out.push(b'\n');
                        out.extend(detail.to_bytes());
                    }
                    out
                }
            }
        }
    };

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&output).await.context("Failed to write output")?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    Ok(())
}

async fn load_config(path: &Path) -> Result<SoapEngineConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")
    } else {
        info!("Config file not found, using defaults");
        Ok(SoapEngineConfig::default())
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn load_auth_info(signing: &SigningConfig) -> Result<Option<WsseAuthInfo>> {
    if !signing.enabled {
        return Ok(None);
    }

    let certificate_path = signing
        .certificate_path
        .as_deref()
        .context("Signing enabled but no certificate path configured")?;
    let key_path = signing
        .private_key_path
        .as_deref()
        .context("Signing enabled but no private key path configured")?;

    let certificate = tokio::fs::read_to_string(certificate_path)
        .await
        .context("Failed to read certificate")?;
    let key = tokio::fs::read_to_string(key_path)
        .await
        .context("Failed to read private key")?;

    let info = WsseAuthInfo::from_pem(&certificate, &key).context("Failed to load signing key")?;
    info!(certificate = %certificate_path.display(), "Signing credentials loaded");
    Ok(Some(info))
}
