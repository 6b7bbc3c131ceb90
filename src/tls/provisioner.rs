//! Certificate pair provisioning
//!
//! If either file of the pair is missing, a new self-signed pair is created,
//! either by running the `openssl` command line tool or in-process with rcgen.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::TlsError;

/// How a missing certificate pair gets created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provisioner {
    /// Run `openssl req -x509` (requires openssl on PATH)
    #[default]
    OpenSsl,
    /// Generate in-process with rcgen
    SelfSigned,
}

/// TLS certificate locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM certificate chain
    pub cert_path: PathBuf,
    /// PEM private key
    pub key_path: PathBuf,
    /// Used only when a file is missing
    pub provisioner: Provisioner,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("cert.key"),
            provisioner: Provisioner::default(),
        }
    }
}

impl TlsConfig {
    /// Use the given certificate and key files
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ..Default::default()
        }
    }

    /// Use `cert.pem` and `cert.key` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("cert.pem"), dir.join("cert.key"))
    }

    /// Set the provisioner
    pub fn provisioner(mut self, provisioner: Provisioner) -> Self {
        self.provisioner = provisioner;
        self
    }
}

/// Make sure the certificate pair exists
///
/// Returns `true` if a new pair was generated. `hostnames` become subject
/// alternative names when rcgen is used.
pub async fn ensure_cert_pair(config: &TlsConfig, hostnames: &[String]) -> Result<bool, TlsError> {
    if config.cert_path.exists() && config.key_path.exists() {
        return Ok(false);
    }

    for path in [&config.cert_path, &config.key_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    match config.provisioner {
        Provisioner::OpenSsl => run_openssl(&config.cert_path, &config.key_path).await?,
        Provisioner::SelfSigned => {
            generate_self_signed(&config.cert_path, &config.key_path, hostnames).await?
        }
    }

    tracing::warn!(
        cert = %config.cert_path.display(),
        key = %config.key_path.display(),
        "Created self-signed TLS certificate, consider replacing it with a real one"
    );

    Ok(true)
}

async fn run_openssl(cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
    let output = Command::new("openssl")
        .args(["req", "-nodes", "-new", "-x509", "-keyout"])
        .arg(key_path)
        .arg("-out")
        .arg(cert_path)
        .args(["-subj", "/", "-days", "10000"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| TlsError::Provision(format!("failed to run openssl: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TlsError::Provision(format!(
            "openssl exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

async fn generate_self_signed(
    cert_path: &Path,
    key_path: &Path,
    hostnames: &[String],
) -> Result<(), TlsError> {
    let mut names = vec!["localhost".to_string()];
    for host in hostnames {
        if !names.contains(host) {
            names.push(host.clone());
        }
    }

    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names)?;

    tokio::fs::write(cert_path, cert.pem()).await?;
    tokio::fs::write(key_path, key_pair.serialize_pem()).await?;
    Ok(())
}
