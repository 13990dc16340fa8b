//! Root CA lifecycle for the MITM proxy.
//!
//! Per-host leaf certificates are signed on the fly from a root CA kept on
//! disk. Replay suites tend to outlive the machines they were recorded on,
//! so the root is given an explicit validity window and rotated before it
//! runs out: a capture session started against a nearly-expired root would
//! otherwise fail TLS handshakes halfway through.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use hudsucker::certificate_authority::RcgenAuthority;
use hudsucker::rcgen::{CertificateParams, Issuer, KeyPair};
use hudsucker::rustls::crypto::aws_lc_rs::default_provider;

pub use crate::error::CaManagerError;

const CA_CERT_FILENAME: &str = "mimic-ca.crt";
const CA_KEY_FILENAME: &str = "mimic-ca.key";

/// Common name on the generated root certificate.
const CA_COMMON_NAME: &str = "Mimic Root CA";

/// Validity window of a generated root certificate.
const CA_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Roots within this margin of expiry are rotated eagerly, so a session
/// never starts on a root that could expire underneath it.
const ROTATION_MARGIN: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Manages the root CA certificate for the MITM proxy.
#[derive(Debug, Clone)]
pub struct CaManager {
    ca_dir: PathBuf,
}

impl CaManager {
    /// Creates a new CA manager with the given directory.
    pub fn new(ca_dir: impl AsRef<Path>) -> Self {
        Self {
            ca_dir: ca_dir.as_ref().to_path_buf(),
        }
    }

    /// Creates a CA manager using the default data directory.
    pub fn with_default_dir() -> Result<Self, CaManagerError> {
        let project_dirs = directories::ProjectDirs::from("dev", "mimic", "mimic")
            .ok_or_else(|| CaManagerError::Generation("Failed to get project dirs".into()))?;

        Ok(Self::new(project_dirs.data_dir().join("ca")))
    }

    /// Returns the path to the CA certificate file.
    pub fn cert_path(&self) -> PathBuf {
        self.ca_dir.join(CA_CERT_FILENAME)
    }

    /// Returns the path to the CA private key file.
    pub fn key_path(&self) -> PathBuf {
        self.ca_dir.join(CA_KEY_FILENAME)
    }

    /// Checks if the CA certificate exists.
    pub fn ca_exists(&self) -> bool {
        self.cert_path().exists() && self.key_path().exists()
    }

    /// Ensures a usable CA exists, generating or rotating it as needed.
    ///
    /// Returns the hudsucker RcgenAuthority ready for use with the proxy.
    pub fn ensure_ca(&self) -> Result<RcgenAuthority, CaManagerError> {
        if self.needs_rotation() {
            self.generate_ca()?;
        }
        self.load_authority()
    }

    /// A root needs (re)generation when it is missing, unreadable, or close
    /// enough to expiry that a long session could straddle it.
    pub fn needs_rotation(&self) -> bool {
        if !self.ca_exists() {
            return true;
        }

        match fs::metadata(self.cert_path()).and_then(|meta| meta.modified()) {
            Ok(created) => is_stale(created, SystemTime::now()),
            Err(err) => {
                tracing::warn!(error = %err, "could not read CA certificate age, rotating");
                true
            }
        }
    }

    /// Generates a fresh root CA certificate and key, replacing any
    /// existing pair.
    pub fn generate_ca(&self) -> Result<(), CaManagerError> {
        fs::create_dir_all(&self.ca_dir)?;

        let key_pair =
            KeyPair::generate().map_err(|e| CaManagerError::Generation(e.to_string()))?;
        let cert = build_root_params()?
            .self_signed(&key_pair)
            .map_err(|e| CaManagerError::Generation(e.to_string()))?;

        fs::write(self.cert_path(), cert.pem())
            .map_err(|e| CaManagerError::Write(e.to_string()))?;
        fs::write(self.key_path(), key_pair.serialize_pem())
            .map_err(|e| CaManagerError::Write(e.to_string()))?;

        tracing::info!(
            cert = ?self.cert_path(),
            valid_days = CA_VALIDITY.as_secs() / 86_400,
            "generated root CA certificate"
        );

        Ok(())
    }

    /// Loads the on-disk CA pair and creates a hudsucker authority.
    pub fn load_authority(&self) -> Result<RcgenAuthority, CaManagerError> {
        let cert_pem = fs::read_to_string(self.cert_path())?;
        let key_pem = fs::read_to_string(self.key_path())?;

        let key_pair =
            KeyPair::from_pem(&key_pem).map_err(|e| CaManagerError::Parse(e.to_string()))?;
        let issuer = Issuer::from_ca_cert_pem(&cert_pem, key_pair)
            .map_err(|e| CaManagerError::Parse(e.to_string()))?;

        Ok(RcgenAuthority::new(issuer, 1000, default_provider()))
    }
}

/// Certificate parameters for a signing root with an explicit validity
/// window anchored at the time of generation.
fn build_root_params() -> Result<CertificateParams, CaManagerError> {
    let mut params = CertificateParams::new(vec![CA_COMMON_NAME.to_string()])
        .map_err(|e| CaManagerError::Generation(e.to_string()))?;

    params.is_ca = hudsucker::rcgen::IsCa::Ca(hudsucker::rcgen::BasicConstraints::Unconstrained);
    params.key_usages = vec![
        hudsucker::rcgen::KeyUsagePurpose::KeyCertSign,
        hudsucker::rcgen::KeyUsagePurpose::CrlSign,
        hudsucker::rcgen::KeyUsagePurpose::DigitalSignature,
    ];
    params.extended_key_usages = vec![
        hudsucker::rcgen::ExtendedKeyUsagePurpose::ServerAuth,
        hudsucker::rcgen::ExtendedKeyUsagePurpose::ClientAuth,
    ];

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::try_from(CA_VALIDITY)
        .map_err(|e| CaManagerError::Generation(e.to_string()))?;

    Ok(params)
}

/// Whether a root created at `created` is within the rotation margin of its
/// expiry as of `now`.
fn is_stale(created: SystemTime, now: SystemTime) -> bool {
    let age = now.duration_since(created).unwrap_or(Duration::ZERO);
    age + ROTATION_MARGIN >= CA_VALIDITY
}
