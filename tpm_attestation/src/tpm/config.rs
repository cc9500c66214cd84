use std::env;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;
use x509_parser::pem::Pem;

use super::chain::TrustStore;
use super::errors::TpmConfigError;
use super::registry::{TpmManufacturer, tcg_vendor_ids};
use super::verifier::TpmVerifier;

pub(super) static TPM_MANUFACTURERS_FILE: LazyLock<Option<String>> =
    LazyLock::new(manufacturers_file_from_env);

pub(super) static TPM_ALLOWED_CLOCK_SKEW_SECS: LazyLock<u64> =
    LazyLock::new(clock_skew_secs_from_env);

fn manufacturers_file_from_env() -> Option<String> {
    env::var("TPM_MANUFACTURERS_FILE")
        .ok()
        .filter(|path| !path.trim().is_empty())
}

fn clock_skew_secs_from_env() -> u64 {
    match env::var("TPM_ALLOWED_CLOCK_SKEW_SECS") {
        Err(_) => 0,
        Ok(v) => v.trim().parse::<u64>().unwrap_or_else(|_| {
            tracing::warn!("Invalid TPM_ALLOWED_CLOCK_SKEW_SECS: {}. Using default 0", v);
            0
        }),
    }
}

/// One entry of the manufacturer manifest.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    /// Defaults to the TCG registry ids for `name`.
    #[serde(default)]
    vendor_ids: Option<Vec<String>>,
    /// PEM or DER files, relative to the manifest's directory.
    roots: Vec<String>,
}

/// Reads a JSON manifest of trusted TPM manufacturers and loads their roots.
///
/// ```json
/// [{ "name": "Infineon", "roots": ["infineon/root.pem"] }]
/// ```
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<TpmManufacturer>, TpmConfigError> {
    let path = path.as_ref();
    let content = read_file(path)?;
    let entries: Vec<ManifestEntry> = serde_json::from_slice(&content)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    entries
        .into_iter()
        .map(|entry| {
            let vendor_ids = match entry.vendor_ids {
                Some(ids) if !ids.is_empty() => ids,
                _ => tcg_vendor_ids(&entry.name),
            };
            if vendor_ids.is_empty() {
                return Err(TpmConfigError::UnknownManufacturer(entry.name));
            }

            let mut roots = Vec::new();
            for root in &entry.roots {
                roots.extend(load_roots(&base_dir.join(root), &entry.name)?);
            }

            tracing::debug!(
                "Loaded TPM manufacturer {}: vendor ids {:?}, {} roots",
                entry.name,
                vendor_ids,
                roots.len()
            );
            Ok(TpmManufacturer::new(entry.name, vendor_ids, roots))
        })
        .collect()
}

/// All certificates in a root file, as DER.
fn load_roots(path: &Path, manufacturer: &str) -> Result<Vec<Vec<u8>>, TpmConfigError> {
    let content = read_file(path)?;
    if !content.starts_with(b"-----BEGIN") {
        return Ok(vec![content]);
    }

    let mut roots = Vec::new();
    for pem in Pem::iter_from_buffer(&content) {
        let pem = pem.map_err(|e| TpmConfigError::InvalidRoot {
            manufacturer: manufacturer.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        if pem.label == "CERTIFICATE" {
            roots.push(pem.contents);
        }
    }
    if roots.is_empty() {
        return Err(TpmConfigError::InvalidRoot {
            manufacturer: manufacturer.to_string(),
            reason: format!("{} holds no certificate", path.display()),
        });
    }
    Ok(roots)
}

fn read_file(path: &Path) -> Result<Vec<u8>, TpmConfigError> {
    std::fs::read(path).map_err(|source| TpmConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

impl TrustStore {
    /// Builds the store from the manifest named by `TPM_MANUFACTURERS_FILE`, with
    /// `TPM_ALLOWED_CLOCK_SKEW_SECS` as clock skew.
    pub fn from_env() -> Result<Self, TpmConfigError> {
        let path = TPM_MANUFACTURERS_FILE.as_deref().ok_or_else(|| {
            TpmConfigError::Config("TPM_MANUFACTURERS_FILE must be set".to_string())
        })?;
        Ok(Self::from_manifest(PathBuf::from(path))?
            .with_clock_skew(Duration::from_secs(*TPM_ALLOWED_CLOCK_SKEW_SECS)))
    }

    pub fn from_manifest(path: impl AsRef<Path>) -> Result<Self, TpmConfigError> {
        Self::new(load_manifest(path)?)
    }
}

impl TpmVerifier {
    /// A verifier over [`TrustStore::from_env`].
    pub fn from_env() -> Result<Self, TpmConfigError> {
        Ok(Self::new(TrustStore::from_env()?))
    }
}
