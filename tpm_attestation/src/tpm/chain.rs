use std::time::{Duration, SystemTime, UNIX_EPOCH};

use x509_parser::prelude::*;

use super::errors::{TpmConfigError, TpmVerificationError};
use super::registry::TpmManufacturer;

/// The TPM vendors a deployment trusts, and their roots.
///
/// Built once at start-up and never mutated, so one store can be shared by every
/// verification.
#[derive(Debug, Clone)]
pub struct TrustStore {
    manufacturers: Vec<TpmManufacturer>,
    clock_skew: Duration,
}

impl TrustStore {
    /// Rejects an empty store, vendors without ids or roots, and roots that are not
    /// X.509 certificates.
    pub fn new(manufacturers: Vec<TpmManufacturer>) -> Result<Self, TpmConfigError> {
        if manufacturers.is_empty() {
            return Err(TpmConfigError::EmptyTrustAnchors);
        }

        for manufacturer in &manufacturers {
            if manufacturer.vendor_ids().is_empty() {
                return Err(TpmConfigError::UnknownManufacturer(
                    manufacturer.name().to_string(),
                ));
            }
            if manufacturer.roots().is_empty() {
                return Err(TpmConfigError::ManufacturerWithoutRoots(
                    manufacturer.name().to_string(),
                ));
            }
            for root in manufacturer.roots() {
                parse_certificate(root).map_err(|e| TpmConfigError::InvalidRoot {
                    manufacturer: manufacturer.name().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        tracing::debug!(
            "TPM trust store: {} manufacturers, {} roots",
            manufacturers.len(),
            manufacturers.iter().map(|m| m.roots().len()).sum::<usize>()
        );

        Ok(Self {
            manufacturers,
            clock_skew: Duration::ZERO,
        })
    }

    /// Tolerance applied to both ends of every validity period.
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    pub fn manufacturers(&self) -> &[TpmManufacturer] {
        &self.manufacturers
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    pub fn manufacturer_for_vendor_id(&self, vendor_id: &str) -> Option<&TpmManufacturer> {
        self.manufacturers.iter().find(|m| m.recognizes(vendor_id))
    }
}

/// Walks an `x5c` chain from the AIK certificate up to one of a manufacturer's roots.
#[derive(Debug, Clone, Copy)]
pub struct TrustChainValidator<'a> {
    manufacturer: &'a TpmManufacturer,
    clock_skew: Duration,
}

impl<'a> TrustChainValidator<'a> {
    pub fn new(manufacturer: &'a TpmManufacturer, clock_skew: Duration) -> Self {
        Self {
            manufacturer,
            clock_skew,
        }
    }

    pub fn validate(&self, x5c: &[Vec<u8>]) -> Result<(), TpmVerificationError> {
        self.validate_at(x5c, SystemTime::now())
    }

    /// Validates the chain as of `now`.
    ///
    /// Each certificate must be issued and signed by the next one, every issuer must
    /// be a CA, and the last certificate must be a trusted root or be signed by one.
    pub fn validate_at(
        &self,
        x5c: &[Vec<u8>],
        now: SystemTime,
    ) -> Result<(), TpmVerificationError> {
        let now = unix_seconds(now)?;
        let skew = i64::try_from(self.clock_skew.as_secs()).unwrap_or(i64::MAX);

        let chain = x5c
            .iter()
            .map(|der| parse_certificate(der))
            .collect::<Result<Vec<_>, _>>()?;

        let (Some(top), Some(top_der)) = (chain.last(), x5c.last()) else {
            return Err(TpmVerificationError::Statement(
                "Empty certificate chain".to_string(),
            ));
        };

        for (position, cert) in chain.iter().enumerate() {
            check_validity(cert, now, skew).map_err(|reason| {
                TpmVerificationError::UntrustedIssuer(format!(
                    "Certificate at position {position} {reason}"
                ))
            })?;
        }

        for (position, pair) in chain.windows(2).enumerate() {
            let (cert, issuer) = (&pair[0], &pair[1]);

            if !is_ca(issuer) {
                return Err(TpmVerificationError::UntrustedIssuer(format!(
                    "Issuer at position {} is not a CA certificate",
                    position + 1
                )));
            }

            if cert.issuer() != issuer.subject() {
                return Err(TpmVerificationError::UntrustedIssuer(format!(
                    "Certificate at position {position} was not issued by the next certificate \
                     in the chain"
                )));
            }

            cert.verify_signature(Some(issuer.public_key())).map_err(|e| {
                TpmVerificationError::UntrustedIssuer(format!(
                    "Signature of certificate at position {position} does not verify: {e}"
                ))
            })?;
        }

        if self.is_anchored(top, top_der, now, skew) {
            tracing::debug!(
                "Certificate chain of {} anchored at a {} root",
                chain.len(),
                self.manufacturer.name()
            );
            return Ok(());
        }

        Err(TpmVerificationError::UntrustedIssuer(format!(
            "Certificate chain does not lead to a trusted {} root",
            self.manufacturer.name()
        )))
    }

    fn is_anchored(&self, top: &X509Certificate<'_>, top_der: &[u8], now: i64, skew: i64) -> bool {
        self.manufacturer.roots().iter().any(|root_der| {
            if root_der.as_slice() == top_der {
                return true;
            }
            let Ok((_, root)) = X509Certificate::from_der(root_der) else {
                tracing::warn!("Skipping unparseable root of {}", self.manufacturer.name());
                return false;
            };
            top.issuer() == root.subject()
                && check_validity(&root, now, skew).is_ok()
                && top.verify_signature(Some(root.public_key())).is_ok()
        })
    }
}

/// Parses one DER certificate; trailing bytes are rejected.
pub(crate) fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, TpmVerificationError> {
    let (rest, cert) = X509Certificate::from_der(der).map_err(|e| {
        TpmVerificationError::Certificate(format!("Failed to parse certificate: {e}"))
    })?;
    if !rest.is_empty() {
        return Err(TpmVerificationError::Certificate(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }
    Ok(cert)
}

fn is_ca(cert: &X509Certificate<'_>) -> bool {
    matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca)
}

fn check_validity(cert: &X509Certificate<'_>, now: i64, skew: i64) -> Result<(), &'static str> {
    let validity = cert.validity();
    if now.saturating_add(skew) < validity.not_before.timestamp() {
        return Err("is not yet valid");
    }
    if now.saturating_sub(skew) > validity.not_after.timestamp() {
        return Err("has expired");
    }
    Ok(())
}

fn unix_seconds(time: SystemTime) -> Result<i64, TpmVerificationError> {
    let elapsed = time.duration_since(UNIX_EPOCH).map_err(|e| {
        TpmVerificationError::UntrustedIssuer(format!("System time error: {e}"))
    })?;
    Ok(i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
