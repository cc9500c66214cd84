//! CBOR decoding of WebAuthn attestation objects and `tpm` attestation statements.

use ciborium::value::Value as CborValue;

use super::cose::CoseAlgorithm;
use super::errors::TpmVerificationError;

/// Attestation statement format identifier for TPM attestation.
pub const TPM_ATTESTATION_FORMAT: &str = "tpm";

/// The only `ver` a `tpm` attestation statement may carry.
pub const TPM_ATTESTATION_VERSION: &str = "2.0";

/// A decoded WebAuthn attestation object.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub fmt: String,
    pub auth_data: Vec<u8>,
    pub att_stmt: Vec<(CborValue, CborValue)>,
}

impl AttestationObject {
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, TpmVerificationError> {
        let attestation_cbor: CborValue = ciborium::de::from_reader(bytes)
            .map_err(|e| TpmVerificationError::Statement(format!("Invalid CBOR data: {e}")))?;

        let CborValue::Map(map) = attestation_cbor else {
            return Err(TpmVerificationError::Statement(
                "Attestation object is not a CBOR map".to_string(),
            ));
        };

        let mut fmt = None;
        let mut auth_data = None;
        let mut att_stmt = None;

        for (key, value) in map {
            match (key, value) {
                (CborValue::Text(k), CborValue::Text(f)) if k == "fmt" => fmt = Some(f),
                (CborValue::Text(k), CborValue::Bytes(d)) if k == "authData" => auth_data = Some(d),
                (CborValue::Text(k), CborValue::Map(s)) if k == "attStmt" => att_stmt = Some(s),
                _ => {}
            }
        }

        tracing::debug!(
            "Attestation format: {:?}, auth data: {} bytes",
            fmt,
            auth_data.as_ref().map_or(0, Vec::len)
        );

        match (fmt, auth_data, att_stmt) {
            (Some(fmt), Some(auth_data), Some(att_stmt)) => Ok(Self {
                fmt,
                auth_data,
                att_stmt,
            }),
            _ => Err(TpmVerificationError::Statement(
                "Missing required attestation data".to_string(),
            )),
        }
    }

    /// Decodes `attStmt` as a `tpm` statement, rejecting any other format.
    pub fn tpm_statement(&self) -> Result<TpmAttestationStatement, TpmVerificationError> {
        if self.fmt != TPM_ATTESTATION_FORMAT {
            return Err(TpmVerificationError::Statement(format!(
                "Unsupported attestation format: {}",
                self.fmt
            )));
        }
        TpmAttestationStatement::from_att_stmt(&self.att_stmt)
    }
}

/// The `attStmt` map of a `tpm` attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmAttestationStatement {
    pub ver: String,
    pub alg: CoseAlgorithm,
    pub sig: Vec<u8>,
    /// AIK certificate first, then any intermediates toward the vendor root.
    pub x5c: Vec<Vec<u8>>,
    pub cert_info: Vec<u8>,
    pub pub_area: Vec<u8>,
}

impl TpmAttestationStatement {
    pub fn from_att_stmt(
        att_stmt: &[(CborValue, CborValue)],
    ) -> Result<Self, TpmVerificationError> {
        let mut ver: Option<String> = None;
        let mut alg: Option<i64> = None;
        let mut sig: Option<Vec<u8>> = None;
        let mut x5c: Option<Vec<Vec<u8>>> = None;
        let mut pub_area: Option<Vec<u8>> = None;
        let mut cert_info: Option<Vec<u8>> = None;

        for (key, value) in att_stmt {
            let CborValue::Text(k) = key else {
                continue;
            };
            match (k.as_str(), value) {
                ("ver", CborValue::Text(v)) => ver = Some(v.clone()),
                ("alg", CborValue::Integer(a)) => {
                    let id = i64::try_from(*a).map_err(|_| {
                        TpmVerificationError::Statement(
                            "Algorithm identifier out of range".to_string(),
                        )
                    })?;
                    alg = Some(id);
                }
                ("sig", CborValue::Bytes(s)) => sig = Some(s.clone()),
                ("x5c", CborValue::Array(certs)) => {
                    let chain = certs
                        .iter()
                        .map(|cert| match cert {
                            CborValue::Bytes(der) => Ok(der.clone()),
                            _ => Err(TpmVerificationError::Statement(
                                "x5c entries must be byte strings".to_string(),
                            )),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    x5c = Some(chain);
                }
                ("pubArea", CborValue::Bytes(p)) => pub_area = Some(p.clone()),
                ("certInfo", CborValue::Bytes(c)) => cert_info = Some(c.clone()),
                _ => {}
            }
        }

        let missing = |field: &str| {
            TpmVerificationError::Statement(format!("Missing {field} in TPM attestation"))
        };

        let ver = ver.ok_or_else(|| missing("version"))?;
        let alg = alg.ok_or_else(|| missing("algorithm"))?;
        let sig = sig.ok_or_else(|| missing("signature"))?;
        let x5c = x5c.ok_or_else(|| missing("certificate chain"))?;
        let pub_area = pub_area.ok_or_else(|| missing("pubArea"))?;
        let cert_info = cert_info.ok_or_else(|| missing("certInfo"))?;

        if ver != TPM_ATTESTATION_VERSION {
            return Err(TpmVerificationError::UnsupportedVersion(ver));
        }

        let alg =
            CoseAlgorithm::from_i64(alg).ok_or(TpmVerificationError::UnsupportedAlgorithm(alg))?;

        if x5c.is_empty() {
            return Err(TpmVerificationError::Statement(
                "Empty certificate chain in TPM attestation".to_string(),
            ));
        }

        Ok(Self {
            ver,
            alg,
            sig,
            x5c,
            cert_info,
            pub_area,
        })
    }

    /// The attestation identity key certificate.
    pub fn aik_certificate(&self) -> &[u8] {
        self.x5c.first().map(Vec::as_slice).unwrap_or_default()
    }
}
