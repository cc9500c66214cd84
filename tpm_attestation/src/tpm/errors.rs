use thiserror::Error;

use super::registry::{TpmAlg, TpmEccCurve, TpmStructureTag};

/// Structural errors raised while decoding TPM binary structures.
///
/// These always mean the input was malformed; they never describe a well-formed
/// structure that failed a semantic check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TpmParseError {
    /// A read needed more bytes than the input had left
    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// Bytes were left over after the structure was fully decoded
    #[error("Trailing data: {0} bytes left after structure")]
    TrailingData(usize),

    /// The `type` field of a TPMT_PUBLIC is neither RSA nor ECC
    #[error("Unsupported TPM key type: {0:#06x}")]
    UnsupportedKeyType(u16),

    /// A TPM2B_NAME too short to carry its algorithm identifier
    #[error("Malformed TPM name: {0}")]
    MalformedName(String),
}

/// The first condition that failed when comparing a credential key with the
/// key material declared in a TPMT_PUBLIC.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyMismatch {
    #[error("Credential key type mismatch: expected {expected}, found {found}")]
    KeyType {
        expected: &'static str,
        found: String,
    },

    #[error("RSA exponent mismatch: pubArea declares {expected}, credential has {found}")]
    Exponent { expected: u32, found: String },

    #[error("RSA modulus mismatch between credential and pubArea")]
    Modulus,

    #[error("Unsupported ECC curve in pubArea: {0:?}")]
    UnsupportedCurve(TpmEccCurve),

    #[error("ECC key derivation function must be TPM_ALG_NULL, found {0:?}")]
    KdfNotNull(TpmAlg),

    #[error("ECC curve mismatch: pubArea declares {expected:?}, credential has COSE curve {found}")]
    Curve { expected: TpmEccCurve, found: i64 },

    #[error("ECC coordinates mismatch between credential and pubArea")]
    Coordinates,
}

/// Violations of the TPM attestation certificate profile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileViolation {
    #[error("AIK certificate version must be 3, found {0}")]
    Version(u64),

    #[error("AIK certificate must have an empty subject field")]
    SubjectNotEmpty,

    #[error("AIK certificate must have a Subject Alternative Name extension")]
    SanMissing,

    #[error("AIK certificate Subject Alternative Name extension must be critical")]
    SanNotCritical,

    #[error("AIK certificate Subject Alternative Name lacks TPM manufacturer, model or version")]
    SanMissingTpmAttributes,

    #[error("AIK certificate names an unrecognized TPM manufacturer: {0}")]
    UnrecognizedManufacturer(String),

    #[error("AIK certificate must have the tcg-kp-AIKCertificate extended key usage")]
    EkuMissingAikPurpose,

    #[error("AIK certificate must not be a CA certificate")]
    CertificateIsCa,

    #[error(
        "AAGUID in AIK certificate ({certificate}) does not match authenticator data \
         ({authenticator})"
    )]
    AaguidMismatch {
        certificate: String,
        authenticator: String,
    },

    #[error("Malformed AIK certificate extension: {0}")]
    MalformedExtension(String),
}

/// Every way a TPM attestation can fail verification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TpmVerificationError {
    /// Error decoding the CBOR attestation object or statement
    #[error("Invalid attestation statement: {0}")]
    Statement(String),

    /// Error parsing the authenticator data or its credential public key
    #[error("Invalid authenticator data: {0}")]
    AuthenticatorData(String),

    /// Error decoding TPMT_PUBLIC or TPMS_ATTEST
    #[error("Malformed TPM structure: {0}")]
    Parse(#[from] TpmParseError),

    /// A certificate in x5c could not be decoded
    #[error("Malformed certificate: {0}")]
    Certificate(String),

    #[error("Unsupported TPM attestation version: {0}")]
    UnsupportedVersion(String),

    #[error("Unsupported algorithm for TPM attestation: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("Certificate profile violation: {0}")]
    Profile(#[from] ProfileViolation),

    #[error("Untrusted issuer: {0}")]
    UntrustedIssuer(String),

    #[error("Unsupported name algorithm: {0:?}")]
    UnsupportedNameAlgorithm(TpmAlg),

    #[error("The attested key does not match the public area")]
    NameMismatch,

    #[error("Invalid magic value: {0:#010x}, expected: 0xff544347")]
    InvalidMagic(u32),

    #[error("Invalid attestation type: {0:?}, expected TPM_ST_ATTEST_CERTIFY")]
    InvalidAttestationType(TpmStructureTag),

    #[error("extraData does not match the hash of authenticatorData and clientDataHash")]
    ExtraDataMismatch,

    #[error("Failed to verify TPM signature: {0}")]
    Signature(String),

    #[error("Credential public key does not match pubArea: {0}")]
    KeyMismatch(#[from] KeyMismatch),
}

impl TpmVerificationError {
    /// True when the failure came from malformed input rather than a well-formed
    /// attestation that did not check out.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Statement(_) | Self::AuthenticatorData(_) | Self::Parse(_) | Self::Certificate(_)
        )
    }
}

/// Errors building the trust configuration at start-up.
#[derive(Debug, Error)]
pub enum TpmConfigError {
    #[error("No trusted TPM manufacturer roots configured")]
    EmptyTrustAnchors,

    #[error("TPM manufacturer {0} has no trusted roots")]
    ManufacturerWithoutRoots(String),

    #[error("TPM manufacturer {0} is not in the TCG vendor registry and lists no vendor ids")]
    UnknownManufacturer(String),

    #[error("Invalid trusted root for {manufacturer}: {reason}")]
    InvalidRoot {
        manufacturer: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TPM manufacturer manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}
