mod attest;
mod chain;
pub(crate) mod codec;
mod config;
mod cose;
mod errors;
mod profile;
mod public;
mod registry;
mod statement;
mod type_verifier;
mod verifier;

pub use attest::{AttestedName, ClockInfo, TPM_GENERATED_VALUE, TpmsAttest};
pub use chain::{TrustChainValidator, TrustStore};
pub use config::load_manifest;
pub use cose::{
    AuthenticatorData, CoseAlgorithm, CoseEllipticCurve, CredentialPublicKey, KeyFamily,
};
pub use errors::{
    KeyMismatch, ProfileViolation, TpmConfigError, TpmParseError, TpmVerificationError,
};
pub use profile::{CertificateProfileReport, CertificateProfileValidator, TpmDeviceAttributes};
pub use public::TpmtPublic;
pub use registry::{
    TCG_VENDOR_IDS, TpmAlg, TpmEccCurve, TpmManufacturer, TpmStructureTag, tcg_vendor_ids,
};
pub use statement::{
    AttestationObject, TPM_ATTESTATION_FORMAT, TPM_ATTESTATION_VERSION, TpmAttestationStatement,
};
pub use type_verifier::{
    DEFAULT_RSA_EXPONENT, EccTypeVerifier, RsaTypeVerifier, TpmtUniqueParameter, TypeVerifier,
    UnsignedBigInt,
};
pub use verifier::{FailureKind, TpmVerifier, VerificationResponse};
