use std::sync::Arc;
use std::time::SystemTime;

use ring::digest;
use ring::signature::UnparsedPublicKey;
use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

use super::attest::{TPM_GENERATED_VALUE, TpmsAttest};
use super::chain::{TrustChainValidator, TrustStore, parse_certificate};
use super::cose::{AuthenticatorData, CoseAlgorithm, KeyFamily};
use super::errors::TpmVerificationError;
use super::profile::CertificateProfileValidator;
use super::public::TpmtPublic;
use super::registry::TpmStructureTag;
use super::statement::AttestationObject;

/// Whether a rejected attestation was malformed or well-formed but untrusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Structural,
    Semantic,
}

/// Outcome of a TPM attestation verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl VerificationResponse {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            failure: None,
        }
    }

    pub fn invalid(error: &TpmVerificationError) -> Self {
        let failure = if error.is_structural() {
            FailureKind::Structural
        } else {
            FailureKind::Semantic
        };
        Self {
            valid: false,
            reason: Some(error.to_string()),
            failure: Some(failure),
        }
    }
}

impl From<Result<(), TpmVerificationError>> for VerificationResponse {
    fn from(result: Result<(), TpmVerificationError>) -> Self {
        match result {
            Ok(()) => Self::valid(),
            Err(e) => Self::invalid(&e),
        }
    }
}

/// Checkpoints of the verification pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum VerificationStage {
    Start,
    CertProfileChecked,
    ChainTrusted,
    StructuresParsed,
    NameMatched,
    SignatureVerified,
    Done,
}

impl VerificationStage {
    fn advance(&mut self, next: VerificationStage) {
        tracing::debug!("TPM attestation: {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Verifies WebAuthn `tpm` attestations against a fixed set of trusted TPM vendors.
///
/// Cloning is cheap; clones share the trust store.
#[derive(Debug, Clone)]
pub struct TpmVerifier {
    trust_store: Arc<TrustStore>,
}

impl TpmVerifier {
    pub fn new(trust_store: TrustStore) -> Self {
        Self::with_shared_store(Arc::new(trust_store))
    }

    pub fn with_shared_store(trust_store: Arc<TrustStore>) -> Self {
        Self { trust_store }
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }

    /// Verifies a CBOR-encoded attestation object
    ///
    /// # Arguments
    /// * `attestation_object` - The raw `attestationObject` from the registration response
    /// * `client_data_hash` - Hash of the client data JSON
    ///
    /// # Returns
    /// * `VerificationResponse` - `valid` with no reason, or the reason for rejection
    pub fn verify_attestation_object(
        &self,
        attestation_object: &[u8],
        client_data_hash: &[u8],
    ) -> VerificationResponse {
        match AttestationObject::from_cbor(attestation_object) {
            Ok(object) => self.verify_x5c(&object, client_data_hash),
            Err(e) => {
                tracing::warn!("TPM attestation rejected: {}", e);
                VerificationResponse::invalid(&e)
            }
        }
    }

    /// Verifies a decoded attestation object whose statement carries an `x5c` chain
    ///
    /// # Arguments
    /// * `attestation` - The decoded attestation object
    /// * `client_data_hash` - Hash of the client data JSON
    ///
    /// # Returns
    /// * `VerificationResponse` - `valid` with no reason, or the reason for rejection
    pub fn verify_x5c(
        &self,
        attestation: &AttestationObject,
        client_data_hash: &[u8],
    ) -> VerificationResponse {
        self.verify_x5c_at(attestation, client_data_hash, SystemTime::now())
    }

    /// Same as [`TpmVerifier::verify_x5c`], with certificate validity judged at `now`.
    pub fn verify_x5c_at(
        &self,
        attestation: &AttestationObject,
        client_data_hash: &[u8],
        now: SystemTime,
    ) -> VerificationResponse {
        let mut stage = VerificationStage::Start;
        let result = self.run(attestation, client_data_hash, now, &mut stage);
        if let Err(e) = &result {
            tracing::warn!("TPM attestation rejected after {:?}: {}", stage, e);
        }
        result.into()
    }

    fn run(
        &self,
        attestation: &AttestationObject,
        client_data_hash: &[u8],
        now: SystemTime,
        stage: &mut VerificationStage,
    ) -> Result<(), TpmVerificationError> {
        let statement = attestation.tpm_statement()?;
        let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
        let aik_cert = parse_certificate(statement.aik_certificate())?;

        let manufacturer = CertificateProfileValidator::new(&self.trust_store)
            .validate(&aik_cert, auth_data.aaguid())
            .into_result()?;
        stage.advance(VerificationStage::CertProfileChecked);

        TrustChainValidator::new(manufacturer, self.trust_store.clock_skew())
            .validate_at(&statement.x5c, now)?;
        stage.advance(VerificationStage::ChainTrusted);

        let cert_info = TpmsAttest::parse(&statement.cert_info)?;
        let pub_area = TpmtPublic::parse(&statement.pub_area)?;
        stage.advance(VerificationStage::StructuresParsed);

        verify_name(&pub_area, &statement.pub_area, &cert_info)?;
        stage.advance(VerificationStage::NameMatched);

        if cert_info.magic() != TPM_GENERATED_VALUE {
            return Err(TpmVerificationError::InvalidMagic(cert_info.magic()));
        }
        if cert_info.attest_type() != TpmStructureTag::AttestCertify {
            return Err(TpmVerificationError::InvalidAttestationType(
                cert_info.attest_type(),
            ));
        }

        // extraData must be the hash of attToBeSigned under the statement's algorithm
        let mut att_to_be_signed = attestation.auth_data.clone();
        att_to_be_signed.extend_from_slice(client_data_hash);
        let expected = digest::digest(statement.alg.digest_algorithm(), &att_to_be_signed);
        if expected.as_ref() != cert_info.extra_data() {
            return Err(TpmVerificationError::ExtraDataMismatch);
        }

        verify_signature(
            &aik_cert,
            statement.alg,
            &statement.cert_info,
            &statement.sig,
        )?;
        stage.advance(VerificationStage::SignatureVerified);

        pub_area.verify_key(auth_data.credential_public_key())?;
        stage.advance(VerificationStage::Done);

        tracing::debug!(
            "TPM attestation verified: manufacturer={}, alg={:?}",
            manufacturer.name(),
            statement.alg
        );
        Ok(())
    }
}

/// The attested name must be `nameAlg || H_nameAlg(pubArea)`.
fn verify_name(
    pub_area: &TpmtPublic,
    pub_area_bytes: &[u8],
    cert_info: &TpmsAttest,
) -> Result<(), TpmVerificationError> {
    let name_alg = pub_area.name_alg();
    let digest_alg = name_alg
        .name_digest()
        .ok_or(TpmVerificationError::UnsupportedNameAlgorithm(name_alg))?;

    let mut expected = name_alg.to_u16().to_be_bytes().to_vec();
    expected.extend_from_slice(digest::digest(digest_alg, pub_area_bytes).as_ref());

    if expected != cert_info.attested().name() {
        return Err(TpmVerificationError::NameMismatch);
    }
    Ok(())
}

/// Verifies `signature` over the raw certInfo bytes with the AIK certificate key.
fn verify_signature(
    aik_cert: &X509Certificate<'_>,
    alg: CoseAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> Result<(), TpmVerificationError> {
    let spki = aik_cert.public_key();
    let key_algorithm = spki.algorithm.algorithm.as_bytes();
    let family_matches = match alg.key_family() {
        KeyFamily::Rsa => key_algorithm == oid_registry::OID_PKCS1_RSAENCRYPTION.as_bytes(),
        KeyFamily::Ec => key_algorithm == oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY.as_bytes(),
    };
    if !family_matches {
        return Err(TpmVerificationError::Signature(format!(
            "AIK certificate key cannot verify {alg:?} signatures"
        )));
    }

    let algorithm = alg
        .verification_algorithm()
        .ok_or(TpmVerificationError::UnsupportedAlgorithm(alg.id()))?;

    UnparsedPublicKey::new(algorithm, spki.subject_public_key.data.as_ref())
        .verify(message, signature)
        .map_err(|_| {
            TpmVerificationError::Signature("signature over certInfo is invalid".to_string())
        })
}
