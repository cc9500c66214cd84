//! Conformance of an AIK certificate to the TPM attestation certificate profile.

use uuid::Uuid;
use x509_parser::der_parser::{
    ber::BerObjectContent,
    der::{parse_der, parse_der_tagged_explicit},
};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use super::chain::TrustStore;
use super::errors::ProfileViolation;
use super::registry::TpmManufacturer;

// TCG attribute OIDs carried in the SAN, as otherName type-ids or directoryName
// attributes: 2.23.133.2.{1,2,3}
const OID_TCG_AT_TPM_MANUFACTURER: &[u8] = &[0x67, 0x81, 0x05, 0x02, 0x01];
const OID_TCG_AT_TPM_MODEL: &[u8] = &[0x67, 0x81, 0x05, 0x02, 0x02];
const OID_TCG_AT_TPM_VERSION: &[u8] = &[0x67, 0x81, 0x05, 0x02, 0x03];
// OID for TCG-KP-AIKCertificate: 2.23.133.8.3
const OID_TCG_KP_AIK_CERTIFICATE: &[u8] = &[0x67, 0x81, 0x05, 0x08, 0x03];
// OID for FIDO AAGUID extension: 1.3.6.1.4.1.45724.1.1.4
const OID_FIDO_GEN_CE_AAGUID: &[u8] = &[
    0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0xE5, 0x1C, 0x01, 0x01, 0x04,
];

/// TPM identity read from the SAN of an AIK certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmDeviceAttributes {
    pub manufacturer: String,
    pub model: String,
    pub version: String,
}

/// Outcome of profile validation: every violation found, in check order.
#[derive(Debug, Clone)]
pub struct CertificateProfileReport<'a> {
    violations: Vec<ProfileViolation>,
    device: Option<TpmDeviceAttributes>,
    manufacturer: Option<&'a TpmManufacturer>,
}

impl<'a> CertificateProfileReport<'a> {
    pub fn is_conformant(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[ProfileViolation] {
        &self.violations
    }

    pub fn device(&self) -> Option<&TpmDeviceAttributes> {
        self.device.as_ref()
    }

    /// The configured manufacturer the certificate names, when recognized.
    pub fn manufacturer(&self) -> Option<&'a TpmManufacturer> {
        self.manufacturer
    }

    /// The recognized manufacturer, or the first violation.
    pub fn into_result(self) -> Result<&'a TpmManufacturer, ProfileViolation> {
        match (self.violations.into_iter().next(), self.manufacturer) {
            (Some(violation), _) => Err(violation),
            (None, Some(manufacturer)) => Ok(manufacturer),
            (None, None) => Err(ProfileViolation::SanMissingTpmAttributes),
        }
    }
}

/// Checks AIK certificates against the TPM certificate profile.
#[derive(Debug, Clone, Copy)]
pub struct CertificateProfileValidator<'a> {
    trust_store: &'a TrustStore,
}

impl<'a> CertificateProfileValidator<'a> {
    pub fn new(trust_store: &'a TrustStore) -> Self {
        Self { trust_store }
    }

    /// Runs every profile check on `cert`. `aaguid` is the authenticator's AAGUID.
    pub fn validate(
        &self,
        cert: &X509Certificate<'_>,
        aaguid: &[u8; 16],
    ) -> CertificateProfileReport<'a> {
        let mut violations = Vec::new();
        let mut device = None;
        let mut manufacturer = None;

        if cert.version() != X509Version::V3 {
            violations.push(ProfileViolation::Version(u64::from(cert.version().0) + 1));
        }

        if cert.subject().iter_attributes().next().is_some() {
            violations.push(ProfileViolation::SubjectNotEmpty);
        }

        match cert.subject_alternative_name() {
            Ok(Some(san)) => {
                if !san.critical {
                    violations.push(ProfileViolation::SanNotCritical);
                }
                match tpm_device_attributes(&san.value.general_names) {
                    Ok(Some(attributes)) => {
                        manufacturer = self
                            .trust_store
                            .manufacturer_for_vendor_id(&attributes.manufacturer);
                        if manufacturer.is_none() {
                            violations.push(ProfileViolation::UnrecognizedManufacturer(
                                attributes.manufacturer.clone(),
                            ));
                        }
                        device = Some(attributes);
                    }
                    Ok(None) => violations.push(ProfileViolation::SanMissingTpmAttributes),
                    Err(violation) => violations.push(violation),
                }
            }
            Ok(None) => violations.push(ProfileViolation::SanMissing),
            Err(e) => violations.push(ProfileViolation::MalformedExtension(format!(
                "Subject Alternative Name: {e}"
            ))),
        }

        match cert.extended_key_usage() {
            Ok(Some(eku))
                if eku
                    .value
                    .other
                    .iter()
                    .any(|oid| oid.as_bytes() == OID_TCG_KP_AIK_CERTIFICATE) => {}
            Ok(_) => violations.push(ProfileViolation::EkuMissingAikPurpose),
            Err(e) => violations.push(ProfileViolation::MalformedExtension(format!(
                "Extended Key Usage: {e}"
            ))),
        }

        match cert.basic_constraints() {
            Ok(Some(bc)) if bc.value.ca => violations.push(ProfileViolation::CertificateIsCa),
            Ok(_) => {}
            Err(e) => violations.push(ProfileViolation::MalformedExtension(format!(
                "Basic Constraints: {e}"
            ))),
        }

        if let Some(ext) = cert
            .extensions()
            .iter()
            .find(|ext| ext.oid.as_bytes() == OID_FIDO_GEN_CE_AAGUID)
        {
            match extract_aaguid(ext.value) {
                Some(certificate) if &certificate == aaguid => {}
                Some(certificate) => violations.push(ProfileViolation::AaguidMismatch {
                    certificate: Uuid::from_bytes(certificate).to_string(),
                    authenticator: Uuid::from_bytes(*aaguid).to_string(),
                }),
                None => violations.push(ProfileViolation::MalformedExtension(
                    "Invalid AAGUID extension format".to_string(),
                )),
            }
        }

        if !violations.is_empty() {
            tracing::debug!("AIK certificate profile violations: {:?}", violations);
        }

        CertificateProfileReport {
            violations,
            device,
            manufacturer,
        }
    }
}

/// Finds the TCG manufacturer, model and version attributes among the SAN's
/// `otherName` entries and directory names. `Ok(None)` when any of the three
/// is absent.
fn tpm_device_attributes(
    names: &[GeneralName<'_>],
) -> Result<Option<TpmDeviceAttributes>, ProfileViolation> {
    // manufacturer, model, version
    let mut found: [Option<String>; 3] = Default::default();

    for name in names {
        match name {
            GeneralName::OtherName(type_id, value) => {
                if let Some(slot) = attribute_slot(type_id.as_bytes()) {
                    found[slot] = Some(other_name_value(value)?);
                }
            }
            GeneralName::DirectoryName(directory) => {
                for attr in directory.iter_attributes() {
                    let Some(slot) = attribute_slot(attr.attr_type().as_bytes()) else {
                        continue;
                    };
                    let value = attr.attr_value().as_str().map_err(|e| {
                        ProfileViolation::MalformedExtension(format!(
                            "TPM attribute is not a string: {e}"
                        ))
                    })?;
                    found[slot] = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(match found {
        [Some(manufacturer), Some(model), Some(version)] => Some(TpmDeviceAttributes {
            manufacturer,
            model,
            version,
        }),
        _ => None,
    })
}

fn attribute_slot(oid: &[u8]) -> Option<usize> {
    match oid {
        OID_TCG_AT_TPM_MANUFACTURER => Some(0),
        OID_TCG_AT_TPM_MODEL => Some(1),
        OID_TCG_AT_TPM_VERSION => Some(2),
        _ => None,
    }
}

/// String under the `[0] EXPLICIT` value of an `otherName`.
fn other_name_value(value: &[u8]) -> Result<String, ProfileViolation> {
    let malformed = || {
        ProfileViolation::MalformedExtension("TPM otherName value is not a string".to_string())
    };
    let (_, tagged) = parse_der_tagged_explicit(0u32, parse_der)(value).map_err(|_| malformed())?;
    match tagged.content {
        BerObjectContent::Tagged(_, _, inner) => {
            inner.as_str().map(str::to_string).map_err(|_| malformed())
        }
        _ => Err(malformed()),
    }
}

fn extract_aaguid(value: &[u8]) -> Option<[u8; 16]> {
    let (_, parsed) = parse_der(value).ok()?;
    match parsed.content {
        BerObjectContent::OctetString(content) => content.try_into().ok(),
        _ => None,
    }
}
