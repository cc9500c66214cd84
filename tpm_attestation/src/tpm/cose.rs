//! COSE algorithm identifiers and the credential key carried in authenticator data.

use ciborium::value::{Integer, Value as CborValue};
use ring::{digest, signature};

use super::codec::Cursor;
use super::errors::{TpmParseError, TpmVerificationError};

const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
const FLAG_EXTENSION_DATA: u8 = 0x80;

const COSE_KEY_KTY: i64 = 1;
const COSE_KTY_EC2: i64 = 2;
const COSE_KTY_RSA: i64 = 3;

/// Public-key family a signature algorithm operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
}

/// COSE algorithms a `tpm` attestation statement may declare in `alg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    Rs1,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    Es256,
    Es384,
    Es512,
}

impl CoseAlgorithm {
    pub fn from_i64(id: i64) -> Option<Self> {
        match id {
            -65535 => Some(Self::Rs1),
            -257 => Some(Self::Rs256),
            -258 => Some(Self::Rs384),
            -259 => Some(Self::Rs512),
            -37 => Some(Self::Ps256),
            -38 => Some(Self::Ps384),
            -39 => Some(Self::Ps512),
            -7 => Some(Self::Es256),
            -35 => Some(Self::Es384),
            -36 => Some(Self::Es512),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::Rs1 => -65535,
            Self::Rs256 => -257,
            Self::Rs384 => -258,
            Self::Rs512 => -259,
            Self::Ps256 => -37,
            Self::Ps384 => -38,
            Self::Ps512 => -39,
            Self::Es256 => -7,
            Self::Es384 => -35,
            Self::Es512 => -36,
        }
    }

    /// Hash used both for `extraData` and inside the signature scheme.
    pub fn digest_algorithm(self) -> &'static digest::Algorithm {
        match self {
            Self::Rs1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Rs256 | Self::Ps256 | Self::Es256 => &digest::SHA256,
            Self::Rs384 | Self::Ps384 | Self::Es384 => &digest::SHA384,
            Self::Rs512 | Self::Ps512 | Self::Es512 => &digest::SHA512,
        }
    }

    pub fn key_family(self) -> KeyFamily {
        match self {
            Self::Es256 | Self::Es384 | Self::Es512 => KeyFamily::Ec,
            _ => KeyFamily::Rsa,
        }
    }

    /// `None` when the crypto backend cannot verify this algorithm (ES512).
    pub(crate) fn verification_algorithm(
        self,
    ) -> Option<&'static dyn signature::VerificationAlgorithm> {
        match self {
            Self::Rs1 => Some(&signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY),
            Self::Rs256 => Some(&signature::RSA_PKCS1_2048_8192_SHA256),
            Self::Rs384 => Some(&signature::RSA_PKCS1_2048_8192_SHA384),
            Self::Rs512 => Some(&signature::RSA_PKCS1_2048_8192_SHA512),
            Self::Ps256 => Some(&signature::RSA_PSS_2048_8192_SHA256),
            Self::Ps384 => Some(&signature::RSA_PSS_2048_8192_SHA384),
            Self::Ps512 => Some(&signature::RSA_PSS_2048_8192_SHA512),
            Self::Es256 => Some(&signature::ECDSA_P256_SHA256_ASN1),
            Self::Es384 => Some(&signature::ECDSA_P384_SHA384_ASN1),
            Self::Es512 => None,
        }
    }
}

/// COSE elliptic curve identifiers (RFC 9053, table 18).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseEllipticCurve {
    P256,
    P384,
    P521,
}

impl CoseEllipticCurve {
    pub fn from_i64(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::P256),
            2 => Some(Self::P384),
            3 => Some(Self::P521),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::P256 => 1,
            Self::P384 => 2,
            Self::P521 => 3,
        }
    }
}

/// The candidate credential key, decoded from its COSE_Key form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPublicKey {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec2 { crv: i64, x: Vec<u8>, y: Vec<u8> },
    Other { kty: i64 },
}

impl CredentialPublicKey {
    pub fn from_cose_bytes(bytes: &[u8]) -> Result<Self, TpmVerificationError> {
        let value: CborValue = ciborium::de::from_reader(bytes).map_err(|e| {
            TpmVerificationError::AuthenticatorData(format!(
                "Failed to parse credential public key CBOR: {e}"
            ))
        })?;
        Self::from_cbor(&value)
    }

    pub fn from_cbor(value: &CborValue) -> Result<Self, TpmVerificationError> {
        let CborValue::Map(map) = value else {
            return Err(TpmVerificationError::AuthenticatorData(
                "Credential public key is not a CBOR map".to_string(),
            ));
        };

        let lookup = |label: i64| {
            map.iter().find_map(|(k, v)| match k {
                CborValue::Integer(i) if *i == Integer::from(label) => Some(v),
                _ => None,
            })
        };
        let bytes = |label: i64, field: &str| match lookup(label) {
            Some(CborValue::Bytes(b)) => Ok(b.clone()),
            _ => Err(TpmVerificationError::AuthenticatorData(format!(
                "Missing or invalid {field} in credential public key"
            ))),
        };
        let int = |label: i64, field: &str| match lookup(label) {
            Some(CborValue::Integer(i)) => i64::try_from(*i).map_err(|_| {
                TpmVerificationError::AuthenticatorData(format!(
                    "{field} out of range in credential public key"
                ))
            }),
            _ => Err(TpmVerificationError::AuthenticatorData(format!(
                "Missing or invalid {field} in credential public key"
            ))),
        };

        match int(COSE_KEY_KTY, "kty")? {
            COSE_KTY_RSA => Ok(Self::Rsa {
                n: bytes(-1, "n")?,
                e: bytes(-2, "e")?,
            }),
            COSE_KTY_EC2 => Ok(Self::Ec2 {
                crv: int(-1, "crv")?,
                x: bytes(-2, "x")?,
                y: bytes(-3, "y")?,
            }),
            kty => Ok(Self::Other { kty }),
        }
    }

    /// Human-readable key type for error reporting.
    pub fn key_type_name(&self) -> String {
        match self {
            Self::Rsa { .. } => "RSA".to_string(),
            Self::Ec2 { .. } => "EC2".to_string(),
            Self::Other { kty } => format!("kty {kty}"),
        }
    }
}

/// Authenticator data of a registration, with its attested credential data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    rp_id_hash: [u8; 32],
    flags: u8,
    sign_count: u32,
    aaguid: [u8; 16],
    credential_id: Vec<u8>,
    credential_public_key: CredentialPublicKey,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, TpmVerificationError> {
        let structural = |e: TpmParseError| TpmVerificationError::AuthenticatorData(e.to_string());

        let mut cursor = Cursor::new(bytes);
        let rp_id_hash = cursor.read_array::<32>().map_err(structural)?;
        let [flags] = cursor.read_array::<1>().map_err(structural)?;
        let sign_count = cursor.read_u32().map_err(structural)?;

        if flags & FLAG_ATTESTED_CREDENTIAL_DATA == 0 {
            return Err(TpmVerificationError::AuthenticatorData(
                "Attested credential data not present in authenticator data".to_string(),
            ));
        }

        let aaguid = cursor.read_array::<16>().map_err(structural)?;
        let credential_id = cursor.read_sized().map_err(structural)?.to_vec();
        if credential_id.is_empty() {
            return Err(TpmVerificationError::AuthenticatorData(
                "Empty credential ID".to_string(),
            ));
        }

        let mut rest = cursor.into_remaining();
        let key_value: CborValue = ciborium::de::from_reader(&mut rest).map_err(|e| {
            TpmVerificationError::AuthenticatorData(format!(
                "Failed to parse credential public key CBOR: {e}"
            ))
        })?;
        let credential_public_key = CredentialPublicKey::from_cbor(&key_value)?;

        if flags & FLAG_EXTENSION_DATA != 0 {
            let _extensions: CborValue = ciborium::de::from_reader(&mut rest).map_err(|e| {
                TpmVerificationError::AuthenticatorData(format!(
                    "Failed to parse extension data CBOR: {e}"
                ))
            })?;
        }
        if !rest.is_empty() {
            return Err(TpmVerificationError::AuthenticatorData(format!(
                "{} trailing bytes after attested credential data",
                rest.len()
            )));
        }

        tracing::debug!(
            "Authenticator data: flags={:#04x}, sign_count={}, aaguid={}",
            flags,
            sign_count,
            uuid::Uuid::from_bytes(aaguid)
        );

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            aaguid,
            credential_id,
            credential_public_key,
        })
    }

    pub fn rp_id_hash(&self) -> &[u8; 32] {
        &self.rp_id_hash
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    pub fn aaguid(&self) -> &[u8; 16] {
        &self.aaguid
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    pub fn credential_public_key(&self) -> &CredentialPublicKey {
        &self.credential_public_key
    }
}
