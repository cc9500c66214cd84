use super::codec::{Cursor, put_sized, put_u16, put_u32};
use super::cose::CredentialPublicKey;
use super::errors::{KeyMismatch, TpmParseError};
use super::registry::TpmAlg;
use super::type_verifier::{TpmtUniqueParameter, TypeVerifier};

/// TPMT_PUBLIC: the public area of the key the TPM certified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    key_type: TpmAlg,
    name_alg: TpmAlg,
    object_attributes: u32,
    auth_policy: Vec<u8>,
    type_verifier: TypeVerifier,
    unique: TpmtUniqueParameter,
}

impl TpmtPublic {
    /// Decodes a complete TPMT_PUBLIC. Every input byte must be consumed.
    pub fn parse(bytes: &[u8]) -> Result<Self, TpmParseError> {
        let mut cursor = Cursor::new(bytes);

        let key_type = TpmAlg::from_u16(cursor.read_u16()?);
        let name_alg = TpmAlg::from_u16(cursor.read_u16()?);
        let object_attributes = cursor.read_u32()?;
        let auth_policy = cursor.read_sized()?.to_vec();

        let type_verifier = TypeVerifier::parse(key_type, &mut cursor)?;
        let unique = type_verifier.parse_unique(&mut cursor)?;
        cursor.finish()?;

        Ok(Self {
            key_type,
            name_alg,
            object_attributes,
            auth_policy,
            type_verifier,
            unique,
        })
    }

    /// Re-serializes the structure; for parsed input this is the original bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, self.key_type.to_u16());
        put_u16(&mut out, self.name_alg.to_u16());
        put_u32(&mut out, self.object_attributes);
        put_sized(&mut out, &self.auth_policy);
        self.type_verifier.encode(&mut out);
        self.unique.encode(&mut out);
        out
    }

    pub fn key_type(&self) -> TpmAlg {
        self.key_type
    }

    pub fn name_alg(&self) -> TpmAlg {
        self.name_alg
    }

    pub fn object_attributes(&self) -> u32 {
        self.object_attributes
    }

    pub fn auth_policy(&self) -> &[u8] {
        &self.auth_policy
    }

    pub fn type_verifier(&self) -> &TypeVerifier {
        &self.type_verifier
    }

    pub fn unique(&self) -> &TpmtUniqueParameter {
        &self.unique
    }

    /// Checks that `key` is the key this public area describes.
    pub fn verify_key(&self, key: &CredentialPublicKey) -> Result<(), KeyMismatch> {
        self.type_verifier.verify(key, &self.unique)
    }
}
