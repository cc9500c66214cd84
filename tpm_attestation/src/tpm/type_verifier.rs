//! Algorithm-specific parameters of a TPMT_PUBLIC and the checks that bind them
//! to a credential public key.

use std::hash::{Hash, Hasher};

use super::codec::{Cursor, put_sized, put_u16, put_u32};
use super::cose::CredentialPublicKey;
use super::errors::{KeyMismatch, TpmParseError};
use super::registry::{TpmAlg, TpmEccCurve};

/// Exponent implied by an encoded RSA exponent of zero.
pub const DEFAULT_RSA_EXPONENT: u32 = 65537;

/// Unsigned big-endian integer.
///
/// Keeps the bytes exactly as encoded, while equality and hashing look only at the
/// magnitude, so `00 01 00 01` and `01 00 01` are the same number.
#[derive(Debug, Clone)]
pub struct UnsignedBigInt(Vec<u8>);

impl UnsignedBigInt {
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn encoded(&self) -> &[u8] {
        &self.0
    }

    /// Big-endian bytes with leading zeros stripped; empty for zero.
    pub fn magnitude(&self) -> &[u8] {
        let start = self
            .0
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(self.0.len());
        &self.0[start..]
    }
}

impl PartialEq for UnsignedBigInt {
    fn eq(&self, other: &Self) -> bool {
        self.magnitude() == other.magnitude()
    }
}

impl Eq for UnsignedBigInt {}

impl Hash for UnsignedBigInt {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.magnitude().hash(state);
    }
}

/// The `unique` field of a TPMT_PUBLIC.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TpmtUniqueParameter {
    Rsa {
        modulus: UnsignedBigInt,
    },
    Ecc {
        x: UnsignedBigInt,
        y: UnsignedBigInt,
    },
}

impl TpmtUniqueParameter {
    /// True when the candidate key carries the same public material.
    pub fn verifies(&self, key: &CredentialPublicKey) -> bool {
        match (self, key) {
            (Self::Rsa { modulus }, CredentialPublicKey::Rsa { n, .. }) => {
                *modulus == UnsignedBigInt::from_be_bytes(n)
            }
            (Self::Ecc { x, y }, CredentialPublicKey::Ec2 { x: kx, y: ky, .. }) => {
                *x == UnsignedBigInt::from_be_bytes(kx) && *y == UnsignedBigInt::from_be_bytes(ky)
            }
            _ => false,
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Rsa { modulus } => put_sized(out, modulus.encoded()),
            Self::Ecc { x, y } => {
                put_sized(out, x.encoded());
                put_sized(out, y.encoded());
            }
        }
    }
}

/// TPMS_RSA_PARMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaTypeVerifier {
    symmetric: TpmAlg,
    scheme: TpmAlg,
    key_bits: [u8; 2],
    exponent: u32,
}

impl RsaTypeVerifier {
    pub fn new(symmetric: TpmAlg, scheme: TpmAlg, key_bits: u16, exponent: u32) -> Self {
        Self {
            symmetric,
            scheme,
            key_bits: key_bits.to_be_bytes(),
            exponent,
        }
    }

    fn parse(cursor: &mut Cursor<'_>) -> Result<Self, TpmParseError> {
        Ok(Self {
            symmetric: cursor.read_u16()?.into(),
            scheme: cursor.read_u16()?.into(),
            key_bits: cursor.read_array()?,
            exponent: cursor.read_u32()?,
        })
    }

    fn parse_unique(cursor: &mut Cursor<'_>) -> Result<TpmtUniqueParameter, TpmParseError> {
        let modulus = cursor.read_sized()?;
        Ok(TpmtUniqueParameter::Rsa {
            modulus: UnsignedBigInt::from_be_bytes(modulus),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        put_u16(out, self.symmetric.to_u16());
        put_u16(out, self.scheme.to_u16());
        out.extend_from_slice(&self.key_bits);
        put_u32(out, self.exponent);
    }

    pub fn symmetric(&self) -> TpmAlg {
        self.symmetric
    }

    pub fn scheme(&self) -> TpmAlg {
        self.scheme
    }

    pub fn key_bits(&self) -> u16 {
        u16::from_be_bytes(self.key_bits)
    }

    /// The public exponent, with an encoded zero read as 65537.
    pub fn exponent(&self) -> u32 {
        match self.exponent {
            0 => DEFAULT_RSA_EXPONENT,
            e => e,
        }
    }

    /// The exponent exactly as it was encoded.
    pub fn encoded_exponent(&self) -> u32 {
        self.exponent
    }

    pub fn verify(
        &self,
        key: &CredentialPublicKey,
        unique: &TpmtUniqueParameter,
    ) -> Result<(), KeyMismatch> {
        let CredentialPublicKey::Rsa { n, e } = key else {
            return Err(KeyMismatch::KeyType {
                expected: "RSA",
                found: key.key_type_name(),
            });
        };

        let candidate = UnsignedBigInt::from_be_bytes(e);
        if candidate != UnsignedBigInt::from_be_bytes(&self.exponent().to_be_bytes()) {
            return Err(KeyMismatch::Exponent {
                expected: self.exponent(),
                found: describe_integer(&candidate),
            });
        }

        match unique {
            TpmtUniqueParameter::Rsa { modulus }
                if *modulus == UnsignedBigInt::from_be_bytes(n) =>
            {
                Ok(())
            }
            _ => Err(KeyMismatch::Modulus),
        }
    }
}

/// TPMS_ECC_PARMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EccTypeVerifier {
    symmetric: TpmAlg,
    scheme: TpmAlg,
    curve: TpmEccCurve,
    kdf: TpmAlg,
}

impl EccTypeVerifier {
    pub fn new(symmetric: TpmAlg, scheme: TpmAlg, curve: TpmEccCurve, kdf: TpmAlg) -> Self {
        Self {
            symmetric,
            scheme,
            curve,
            kdf,
        }
    }

    fn parse(cursor: &mut Cursor<'_>) -> Result<Self, TpmParseError> {
        Ok(Self {
            symmetric: cursor.read_u16()?.into(),
            scheme: cursor.read_u16()?.into(),
            curve: cursor.read_u16()?.into(),
            kdf: cursor.read_u16()?.into(),
        })
    }

    fn parse_unique(cursor: &mut Cursor<'_>) -> Result<TpmtUniqueParameter, TpmParseError> {
        let x = cursor.read_sized()?;
        let y = cursor.read_sized()?;
        Ok(TpmtUniqueParameter::Ecc {
            x: UnsignedBigInt::from_be_bytes(x),
            y: UnsignedBigInt::from_be_bytes(y),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        put_u16(out, self.symmetric.to_u16());
        put_u16(out, self.scheme.to_u16());
        put_u16(out, self.curve.to_u16());
        put_u16(out, self.kdf.to_u16());
    }

    pub fn symmetric(&self) -> TpmAlg {
        self.symmetric
    }

    pub fn scheme(&self) -> TpmAlg {
        self.scheme
    }

    pub fn curve(&self) -> TpmEccCurve {
        self.curve
    }

    pub fn kdf(&self) -> TpmAlg {
        self.kdf
    }

    pub fn verify(
        &self,
        key: &CredentialPublicKey,
        unique: &TpmtUniqueParameter,
    ) -> Result<(), KeyMismatch> {
        let Some(cose_curve) = self.curve.cose_curve() else {
            return Err(KeyMismatch::UnsupportedCurve(self.curve));
        };

        let CredentialPublicKey::Ec2 { crv, .. } = key else {
            return Err(KeyMismatch::KeyType {
                expected: "EC2",
                found: key.key_type_name(),
            });
        };

        if self.kdf != TpmAlg::Null {
            return Err(KeyMismatch::KdfNotNull(self.kdf));
        }

        if *crv != cose_curve.id() {
            return Err(KeyMismatch::Curve {
                expected: self.curve,
                found: *crv,
            });
        }

        if !matches!(unique, TpmtUniqueParameter::Ecc { .. }) || !unique.verifies(key) {
            return Err(KeyMismatch::Coordinates);
        }

        Ok(())
    }
}

/// Key-type specific half of a TPMT_PUBLIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeVerifier {
    Rsa(RsaTypeVerifier),
    Ecc(EccTypeVerifier),
}

impl TypeVerifier {
    /// Reads the parameters for `key_type`; anything but RSA or ECC is rejected.
    pub(crate) fn parse(key_type: TpmAlg, cursor: &mut Cursor<'_>) -> Result<Self, TpmParseError> {
        match key_type {
            TpmAlg::Rsa => Ok(Self::Rsa(RsaTypeVerifier::parse(cursor)?)),
            TpmAlg::Ecc => Ok(Self::Ecc(EccTypeVerifier::parse(cursor)?)),
            other => Err(TpmParseError::UnsupportedKeyType(other.to_u16())),
        }
    }

    pub(crate) fn parse_unique(
        &self,
        cursor: &mut Cursor<'_>,
    ) -> Result<TpmtUniqueParameter, TpmParseError> {
        match self {
            Self::Rsa(_) => RsaTypeVerifier::parse_unique(cursor),
            Self::Ecc(_) => EccTypeVerifier::parse_unique(cursor),
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Rsa(rsa) => rsa.encode(out),
            Self::Ecc(ecc) => ecc.encode(out),
        }
    }

    pub fn key_type(&self) -> TpmAlg {
        match self {
            Self::Rsa(_) => TpmAlg::Rsa,
            Self::Ecc(_) => TpmAlg::Ecc,
        }
    }

    pub fn symmetric(&self) -> TpmAlg {
        match self {
            Self::Rsa(rsa) => rsa.symmetric(),
            Self::Ecc(ecc) => ecc.symmetric(),
        }
    }

    pub fn scheme(&self) -> TpmAlg {
        match self {
            Self::Rsa(rsa) => rsa.scheme(),
            Self::Ecc(ecc) => ecc.scheme(),
        }
    }

    /// Checks `key` against these parameters and `unique`, reporting the first
    /// condition that fails.
    pub fn verify(
        &self,
        key: &CredentialPublicKey,
        unique: &TpmtUniqueParameter,
    ) -> Result<(), KeyMismatch> {
        match self {
            Self::Rsa(rsa) => rsa.verify(key, unique),
            Self::Ecc(ecc) => ecc.verify(key, unique),
        }
    }

    pub fn verifies(&self, key: &CredentialPublicKey, unique: &TpmtUniqueParameter) -> bool {
        self.verify(key, unique).is_ok()
    }
}

fn describe_integer(value: &UnsignedBigInt) -> String {
    let magnitude = value.magnitude();
    if magnitude.len() <= 8 {
        let n = magnitude
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        n.to_string()
    } else {
        let hex: String = magnitude.iter().map(|b| format!("{b:02x}")).collect();
        format!("0x{hex}")
    }
}
