//! Closed registries of TPM 2.0 identifiers and TPM vendor identities.
//!
//! Codes the registries do not know map to an explicit `Unknown` variant instead of a
//! parse error: they may legally appear in fields the verifier never interprets.

use ring::digest;

use super::cose::CoseEllipticCurve;

macro_rules! tpm_registry {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $code:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Unknown(u16),
        }

        impl $name {
            pub fn from_u16(code: u16) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    other => Self::Unknown(other),
                }
            }

            pub fn to_u16(self) -> u16 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Unknown(code) => code,
                }
            }
        }

        impl From<u16> for $name {
            fn from(code: u16) -> Self {
                Self::from_u16(code)
            }
        }

        impl From<$name> for u16 {
            fn from(value: $name) -> Self {
                value.to_u16()
            }
        }
    };
}

tpm_registry! {
    /// TPM_ALG_ID (TPM 2.0 Part 2, 6.3)
    TpmAlg {
        Error = 0x0000,
        Rsa = 0x0001,
        Sha1 = 0x0004,
        Hmac = 0x0005,
        Aes = 0x0006,
        Mgf1 = 0x0007,
        KeyedHash = 0x0008,
        Xor = 0x000A,
        Sha256 = 0x000B,
        Sha384 = 0x000C,
        Sha512 = 0x000D,
        Null = 0x0010,
        Sm3_256 = 0x0012,
        Sm4 = 0x0013,
        RsaSsa = 0x0014,
        RsaEs = 0x0015,
        RsaPss = 0x0016,
        Oaep = 0x0017,
        Ecdsa = 0x0018,
        Ecdh = 0x0019,
        Ecdaa = 0x001A,
        Sm2 = 0x001B,
        EcSchnorr = 0x001C,
        EcMqv = 0x001D,
        Kdf1Sp800_56a = 0x0020,
        Kdf2 = 0x0021,
        Kdf1Sp800_108 = 0x0022,
        Ecc = 0x0023,
        SymCipher = 0x0025,
        Camellia = 0x0026,
        Ctr = 0x0040,
        Ofb = 0x0041,
        Cbc = 0x0042,
        Cfb = 0x0043,
        Ecb = 0x0044,
    }
}

impl TpmAlg {
    /// Digest used when this algorithm appears as a `nameAlg`.
    pub fn name_digest(self) -> Option<&'static digest::Algorithm> {
        match self {
            Self::Sha1 => Some(&digest::SHA1_FOR_LEGACY_USE_ONLY),
            Self::Sha256 => Some(&digest::SHA256),
            Self::Sha384 => Some(&digest::SHA384),
            Self::Sha512 => Some(&digest::SHA512),
            _ => None,
        }
    }
}

tpm_registry! {
    /// TPM_ECC_CURVE (TPM 2.0 Part 2, 6.4)
    TpmEccCurve {
        None = 0x0000,
        NistP192 = 0x0001,
        NistP224 = 0x0002,
        NistP256 = 0x0003,
        NistP384 = 0x0004,
        NistP521 = 0x0005,
        BnP256 = 0x0010,
        BnP638 = 0x0011,
        Sm2P256 = 0x0020,
        BpP256R1 = 0x0030,
        BpP384R1 = 0x0031,
        BpP512R1 = 0x0032,
        Curve25519 = 0x0040,
        Curve448 = 0x0041,
    }
}

impl TpmEccCurve {
    /// The COSE curve a credential key on this TPM curve would carry, if any.
    pub fn cose_curve(self) -> Option<CoseEllipticCurve> {
        match self {
            Self::NistP256 => Some(CoseEllipticCurve::P256),
            Self::NistP384 => Some(CoseEllipticCurve::P384),
            Self::NistP521 => Some(CoseEllipticCurve::P521),
            _ => None,
        }
    }
}

tpm_registry! {
    /// TPM_ST attestation structure tags (TPM 2.0 Part 2, 6.9)
    TpmStructureTag {
        AttestNv = 0x8014,
        AttestCommandAudit = 0x8015,
        AttestSessionAudit = 0x8016,
        AttestCertify = 0x8017,
        AttestQuote = 0x8018,
        AttestTime = 0x8019,
        AttestCreation = 0x801A,
        AttestNvDigest = 0x801C,
    }
}

/// TPM vendor identifiers from the TCG vendor ID registry, as they appear in the
/// `tpmManufacturer` attribute of an AIK certificate.
pub const TCG_VENDOR_IDS: &[(&str, &str)] = &[
    ("AMD", "id:414D4400"),
    ("Atmel", "id:41544D4C"),
    ("Broadcom", "id:4252434D"),
    ("Cisco", "id:4353434F"),
    ("Flyslice Technologies", "id:464C5953"),
    ("Fuzhou Rockchip", "id:524F4343"),
    ("Google", "id:474F4F47"),
    ("HPE", "id:48504500"),
    ("Huawei", "id:48495349"),
    ("IBM", "id:49424D00"),
    ("Infineon", "id:49465800"),
    ("Intel", "id:494E5443"),
    ("Lenovo", "id:4C454E00"),
    ("Microsoft", "id:4D534654"),
    ("National Semiconductor", "id:4E534D20"),
    ("Nationz", "id:4E545A00"),
    ("Nuvoton Technology", "id:4E544300"),
    ("Qualcomm", "id:51434F4D"),
    ("Samsung", "id:534D534E"),
    ("Sinosun", "id:534E5300"),
    ("SMSC", "id:534D5343"),
    ("ST Microelectronics", "id:53544D20"),
    ("Texas Instruments", "id:54584E00"),
    ("Winbond", "id:57454300"),
];

/// Looks up the registered vendor ids for a manufacturer name (case-insensitive).
pub fn tcg_vendor_ids(name: &str) -> Vec<String> {
    TCG_VENDOR_IDS
        .iter()
        .filter(|(vendor, _)| vendor.eq_ignore_ascii_case(name))
        .map(|(_, id)| id.to_string())
        .collect()
}

/// A TPM vendor the deployment trusts: its identifiers and the roots that issue
/// its AIK certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmManufacturer {
    name: String,
    vendor_ids: Vec<String>,
    roots: Vec<Vec<u8>>,
}

impl TpmManufacturer {
    /// `roots` are DER-encoded X.509 certificates.
    pub fn new(
        name: impl Into<String>,
        vendor_ids: Vec<String>,
        roots: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            vendor_ids,
            roots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor_ids(&self) -> &[String] {
        &self.vendor_ids
    }

    pub fn roots(&self) -> &[Vec<u8>] {
        &self.roots
    }

    /// Vendor ids are hex, so `id:ffff` and `id:FFFF` name the same vendor.
    pub fn recognizes(&self, vendor_id: &str) -> bool {
        self.vendor_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(vendor_id.trim()))
    }
}
