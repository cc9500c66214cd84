use super::codec::Cursor;
use super::errors::TpmParseError;
use super::registry::{TpmAlg, TpmStructureTag};

/// `TPM_GENERATED_VALUE`: marks a structure as produced inside a TPM.
pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;

const CLOCK_INFO_LEN: usize = 17;

/// TPMS_CLOCK_INFO, kept as its raw 17 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockInfo([u8; CLOCK_INFO_LEN]);

impl ClockInfo {
    pub fn as_bytes(&self) -> &[u8; CLOCK_INFO_LEN] {
        &self.0
    }

    /// Milliseconds the TPM has been powered since its last clear.
    pub fn clock(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[0..8]);
        u64::from_be_bytes(buf)
    }

    pub fn reset_count(&self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[8..12]);
        u32::from_be_bytes(buf)
    }

    pub fn restart_count(&self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[12..16]);
        u32::from_be_bytes(buf)
    }

    pub fn safe(&self) -> bool {
        self.0[16] != 0
    }
}

/// TPMS_CERTIFY_INFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedName {
    name_alg: TpmAlg,
    name: Vec<u8>,
    qualified_name: Vec<u8>,
}

impl AttestedName {
    pub fn name_alg(&self) -> TpmAlg {
        self.name_alg
    }

    /// The full TPM2B_NAME payload, `nameAlg` included.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn qualified_name(&self) -> &[u8] {
        &self.qualified_name
    }
}

/// TPMS_ATTEST: the structure signed by the attestation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    magic: u32,
    attest_type: TpmStructureTag,
    qualified_signer: Vec<u8>,
    extra_data: Vec<u8>,
    clock_info: ClockInfo,
    firmware_version: u64,
    attested: AttestedName,
}

impl TpmsAttest {
    /// Decodes a complete TPMS_ATTEST carrying TPMS_CERTIFY_INFO.
    ///
    /// `magic` and `type` are decoded, not judged; a wrong value is a semantic
    /// failure for the caller to report.
    pub fn parse(bytes: &[u8]) -> Result<Self, TpmParseError> {
        let mut cursor = Cursor::new(bytes);

        let magic = cursor.read_u32()?;
        let attest_type = TpmStructureTag::from_u16(cursor.read_u16()?);
        let qualified_signer = cursor.read_sized()?.to_vec();
        let extra_data = cursor.read_sized()?.to_vec();
        let clock_info = ClockInfo(cursor.read_array()?);
        let firmware_version = cursor.read_u64()?;

        let name = cursor.read_sized()?;
        let qualified_name = cursor.read_sized()?.to_vec();
        cursor.finish()?;

        let name_alg = match name {
            [hi, lo, ..] => TpmAlg::from_u16(u16::from_be_bytes([*hi, *lo])),
            _ => {
                return Err(TpmParseError::MalformedName(format!(
                    "{} bytes is too short to hold a name algorithm",
                    name.len()
                )));
            }
        };

        Ok(Self {
            magic,
            attest_type,
            qualified_signer,
            extra_data,
            clock_info,
            firmware_version,
            attested: AttestedName {
                name_alg,
                name: name.to_vec(),
                qualified_name,
            },
        })
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn attest_type(&self) -> TpmStructureTag {
        self.attest_type
    }

    pub fn qualified_signer(&self) -> &[u8] {
        &self.qualified_signer
    }

    pub fn extra_data(&self) -> &[u8] {
        &self.extra_data
    }

    pub fn clock_info(&self) -> &ClockInfo {
        &self.clock_info
    }

    pub fn firmware_version(&self) -> u64 {
        self.firmware_version
    }

    pub fn attested(&self) -> &AttestedName {
        &self.attested
    }
}
