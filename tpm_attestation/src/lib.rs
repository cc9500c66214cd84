//! tpm-attestation - Verification of WebAuthn `tpm` attestation statements
//!
//! Decodes the TPM 2.0 structures carried in a `tpm` attestation (TPMS_ATTEST and
//! TPMT_PUBLIC), checks the AIK certificate against the TCG certificate profile,
//! validates its chain to a trusted TPM vendor root, and ties the certified key to the
//! credential public key in the authenticator data.
//!
//! ```no_run
//! use tpm_attestation::TpmVerifier;
//!
//! # fn run(
//! #     attestation_object: &[u8],
//! #     client_data_hash: &[u8],
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = TpmVerifier::from_env()?;
//! let response = verifier.verify_attestation_object(attestation_object, client_data_hash);
//! if !response.valid {
//!     println!("rejected: {:?}", response.reason);
//! }
//! # Ok(())
//! # }
//! ```

mod tpm;


pub use tpm::*;
