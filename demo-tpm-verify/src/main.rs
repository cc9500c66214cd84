//! Verifies a WebAuthn `tpm` registration response read from a JSON file.
//!
//! ```text
//! TPM_MANUFACTURERS_FILE=./manufacturers.json demo-tpm-verify response.json
//! ```
//!
//! The input file holds the base64url fields of a registration response:
//! `{ "attestationObject": "...", "clientDataJSON": "..." }`.

use std::process::ExitCode;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::digest;
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tpm_attestation::TpmVerifier;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationInput {
    attestation_object: String,
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
}

fn init_tracing(app_name: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            format!("tpm_attestation=debug,{}=debug,info", app_name).into()
        }

        #[cfg(not(debug_assertions))]
        {
            "info".into()
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, String> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| format!("Invalid base64url in {field}: {e}"))
}

fn run(path: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let input: RegistrationInput = serde_json::from_slice(&std::fs::read(path)?)?;
    let attestation_object = decode("attestationObject", &input.attestation_object)?;
    let client_data_json = decode("clientDataJSON", &input.client_data_json)?;
    let client_data_hash = digest::digest(&digest::SHA256, &client_data_json);

    let verifier = TpmVerifier::from_env()?;
    tracing::info!(
        "Verifying {} against {} trusted TPM manufacturers",
        path,
        verifier.trust_store().manufacturers().len()
    );

    let response =
        verifier.verify_attestation_object(&attestation_object, client_data_hash.as_ref());
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.valid)
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing("demo_tpm_verify");

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: demo-tpm-verify <registration-response.json>");
        return ExitCode::from(2);
    };

    match run(&path) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
    }
}
