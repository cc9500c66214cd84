use std::sync::Arc;
use std::time::UNIX_EPOCH;

use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair as _, RSA_PKCS1_SHA256, RSA_PSS_SHA256,
    RsaEncoding,
};
use serial_test::serial;
use tpm_attestation::{
    AttestationObject, FailureKind, TpmManufacturer, TpmVerifier, TrustStore,
    VerificationResponse,
};

use crate::common::*;

fn rsa_credential() -> CredentialKey {
    CredentialKey::Rsa {
        n: CREDENTIAL_MODULUS.to_vec(),
        e: vec![0x01, 0x00, 0x01],
    }
}

fn rsa_attestation(
    alg: i64,
    padding: &'static dyn RsaEncoding,
    profile: &AikProfile,
    issuer: &TestCa,
    intermediates: &[&TestCa],
    pub_area: Vec<u8>,
) -> TpmAttestation {
    let mut x5c = vec![issue_aik(profile, &rsa_aik_key(), issuer)];
    x5c.extend(intermediates.iter().map(|ca| ca.der.clone()));
    let signer = AikSigner::Rsa {
        pkcs8: rsa_aik_pkcs8(),
        padding,
    };
    TpmAttestation::new(alg, x5c, &rsa_credential(), pub_area, &signer)
}

fn rs256_attestation(profile: &AikProfile, issuer: &TestCa) -> TpmAttestation {
    rsa_attestation(
        -257,
        &RSA_PKCS1_SHA256,
        profile,
        issuer,
        &[],
        rsa_pub_area(TPM_ALG_SHA256, 0, &CREDENTIAL_MODULUS),
    )
}

fn es256_attestation(issuer: &TestCa) -> TpmAttestation {
    let aik_key = ecdsa_aik_key();
    let x5c = vec![issue_aik(&AikProfile::default(), &aik_key, issuer)];

    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
    let credential =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng).unwrap();
    let point = credential.public_key().as_ref();
    let (x, y) = (point[1..33].to_vec(), point[33..65].to_vec());

    let signer = AikSigner::Ecdsa {
        pkcs8: aik_key.serialize_der(),
    };
    let pub_area = ecc_pub_area(&x, &y);
    TpmAttestation::new(-7, x5c, &CredentialKey::Ec2 { x, y }, pub_area, &signer)
}

fn verify(store: TrustStore, attestation: &TpmAttestation) -> VerificationResponse {
    TpmVerifier::new(store)
        .verify_attestation_object(&attestation.to_cbor(), &attestation.client_data_hash)
}

fn assert_rejected(response: &VerificationResponse, kind: FailureKind, needle: &str) {
    assert!(!response.valid, "attestation unexpectedly accepted");
    assert_eq!(response.failure, Some(kind));
    let reason = response.reason.as_deref().unwrap_or_default();
    assert!(reason.contains(needle), "unexpected reason: {reason}");
}

#[test]
fn test_valid_rs256_attestation() {
    let ca = TestCa::root("Test TPM Root CA");
    let attestation = rs256_attestation(&AikProfile::default(), &ca);

    let response = verify(ca.trust_store(), &attestation);

    assert_eq!(response, VerificationResponse::valid());
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        serde_json::json!({ "valid": true })
    );
}

#[test]
fn test_valid_rs256_attestation_from_decoded_object() {
    let ca = TestCa::root("Test TPM Root CA");
    let attestation = rs256_attestation(&AikProfile::default(), &ca);
    let object = AttestationObject::from_cbor(&attestation.to_cbor()).unwrap();

    let response =
        TpmVerifier::new(ca.trust_store()).verify_x5c(&object, &attestation.client_data_hash);
    assert!(response.valid);
}

#[test]
fn test_valid_ps256_attestation() {
    let ca = TestCa::root("Test TPM Root CA");
    let attestation = rsa_attestation(
        -37,
        &RSA_PSS_SHA256,
        &AikProfile::default(),
        &ca,
        &[],
        rsa_pub_area(TPM_ALG_SHA256, 0, &CREDENTIAL_MODULUS),
    );

    assert!(verify(ca.trust_store(), &attestation).valid);
}

#[test]
fn test_valid_attestation_through_intermediate() {
    let root = TestCa::root("Test TPM Root CA");
    let intermediate = root.intermediate("Test TPM Intermediate CA");
    let attestation = rsa_attestation(
        -257,
        &RSA_PKCS1_SHA256,
        &AikProfile::default(),
        &intermediate,
        &[&intermediate],
        rsa_pub_area(TPM_ALG_SHA256, 65537, &CREDENTIAL_MODULUS),
    );

    assert!(verify(root.trust_store(), &attestation).valid);
}

#[test]
fn test_valid_es256_attestation() {
    let ca = TestCa::root("Test TPM Root CA");
    let attestation = es256_attestation(&ca);

    assert_eq!(verify(ca.trust_store(), &attestation), VerificationResponse::valid());
}

#[test]
fn test_tampered_es256_signature() {
    let ca = TestCa::root("Test TPM Root CA");
    let attestation = es256_attestation(&ca);
    let sig = attestation.sig.clone();

    let mut flipped_s = sig.clone();
    *flipped_s.last_mut().unwrap() ^= 0x01;
    let mut flipped_r = sig.clone();
    flipped_r[6] ^= 0x80;
    let mut zeroed = sig.clone();
    zeroed[4..].iter_mut().for_each(|b| *b = 0);
    let mut extended = sig.clone();
    extended.push(0x00);

    for (label, tampered) in [
        ("flipped s", flipped_s),
        ("flipped r", flipped_r),
        ("zeroed", zeroed),
        ("extended", extended),
        ("truncated", sig[..sig.len() - 1].to_vec()),
        ("empty", Vec::new()),
    ] {
        let tampered = with_signature(&attestation, tampered);
        let response = verify(ca.trust_store(), &tampered);
        assert!(!response.valid, "{label} signature accepted");
        assert_rejected(&response, FailureKind::Semantic, "TPM signature");
    }
}

fn with_signature(attestation: &TpmAttestation, sig: Vec<u8>) -> TpmAttestation {
    TpmAttestation {
        alg: attestation.alg,
        x5c: attestation.x5c.clone(),
        auth_data: attestation.auth_data.clone(),
        client_data_hash: attestation.client_data_hash.clone(),
        pub_area: attestation.pub_area.clone(),
        cert_info: attestation.cert_info.clone(),
        sig,
    }
}

#[test]
fn test_cert_info_modified_after_signing() {
    let ca = TestCa::root("Test TPM Root CA");
    let mut attestation = rs256_attestation(&AikProfile::default(), &ca);
    // inside qualifiedSigner, which no other check reads
    attestation.cert_info[12] ^= 0xff;

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "TPM signature",
    );
}

#[test]
fn test_non_empty_subject_rejected() {
    let ca = TestCa::root("Test TPM Root CA");
    let profile = AikProfile {
        subject: Some("TPM AIK"),
        ..AikProfile::default()
    };
    let attestation = rs256_attestation(&profile, &ca);

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "empty subject",
    );
}

#[test]
fn test_version_2_certificate_rejected() {
    let ca = TestCa::root("Test TPM Root CA");
    let mut attestation = rs256_attestation(&AikProfile::default(), &ca);
    attestation.x5c[0] = with_certificate_version(&attestation.x5c[0], &[0x01]);

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "version must be 3, found 2",
    );
}

#[test]
fn test_oversized_certificate_version_rejected() {
    let ca = TestCa::root("Test TPM Root CA");
    let mut attestation = rs256_attestation(&AikProfile::default(), &ca);
    attestation.x5c[0] =
        with_certificate_version(&attestation.x5c[0], &[0x00, 0xff, 0xff, 0xff, 0xff]);

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "found 4294967296",
    );
}

#[test]
fn test_unconfigured_manufacturer_rejected() {
    let ca = TestCa::root("Test TPM Root CA");
    let profile = AikProfile {
        vendor_id: "id:49465800",
        ..AikProfile::default()
    };
    let attestation = rs256_attestation(&profile, &ca);

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "unrecognized TPM manufacturer",
    );
}

#[test]
fn test_roots_of_other_manufacturer_not_trusted() {
    let infineon_root = TestCa::root("Infineon Test Root");
    let test_vendor_root = TestCa::root("Test TPM Root CA");
    let store = TrustStore::new(vec![
        TpmManufacturer::new(
            "Infineon",
            vec!["id:49465800".to_string()],
            vec![infineon_root.der.clone()],
        ),
        test_vendor_root.manufacturer(),
    ])
    .unwrap();

    // Claims to be a Test Vendor TPM, but chains to the Infineon root
    let attestation = rs256_attestation(&AikProfile::default(), &infineon_root);

    assert_rejected(&verify(store, &attestation), FailureKind::Semantic, "Untrusted issuer");
}

#[test]
fn test_untrusted_root() {
    let trusted = TestCa::root("Test TPM Root CA");
    let rogue = TestCa::root("Test TPM Root CA");
    let attestation = rsa_attestation(
        -257,
        &RSA_PKCS1_SHA256,
        &AikProfile::default(),
        &rogue,
        &[&rogue],
        rsa_pub_area(TPM_ALG_SHA256, 0, &CREDENTIAL_MODULUS),
    );

    assert_rejected(
        &verify(trusted.trust_store(), &attestation),
        FailureKind::Semantic,
        "Untrusted issuer",
    );
}

#[test]
fn test_aaguid_mismatch() {
    let ca = TestCa::root("Test TPM Root CA");
    let profile = AikProfile {
        aaguid: Some([0x11; 16]),
        ..AikProfile::default()
    };
    let attestation = rs256_attestation(&profile, &ca);

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "AAGUID",
    );
}

#[test]
fn test_expired_chain() {
    let ca = TestCa::root("Test TPM Root CA");
    let attestation = rs256_attestation(&AikProfile::default(), &ca);
    let object = AttestationObject::from_cbor(&attestation.to_cbor()).unwrap();

    let response = TpmVerifier::new(ca.trust_store()).verify_x5c_at(
        &object,
        &attestation.client_data_hash,
        UNIX_EPOCH,
    );
    assert_rejected(&response, FailureKind::Semantic, "not yet valid");
}

#[test]
fn test_rsa_exponent_mismatch() {
    let ca = TestCa::root("Test TPM Root CA");
    let attestation = rsa_attestation(
        -257,
        &RSA_PKCS1_SHA256,
        &AikProfile::default(),
        &ca,
        &[],
        rsa_pub_area(TPM_ALG_SHA256, 3, &CREDENTIAL_MODULUS),
    );

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "exponent",
    );
}

#[test]
fn test_rsa_modulus_mismatch() {
    let ca = TestCa::root("Test TPM Root CA");
    let mut other_modulus = CREDENTIAL_MODULUS;
    other_modulus[255] ^= 0x02;
    let attestation = rsa_attestation(
        -257,
        &RSA_PKCS1_SHA256,
        &AikProfile::default(),
        &ca,
        &[],
        rsa_pub_area(TPM_ALG_SHA256, 0, &other_modulus),
    );

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "modulus",
    );
}

#[test]
fn test_name_computed_with_other_algorithm() {
    let ca = TestCa::root("Test TPM Root CA");
    // pubArea declares SHA-1 while the attested name is a SHA-256 name
    let attestation = rsa_attestation(
        -257,
        &RSA_PKCS1_SHA256,
        &AikProfile::default(),
        &ca,
        &[],
        rsa_pub_area(TPM_ALG_SHA1, 0, &CREDENTIAL_MODULUS),
    );

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Semantic,
        "does not match the public area",
    );
}

#[test]
fn test_trailing_data_in_pub_area() {
    let ca = TestCa::root("Test TPM Root CA");
    let mut pub_area = rsa_pub_area(TPM_ALG_SHA256, 0, &CREDENTIAL_MODULUS);
    pub_area.push(0x00);
    let attestation = rsa_attestation(
        -257,
        &RSA_PKCS1_SHA256,
        &AikProfile::default(),
        &ca,
        &[],
        pub_area,
    );

    assert_rejected(
        &verify(ca.trust_store(), &attestation),
        FailureKind::Structural,
        "Trailing data",
    );
}

#[test]
fn test_extra_data_mismatch() {
    let ca = TestCa::root("Test TPM Root CA");
    let attestation = rs256_attestation(&AikProfile::default(), &ca);

    let response = TpmVerifier::new(ca.trust_store())
        .verify_attestation_object(&attestation.to_cbor(), &[0u8; 32]);
    assert_rejected(&response, FailureKind::Semantic, "extraData");
}

#[test]
fn test_malformed_attestation_object() {
    let ca = TestCa::root("Test TPM Root CA");
    let response = TpmVerifier::new(ca.trust_store())
        .verify_attestation_object(b"not cbor at all", &client_data_hash());

    assert_rejected(&response, FailureKind::Structural, "Invalid attestation statement");
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["valid"], false);
    assert_eq!(json["failure"], "structural");
}

#[test]
fn test_shared_verifier_across_threads() {
    let ca = TestCa::root("Test TPM Root CA");
    let verifier = TpmVerifier::with_shared_store(Arc::new(ca.trust_store()));
    let attestation = Arc::new(rs256_attestation(&AikProfile::default(), &ca));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let verifier = verifier.clone();
            let attestation = Arc::clone(&attestation);
            std::thread::spawn(move || {
                verifier.verify_attestation_object(
                    &attestation.to_cbor(),
                    &attestation.client_data_hash,
                )
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().valid);
    }
}

#[test]
#[serial]
fn test_verifier_from_env() {
    let ca = TestCa::root("Test TPM Root CA");
    let dir = std::env::temp_dir().join(format!("tpm-flows-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("root.der"), &ca.der).unwrap();
    std::fs::write(
        dir.join("manufacturers.json"),
        format!(
            r#"[{{ "name": "Test Vendor", "vendor_ids": ["{TEST_VENDOR_ID}"],
                  "roots": ["root.der"] }}]"#
        ),
    )
    .unwrap();

    unsafe {
        std::env::set_var("TPM_MANUFACTURERS_FILE", dir.join("manufacturers.json"));
        std::env::set_var("TPM_ALLOWED_CLOCK_SKEW_SECS", "120");
    }

    let verifier = TpmVerifier::from_env().unwrap();
    assert_eq!(verifier.trust_store().clock_skew().as_secs(), 120);

    let attestation = rs256_attestation(&AikProfile::default(), &ca);
    let response =
        verifier.verify_attestation_object(&attestation.to_cbor(), &attestation.client_data_hash);
    assert!(response.valid);

    std::fs::remove_dir_all(dir).unwrap();
}
