//! Generates a deterministic self-signed ECDSA-P256 certificate + private
//! key pair for use as a test fixture across the signing pipeline crates'
//! test suites. Run with `cargo run -p cert_fixture_generator -- <out_dir>`.

use p256::pkcs8::EncodePrivateKey;
use p256::SecretKey;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ECDSA_P256_SHA256};
use sha2::{Digest, Sha256};
use std::{env, fs, path::PathBuf};

fn write(path: &PathBuf, data: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let out_dir = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("crates/zatca-sign/tests/fixtures"));

    // Deterministic P-256 key from a fixed seed, so repeated fixture
    // generation produces byte-identical certs/keys for golden-file tests.
    let seed = Sha256::digest(b"zatca-fixture-signing-key-seed");
    let secret_key = SecretKey::from_slice(seed.as_ref())?;
    let key_pair = KeyPair::from_der(secret_key.to_pkcs8_der()?.as_bytes())?;

    let mut params = CertificateParams::new(vec![]);
    params.alg = &PKCS_ECDSA_P256_SHA256;
    params.key_pair = Some(key_pair);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "SA");
    dn.push(DnType::OrganizationName, "ZATCA Fixture Org");
    dn.push(DnType::CommonName, "eInvoicing");
    params.distinguished_name = dn;

    let cert = rcgen::Certificate::from_params(params)?;
    let cert_der = cert.serialize_der()?;
    let key_der = cert.get_key_pair().serialize_der();

    write(&out_dir.join("cert.der"), &cert_der)?;
    write(&out_dir.join("cert.pem"), cert.serialize_pem()?.as_bytes())?;
    write(&out_dir.join("key.pkcs8.der"), &key_der)?;

    println!("wrote fixture certificate and key to {}", out_dir.display());
    Ok(())
}
