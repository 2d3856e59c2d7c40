//! X.509 certificate introspection (`§4.3` of the signing pipeline's
//! component design) and ECDSA-P256/SHA-256 signing over caller-supplied
//! canonical bytes.
//!
//! Every projection here is a pure function of the parsed certificate; none
//! of them touch the network or the filesystem, and none retain the
//! certificate or key beyond the call that borrowed them.

#![deny(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use der::{Decode, Encode};
use ecdsa::signature::Signer;
use num_bigint::BigUint;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use sha2::{Digest, Sha256};
use zatca_core::{SignError, SignResult};

/// A parsed X.509 certificate, holding its original DER bytes alongside the
/// decoded structure so `raw_der`/`raw_base64` never need to re-encode.
pub struct Certificate {
    der: Vec<u8>,
    parsed: x509_cert::Certificate,
}

impl Certificate {
    /// Parse a DER-encoded X.509 certificate.
    ///
    /// # Errors
    /// Returns [`SignError::CertificateDataMissing`] if the bytes do not
    /// decode as a well-formed certificate.
    pub fn from_der(der: &[u8]) -> SignResult<Self> {
        let parsed = x509_cert::Certificate::from_der(der)
            .map_err(|e| SignError::CertificateDataMissing(format!("malformed certificate: {e}")))?;
        Ok(Self { der: der.to_vec(), parsed })
    }

    /// The certificate's DER bytes, unmodified.
    #[must_use]
    pub fn raw_der(&self) -> &[u8] {
        &self.der
    }

    /// base64 of [`Certificate::raw_der`], single line, no PEM wrapper.
    #[must_use]
    pub fn raw_base64(&self) -> String {
        BASE64.encode(&self.der)
    }

    /// ZATCA's triple-encoded certificate digest: SHA-256 of the ASCII
    /// bytes of `raw_base64()`, hex-encoded (lowercase), then base64-encoded
    /// again. This is the value that lands in `xades:CertDigest/ds:DigestValue`.
    #[must_use]
    pub fn cert_hash_b64_of_hex(&self) -> String {
        let digest = Sha256::digest(self.raw_base64().as_bytes());
        let hex = hex::encode(digest);
        BASE64.encode(hex.as_bytes())
    }

    /// DER-encoded `SubjectPublicKeyInfo` of the certificate's public key.
    ///
    /// # Errors
    /// Returns [`SignError::CertificateDataMissing`] if the embedded SPKI
    /// cannot be re-encoded (should not happen for a certificate that
    /// parsed successfully).
    pub fn subject_public_key_info(&self) -> SignResult<Vec<u8>> {
        self.parsed
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| SignError::CertificateDataMissing(format!("subject public key info: {e}")))
    }

    /// The raw ASN.1 `signatureValue` BIT STRING content — the certificate's
    /// own signature bytes, not a hash of anything.
    ///
    /// # Errors
    /// Returns [`SignError::CertificateDataMissing`] if the signature bit
    /// string has unused trailing bits (not valid for a DER-encoded
    /// ECDSA/RSA signature value).
    pub fn cert_signature_bytes(&self) -> SignResult<Vec<u8>> {
        self.parsed
            .signature
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| SignError::CertificateDataMissing("certificate signature bit string".into()))
    }

    /// Issuer RDN components joined with `", "`, in reverse of their DER
    /// encoding order (most specific first): DER order `C, O, OU, CN`
    /// becomes `CN=…, OU=…, O=…, C=…`.
    ///
    /// # Errors
    /// Returns [`SignError::CertificateDataMissing`] if an RDN's value
    /// cannot be decoded as a recognized directory string type.
    pub fn formatted_issuer(&self) -> SignResult<String> {
        let rdns = &self.parsed.tbs_certificate.issuer.0;
        let mut parts = Vec::with_capacity(rdns.len());
        for rdn in rdns.iter().rev() {
            for atv in rdn.0.iter() {
                let short = short_attribute_name(&atv.oid.to_string());
                let value = decode_directory_string(&atv.value)?;
                parts.push(format!("{short}={value}"));
            }
        }
        Ok(parts.join(", "))
    }

    /// Base-10 representation of the certificate's serial number.
    #[must_use]
    pub fn serial_number_decimal(&self) -> String {
        let bytes = self.parsed.tbs_certificate.serial_number.as_bytes();
        BigUint::from_bytes_be(bytes).to_str_radix(10)
    }
}

fn short_attribute_name(oid: &str) -> &'static str {
    match oid {
        "2.5.4.3" => "CN",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "2.5.4.5" => "serialNumber",
        _ => "OID",
    }
}

fn decode_directory_string(value: &der::asn1::Any) -> SignResult<String> {
    use der::asn1::{Ia5StringRef, PrintableStringRef, TeletexStringRef, Utf8StringRef};
    if let Ok(s) = Utf8StringRef::try_from(value) {
        return Ok(s.as_str().to_string());
    }
    if let Ok(s) = PrintableStringRef::try_from(value) {
        return Ok(s.as_str().to_string());
    }
    if let Ok(s) = Ia5StringRef::try_from(value) {
        return Ok(s.as_str().to_string());
    }
    if let Ok(s) = TeletexStringRef::try_from(value) {
        return Ok(s.as_str().to_string());
    }
    Err(SignError::CertificateDataMissing("unrecognized directory string encoding".into()))
}

/// An ECDSA-P256 private key borrowed for the duration of a single signing
/// call; the core never persists key material.
#[derive(Debug)]
pub struct SigningCredential {
    key: SigningKey,
}

impl SigningCredential {
    /// Load a PKCS#8 DER-encoded EC private key.
    ///
    /// # Errors
    /// Returns [`SignError::CryptoSign`] if the key is not a valid P-256
    /// PKCS#8 key (including the case where it is an RSA key — the ECDSA
    /// primitive refuses the wrong curve rather than silently coercing it).
    pub fn from_pkcs8_der(der: &[u8]) -> SignResult<Self> {
        let secret = p256::SecretKey::from_pkcs8_der(der)
            .map_err(|e| SignError::CryptoSign(format!("invalid P-256 private key: {e}")))?;
        Ok(Self { key: SigningKey::from(secret) })
    }

    /// ECDSA-P256/SHA-256 signature over `data` (the hashing is internal to
    /// the ECDSA-with-SHA-256 primitive; `data` is the canonical bytes to be
    /// signed, e.g. `C14N11(ds:SignedInfo)`). Returns the ASN.1 DER encoding
    /// of `SEQUENCE { r INTEGER, s INTEGER }`.
    ///
    /// # Errors
    /// Returns [`SignError::CryptoSign`] if the underlying primitive fails.
    pub fn sign_sha256(&self, data: &[u8]) -> SignResult<Vec<u8>> {
        let signature: Signature = self
            .key
            .try_sign(data)
            .map_err(|e| SignError::CryptoSign(format!("ECDSA signing failed: {e}")))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    /// DER-encoded `SubjectPublicKeyInfo` of the verifying key, for
    /// cross-checking against the certificate's own SPKI in tests and at
    /// credential-loading time.
    ///
    /// # Errors
    /// Returns [`SignError::CryptoSign`] if the public key cannot be
    /// re-encoded (not expected for a key that parsed successfully).
    pub fn public_key_der(&self) -> SignResult<Vec<u8>> {
        use p256::pkcs8::EncodePublicKey;
        self.key
            .verifying_key()
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| SignError::CryptoSign(format!("public key encoding failed: {e}")))
    }
}
