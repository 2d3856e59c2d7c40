//! Seed end-to-end scenarios (S1-S6 in the signing pipeline's test plan):
//! a fixed-time standard invoice, a simplified invoice, reproducibility
//! across repeated calls, hash sensitivity to sibling order, a bad-key
//! failure mode, and independent QR-derived signature verification.

mod support;

use support::{fresh_credential, seed_clock, seed_invoice};
use zatca_core::SignError;

#[test]
fn s1_standard_invoice_fixed_time_round_trips_hash_and_anchors() {
    let (cert_der, key_der) = fresh_credential();
    let clock = seed_clock();
    let xml = seed_invoice("0100000");

    let unsigned_hash = zatca_sign::compute_hash(xml.as_bytes()).unwrap();
    let result = zatca_sign::sign(xml.as_bytes(), &cert_der, &key_der, &clock).unwrap();

    assert_eq!(result.signed_xml.matches("<ext:UBLExtensions").count(), 1);
    assert!(result.signed_xml.contains("</ext:UBLExtensions><cbc:ProfileID>"));
    assert_eq!(
        result.signed_xml.matches("<cac:AdditionalDocumentReference><cbc:ID>QR</cbc:ID>").count(),
        1
    );
    assert!(result.signed_xml.contains("<cac:AdditionalDocumentReference><cbc:ID>QR</cbc:ID>")
        && result.signed_xml.find("<cac:AdditionalDocumentReference><cbc:ID>QR</cbc:ID>").unwrap()
            < result.signed_xml.find("<cac:Signature").unwrap());

    let resigned_hash = zatca_sign::compute_hash(result.signed_xml.as_bytes()).unwrap();
    assert_eq!(unsigned_hash, resigned_hash);
}

#[test]
fn s2_simplified_invoice_qr_has_nine_tags_with_cert_sized_tag9() {
    let (cert_der, key_der) = fresh_credential();
    let clock = seed_clock();
    let xml = seed_invoice("0200000");

    let result = zatca_sign::sign(xml.as_bytes(), &cert_der, &key_der, &clock).unwrap();
    let tags = zatca_tlv::decode_qr(&result.qr_b64).unwrap();

    assert_eq!(tags.len(), 9);
    let cert = zatca_cert::Certificate::from_der(&cert_der).unwrap();
    let expected_len = cert.cert_signature_bytes().unwrap().len();
    assert_eq!(tags[8].value.len(), expected_len);
    assert!((60..=80).contains(&expected_len), "unexpected ECDSA-P256 DER signature length: {expected_len}");
}

#[test]
fn s3_repeated_sign_with_fixed_clock_is_byte_identical() {
    let (cert_der, key_der) = fresh_credential();
    let clock = seed_clock();
    let xml = seed_invoice("0100000");

    let a = zatca_sign::sign(xml.as_bytes(), &cert_der, &key_der, &clock).unwrap();
    let b = zatca_sign::sign(xml.as_bytes(), &cert_der, &key_der, &clock).unwrap();

    assert_eq!(a.signed_xml, b.signed_xml);
    assert_eq!(a.qr_b64, b.qr_b64);
    assert_eq!(a.signature_b64, b.signature_b64);
}

#[test]
fn s4_sibling_reordering_inside_legal_monetary_total_changes_hash() {
    let original = r#"<Invoice xmlns:cac="urn:cac" xmlns:cbc="urn:cbc">
<cac:LegalMonetaryTotal>
<cbc:TaxExclusiveAmount>4.00</cbc:TaxExclusiveAmount>
<cbc:TaxInclusiveAmount>4.60</cbc:TaxInclusiveAmount>
</cac:LegalMonetaryTotal>
</Invoice>"#;
    let reordered = r#"<Invoice xmlns:cac="urn:cac" xmlns:cbc="urn:cbc">
<cac:LegalMonetaryTotal>
<cbc:TaxInclusiveAmount>4.60</cbc:TaxInclusiveAmount>
<cbc:TaxExclusiveAmount>4.00</cbc:TaxExclusiveAmount>
</cac:LegalMonetaryTotal>
</Invoice>"#;

    let hash_a = zatca_sign::compute_hash(original.as_bytes()).unwrap();
    let hash_b = zatca_sign::compute_hash(reordered.as_bytes()).unwrap();
    assert_ne!(hash_a, hash_b);
}

#[test]
fn s5_rsa_key_fails_signing_with_no_partial_output() {
    let (cert_der, _) = fresh_credential();
    // A PKCS#8 header carrying the RSA algorithm OID, not a valid EC key.
    let bogus_rsa_pkcs8: &[u8] =
        &[0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00];
    let clock = seed_clock();
    let xml = seed_invoice("0100000");

    let err = zatca_sign::sign(xml.as_bytes(), &cert_der, bogus_rsa_pkcs8, &clock).unwrap_err();
    assert!(matches!(err, SignError::CryptoSign(_)));
}

#[test]
fn s6_qr_public_key_and_signature_verify_against_signed_info() {
    use ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};
    use p256::pkcs8::DecodePublicKey;

    let (cert_der, key_der) = fresh_credential();
    let clock = seed_clock();
    let xml = seed_invoice("0100000");

    let result = zatca_sign::sign(xml.as_bytes(), &cert_der, &key_der, &clock).unwrap();
    let tags = zatca_tlv::decode_qr(&result.qr_b64).unwrap();
    let spki_der = &tags[7].value;
    let sig_der = base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        tags[6].as_text(),
    )
    .unwrap();

    let signed_info_xml = extract_fragment(&result.signed_xml, "<ds:SignedInfo", "</ds:SignedInfo>");
    let canonical = {
        let root = zatca_xml::parse(signed_info_xml.as_bytes()).unwrap();
        zatca_xml::serialize_canonical(&root)
    };

    let verifying_key = VerifyingKey::from_public_key_der(spki_der).unwrap();
    let signature = Signature::from_der(&sig_der).unwrap();
    assert!(verifying_key.verify(&canonical, &signature).is_ok());
}

fn extract_fragment<'a>(haystack: &'a str, start: &str, end: &str) -> &'a str {
    let start_idx = haystack.find(start).expect("start anchor present");
    let end_idx = haystack[start_idx..].find(end).expect("end anchor present") + start_idx + end.len();
    &haystack[start_idx..end_idx]
}
