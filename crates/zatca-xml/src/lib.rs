//! Invoice XML handling for the ZATCA signing pipeline: a whitespace-exact
//! DOM, the three element-stripping rules that precede hashing, and
//! Canonical XML 1.1 (non-exclusive, no comments) serialization.
//!
//! This crate never writes to the original invoice text; re-insertion of
//! the signature/QR elements back into the caller's original bytes is the
//! signing orchestrator's job (it has to preserve whitespace the DOM
//! round-trip here deliberately does not guarantee byte-for-byte).

#![deny(unsafe_code)]

mod canon;
mod dom;

pub use canon::{serialize_canonical, strip_qr_reference, strip_signature, strip_ubl_extensions};
pub use dom::{parse, Element, Node};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use zatca_core::SignResult;

/// Parse `xml`, remove `ext:UBLExtensions`, `cac:Signature`, and the QR
/// `cac:AdditionalDocumentReference`, then serialize the result as Canonical
/// XML 1.1. This is the exact byte sequence the invoice hash is computed
/// over.
///
/// # Errors
/// Propagates [`zatca_core::SignError::InvoiceParse`] /
/// [`zatca_core::SignError::Encoding`] from parsing.
pub fn prepare_for_hash(xml: &[u8]) -> SignResult<Vec<u8>> {
    let mut root = dom::parse(xml)?;
    canon::strip_ubl_extensions(&mut root);
    canon::strip_signature(&mut root);
    canon::strip_qr_reference(&mut root);
    Ok(canon::serialize_canonical(&root))
}

/// `base64(SHA-256(prepare_for_hash(xml)))` — the invoice hash used as tag 6
/// of the QR payload and as the digest signed by `ds:SignedInfo`'s invoice
/// reference.
///
/// # Errors
/// See [`prepare_for_hash`].
pub fn compute_hash(xml: &[u8]) -> SignResult<String> {
    let canonical = prepare_for_hash(xml)?;
    let digest = Sha256::digest(&canonical);
    Ok(BASE64.encode(digest))
}

/// Canonicalize an already-signed invoice the same way a verifier would:
/// strip the three signature-bearing elements and re-canonicalize, so the
/// result can be hashed and compared against the QR's tag 6 / the signed
/// `ds:Reference` digest.
///
/// # Errors
/// See [`prepare_for_hash`].
pub fn canonicalize_for_verification(signed_xml: &[u8]) -> SignResult<Vec<u8>> {
    prepare_for_hash(signed_xml)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_invoice() -> &'static [u8] {
        br#"<Invoice xmlns:cbc="urn:cbc" xmlns:cac="urn:cac" xmlns:ext="urn:ext">
<cbc:ProfileID>reporting:1.0</cbc:ProfileID>
<ext:UBLExtensions><ext:UBLExtension>sig-placeholder</ext:UBLExtension></ext:UBLExtensions>
<cbc:ID>SME00001</cbc:ID>
<cac:AdditionalDocumentReference><cbc:ID>QR</cbc:ID><cbc:Value>placeholder</cbc:Value></cac:AdditionalDocumentReference>
<cac:Signature><ds:Fake/></cac:Signature>
<cac:AccountingSupplierParty><cbc:Name>Acme</cbc:Name></cac:AccountingSupplierParty>
</Invoice>"#
    }

    #[test]
    fn prepare_for_hash_strips_signature_bearing_elements() {
        let canonical = prepare_for_hash(sample_invoice()).unwrap();
        let text = String::from_utf8(canonical).unwrap();
        assert!(!text.contains("UBLExtensions"));
        assert!(!text.contains("Signature"));
        assert!(!text.contains("placeholder"));
        assert!(text.contains("SME00001"));
    }

    #[test]
    fn compute_hash_is_deterministic() {
        let h1 = compute_hash(sample_invoice()).unwrap();
        let h2 = compute_hash(sample_invoice()).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(BASE64.decode(&h1).unwrap().len(), 32);
    }

    #[test]
    fn compute_hash_changes_when_business_content_changes() {
        let mut other = sample_invoice().to_vec();
        let text = String::from_utf8(other.clone()).unwrap();
        other = text.replace("SME00001", "SME00002").into_bytes();
        assert_ne!(compute_hash(sample_invoice()).unwrap(), compute_hash(&other).unwrap());
    }

    #[test]
    fn canonicalize_for_verification_matches_prepare_for_hash() {
        assert_eq!(
            canonicalize_for_verification(sample_invoice()).unwrap(),
            prepare_for_hash(sample_invoice()).unwrap(),
        );
    }

    #[test]
    fn malformed_xml_is_invoice_parse_error() {
        let err = prepare_for_hash(b"<a><b></a>").unwrap_err();
        assert!(matches!(err, zatca_core::SignError::InvoiceParse(_)));
    }
}
