//! Tag-length-value encoding for the ZATCA QR payload (`§4.1` of the signing
//! pipeline's component design).
//!
//! Nine tags are defined; the ninth (the certificate's raw ASN.1 signature
//! value) only appears on simplified (B2C) invoices. Each tag is encoded as
//! `tag_number: u8`, `length: u8`, then `length` value bytes; the whole
//! stream is then base64-encoded for embedding back into the invoice.

#![deny(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use zatca_core::{SignError, SignResult};

/// Source values for the nine QR tags. Tags 1-5 are free-form invoice
/// fields; callers substitute an empty string when a source element is
/// absent from the invoice (tag length then encodes as zero, per the
/// component's documented failure mode). Tags 6-9 come from the hashing and
/// signing stages and must not be empty.
#[derive(Debug, Clone, Default)]
pub struct QrFields {
    /// Tag 1: seller's registered name.
    pub seller_name: String,
    /// Tag 2: seller's VAT registration number.
    pub vat_number: String,
    /// Tag 3: `IssueDate` + `T` + `IssueTime`, with a trailing `Z` appended if missing.
    pub timestamp: String,
    /// Tag 4: `LegalMonetaryTotal/TaxInclusiveAmount`, as its literal decimal text.
    pub total_with_vat: String,
    /// Tag 5: `TaxTotal/TaxAmount`, as its literal decimal text.
    pub vat_total: String,
    /// Tag 6: base64(SHA-256(stripped+canonicalized invoice)).
    pub invoice_hash_b64: String,
    /// Tag 7: base64 of the ECDSA signature over `C14N11(ds:SignedInfo)`.
    pub signature_b64: String,
    /// Tag 8: DER-encoded `SubjectPublicKeyInfo` of the signing certificate.
    pub public_key_der: Vec<u8>,
    /// Tag 9: raw ASN.1 signatureValue bytes of the certificate. Required
    /// only for simplified invoices.
    pub cert_signature_der: Option<Vec<u8>>,
}

/// A single decoded tag, as returned by [`decode_qr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTag {
    /// Tag number, `1..=9`.
    pub number: u8,
    /// Raw value bytes (UTF-8 text for tags 1-5, binary for 6-9).
    pub value: Vec<u8>,
}

impl DecodedTag {
    /// Interpret the value as a UTF-8 string; empty on invalid UTF-8.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

fn push_tag(buf: &mut Vec<u8>, number: u8, value: &[u8]) -> SignResult<()> {
    let len: u8 = value
        .len()
        .try_into()
        .map_err(|_| SignError::Encoding(format!("tag {number} value exceeds 255 bytes")))?;
    buf.push(number);
    buf.push(len);
    buf.extend_from_slice(value);
    Ok(())
}

/// Encode the nine (or eight, for standard invoices) QR tags and base64 the
/// result. `simplified` selects whether tag 9 is emitted.
///
/// # Errors
/// Returns [`SignError::CertificateDataMissing`] when tag 7, 8, or (for
/// simplified invoices) tag 9 material is absent, and
/// [`SignError::Encoding`] if any value exceeds the single-byte length field.
pub fn encode_qr(fields: &QrFields, simplified: bool) -> SignResult<String> {
    if fields.signature_b64.is_empty() {
        return Err(SignError::CertificateDataMissing("digital signature (tag 7)".into()));
    }
    if fields.public_key_der.is_empty() {
        return Err(SignError::CertificateDataMissing("public key (tag 8)".into()));
    }

    let mut buf = Vec::new();
    push_tag(&mut buf, 1, fields.seller_name.as_bytes())?;
    push_tag(&mut buf, 2, fields.vat_number.as_bytes())?;
    push_tag(&mut buf, 3, fields.timestamp.as_bytes())?;
    push_tag(&mut buf, 4, fields.total_with_vat.as_bytes())?;
    push_tag(&mut buf, 5, fields.vat_total.as_bytes())?;
    push_tag(&mut buf, 6, fields.invoice_hash_b64.as_bytes())?;
    push_tag(&mut buf, 7, fields.signature_b64.as_bytes())?;
    push_tag(&mut buf, 8, &fields.public_key_der)?;
    if simplified {
        let sig = fields
            .cert_signature_der
            .as_ref()
            .ok_or_else(|| SignError::CertificateDataMissing("certificate signature (tag 9)".into()))?;
        push_tag(&mut buf, 9, sig)?;
    }
    Ok(BASE64.encode(buf))
}

/// Decode a base64 TLV stream into its constituent tags, in stream order.
///
/// # Errors
/// Returns [`SignError::Encoding`] if the payload is not valid base64 or the
/// TLV stream is truncated.
pub fn decode_qr(qr_b64: &str) -> SignResult<Vec<DecodedTag>> {
    let bytes =
        BASE64.decode(qr_b64).map_err(|e| SignError::Encoding(format!("invalid base64: {e}")))?;
    let mut tags = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if i + 2 > bytes.len() {
            return Err(SignError::Encoding("truncated tag header".into()));
        }
        let number = bytes[i];
        let len = bytes[i + 1] as usize;
        let start = i + 2;
        let end = start + len;
        if end > bytes.len() {
            return Err(SignError::Encoding(format!("truncated value for tag {number}")));
        }
        tags.push(DecodedTag { number, value: bytes[start..end].to_vec() });
        i = end;
    }
    Ok(tags)
}

/// Determine whether an invoice is "simplified" (B2C) from its
/// `cbc:InvoiceTypeCode/@name` attribute: a 7-character code beginning with
/// `02` is simplified, `01` is standard, and any other prefix is treated as
/// standard (tag 9 omitted).
#[must_use]
pub fn is_simplified(type_code_name: &str) -> bool {
    type_code_name.len() == 7 && type_code_name.starts_with("02")
}
