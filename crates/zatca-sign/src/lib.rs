//! The signing orchestrator (C5): drives the pipeline end to end per
//! `§4.5` of the signing pipeline's component design —
//! parse → hash (C2) → build `SignedProperties`/`SignedInfo` (C4) →
//! ECDSA-sign (C3) → assemble the XAdES fragment (C4) → encode the QR
//! (C1) → reinsert into the original invoice text.
//!
//! Each `sign()` call is a pure, single-threaded, synchronous
//! transformation; the orchestrator retains no state across calls and
//! never retries internally (`§5`, `§7`).

#![deny(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{field, info_span};
use zatca_cert::{Certificate, SigningCredential};
use zatca_core::{Clock, SignError, SignResult, SignedResult};
use zatca_tlv::QrFields;
use zatca_xades::XadesBuilder;
use zatca_xml::Element;

pub use zatca_xml::{canonicalize_for_verification, compute_hash};

const EXT_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";

/// Drive the full signing pipeline described in `§4.5`, returning the
/// signed invoice text plus the hash, QR payload, signature, and invoice
/// UUID extracted along the way.
///
/// # Errors
/// - [`SignError::InvoiceParse`] if `unsigned_xml` is not well-formed, or
///   the `<Invoice>` root / `<cbc:ProfileID>` anchor cannot be found for
///   reinsertion.
/// - [`SignError::Encoding`] if `unsigned_xml` is not valid UTF-8.
/// - [`SignError::CertificateDataMissing`] if `cert_der` does not parse, or
///   a required certificate projection is unavailable.
/// - [`SignError::CryptoSign`] if `priv_key_der` is not a valid P-256 key or
///   the ECDSA primitive fails.
pub fn sign(
    unsigned_xml: &[u8],
    cert_der: &[u8],
    priv_key_der: &[u8],
    clock: &dyn Clock,
) -> SignResult<SignedResult> {
    let span = info_span!("zatca.sign", error_code = field::Empty);
    let _guard = span.enter();
    let start = std::time::Instant::now();

    let result = sign_inner(unsigned_xml, cert_der, priv_key_der, clock);

    if let Err(ref e) = result {
        span.record("error_code", field::display(error_code(e)));
        record_failure(error_code(e));
    }
    observe_duration(start.elapsed().as_secs_f64() * 1000.0);
    result
}

fn sign_inner(
    unsigned_xml: &[u8],
    cert_der: &[u8],
    priv_key_der: &[u8],
    clock: &dyn Clock,
) -> SignResult<SignedResult> {
    let original_text =
        std::str::from_utf8(unsigned_xml).map_err(|e| SignError::Encoding(e.to_string()))?.to_string();
    let root = zatca_xml::parse(unsigned_xml)?;
    let invoice_uuid = root.find_text("cbc:UUID").unwrap_or_default();

    let invoice_hash_b64 = zatca_xml::compute_hash(unsigned_xml)?;

    let cert = Certificate::from_der(cert_der)?;
    let credential = SigningCredential::from_pkcs8_der(priv_key_der)?;

    let mut builder = XadesBuilder::new(clock.now_utc());
    builder.set_certificate(&cert)?;
    builder.set_invoice_digest(invoice_hash_b64.clone())?;

    let signed_info_canonical = builder.canonical_signed_info()?;
    let signature_der = credential.sign_sha256(&signed_info_canonical)?;
    let signature_b64 = BASE64.encode(signature_der);
    builder.set_signature_value(signature_b64.clone())?;

    let ubl_extensions_xml = builder.build()?;

    let simplified = is_simplified_invoice(&root);
    let fields = extract_qr_fields(&root, &invoice_hash_b64, &signature_b64, &cert, simplified)?;
    let qr_b64 = zatca_tlv::encode_qr(&fields, simplified)?;

    let signed_xml = reinsert(&original_text, &ubl_extensions_xml, &qr_b64)?;

    Ok(SignedResult { signed_xml, invoice_hash_b64, qr_b64, signature_b64, invoice_uuid })
}

/// Recompute the QR payload for an already-signed invoice from its
/// certificate and previously computed hash/signature, without re-running
/// the rest of the pipeline.
///
/// # Errors
/// [`SignError::InvoiceParse`] if `signed_xml` is malformed;
/// [`SignError::CertificateDataMissing`] if `cert_der` does not parse or a
/// required projection is unavailable for a simplified invoice.
pub fn build_qr(
    signed_xml: &[u8],
    cert_der: &[u8],
    hash_b64: &str,
    signature_b64: &str,
) -> SignResult<String> {
    let root = zatca_xml::parse(signed_xml)?;
    let cert = Certificate::from_der(cert_der)?;
    let simplified = is_simplified_invoice(&root);
    let fields = extract_qr_fields(&root, hash_b64, signature_b64, &cert, simplified)?;
    zatca_tlv::encode_qr(&fields, simplified)
}

fn is_simplified_invoice(root: &Element) -> bool {
    let type_code_name =
        root.find("cbc:InvoiceTypeCode").and_then(|e| e.attr("name")).unwrap_or_default();
    zatca_tlv::is_simplified(type_code_name)
}

fn extract_qr_fields(
    root: &Element,
    hash_b64: &str,
    signature_b64: &str,
    cert: &Certificate,
    simplified: bool,
) -> SignResult<QrFields> {
    let supplier = root.find("cac:AccountingSupplierParty");
    let seller_name =
        supplier.and_then(|s| s.find_text("cbc:RegistrationName")).unwrap_or_default();
    let vat_number = supplier.and_then(|s| s.find_text("cbc:CompanyID")).unwrap_or_default();

    let issue_date = root.find_text("cbc:IssueDate").unwrap_or_default();
    let issue_time = root.find_text("cbc:IssueTime").unwrap_or_default();
    let mut timestamp = format!("{issue_date}T{issue_time}");
    if !timestamp.ends_with('Z') {
        timestamp.push('Z');
    }

    let total_with_vat = root.find_text("cbc:TaxInclusiveAmount").unwrap_or_default();
    let vat_total = root.find_text("cbc:TaxAmount").unwrap_or_default();

    let public_key_der = cert.subject_public_key_info()?;
    let cert_signature_der =
        if simplified { Some(cert.cert_signature_bytes()?) } else { None };

    Ok(QrFields {
        seller_name,
        vat_number,
        timestamp,
        total_with_vat,
        vat_total,
        invoice_hash_b64: hash_b64.to_string(),
        signature_b64: signature_b64.to_string(),
        public_key_der,
        cert_signature_der,
    })
}

fn reinsert(original: &str, ubl_extensions_xml: &str, qr_b64: &str) -> SignResult<String> {
    let mut xml = original.to_string();
    ensure_ext_namespace(&mut xml)?;
    insert_before_first(&mut xml, "<cbc:ProfileID", ubl_extensions_xml, "cbc:ProfileID")?;

    let qr_reference_xml = format!(
        "<cac:AdditionalDocumentReference><cbc:ID>QR</cbc:ID><cac:Attachment>\
<cbc:EmbeddedDocumentBinaryObject mimeCode=\"text/plain\">{qr_b64}</cbc:EmbeddedDocumentBinaryObject>\
</cac:Attachment></cac:AdditionalDocumentReference>"
    );

    if xml.contains("<cac:Signature") {
        insert_before_first(&mut xml, "<cac:Signature", &qr_reference_xml, "cac:Signature")?;
    } else {
        const MINIMAL_SIGNATURE: &str =
            "<cac:Signature><cbc:ID>urn:oasis:names:specification:ubl:signature:Invoice</cbc:ID>\
<cbc:SignatureMethod>urn:oasis:names:specification:ubl:dsig:enveloped:xades</cbc:SignatureMethod>\
</cac:Signature>";
        let combined = format!("{qr_reference_xml}{MINIMAL_SIGNATURE}");
        insert_before_first(
            &mut xml,
            "<cac:AccountingSupplierParty",
            &combined,
            "cac:AccountingSupplierParty",
        )?;
    }

    Ok(strip_blank_lines(&xml))
}

fn ensure_ext_namespace(xml: &mut String) -> SignResult<()> {
    let start = xml.find("<Invoice").ok_or_else(|| {
        SignError::InvoiceParse("root <Invoice> element not found for reinsertion".into())
    })?;
    let end = xml[start..]
        .find('>')
        .map(|i| start + i)
        .ok_or_else(|| SignError::InvoiceParse("unterminated root element".into()))?;
    if !xml[start..end].contains("xmlns:ext=") {
        xml.insert_str(end, &format!(" xmlns:ext=\"{EXT_NS}\""));
    }
    Ok(())
}

fn insert_before_first(xml: &mut String, anchor: &str, content: &str, what: &str) -> SignResult<()> {
    let idx = xml
        .find(anchor)
        .ok_or_else(|| SignError::InvoiceParse(format!("{what} anchor not found")))?;
    xml.insert_str(idx, content);
    Ok(())
}

/// Drop lines that consist solely of spaces/tabs, matching `§4.5` step 8's
/// textual cleanup after anchor-point insertion.
fn strip_blank_lines(xml: &str) -> String {
    xml.split('\n')
        .filter(|line| !(!line.is_empty() && line.bytes().all(|b| b == b' ' || b == b'\t')))
        .collect::<Vec<_>>()
        .join("\n")
}

fn error_code(e: &SignError) -> &'static str {
    match e {
        SignError::InvoiceParse(_) => "invoice_parse",
        SignError::Encoding(_) => "encoding",
        SignError::CryptoSign(_) => "crypto_sign",
        SignError::CertificateDataMissing(_) => "certificate_data_missing",
        SignError::BuilderState(_) => "builder_state",
        SignError::NullArgument(_) => "null_argument",
    }
}

#[cfg(feature = "otel")]
fn record_failure(code: &'static str) {
    zatca_telemetry::metrics::init_sign_instruments().inc_failure(code);
}

#[cfg(not(feature = "otel"))]
fn record_failure(_code: &'static str) {}

#[cfg(feature = "otel")]
fn observe_duration(ms: f64) {
    zatca_telemetry::metrics::init_sign_instruments().observe_ms(ms);
}

#[cfg(not(feature = "otel"))]
fn observe_duration(_ms: f64) {}
