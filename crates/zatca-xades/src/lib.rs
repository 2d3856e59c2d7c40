//! Builds the fixed-shape XAdES-BES `<ext:UBLExtensions>` fragment
//! (`§4.4` of the signing pipeline's component design): `SignedProperties`,
//! `SignedInfo` with its chained-transform invoice reference, and the
//! outer `ds:Signature`/`sig:UBLDocumentSignatures` envelope.
//!
//! The builder enforces the input contract explicitly: `set_certificate`,
//! `set_invoice_digest`, and `set_signature_value` must all be called
//! before [`XadesBuilder::build`] succeeds, and each setter rejects an
//! empty value up front rather than letting it propagate into malformed XML.

#![deny(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use zatca_cert::Certificate;
use zatca_core::{format_signing_time, SignError, SignResult};

const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";
const EXT_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
const CAC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
const CBC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
const SIG_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonSignatureComponents-2";
const SAC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:SignatureAggregateComponents-2";
const SBC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:SignatureBasicComponents-2";

const SIGNED_PROPERTIES_ID: &str = "xadesSignedProperties";

struct CertificateFields {
    cert_b64: String,
    cert_digest_b64: String,
    issuer: String,
    serial: String,
}

/// Accumulates the three required inputs and assembles the signature
/// fragment once they are all present.
pub struct XadesBuilder {
    signing_time: DateTime<Utc>,
    certificate: Option<CertificateFields>,
    invoice_digest: Option<String>,
    signature_value: Option<String>,
}

impl XadesBuilder {
    /// Start a builder for a single signature, pinning the `SigningTime`
    /// that will appear in both the emitted text and the digested canonical
    /// form (callers inject a fixed clock in tests for byte-exact output).
    #[must_use]
    pub fn new(signing_time: DateTime<Utc>) -> Self {
        Self { signing_time, certificate: None, invoice_digest: None, signature_value: None }
    }

    /// Record the signing certificate's projections needed by
    /// `SignedProperties` (`CertDigest`, `IssuerSerial`) and `KeyInfo`.
    ///
    /// # Errors
    /// Propagates [`SignError::CertificateDataMissing`] if the issuer name
    /// cannot be formatted.
    pub fn set_certificate(&mut self, cert: &Certificate) -> SignResult<()> {
        self.certificate = Some(CertificateFields {
            cert_b64: cert.raw_base64(),
            cert_digest_b64: cert.cert_hash_b64_of_hex(),
            issuer: cert.formatted_issuer()?,
            serial: cert.serial_number_decimal(),
        });
        Ok(())
    }

    /// Record Reference #1's `DigestValue` — the invoice hash (tag 6).
    ///
    /// # Errors
    /// Returns [`SignError::NullArgument`] if `digest_b64` is empty.
    pub fn set_invoice_digest(&mut self, digest_b64: impl Into<String>) -> SignResult<()> {
        let value = digest_b64.into();
        if value.is_empty() {
            return Err(SignError::NullArgument("invoice_digest".into()));
        }
        self.invoice_digest = Some(value);
        Ok(())
    }

    /// Record the ECDSA signature over the canonical `SignedInfo`.
    ///
    /// # Errors
    /// Returns [`SignError::NullArgument`] if `signature_b64` is empty.
    pub fn set_signature_value(&mut self, signature_b64: impl Into<String>) -> SignResult<()> {
        let value = signature_b64.into();
        if value.is_empty() {
            return Err(SignError::NullArgument("signature_value".into()));
        }
        self.signature_value = Some(value);
        Ok(())
    }

    fn signed_properties_xml(&self) -> SignResult<String> {
        let cert = self
            .certificate
            .as_ref()
            .ok_or_else(|| SignError::BuilderState("certificate".into()))?;
        Ok(format!(
            "<xades:SignedProperties xmlns:xades=\"{xades_ns}\" xmlns:ds=\"{ds_ns}\" Id=\"{id}\">\
<xades:SignedSignatureProperties>\
<xades:SigningTime>{time}</xades:SigningTime>\
<xades:SigningCertificate><xades:Cert>\
<xades:CertDigest><ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"/>\
<ds:DigestValue>{cert_digest}</ds:DigestValue></xades:CertDigest>\
<xades:IssuerSerial><ds:X509IssuerName>{issuer}</ds:X509IssuerName>\
<ds:X509SerialNumber>{serial}</ds:X509SerialNumber></xades:IssuerSerial>\
</xades:Cert></xades:SigningCertificate>\
</xades:SignedSignatureProperties></xades:SignedProperties>",
            xades_ns = XADES_NS,
            ds_ns = XMLDSIG_NS,
            id = SIGNED_PROPERTIES_ID,
            time = format_signing_time(&self.signing_time),
            cert_digest = cert.cert_digest_b64,
            issuer = escape_text(&cert.issuer),
            serial = cert.serial,
        ))
    }

    /// Canonical (C14N 1.1) bytes of `SignedProperties`, needed to compute
    /// Reference #2's digest.
    ///
    /// # Errors
    /// Returns [`SignError::BuilderState`] if the certificate has not been
    /// set yet.
    pub fn signed_properties_canonical(&self) -> SignResult<Vec<u8>> {
        let xml = self.signed_properties_xml()?;
        let root = zatca_xml::parse(xml.as_bytes())?;
        Ok(zatca_xml::serialize_canonical(&root))
    }

    fn signed_properties_digest_b64(&self) -> SignResult<String> {
        let canonical = self.signed_properties_canonical()?;
        Ok(BASE64.encode(Sha256::digest(canonical)))
    }

    /// Canonical (C14N 1.1) bytes of `SignedInfo` — the exact bytes the
    /// ECDSA primitive signs. Available once the certificate and invoice
    /// digest are set; the signature value is not required yet.
    ///
    /// # Errors
    /// Returns [`SignError::BuilderState`] if the certificate or invoice
    /// digest has not been set yet.
    pub fn canonical_signed_info(&self) -> SignResult<Vec<u8>> {
        let invoice_digest = self
            .invoice_digest
            .as_ref()
            .ok_or_else(|| SignError::BuilderState("invoice_digest".into()))?;
        let sp_digest = self.signed_properties_digest_b64()?;

        let xml = format!(
            "<ds:SignedInfo xmlns:ds=\"{ds_ns}\" xmlns:ext=\"{ext_ns}\" xmlns:cac=\"{cac_ns}\" xmlns:cbc=\"{cbc_ns}\">\
<ds:CanonicalizationMethod Algorithm=\"http://www.w3.org/2006/12/xml-c14n11\"/>\
<ds:SignatureMethod Algorithm=\"http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256\"/>\
<ds:Reference Id=\"invoiceSignedData\" URI=\"\">\
<ds:Transforms>\
<ds:Transform Algorithm=\"http://www.w3.org/TR/1999/REC-xpath-19991116\">\
<ds:XPath>not(//ancestor-or-self::ext:UBLExtensions)</ds:XPath></ds:Transform>\
<ds:Transform Algorithm=\"http://www.w3.org/TR/1999/REC-xpath-19991116\">\
<ds:XPath>not(//ancestor-or-self::cac:Signature)</ds:XPath></ds:Transform>\
<ds:Transform Algorithm=\"http://www.w3.org/TR/1999/REC-xpath-19991116\">\
<ds:XPath>not(//ancestor-or-self::cac:AdditionalDocumentReference[cbc:ID='QR'])</ds:XPath></ds:Transform>\
<ds:Transform Algorithm=\"http://www.w3.org/2006/12/xml-c14n11\"/>\
</ds:Transforms>\
<ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"/>\
<ds:DigestValue>{invoice_digest}</ds:DigestValue>\
</ds:Reference>\
<ds:Reference Type=\"http://uri.etsi.org/01903#SignedProperties\" URI=\"#{sp_id}\">\
<ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"/>\
<ds:DigestValue>{sp_digest}</ds:DigestValue>\
</ds:Reference>\
</ds:SignedInfo>",
            ds_ns = XMLDSIG_NS,
            ext_ns = EXT_NS,
            cac_ns = CAC_NS,
            cbc_ns = CBC_NS,
            sp_id = SIGNED_PROPERTIES_ID,
        );
        let root = zatca_xml::parse(xml.as_bytes())?;
        Ok(zatca_xml::serialize_canonical(&root))
    }

    /// Assemble the final `<ext:UBLExtensions>` fragment. Requires the
    /// certificate, invoice digest, and signature value to all be set.
    ///
    /// # Errors
    /// Returns [`SignError::BuilderState`] naming the first missing input.
    pub fn build(&self) -> SignResult<String> {
        if self.certificate.is_none() {
            return Err(SignError::BuilderState("certificate".into()));
        }
        if self.invoice_digest.is_none() {
            return Err(SignError::BuilderState("invoice_digest".into()));
        }
        let signature_value = self
            .signature_value
            .as_ref()
            .ok_or_else(|| SignError::BuilderState("signature_value".into()))?;
        let cert = self.certificate.as_ref().expect("checked above");

        let signed_info_canonical = self.canonical_signed_info()?;
        let signed_info_xml =
            String::from_utf8(signed_info_canonical).map_err(|e| SignError::Encoding(e.to_string()))?;
        let signed_properties_canonical = self.signed_properties_canonical()?;
        let signed_properties_xml = String::from_utf8(signed_properties_canonical)
            .map_err(|e| SignError::Encoding(e.to_string()))?;

        Ok(format!(
            "<ext:UBLExtensions xmlns:ext=\"{ext_ns}\">\
<ext:UBLExtension>\
<ext:ExtensionURI>urn:oasis:names:specification:ubl:dsig:enveloped:xades</ext:ExtensionURI>\
<ext:ExtensionContent>\
<sig:UBLDocumentSignatures xmlns:sig=\"{sig_ns}\" xmlns:sac=\"{sac_ns}\" xmlns:sbc=\"{sbc_ns}\">\
<sac:SignatureInformation>\
<cbc:ID xmlns:cbc=\"{cbc_ns}\">urn:oasis:names:specification:ubl:signature:1</cbc:ID>\
<sbc:ReferencedSignatureID>urn:oasis:names:specification:ubl:signature:Invoice</sbc:ReferencedSignatureID>\
<ds:Signature xmlns:ds=\"{ds_ns}\" Id=\"signature\">\
{signed_info}\
<ds:SignatureValue>{signature_value}</ds:SignatureValue>\
<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert_b64}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>\
<ds:Object>\
<xades:QualifyingProperties Target=\"signature\" xmlns:xades=\"{xades_ns}\">\
{signed_properties}\
</xades:QualifyingProperties>\
</ds:Object>\
</ds:Signature>\
</sac:SignatureInformation>\
</sig:UBLDocumentSignatures>\
</ext:ExtensionContent>\
</ext:UBLExtension>\
</ext:UBLExtensions>",
            ext_ns = EXT_NS,
            sig_ns = SIG_NS,
            sac_ns = SAC_NS,
            sbc_ns = SBC_NS,
            cbc_ns = CBC_NS,
            ds_ns = XMLDSIG_NS,
            xades_ns = XADES_NS,
            signed_info = signed_info_xml,
            signature_value = signature_value,
            cert_b64 = cert.cert_b64,
            signed_properties = signed_properties_xml,
        ))
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
