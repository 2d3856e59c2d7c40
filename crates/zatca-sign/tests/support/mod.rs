//! Shared fixtures for the signing orchestrator's integration tests.

use chrono::{TimeZone, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, PKCS_ECDSA_P256_SHA256};
use zatca_core::FixedClock;

/// A self-signed ECDSA-P256 certificate and its PKCS#8 private key, freshly
/// generated per call (no checked-in golden files; see `SPEC_FULL.md §10.4`).
pub fn fresh_credential() -> (Vec<u8>, Vec<u8>) {
    let mut params = CertificateParams::new(vec![]);
    params.alg = &PKCS_ECDSA_P256_SHA256;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "SA");
    dn.push(DnType::OrganizationName, "Acme Trading Co");
    dn.push(DnType::CommonName, "eInvoicing");
    params.distinguished_name = dn;
    let cert = rcgen::Certificate::from_params(params).unwrap();
    let cert_der = cert.serialize_der().unwrap();
    let key_der = cert.get_key_pair().serialize_der();
    (cert_der, key_der)
}

/// The S1/S2 seed scenario invoice: `UUID=3cf5ee18-...`, one line of
/// 2.00 x 2.00, VAT 0.60, total 4.60, `IssueDate=2024-09-07T17:41:08`.
/// `type_code` selects standard (`0100000`) vs simplified (`0200000`).
pub fn seed_invoice(type_code: &str) -> String {
    format!(
        r#"<Invoice xmlns:cbc="urn:cbc" xmlns:cac="urn:cac">
<cbc:UUID>3cf5ee18-ee25-44ea-a444-2c37ba7f28be</cbc:UUID>
<cbc:ID>SME00023</cbc:ID>
<cbc:IssueDate>2024-09-07</cbc:IssueDate>
<cbc:IssueTime>17:41:08</cbc:IssueTime>
<cbc:InvoiceTypeCode name="{type_code}">388</cbc:InvoiceTypeCode>
<cbc:ProfileID>reporting:1.0</cbc:ProfileID>
<cac:AccountingSupplierParty><cac:Party>
<cac:PartyLegalEntity><cbc:RegistrationName>Acme Trading Co</cbc:RegistrationName></cac:PartyLegalEntity>
<cac:PartyTaxScheme><cbc:CompanyID>300000000000003</cbc:CompanyID></cac:PartyTaxScheme>
</cac:Party></cac:AccountingSupplierParty>
<cac:InvoiceLine>
<cbc:InvoicedQuantity>2.00</cbc:InvoicedQuantity>
<cbc:LineExtensionAmount>4.00</cbc:LineExtensionAmount>
</cac:InvoiceLine>
<cac:TaxTotal><cbc:TaxAmount>0.60</cbc:TaxAmount></cac:TaxTotal>
<cac:LegalMonetaryTotal><cbc:TaxInclusiveAmount>4.60</cbc:TaxInclusiveAmount></cac:LegalMonetaryTotal>
</Invoice>"#
    )
}

/// The fixed `SigningTime` used by every seed scenario: `2024-09-07T17:41:08Z`.
pub fn seed_clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 9, 7, 17, 41, 8).unwrap())
}
