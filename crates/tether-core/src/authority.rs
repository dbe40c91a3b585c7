//! Certificate-authority material
//!
//! Builds the self-signed signing identity used to issue device enrollment
//! certificates: an RSA key of fixed strength and an X.509v3 CA certificate
//! with a fixed validity period and organization/country identity. The
//! create-or-load persistence around this material lives with the storage
//! layer; this module only produces and encodes it.

use std::path::Path;

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Name, X509Ref, X509};

use crate::error::Result;

/// Key strength for the enrollment CA signing key
pub const CA_KEY_BITS: u32 = 2048;

/// Validity period of the CA certificate, in years
pub const CA_VALIDITY_YEARS: u32 = 5;

// X509 version 3 is represented by 2
const X509_VERSION_3: i32 = 2;

/// Generate a fresh RSA signing key
pub fn generate_signing_key(bits: u32) -> Result<PKey<Private>> {
    let rsa = openssl::rsa::Rsa::generate(bits)?;
    Ok(PKey::from_rsa(rsa)?)
}

/// Build a self-signed CA certificate over the given signing key.
///
/// The certificate is X.509v3 with a random 128-bit serial, critical
/// `BasicConstraints: CA` and `KeyUsage: keyCertSign, cRLSign,
/// digitalSignature` extensions, signed with SHA-256. Subject and issuer
/// are identical: `CN=organization, O=organization, C=country`.
pub fn build_ca_certificate(
    key: &PKeyRef<Private>,
    validity_years: u32,
    organization: &str,
    country: &str,
) -> Result<X509> {
    let mut name = X509Name::builder()?;
    name.append_entry_by_nid(Nid::COMMONNAME, organization)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, organization)?;
    name.append_entry_by_nid(Nid::COUNTRYNAME, country)?;
    let name = name.build();

    let mut builder = X509::builder()?;
    builder.set_version(X509_VERSION_3)?;

    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    let serial = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;

    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(key)?;

    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(validity_years * 365)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    let mut bc = BasicConstraints::new();
    bc.critical().ca();
    builder.append_extension(bc.build()?)?;

    let mut ku = KeyUsage::new();
    ku.critical();
    ku.key_cert_sign();
    ku.crl_sign();
    ku.digital_signature();
    builder.append_extension(ku.build()?)?;

    builder.sign(key, MessageDigest::sha256())?;
    Ok(builder.build())
}

/// Write a certificate's PEM encoding to `path`, truncating any prior
/// content.
///
/// The exported file is refreshed on every startup even when the authority
/// was loaded rather than created, so it always reflects the current
/// authority.
pub fn write_certificate_pem(path: &Path, cert: &X509Ref) -> Result<()> {
    std::fs::write(path, cert.to_pem()?)?;
    Ok(())
}
