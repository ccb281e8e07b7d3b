//! Wire-level ASN.1 structures for RFC 5280 certificate revocation lists.
//! The read-side structures exist so the build output can be re-parsed; they
//! assume the shapes this builder emits (thisUpdate/nextUpdate as UTCTime).

use chrono::prelude::*;

use crate::ocsp::proto::{
    BitStringWritable, CowSequenceOfWriter, Extension, ExtensionsWriter,
    SignatureAlgorithmIdentifier,
};

#[derive(asn1::Asn1Write)]
pub struct CertificateList<'a> {
    pub tbs_cert_list: TBSCertList<'a>,
    pub signature_algorithm: SignatureAlgorithmIdentifier<'a>,
    pub signature: BitStringWritable<'a>,
}

#[derive(asn1::Asn1Write)]
pub struct TBSCertList<'a> {
    // present only for v2, where it carries the INTEGER 1
    pub version: Option<u8>,
    pub signature: SignatureAlgorithmIdentifier<'a>,
    pub issuer: asn1::Tlv<'a>,
    pub this_update: UtcTimeWritable,
    pub next_update: Option<UtcTimeWritable>,
    pub revoked_certificates: Option<CowSequenceOfWriter<'a, RevokedCertificate<'a>>>,
    #[explicit(0)]
    pub crl_extensions: Option<ExtensionsWriter<'a>>,
}

#[derive(asn1::Asn1Write, Clone)]
pub struct RevokedCertificate<'a> {
    pub user_certificate: asn1::BigUint<'a>,
    pub revocation_date: UtcTimeWritable,
    pub crl_entry_extensions: Option<ExtensionsWriter<'a>>,
}

#[derive(asn1::Asn1Write)]
pub struct AuthorityKeyIdentifier<'a> {
    #[implicit(0)]
    pub key_identifier: Option<&'a [u8]>,
    #[implicit(1)]
    pub authority_cert_issuer: Option<CowSequenceOfWriter<'a, GeneralName<'a>>>,
    #[implicit(2)]
    pub authority_cert_serial_number: Option<asn1::BigUint<'a>>,
}

#[derive(asn1::Asn1Write, Clone)]
pub enum GeneralName<'a> {
    // explicit because Name is itself a CHOICE
    #[explicit(4)]
    DirectoryName(TlvWritable<'a>),
}

/// Wraps `asn1::Tlv` so it can be used as an explicit/implicit tagged field:
/// `asn1::Tlv` implements `Asn1Writable` directly (its tag varies at
/// runtime), but the `Asn1Write` derive needs `&Tlv` itself to implement
/// `Asn1Writable`, which the `asn1` crate doesn't provide.
#[derive(Debug, Clone, Copy)]
pub struct TlvWritable<'a>(pub asn1::Tlv<'a>);

impl<'a> asn1::Asn1Writable for TlvWritable<'a> {
    fn write(&self, w: &mut asn1::Writer) -> asn1::WriteResult {
        self.0.write(w)
    }
}

impl<'a> asn1::Asn1Writable for &TlvWritable<'a> {
    fn write(&self, w: &mut asn1::Writer) -> asn1::WriteResult {
        self.0.write(w)
    }
}

/// `YYMMDDHHMMSSZ`, whole seconds.
#[derive(Debug, Clone, Copy)]
pub struct UtcTimeWritable(pub DateTime<Utc>);

impl asn1::SimpleAsn1Writable for UtcTimeWritable {
    const TAG: asn1::Tag = asn1::Tag::primitive(0x17);

    fn write_data(&self, dest: &mut asn1::WriteBuf) -> Result<(), asn1::WriteError> {
        dest.push_slice(self.0.format("%y%m%d%H%M%SZ").to_string().as_bytes())
    }
}

#[derive(asn1::Asn1Read)]
pub struct CertificateListRead<'a> {
    pub tbs_cert_list: asn1::Tlv<'a>,
    pub signature_algorithm: SignatureAlgorithmIdentifier<'a>,
    pub signature: asn1::BitString<'a>,
}

#[derive(asn1::Asn1Read)]
pub struct TBSCertListRead<'a> {
    pub version: Option<u8>,
    pub signature: SignatureAlgorithmIdentifier<'a>,
    pub issuer: asn1::Tlv<'a>,
    pub this_update: asn1::Tlv<'a>,
    pub next_update: asn1::Tlv<'a>,
    pub revoked_certificates: Option<asn1::SequenceOf<'a, RevokedCertificateRead<'a>>>,
    #[explicit(0)]
    pub crl_extensions: Option<asn1::SequenceOf<'a, Extension<'a>>>,
}

#[derive(asn1::Asn1Read)]
pub struct RevokedCertificateRead<'a> {
    pub user_certificate: asn1::BigUint<'a>,
    pub revocation_date: asn1::Tlv<'a>,
    pub crl_entry_extensions: Option<asn1::SequenceOf<'a, Extension<'a>>>,
}
