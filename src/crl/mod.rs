//! CRL generation per RFC 5280 §5, fed from the CA database's revoked lines.

use std::borrow::Cow;

use chrono::prelude::*;

pub(crate) mod proto;

use crate::config::SignatureHash;
use crate::index::RevokedEntry;
use crate::ocsp::proto::{
    x509_name_der, x509_pubkey_bitstr, BitStringWritable, CowBytes, CowSequenceOfWriter,
    Enumerated, ExtensionWrite, SignatureAlgorithmIdentifier,
};
use crate::ocsp::types::{signature_algorithm, RevocationReason};

lazy_static! {
    static ref ID_CE_CRL_NUMBER: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("2.5.29.20").unwrap();
    static ref ID_CE_CRL_REASON: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("2.5.29.21").unwrap();
    static ref ID_CE_HOLD_INSTRUCTION_CODE: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("2.5.29.23").unwrap();
    static ref ID_CE_INVALIDITY_DATE: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("2.5.29.24").unwrap();
    static ref ID_CE_AUTHORITY_KEY_IDENTIFIER: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("2.5.29.35").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrlVersion {
    V1,
    V2,
}

#[derive(Debug, Clone)]
pub struct CrlConfig {
    pub number: u64,
    pub version: CrlVersion,
    pub days: i64,
    pub hash: SignatureHash,
}

#[derive(Debug, Clone)]
pub struct CrlEntry {
    pub serial: Vec<u8>,
    pub revoked_at: DateTime<Utc>,
    pub reason: Option<RevocationReason>,
    pub invalidity_date: Option<DateTime<Utc>>,
    pub hold_instruction: Option<asn1::ObjectIdentifier>,
}

impl CrlEntry {
    /// Decodes a CA database line into CRL terms. The third field of the
    /// revocation column is a compromise time for keyCompromise and a hold
    /// instruction OID for certificateHold; for other reasons it is dropped.
    pub fn from_index(entry: &RevokedEntry) -> CrlEntry {
        let reason = entry.reason.as_deref().and_then(RevocationReason::from_name);

        let invalidity_date = if reason == Some(RevocationReason::KeyCompromise) {
            entry.extra.as_deref().and_then(|extra| {
                crate::util::parse_generalized_time(extra)
                    .or_else(|| crate::util::parse_index_time(extra))
            })
        } else {
            None
        };

        let hold_instruction = if reason == Some(RevocationReason::CertificateHold) {
            entry.extra.as_deref().and_then(asn1::ObjectIdentifier::from_string)
        } else {
            None
        };

        CrlEntry {
            serial: entry.serial.clone(),
            revoked_at: entry.revoked_at,
            reason,
            invalidity_date,
            hold_instruction,
        }
    }
}

/// Content octets for a DER INTEGER holding an unsigned value.
fn int_content(bytes: &[u8]) -> Vec<u8> {
    let mut bytes = bytes;
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes = &bytes[1..];
    }
    if bytes.is_empty() {
        return vec![0];
    }
    if bytes[0] & 0x80 != 0 {
        let mut padded = Vec::with_capacity(bytes.len() + 1);
        padded.push(0);
        padded.extend_from_slice(bytes);
        padded
    } else {
        bytes.to_vec()
    }
}

/// Assembles and signs a CertificateList. `now` becomes thisUpdate; entry
/// extensions and CRL extensions are only emitted for v2.
pub fn build_crl(
    ca_cert: &openssl::x509::X509Ref,
    ca_key: &openssl::pkey::PKeyRef<openssl::pkey::Private>,
    config: &CrlConfig,
    entries: &[CrlEntry],
    now: DateTime<Utc>,
) -> Result<Vec<u8>, openssl::error::ErrorStack> {
    let now = crate::util::truncate_to_seconds(now);
    let v2 = config.version == CrlVersion::V2;

    let issuer_der = x509_name_der(ca_cert.subject_name())?;
    let issuer = asn1::parse_single::<asn1::Tlv>(&issuer_der).unwrap();

    let (sig_oid, digest) = signature_algorithm(ca_key.id(), config.hash);
    let algorithm = SignatureAlgorithmIdentifier {
        algorithm: sig_oid,
        parameters: None,
    };

    let serials = entries.iter().map(|e| int_content(&e.serial)).collect::<Vec<_>>();
    let revoked = entries.iter().zip(&serials).map(|(entry, serial)| {
        let mut entry_extensions = vec![];
        if v2 {
            if let Some(reason) = entry.reason {
                entry_extensions.push(ExtensionWrite {
                    extension_id: ID_CE_CRL_REASON.clone(),
                    critical: false,
                    extension_value: CowBytes(Cow::Owned(
                        asn1::write_single(&Enumerated::new(reason as u32)).unwrap(),
                    )),
                });

                if reason == RevocationReason::KeyCompromise {
                    if let Some(invalidity_date) = entry.invalidity_date {
                        entry_extensions.push(ExtensionWrite {
                            extension_id: ID_CE_INVALIDITY_DATE.clone(),
                            critical: false,
                            extension_value: CowBytes(Cow::Owned(
                                asn1::write_single(
                                    &asn1::GeneralizedTime::new(invalidity_date).unwrap(),
                                ).unwrap(),
                            )),
                        });
                    }
                }

                if reason == RevocationReason::CertificateHold {
                    if let Some(hold_instruction) = &entry.hold_instruction {
                        entry_extensions.push(ExtensionWrite {
                            extension_id: ID_CE_HOLD_INSTRUCTION_CODE.clone(),
                            critical: false,
                            extension_value: CowBytes(Cow::Owned(
                                asn1::write_single(hold_instruction).unwrap(),
                            )),
                        });
                    }
                }
            }
        }

        proto::RevokedCertificate {
            user_certificate: asn1::BigUint::new(serial).unwrap(),
            revocation_date: proto::UtcTimeWritable(entry.revoked_at),
            crl_entry_extensions: if entry_extensions.is_empty() {
                None
            } else {
                Some(CowSequenceOfWriter(Cow::Owned(entry_extensions)))
            },
        }
    }).collect::<Vec<_>>();

    let ca_key_id = openssl::hash::hash(
        openssl::hash::MessageDigest::sha1(), &x509_pubkey_bitstr(ca_cert),
    )?.to_vec();
    let ca_issuer_der = x509_name_der(ca_cert.issuer_name())?;
    let ca_serial = int_content(&ca_cert.serial_number().to_bn()?.to_vec());

    let crl_extensions = if v2 {
        let authority_key_identifier = asn1::write_single(&proto::AuthorityKeyIdentifier {
            key_identifier: Some(&ca_key_id),
            authority_cert_issuer: Some(CowSequenceOfWriter(Cow::Owned(vec![
                proto::GeneralName::DirectoryName(
                    proto::TlvWritable(asn1::parse_single::<asn1::Tlv>(&ca_issuer_der).unwrap()),
                ),
            ]))),
            authority_cert_serial_number: Some(asn1::BigUint::new(&ca_serial).unwrap()),
        }).unwrap();

        Some(CowSequenceOfWriter(Cow::Owned(vec![
            ExtensionWrite {
                extension_id: ID_CE_AUTHORITY_KEY_IDENTIFIER.clone(),
                critical: false,
                extension_value: CowBytes(Cow::Owned(authority_key_identifier)),
            },
            ExtensionWrite {
                extension_id: ID_CE_CRL_NUMBER.clone(),
                critical: false,
                extension_value: CowBytes(Cow::Owned(
                    asn1::write_single(&config.number).unwrap(),
                )),
            },
        ])))
    } else {
        None
    };

    let tbs_cert_list = proto::TBSCertList {
        version: if v2 { Some(1) } else { None },
        signature: algorithm.clone(),
        issuer,
        this_update: proto::UtcTimeWritable(now),
        next_update: Some(proto::UtcTimeWritable(now + chrono::Duration::days(config.days))),
        revoked_certificates: if revoked.is_empty() {
            None
        } else {
            Some(CowSequenceOfWriter(Cow::Owned(revoked)))
        },
        crl_extensions,
    };

    let tbs_bytes = asn1::write_single(&tbs_cert_list).unwrap();
    let mut signer = openssl::sign::Signer::new(digest, ca_key)?;
    let signature = signer.sign_oneshot_to_vec(&tbs_bytes)?;

    Ok(asn1::write_single(&proto::CertificateList {
        tbs_cert_list,
        signature_algorithm: algorithm,
        signature: BitStringWritable { value: &signature },
    }).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocsp::issuers::tests::test_issuer;
    use crate::ocsp::OCSPIssuer;
    use std::path::PathBuf;

    fn issuer() -> OCSPIssuer {
        test_issuer(PathBuf::from("/nonexistent"))
    }

    fn config(version: CrlVersion) -> CrlConfig {
        CrlConfig {
            number: 1,
            version,
            days: 30,
            hash: SignatureHash::Sha256,
        }
    }

    fn find_extension<'a>(
        extensions: &'a [crate::ocsp::proto::Extension<'a>],
        oid: &asn1::ObjectIdentifier,
    ) -> Option<&'a crate::ocsp::proto::Extension<'a>> {
        extensions.iter().find(|e| e.extension_id.eq(oid))
    }

    #[test]
    fn v2_crl_round_trips() {
        let issuer = issuer();
        let now = Utc.with_ymd_and_hms(2023, 6, 15, 10, 15, 30).unwrap();
        let entries = vec![CrlEntry {
            serial: vec![0x0a, 0x1b, 0x2c],
            revoked_at: now,
            reason: Some(RevocationReason::KeyCompromise),
            invalidity_date: None,
            hold_instruction: None,
        }];

        let der = build_crl(&issuer.cert, &issuer.pkey, &config(CrlVersion::V2), &entries, now)
            .unwrap();

        let crl = asn1::parse_single::<proto::CertificateListRead>(&der).unwrap();
        let tbs = crl.tbs_cert_list.parse::<proto::TBSCertListRead>().unwrap();

        assert_eq!(tbs.version, Some(1));
        assert_eq!(
            tbs.issuer.full_data(),
            x509_name_der(issuer.cert.subject_name()).unwrap().as_slice()
        );
        assert_eq!(tbs.this_update.data(), b"230615101530Z");
        assert_eq!(tbs.next_update.data(), b"230715101530Z");

        let mut revoked = tbs.revoked_certificates.unwrap().collect::<Vec<_>>();
        assert_eq!(revoked.len(), 1);
        let entry = revoked.remove(0);
        assert_eq!(entry.user_certificate.as_bytes(), &[0x0a, 0x1b, 0x2c]);
        assert_eq!(entry.revocation_date.data(), b"230615101530Z");

        let entry_exts = entry.crl_entry_extensions.unwrap().collect::<Vec<_>>();
        let reason = find_extension(&entry_exts, &ID_CE_CRL_REASON).unwrap();
        assert_eq!(reason.extension_value, &[0x0a, 0x01, 0x01]);

        let crl_exts = tbs.crl_extensions.unwrap().collect::<Vec<_>>();
        let aki = find_extension(&crl_exts, &ID_CE_AUTHORITY_KEY_IDENTIFIER).unwrap();
        assert!(aki.extension_value
            .windows(issuer.pub_key_sha1.len())
            .any(|w| w == issuer.pub_key_sha1.as_slice()));
        let number = find_extension(&crl_exts, &ID_CE_CRL_NUMBER).unwrap();
        assert_eq!(number.extension_value, &[0x02, 0x01, 0x01]);

        let mut verifier = openssl::sign::Verifier::new(
            openssl::hash::MessageDigest::sha256(), &issuer.pkey,
        ).unwrap();
        assert!(verifier
            .verify_oneshot(crl.signature.as_bytes(), crl.tbs_cert_list.full_data())
            .unwrap());
    }

    #[test]
    fn v1_crl_has_no_version_or_extensions() {
        let issuer = issuer();
        let now = Utc.with_ymd_and_hms(2023, 6, 15, 10, 15, 30).unwrap();
        let entries = vec![CrlEntry {
            serial: vec![0x01],
            revoked_at: now,
            reason: Some(RevocationReason::Superseded),
            invalidity_date: None,
            hold_instruction: None,
        }];

        let der = build_crl(&issuer.cert, &issuer.pkey, &config(CrlVersion::V1), &entries, now)
            .unwrap();

        let crl = asn1::parse_single::<proto::CertificateListRead>(&der).unwrap();
        let tbs = crl.tbs_cert_list.parse::<proto::TBSCertListRead>().unwrap();

        assert_eq!(tbs.version, None);
        assert!(tbs.crl_extensions.is_none());
        let revoked = tbs.revoked_certificates.unwrap().collect::<Vec<_>>();
        assert!(revoked[0].crl_entry_extensions.is_none());
    }

    #[test]
    fn reason_specific_entry_extensions() {
        let issuer = issuer();
        let now = Utc.with_ymd_and_hms(2023, 6, 15, 10, 15, 30).unwrap();
        let invalidity = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let hold_oid = asn1::ObjectIdentifier::from_string("1.2.840.10040.2.1").unwrap();

        let entries = vec![
            CrlEntry {
                serial: vec![0x01],
                revoked_at: now,
                reason: Some(RevocationReason::KeyCompromise),
                invalidity_date: Some(invalidity),
                hold_instruction: None,
            },
            CrlEntry {
                serial: vec![0x02],
                revoked_at: now,
                reason: Some(RevocationReason::CertificateHold),
                invalidity_date: None,
                hold_instruction: Some(hold_oid.clone()),
            },
            CrlEntry {
                serial: vec![0x03],
                revoked_at: now,
                reason: None,
                invalidity_date: None,
                hold_instruction: None,
            },
        ];

        let der = build_crl(&issuer.cert, &issuer.pkey, &config(CrlVersion::V2), &entries, now)
            .unwrap();

        let crl = asn1::parse_single::<proto::CertificateListRead>(&der).unwrap();
        let tbs = crl.tbs_cert_list.parse::<proto::TBSCertListRead>().unwrap();
        let mut revoked = tbs.revoked_certificates.unwrap().collect::<Vec<_>>().into_iter();
        let key_compromise_entry = revoked.next().unwrap();
        let hold_entry = revoked.next().unwrap();
        let bare_entry = revoked.next().unwrap();

        let key_compromise = key_compromise_entry.crl_entry_extensions.unwrap().collect::<Vec<_>>();
        let invalidity_ext = find_extension(&key_compromise, &ID_CE_INVALIDITY_DATE).unwrap();
        assert!(invalidity_ext.extension_value.ends_with(b"20230601000000Z"));
        assert!(find_extension(&key_compromise, &ID_CE_HOLD_INSTRUCTION_CODE).is_none());

        let hold = hold_entry.crl_entry_extensions.unwrap().collect::<Vec<_>>();
        let hold_ext = find_extension(&hold, &ID_CE_HOLD_INSTRUCTION_CODE).unwrap();
        assert!(asn1::parse_single::<asn1::ObjectIdentifier>(hold_ext.extension_value)
            .unwrap()
            .eq(&hold_oid));
        assert!(find_extension(&hold, &ID_CE_INVALIDITY_DATE).is_none());

        // no reason, no entry extensions at all
        assert!(bare_entry.crl_entry_extensions.is_none());
    }

    #[test]
    fn empty_revocation_list_still_signs() {
        let issuer = issuer();
        let now = Utc.with_ymd_and_hms(2023, 6, 15, 10, 15, 30).unwrap();

        let der = build_crl(&issuer.cert, &issuer.pkey, &config(CrlVersion::V2), &[], now).unwrap();

        let crl = asn1::parse_single::<proto::CertificateListRead>(&der).unwrap();
        let tbs = crl.tbs_cert_list.parse::<proto::TBSCertListRead>().unwrap();
        assert!(tbs.revoked_certificates.is_none());

        let mut verifier = openssl::sign::Verifier::new(
            openssl::hash::MessageDigest::sha256(), &issuer.pkey,
        ).unwrap();
        assert!(verifier
            .verify_oneshot(crl.signature.as_bytes(), crl.tbs_cert_list.full_data())
            .unwrap());
    }

    #[test]
    fn high_bit_serials_are_sign_padded() {
        let issuer = issuer();
        let now = Utc.with_ymd_and_hms(2023, 6, 15, 10, 15, 30).unwrap();
        let entries = vec![CrlEntry {
            serial: vec![0x80],
            revoked_at: now,
            reason: None,
            invalidity_date: None,
            hold_instruction: None,
        }];

        let der = build_crl(&issuer.cert, &issuer.pkey, &config(CrlVersion::V2), &entries, now)
            .unwrap();

        let crl = asn1::parse_single::<proto::CertificateListRead>(&der).unwrap();
        let tbs = crl.tbs_cert_list.parse::<proto::TBSCertListRead>().unwrap();
        let revoked = tbs.revoked_certificates.unwrap().collect::<Vec<_>>();
        assert_eq!(revoked[0].user_certificate.as_bytes(), &[0x00, 0x80]);
    }

    #[test]
    fn index_entries_map_to_crl_terms() {
        let now = Utc.with_ymd_and_hms(2023, 6, 15, 10, 15, 30).unwrap();
        let entry = |reason: Option<&str>, extra: Option<&str>| RevokedEntry {
            serial: vec![0x01],
            serial_hex: "01".to_string(),
            revoked_at: now,
            reason: reason.map(str::to_string),
            extra: extra.map(str::to_string),
        };

        let mapped = CrlEntry::from_index(&entry(Some("keyCompromise"), Some("230601000000Z")));
        assert_eq!(mapped.reason, Some(RevocationReason::KeyCompromise));
        assert_eq!(
            mapped.invalidity_date,
            Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap())
        );
        assert!(mapped.hold_instruction.is_none());

        let mapped = CrlEntry::from_index(&entry(Some("certificateHold"), Some("1.2.840.10040.2.1")));
        assert_eq!(mapped.reason, Some(RevocationReason::CertificateHold));
        assert!(mapped.invalidity_date.is_none());
        assert!(mapped.hold_instruction.is_some());

        let mapped = CrlEntry::from_index(&entry(Some("solarFlare"), None));
        assert_eq!(mapped.reason, None);

        let mapped = CrlEntry::from_index(&entry(Some("superseded"), Some("230601000000Z")));
        assert_eq!(mapped.reason, Some(RevocationReason::Superseded));
        assert!(mapped.invalidity_date.is_none());
        assert!(mapped.hold_instruction.is_none());
    }
}
