use super::proto;

use base64::prelude::*;
use chrono::prelude::*;
use thiserror::Error;

lazy_static! {
    static ref SHA1_WITH_RSA_ENCRYPTION: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("1.2.840.113549.1.1.5").unwrap();
    static ref SHA256_WITH_RSA_ENCRYPTION: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("1.2.840.113549.1.1.11").unwrap();
    static ref ECDSA_WITH_SHA1: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("1.2.840.10045.4.1").unwrap();
    static ref ECDSA_WITH_SHA256: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("1.2.840.10045.4.3.2").unwrap();

    static ref ID_PKIX_OCSP_BASIC: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("1.3.6.1.5.5.7.48.1.1").unwrap();
    static ref ID_PKIX_OCSP_NONCE: asn1::ObjectIdentifier = asn1::ObjectIdentifier::from_string("1.3.6.1.5.5.7.48.1.2").unwrap();
}

/// Everything that can stop a request short of a signed answer. The
/// `response_status` mapping below is the RFC 6960 §4.2.1 table.
#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("malformed request DER: {0}")]
    MalformedAsn1(#[from] asn1::ParseError),
    #[error("unsupported request version {0}")]
    UnsupportedVersion(u8),
    #[error("unsupported critical extension {0}")]
    UnsupportedCriticalExtension(String),
    #[error("request list is empty")]
    RequestListEmpty,
    #[error("multi-certificate requests are not supported")]
    RequestListMultiple,
    #[error("no responder configured for issuer key hash {0}")]
    UnknownIssuer(String),
    #[error("certificate is past its expiry date")]
    ExpiredCertificate,
    #[error("revocation store unavailable: {0}")]
    StoreUnavailable(#[from] crate::index::StoreError),
    #[error("signer failure: {0}")]
    SignerFailure(#[from] openssl::error::ErrorStack),
    #[error("revocation store temporarily unavailable")]
    TryLater,
    #[error("signed requests are required")]
    SigRequired,
}

impl ResponderError {
    pub fn response_status(&self) -> OCSPResponseStatus {
        match self {
            ResponderError::MalformedAsn1(_)
            | ResponderError::UnsupportedVersion(_)
            | ResponderError::UnsupportedCriticalExtension(_)
            | ResponderError::RequestListEmpty
            | ResponderError::RequestListMultiple => OCSPResponseStatus::MalformedRequest,
            ResponderError::StoreUnavailable(_) | ResponderError::SignerFailure(_) => {
                OCSPResponseStatus::InternalError
            }
            ResponderError::TryLater => OCSPResponseStatus::TryLater,
            ResponderError::SigRequired => OCSPResponseStatus::SigRequired,
            ResponderError::UnknownIssuer(_) | ResponderError::ExpiredCertificate => {
                OCSPResponseStatus::Unauthorized
            }
        }
    }
}

#[derive(Clone)]
pub struct CertID<'a> {
    pub hash_algorithm: asn1::ObjectIdentifier,
    pub hash_parameters: Option<asn1::Tlv<'a>>,
    pub issuer_name_hash: &'a [u8],
    pub issuer_key_hash: &'a [u8],
    pub serial_number: &'a [u8],
}

impl std::fmt::Debug for CertID<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("CertID")
            .field("hash_algorithm", &self.hash_algorithm)
            .field("issuer_name_hash", &hex::encode(self.issuer_name_hash))
            .field("issuer_key_hash", &hex::encode(self.issuer_key_hash))
            .field("serial_number", &hex::encode(self.serial_number))
            .finish()
    }
}

impl PartialEq for CertID<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.hash_algorithm == other.hash_algorithm
            && self.issuer_name_hash == other.issuer_name_hash
            && self.issuer_key_hash == other.issuer_key_hash
            && self.serial_number == other.serial_number
    }
}

impl CertID<'_> {
    pub fn issuer_key_hash_b64(&self) -> String {
        BASE64_STANDARD.encode(self.issuer_key_hash)
    }

    fn to_proto(&self) -> proto::CertID<'_> {
        proto::CertID {
            hash_algorithm: proto::DigestAlgorithmIdentifier {
                id: self.hash_algorithm.clone(),
                parameters: self.hash_parameters.clone(),
            },
            issuer_name_hash: self.issuer_name_hash,
            issuer_key_hash: self.issuer_key_hash,
            serial_number: asn1::BigUint::new(self.serial_number).unwrap(),
        }
    }
}

/// The single request this responder answers, with the nonce parsed out of
/// band. Nonces are not echoed.
#[derive(Debug)]
pub struct OCSPRequest<'a> {
    pub cert_id: CertID<'a>,
    pub nonce: Option<&'a [u8]>,
}

#[derive(Debug)]
pub enum CertStatus {
    Good,
    Unknown,
    Revoked(RevokedInfo),
}

#[derive(Debug)]
pub struct RevokedInfo {
    pub revocation_time: DateTime<Utc>,
    pub revocation_reason: Option<RevocationReason>
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CACompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    RemoveFromCRL = 8,
    PrivilegeWithdrawn = 9,
    AACompromise = 10,
}

impl RevocationReason {
    /// Maps a reason name as written in the CA database. Unknown names yield
    /// `None` and the revocationReason extension is omitted.
    pub fn from_name(name: &str) -> Option<RevocationReason> {
        match name {
            "unspecified" => Some(RevocationReason::Unspecified),
            "keyCompromise" => Some(RevocationReason::KeyCompromise),
            "cACompromise" => Some(RevocationReason::CACompromise),
            "affiliationChanged" => Some(RevocationReason::AffiliationChanged),
            "superseded" => Some(RevocationReason::Superseded),
            "cessationOfOperation" => Some(RevocationReason::CessationOfOperation),
            "certificateHold" => Some(RevocationReason::CertificateHold),
            "removeFromCRL" => Some(RevocationReason::RemoveFromCRL),
            "privilegeWithdrawn" => Some(RevocationReason::PrivilegeWithdrawn),
            "aACompromise" => Some(RevocationReason::AACompromise),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OCSPResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

#[derive(Debug)]
pub struct OCSPResponse<'a> {
    pub status: OCSPResponseStatus,
    pub response: Option<OCSPResponseType<'a>>,
}

impl OCSPResponse<'_> {
    pub fn error(status: OCSPResponseStatus) -> OCSPResponse<'static> {
        OCSPResponse {
            status,
            response: None,
        }
    }
}

#[derive(Debug)]
pub enum OCSPResponseType<'a> {
    BasicResponse(BasicOCSPResponse<'a>)
}

#[derive(Debug)]
pub struct BasicOCSPResponse<'a> {
    pub produced_at: DateTime<Utc>,
    pub issuer: &'a super::issuers::OCSPIssuer,
    pub responses: Vec<SingleOCSPResponse<'a>>,
    pub signature_hash: crate::config::SignatureHash,
}

#[derive(Debug)]
pub struct SingleOCSPResponse<'a> {
    pub cert_id: CertID<'a>,
    pub cert_status: CertStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

pub fn parse_ocsp_req(req: &[u8]) -> Result<OCSPRequest<'_>, ResponderError> {
    let outer_request = asn1::parse_single::<proto::OCSPRequest>(req)?;
    let tbs_request = outer_request.tbs_request.parse::<proto::TBSRequest>()?;

    if tbs_request.version != proto::Version::V1 as u8 {
        return Err(ResponderError::UnsupportedVersion(tbs_request.version));
    }

    if let Some(requester_name) = tbs_request.requester_name {
        debug!("ignoring requestorName ({} bytes)", requester_name.full_data().len());
    }

    let mut nonce = None;
    if let Some(exts) = tbs_request.request_extensions {
        for ext in exts {
            if ext.extension_id.eq(&ID_PKIX_OCSP_NONCE) {
                nonce = Some(asn1::parse_single::<&[u8]>(ext.extension_value)?);
            } else if ext.critical {
                return Err(ResponderError::UnsupportedCriticalExtension(
                    format!("{:?}", ext.extension_id),
                ));
            }
        }
    }

    let mut requests = tbs_request.request_list.collect::<Vec<_>>();
    let request = match requests.len() {
        0 => return Err(ResponderError::RequestListEmpty),
        1 => requests.remove(0),
        _ => return Err(ResponderError::RequestListMultiple),
    };

    if let Some(exts) = request.single_request_extensions {
        for ext in exts {
            if ext.critical {
                return Err(ResponderError::UnsupportedCriticalExtension(
                    format!("{:?}", ext.extension_id),
                ));
            }
        }
    }

    Ok(OCSPRequest {
        cert_id: CertID {
            hash_algorithm: request.request_cert.hash_algorithm.id,
            hash_parameters: request.request_cert.hash_algorithm.parameters,
            issuer_name_hash: request.request_cert.issuer_name_hash,
            issuer_key_hash: request.request_cert.issuer_key_hash,
            serial_number: request.request_cert.serial_number.as_bytes(),
        },
        nonce,
    })
}

/// Serializes an error response: `SEQUENCE { ENUMERATED status }` with no
/// responseBytes and no signature.
pub fn serialize_error_resp(status: OCSPResponseStatus) -> Vec<u8> {
    asn1::write_single(&proto::OCSPResponse {
        response_status: asn1::Enumerated::new(status as u32),
        response_bytes: None,
    }).unwrap()
}

pub fn serialize_ocsp_resp(resp: &OCSPResponse) -> Result<Vec<u8>, ResponderError> {
    let response_bytes = match resp.response.as_ref() {
        Some(OCSPResponseType::BasicResponse(br)) => {
            let mut certs = vec![br.issuer.cert.to_der()?];
            for chain_cert in &br.issuer.chain {
                certs.push(chain_cert.to_der()?);
            }
            let certs_tlv = certs.iter()
                .map(|c| asn1::parse_single::<asn1::Tlv>(c))
                .collect::<Result<Vec<_>, _>>()?;

            let responses = br.responses.iter().map(|sr| {
                proto::SingleResponse {
                    cert_id: sr.cert_id.to_proto(),
                    cert_status: match &sr.cert_status {
                        CertStatus::Good => proto::CertStatus::Good(()),
                        CertStatus::Revoked(r) => proto::CertStatus::Revoked(proto::RevokedInfo {
                            revocation_time: asn1::GeneralizedTime::new(r.revocation_time).unwrap(),
                            revocation_reason: r.revocation_reason
                                .map(|reason| proto::Enumerated::new(reason as u32)),
                        }),
                        CertStatus::Unknown => proto::CertStatus::Unknown(()),
                    },
                    this_update: asn1::GeneralizedTime::new(sr.this_update).unwrap(),
                    next_update: sr.next_update.map(|n| asn1::GeneralizedTime::new(n).unwrap()),
                    single_extensions: None,
                }
            }).collect::<Vec<_>>();

            let tbs_response_data = proto::ResponseData {
                version: proto::Version::V1 as u8,
                responder_id: proto::ResponderID::ByHash(&br.issuer.pub_key_sha1),
                produced_at: asn1::GeneralizedTime::new(br.produced_at).unwrap(),
                responses: proto::CowSequenceOfWriter(std::borrow::Cow::Owned(responses)),
                response_extensions: None,
            };

            let tbs_response_bytes = asn1::write_single(&tbs_response_data).unwrap();
            let (sig_alg, message_digest) = signature_algorithm(br.issuer.pkey.id(), br.signature_hash);
            let mut signer = openssl::sign::Signer::new(message_digest, &br.issuer.pkey)?;
            let signature = signer.sign_oneshot_to_vec(&tbs_response_bytes)?;

            Some(proto::ResponseBytes {
                response_type: ID_PKIX_OCSP_BASIC.clone(),
                response: proto::CowBytes(std::borrow::Cow::Owned(
                    asn1::write_single(&proto::BasicOCSPResponse {
                        tbs_response_data,
                        signature_algorithm: proto::SignatureAlgorithmIdentifier {
                            algorithm: sig_alg,
                            parameters: None,
                        },
                        signature: proto::BitStringWritable {
                            value: &signature,
                        },
                        certs: Some(proto::CowSequenceOfWriter(std::borrow::Cow::Owned(certs_tlv))),
                    }).unwrap(),
                )),
            })
        }
        None => None,
    };

    Ok(asn1::write_single(&proto::OCSPResponse {
        response_status: asn1::Enumerated::new(resp.status as u32),
        response_bytes,
    }).unwrap())
}

/// Signature AlgorithmIdentifier OID and digest for a key type and configured
/// hash. Key types outside RSA/EC are rejected when keys are loaded.
pub(crate) fn signature_algorithm(
    key: openssl::pkey::Id,
    hash: crate::config::SignatureHash,
) -> (asn1::ObjectIdentifier, openssl::hash::MessageDigest) {
    use crate::config::SignatureHash;

    match (key, hash) {
        (openssl::pkey::Id::RSA, SignatureHash::Sha1) => {
            (SHA1_WITH_RSA_ENCRYPTION.clone(), openssl::hash::MessageDigest::sha1())
        }
        (openssl::pkey::Id::RSA, SignatureHash::Sha256) => {
            (SHA256_WITH_RSA_ENCRYPTION.clone(), openssl::hash::MessageDigest::sha256())
        }
        (openssl::pkey::Id::EC, SignatureHash::Sha1) => {
            (ECDSA_WITH_SHA1.clone(), openssl::hash::MessageDigest::sha1())
        }
        (openssl::pkey::Id::EC, SignatureHash::Sha256) => {
            (ECDSA_WITH_SHA256.clone(), openssl::hash::MessageDigest::sha256())
        }
        _ => unreachable!("unsupported signing key type"),
    }
}
