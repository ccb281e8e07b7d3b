//! Classification of a requested serial against the CA database.

use chrono::prelude::*;

use super::types::{CertStatus, ResponderError, RevocationReason, RevokedInfo};
use crate::index::{RecordStatus, RevocationStore, StoreError};

/// Resolves a serial to a response-side status.
///
/// Certificates past their expiry date are not answered for, whatever their
/// recorded status: the caller maps `ExpiredCertificate` to `unauthorized`.
pub fn resolve<S: RevocationStore>(
    store: &S,
    serial: &[u8],
    now: DateTime<Utc>,
) -> Result<CertStatus, ResponderError> {
    let serial_hex = crate::util::serial_to_hex(serial);

    let record = match store.fetch(&serial_hex)? {
        Some(record) => record,
        None => {
            debug!("serial {} not present in CA database", serial_hex);
            return Ok(CertStatus::Unknown);
        }
    };

    let expiry = crate::util::parse_index_time(&record.expiry_date)
        .ok_or_else(|| StoreError::MalformedRecord(serial_hex.clone()))?;

    let status = if now > expiry {
        RecordStatus::Expired
    } else {
        record.status
    };

    match status {
        RecordStatus::Valid => Ok(CertStatus::Good),
        RecordStatus::Expired => Err(ResponderError::ExpiredCertificate),
        RecordStatus::Revoked => {
            let mut parts = record.revocation_field.splitn(3, ',');
            let date = parts.next().unwrap_or("");
            let revocation_time = crate::util::parse_index_time(date)
                .ok_or_else(|| StoreError::MalformedRecord(serial_hex.clone()))?;
            let revocation_reason = parts.next().and_then(RevocationReason::from_name);

            Ok(CertStatus::Revoked(RevokedInfo {
                revocation_time,
                revocation_reason,
            }))
        }
    }
}
