use chrono::prelude::*;

use super::{issuers, status, types};
use crate::config::Config;
use crate::index::IndexFileStore;

/// Runs one request through parse → issuer lookup → status resolution →
/// response assembly. Any failure becomes the matching unsigned error
/// response; a well-formed request for a known issuer always yields a signed
/// basic response.
pub fn handle_ocsp<'a>(
    req: &'a [u8],
    ocsp_issuers: &'a issuers::OCSPIssuers,
    config: &Config,
) -> types::OCSPResponse<'a> {
    match try_handle(req, ocsp_issuers, config) {
        Ok(resp) => resp,
        Err(err) => {
            warn!("refusing OCSP request: {}", err);
            types::OCSPResponse::error(err.response_status())
        }
    }
}

fn try_handle<'a>(
    req: &'a [u8],
    ocsp_issuers: &'a issuers::OCSPIssuers,
    config: &Config,
) -> Result<types::OCSPResponse<'a>, types::ResponderError> {
    let request = types::parse_ocsp_req(req)?;

    let issuer = ocsp_issuers
        .find_issuer(request.cert_id.issuer_key_hash)
        .ok_or_else(|| types::ResponderError::UnknownIssuer(request.cert_id.issuer_key_hash_b64()))?;

    let store = IndexFileStore::new(&issuer.database);

    // one snapshot drives producedAt, thisUpdate and nextUpdate
    let now = crate::util::truncate_to_seconds(Utc::now());
    let cert_status = status::resolve(&store, request.cert_id.serial_number, now)?;

    let next_update = now + chrono::Duration::days(config.ttl_days);
    if next_update < now {
        warn!("response is stale at production time for {:?}", request.cert_id);
    }

    Ok(types::OCSPResponse {
        status: types::OCSPResponseStatus::Successful,
        response: Some(types::OCSPResponseType::BasicResponse(types::BasicOCSPResponse {
            produced_at: now,
            issuer,
            responses: vec![types::SingleOCSPResponse {
                cert_id: request.cert_id,
                cert_status,
                this_update: now,
                next_update: Some(next_update),
            }],
            signature_hash: config.signature_hash,
        })),
    })
}
