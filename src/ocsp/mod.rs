use base64::prelude::*;
use chrono::prelude::*;

pub mod cache;
pub(crate) mod issuers;
pub mod processing;
pub(crate) mod proto;
pub mod status;
pub mod types;

pub use issuers::{OCSPIssuer, OCSPIssuers, RegistryError};

const HOME_PAGE: &str = include_str!("index.html");

fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// A serialized response plus the dates its cache headers derive from.
pub struct OCSPResponse {
    value: Vec<u8>,
    produced_at: Option<DateTime<Utc>>,
    next_update: Option<DateTime<Utc>>,
    max_age: Option<u64>,
}

impl OCSPResponse {
    /// Serializes the domain response. If signing fails at this stage the
    /// client still gets a well-formed answer: the unsigned internalError
    /// response.
    pub fn build(resp: types::OCSPResponse, max_age: Option<u64>) -> OCSPResponse {
        let (produced_at, next_update) = resp.response.as_ref()
            .map_or((None, None), |r| match r {
                types::OCSPResponseType::BasicResponse(br) => {
                    let mut next_updates = br.responses.iter()
                        .filter_map(|r| r.next_update)
                        .collect::<Vec<_>>();
                    next_updates.sort_unstable();

                    (Some(br.produced_at), if next_updates.is_empty() {
                        None
                    } else {
                        Some(next_updates.remove(0))
                    })
                }
            });

        match types::serialize_ocsp_resp(&resp) {
            Ok(value) => OCSPResponse {
                value,
                produced_at,
                next_update,
                max_age,
            },
            Err(err) => {
                error!("unable to serialize OCSP response: {}", err);
                OCSPResponse {
                    value: types::serialize_error_resp(types::OCSPResponseStatus::InternalError),
                    produced_at: None,
                    next_update: None,
                    max_age,
                }
            }
        }
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for OCSPResponse {
    fn respond_to(self, _req: &'r rocket::request::Request<'_>) -> rocket::response::Result<'static> {
        let mut builder = rocket::response::Response::build();
        let now = Utc::now();

        builder.header(rocket::http::ContentType::new("application", "ocsp-response"));
        builder.raw_header("Date", http_date(now));
        builder.raw_header(
            "Cache-Control",
            cache::cache_control(now, self.next_update.unwrap_or(now), self.max_age),
        );

        let etag = hex::encode(openssl::hash::hash(
            openssl::hash::MessageDigest::sha1(), &self.value,
        ).unwrap());
        builder.raw_header("ETag", format!("\"{}\"", etag));

        if let Some(produced_at) = self.produced_at {
            builder.raw_header("Last-Modified", http_date(produced_at));
        }
        if let Some(next_update) = self.next_update {
            builder.raw_header("Expires", http_date(next_update));
        }

        builder.sized_body(self.value.len(), std::io::Cursor::new(self.value));

        builder.ok()
    }
}

#[get("/")]
pub fn index() -> rocket::response::content::RawHtml<&'static str> {
    rocket::response::content::RawHtml(HOME_PAGE)
}

#[head("/<_request>")]
pub fn ocsp_head(_request: String) -> rocket::http::Status {
    rocket::http::Status::MethodNotAllowed
}

#[get("/<request>")]
pub fn ocsp_get(
    request: String,
    ocsp_issuers: &rocket::State<issuers::OCSPIssuers>,
    config: &rocket::State<crate::config::Config>,
) -> Result<OCSPResponse, rocket::http::Status> {
    // clients over-pad the path with extra slashes; strip them before
    // decoding, and fall back to the standard alphabet for percent-encoded
    // plain base64
    let request = request.trim_start_matches('/');
    let ocsp_req = match BASE64_URL_SAFE.decode(request)
        .or_else(|_| BASE64_STANDARD.decode(request))
    {
        Ok(r) => r,
        Err(_) => return Err(rocket::http::Status::BadRequest)
    };

    Ok(OCSPResponse::build(
        processing::handle_ocsp(&ocsp_req, ocsp_issuers, config),
        config.max_age,
    ))
}

#[post("/", format = "application/ocsp-request", data = "<request>")]
pub async fn ocsp_post(
    request: rocket::data::Data<'_>,
    ocsp_issuers: &rocket::State<issuers::OCSPIssuers>,
    config: &rocket::State<crate::config::Config>,
) -> Result<OCSPResponse, rocket::http::Status> {
    const LIMIT: usize = 4096;

    let ocsp_req = match request.open(LIMIT * rocket::data::ByteUnit::B).into_bytes().await {
        Ok(r) => r,
        Err(_) => return Err(rocket::http::Status::InternalServerError)
    };

    if !ocsp_req.is_complete() {
        return Err(rocket::http::Status::PayloadTooLarge);
    }

    Ok(OCSPResponse::build(
        processing::handle_ocsp(&ocsp_req, ocsp_issuers, config),
        config.max_age,
    ))
}
