#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    pretty_env_logger::init();

    rocket::build()
        .attach(rocket::fairing::AdHoc::try_on_ignite("OCSP Responder Config", |rocket| async move {
            let raw = rocket.figment()
                .extract_inner::<varsel::config::RawConfig>("varsel")
                .expect("'varsel' not configured");

            // the responder's figment has no file of its own to anchor
            // against, so relative paths resolve from the working directory
            let config_dir = std::env::current_dir().expect("no working directory");
            let config = raw.resolve(&config_dir).expect("invalid configuration");

            let issuers = varsel::ocsp::OCSPIssuers::load(&config)
                .expect("unable to load issuer key material");

            Ok(rocket.manage(issuers).manage(config))
        }))
        .mount("/", routes![
            varsel::ocsp::index,
            varsel::ocsp::ocsp_head,
            varsel::ocsp::ocsp_get,
            varsel::ocsp::ocsp_post,
        ])
}
