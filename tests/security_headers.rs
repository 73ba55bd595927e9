#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App, HttpResponse};
use std::sync::Arc;
use yatube::repo::inmem::InMemRepo;
use yatube::storage::FsImageStore;
use yatube::{config, AppState, SecurityHeaders, Settings};

const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

fn state() -> web::Data<AppState> {
    let settings = Settings::with_secret(SECRET).unwrap();
    let media = tempfile::tempdir().unwrap();
    web::Data::new(
        AppState::new(Arc::new(InMemRepo::new()), Arc::new(FsImageStore::new(media.path())), settings).unwrap(),
    )
}

#[actix_web::test]
async fn pages_and_api_carry_security_headers() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::new(false)).app_data(state()).configure(config),
    )
    .await;
    for uri in ["/", "/api/v1/posts/", "/missing/page/here/"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        let headers = resp.headers();
        assert!(headers.get("content-security-policy").is_some(), "{uri}");
        assert_eq!(headers.get("referrer-policy").unwrap(), "same-origin");
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert!(headers.get("strict-transport-security").is_none());
    }
}

#[actix_web::test]
async fn hsts_is_opt_in() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::new(true)).app_data(state()).configure(config),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let hsts = resp.headers().get("strict-transport-security").unwrap().to_str().unwrap();
    assert!(hsts.starts_with("max-age="));
}

#[::core::prelude::v1::test]
#[serial_test::serial]
fn hsts_follows_the_environment() {
    std::env::set_var("JWT_SECRET", SECRET);
    std::env::set_var("ENABLE_HSTS", "true");
    let on = Settings::from_env().unwrap();
    assert!(SecurityHeaders::from_settings(&on).enable_hsts);

    std::env::set_var("ENABLE_HSTS", "0");
    let off = Settings::from_env().unwrap();
    assert!(!SecurityHeaders::from_settings(&off).enable_hsts);

    std::env::remove_var("ENABLE_HSTS");
    std::env::remove_var("JWT_SECRET");
}

#[actix_web::test]
async fn handler_headers_are_not_overwritten() {
    let app = test::init_service(App::new().wrap(SecurityHeaders::default()).route(
        "/custom",
        web::get().to(|| async {
            HttpResponse::Ok()
                .insert_header((actix_web::http::header::CONTENT_SECURITY_POLICY, "custom-src 'none'"))
                .finish()
        }),
    ))
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/custom").to_request()).await;
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert_eq!(csp, "custom-src 'none'");
    assert_eq!(resp.headers().get("referrer-policy").unwrap(), "same-origin");
}
