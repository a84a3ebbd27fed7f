use actix_cors::Cors;
use actix_web::http::Method;

use crate::origin_guard::{origin_host, AllowedOrigins};
use crate::settings::AccessList;
use crate::tunnel_service::tunnel_config::TunnelConfig;

/// Seconds browsers may cache a preflight response.
const PREFLIGHT_MAX_AGE: usize = 300;

/// Preflight handling built from the same allow-lists the tunnel enforces.
pub fn cors_policy(config: &TunnelConfig) -> Cors {
  let mut cors = Cors::default()
    .allowed_methods(config.allowed_methods.iter().map(Method::as_str))
    .supports_credentials()
    .max_age(PREFLIGHT_MAX_AGE);

  cors = match &config.allowed_headers {
    AccessList::Any => cors.allow_any_header(),
    AccessList::Only(headers) => cors.allowed_headers(headers.iter().map(|name| name.as_str())),
  };

  match &config.origins {
    AllowedOrigins::Any => cors.allow_any_origin(),
    AllowedOrigins::Hosts(_) => {
      let origins = config.origins.clone();

      cors.allowed_origin_fn(move |origin, _| {
        origin
          .to_str()
          .map_or(false, |origin| origins.is_allowed(&origin_host(origin)))
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::settings::Settings;
  use actix_web::http::{header, StatusCode};
  use actix_web::{test, web, App, HttpResponse};
  use clap::Parser;

  fn config(args: &[&str]) -> TunnelConfig {
    let mut argv = vec!["tunnel_proxy", "--client-url", "http://127.0.0.1:9000"];
    argv.extend_from_slice(args);

    TunnelConfig::try_from(&Settings::try_parse_from(argv).unwrap()).unwrap()
  }

  fn preflight(origin: &str, method: &str) -> test::TestRequest {
    test::TestRequest::default()
      .method(Method::OPTIONS)
      .uri("/api")
      .insert_header((header::ORIGIN, origin))
      .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, method))
  }

  #[actix_web::test]
  async fn preflight_for_listed_origin() {
    let config = config(&["--allowed-origins", r#"["https://app.example.com"]"#]);
    let app = test::init_service(
      App::new()
        .wrap(cors_policy(&config))
        .default_service(web::to(HttpResponse::Ok)),
    )
    .await;

    let response = test::call_service(&app, preflight("https://app.example.com", "GET").to_request()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "https://app.example.com");
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "300");
  }

  #[actix_web::test]
  async fn preflight_for_unknown_origin_is_refused() {
    let config = config(&["--allowed-origins", r#"["https://app.example.com"]"#]);
    let app = test::init_service(
      App::new()
        .wrap(cors_policy(&config))
        .default_service(web::to(HttpResponse::Ok)),
    )
    .await;

    let response = test::call_service(&app, preflight("https://evil.example.com", "GET").to_request()).await;

    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
  }

  #[actix_web::test]
  async fn preflight_for_disallowed_method_is_refused() {
    let config = config(&["--allowed-origins", "*"]);
    let app = test::init_service(
      App::new()
        .wrap(cors_policy(&config))
        .default_service(web::to(HttpResponse::Ok)),
    )
    .await;

    let allowed = test::call_service(&app, preflight("https://any.example.com", "POST").to_request()).await;
    assert_eq!(allowed.status(), StatusCode::OK);

    let refused = test::call_service(&app, preflight("https://any.example.com", "DELETE").to_request()).await;
    assert!(refused.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
  }
}
