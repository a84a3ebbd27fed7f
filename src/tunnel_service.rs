use actix_web::http::header::{self, HeaderName, HeaderValue};
use actix_web::http::Method;
use actix_web::HttpRequest;
use log::info;

use crate::error::ConfigurationError;
use crate::header_pipeline::HeaderRewrite;
use crate::origin_guard::AllowedOrigins;
use crate::rate_limit::RateLimiter;
use crate::settings::{AccessList, Settings};
use crate::target::resolve_upstream;
use crate::tunnel_service::tunnel_config::TunnelConfig;

pub mod tunnel_config;
pub mod tunnel_factory;
pub mod tunnel_route_service;

const HOP_BY_HOP: [&str; 8] = [
  "connection",
  "keep-alive",
  "proxy-authenticate",
  "proxy-authorization",
  "te",
  "trailer",
  "transfer-encoding",
  "upgrade",
];

impl TryFrom<&Settings> for TunnelConfig {
  type Error = ConfigurationError;

  fn try_from(settings: &Settings) -> Result<Self, Self::Error> {
    settings.validate()?;

    let upstream = resolve_upstream(&settings.upstream)?;
    let allowed_methods: Vec<Method> = settings.methods().into_iter().map(Method::from).collect();
    let allow_header = extract_allow_header(&allowed_methods)?;
    let allowed_headers = extract_allowed_headers(&settings.allowed_headers)?;
    let origins = AllowedOrigins::new(&settings.allowed_origins, &settings.proxy_host);
    let rate_limiter = RateLimiter::new(&settings.rate_limit.0);
    let rewrite = HeaderRewrite::new(&settings.remove_headers, &settings.add_headers)?;

    info!(
      "Upstream {}, methods [{}], {} rate limit rule(s)",
      upstream,
      allow_header.to_str().unwrap_or_default(),
      settings.rate_limit.0.len()
    );

    Ok(TunnelConfig {
      upstream: Box::from(upstream.as_str()),
      allowed_methods: allowed_methods.into_boxed_slice(),
      allow_header,
      allowed_headers,
      origins,
      rate_limiter,
      rewrite,
    })
  }
}

#[inline]
fn extract_allow_header(methods: &[Method]) -> Result<HeaderValue, ConfigurationError> {
  let joined = methods.iter().map(Method::as_str).collect::<Vec<&str>>().join(", ");

  HeaderValue::try_from(joined).map_err(|_| ConfigurationError::InvalidHeaderValue(header::ALLOW.to_string()))
}

#[inline]
fn extract_allowed_headers(headers: &AccessList<String>) -> Result<AccessList<HeaderName>, ConfigurationError> {
  match headers {
    AccessList::Any => Ok(AccessList::Any),
    AccessList::Only(names) => {
      let names = names
        .iter()
        .map(|name| HeaderName::try_from(name).map_err(|_| ConfigurationError::InvalidHeaderName(name.clone())))
        .collect::<Result<Vec<HeaderName>, _>>()?;

      Ok(AccessList::Only(names))
    }
  }
}

pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
  HOP_BY_HOP.contains(&name.as_str())
}

/// Headers never copied onto the upstream request. `accept-encoding` is
/// dropped so upstream bodies arrive unencoded and text decoding stays valid.
pub(crate) fn is_excluded_request_header(name: &HeaderName) -> bool {
  is_hop_by_hop(name) || *name == header::HOST || *name == header::CONTENT_LENGTH || *name == header::ACCEPT_ENCODING
}

pub(crate) fn is_excluded_response_header(name: &HeaderName) -> bool {
  is_hop_by_hop(name) || *name == header::CONTENT_LENGTH
}

/// Authority the request was routed with, `None` when the request names no
/// host at all. `X-Forwarded-Host` and `Forwarded` are not consulted.
pub(crate) fn request_host(http: &HttpRequest) -> Option<String> {
  if let Some(authority) = http.uri().authority() {
    return Some(authority.as_str().to_string());
  }

  http
    .headers()
    .get(header::HOST)
    .and_then(|value| value.to_str().ok())
    .map(String::from)
}

/// `client-address:path`, where the address is the first `X-Forwarded-For`
/// entry or else the peer ip.
pub(crate) fn client_identifier(http: &HttpRequest) -> String {
  let forwarded = http
    .headers()
    .get("x-forwarded-for")
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.split(',').next())
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .map(String::from);

  let address = forwarded
    .or_else(|| http.peer_addr().map(|addr| addr.ip().to_string()))
    .unwrap_or_else(|| "unknown".to_string());

  format!("{}:{}", address, http.path())
}
