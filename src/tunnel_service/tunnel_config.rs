use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::Method;

use crate::header_pipeline::HeaderRewrite;
use crate::origin_guard::AllowedOrigins;
use crate::rate_limit::RateLimiter;
use crate::settings::AccessList;

pub struct TunnelConfig {
  pub upstream: Box<str>,
  pub allowed_methods: Box<[Method]>,
  pub allow_header: HeaderValue,
  pub allowed_headers: AccessList<HeaderName>,
  pub origins: AllowedOrigins,
  pub rate_limiter: RateLimiter,
  pub rewrite: HeaderRewrite,
}

impl TunnelConfig {
  pub fn allows_method(&self, method: &Method) -> bool {
    self.allowed_methods.contains(method)
  }
}
