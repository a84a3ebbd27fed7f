use actix_web::error::PayloadError;
use actix_web::http::header::{self, ContentType};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
  #[error("client_port is required when client_url is not set")]
  MissingClientPort,

  #[error("either client_ip or client_host is required when client_url is not set")]
  MissingClientAddress,

  #[error("invalid upstream url '{url}': {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("unable to resolve client_host '{host}': {source}")]
  Resolve {
    host: String,
    #[source]
    source: std::io::Error,
  },

  #[error("client_host '{0}' did not resolve to any address")]
  NoAddress(String),

  #[error("allowed_methods must not be empty")]
  EmptyMethods,

  #[error("rate_limit entry {0} must have positive max_requests and seconds")]
  InvalidRateLimit(usize),

  #[error("invalid header name '{0}'")]
  InvalidHeaderName(String),

  #[error("invalid value for header '{0}'")]
  InvalidHeaderValue(String),

  #[error("unable to build http client: {0}")]
  HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ProxyError {
  #[error("Origin '{0}' is not allowed to use this proxy")]
  ForbiddenOrigin(String),

  #[error("Too Many Requests")]
  RateLimitExceeded { retry_after: u64 },

  #[error("Method Not Allowed")]
  MethodNotAllowed,

  #[error("{0}")]
  Payload(#[from] PayloadError),

  #[error("Bad Gateway")]
  UpstreamTransport(#[source] reqwest::Error),

  #[error("Internal Server Error")]
  Internal(String),
}

impl ResponseError for ProxyError {
  fn status_code(&self) -> StatusCode {
    match self {
      ProxyError::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
      ProxyError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
      ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
      ProxyError::Payload(err) => err.status_code(),
      ProxyError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
      ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let mut response = HttpResponse::build(self.status_code());
    response.insert_header(ContentType::plaintext());

    if let ProxyError::RateLimitExceeded { retry_after } = self {
      response.insert_header((header::RETRY_AFTER, retry_after.to_string()));
    }

    response.body(self.to_string())
  }
}
