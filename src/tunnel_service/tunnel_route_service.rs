use std::sync::Arc;
use std::time::Instant;

use actix_web::body::BoxBody;
use actix_web::dev::{self, Payload, Service, ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::web::Query;
use actix_web::{Error, HttpRequest, HttpResponse, ResponseError};
use bytes::{Bytes, BytesMut};
use futures_core::future::LocalBoxFuture;
use futures_core::Stream;
use futures_util::StreamExt;
use log::{debug, error, warn};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, Url};

use crate::error::ProxyError;
use crate::origin_guard::AllowedOrigins;
use crate::rate_limit::RateDecision;
use crate::tunnel_service::tunnel_config::TunnelConfig;
use crate::tunnel_service::{client_identifier, is_excluded_request_header, is_excluded_response_header, request_host};

pub struct TunnelRouteService {
  pub(super) config: Arc<TunnelConfig>,
  pub(super) http_client: Client,
}

impl Service<ServiceRequest> for TunnelRouteService {
  type Response = ServiceResponse;
  type Error = Error;
  type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

  dev::always_ready!();

  fn call(&self, req: ServiceRequest) -> Self::Future {
    let (http_request, payload) = req.into_parts();

    if !self.config.allows_method(http_request.method()) {
      debug!("Method {} is not allowed", http_request.method());
      let mut response = ProxyError::MethodNotAllowed.error_response();
      response.headers_mut().insert(header::ALLOW, self.config.allow_header.clone());

      return Box::pin(async move { Ok(ServiceResponse::new(http_request, response)) });
    }

    let config = self.config.clone();
    let http_client = self.http_client.clone();

    Box::pin(async move {
      let response = match TunnelRouteService::exec(&config, &http_client, &http_request, payload).await {
        Ok(response) => response,
        Err(err) => err.error_response(),
      };

      Ok(ServiceResponse::new(http_request, response))
    })
  }
}

impl TunnelRouteService {
  async fn exec(config: &TunnelConfig, http_client: &Client, http: &HttpRequest, payload: Payload) -> Result<HttpResponse, ProxyError> {
    TunnelRouteService::admit(config, http)?;

    let body = TunnelRouteService::read_body(payload).await?;
    let url = TunnelRouteService::target_url(config, http)?;
    let proxy_request = TunnelRouteService::init_request(http_client, http, url.clone(), body);

    debug!("Forwarding {} {}", http.method(), url);

    let proxy_response = proxy_request.send().await.map_err(|err| {
      error!("Proxy request to {} failed {}", url, err);
      ProxyError::UpstreamTransport(err)
    })?;

    debug!("Proxy response {:?}", &proxy_response);

    TunnelRouteService::relay(config, proxy_response).await
  }

  fn admit(config: &TunnelConfig, http: &HttpRequest) -> Result<(), ProxyError> {
    let host = request_host(http);
    let allowed = match &host {
      Some(host) => config.origins.is_allowed(host),
      None => config.origins == AllowedOrigins::Any,
    };

    if !allowed {
      let host = host.unwrap_or_default();
      warn!("Blocked request for host '{}'", host);
      return Err(ProxyError::ForbiddenOrigin(host));
    }

    if config.rate_limiter.is_enabled() {
      let identifier = client_identifier(http);

      if let RateDecision::Rejected { retry_after } = config.rate_limiter.check(&identifier, Instant::now()) {
        warn!("Rate limit exceeded for '{}'", identifier);
        return Err(ProxyError::RateLimitExceeded { retry_after });
      }
    }

    Ok(())
  }

  async fn read_body(mut payload: Payload) -> Result<Bytes, ProxyError> {
    let (size, _) = payload.size_hint();
    let mut body_buffer = BytesMut::with_capacity(size);

    while let Some(chunk) = payload.next().await {
      match chunk {
        Ok(bytes) => body_buffer.extend_from_slice(&bytes),
        Err(err) => {
          warn!("Reading request body failed {}", err);
          return Err(ProxyError::from(err));
        }
      }
    }

    Ok(body_buffer.freeze())
  }

  fn target_url(config: &TunnelConfig, http: &HttpRequest) -> Result<Url, ProxyError> {
    let target = format!("{}{}", config.upstream.trim_end_matches('/'), http.path());

    Url::parse(&target).map_err(|err| {
      error!("Unable to build target url '{}' {}", target, err);
      ProxyError::Internal(err.to_string())
    })
  }

  fn init_request(http_client: &Client, source_request: &HttpRequest, mut url: Url, body: Bytes) -> RequestBuilder {
    let query_string = source_request.query_string();

    let query_params = match Query::<Vec<(String, String)>>::from_query(query_string) {
      Ok(query_params) => query_params.into_inner(),
      Err(err) => {
        warn!("Unable to parse query parameters {}, forwarding them verbatim", err);
        url.set_query(Some(query_string));
        Vec::new()
      }
    };

    let mut builder = http_client.request(source_request.method().clone(), url);

    if !query_params.is_empty() {
      builder = builder.query(&query_params);
    }

    let mut header_map = HeaderMap::new();
    for (name, value) in source_request.headers().iter() {
      if !is_excluded_request_header(name) {
        header_map.append(name.clone(), value.clone());
      }
    }

    builder.headers(header_map).body(body)
  }

  async fn relay(config: &TunnelConfig, proxy_response: Response) -> Result<HttpResponse, ProxyError> {
    let mut response = HttpResponse::new(proxy_response.status());
    let headers = response.headers_mut();

    for (name, value) in proxy_response.headers() {
      if !is_excluded_response_header(name) {
        headers.append(name.clone(), value.clone());
      }
    }

    config.rewrite.apply(response.headers_mut());

    // substring match, not a mime type parse
    let is_text = proxy_response
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .map_or(false, |content_type| content_type.contains("text"));

    // encoded bodies are relayed untouched along with their Content-Encoding
    let is_encoded = proxy_response
      .headers()
      .get(header::CONTENT_ENCODING)
      .map_or(false, |encoding| encoding != "identity");

    let body = if is_text && !is_encoded {
      BoxBody::new(proxy_response.text().await.map_err(TunnelRouteService::body_failure)?)
    } else {
      BoxBody::new(proxy_response.bytes().await.map_err(TunnelRouteService::body_failure)?)
    };

    Ok(response.set_body(body))
  }

  fn body_failure(err: reqwest::Error) -> ProxyError {
    error!("Reading proxy body failed {}", err);
    ProxyError::UpstreamTransport(err)
  }
}
