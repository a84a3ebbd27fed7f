use std::sync::Arc;

use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::Error;
use futures_core::future::LocalBoxFuture;
use log::{debug, error};

use crate::http_client::HttpClientConfig;
use crate::tunnel_service::tunnel_config::TunnelConfig;
use crate::tunnel_service::tunnel_route_service::TunnelRouteService;

/// Hands every actix worker its own [`TunnelRouteService`]. Upstream
/// connections are pooled per worker, so each worker gets a fresh reqwest
/// client built on its own runtime while the config stays shared.
pub struct TunnelServiceFactory {
  config: Arc<TunnelConfig>,
  client_config: HttpClientConfig,
}

impl ServiceFactory<ServiceRequest> for TunnelServiceFactory {
  type Response = ServiceResponse;
  type Error = Error;
  type Config = ();
  type Service = TunnelRouteService;
  type InitError = ();
  type Future = LocalBoxFuture<'static, Result<Self::Service, Self::InitError>>;

  fn new_service(&self, _: Self::Config) -> Self::Future {
    let config = self.config.clone();
    let http_client = self.client_config.clone().to_client();

    Box::pin(async move {
      match http_client {
        Ok(http_client) => {
          debug!("Worker ready to tunnel to {}", config.upstream);
          Ok(TunnelRouteService { config, http_client })
        }
        Err(err) => {
          error!("Unable to build upstream client {}", err);
          Err(())
        }
      }
    })
  }
}

impl TunnelServiceFactory {
  pub fn create(client_config: HttpClientConfig, tunnel_config: Arc<TunnelConfig>) -> Self {
    Self {
      config: tunnel_config,
      client_config,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::settings::Settings;
  use clap::Parser;

  fn factory(args: &[&str]) -> TunnelServiceFactory {
    let mut argv = vec!["tunnel_proxy", "--client-url", "http://127.0.0.1:9000/"];
    argv.extend_from_slice(args);

    let settings = Settings::try_parse_from(argv).unwrap();
    let config = TunnelConfig::try_from(&settings).unwrap();

    TunnelServiceFactory::create(HttpClientConfig::from(&settings), Arc::new(config))
  }

  #[actix_web::test]
  async fn workers_share_the_config() {
    let factory = factory(&[]);

    let first = factory.new_service(()).await.unwrap();
    let second = factory.new_service(()).await.unwrap();

    assert!(Arc::ptr_eq(&first.config, &second.config));
  }

  #[actix_web::test]
  async fn worker_init_fails_on_bad_client_config() {
    let factory = factory(&["--http-proxy-url", "http://[invalid"]);

    assert!(factory.new_service(()).await.is_err());
  }
}
