mod cors;
mod error;
mod header_pipeline;
mod http_client;
mod origin_guard;
mod rate_limit;
mod settings;
mod std_logger;
mod target;
mod tunnel_service;

use std::io::{Error, ErrorKind, Result};
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, App, HttpServer};
use clap::Parser;
use log::{debug, info, warn};

use crate::error::ConfigurationError;
use crate::http_client::HttpClientConfig;
use crate::settings::Settings;
use crate::tunnel_service::tunnel_config::TunnelConfig;
use crate::tunnel_service::tunnel_factory::TunnelServiceFactory;

#[actix_web::main]
async fn main() -> Result<()> {
  let env_file = settings::load_env_file();
  let settings = Settings::parse();

  std_logger::init(settings.log_level).map_err(|error| Error::new(ErrorKind::Other, error.to_string()))?;

  match env_file {
    Ok(Some(path)) => info!("Loaded environment from {}", path.display()),
    Ok(None) => debug!("No environment file found"),
    Err(error) => warn!("Ignoring malformed environment file: {}", error),
  }

  let tunnel_config = TunnelConfig::try_from(&settings).map_err(configuration_error)?;
  let client_config = HttpClientConfig::from(&settings);
  // a bad proxy url fails startup instead of every worker
  client_config
    .clone()
    .to_client()
    .map_err(|error| configuration_error(ConfigurationError::from(error)))?;

  let tunnel_config = Arc::new(tunnel_config);
  tunnel_config
    .rate_limiter
    .spawn_sweeper(Duration::from_secs(settings.rate_limit_sweep_seconds));

  info!(
    "Tunneling http://{}:{} -> {}",
    settings.proxy_host, settings.proxy_port, tunnel_config.upstream
  );

  let server_config = tunnel_config.clone();
  HttpServer::new(move || {
    App::new()
      .wrap(cors::cors_policy(&server_config))
      .wrap(middleware::Logger::default())
      .default_service(TunnelServiceFactory::create(client_config.clone(), server_config.clone()))
  })
  .workers(settings.workers)
  .bind((settings.proxy_host.as_str(), settings.proxy_port))?
  .run()
  .await?;

  info!("Stopped tunneling");

  Ok(())
}

fn configuration_error(error: ConfigurationError) -> Error {
  log::error!("Invalid configuration: {}", error);
  Error::new(ErrorKind::InvalidInput, error)
}
