use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use log::info;
use reqwest::Url;

use crate::error::ConfigurationError;
use crate::settings::UpstreamTarget;

pub fn resolve_upstream(target: &UpstreamTarget) -> Result<String, ConfigurationError> {
  if let Some(url) = &target.client_url {
    check_url(url)?;
    return Ok(url.clone());
  }

  let port = target.client_port.ok_or(ConfigurationError::MissingClientPort)?;

  let ip = match (&target.client_ip, &target.client_host) {
    (Some(ip), _) => *ip,
    (None, Some(host)) => {
      let ip = resolve_host(host, port)?;
      info!("Resolved client host '{}' to {}", host, ip);
      ip
    }
    (None, None) => return Err(ConfigurationError::MissingClientAddress),
  };

  let url = format!("http://{}", SocketAddr::new(ip, port));
  check_url(&url)?;

  Ok(url)
}

fn resolve_host(host: &str, port: u16) -> Result<IpAddr, ConfigurationError> {
  let addresses: Vec<SocketAddr> = (host, port)
    .to_socket_addrs()
    .map_err(|source| ConfigurationError::Resolve { host: host.to_string(), source })?
    .collect();

  addresses
    .iter()
    .find(|address| address.is_ipv4())
    .or_else(|| addresses.first())
    .map(|address| address.ip())
    .ok_or_else(|| ConfigurationError::NoAddress(host.to_string()))
}

fn check_url(url: &str) -> Result<(), ConfigurationError> {
  let invalid = |reason: String| ConfigurationError::InvalidUrl { url: url.to_string(), reason };

  let parsed = Url::parse(url).map_err(|err| invalid(err.to_string()))?;

  match parsed.scheme() {
    "http" | "https" => {}
    other => return Err(invalid(format!("unsupported scheme '{}'", other))),
  }

  if parsed.host_str().is_none() {
    return Err(invalid("missing host".to_string()));
  }

  Ok(())
}
