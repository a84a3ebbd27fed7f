use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::Client;

use crate::settings::Settings;

const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
  pub http_proxy: Option<String>,
  pub user: Option<String>,
  pub pass: Option<String>,
  pub timeout: Option<Duration>,
  pub pool_connections: bool,
}

impl From<&Settings> for HttpClientConfig {
  fn from(settings: &Settings) -> Self {
    HttpClientConfig {
      http_proxy: settings.http_proxy_url.clone(),
      user: settings.http_proxy_user.clone(),
      pass: settings.http_proxy_pass.clone(),
      timeout: settings.upstream_timeout.map(Duration::from_secs),
      pool_connections: settings.pool_connections,
    }
  }
}

impl HttpClientConfig {
  pub fn to_client(self) -> Result<Client, reqwest::Error> {
    let HttpClientConfig {
      http_proxy,
      user,
      pass,
      timeout,
      pool_connections,
    } = self;
    let mut client_builder = reqwest::ClientBuilder::new();

    if let Some(proxy_url) = http_proxy {
      let mut proxy = reqwest::Proxy::all(proxy_url)?;

      if let (Some(user_name), Some(password)) = (user, pass) {
        proxy = proxy.basic_auth(&user_name, &password);
      }

      client_builder = client_builder.proxy(proxy);
    } else {
      // ignore HTTP_PROXY style environment variables
      client_builder = client_builder.no_proxy();
    }

    if let Some(timeout) = timeout {
      client_builder = client_builder.timeout(timeout);
    }

    if !pool_connections {
      client_builder = client_builder.pool_max_idle_per_host(0);
    }

    let client = client_builder.redirect(Policy::limited(MAX_REDIRECTS)).build()?;

    Ok(client)
  }
}
