use std::collections::HashSet;
use std::net::IpAddr;

use reqwest::Url;

use crate::settings::AccessList;

const ALL_INTERFACES: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq)]
pub enum AllowedOrigins {
  Any,
  Hosts(HashSet<String>),
}

impl AllowedOrigins {
  /// Resolves the configured origins. The proxy's own bind host is always
  /// allowed; a loopback bind also admits `localhost` and `0.0.0.0`.
  pub fn new(origins: &AccessList<String>, bind_host: &str) -> Self {
    let configured = match origins {
      AccessList::Any => return AllowedOrigins::Any,
      AccessList::Only(origins) => origins,
    };

    let mut hosts: HashSet<String> = configured.iter().map(|origin| origin_host(origin)).collect();

    let bind = normalize_host(bind_host);
    let is_loopback = bind == "localhost" || bind.parse::<IpAddr>().map_or(false, |ip| ip.is_loopback());
    if is_loopback {
      hosts.insert("localhost".to_string());
      hosts.insert(ALL_INTERFACES.to_string());
    }
    hosts.insert(bind);

    AllowedOrigins::Hosts(hosts)
  }

  /// `requested_host` may carry a port, which is ignored.
  pub fn is_allowed(&self, requested_host: &str) -> bool {
    match self {
      AllowedOrigins::Any => true,
      AllowedOrigins::Hosts(hosts) => hosts.contains(&normalize_host(requested_host)),
    }
  }
}

/// Host part of an origin given either as a url (`https://app.example.com`)
/// or as a bare authority (`app.example.com:8080`).
pub fn origin_host(origin: &str) -> String {
  let parsed = Url::parse(origin).ok();

  match parsed.as_ref().and_then(|url| url.host_str()) {
    Some(host) => normalize_host(host),
    None => normalize_host(origin),
  }
}

fn normalize_host(authority: &str) -> String {
  let authority = authority.trim();

  let host = if let Some(rest) = authority.strip_prefix('[') {
    rest.split(']').next().unwrap_or(rest)
  } else if authority.matches(':').count() == 1 {
    authority.split(':').next().unwrap_or(authority)
  } else {
    authority
  };

  host.to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn only(origins: &[&str]) -> AccessList<String> {
    AccessList::Only(origins.iter().map(|origin| origin.to_string()).collect())
  }

  #[test]
  fn wildcard_admits_everything() {
    let allowed = AllowedOrigins::new(&AccessList::Any, "10.1.1.1");

    assert!(allowed.is_allowed("anything.example.com"));
    assert!(allowed.is_allowed(""));
  }

  #[test]
  fn explicit_list_is_case_insensitive() {
    let allowed = AllowedOrigins::new(&only(&["https://App.Example.com", "api.example.com"]), "10.1.1.1");

    assert!(allowed.is_allowed("app.example.com"));
    assert!(allowed.is_allowed("API.EXAMPLE.COM:8443"));
    assert!(!allowed.is_allowed("evil.example.com"));
  }

  #[test]
  fn bind_host_is_always_allowed() {
    let allowed = AllowedOrigins::new(&only(&[]), "10.1.1.1");

    assert!(allowed.is_allowed("10.1.1.1:8000"));
    assert!(!allowed.is_allowed("localhost"));
    assert!(!allowed.is_allowed("0.0.0.0"));
  }

  #[test]
  fn loopback_bind_adds_localhost() {
    let allowed = AllowedOrigins::new(&only(&[]), "127.0.0.1");

    assert!(allowed.is_allowed("127.0.0.1:8000"));
    assert!(allowed.is_allowed("localhost:8000"));
    assert!(allowed.is_allowed("0.0.0.0"));
    assert!(!allowed.is_allowed("example.com"));
  }

  #[test]
  fn ipv6_hosts() {
    let allowed = AllowedOrigins::new(&only(&["http://[fe80::1]:3000"]), "::1");

    assert!(allowed.is_allowed("[::1]:8000"));
    assert!(allowed.is_allowed("[FE80::1]"));
    assert!(allowed.is_allowed("localhost"));
  }

  #[test]
  fn origin_host_parsing() {
    assert_eq!(origin_host("https://app.example.com:8443/path"), "app.example.com");
    assert_eq!(origin_host("localhost:3000"), "localhost");
    assert_eq!(origin_host("Example.COM"), "example.com");
  }
}
