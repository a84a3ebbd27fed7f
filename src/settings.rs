use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use actix_web::http::Method;
use clap::builder::RangedU64ValueParser;
use clap::{ArgAction, Args, Parser};
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::ConfigurationError;

pub const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Deserialize, PartialEq, Debug, Clone, Copy, Hash, Eq)]
#[serde(try_from = "String")]
pub enum HttpMethod {
  Get,
  Put,
  Post,
  Head,
  Patch,
  Delete,
  Options,
}

impl HttpMethod {
  pub const ALL: [HttpMethod; 7] = [
    HttpMethod::Get,
    HttpMethod::Put,
    HttpMethod::Post,
    HttpMethod::Head,
    HttpMethod::Patch,
    HttpMethod::Delete,
    HttpMethod::Options,
  ];
}

impl TryFrom<&str> for HttpMethod {
  type Error = String;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    match value.to_lowercase().as_str() {
      "get" => Ok(HttpMethod::Get),
      "put" => Ok(HttpMethod::Put),
      "post" => Ok(HttpMethod::Post),
      "head" => Ok(HttpMethod::Head),
      "patch" => Ok(HttpMethod::Patch),
      "delete" => Ok(HttpMethod::Delete),
      "options" => Ok(HttpMethod::Options),
      _ => Err(format!("unsupported http method '{}'", value)),
    }
  }
}

impl TryFrom<String> for HttpMethod {
  type Error = String;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    HttpMethod::try_from(value.as_str())
  }
}

impl From<HttpMethod> for Method {
  fn from(value: HttpMethod) -> Self {
    match value {
      HttpMethod::Get => Method::GET,
      HttpMethod::Put => Method::PUT,
      HttpMethod::Post => Method::POST,
      HttpMethod::Head => Method::HEAD,
      HttpMethod::Patch => Method::PATCH,
      HttpMethod::Delete => Method::DELETE,
      HttpMethod::Options => Method::OPTIONS,
    }
  }
}

/// Either the `*` wildcard or an explicit list of values.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessList<T> {
  Any,
  Only(Vec<T>),
}

impl<T: DeserializeOwned> AccessList<T> {
  pub fn parse(value: &str) -> Result<Self, String> {
    if value.trim() == "*" {
      return Ok(AccessList::Any);
    }

    Ok(AccessList::Only(parse_document(value)?))
  }
}

#[derive(Deserialize, PartialEq, Debug, Clone, Copy)]
pub struct RateLimitRule {
  pub max_requests: u64,
  pub seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RateLimits(pub Vec<RateLimitRule>);

impl RateLimits {
  pub fn parse(value: &str) -> Result<Self, String> {
    let rules = match parse_document::<OneOrMany<RateLimitRule>>(value)? {
      OneOrMany::One(rule) => vec![rule],
      OneOrMany::Many(rules) => rules,
    };

    Ok(RateLimits(rules))
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderNames(pub Vec<String>);

impl HeaderNames {
  pub fn parse(value: &str) -> Result<Self, String> {
    Ok(HeaderNames(parse_document(value)?))
  }
}

/// Ordered `name -> value` pairs. Accepts a single mapping or a list of mappings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderPairs(pub Vec<(String, String)>);

impl HeaderPairs {
  pub fn parse(value: &str) -> Result<Self, String> {
    let mappings = match parse_document::<OneOrMany<Mapping>>(value)? {
      OneOrMany::One(mapping) => vec![mapping],
      OneOrMany::Many(mappings) => mappings,
    };

    let mut pairs = Vec::new();
    for mapping in mappings.iter() {
      for (name, value) in mapping.iter() {
        pairs.push((scalar_to_string(name)?, scalar_to_string(value)?));
      }
    }

    Ok(HeaderPairs(pairs))
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
  One(T),
  Many(Vec<T>),
}

fn scalar_to_string(value: &Value) -> Result<String, String> {
  match value {
    Value::String(text) => Ok(text.clone()),
    Value::Number(number) => Ok(number.to_string()),
    Value::Bool(flag) => Ok(flag.to_string()),
    other => Err(format!("expected a scalar header entry, found {:?}", other)),
  }
}

fn parse_document<T: DeserializeOwned>(value: &str) -> Result<T, String> {
  serde_yaml::from_str(value).map_err(|err| err.to_string())
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
  LevelFilter::from_str(value).map_err(|_| format!("unknown log level '{}'", value))
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct UpstreamTarget {
  /// Full upstream url, takes precedence over host/ip and port
  #[arg(long, env = "CLIENT_URL")]
  pub client_url: Option<String>,

  /// Upstream host name, resolved to an ip address at startup
  #[arg(long, env = "CLIENT_HOST")]
  pub client_host: Option<String>,

  #[arg(long, env = "CLIENT_IP")]
  pub client_ip: Option<IpAddr>,

  #[arg(long, env = "CLIENT_PORT", value_parser = clap::value_parser!(u16).range(1..))]
  pub client_port: Option<u16>,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "tunnel_proxy", version, about = "Reverse HTTP tunnel to a single upstream")]
pub struct Settings {
  #[arg(long, env = "PROXY_HOST", default_value = "127.0.0.1")]
  pub proxy_host: String,

  #[arg(long, env = "PROXY_PORT", default_value_t = 8000, value_parser = clap::value_parser!(u16).range(1..))]
  pub proxy_port: u16,

  #[arg(long, env = "WORKERS", default_value_t = 4, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
  pub workers: usize,

  #[command(flatten)]
  pub upstream: UpstreamTarget,

  #[arg(long, env = "ALLOWED_METHODS", default_value = r#"["GET", "POST"]"#, value_parser = AccessList::<HttpMethod>::parse)]
  pub allowed_methods: AccessList<HttpMethod>,

  #[arg(long, env = "ALLOWED_HEADERS", default_value = "*", value_parser = AccessList::<String>::parse)]
  pub allowed_headers: AccessList<String>,

  /// Urls or host names permitted to use the proxy, or `*`
  #[arg(long, env = "ALLOWED_ORIGINS", default_value = "[]", value_parser = AccessList::<String>::parse)]
  pub allowed_origins: AccessList<String>,

  /// A single `{max_requests, seconds}` rule or a list of them
  #[arg(long, env = "RATE_LIMIT", default_value = "[]", value_parser = RateLimits::parse)]
  pub rate_limit: RateLimits,

  #[arg(long, env = "REMOVE_HEADERS", default_value = "[]", value_parser = HeaderNames::parse)]
  pub remove_headers: HeaderNames,

  #[arg(long, env = "ADD_HEADERS", default_value = "[]", value_parser = HeaderPairs::parse)]
  pub add_headers: HeaderPairs,

  /// Upstream request timeout in seconds
  #[arg(long, env = "UPSTREAM_TIMEOUT")]
  pub upstream_timeout: Option<u64>,

  #[arg(long, env = "POOL_CONNECTIONS", default_value_t = true, action = ArgAction::Set)]
  pub pool_connections: bool,

  #[arg(long, env = "HTTP_PROXY_URL")]
  pub http_proxy_url: Option<String>,

  #[arg(long, env = "HTTP_PROXY_USER")]
  pub http_proxy_user: Option<String>,

  #[arg(long, env = "HTTP_PROXY_PASS")]
  pub http_proxy_pass: Option<String>,

  #[arg(long, env = "RATE_LIMIT_SWEEP_SECONDS", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
  pub rate_limit_sweep_seconds: u64,

  #[arg(long, env = "LOG_LEVEL", default_value = "info", value_parser = parse_level)]
  pub log_level: LevelFilter,
}

impl Settings {
  pub fn validate(&self) -> Result<(), ConfigurationError> {
    if self.allowed_methods == AccessList::Only(Vec::new()) {
      return Err(ConfigurationError::EmptyMethods);
    }

    for (index, rule) in self.rate_limit.0.iter().enumerate() {
      if rule.max_requests == 0 || rule.seconds == 0 {
        return Err(ConfigurationError::InvalidRateLimit(index));
      }
    }

    Ok(())
  }

  pub fn methods(&self) -> Vec<HttpMethod> {
    match &self.allowed_methods {
      AccessList::Any => HttpMethod::ALL.to_vec(),
      AccessList::Only(methods) => methods.clone(),
    }
  }
}

/// Loads `KEY=value` lines from the file named by `ENV_FILE` (or `env_file`),
/// `.env` by default, into the process environment before `Settings` are
/// parsed. Variables already set are kept. A missing file is `Ok(None)`.
pub fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
  let path = env::var("ENV_FILE")
    .or_else(|_| env::var("env_file"))
    .unwrap_or_else(|_| DEFAULT_ENV_FILE.to_string());

  load_env_file_from(&path)
}

fn load_env_file_from(path: &str) -> Result<Option<PathBuf>, dotenvy::Error> {
  match dotenvy::from_filename(path) {
    Ok(path) => Ok(Some(path)),
    Err(err) if err.not_found() => Ok(None),
    Err(err) => Err(err),
  }
}
