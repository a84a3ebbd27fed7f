use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ConfigurationError;
use crate::settings::{HeaderNames, HeaderPairs};

#[derive(Clone, Debug)]
pub struct Header {
  pub name: HeaderName,
  pub value: HeaderValue,
}

impl TryFrom<&(String, String)> for Header {
  type Error = ConfigurationError;

  fn try_from((name, value): &(String, String)) -> Result<Self, Self::Error> {
    let name = HeaderName::try_from(name).map_err(|_| ConfigurationError::InvalidHeaderName(name.clone()))?;

    let value = HeaderValue::try_from(value)
      .map_err(|_| ConfigurationError::InvalidHeaderValue(name.to_string()))?;

    Ok(Header { name, value })
  }
}

/// Response header rewriting: removals first, then additions.
#[derive(Clone, Debug, Default)]
pub struct HeaderRewrite {
  remove: Box<[HeaderName]>,
  add: Box<[Header]>,
}

impl HeaderRewrite {
  pub fn new(remove: &HeaderNames, add: &HeaderPairs) -> Result<Self, ConfigurationError> {
    let remove = remove
      .0
      .iter()
      .map(|name| HeaderName::try_from(name).map_err(|_| ConfigurationError::InvalidHeaderName(name.clone())))
      .collect::<Result<Vec<HeaderName>, _>>()?;

    let add = add
      .0
      .iter()
      .map(Header::try_from)
      .collect::<Result<Vec<Header>, _>>()?;

    Ok(Self {
      remove: remove.into_boxed_slice(),
      add: add.into_boxed_slice(),
    })
  }

  pub fn apply(&self, headers: &mut HeaderMap) {
    for name in self.remove.iter() {
      headers.remove(name);
    }

    for header in self.add.iter() {
      headers.insert(header.name.clone(), header.value.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rewrite(remove: &[&str], add: &[(&str, &str)]) -> HeaderRewrite {
    let remove = HeaderNames(remove.iter().map(|name| name.to_string()).collect());
    let add = HeaderPairs(add.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect());

    HeaderRewrite::new(&remove, &add).unwrap()
  }

  fn upstream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("server"), HeaderValue::from_static("upstream/1.0"));
    headers.insert(HeaderName::from_static("x-powered-by"), HeaderValue::from_static("php"));
    headers
  }

  #[test]
  fn removes_case_insensitively() {
    let mut headers = upstream_headers();
    rewrite(&["X-Powered-By"], &[]).apply(&mut headers);

    assert!(!headers.contains_key("x-powered-by"));
    assert!(headers.contains_key("server"));
  }

  #[test]
  fn removing_absent_header_is_noop() {
    let mut headers = upstream_headers();
    rewrite(&["x-not-there"], &[]).apply(&mut headers);

    assert_eq!(headers.len(), 2);
  }

  #[test]
  fn add_overwrites_existing() {
    let mut headers = upstream_headers();
    rewrite(&[], &[("Server", "tunnel")]).apply(&mut headers);

    assert_eq!(headers.get("server").unwrap(), "tunnel");
    assert_eq!(headers.get_all("server").count(), 1);
  }

  #[test]
  fn add_wins_over_remove() {
    let mut headers = upstream_headers();
    rewrite(&["server"], &[("SERVER", "tunnel")]).apply(&mut headers);

    assert_eq!(headers.get("server").unwrap(), "tunnel");
  }

  #[test]
  fn later_additions_win() {
    let mut headers = HeaderMap::new();
    rewrite(&[], &[("x-env", "dev"), ("X-Env", "prod")]).apply(&mut headers);

    assert_eq!(headers.get("x-env").unwrap(), "prod");
  }

  #[test]
  fn invalid_names_and_values_are_rejected() {
    let bad_name = HeaderPairs(vec![("bad header".to_string(), "x".to_string())]);
    assert!(matches!(
      HeaderRewrite::new(&HeaderNames::default(), &bad_name),
      Err(ConfigurationError::InvalidHeaderName(_))
    ));

    let bad_value = HeaderPairs(vec![("x-ok".to_string(), "line\nbreak".to_string())]);
    assert!(matches!(
      HeaderRewrite::new(&HeaderNames::default(), &bad_value),
      Err(ConfigurationError::InvalidHeaderValue(_))
    ));
  }
}
