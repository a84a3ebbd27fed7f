//! Fixed-window request counting per `client:path` identifier.
//!
//! Every configured rule owns its own windows. A request is checked against
//! the rules in order and stops at the first rejection; counters of the
//! rules checked before it stay incremented.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;

use crate::settings::RateLimitRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
  Allowed,
  Rejected { retry_after: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Window {
  count: u64,
  started: Instant,
}

pub struct FixedWindow {
  rule: RateLimitRule,
  length: Duration,
  windows: DashMap<String, Window>,
}

impl FixedWindow {
  pub fn new(rule: RateLimitRule) -> Self {
    Self {
      rule,
      length: Duration::from_secs(rule.seconds),
      windows: DashMap::new(),
    }
  }

  /// The entry lock is held for the whole read-modify-write, so two racing
  /// requests on one identifier cannot both take the last slot.
  pub fn check_and_increment(&self, identifier: &str, now: Instant) -> RateDecision {
    match self.windows.entry(identifier.to_string()) {
      Entry::Vacant(vacant) => {
        vacant.insert(Window { count: 1, started: now });
        RateDecision::Allowed
      }
      Entry::Occupied(mut occupied) => {
        let window = occupied.get_mut();

        if now.saturating_duration_since(window.started) > self.length {
          window.count = 1;
          window.started = now;
          RateDecision::Allowed
        } else if window.count >= self.rule.max_requests {
          // whole window length, not the time remaining in it
          RateDecision::Rejected { retry_after: self.rule.seconds }
        } else {
          window.count += 1;
          RateDecision::Allowed
        }
      }
    }
  }

  fn sweep(&self, now: Instant) -> usize {
    let before = self.windows.len();
    let length = self.length;
    self.windows.retain(|_, window| now.saturating_duration_since(window.started) <= length);

    before.saturating_sub(self.windows.len())
  }
}

#[derive(Clone)]
pub struct RateLimiter {
  rules: Arc<[FixedWindow]>,
}

impl RateLimiter {
  pub fn new(rules: &[RateLimitRule]) -> Self {
    let windows: Vec<FixedWindow> = rules.iter().map(|rule| FixedWindow::new(*rule)).collect();

    Self {
      rules: Arc::from(windows),
    }
  }

  pub fn is_enabled(&self) -> bool {
    !self.rules.is_empty()
  }

  pub fn check(&self, identifier: &str, now: Instant) -> RateDecision {
    for window in self.rules.iter() {
      let decision = window.check_and_increment(identifier, now);

      if let RateDecision::Rejected { .. } = decision {
        return decision;
      }
    }

    RateDecision::Allowed
  }

  /// Drops windows that have already expired. Returns the number removed.
  pub fn sweep(&self, now: Instant) -> usize {
    self.rules.iter().map(|window| window.sweep(now)).sum()
  }

  pub fn tracked(&self) -> usize {
    self.rules.iter().map(|window| window.windows.len()).sum()
  }

  pub fn spawn_sweeper(&self, every: Duration) {
    if !self.is_enabled() {
      return;
    }

    let limiter = self.clone();
    actix_web::rt::spawn(async move {
      let mut ticker = actix_web::rt::time::interval(every);

      loop {
        ticker.tick().await;
        let removed = limiter.sweep(Instant::now());

        if removed > 0 {
          debug!("Evicted {} expired rate limit windows, {} remaining", removed, limiter.tracked());
        }
      }
    });
  }
}
