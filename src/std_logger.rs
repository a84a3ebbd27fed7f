use std::io::Write;

use chrono::Local;
use log::{max_level, Level, LevelFilter, Metadata, Record, SetLoggerError};

pub struct StdLogger;

static LOGGER: StdLogger = StdLogger;

pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
  log::set_logger(&LOGGER)?;
  log::set_max_level(level);

  Ok(())
}

impl log::Log for StdLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= max_level()
  }

  fn log(&self, record: &Record) {
    if self.enabled(record.metadata()) {
      let line = format_record(record);

      if record.level() <= Level::Warn {
        eprintln!("{}", line)
      } else {
        println!("{}", line)
      }
    }
  }

  fn flush(&self) {
    let _ = std::io::stdout().flush();
  }
}

fn format_record(record: &Record) -> String {
  let time_str = Local::now().format("%Y-%m-%dT%H:%M:%S");
  format!("{0} {1:<8}{2}: {3}", time_str, record.level(), record.target(), record.args())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn formats_level_target_and_message() {
    let line = format_record(
      &Record::builder()
        .args(format_args!("limit hit for {}", "1.2.3.4:/api"))
        .level(Level::Warn)
        .target("tunnel_proxy::rate_limit")
        .build(),
    );

    assert!(line.contains(" WARN    tunnel_proxy::rate_limit: limit hit for 1.2.3.4:/api"), "{}", line);
  }
}
