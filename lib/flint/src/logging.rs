pub use slog::{b, crit, debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::{Config, LoggerConfig};

/// Builds the root terminal logger used by the gateway binaries. Logging
/// configuration is expressed as a sloggers document so a file-based config
/// can replace the inline default without touching call sites.
pub fn root() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("Malformed logger configuration");

    config.build_logger().expect("Logger construction failed")
}

/// Logger that swallows everything. Components constructed without a parent
/// logger fall back to this.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
