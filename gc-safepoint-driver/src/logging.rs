//! Logging setup, SPEC_FULL.md A.2. Mirrors `safekeeper.rs`'s tracing
//! init: an `EnvFilter` seeded from `RUST_LOG` (defaulting to `info`), and
//! a plain or JSON formatter selected by `--log-format`.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormatArg;

pub fn init(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormatArg::Plain => {
            fmt().with_env_filter(filter).init();
        }
        LogFormatArg::Json => {
            fmt().with_env_filter(filter).json().init();
        }
    }
}
