//! Log subscriber setup.
//!
//! Development gets the human-readable formatter, production gets JSON
//! lines. `RUST_LOG` overrides the default `info` filter either way.

use crate::config::AppEnv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(app_env: AppEnv) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match app_env {
        AppEnv::Production => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).json())
            .init(),
        AppEnv::Development => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}
