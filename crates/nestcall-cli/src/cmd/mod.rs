pub mod config;
pub mod serve;

use anyhow::Context;
use nestcall_core::config::ServiceConfig;
use std::path::Path;

/// Load the config file when one is given, otherwise start from defaults,
/// then overlay `NESTCALL_*` environment variables.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ServiceConfig> {
    let mut config = match path {
        Some(p) => ServiceConfig::load(p).context("failed to load config")?,
        None => ServiceConfig::default(),
    };
    config
        .apply_env(std::env::vars())
        .context("invalid environment override")?;
    Ok(config)
}
