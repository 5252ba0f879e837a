use anyhow::Result;
use nestcall_core::config::WarnLevel;
use std::path::Path;

pub fn run(config_path: Option<&Path>, port: u16) -> Result<()> {
    let config = super::load_config(config_path)?;

    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => anyhow::bail!("invalid config: {}", w.message),
        }
    }

    tracing::info!(
        service = %config.service_name,
        backends = config.backends.len(),
        peers = config.peers.len(),
        "starting nestcall"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(nestcall_server::serve(config, port))
}
