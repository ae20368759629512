use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::StaticConfig;
use crate::errors::Result;

static CONFIG: OnceLock<ArcSwap<StaticConfig>> = OnceLock::new();

/// Get the global configuration instance
///
/// Returns an Arc pointer to the configuration, which is cheap to clone
/// and doesn't hold any locks. Falls back to defaults when nothing was loaded.
pub fn get_config() -> Arc<StaticConfig> {
    CONFIG
        .get_or_init(|| ArcSwap::from_pointee(StaticConfig::default()))
        .load_full()
}

/// Initialize the global configuration from a TOML file (optional) plus `CE__*` env vars
pub fn init_config(path: Option<&str>) -> Result<()> {
    let config = StaticConfig::load(path)?;
    init_config_with(config);
    Ok(())
}

/// Install an explicit configuration, replacing any previous one
pub fn init_config_with(config: StaticConfig) {
    match CONFIG.get() {
        Some(swap) => swap.store(Arc::new(config)),
        None => {
            let _ = CONFIG.set(ArcSwap::from_pointee(config));
        }
    }
}
