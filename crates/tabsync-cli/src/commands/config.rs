//! Config command.

use anyhow::Result;
use tabsync_core::TabSyncConfig;

pub fn execute(config: &TabSyncConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
