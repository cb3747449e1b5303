//! Config command implementation.

use anyhow::{Context, Result};

use hotmirror_core::config::Config;

use super::ConfigAction;

/// Run the config command.
pub fn run(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load().context("Failed to load configuration")?;
            print!("{}", config.to_toml()?);
            println!();
            println!("# sandbox: {}", config.sandbox_root().display());
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }
        ConfigAction::Reset => {
            let path = Config::config_path();
            Config::default()
                .save_to(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("  Configuration reset: {}", path.display());
        }
    }
    Ok(())
}
