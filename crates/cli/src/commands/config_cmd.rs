//! `medchat config` — Show the effective configuration.

use medchat_config::AppConfig;

pub fn run(path_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path_only {
        println!("{}", config_path().display());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("# {}", config_path().display());
    println!("{}", config.to_redacted_toml());
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
