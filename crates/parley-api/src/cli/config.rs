//! `parley config` -- print the effective configuration.

use console::style;

use crate::state::AppConfig;

/// Print the loaded configuration as TOML (or JSON with `--json`).
pub fn show_config(state: &AppConfig, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&state.config)?);
        return Ok(());
    }

    let config_path = state.data_dir.join("config.toml");
    println!();
    println!(
        "  {} {}",
        style("Config:").bold(),
        style(config_path.display()).dim()
    );
    println!();
    println!("{}", toml::to_string_pretty(&state.config)?);
    Ok(())
}
