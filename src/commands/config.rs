use anyhow::Result;
use asana2calendar_core::AppConfig;
use owo_colors::OwoColorize;

pub fn run() -> Result<()> {
    let config_path = AppConfig::config_path()?;

    if !config_path.exists() {
        AppConfig::create_default_config(&config_path)?;
        println!("{} {}", "Created".green(), config_path.display());
        println!("Fill in at least two adapters, then run `asana2calendar init`.");
        return Ok(());
    }

    let config = AppConfig::load_from(&config_path)?;

    println!("{}", "Paths".bold());
    println!("  Config:    {}", config_path.display());
    println!("  Links:     {}", config.database_path().display());

    println!("\n{}", "Adapters".bold());
    if config.adapters.is_empty() {
        println!("  {}", "(none configured)".dimmed());
    }
    for (name, adapter) in &config.adapters {
        let mut notes = vec![adapter.kind(name).to_string()];
        if !adapter.required {
            notes.push("optional".into());
        }
        let line = format!("  {} ({})", name, notes.join(", "));
        if adapter.enabled {
            println!("{}", line);
        } else {
            println!("{} {}", line.dimmed(), "disabled".dimmed());
        }
    }

    println!("\n{}", "Sync".bold());
    println!("  Window:    ±{} days", config.sync_days);
    println!("  Timeout:   {}s per request", config.timeout_secs);

    Ok(())
}
