use anyhow::Result;
use asana2calendar_core::Store;
use owo_colors::OwoColorize;

use super::load_config;
use crate::registry::Registry;

pub fn run(force: bool) -> Result<()> {
    let config = load_config()?;
    Registry::builtin().build(&config)?;

    let path = config.database_path();
    if path.exists() && !force {
        anyhow::bail!(
            "A link store already exists at {}.\n\
            Reinitializing forgets every link, so the next sync will duplicate records \
            that exist on both sides. Pass --force to do it anyway.",
            path.display()
        );
    }

    let names = config.adapter_names();
    Store::initialize(&path, &names)?;

    println!(
        "{} link store for {} at {}",
        "Initialized".green(),
        names.join(", "),
        path.display()
    );
    Ok(())
}
