use anyhow::Result;
use asana2calendar_core::LinkId;
use owo_colors::OwoColorize;

use super::{load_config, open_store};

pub fn run(id: i64) -> Result<()> {
    let config = load_config()?;
    let mut store = open_store(&config)?;

    let tx = store.begin()?;
    tx.unlink(LinkId(id))?;
    tx.commit()?;

    println!("{} link {}", "Removed".red(), id);
    println!(
        "{}",
        "Its records are untouched. The next sync treats them as new and copies each one to the other adapters.".dimmed()
    );
    Ok(())
}
