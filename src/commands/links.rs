use anyhow::Result;
use owo_colors::OwoColorize;

use super::{load_config, open_store};
use crate::render::Render;

pub fn run() -> Result<()> {
    let config = load_config()?;
    let mut store = open_store(&config)?;

    let tx = store.begin()?;
    let links = tx.links()?;
    tx.rollback()?;

    if links.is_empty() {
        println!("{}", "No links yet. Run `asana2calendar sync`.".dimmed());
        return Ok(());
    }

    for link in &links {
        println!("{}", link.render());
    }
    Ok(())
}
