//! Colored terminal rendering for pass reports and links.

use asana2calendar_core::{LinkRow, PassReport};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for PassReport {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        for (adapter, counts) in &self.adapters {
            if counts.total() == 0 {
                continue;
            }
            let mut parts = Vec::new();
            if counts.created > 0 {
                parts.push(format!("+{} created", counts.created).green().to_string());
            }
            if counts.updated > 0 {
                parts.push(format!("~{} updated", counts.updated).yellow().to_string());
            }
            if counts.deleted > 0 {
                parts.push(format!("-{} deleted", counts.deleted).red().to_string());
            }
            lines.push(format!("   {} {}", adapter.bold(), parts.join(", ")));
        }

        if lines.is_empty() {
            lines.push(format!("   {}", "Everything up to date".dimmed()));
        }

        if self.links_created > 0 || self.links_removed > 0 {
            let label = format!(
                "({} new {}, {} removed)",
                self.links_created,
                pluralize("link", self.links_created),
                self.links_removed
            );
            lines.push(format!("   {}", label.dimmed()));
        }
        if self.skipped > 0 {
            lines.push(format!(
                "   {} {} {} skipped, will retry next sync",
                "!".yellow(),
                self.skipped,
                pluralize("record", self.skipped)
            ));
        }
        if self.ties > 0 {
            lines.push(format!(
                "   {} {} {} edited on several sides at the same time, left as is",
                "!".yellow(),
                self.ties,
                pluralize("link", self.ties)
            ));
        }
        if self.deferred > 0 {
            lines.push(format!(
                "   {} {} {} postponed until every adapter is reachable",
                "!".yellow(),
                self.deferred,
                pluralize("link", self.deferred)
            ));
        }
        for adapter in &self.unavailable {
            let required = self.required_unavailable.contains(adapter);
            lines.push(format!(
                "   {} {} unavailable{}",
                "x".red(),
                adapter,
                if required { " (required)" } else { "" }
            ));
        }

        lines.join("\n")
    }
}

impl Render for LinkRow {
    fn render(&self) -> String {
        let members: Vec<String> = self
            .members
            .iter()
            .map(|(adapter, native_id)| match native_id {
                Some(id) => format!("{}={}", adapter, id),
                None => format!("{}={}", adapter, "-".dimmed()),
            })
            .collect();

        format!(
            "{:>5}  {}  {}",
            self.id.to_string().bold(),
            members.join("  "),
            self.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        )
    }
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
