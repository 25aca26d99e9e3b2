use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use planning_core::{
    migration::{self, MigrationEngine},
    store::DocumentStore,
    version::SchemaVersion,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum MigrateSubcommand {
    /// Show the current schema version and pending migrations
    Status,
    /// Show what an upgrade would change, without writing anything
    Plan {
        /// Target version (default: latest)
        #[arg(long)]
        to: Option<SchemaVersion>,
    },
    /// Apply pending migrations
    Apply {
        /// Target version (default: latest)
        #[arg(long)]
        to: Option<SchemaVersion>,
    },
    /// List every known migration
    Changelog,
}

pub fn run(root: &Path, subcmd: MigrateSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        MigrateSubcommand::Status => status(root, json),
        MigrateSubcommand::Plan { to } => plan(root, to, json),
        MigrateSubcommand::Apply { to } => apply(root, to, json),
        MigrateSubcommand::Changelog => changelog(json),
    }
}

fn open(root: &Path) -> anyhow::Result<DocumentStore> {
    DocumentStore::open(root).context("failed to load config")
}

fn status(root: &Path, json: bool) -> anyhow::Result<()> {
    let mut store = open(root)?;
    let status = MigrationEngine::new(&mut store).status();

    if json {
        return print_json(&status);
    }
    println!("Current version: {}", status.current);
    println!("Latest version:  {}", status.latest);
    if status.pending.is_empty() {
        println!("Up to date.");
    } else {
        println!("\nPending migrations:");
        for m in &status.pending {
            let breaking = if m.breaking { " (BREAKING)" } else { "" };
            println!("  {} -> {}: {}{breaking}", m.from, m.to, m.description);
        }
        println!("\nPreview with: planning migrate plan");
    }
    Ok(())
}

fn plan(root: &Path, to: Option<SchemaVersion>, json: bool) -> anyhow::Result<()> {
    let mut store = open(root)?;
    let changes = MigrationEngine::new(&mut store)
        .plan_upgrade(to)
        .context("failed to plan upgrade")?;

    if json {
        return print_json(&changes);
    }
    if changes.is_empty() {
        println!("No changes needed.");
        return Ok(());
    }
    let rows = changes
        .iter()
        .map(|c| vec![c.version.to_string(), c.target.clone(), c.action.clone()])
        .collect();
    print_table(&["VERSION", "TARGET", "CHANGE"], rows);
    Ok(())
}

fn apply(root: &Path, to: Option<SchemaVersion>, json: bool) -> anyhow::Result<()> {
    let mut store = open(root)?;
    let result = MigrationEngine::new(&mut store)
        .upgrade(to)
        .context("failed to apply migrations")?;

    if json {
        print_json(&result)?;
    } else {
        if result.applied.is_empty() && result.migrated.is_empty() && result.is_complete() {
            println!("Already at {}; nothing to do.", result.to);
        } else {
            println!("Migrated {} -> {}", result.from, result.to);
        }
        for id in &result.migrated {
            println!("  migrated: {id}");
        }
        for note in &result.notes {
            println!("  note:     {note}");
        }
        for f in &result.flagged {
            println!("  review:   {} ({})", f.path, f.reason);
        }
        for f in &result.failures {
            println!("  failed:   {} ({})", f.path, f.error);
        }
    }

    if !result.is_complete() {
        anyhow::bail!(
            "migration stopped at {}: {} document(s) need review, {} failed; fix them and re-run",
            result.to,
            result.flagged.len(),
            result.failures.len()
        );
    }
    Ok(())
}

fn changelog(json: bool) -> anyhow::Result<()> {
    let records = migration::changelog();
    if json {
        return print_json(&records);
    }
    for m in &records {
        let breaking = if m.breaking { " [BREAKING]" } else { "" };
        println!("{}{breaking}", m.to);
        println!("  {}", m.description);
    }
    Ok(())
}
