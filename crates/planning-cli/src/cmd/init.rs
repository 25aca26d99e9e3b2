use crate::output::print_json;
use anyhow::Context;
use planning_core::{
    config::Config,
    migration,
    paths,
    store::DocumentStore,
};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config_created = if Config::exists(root) {
        false
    } else {
        Config::initial(migration::latest_version())
            .save(root)
            .with_context(|| format!("failed to write {}", paths::CONFIG_FILE))?;
        true
    };

    let store = DocumentStore::open(root).context("failed to load config")?;
    let created = store
        .init_dirs()
        .context("failed to create planning directories")?;

    if json {
        let dirs: Vec<String> = created
            .iter()
            .map(|d| paths::relativize(root, d))
            .collect();
        print_json(&serde_json::json!({
            "root": root,
            "config_created": config_created,
            "created_dirs": dirs,
        }))?;
        return Ok(());
    }

    println!("Initializing planning in: {}", root.display());
    if config_created {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }
    for def in store.registry().iter() {
        let dir = store.type_dir(def);
        let state = if created.contains(&dir) { "created:" } else { "exists: " };
        println!("  {state} {}/", paths::relativize(root, &dir));
    }
    Ok(())
}
