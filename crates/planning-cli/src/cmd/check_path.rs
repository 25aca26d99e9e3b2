use crate::output::print_json;
use anyhow::Context;
use planning_core::{protection::Tier, store::DocumentStore};
use std::path::Path;

/// Print the protection verdict for `path`. Returns whether the edit is allowed.
pub fn run(root: &Path, path: &Path, json: bool) -> anyhow::Result<bool> {
    let store = DocumentStore::open(root).context("failed to load config")?;
    let check = store.check_path(path);

    if json {
        let mut value = serde_json::to_value(&check)?;
        value["reason"] = serde_json::to_value(check.reason())?;
        print_json(&value)?;
        return Ok(check.allowed);
    }

    match (check.tier, check.reason()) {
        (None, _) => println!("allowed: {} is not protected", check.path),
        (Some(Tier::Remind), reason) => {
            println!("allowed: {}", check.path);
            if let Some(reason) = reason.filter(|r| !r.is_empty()) {
                println!("reminder: {reason}");
            }
        }
        (Some(tier), reason) => {
            println!("blocked ({tier}): {}", check.path);
            if let Some(reason) = reason {
                println!("{reason}");
            }
        }
    }
    Ok(check.allowed)
}
