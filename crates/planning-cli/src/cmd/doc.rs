use crate::output::{print_json, print_table};
use anyhow::Context;
use planning_core::{
    paths,
    store::{DocumentStore, ListFilter},
};
use std::path::Path;

fn open(root: &Path) -> anyhow::Result<DocumentStore> {
    DocumentStore::open(root).context("failed to load config")
}

// ---------------------------------------------------------------------------
// new
// ---------------------------------------------------------------------------

pub fn new(root: &Path, doc_type: &str, title: &str, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let doc = store
        .create(doc_type, title)
        .with_context(|| format!("failed to create {doc_type} '{title}'"))?;

    if json {
        print_json(&doc)?;
    } else {
        println!("Created {}: {}", doc.id(), paths::relativize(root, &doc.path));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

pub fn list(
    root: &Path,
    doc_type: Option<String>,
    status: Option<String>,
    include_archived: bool,
    json: bool,
) -> anyhow::Result<()> {
    let store = open(root)?;
    let filter = ListFilter {
        doc_type,
        status,
        include_archived,
    };
    let docs = store.list(&filter).context("failed to list documents")?;

    if json {
        print_json(&docs)?;
        return Ok(());
    }
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    let rows = docs
        .iter()
        .map(|d| {
            let mut status = d.status().to_string();
            if d.archived {
                status.push_str(" (archived)");
            }
            vec![
                d.id().to_string(),
                d.doc_type().to_string(),
                status,
                d.frontmatter.modified.to_string(),
                d.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "TYPE", "STATUS", "MODIFIED", "TITLE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

pub fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let doc = store.read(id, true)?;
    let addenda = doc.addenda();

    if json {
        let mut value = serde_json::to_value(&doc)?;
        value["addenda"] = serde_json::to_value(&addenda)?;
        print_json(&value)?;
        return Ok(());
    }

    let fm = &doc.frontmatter;
    println!("{}", doc.title);
    println!("  id:       {}", fm.id);
    println!("  type:     {}", fm.doc_type);
    println!("  status:   {}", fm.status);
    println!("  created:  {}", fm.created);
    println!("  modified: {}", fm.modified);
    println!("  path:     {}", paths::relativize(root, &doc.path));
    if let Some(date) = fm.archived {
        println!("  archived: {date}");
    }
    if let Some(s) = &fm.supersedes {
        println!("  supersedes:    {s}");
    }
    if let Some(s) = &fm.superseded_by {
        println!("  superseded by: {s}");
    }
    if let Some(s) = &fm.obsoleted_by {
        println!("  obsoleted by:  {s}");
    }
    if !fm.related.is_empty() {
        println!("  related:  {}", fm.related.join(", "));
    }
    if !addenda.is_empty() {
        println!("\nAddenda:");
        for a in &addenda {
            println!("  {}: {}", a.date, a.title);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

pub fn status(root: &Path, id: &str, new_status: &str, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let change = store
        .update_status(id, new_status)
        .with_context(|| format!("failed to update status of {}", id.to_uppercase()))?;

    if json {
        print_json(&change)?;
        return Ok(());
    }
    println!("{}: {} -> {}", change.id, change.from, change.to);
    if change.archive_eligible {
        println!(
            "'{}' is an archive trigger. Archive with: planning archive {}",
            change.to, change.id
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// edit
// ---------------------------------------------------------------------------

pub fn edit(root: &Path, id: &str, force: bool, quiet: bool, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let check = store.edit_check(id, force)?;

    if json {
        print_json(&check)?;
        return Ok(());
    }
    if let Some(warning) = &check.warning {
        eprintln!("warning: {warning}");
    }
    let rel = paths::relativize(root, &check.path);
    if quiet {
        println!("{rel}");
    } else {
        println!("{} ({}) is editable: {rel}", check.id, check.status);
        println!("Tip: use `planning append {}` to record changes after the fact.", check.id);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// append
// ---------------------------------------------------------------------------

pub fn append(root: &Path, id: &str, title: &str, body: Option<&str>, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let doc = store
        .append_addendum(id, title, body)
        .with_context(|| format!("failed to append to {}", id.to_uppercase()))?;

    if json {
        print_json(&serde_json::json!({
            "id": doc.id(),
            "path": doc.path,
            "modified": doc.frontmatter.modified,
            "addenda": doc.addenda(),
        }))?;
    } else {
        println!(
            "Added addendum to {}: {}",
            doc.id(),
            paths::relativize(root, &doc.path)
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// supersede
// ---------------------------------------------------------------------------

pub fn supersede(root: &Path, id: &str, title: &str, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let outcome = store
        .supersede(id, title)
        .with_context(|| format!("failed to supersede {}", id.to_uppercase()))?;

    if json {
        print_json(&outcome)?;
    } else {
        println!(
            "Created {}: {}",
            outcome.new_id,
            paths::relativize(root, &outcome.new_path)
        );
        println!("{} is now superseded by {}", outcome.old_id, outcome.new_id);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// relate
// ---------------------------------------------------------------------------

pub fn relate(
    root: &Path,
    id: &str,
    targets: &[String],
    bidirectional: bool,
    json: bool,
) -> anyhow::Result<()> {
    let store = open(root)?;
    let outcome = store
        .relate(id, targets, bidirectional)
        .with_context(|| format!("failed to relate {}", id.to_uppercase()))?;

    if json {
        print_json(&outcome)?;
        return Ok(());
    }
    if outcome.added.is_empty() {
        println!("{}: no new relationships", outcome.id);
    } else {
        println!("{}: related to {}", outcome.id, outcome.added.join(", "));
    }
    if !outcome.already_present.is_empty() {
        println!("  already related: {}", outcome.already_present.join(", "));
    }
    if !outcome.reciprocated.is_empty() {
        println!("  back-linked from: {}", outcome.reciprocated.join(", "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// archive
// ---------------------------------------------------------------------------

pub fn archive(root: &Path, id: &str, force: bool, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let outcome = store
        .archive(id, force)
        .with_context(|| format!("failed to archive {}", id.to_uppercase()))?;

    if json {
        print_json(&outcome)?;
    } else {
        println!(
            "Archived {}: {} -> {}",
            outcome.id,
            paths::relativize(root, &outcome.from),
            paths::relativize(root, &outcome.to)
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// roadmap
// ---------------------------------------------------------------------------

pub fn roadmap(root: &Path, force: bool, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let path = store.init_roadmap(force)?;
    let rel = paths::relativize(root, &path);

    if json {
        print_json(&serde_json::json!({ "path": rel }))?;
    } else {
        println!("Created roadmap: {rel}");
    }
    Ok(())
}
