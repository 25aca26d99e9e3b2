use crate::addenda;
use crate::doctype::DocumentTypeDefinition;
use crate::error::{PlanningError, Result};
use crate::frontmatter::{self, Frontmatter, FrontmatterBlock};
use crate::fs::DocumentFs;
use crate::paths;
use crate::store::DocumentStore;
use crate::version::SchemaVersion;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::path::{Component, Path};
use std::sync::OnceLock;

/// Directory names used before type directories became configurable.
const LEGACY_DIRS: &[(&str, &str)] = &[("decision-records", "adr"), ("feature-designs", "fdp")];

// ---------------------------------------------------------------------------
// Records and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationRecord {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub description: String,
    pub breaking: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub current: SchemaVersion,
    pub latest: SchemaVersion,
    pub pending: Vec<MigrationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChange {
    pub version: SchemaVersion,
    pub target: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedDocument {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeResult {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub applied: Vec<MigrationRecord>,
    pub migrated: Vec<String>,
    pub skipped: Vec<String>,
    pub flagged: Vec<FlaggedDocument>,
    pub notes: Vec<String>,
    pub failures: Vec<MigrationFailure>,
}

impl UpgradeResult {
    fn new(from: SchemaVersion) -> Self {
        Self {
            from,
            to: from,
            applied: Vec::new(),
            migrated: Vec::new(),
            skipped: Vec::new(),
            flagged: Vec::new(),
            notes: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Every step ran to completion with nothing left for a human.
    pub fn is_complete(&self) -> bool {
        self.flagged.is_empty() && self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built-in migrations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// 0.1.0 -> 0.2.0: type definitions move into the config.
    TypesInConfig,
    /// 0.2.0 -> 0.2.1: legacy documents gain frontmatter and an addenda section.
    DocumentFrontmatter,
}

const STEPS: [Step; 2] = [Step::TypesInConfig, Step::DocumentFrontmatter];

impl Step {
    fn record(self) -> MigrationRecord {
        match self {
            Step::TypesInConfig => MigrationRecord {
                from: SchemaVersion::new(0, 1, 0),
                to: SchemaVersion::new(0, 2, 0),
                description: "Write document type definitions into planning.types and fold legacy planning.subdirs into them".to_string(),
                breaking: false,
            },
            Step::DocumentFrontmatter => MigrationRecord {
                from: SchemaVersion::new(0, 2, 0),
                to: SchemaVersion::new(0, 2, 1),
                description: "Add YAML frontmatter and an addenda section to every planning document".to_string(),
                breaking: true,
            },
        }
    }
}

/// Every known migration in ascending order.
pub fn changelog() -> Vec<MigrationRecord> {
    STEPS.iter().map(|s| s.record()).collect()
}

pub fn latest_version() -> SchemaVersion {
    STEPS
        .iter()
        .map(|s| s.record().to)
        .max()
        .unwrap_or(SchemaVersion::INITIAL)
}

// ---------------------------------------------------------------------------
// Legacy document inspection
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Verdict {
    HasFrontmatter,
    Migrate {
        id: String,
        contents: String,
        note: Option<String>,
    },
    /// Not a planning document; left alone.
    Skip(String),
    /// A planning document that needs a human decision.
    Flag(String),
}

static LINK_RE: OnceLock<Regex> = OnceLock::new();
static DATE_RE: OnceLock<Regex> = OnceLock::new();

/// `[Accepted](adr.md) | 2024-01-01` -> `accepted`
fn clean_status(raw: &str) -> String {
    let link = LINK_RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
    let text = link.replace_all(raw, "$1");
    let text = text.split('|').next().unwrap_or_default();
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '`'))
        .to_lowercase()
}

fn created_date(body: &str) -> Option<NaiveDate> {
    let re = DATE_RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
    let line = frontmatter::section_value(body, &["Date", "Created"])?;
    let found = re.find(line)?;
    NaiveDate::parse_from_str(found.as_str(), "%Y-%m-%d").ok()
}

/// Length of the literal filename text before the number, used to prefer
/// `FDP-001-x.md` over the bare `001-x.md` format when both parse.
fn prefix_len(def: &DocumentTypeDefinition) -> usize {
    def.filename_format.find('{').unwrap_or(0)
}

fn infer_type<'a, F: DocumentFs>(
    store: &'a DocumentStore<F>,
    rel: &Path,
    filename: &str,
) -> Option<&'a DocumentTypeDefinition> {
    let dirs: Vec<&str> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let registry = store.registry();

    let mut dir = dirs.first().copied();
    if dir == Some(paths::ARCHIVE_DIR) && dirs.len() > 2 {
        dir = dirs.get(1).copied();
    }
    if let Some(dir) = dir.filter(|_| dirs.len() > 1) {
        if let Some(def) = registry.by_dir(dir) {
            return Some(def);
        }
        if let Some((_, key)) = LEGACY_DIRS.iter().find(|(legacy, _)| *legacy == dir) {
            if let Ok(def) = registry.get(key) {
                return Some(def);
            }
        }
    }

    registry
        .iter()
        .filter(|def| def.parse_filename(filename).is_some())
        .max_by_key(|def| prefix_len(def))
}

fn inspect<F: DocumentFs>(store: &DocumentStore<F>, path: &Path) -> Result<Verdict> {
    let raw = store.fs().read_to_string(path)?;
    if frontmatter::opens_frontmatter(&raw) {
        let origin = paths::relativize(store.root(), path);
        return match frontmatter::parse_from(&origin, &raw)?.frontmatter {
            Some(_) => Ok(Verdict::HasFrontmatter),
            None => Err(PlanningError::malformed(origin, "frontmatter block is never closed")),
        };
    }

    let planning_dir = store.planning_dir();
    let rel = path.strip_prefix(&planning_dir).unwrap_or(path);
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    let Some(def) = infer_type(store, rel, filename) else {
        return Ok(Verdict::Skip("could not determine the document type".to_string()));
    };
    let Some(number) = def.parse_filename(filename) else {
        return Ok(Verdict::Skip(format!(
            "filename does not match the {} format '{}'",
            def.name, def.filename_format
        )));
    };

    let mut note = None;
    let status = match frontmatter::section_value(&raw, &["Status"]) {
        Some(line) => {
            let cleaned = clean_status(line);
            match def.statuses.canonical(&cleaned) {
                Some(s) => s,
                None => {
                    return Ok(Verdict::Flag(format!(
                        "status '{cleaned}' is not a valid {} status (expected one of: {})",
                        def.name,
                        def.statuses.all().join(", ")
                    )))
                }
            }
        }
        None => {
            let initial = def.statuses.initial.to_lowercase();
            note = Some(format!("no ## Status section, using '{initial}'"));
            initial
        }
    };

    let today = store.today();
    let id = def.format_id(number);
    let mut fm = Frontmatter::new(&def.key, &id, &status, today);
    fm.created = created_date(&raw).unwrap_or(today);

    let body = addenda::ensure_addenda_section(&raw);
    let block = FrontmatterBlock::from_typed(&fm)?;
    let contents = frontmatter::render(Some(&block), &format!("\n{body}"));
    Ok(Verdict::Migrate { id, contents, note })
}

/// Markdown files under the planning root that the document step looks at.
fn candidate_documents<F: DocumentFs>(store: &DocumentStore<F>) -> Result<Vec<std::path::PathBuf>> {
    let planning_dir = store.planning_dir();
    let templates_dir = planning_dir.join(paths::TEMPLATES_DIR);
    Ok(store
        .fs()
        .walk_files(&planning_dir)?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "md"))
        .filter(|p| !p.starts_with(&templates_dir))
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            name != paths::ROADMAP_FILE && name != paths::LEGACY_TEMPLATE_FILE
        })
        .collect())
}

// ---------------------------------------------------------------------------
// MigrationEngine
// ---------------------------------------------------------------------------

/// Applies versioned upgrades to a store and its config.
pub struct MigrationEngine<'a, F: DocumentFs> {
    store: &'a mut DocumentStore<F>,
}

impl<'a, F: DocumentFs> MigrationEngine<'a, F> {
    pub fn new(store: &'a mut DocumentStore<F>) -> Self {
        Self { store }
    }

    pub fn current_version(&self) -> SchemaVersion {
        self.store.config().version()
    }

    pub fn status(&self) -> MigrationStatus {
        let current = self.current_version();
        MigrationStatus {
            current,
            latest: latest_version(),
            pending: self
                .pending(None)
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.record())
                .collect(),
        }
    }

    fn target(&self, to: Option<SchemaVersion>) -> Result<SchemaVersion> {
        let latest = latest_version();
        match to {
            None => Ok(latest),
            Some(v) if v > latest => Err(PlanningError::InvalidVersion(format!(
                "{v} (latest known version is {latest})"
            ))),
            Some(v) => Ok(v),
        }
    }

    fn pending(&self, to: Option<SchemaVersion>) -> Result<Vec<Step>> {
        let current = self.current_version();
        let target = self.target(to)?;
        Ok(STEPS
            .iter()
            .copied()
            .filter(|s| {
                let r = s.record();
                r.to > current && r.to <= target
            })
            .collect())
    }

    /// Describe what [`upgrade`](Self::upgrade) would change, without writing.
    pub fn plan_upgrade(&self, to: Option<SchemaVersion>) -> Result<Vec<PlannedChange>> {
        let mut changes = Vec::new();
        for step in self.pending(to)? {
            let version = step.record().to;
            match step {
                Step::TypesInConfig => {
                    let keys = self.store.registry().keys().join(", ");
                    changes.push(PlannedChange {
                        version,
                        target: paths::CONFIG_FILE.to_string(),
                        action: format!("write planning.types ({keys})"),
                    });
                    if !self.store.config().planning.subdirs.is_empty() {
                        changes.push(PlannedChange {
                            version,
                            target: paths::CONFIG_FILE.to_string(),
                            action: "remove planning.subdirs".to_string(),
                        });
                    }
                }
                Step::DocumentFrontmatter => {
                    for path in candidate_documents(self.store)? {
                        let target = paths::relativize(self.store.root(), &path);
                        let action = match inspect(self.store, &path) {
                            Ok(Verdict::HasFrontmatter) => continue,
                            Ok(Verdict::Migrate { id, note, .. }) => match note {
                                Some(note) => format!("add frontmatter as {id} ({note})"),
                                None => format!("add frontmatter as {id}"),
                            },
                            Ok(Verdict::Skip(reason)) => format!("skip: {reason}"),
                            Ok(Verdict::Flag(reason)) => format!("flag for manual review: {reason}"),
                            Err(e) => format!("unreadable: {e}"),
                        };
                        changes.push(PlannedChange {
                            version,
                            target,
                            action,
                        });
                    }
                }
            }
            changes.push(PlannedChange {
                version,
                target: paths::CONFIG_FILE.to_string(),
                action: format!("set planning.version to {version}"),
            });
        }
        Ok(changes)
    }

    /// Apply pending migrations up to `to` (default: latest) in order.
    ///
    /// A step records its version only when it left no failures and no
    /// flagged documents; later steps wait until it does.
    pub fn upgrade(&mut self, to: Option<SchemaVersion>) -> Result<UpgradeResult> {
        let steps = self.pending(to)?;
        let mut result = UpgradeResult::new(self.current_version());

        for step in steps {
            let record = step.record();
            let flagged_before = result.flagged.len();
            let failed_before = result.failures.len();

            match step {
                Step::TypesInConfig => self.materialize_types()?,
                Step::DocumentFrontmatter => self.add_frontmatter(&mut result)?,
            }

            let clean = result.flagged.len() == flagged_before && result.failures.len() == failed_before;
            if !clean {
                tracing::warn!(
                    version = %record.to,
                    "migration step incomplete; fix the reported documents and re-run"
                );
                break;
            }

            let mut config = self.store.config().clone();
            config.planning.version = Some(record.to);
            self.store.save_config(config)?;
            tracing::info!(from = %record.from, to = %record.to, "applied migration");
            result.to = record.to;
            result.applied.push(record);
        }
        Ok(result)
    }

    fn materialize_types(&mut self) -> Result<()> {
        let mut config = self.store.config().clone();
        config.planning.types = Some(self.store.registry().clone().into_map());
        config.planning.subdirs.clear();
        self.store.save_config(config)
    }

    fn add_frontmatter(&mut self, result: &mut UpgradeResult) -> Result<()> {
        for path in candidate_documents(self.store)? {
            let rel = paths::relativize(self.store.root(), &path);
            match inspect(self.store, &path) {
                Ok(Verdict::HasFrontmatter) => result.skipped.push(rel),
                Ok(Verdict::Migrate { id, contents, note }) => {
                    match self.store.write_raw(&path, &contents) {
                        Ok(()) => {
                            tracing::debug!(id = %id, path = %rel, "added frontmatter");
                            if let Some(note) = note {
                                result.notes.push(format!("{id}: {note}"));
                            }
                            result.migrated.push(id);
                        }
                        Err(e) => {
                            tracing::warn!(path = %rel, "migration failed: {e}");
                            result.failures.push(MigrationFailure {
                                path: rel,
                                error: e.to_string(),
                            });
                        }
                    }
                }
                Ok(Verdict::Skip(reason)) => {
                    tracing::info!(path = %rel, "not a planning document: {reason}");
                    result.notes.push(format!("{rel}: skipped, {reason}"));
                    result.skipped.push(rel);
                }
                Ok(Verdict::Flag(reason)) => {
                    tracing::warn!(path = %rel, "flagged for manual review: {reason}");
                    result.flagged.push(FlaggedDocument { path: rel, reason });
                }
                Err(e) => {
                    tracing::warn!(path = %rel, "migration failed: {e}");
                    result.failures.push(MigrationFailure {
                        path: rel,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
