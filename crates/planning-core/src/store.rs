use crate::addenda;
use crate::config::Config;
use crate::doctype::{DocumentTypeDefinition, TypeRegistry, SUPERSEDED};
use crate::document::PlanningDocument;
use crate::error::{PlanningError, Result};
use crate::frontmatter::{self, Frontmatter};
use crate::fs::{DocumentFs, LocalFs};
use crate::paths::{self, ProjectPath};
use crate::protection::{PathCheck, RuleSet};
use crate::templates;
use chrono::NaiveDate;
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

pub type Clock = fn() -> NaiveDate;

fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub doc_type: Option<String>,
    pub status: Option<String>,
    pub include_archived: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub id: String,
    pub from: String,
    pub to: String,
    /// The new status is an archive trigger; the document may be archived.
    pub archive_eligible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditCheck {
    pub id: String,
    pub path: PathBuf,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Supersession {
    pub old_id: String,
    pub new_id: String,
    pub new_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelateOutcome {
    pub id: String,
    pub added: Vec<String>,
    pub already_present: Vec<String>,
    /// Targets whose own `related` list gained `id`.
    pub reciprocated: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub id: String,
    pub from: PathBuf,
    pub to: PathBuf,
    pub forced: bool,
}

/// A file found for a document id.
#[derive(Debug, Clone)]
struct Located {
    type_key: String,
    number: u32,
    path: PathBuf,
    archived: bool,
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// Planning documents of one project, stored under the planning root.
pub struct DocumentStore<F: DocumentFs = LocalFs> {
    fs: F,
    root: PathBuf,
    config: Config,
    registry: TypeRegistry,
    rules: RuleSet,
    clock: Clock,
    cache: RefCell<Option<Vec<PlanningDocument>>>,
}

impl DocumentStore<LocalFs> {
    /// Open the store of the project at `root`, reading its config file.
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        Ok(Self::with_fs(root, config, LocalFs))
    }
}

impl<F: DocumentFs> DocumentStore<F> {
    pub fn with_fs(root: &Path, config: Config, fs: F) -> Self {
        Self {
            fs,
            root: root.to_path_buf(),
            registry: config.registry(),
            rules: config.rule_set(),
            config,
            clock: local_today,
            cache: RefCell::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    pub fn planning_dir(&self) -> PathBuf {
        paths::planning_dir(&self.root, self.config.planning_root())
    }

    pub fn type_dir(&self, def: &DocumentTypeDefinition) -> PathBuf {
        paths::type_dir(&self.root, self.config.planning_root(), &def.dir)
    }

    /// Replace the config, persisting it through the store's filesystem.
    pub fn save_config(&mut self, config: Config) -> Result<()> {
        let mut data = serde_json::to_string_pretty(&config)?;
        data.push('\n');
        self.fs.write(&paths::config_path(&self.root), &data)?;
        self.registry = config.registry();
        self.rules = config.rule_set();
        self.config = config;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        self.cache.borrow_mut().take();
    }

    pub(crate) fn write_raw(&self, path: &Path, contents: &str) -> Result<()> {
        self.invalidate();
        self.fs.write(path, contents)
    }

    fn write_doc(&self, doc: &PlanningDocument) -> Result<()> {
        let rendered = doc.render()?;
        self.write_raw(&doc.path, &rendered)
    }

    // -----------------------------------------------------------------------
    // Protection
    // -----------------------------------------------------------------------

    /// Evaluate the protection rules for `path` (absolute or project-relative).
    ///
    /// `.` and `..` are resolved first. A path that climbs out of the project
    /// root is denied; an absolute path elsewhere on disk is unprotected.
    pub fn check_path(&self, path: &Path) -> PathCheck {
        let root = std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone());
        match paths::project_path(&root, path) {
            ProjectPath::Inside(rel) => self.rules.check(&rel),
            ProjectPath::Outside(abs) => PathCheck::unprotected(&abs),
            ProjectPath::Escapes(abs) => {
                tracing::warn!(path = %abs, "path escapes the project root");
                PathCheck::escaping(&abs)
            }
        }
    }

    /// Create the planning root and every type directory.
    pub fn init_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for def in self.registry.iter() {
            let dir = self.type_dir(def);
            if !self.fs.exists(&dir) {
                self.fs.create_dir_all(&dir)?;
                created.push(dir);
            }
        }
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Numbering and lookup
    // -----------------------------------------------------------------------

    /// Numbered files of a type, active and archived.
    fn numbered_files(&self, def: &DocumentTypeDefinition) -> Result<Vec<Located>> {
        let dir = self.type_dir(def);
        let archive = paths::archive_dir(&dir);
        let mut found = Vec::new();
        for (folder, archived) in [(&dir, false), (&archive, true)] {
            for path in self.fs.list_files(folder)? {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Some(number) = def.parse_filename(name) {
                    found.push(Located {
                        type_key: def.key.clone(),
                        number,
                        path,
                        archived,
                    });
                }
            }
        }
        Ok(found)
    }

    pub fn next_number(&self, def: &DocumentTypeDefinition) -> Result<u32> {
        let max = self
            .numbered_files(def)?
            .iter()
            .map(|l| l.number)
            .max()
            .unwrap_or(0);
        max.checked_add(1).ok_or_else(|| {
            PlanningError::UnsupportedOperation(format!(
                "{} numbering is exhausted: {max} is the largest possible number",
                def.name
            ))
        })
    }

    fn locate(&self, id: &str, include_archived: bool) -> Result<Located> {
        let (def, number) = self.registry.resolve_id(id)?;
        let mut hits: Vec<Located> = self
            .numbered_files(def)?
            .into_iter()
            .filter(|l| l.number == number && (include_archived || !l.archived))
            .collect();
        // active copies first
        hits.sort_by_key(|l| l.archived);
        hits.into_iter()
            .next()
            .ok_or_else(|| PlanningError::NotFound(id.to_uppercase()))
    }

    fn load(&self, located: &Located) -> Result<PlanningDocument> {
        let raw = self.fs.read_to_string(&located.path)?;
        PlanningDocument::from_raw(&located.path, located.number, located.archived, &raw)
    }

    /// Read a document by id (`ADR-001`, case-insensitive).
    pub fn read(&self, id: &str, include_archived: bool) -> Result<PlanningDocument> {
        let located = self.locate(id, include_archived)?;
        self.load(&located)
    }

    fn definition_for(&self, doc: &PlanningDocument) -> Result<&DocumentTypeDefinition> {
        self.registry.get(doc.doc_type())
    }

    // -----------------------------------------------------------------------
    // create
    // -----------------------------------------------------------------------

    /// Create a new document of `type_key` from its template.
    pub fn create(&self, type_key: &str, title: &str) -> Result<PlanningDocument> {
        self.create_with(type_key, title, |_| {})
    }

    fn create_with(
        &self,
        type_key: &str,
        title: &str,
        customize: impl FnOnce(&mut Frontmatter),
    ) -> Result<PlanningDocument> {
        let def = self.registry.get(type_key)?;
        let number = self.next_number(def)?;
        let filename = def.format_filename(number, &paths::slugify(title));
        let path = self.type_dir(def).join(&filename);
        if self.fs.exists(&path) {
            return Err(PlanningError::DuplicateNumber {
                type_key: def.key.clone(),
                number,
                path: paths::relativize(&self.root, &path),
            });
        }

        let today = self.today();
        let id = def.format_id(number);
        let initial = def.statuses.initial.to_lowercase();

        let template_name = def.template.as_deref().unwrap_or(templates::FALLBACK_TEMPLATE);
        let template = templates::load(template_name, self.config.templates_dir(&self.root).as_deref())?;
        let number_text = format!("{number:03}");
        let date_text = today.format("%Y-%m-%d").to_string();
        let status_text = frontmatter::title_case(&initial);
        let rendered = templates::substitute(
            &template,
            &[
                ("NUMBER", number_text.as_str()),
                ("TITLE", title),
                ("DATE", date_text.as_str()),
                ("ID", id.as_str()),
                ("TYPE", def.name.as_str()),
                ("STATUS", status_text.as_str()),
            ],
        );

        let parsed = frontmatter::parse_from(template_name, &rendered)?;
        let mut fm = Frontmatter::new(&def.key, &id, &initial, today);
        if let Some(block) = &parsed.frontmatter {
            // keep template-declared keys that the typed frontmatter does not own
            for (k, v) in block.fields() {
                let owned = k
                    .as_str()
                    .map(|k| Frontmatter::OWNED.contains(&k))
                    .unwrap_or(false);
                if !owned {
                    fm.extra.insert(k.clone(), v.clone());
                }
            }
        }
        customize(&mut fm);

        let body = frontmatter::sync_status_section(&parsed.body, &initial);
        let body = addenda::ensure_addenda_section(&body);
        let body = if body.starts_with('\n') { body } else { format!("\n{body}") };

        let doc = PlanningDocument {
            path: path.clone(),
            number,
            archived: false,
            title: crate::document::extract_title(&body).unwrap_or_else(|| id.clone()),
            frontmatter: fm,
            body,
        };
        self.write_doc(&doc)?;
        tracing::debug!(id = %id, path = %path.display(), "created document");

        let clashes: Vec<Located> = self
            .numbered_files(def)?
            .into_iter()
            .filter(|l| l.number == number && l.path != path)
            .collect();
        if let Some(other) = clashes.first() {
            return Err(PlanningError::DuplicateNumber {
                type_key: def.key.clone(),
                number,
                path: paths::relativize(&self.root, &other.path),
            });
        }
        Ok(doc)
    }

    // -----------------------------------------------------------------------
    // update_status
    // -----------------------------------------------------------------------

    pub fn update_status(&self, id: &str, status: &str) -> Result<StatusChange> {
        let mut doc = self.read(id, true)?;
        if doc.archived {
            return Err(PlanningError::Archived(doc.id().to_string()));
        }
        let def = self.definition_for(&doc)?;
        let canonical = def
            .statuses
            .canonical(status)
            .ok_or_else(|| PlanningError::InvalidStatus {
                status: status.to_string(),
                type_name: def.name.clone(),
                valid: def.statuses.all(),
            })?;

        let from = std::mem::replace(&mut doc.frontmatter.status, canonical.clone());
        doc.frontmatter.modified = self.today();
        doc.body = frontmatter::sync_status_section(&doc.body, &canonical);
        self.write_doc(&doc)?;

        Ok(StatusChange {
            id: doc.id().to_string(),
            from,
            archive_eligible: def.statuses.is_archive_trigger(&canonical),
            to: canonical,
        })
    }

    // -----------------------------------------------------------------------
    // append_addendum
    // -----------------------------------------------------------------------

    /// Append a dated addendum. Allowed in every status, archived included.
    pub fn append_addendum(&self, id: &str, title: &str, body: Option<&str>) -> Result<PlanningDocument> {
        let mut doc = self.read(id, true)?;
        let today = self.today();
        doc.body = addenda::append_addendum(&doc.body, today, title, body.unwrap_or_default());
        doc.frontmatter.modified = today;
        self.write_doc(&doc)?;
        Ok(doc)
    }

    // -----------------------------------------------------------------------
    // supersede
    // -----------------------------------------------------------------------

    /// Create a replacement for `old_id` and mark the old document superseded.
    pub fn supersede(&self, old_id: &str, title: &str) -> Result<Supersession> {
        let mut old = self.read(old_id, true)?;
        if old.archived {
            return Err(PlanningError::Archived(old.id().to_string()));
        }
        let def = self.definition_for(&old)?;
        if !def.statuses.contains(SUPERSEDED) {
            return Err(PlanningError::UnsupportedOperation(format!(
                "{} documents cannot be superseded: '{SUPERSEDED}' is not one of their statuses",
                def.name
            )));
        }
        if let Some(by) = &old.frontmatter.superseded_by {
            return Err(PlanningError::AlreadySuperseded {
                id: old.id().to_string(),
                by: by.clone(),
            });
        }

        let old_id = old.id().to_string();
        let new = self.create_with(&def.key, title, |fm| fm.supersedes = Some(old_id.clone()))?;
        let new_id = new.id().to_string();

        let today = self.today();
        old.frontmatter.superseded_by = Some(new_id.clone());
        old.frontmatter.status = SUPERSEDED.to_string();
        old.frontmatter.modified = today;
        old.body = frontmatter::sync_status_section(&old.body, SUPERSEDED);
        old.body = addenda::append_addendum(
            &old.body,
            today,
            "Superseded",
            &format!("This document has been superseded by {new_id}."),
        );
        self.write_doc(&old).map_err(|e| {
            PlanningError::RelationshipInconsistency(format!(
                "{new_id} was created and supersedes {old_id}, but {old_id} could not be updated ({e}); \
                 set superseded_by: {new_id} on {old_id} by hand"
            ))
        })?;

        Ok(Supersession {
            old_id,
            new_id,
            new_path: new.path,
        })
    }

    // -----------------------------------------------------------------------
    // relate
    // -----------------------------------------------------------------------

    /// Add `targets` to the `related` list of `id`. With `bidirectional`,
    /// every target also gains `id`; either all writes land or none do.
    ///
    /// Archived documents may be named as one-way targets but are never
    /// rewritten.
    pub fn relate(&self, id: &str, targets: &[String], bidirectional: bool) -> Result<RelateOutcome> {
        let mut source = self.read(id, true)?;
        if source.archived {
            return Err(PlanningError::Archived(source.id().to_string()));
        }
        let source_id = source.id().to_uppercase();

        let mut wanted: Vec<String> = Vec::new();
        for t in targets {
            let t = t.trim().to_uppercase();
            if !t.is_empty() && !wanted.contains(&t) {
                wanted.push(t);
            }
        }
        if wanted.iter().any(|t| *t == source_id) {
            return Err(PlanningError::UnsupportedOperation(format!(
                "{source_id} cannot be related to itself"
            )));
        }

        // resolve everything before touching any file
        let mut target_docs = Vec::with_capacity(wanted.len());
        for t in &wanted {
            let target = self.read(t, true)?;
            if bidirectional && target.archived {
                return Err(PlanningError::Archived(target.id().to_string()));
            }
            target_docs.push(target);
        }

        let today = self.today();
        let mut added = Vec::new();
        let mut already_present = Vec::new();
        for target in &target_docs {
            let target_id = target.id().to_uppercase();
            if contains_id(&source.frontmatter.related, &target_id) {
                already_present.push(target_id);
            } else {
                source.frontmatter.related.push(target_id.clone());
                added.push(target_id);
            }
        }

        let mut pending: Vec<PlanningDocument> = Vec::new();
        if !added.is_empty() {
            source.frontmatter.modified = today;
            pending.push(source);
        }
        let mut reciprocated = Vec::new();
        if bidirectional {
            for mut target in target_docs {
                if !contains_id(&target.frontmatter.related, &source_id) {
                    target.frontmatter.related.push(source_id.clone());
                    target.frontmatter.modified = today;
                    reciprocated.push(target.id().to_uppercase());
                    pending.push(target);
                }
            }
        }

        self.write_all_or_nothing(&pending)?;

        Ok(RelateOutcome {
            id: source_id,
            added,
            already_present,
            reciprocated,
        })
    }

    /// Write `docs` in order. On failure, restore the documents already
    /// written to their previous contents.
    fn write_all_or_nothing(&self, docs: &[PlanningDocument]) -> Result<()> {
        let mut originals = Vec::with_capacity(docs.len());
        for doc in docs {
            originals.push(self.fs.read_to_string(&doc.path)?);
        }
        let mut rendered = Vec::with_capacity(docs.len());
        for doc in docs {
            rendered.push(doc.render()?);
        }

        for (i, doc) in docs.iter().enumerate() {
            if let Err(e) = self.write_raw(&doc.path, &rendered[i]) {
                tracing::warn!(id = %doc.id(), "write failed, rolling back: {e}");
                let mut stuck = Vec::new();
                for (done, original) in docs[..i].iter().zip(&originals) {
                    if self.write_raw(&done.path, original).is_err() {
                        stuck.push(done.id().to_string());
                    }
                }
                if stuck.is_empty() {
                    return Err(e);
                }
                return Err(PlanningError::RelationshipInconsistency(format!(
                    "writing {} failed ({e}) and {} could not be restored",
                    doc.id(),
                    stuck.join(", ")
                )));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // archive
    // -----------------------------------------------------------------------

    /// Move a document into its type's `archive/` directory.
    pub fn archive(&self, id: &str, force: bool) -> Result<ArchiveOutcome> {
        let located = self.locate(id, true)?;
        let mut doc = self.load(&located)?;
        if located.archived {
            return Err(PlanningError::Archived(doc.id().to_string()));
        }
        let def = self.registry.get(&located.type_key)?;
        if !force && !def.statuses.is_archive_trigger(doc.status()) {
            return Err(PlanningError::NotArchivable {
                id: doc.id().to_string(),
                status: doc.status().to_string(),
                triggers: def.statuses.archive_triggers.clone(),
            });
        }

        let from = located.path.clone();
        let Some(filename) = from.file_name() else {
            return Err(PlanningError::malformed(from.display(), "document path has no file name"));
        };
        let to = paths::archive_dir(&self.type_dir(def)).join(filename);
        if self.fs.exists(&to) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!(
                    "cannot archive {}: {} already exists",
                    doc.id(),
                    paths::relativize(&self.root, &to)
                ),
            )
            .into());
        }

        let original = self.fs.read_to_string(&from)?;
        let today = self.today();
        doc.frontmatter.modified = today;
        doc.frontmatter.archived = Some(today);
        self.write_doc(&doc)?;
        if let Err(e) = self.fs.rename(&from, &to) {
            self.write_raw(&from, &original)?;
            return Err(e);
        }
        self.invalidate();
        tracing::debug!(id = %doc.id(), to = %to.display(), "archived document");

        Ok(ArchiveOutcome {
            id: doc.id().to_string(),
            from,
            to,
            forced: force && !def.statuses.is_archive_trigger(doc.status()),
        })
    }

    // -----------------------------------------------------------------------
    // list
    // -----------------------------------------------------------------------

    /// Every readable document, archived included, sorted by type then number.
    fn all_documents(&self) -> Result<Vec<PlanningDocument>> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let mut docs = Vec::new();
        for def in self.registry.iter() {
            for located in self.numbered_files(def)? {
                let raw = self.fs.read_to_string(&located.path)?;
                if !frontmatter::has_frontmatter(&raw) {
                    tracing::warn!(
                        path = %paths::relativize(&self.root, &located.path),
                        "skipping document without frontmatter; run `planning migrate apply`"
                    );
                    continue;
                }
                match PlanningDocument::from_raw(&located.path, located.number, located.archived, &raw) {
                    Ok(doc) => docs.push(doc),
                    Err(e) => tracing::warn!("skipping unreadable document: {e}"),
                }
            }
        }
        docs.sort_by(|a, b| {
            (a.doc_type(), a.number, a.archived).cmp(&(b.doc_type(), b.number, b.archived))
        });
        tracing::debug!(count = docs.len(), "scanned planning documents");
        *self.cache.borrow_mut() = Some(docs.clone());
        Ok(docs)
    }

    pub fn list(&self, filter: &ListFilter) -> Result<Vec<PlanningDocument>> {
        let type_key = match &filter.doc_type {
            Some(t) => Some(self.registry.get(t)?.key.clone()),
            None => None,
        };
        Ok(self
            .all_documents()?
            .into_iter()
            .filter(|d| filter.include_archived || !d.archived)
            .filter(|d| type_key.as_deref().map_or(true, |k| d.doc_type().eq_ignore_ascii_case(k)))
            .filter(|d| {
                filter
                    .status
                    .as_deref()
                    .map_or(true, |s| d.status().eq_ignore_ascii_case(s.trim()))
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // edit_check
    // -----------------------------------------------------------------------

    /// Whether the body of `id` may be edited directly.
    pub fn edit_check(&self, id: &str, force: bool) -> Result<EditCheck> {
        let doc = self.read(id, true)?;
        let def = self.definition_for(&doc)?;
        let status = doc.status().to_string();

        let blocked_reason = if doc.archived {
            Some("the document is archived and read-only; append an addendum instead".to_string())
        } else if !def.statuses.is_editable(&status) {
            Some(def.unlock_hint(&status))
        } else {
            None
        };

        match blocked_reason {
            None => Ok(EditCheck {
                id: doc.id().to_string(),
                path: doc.path,
                status,
                warning: None,
            }),
            Some(reason) if force => Ok(EditCheck {
                id: doc.id().to_string(),
                path: doc.path,
                status,
                warning: Some(format!(
                    "editing anyway: {reason}. Record substantive changes as an addendum."
                )),
            }),
            Some(reason) => Err(PlanningError::EditBlocked {
                id: doc.id().to_string(),
                status,
                suggested_action: format!("{reason}, or pass --force"),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // init_roadmap
    // -----------------------------------------------------------------------

    pub fn init_roadmap(&self, force: bool) -> Result<PathBuf> {
        let path = paths::roadmap_path(&self.root, self.config.planning_root());
        if self.fs.exists(&path) && !force {
            return Err(PlanningError::RoadmapExists(paths::relativize(&self.root, &path)));
        }
        let template = templates::load(
            templates::ROADMAP_TEMPLATE,
            self.config.templates_dir(&self.root).as_deref(),
        )?;
        let date = self.today().format("%Y-%m-%d").to_string();
        let contents = templates::substitute(&template, &[("DATE", date.as_str())]);
        self.write_raw(&path, &contents)?;
        Ok(path)
    }
}

fn contains_id(list: &[String], id: &str) -> bool {
    list.iter().any(|r| r.eq_ignore_ascii_case(id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use crate::protection::Tier;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn later() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    fn root() -> &'static Path {
        Path::new("/proj")
    }

    fn store() -> DocumentStore<MemoryFs> {
        DocumentStore::with_fs(root(), Config::default(), MemoryFs::new()).with_clock(day)
    }

    fn raw(store: &DocumentStore<MemoryFs>, id: &str) -> String {
        let doc = store.read(id, true).unwrap();
        store.fs().read_to_string(&doc.path).unwrap()
    }

    #[test]
    fn create_numbers_and_names() {
        let s = store();
        let a = s.create("adr", "Use event sourcing").unwrap();
        assert_eq!(a.id(), "ADR-001");
        assert_eq!(
            a.path,
            PathBuf::from("/proj/docs/planning/decisions/001-use-event-sourcing.md")
        );
        assert_eq!(a.status(), "proposed");
        assert_eq!(a.frontmatter.created, day());

        let b = s.create("ADR", "Second").unwrap();
        assert_eq!(b.id(), "ADR-002");
        let f = s.create("fdp", "Login").unwrap();
        assert_eq!(f.path.file_name().unwrap(), "FDP-001-login.md");

        let text = raw(&s, "ADR-001");
        assert!(text.starts_with("---\ntype: adr\nid: ADR-001\nstatus: proposed\n"));
        assert!(text.contains("# ADR-001: Use event sourcing"));
        assert!(text.contains("## Status\n\nProposed"));
        assert!(text.contains("## Addenda"));
    }

    #[test]
    fn create_unknown_type() {
        assert!(matches!(
            store().create("rfc", "x"),
            Err(PlanningError::UnknownType { .. })
        ));
    }

    #[test]
    fn numbering_counts_archive_and_never_reuses() {
        let s = store();
        for t in ["one", "two", "three"] {
            s.create("adr", t).unwrap();
        }
        s.update_status("ADR-003", "superseded").unwrap();
        s.archive("ADR-003", false).unwrap();
        let next = s.create("adr", "four").unwrap();
        assert_eq!(next.id(), "ADR-004");
    }

    #[test]
    fn archived_numbers_hold_their_place() {
        let s = store();
        s.fs()
            .write(
                Path::new("/proj/docs/planning/decisions/archive/007-old.md"),
                "legacy",
            )
            .unwrap();
        assert_eq!(s.create("adr", "fresh").unwrap().id(), "ADR-008");
    }

    #[test]
    fn stray_files_do_not_affect_numbering() {
        let s = store();
        s.fs()
            .write(Path::new("/proj/docs/planning/decisions/001-same.md"), "x")
            .unwrap();
        s.fs()
            .write(Path::new("/proj/docs/planning/decisions/002-same.md.bak"), "x")
            .unwrap();
        assert_eq!(s.create("adr", "same").unwrap().id(), "ADR-002");
    }

    #[test]
    fn read_is_case_insensitive_and_reports_missing() {
        let s = store();
        s.create("ap", "Ship it").unwrap();
        assert_eq!(s.read("ap-1", false).unwrap().id(), "AP-001");
        assert!(matches!(s.read("AP-009", true), Err(PlanningError::NotFound(_))));
        assert!(matches!(s.read("ZZ-1", true), Err(PlanningError::InvalidId(_))));
    }

    #[test]
    fn update_status_validates_and_syncs() {
        let s = store();
        s.create("fdp", "Login").unwrap();
        let change = s.update_status("FDP-001", "In Progress").unwrap();
        assert_eq!(change.to, "in progress");
        assert!(!change.archive_eligible);
        assert!(raw(&s, "FDP-001").contains("## Status\n\nIn Progress"));

        let err = s.update_status("FDP-001", "accepted").unwrap_err();
        match err {
            PlanningError::InvalidStatus { valid, .. } => assert!(valid.contains(&"implemented".to_string())),
            other => panic!("unexpected {other:?}"),
        }

        let change = s.update_status("FDP-001", "IMPLEMENTED").unwrap();
        assert!(change.archive_eligible);
    }

    #[test]
    fn update_status_rejects_archived() {
        let s = store();
        s.create("ap", "x").unwrap();
        s.update_status("AP-001", "completed").unwrap();
        s.archive("AP-001", false).unwrap();
        assert!(matches!(
            s.update_status("AP-001", "active"),
            Err(PlanningError::Archived(_))
        ));
    }

    #[test]
    fn lock_invariant_blocks_edits_but_not_addenda() {
        let s = store();
        s.create("adr", "Use X").unwrap();
        assert!(s.edit_check("ADR-001", false).unwrap().warning.is_none());

        s.update_status("ADR-001", "accepted").unwrap();
        let before = s.read("ADR-001", false).unwrap().body;
        match s.edit_check("ADR-001", false).unwrap_err() {
            PlanningError::EditBlocked { suggested_action, .. } => {
                assert!(suggested_action.contains("addendum"));
                assert!(suggested_action.contains("supersede"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let forced = s.edit_check("ADR-001", true).unwrap();
        assert!(forced.warning.is_some());

        let s = s.with_clock(later);
        let doc = s.append_addendum("ADR-001", "Clarification", Some("More detail")).unwrap();
        assert!(doc.body.starts_with(before.trim_end()));
        assert_eq!(doc.frontmatter.modified, later());
        assert_eq!(doc.addenda().len(), 1);
    }

    #[test]
    fn append_default_body_and_archived_target() {
        let s = store();
        s.create("report", "Q4").unwrap();
        s.archive("RPT-001", true).unwrap();
        let doc = s.append_addendum("rpt-001", "Note", None).unwrap();
        assert!(doc.archived);
        assert!(doc.body.contains("[Add details here]"));
    }

    #[test]
    fn adr_lifecycle_scenario() {
        let s = store();
        s.create("adr", "Use X").unwrap();
        s.update_status("ADR-001", "accepted").unwrap();
        let sup = s.supersede("ADR-001", "Use Y").unwrap();
        assert_eq!(sup.new_id, "ADR-002");

        let old = s.read("ADR-001", false).unwrap();
        let new = s.read("ADR-002", false).unwrap();
        assert_eq!(old.status(), "superseded");
        assert_eq!(old.frontmatter.superseded_by.as_deref(), Some("ADR-002"));
        assert_eq!(new.frontmatter.supersedes.as_deref(), Some("ADR-001"));
        assert_eq!(new.status(), "proposed");
        let notes = old.addenda();
        assert_eq!(notes.last().unwrap().title, "Superseded");
        assert!(notes.last().unwrap().body.contains("ADR-002"));

        assert!(matches!(
            s.supersede("ADR-001", "Again"),
            Err(PlanningError::AlreadySuperseded { .. })
        ));

        let out = s.archive("ADR-001", false).unwrap();
        assert!(out.to.ends_with("decisions/archive/001-use-x.md"));
        let archived = s.read("ADR-001", true).unwrap();
        assert!(archived.archived);
        assert_eq!(archived.frontmatter.archived, Some(day()));
        assert!(matches!(s.read("ADR-001", false), Err(PlanningError::NotFound(_))));

        let check = s.check_path(&archived.path);
        assert!(!check.allowed);
        assert_eq!(check.tier, Some(Tier::Readonly));
        assert!(matches!(s.archive("ADR-001", true), Err(PlanningError::Archived(_))));
    }

    #[test]
    fn supersede_requires_vocabulary() {
        let s = store();
        s.create("ap", "Plan").unwrap();
        assert!(matches!(
            s.supersede("AP-001", "Plan 2"),
            Err(PlanningError::UnsupportedOperation(_))
        ));
        // nothing was created
        assert!(matches!(s.read("AP-002", true), Err(PlanningError::NotFound(_))));
    }

    #[test]
    fn supersede_reports_inconsistency_when_old_write_fails() {
        let s = store();
        let old = s.create("report", "Q3").unwrap();
        s.fs().fail_writes_to(old.path.clone());
        match s.supersede("RPT-001", "Q3 revised").unwrap_err() {
            PlanningError::RelationshipInconsistency(msg) => assert!(msg.contains("RPT-002")),
            other => panic!("unexpected {other:?}"),
        }
        let new = s.read("RPT-002", false).unwrap();
        assert_eq!(new.frontmatter.supersedes.as_deref(), Some("RPT-001"));
    }

    #[test]
    fn relate_bidirectional_scenario() {
        let s = store();
        s.create("fdp", "Login").unwrap();
        s.create("adr", "Auth").unwrap();
        s.create("ap", "Build login").unwrap();

        let out = s
            .relate("FDP-001", &["adr-001".into(), "AP-001".into(), "ADR-001".into()], true)
            .unwrap();
        assert_eq!(out.added, vec!["ADR-001", "AP-001"]);
        assert!(out.already_present.is_empty());
        assert_eq!(s.read("FDP-001", false).unwrap().frontmatter.related, vec!["ADR-001", "AP-001"]);
        assert_eq!(s.read("ADR-001", false).unwrap().frontmatter.related, vec!["FDP-001"]);
        assert_eq!(s.read("AP-001", false).unwrap().frontmatter.related, vec!["FDP-001"]);

        let again = s.relate("FDP-001", &["ADR-001".into()], true).unwrap();
        assert!(again.added.is_empty());
        assert_eq!(again.already_present, vec!["ADR-001"]);
        assert_eq!(s.read("ADR-001", false).unwrap().frontmatter.related, vec!["FDP-001"]);
    }

    #[test]
    fn relate_missing_target_writes_nothing() {
        let s = store();
        s.create("fdp", "Login").unwrap();
        s.create("adr", "Auth").unwrap();
        let before_fdp = raw(&s, "FDP-001");
        let before_adr = raw(&s, "ADR-001");

        let err = s
            .relate("FDP-001", &["ADR-001".into(), "ADR-099".into()], true)
            .unwrap_err();
        assert!(matches!(err, PlanningError::NotFound(_)));
        assert_eq!(raw(&s, "FDP-001"), before_fdp);
        assert_eq!(raw(&s, "ADR-001"), before_adr);
    }

    #[test]
    fn relate_rolls_back_on_partial_failure() {
        let s = store();
        s.create("fdp", "Login").unwrap();
        let adr = s.create("adr", "Auth").unwrap();
        let before_fdp = raw(&s, "FDP-001");

        s.fs().fail_writes_to(adr.path.clone());
        assert!(s.relate("FDP-001", &["ADR-001".into()], true).is_err());
        assert_eq!(raw(&s, "FDP-001"), before_fdp);
        assert!(s.read("ADR-001", false).unwrap().frontmatter.related.is_empty());
    }

    #[test]
    fn relate_to_self_is_rejected() {
        let s = store();
        s.create("adr", "A").unwrap();
        assert!(matches!(
            s.relate("ADR-001", &["adr-001".into()], false),
            Err(PlanningError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn archive_requires_trigger_unless_forced() {
        let s = store();
        s.create("fdp", "Login").unwrap();
        match s.archive("FDP-001", false).unwrap_err() {
            PlanningError::NotArchivable { triggers, .. } => {
                assert_eq!(triggers, vec!["implemented", "abandoned"])
            }
            other => panic!("unexpected {other:?}"),
        }
        let out = s.archive("FDP-001", true).unwrap();
        assert!(out.forced);
        assert_eq!(s.read("FDP-001", true).unwrap().status(), "proposed");
    }

    #[test]
    fn list_filters_sorts_and_skips_legacy() {
        let s = store();
        s.create("fdp", "B").unwrap();
        s.create("adr", "A1").unwrap();
        s.create("adr", "A2").unwrap();
        s.update_status("ADR-002", "accepted").unwrap();
        s.fs()
            .write(Path::new("/proj/docs/planning/decisions/003-legacy.md"), "# Legacy\n")
            .unwrap();

        let all = s.list(&ListFilter::default()).unwrap();
        let ids: Vec<&str> = all.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["ADR-001", "ADR-002", "FDP-001"]);

        let accepted = s
            .list(&ListFilter {
                status: Some("Accepted".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(accepted.len(), 1);

        s.update_status("FDP-001", "abandoned").unwrap();
        s.archive("FDP-001", false).unwrap();
        let fdps = s
            .list(&ListFilter {
                doc_type: Some("fdp".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(fdps.is_empty());
        let fdps = s
            .list(&ListFilter {
                doc_type: Some("fdp".into()),
                include_archived: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(fdps.len(), 1);
        assert!(fdps[0].archived);
    }

    #[test]
    fn list_cache_sees_writes() {
        let s = store();
        assert!(s.list(&ListFilter::default()).unwrap().is_empty());
        s.create("adr", "A").unwrap();
        assert_eq!(s.list(&ListFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn roadmap_requires_force_to_overwrite() {
        let s = store();
        let path = s.init_roadmap(false).unwrap();
        assert_eq!(path, PathBuf::from("/proj/docs/planning/roadmap.md"));
        assert!(s.fs().read_to_string(&path).unwrap().contains("2024-01-15"));
        assert!(matches!(s.init_roadmap(false), Err(PlanningError::RoadmapExists(_))));
        assert!(s.init_roadmap(true).is_ok());
    }

    #[test]
    fn custom_type_uses_fallback_template() {
        let json = r#"{"planning": {"types": {"rfc": {
            "name": "Request for Comments", "dir": "rfcs", "prefix": "RFC-",
            "filename_format": "{TYPE}-{number:04d}-{slug}.md", "id_format": "RFC-{number:04d}",
            "statuses": {"initial": "draft", "editable": ["draft"], "final": ["accepted"], "archive_triggers": ["withdrawn"]}
        }}}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        let s = DocumentStore::with_fs(root(), cfg, MemoryFs::new()).with_clock(day);
        let doc = s.create("rfc", "Streaming").unwrap();
        assert_eq!(doc.id(), "RFC-0001");
        assert_eq!(doc.path.file_name().unwrap(), "RFC-0001-streaming.md");
        assert!(doc.body.contains("## Status\n\nDraft"));
        assert!(matches!(
            s.supersede("RFC-0001", "x"),
            Err(PlanningError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn check_path_resolves_dot_segments_before_matching() {
        let s = store();
        let direct = s.check_path(Path::new("/proj/docs/planning/decisions/archive/001-a.md"));
        assert!(!direct.allowed);

        for detour in [
            "/proj/src/../docs/planning/decisions/archive/001-a.md",
            "docs/planning/./decisions/archive/../archive/001-a.md",
            "../proj/docs/planning/decisions/archive/001-a.md",
        ] {
            let check = s.check_path(Path::new(detour));
            assert!(!check.allowed, "{detour}");
            assert_eq!(check.tier, Some(Tier::Readonly));
            assert_eq!(check.path, "docs/planning/decisions/archive/001-a.md");
        }

        let escaped = s.check_path(Path::new("../../etc/passwd"));
        assert!(!escaped.allowed);
        assert_eq!(escaped.path, "/etc/passwd");
        assert!(s.check_path(Path::new("/tmp/notes.md")).allowed);
    }

    #[test]
    fn check_path_with_relative_root() {
        let s = DocumentStore::with_fs(Path::new("."), Config::default(), MemoryFs::new());
        let cwd = std::env::current_dir().unwrap();
        let check = s.check_path(&cwd.join("docs/planning/decisions/archive/001-a.md"));
        assert!(!check.allowed);
        assert_eq!(check.path, "docs/planning/decisions/archive/001-a.md");
    }

    /// A second writer that lands a file with the same number either while
    /// the store checks its target path or right after the store's write.
    struct RacingFs {
        inner: MemoryFs,
        rival: PathBuf,
        during_check: bool,
        landed: std::cell::Cell<bool>,
    }

    impl RacingFs {
        fn new(rival: &str, during_check: bool) -> Self {
            Self {
                inner: MemoryFs::new(),
                rival: PathBuf::from(rival),
                during_check,
                landed: std::cell::Cell::new(false),
            }
        }

        fn land_rival(&self) {
            if !self.landed.replace(true) {
                self.inner.write(&self.rival, "# rival\n").unwrap();
            }
        }
    }

    impl DocumentFs for RacingFs {
        fn read_to_string(&self, path: &Path) -> Result<String> {
            self.inner.read_to_string(path)
        }

        fn write(&self, path: &Path, contents: &str) -> Result<()> {
            self.inner.write(path, contents)?;
            if !self.during_check {
                self.land_rival();
            }
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            if self.during_check {
                self.land_rival();
            }
            self.inner.exists(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> Result<()> {
            self.inner.rename(from, to)
        }

        fn create_dir_all(&self, path: &Path) -> Result<()> {
            self.inner.create_dir_all(path)
        }

        fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
            self.inner.list_files(dir)
        }

        fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
            self.inner.walk_files(dir)
        }
    }

    #[test]
    fn create_detects_number_taken_before_write() {
        let rival = "/proj/docs/planning/decisions/001-use-x.md";
        let s = DocumentStore::with_fs(root(), Config::default(), RacingFs::new(rival, true))
            .with_clock(day);
        match s.create("adr", "Use X").unwrap_err() {
            PlanningError::DuplicateNumber {
                type_key,
                number,
                path,
            } => {
                assert_eq!(type_key, "adr");
                assert_eq!(number, 1);
                assert_eq!(path, "docs/planning/decisions/001-use-x.md");
            }
            other => panic!("expected DuplicateNumber, got {other:?}"),
        }
        assert_eq!(s.fs().read_to_string(Path::new(rival)).unwrap(), "# rival\n");
    }

    #[test]
    fn create_detects_number_taken_during_write() {
        let rival = "/proj/docs/planning/decisions/001-their-choice.md";
        let s = DocumentStore::with_fs(root(), Config::default(), RacingFs::new(rival, false))
            .with_clock(day);
        match s.create("adr", "Use X").unwrap_err() {
            PlanningError::DuplicateNumber { number, path, .. } => {
                assert_eq!(number, 1);
                assert_eq!(path, "docs/planning/decisions/001-their-choice.md");
            }
            other => panic!("expected DuplicateNumber, got {other:?}"),
        }
    }

    #[test]
    fn numbering_refuses_to_overflow() {
        let s = store();
        s.fs()
            .write(
                Path::new("/proj/docs/planning/decisions/4294967295-last.md"),
                "x",
            )
            .unwrap();
        assert!(matches!(
            s.create("adr", "next"),
            Err(PlanningError::UnsupportedOperation(m)) if m.contains("exhausted")
        ));
    }

    #[test]
    fn archive_refuses_to_overwrite_an_archived_file() {
        let s = store();
        s.create("ap", "Ship").unwrap();
        s.update_status("AP-001", "completed").unwrap();
        let clash = Path::new("/proj/docs/planning/action-plans/archive/AP-001-ship.md");
        s.fs().write(clash, "older copy").unwrap();

        match s.archive("AP-001", false).unwrap_err() {
            PlanningError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
            other => panic!("expected an AlreadyExists error, got {other:?}"),
        }
        assert_eq!(s.fs().read_to_string(clash).unwrap(), "older copy");
        assert!(!s.read("AP-001", false).unwrap().archived);
    }

    #[test]
    fn relate_never_rewrites_archived_documents() {
        let s = store();
        s.create("fdp", "Login").unwrap();
        s.create("adr", "Auth").unwrap();
        s.update_status("ADR-001", "deprecated").unwrap();
        s.archive("ADR-001", false).unwrap();
        let archived = raw(&s, "ADR-001");

        assert!(matches!(
            s.relate("ADR-001", &["FDP-001".into()], false),
            Err(PlanningError::Archived(_))
        ));
        assert!(matches!(
            s.relate("FDP-001", &["ADR-001".into()], true),
            Err(PlanningError::Archived(_))
        ));
        assert!(s.read("FDP-001", false).unwrap().frontmatter.related.is_empty());

        let out = s.relate("FDP-001", &["ADR-001".into()], false).unwrap();
        assert_eq!(out.added, vec!["ADR-001"]);
        assert_eq!(raw(&s, "ADR-001"), archived);
    }
}
