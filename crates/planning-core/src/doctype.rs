use crate::error::{PlanningError, Result};
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const SUPERSEDED: &str = "superseded";

// ---------------------------------------------------------------------------
// StatusVocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusVocabulary {
    pub initial: String,
    #[serde(default)]
    pub editable: Vec<String>,
    /// Statuses that lock the document body.
    #[serde(default, rename = "final")]
    pub locked: Vec<String>,
    #[serde(default)]
    pub archive_triggers: Vec<String>,
}

fn contains_ci(set: &[String], status: &str) -> bool {
    let status = status.trim();
    set.iter().any(|s| s.eq_ignore_ascii_case(status))
}

impl StatusVocabulary {
    pub fn new(initial: &str, editable: &[&str], locked: &[&str], archive_triggers: &[&str]) -> Self {
        let own = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            initial: initial.to_string(),
            editable: own(editable),
            locked: own(locked),
            archive_triggers: own(archive_triggers),
        }
    }

    /// Every valid status, lowercased, sorted and deduplicated.
    pub fn all(&self) -> Vec<String> {
        let mut all: Vec<String> = std::iter::once(&self.initial)
            .chain(&self.editable)
            .chain(&self.locked)
            .chain(&self.archive_triggers)
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_lowercase())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// The vocabulary's spelling of `status`, if it belongs to the vocabulary.
    pub fn canonical(&self, status: &str) -> Option<String> {
        let wanted = status.trim().to_lowercase();
        self.all().into_iter().find(|s| *s == wanted)
    }

    pub fn contains(&self, status: &str) -> bool {
        self.canonical(status).is_some()
    }

    pub fn is_editable(&self, status: &str) -> bool {
        contains_ci(&self.editable, status)
    }

    pub fn is_locked(&self, status: &str) -> bool {
        contains_ci(&self.locked, status)
    }

    pub fn is_archive_trigger(&self, status: &str) -> bool {
        contains_ci(&self.archive_triggers, status)
    }
}

// ---------------------------------------------------------------------------
// DocumentTypeDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTypeDefinition {
    /// Registry key (`adr`, `fdp`, ...). Filled from the config map key.
    #[serde(skip)]
    pub key: String,
    pub name: String,
    pub dir: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_filename_format")]
    pub filename_format: String,
    pub id_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub statuses: StatusVocabulary,
}

fn default_filename_format() -> String {
    "{number:03d}-{slug}.md".to_string()
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{(\w+)(?::0?(\d+)d)?\}").unwrap())
}

impl DocumentTypeDefinition {
    #[allow(clippy::too_many_arguments)]
    fn builtin(
        key: &str,
        name: &str,
        dir: &str,
        prefix: &str,
        filename_format: &str,
        id_format: &str,
        template: &str,
        statuses: StatusVocabulary,
    ) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            dir: dir.to_string(),
            prefix: prefix.to_string(),
            filename_format: filename_format.to_string(),
            id_format: id_format.to_string(),
            template: Some(template.to_string()),
            statuses,
        }
    }

    pub fn format_id(&self, number: u32) -> String {
        self.render(&self.id_format, number, "")
    }

    pub fn format_filename(&self, number: u32, slug: &str) -> String {
        self.render(&self.filename_format, number, slug)
    }

    /// Document number encoded in `filename`, if it follows this type's format.
    pub fn parse_filename(&self, filename: &str) -> Option<u32> {
        self.capture_number(&self.filename_format, filename, false)
    }

    /// Document number encoded in `id` (case-insensitive).
    pub fn parse_id(&self, id: &str) -> Option<u32> {
        self.capture_number(&self.id_format, id.trim(), true)
    }

    /// Suggested alternative when an edit of a document in `status` is refused.
    pub fn unlock_hint(&self, status: &str) -> String {
        let supersedable = self.statuses.contains(SUPERSEDED);
        if self.statuses.is_locked(status) && supersedable {
            format!(
                "{} documents in status '{status}' are locked; append an addendum instead, or supersede it with a new {}",
                self.name, self.name
            )
        } else if self.statuses.is_locked(status) {
            format!(
                "{} documents in status '{status}' are locked; append an addendum instead",
                self.name
            )
        } else {
            format!(
                "{} documents in status '{status}' are read-only; append an addendum instead",
                self.name
            )
        }
    }

    fn render(&self, format: &str, number: u32, slug: &str) -> String {
        placeholder_re()
            .replace_all(format, |caps: &Captures| match &caps[1] {
                "number" => match caps.get(2).and_then(|w| w.as_str().parse::<usize>().ok()) {
                    Some(width) => format!("{number:0width$}"),
                    None => number.to_string(),
                },
                "slug" => slug.to_string(),
                "TYPE" => self.key.to_uppercase(),
                "type" => self.key.clone(),
                "prefix" => self.prefix.clone(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }

    fn capture_number(&self, format: &str, input: &str, case_insensitive: bool) -> Option<u32> {
        let mut pattern = String::from("^");
        let mut last = 0;
        for caps in placeholder_re().captures_iter(format) {
            let whole = caps.get(0)?;
            pattern.push_str(&regex::escape(&format[last..whole.start()]));
            let piece = match &caps[1] {
                "number" => r"(?P<number>\d+)".to_string(),
                "slug" => ".+".to_string(),
                "TYPE" => regex::escape(&self.key.to_uppercase()),
                "type" => regex::escape(&self.key),
                "prefix" => regex::escape(&self.prefix),
                _ => regex::escape(whole.as_str()),
            };
            pattern.push_str(&piece);
            last = whole.end();
        }
        pattern.push_str(&regex::escape(&format[last..]));
        pattern.push('$');

        let re = RegexBuilder::new(&pattern)
            .case_insensitive(case_insensitive)
            .build()
            .ok()?;
        re.captures(input)?.name("number")?.as_str().parse().ok()
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Every document type known to a project, keyed by type key.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRegistry {
    types: BTreeMap<String, DocumentTypeDefinition>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(default_types())
    }
}

impl TypeRegistry {
    pub fn new(types: BTreeMap<String, DocumentTypeDefinition>) -> Self {
        let types = types
            .into_iter()
            .map(|(key, mut def)| {
                def.key = key.clone();
                (key, def)
            })
            .collect();
        Self { types }
    }

    pub fn get(&self, key: &str) -> Result<&DocumentTypeDefinition> {
        self.types
            .get(&key.to_lowercase())
            .ok_or_else(|| PlanningError::UnknownType {
                key: key.to_string(),
                known: self.keys(),
            })
    }

    pub fn keys(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentTypeDefinition> {
        self.types.values()
    }

    pub fn into_map(self) -> BTreeMap<String, DocumentTypeDefinition> {
        self.types
    }

    /// Resolve a display id (`ADR-001`, `fdp-2`) to its type and number.
    pub fn resolve_id(&self, id: &str) -> Result<(&DocumentTypeDefinition, u32)> {
        self.iter()
            .find_map(|def| def.parse_id(id).map(|n| (def, n)))
            .ok_or_else(|| PlanningError::InvalidId(id.to_string()))
    }

    /// Type whose directory is `dir` (the first path component under the planning root).
    pub fn by_dir(&self, dir: &str) -> Option<&DocumentTypeDefinition> {
        self.iter().find(|def| def.dir == dir)
    }
}

/// Built-in document types.
pub fn default_types() -> BTreeMap<String, DocumentTypeDefinition> {
    let types = [
        DocumentTypeDefinition::builtin(
            "adr",
            "Architecture Decision Record",
            "decisions",
            "",
            "{number:03d}-{slug}.md",
            "ADR-{number:03d}",
            "adr.md",
            StatusVocabulary::new("proposed", &["proposed"], &["accepted"], &["deprecated", "superseded"]),
        ),
        DocumentTypeDefinition::builtin(
            "fdp",
            "Feature Design Proposal",
            "designs",
            "FDP-",
            "FDP-{number:03d}-{slug}.md",
            "FDP-{number:03d}",
            "fdp.md",
            StatusVocabulary::new(
                "proposed",
                &["proposed", "in progress"],
                &["implemented"],
                &["implemented", "abandoned"],
            ),
        ),
        DocumentTypeDefinition::builtin(
            "ap",
            "Action Plan",
            "action-plans",
            "AP-",
            "AP-{number:03d}-{slug}.md",
            "AP-{number:03d}",
            "action-plan.md",
            StatusVocabulary::new("active", &["active"], &["completed"], &["completed", "abandoned"]),
        ),
        DocumentTypeDefinition::builtin(
            "report",
            "Report",
            "reports",
            "RPT-",
            "RPT-{number:03d}-{slug}.md",
            "RPT-{number:03d}",
            "report.md",
            StatusVocabulary::new("draft", &["draft"], &["published"], &["superseded", "obsoleted"]),
        ),
    ];
    types.into_iter().map(|t| (t.key.clone(), t)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
