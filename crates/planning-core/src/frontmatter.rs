use crate::error::{PlanningError, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::ops::Range;
use std::sync::OnceLock;

static BLOCK_RE: OnceLock<Regex> = OnceLock::new();

/// `---` delimiter lines with LF or CRLF endings; the closing delimiter may
/// end the file.
fn block_re() -> &'static Regex {
    BLOCK_RE.get_or_init(|| {
        Regex::new(r"(?s)\A---[ \t]*\r?\n(?:(.*?)\r?\n)?---[ \t]*(?:\r?\n|\z)").unwrap()
    })
}

// ---------------------------------------------------------------------------
// FrontmatterBlock
// ---------------------------------------------------------------------------

/// A frontmatter block as found in a file, delimiters included.
///
/// `raw` is kept verbatim so that an untouched document renders back to
/// exactly the bytes it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontmatterBlock {
    raw: String,
    fields: Mapping,
}

impl FrontmatterBlock {
    /// Serialize typed frontmatter into a fresh block.
    pub fn from_typed(fm: &Frontmatter) -> Result<Self> {
        let yaml = serde_yaml::to_string(fm)?;
        let fields = match serde_yaml::to_value(fm)? {
            Value::Mapping(m) => m,
            _ => Mapping::new(),
        };
        Ok(Self {
            raw: format!("---\n{yaml}---\n"),
            fields,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn fields(&self) -> &Mapping {
        &self.fields
    }

    /// Decode the block into typed frontmatter. `origin` names the document
    /// in error messages.
    pub fn typed(&self, origin: &str) -> Result<Frontmatter> {
        for key in Frontmatter::REQUIRED {
            match self.fields.get(*key) {
                None | Some(Value::Null) => {
                    return Err(PlanningError::malformed(
                        origin,
                        format!("frontmatter is missing required field '{key}'"),
                    ))
                }
                Some(_) => {}
            }
        }
        serde_yaml::from_value(Value::Mapping(self.fields.clone()))
            .map_err(|e| PlanningError::malformed(origin, format!("invalid frontmatter: {e}")))
    }
}

// ---------------------------------------------------------------------------
// ParsedDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub frontmatter: Option<FrontmatterBlock>,
    pub body: String,
}

/// Split `raw` into its frontmatter block and body.
pub fn parse(raw: &str) -> Result<ParsedDocument> {
    parse_from("<input>", raw)
}

/// Like [`parse`], naming `origin` in error messages.
pub fn parse_from(origin: &str, raw: &str) -> Result<ParsedDocument> {
    let Some(caps) = block_re().captures(raw) else {
        return Ok(ParsedDocument {
            frontmatter: None,
            body: raw.to_string(),
        });
    };
    let Some(whole) = caps.get(0) else {
        return Err(PlanningError::malformed(origin, "unreadable frontmatter block"));
    };
    let yaml = caps.get(1).map_or("", |m| m.as_str());

    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|e| PlanningError::malformed(origin, format!("frontmatter is not valid YAML: {e}")))?;
    let fields = match value {
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        _ => {
            return Err(PlanningError::malformed(
                origin,
                "frontmatter is not a key/value mapping",
            ))
        }
    };

    Ok(ParsedDocument {
        frontmatter: Some(FrontmatterBlock {
            raw: whole.as_str().to_string(),
            fields,
        }),
        body: raw[whole.end()..].to_string(),
    })
}

pub fn render(frontmatter: Option<&FrontmatterBlock>, body: &str) -> String {
    match frontmatter {
        Some(block) => format!("{}{body}", block.raw),
        None => body.to_string(),
    }
}

pub fn has_frontmatter(raw: &str) -> bool {
    block_re().is_match(raw)
}

/// The first line is a `---` delimiter. Such a file claims frontmatter even
/// when the block is unterminated or unreadable.
pub fn opens_frontmatter(raw: &str) -> bool {
    raw.lines()
        .next()
        .is_some_and(|line| line.trim_end() == "---")
}

// ---------------------------------------------------------------------------
// Frontmatter
// ---------------------------------------------------------------------------

/// Typed view of a planning document's frontmatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub id: String,
    pub status: String,
    pub created: NaiveDate,
    pub modified: NaiveDate,
    #[serde(default)]
    pub supersedes: Option<String>,
    #[serde(default)]
    pub superseded_by: Option<String>,
    #[serde(default)]
    pub obsoleted_by: Option<String>,
    #[serde(default, deserialize_with = "related_list")]
    pub related: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<NaiveDate>,
    /// Keys not listed above, preserved across rewrites.
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Frontmatter {
    pub const REQUIRED: &'static [&'static str] = &["type", "id", "status", "created", "modified"];

    /// Keys with a typed field; everything else lands in `extra`.
    pub const OWNED: &'static [&'static str] = &[
        "type",
        "id",
        "status",
        "created",
        "modified",
        "supersedes",
        "superseded_by",
        "obsoleted_by",
        "related",
        "archived",
    ];

    pub fn new(doc_type: &str, id: &str, status: &str, today: NaiveDate) -> Self {
        Self {
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            status: status.to_lowercase(),
            created: today,
            modified: today,
            supersedes: None,
            superseded_by: None,
            obsoleted_by: None,
            related: Vec::new(),
            archived: None,
            extra: Mapping::new(),
        }
    }
}

/// `related` may be written as a list, a single id, or null.
fn related_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<String>),
        One(String),
    }
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(v)) => v,
        Some(OneOrMany::One(s)) => vec![s],
        None => Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Body sections
// ---------------------------------------------------------------------------

/// Byte range of the first content line under a `## <heading>` section
/// (any of `headings`, case-insensitive), stopping at the next heading.
pub(crate) fn section_value_range(body: &str, headings: &[&str]) -> Option<Range<usize>> {
    let mut offset = 0;
    let mut in_section = false;
    for line in body.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let text = line.trim_end_matches(['\n', '\r']);
        let trimmed = text.trim();

        if let Some(heading) = trimmed.strip_prefix("## ") {
            if in_section {
                return None;
            }
            in_section = headings
                .iter()
                .any(|h| heading.trim().eq_ignore_ascii_case(h));
            continue;
        }
        if in_section {
            if trimmed.starts_with('#') {
                return None;
            }
            if !trimmed.is_empty() {
                let lead = text.len() - text.trim_start().len();
                return Some(start + lead..start + text.trim_end().len());
            }
        }
    }
    None
}

/// First content line under any of `headings`.
pub fn section_value<'a>(body: &'a str, headings: &[&str]) -> Option<&'a str> {
    section_value_range(body, headings).map(|r| &body[r])
}

/// Rewrite the value of a `## Status` section to `status` (title-cased).
/// Bodies without a status section are returned unchanged.
pub fn sync_status_section(body: &str, status: &str) -> String {
    match section_value_range(body, &["Status"]) {
        Some(range) => {
            let mut out = String::with_capacity(body.len());
            out.push_str(&body[..range.start]);
            out.push_str(&title_case(status));
            out.push_str(&body[range.end..]);
            out
        }
        None => body.to_string(),
    }
}

pub fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
