use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Inserted before the first addendum of a document.
pub const ADDENDA_SEPARATOR: &str = "\n\n---\n\n## Addenda\n";

/// Body used when an addendum is appended without text.
pub const PLACEHOLDER_BODY: &str = "[Add details here]";

static SECTION_RE: OnceLock<Regex> = OnceLock::new();
static ENTRY_RE: OnceLock<Regex> = OnceLock::new();

fn section_re() -> &'static Regex {
    SECTION_RE.get_or_init(|| Regex::new(r"(?im)^## Addenda[ \t]*$").unwrap())
}

fn entry_re() -> &'static Regex {
    ENTRY_RE.get_or_init(|| Regex::new(r"(?m)^### (\d{4}-\d{2}-\d{2}): (.*)$").unwrap())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addendum {
    pub date: NaiveDate,
    pub title: String,
    pub body: String,
}

pub fn has_addenda_section(body: &str) -> bool {
    section_re().is_match(body)
}

/// Append a dated entry after every existing addendum, creating the
/// section when the body has none. Text before the trailing whitespace of
/// `body` is left untouched.
pub fn append_addendum(body: &str, date: NaiveDate, title: &str, text: &str) -> String {
    let text = match text.trim() {
        "" => PLACEHOLDER_BODY,
        t => t,
    };
    let entry = format!("### {}: {}\n\n{text}\n", date.format("%Y-%m-%d"), title.trim());
    let base = body.trim_end();

    if has_addenda_section(body) {
        format!("{base}\n\n{entry}")
    } else {
        format!("{base}{ADDENDA_SEPARATOR}\n{entry}")
    }
}

/// Add an empty addenda section if the body lacks one.
pub fn ensure_addenda_section(body: &str) -> String {
    if has_addenda_section(body) {
        body.to_string()
    } else {
        format!("{}{ADDENDA_SEPARATOR}", body.trim_end())
    }
}

/// Entries of the addenda section, in document order.
pub fn addenda(body: &str) -> Vec<Addendum> {
    let Some(section) = section_re().find(body) else {
        return Vec::new();
    };
    let tail = &body[section.end()..];

    let heads: Vec<_> = entry_re().captures_iter(tail).collect();
    let mut out = Vec::with_capacity(heads.len());
    for (i, caps) in heads.iter().enumerate() {
        let (Some(whole), Some(date), Some(title)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(date.as_str(), "%Y-%m-%d") else {
            continue;
        };
        let end = heads
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(tail.len());
        out.push(Addendum {
            date,
            title: title.as_str().trim().to_string(),
            body: tail[whole.end()..end].trim().to_string(),
        });
    }
    out
}
