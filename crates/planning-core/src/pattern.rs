use crate::error::{PlanningError, Result};
use regex::Regex;

/// A compiled glob pattern over `/`-separated relative paths.
///
/// Supported syntax:
/// - `**` as a whole segment matches zero or more path segments
/// - `*` matches any run of characters inside one segment
/// - `?` matches exactly one non-separator character
/// - `[abc]`, `[a-z]`, `[!abc]` match one non-separator character from the class
///
/// Matching is anchored at both ends.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(invalid(pattern, "pattern is empty"));
        }
        let source = translate(pattern)?;
        let regex = Regex::new(&source).map_err(|e| invalid(pattern, &e.to_string()))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(&normalize(path))
    }
}

/// Match `path` against `pattern`. Invalid patterns never match.
pub fn matches(path: &str, pattern: &str) -> bool {
    Pattern::compile(pattern)
        .map(|p| p.is_match(path))
        .unwrap_or(false)
}

/// Normalise separators to `/` and drop a leading `./`.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

fn invalid(pattern: &str, reason: &str) -> PlanningError {
    PlanningError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}

fn translate(pattern: &str) -> Result<String> {
    let segments: Vec<&str> = pattern.split('/').collect();
    let last = segments.len() - 1;
    let mut re = String::from("^");

    for (i, seg) in segments.iter().enumerate() {
        let after_globstar = i > 0 && segments[i - 1] == "**";

        if *seg == "**" {
            if i == last {
                if i == 0 || after_globstar {
                    re.push_str(".*");
                } else {
                    // `dir/**` also matches `dir` itself
                    re.push_str("(?:/.*)?");
                }
            } else if !after_globstar {
                if i > 0 {
                    re.push('/');
                }
                re.push_str("(?:.*/)?");
            }
            continue;
        }

        if i > 0 && !after_globstar {
            re.push('/');
        }
        re.push_str(&translate_segment(pattern, seg)?);
    }

    re.push('$');
    Ok(re)
}

fn translate_segment(pattern: &str, seg: &str) -> Result<String> {
    let chars: Vec<char> = seg.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                // `a**b` degrades to a single-segment wildcard
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
                out.push_str("[^/]*");
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                let (class, next) = translate_class(pattern, &chars, i)?;
                out.push_str(&class);
                i = next;
                continue;
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    Ok(out)
}

/// Translate a `[...]` class starting at `start`. Returns the regex fragment
/// and the index just past the closing `]`.
fn translate_class(pattern: &str, chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut i = start + 1;
    let negated = matches!(chars.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }

    let body_start = i;
    // A `]` right after the opening bracket is a literal member.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() && chars[i] != ']' {
        i += 1;
    }
    if i >= chars.len() {
        return Err(invalid(pattern, "unterminated character class"));
    }

    let members: String = chars[body_start..i]
        .iter()
        .filter(|c| **c != '/')
        .map(|c| match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => format!("\\{c}"),
            other => other.to_string(),
        })
        .collect();
    if members.is_empty() {
        return Err(invalid(pattern, "empty character class"));
    }

    let class = if negated {
        format!("[^/{members}]")
    } else {
        format!("[{members}]")
    };
    Ok((class, i + 1))
}
