use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = ".claude/vibe-hacker.json";

pub const DEFAULT_PLANNING_ROOT: &str = "docs/planning";
pub const ARCHIVE_DIR: &str = "archive";
pub const TEMPLATES_DIR: &str = "templates";

pub const ROADMAP_FILE: &str = "roadmap.md";
pub const LEGACY_TEMPLATE_FILE: &str = "template.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn planning_dir(root: &Path, planning_root: &str) -> PathBuf {
    root.join(planning_root)
}

pub fn type_dir(root: &Path, planning_root: &str, dir: &str) -> PathBuf {
    planning_dir(root, planning_root).join(dir)
}

pub fn archive_dir(type_dir: &Path) -> PathBuf {
    type_dir.join(ARCHIVE_DIR)
}

pub fn roadmap_path(root: &Path, planning_root: &str) -> PathBuf {
    planning_dir(root, planning_root).join(ROADMAP_FILE)
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` that would climb above the start of a relative path is kept; above
/// the filesystem root it is dropped.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn to_slash(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| match c {
            Component::RootDir => String::new(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect();
    let joined = parts.join("/").replace('\\', "/");
    if joined.is_empty() && path.has_root() {
        "/".to_string()
    } else {
        joined
    }
}

/// Convert `path` into a `/`-separated path relative to `root`.
///
/// Absolute paths outside `root` are returned normalised but otherwise
/// unchanged.
pub fn relativize(root: &Path, path: &Path) -> String {
    let root = normalize_lexically(root);
    let path = normalize_lexically(path);
    to_slash(path.strip_prefix(&root).unwrap_or(&path))
}

/// Where a path lands once resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectPath {
    /// Inside the root, `/`-separated and relative to it.
    Inside(String),
    /// An absolute path elsewhere that never climbs with `..`.
    Outside(String),
    /// Climbs above the root through `..`.
    Escapes(String),
}

/// Resolve `path` (absolute, or relative to `root`) lexically. `root` should
/// be absolute; a relative root cannot place absolute paths.
pub fn project_path(root: &Path, path: &Path) -> ProjectPath {
    let root = normalize_lexically(root);
    let climbs = path.components().any(|c| c == Component::ParentDir);
    let full = normalize_lexically(&root.join(path));
    match full.strip_prefix(&root) {
        Ok(rel) if !rel.starts_with("..") => ProjectPath::Inside(to_slash(rel)),
        _ if climbs => ProjectPath::Escapes(to_slash(&full)),
        _ => ProjectPath::Outside(to_slash(&full)),
    }
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

static STRIP_RE: OnceLock<Regex> = OnceLock::new();
static SPACE_RE: OnceLock<Regex> = OnceLock::new();
static DASH_RE: OnceLock<Regex> = OnceLock::new();

/// Turn a document title into a filename slug.
///
/// Lowercases, drops everything except `[a-z0-9]`, whitespace and `-`,
/// collapses whitespace and dash runs into single dashes and trims dashes.
/// A title with no usable characters becomes `untitled`.
pub fn slugify(title: &str) -> String {
    let strip = STRIP_RE.get_or_init(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
    let space = SPACE_RE.get_or_init(|| Regex::new(r"\s+").unwrap());
    let dash = DASH_RE.get_or_init(|| Regex::new(r"-+").unwrap());

    let lower = title.to_lowercase();
    let slug = strip.replace_all(&lower, "");
    let slug = space.replace_all(&slug, "-");
    let slug = dash.replace_all(&slug, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
