use crate::error::{PlanningError, Result};
use regex::{Captures, Regex};
use rust_embed::Embed;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Embed)]
#[folder = "templates/"]
struct BuiltinTemplates;

/// Template used by types that do not name one.
pub const FALLBACK_TEMPLATE: &str = "document.md";
pub const ROADMAP_TEMPLATE: &str = "roadmap.md";

/// Load template `name`, preferring a file in `override_dir` over the
/// built-in copy.
pub fn load(name: &str, override_dir: Option<&Path>) -> Result<String> {
    if let Some(dir) = override_dir {
        let path = dir.join(name);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "using template override");
            return Ok(std::fs::read_to_string(path)?);
        }
    }
    let file = <BuiltinTemplates as Embed>::get(name)
        .ok_or_else(|| PlanningError::TemplateNotFound(name.to_string()))?;
    Ok(String::from_utf8_lossy(&file.data).into_owned())
}

static VAR_RE: OnceLock<Regex> = OnceLock::new();

/// Replace `$NAME` and `${NAME}` with the matching value from `vars`.
/// Unknown names are left as written and `$$` becomes `$`.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let re = VAR_RE.get_or_init(|| Regex::new(r"\$(?:(\$)|\{(\w+)\}|(\w+))").unwrap());
    re.replace_all(template, |caps: &Captures| {
        if caps.get(1).is_some() {
            return "$".to_string();
        }
        let name = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}
