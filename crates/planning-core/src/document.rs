use crate::addenda::{self, Addendum};
use crate::error::{PlanningError, Result};
use crate::frontmatter::{self, Frontmatter, FrontmatterBlock};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A planning document with typed frontmatter, located in the store.
#[derive(Debug, Clone, Serialize)]
pub struct PlanningDocument {
    pub path: PathBuf,
    pub number: u32,
    pub archived: bool,
    #[serde(flatten)]
    pub frontmatter: Frontmatter,
    pub title: String,
    #[serde(skip)]
    pub body: String,
}

impl PlanningDocument {
    /// Parse the file contents of a document that already carries frontmatter.
    pub fn from_raw(path: &Path, number: u32, archived: bool, raw: &str) -> Result<Self> {
        let origin = path.display().to_string();
        let parsed = frontmatter::parse_from(&origin, raw)?;
        let block = parsed.frontmatter.ok_or_else(|| {
            PlanningError::malformed(&origin, "no frontmatter; run `planning migrate apply` first")
        })?;
        let frontmatter = block.typed(&origin)?;
        Ok(Self {
            path: path.to_path_buf(),
            number,
            archived,
            title: extract_title(&parsed.body).unwrap_or_else(|| frontmatter.id.clone()),
            frontmatter,
            body: parsed.body,
        })
    }

    pub fn id(&self) -> &str {
        &self.frontmatter.id
    }

    pub fn doc_type(&self) -> &str {
        &self.frontmatter.doc_type
    }

    pub fn status(&self) -> &str {
        &self.frontmatter.status
    }

    pub fn addenda(&self) -> Vec<Addendum> {
        addenda::addenda(&self.body)
    }

    /// Full file contents with re-serialized frontmatter.
    pub fn render(&self) -> Result<String> {
        let block = FrontmatterBlock::from_typed(&self.frontmatter)?;
        Ok(frontmatter::render(Some(&block), &self.body))
    }
}

/// Text of the first `# ` heading.
pub fn extract_title(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
