use crate::pattern::{self, Pattern};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Block the edit unconditionally.
    Readonly,
    /// Block the edit and point at the workflow that should be used instead.
    Guided,
    /// Allow the edit with a notice.
    Remind,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Readonly => "readonly",
            Tier::Guided => "guided",
            Tier::Remind => "remind",
        }
    }

    pub fn blocks(self) -> bool {
        !matches!(self, Tier::Remind)
    }

    /// Whether a rule with an unparsable pattern should still apply.
    /// Blocking tiers fail closed, reminders fail open.
    fn fails_closed(self) -> bool {
        self.blocks()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProtectionRule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionRule {
    pub pattern: String,
    pub tier: Tier,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
}

impl ProtectionRule {
    pub fn new(pattern: impl Into<String>, tier: Tier, message: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            tier,
            message: message.into(),
            skill: None,
        }
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = Some(skill.into());
        self
    }

    /// The implicit rule covering archived planning documents.
    pub fn archived(planning_root: &str) -> Self {
        let root = planning_root.trim_end_matches('/');
        Self::new(
            format!("{root}/**/archive/**"),
            Tier::Readonly,
            "Archived planning documents are read-only historical records. Append an addendum instead.",
        )
    }

    fn matches(&self, path: &str) -> bool {
        match Pattern::compile(&self.pattern) {
            Ok(p) => p.is_match(path),
            Err(e) => {
                let applies = self.tier.fails_closed();
                tracing::warn!(
                    pattern = %self.pattern,
                    tier = %self.tier,
                    applies,
                    "invalid protection pattern: {e}"
                );
                applies
            }
        }
    }
}

/// First rule (in declaration order) whose pattern matches `path`.
pub fn resolve<'a>(path: &str, rules: &'a [ProtectionRule]) -> Option<&'a ProtectionRule> {
    let path = pattern::normalize(path);
    rules.iter().find(|r| r.matches(&path))
}

// ---------------------------------------------------------------------------
// PathCheck
// ---------------------------------------------------------------------------

/// Outcome of an edit-protection check, shaped for a hook response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathCheck {
    pub path: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl PathCheck {
    pub fn unprotected(path: &str) -> Self {
        Self {
            path: path.to_string(),
            allowed: true,
            tier: None,
            message: None,
            skill: None,
            pattern: None,
        }
    }

    fn from_rule(path: &str, rule: &ProtectionRule) -> Self {
        Self {
            path: path.to_string(),
            allowed: !rule.tier.blocks(),
            tier: Some(rule.tier),
            message: Some(rule.message.clone()),
            skill: rule.skill.clone(),
            pattern: Some(rule.pattern.clone()),
        }
    }

    /// Denial for a path that uses `..` to leave the project root. Rules
    /// cannot be evaluated for it, so it is treated as read-only.
    pub fn escaping(path: &str) -> Self {
        Self {
            path: path.to_string(),
            allowed: false,
            tier: Some(Tier::Readonly),
            message: Some(
                "Path climbs out of the project root; refer to the file by its location inside the project."
                    .to_string(),
            ),
            skill: None,
            pattern: None,
        }
    }

    /// Human-readable explanation: why the path is protected and what to do.
    pub fn reason(&self) -> Option<String> {
        let tier = self.tier?;
        let message = self.message.as_deref().unwrap_or_default();
        let Some(pattern) = self.pattern.as_deref() else {
            return Some(message.trim().to_string());
        };
        let text = match tier {
            Tier::Readonly => format!("{message} (read-only: matched '{pattern}')"),
            Tier::Guided => match &self.skill {
                Some(skill) => format!(
                    "{message} (guided: matched '{pattern}'). Use the {skill} workflow instead of editing directly."
                ),
                None => format!("{message} (guided: matched '{pattern}')"),
            },
            Tier::Remind => message.to_string(),
        };
        Some(text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Configured rules plus the implicit archive rule for one planning root.
#[derive(Debug, Clone)]
pub struct RuleSet {
    archived: ProtectionRule,
    rules: Vec<ProtectionRule>,
}

impl RuleSet {
    pub fn new(planning_root: &str, rules: Vec<ProtectionRule>) -> Self {
        Self {
            archived: ProtectionRule::archived(planning_root),
            rules,
        }
    }

    /// Resolve `path` (relative to the project root). The archive rule wins
    /// over every configured rule.
    pub fn resolve(&self, path: &str) -> Option<&ProtectionRule> {
        if self.archived.matches(&pattern::normalize(path)) {
            return Some(&self.archived);
        }
        resolve(path, &self.rules)
    }

    pub fn check(&self, path: &str) -> PathCheck {
        let path = pattern::normalize(path);
        match self.resolve(&path) {
            Some(rule) => PathCheck::from_rule(&path, rule),
            None => PathCheck::unprotected(&path),
        }
    }
}
