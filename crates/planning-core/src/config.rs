use crate::doctype::{self, DocumentTypeDefinition, TypeRegistry};
use crate::error::Result;
use crate::paths;
use crate::pattern::Pattern;
use crate::protection::{ProtectionRule, RuleSet, Tier};
use crate::version::SchemaVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProtectedPaths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtectedPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_root: Option<String>,
    #[serde(default)]
    pub rules: Vec<ProtectionRule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// PlanningConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<SchemaVersion>,
    /// Fallback location of the planning root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Legacy per-type directory overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subdirs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<BTreeMap<String, DocumentTypeDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Project configuration stored in `.claude/vibe-hacker.json`.
///
/// Keys this crate does not know about are kept in `extra` maps so that a
/// load/save cycle leaves other tools' settings untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub protected_paths: ProtectedPaths,
    #[serde(default)]
    pub planning: PlanningConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    /// Config written by `init`: current schema version plus a guided rule
    /// routing planning edits through the planning workflow.
    pub fn initial(version: SchemaVersion) -> Self {
        let mut cfg = Config::default();
        cfg.protected_paths.planning_root = Some(paths::DEFAULT_PLANNING_ROOT.to_string());
        cfg.protected_paths.rules.push(
            ProtectionRule::new(
                format!("{}/**", paths::DEFAULT_PLANNING_ROOT),
                Tier::Guided,
                "Planning documents have a managed lifecycle.",
            )
            .with_skill("planning"),
        );
        cfg.planning.version = Some(version);
        cfg
    }

    /// Load the project config. A missing file yields the default config.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let mut data = serde_json::to_string_pretty(self)?;
        data.push('\n');
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn exists(root: &Path) -> bool {
        paths::config_path(root).exists()
    }

    /// `protected_paths.planning_root`, then `planning.root`, then the default.
    pub fn planning_root(&self) -> &str {
        self.protected_paths
            .planning_root
            .as_deref()
            .or(self.planning.root.as_deref())
            .map(|r| r.trim_end_matches('/'))
            .filter(|r| !r.is_empty())
            .unwrap_or(paths::DEFAULT_PLANNING_ROOT)
    }

    pub fn version(&self) -> SchemaVersion {
        self.planning.version.unwrap_or(SchemaVersion::INITIAL)
    }

    pub fn templates_dir(&self, root: &Path) -> Option<PathBuf> {
        self.planning.templates_dir.as_ref().map(|d| root.join(d))
    }

    /// Effective document types: defaults, overridden per key by
    /// `planning.types`, with legacy `subdirs` applied to default types only.
    pub fn registry(&self) -> TypeRegistry {
        let mut types = doctype::default_types();
        for (key, dir) in &self.planning.subdirs {
            if let Some(def) = types.get_mut(key) {
                def.dir = dir.clone();
            }
        }
        if let Some(configured) = &self.planning.types {
            for (key, def) in configured {
                types.insert(key.to_lowercase(), def.clone());
            }
        }
        TypeRegistry::new(types)
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet::new(self.planning_root(), self.protected_paths.rules.clone())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let warn = |level: WarnLevel, message: String| ConfigWarning { level, message };

        for (i, rule) in self.protected_paths.rules.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                warnings.push(warn(
                    WarnLevel::Error,
                    format!("protected_paths.rules[{i}] has an empty pattern"),
                ));
            } else if let Err(e) = Pattern::compile(&rule.pattern) {
                let effect = if rule.tier.blocks() {
                    "it blocks every path"
                } else {
                    "it never matches"
                };
                warnings.push(warn(
                    WarnLevel::Error,
                    format!("protected_paths.rules[{i}]: {e}; {effect}"),
                ));
            }
            if rule.tier == Tier::Guided && rule.skill.is_none() {
                warnings.push(warn(
                    WarnLevel::Warning,
                    format!(
                        "protected_paths.rules[{i}] ('{}') is guided but names no skill",
                        rule.pattern
                    ),
                ));
            }
            if rule.message.trim().is_empty() {
                warnings.push(warn(
                    WarnLevel::Warning,
                    format!("protected_paths.rules[{i}] ('{}') has no message", rule.pattern),
                ));
            }
        }

        for key in self.planning.subdirs.keys() {
            if !doctype::default_types().contains_key(key) {
                warnings.push(warn(
                    WarnLevel::Warning,
                    format!("planning.subdirs.{key} does not name a built-in type and is ignored"),
                ));
            }
        }

        let registry = self.registry();
        let mut prefixes: HashMap<String, String> = HashMap::new();
        let mut dirs: HashMap<String, String> = HashMap::new();
        for def in registry.iter() {
            let statuses = &def.statuses;
            if !statuses.is_editable(&statuses.initial) {
                warnings.push(warn(
                    WarnLevel::Warning,
                    format!(
                        "type '{}': initial status '{}' is not editable, new documents start locked",
                        def.key, statuses.initial
                    ),
                ));
            }
            if !def.id_format.contains("{number") || !def.filename_format.contains("{number") {
                warnings.push(warn(
                    WarnLevel::Error,
                    format!("type '{}': id_format and filename_format must contain {{number}}", def.key),
                ));
            }
            let id_prefix = def.format_id(0).trim_end_matches('0').to_uppercase();
            if let Some(other) = prefixes.insert(id_prefix.clone(), def.key.clone()) {
                warnings.push(warn(
                    WarnLevel::Error,
                    format!(
                        "types '{other}' and '{}' share the id prefix '{id_prefix}'",
                        def.key
                    ),
                ));
            }
            if let Some(other) = dirs.insert(def.dir.clone(), def.key.clone()) {
                warnings.push(warn(
                    WarnLevel::Error,
                    format!("types '{other}' and '{}' share the directory '{}'", def.key, def.dir),
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
