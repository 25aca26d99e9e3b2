#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn planning(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("planning").unwrap();
    cmd.current_dir(dir.path())
        .env("CLAUDE_PROJECT_DIR", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    planning(dir).arg("init").assert().success();
}

fn json_of(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.arg("--json").output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

fn read(dir: &TempDir, rel: &str) -> String {
    std::fs::read_to_string(dir.path().join(rel)).unwrap()
}

fn write(dir: &TempDir, rel: &str, text: &str) {
    let path = dir.path().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

// ---------------------------------------------------------------------------
// planning init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_and_type_dirs() {
    let dir = TempDir::new().unwrap();
    planning(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .claude/vibe-hacker.json"));

    assert!(dir.path().join(".claude/vibe-hacker.json").is_file());
    for sub in ["decisions", "designs", "action-plans", "reports"] {
        assert!(dir.path().join("docs/planning").join(sub).is_dir(), "{sub}");
    }
    let cfg: serde_json::Value =
        serde_json::from_str(&read(&dir, ".claude/vibe-hacker.json")).unwrap();
    assert_eq!(cfg["planning"]["version"], "0.2.1");
}

#[test]
fn init_is_idempotent_and_keeps_config() {
    let dir = TempDir::new().unwrap();
    write(&dir, ".claude/vibe-hacker.json", "{\"hooks\": {\"x\": 1}}\n");
    planning(&dir).arg("init").assert().success();
    planning(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .claude/vibe-hacker.json"));
    assert_eq!(read(&dir, ".claude/vibe-hacker.json"), "{\"hooks\": {\"x\": 1}}\n");
}

// ---------------------------------------------------------------------------
// planning new / list / show
// ---------------------------------------------------------------------------

#[test]
fn new_creates_numbered_documents() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    planning(&dir)
        .args(["new", "adr", "Use event sourcing"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Created ADR-001: docs/planning/decisions/001-use-event-sourcing.md",
        ));
    planning(&dir)
        .args(["new", "fdp", "User Authentication"])
        .assert()
        .success()
        .stdout(predicate::str::contains("FDP-001-user-authentication.md"));

    let text = read(&dir, "docs/planning/decisions/001-use-event-sourcing.md");
    assert!(text.starts_with("---\ntype: adr\nid: ADR-001\nstatus: proposed\n"));
    assert!(text.contains("# ADR-001: Use event sourcing"));

    let doc = json_of(planning(&dir).args(["new", "adr", "Second"]));
    assert_eq!(doc["id"], "ADR-002");
    assert_eq!(doc["status"], "proposed");
}

#[test]
fn new_unknown_type_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir)
        .args(["new", "rfc", "Nope"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown document type 'rfc'"));
}

#[test]
fn list_filters_and_outputs_json() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir).args(["new", "adr", "One"]).assert().success();
    planning(&dir).args(["new", "ap", "Two"]).assert().success();

    planning(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("ADR-001"))
        .stdout(predicate::str::contains("AP-001"));

    let docs = json_of(planning(&dir).args(["list", "--type", "ap"]));
    let docs = docs.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], "AP-001");
    assert_eq!(docs[0]["status"], "active");
}

#[test]
fn show_missing_document_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir)
        .args(["show", "ADR-042"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("document not found: ADR-042"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn status_rejects_values_outside_vocabulary() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir).args(["new", "adr", "X"]).assert().success();
    planning(&dir)
        .args(["status", "ADR-001", "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("valid statuses"));
    planning(&dir)
        .args(["status", "adr-001", "Accepted"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ADR-001: proposed -> accepted"));
    assert!(read(&dir, "docs/planning/decisions/001-x.md").contains("## Status\n\nAccepted"));
}

#[test]
fn locked_documents_block_edits_but_accept_addenda() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir).args(["new", "adr", "Use X"]).assert().success();
    planning(&dir)
        .args(["edit", "ADR-001", "--quiet"])
        .assert()
        .success()
        .stdout("docs/planning/decisions/001-use-x.md\n");

    planning(&dir).args(["status", "ADR-001", "accepted"]).assert().success();
    planning(&dir)
        .args(["edit", "ADR-001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot edit ADR-001"))
        .stderr(predicate::str::contains("addendum"));
    planning(&dir)
        .args(["edit", "ADR-001", "--force"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning: editing anyway"));

    let path = "docs/planning/decisions/001-use-x.md";
    let before = read(&dir, path);
    planning(&dir)
        .args(["append", "ADR-001", "Clarification", "--body", "Applies to writes only."])
        .assert()
        .success();
    let after = read(&dir, path);
    let before_body = before.split_once("\n---\n").unwrap().1;
    assert!(after.contains(before_body.trim_end()));
    assert!(after.contains(": Clarification\n\nApplies to writes only.\n"));

    let shown = json_of(planning(&dir).args(["show", "ADR-001"]));
    assert_eq!(shown["addenda"].as_array().unwrap().len(), 1);
}

#[test]
fn adr_supersede_and_archive_scenario() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir).args(["new", "adr", "Use X"]).assert().success();
    planning(&dir).args(["status", "ADR-001", "accepted"]).assert().success();
    planning(&dir)
        .args(["supersede", "ADR-001", "Use Y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ADR-001 is now superseded by ADR-002"));

    let old = json_of(planning(&dir).args(["show", "ADR-001"]));
    assert_eq!(old["status"], "superseded");
    assert_eq!(old["superseded_by"], "ADR-002");
    let new = json_of(planning(&dir).args(["show", "ADR-002"]));
    assert_eq!(new["supersedes"], "ADR-001");

    planning(&dir)
        .args(["supersede", "ADR-001", "Use Z"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already superseded by ADR-002"));

    planning(&dir).args(["archive", "ADR-001"]).assert().success();
    let archived = "docs/planning/decisions/archive/001-use-x.md";
    assert!(dir.path().join(archived).is_file());
    assert!(!dir.path().join("docs/planning/decisions/001-use-x.md").exists());
    assert!(read(&dir, archived).contains("archived: "));

    planning(&dir)
        .args(["check-path", archived])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("blocked (readonly)"));

    planning(&dir)
        .args(["new", "adr", "Use Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ADR-003"));
}

#[test]
fn archive_requires_trigger_status() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir).args(["new", "fdp", "Login"]).assert().success();
    planning(&dir)
        .args(["archive", "FDP-001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an archive trigger"))
        .stderr(predicate::str::contains("--force"));
    planning(&dir).args(["archive", "FDP-001", "--force"]).assert().success();
    planning(&dir)
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No documents."));
    planning(&dir)
        .args(["list", "--include-archived"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(archived)"));
}

#[test]
fn relate_bidirectional_is_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir).args(["new", "fdp", "Login"]).assert().success();
    planning(&dir).args(["new", "adr", "Auth"]).assert().success();
    planning(&dir).args(["new", "ap", "Build"]).assert().success();

    let fdp = "docs/planning/designs/FDP-001-login.md";
    let before = read(&dir, fdp);
    planning(&dir)
        .args(["relate", "FDP-001", "ADR-001", "ADR-404", "--bidirectional"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ADR-404"));
    assert_eq!(read(&dir, fdp), before);

    let out = json_of(planning(&dir).args([
        "relate",
        "fdp-001",
        "adr-001",
        "AP-001",
        "--bidirectional",
    ]));
    assert_eq!(out["added"], serde_json::json!(["ADR-001", "AP-001"]));

    let adr = json_of(planning(&dir).args(["show", "ADR-001"]));
    assert_eq!(adr["related"], serde_json::json!(["FDP-001"]));
    let fdp_doc = json_of(planning(&dir).args(["show", "FDP-001"]));
    assert_eq!(fdp_doc["related"], serde_json::json!(["ADR-001", "AP-001"]));
}

#[test]
fn roadmap_needs_force_to_overwrite() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir).arg("roadmap").assert().success();
    assert!(read(&dir, "docs/planning/roadmap.md").starts_with("# Roadmap"));
    planning(&dir)
        .arg("roadmap")
        .assert()
        .failure()
        .stderr(predicate::str::contains("roadmap already exists"));
    planning(&dir).args(["roadmap", "--force"]).assert().success();
}

// ---------------------------------------------------------------------------
// planning check-path
// ---------------------------------------------------------------------------

#[test]
fn check_path_applies_first_matching_rule() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        ".claude/vibe-hacker.json",
        r#"{"protected_paths": {"rules": [
            {"pattern": "docs/**/*.md", "tier": "remind", "message": "Docs are reviewed weekly"},
            {"pattern": "docs/legal/**", "tier": "readonly", "message": "Legal text"},
            {"pattern": "CHANGELOG.md", "tier": "guided", "message": "Generated", "skill": "release"}
        ]}}"#,
    );

    planning(&dir)
        .args(["check-path", "docs/legal/terms.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reminder: Docs are reviewed weekly"));
    planning(&dir)
        .args(["check-path", "./CHANGELOG.md"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("release workflow"));
    planning(&dir)
        .args(["check-path", "src/main.rs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not protected"));

    let abs = dir.path().join("docs/legal/LICENSE");
    let out = planning(&dir)
        .args(["--json", "check-path"])
        .arg(&abs)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["path"], "docs/legal/LICENSE");
    assert_eq!(value["tier"], "readonly");
    assert_eq!(value["allowed"], false);
}

#[test]
fn check_path_sees_through_dot_segments_and_a_relative_root() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir).args(["new", "adr", "Use X"]).assert().success();
    planning(&dir).args(["status", "ADR-001", "accepted"]).assert().success();
    planning(&dir).args(["archive", "ADR-001"]).assert().success();
    let archived = "docs/planning/decisions/archive/001-use-x.md";

    planning(&dir)
        .args(["check-path", "src/../docs/planning/decisions/archive/001-use-x.md"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("blocked (readonly)"));

    planning(&dir)
        .env("CLAUDE_PROJECT_DIR", ".")
        .arg("check-path")
        .arg(dir.path().join(archived))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("blocked (readonly)"));

    planning(&dir)
        .args(["check-path", "../elsewhere/notes.md"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("climbs out of the project root"));
}

// ---------------------------------------------------------------------------
// planning migrate
// ---------------------------------------------------------------------------

fn legacy_project(dir: &TempDir) {
    write(dir, ".claude/vibe-hacker.json", "{\"planning\": {\"subdirs\": {\"adr\": \"decision-records\"}}}\n");
    write(
        dir,
        "docs/planning/decision-records/001-use-postgres.md",
        "# ADR-001: Use Postgres\n\n## Status\n\nAccepted\n\n## Date\n\n2023-05-01\n",
    );
    write(dir, "docs/planning/designs/FDP-001-search.md", "# FDP-001: Search\n");
    write(dir, "docs/planning/roadmap.md", "# Roadmap\n");
}

#[test]
fn migrate_status_plan_and_apply() {
    let dir = TempDir::new().unwrap();
    legacy_project(&dir);

    planning(&dir)
        .args(["migrate", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current version: 0.1.0"))
        .stdout(predicate::str::contains("0.2.0 -> 0.2.1"));

    let before = read(&dir, "docs/planning/decision-records/001-use-postgres.md");
    planning(&dir)
        .args(["migrate", "plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add frontmatter as ADR-001"));
    assert_eq!(read(&dir, "docs/planning/decision-records/001-use-postgres.md"), before);

    planning(&dir)
        .args(["migrate", "apply"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Migrated 0.1.0 -> 0.2.1"));

    let adr = json_of(planning(&dir).args(["show", "ADR-001"]));
    assert_eq!(adr["status"], "accepted");
    assert_eq!(adr["created"], "2023-05-01");
    let fdp = json_of(planning(&dir).args(["show", "FDP-001"]));
    assert_eq!(fdp["status"], "proposed");
    assert_eq!(read(&dir, "docs/planning/roadmap.md"), "# Roadmap\n");

    let cfg: serde_json::Value =
        serde_json::from_str(&read(&dir, ".claude/vibe-hacker.json")).unwrap();
    assert_eq!(cfg["planning"]["version"], "0.2.1");
    assert_eq!(cfg["planning"]["types"]["adr"]["dir"], "decision-records");
    assert!(cfg["planning"].get("subdirs").is_none());

    planning(&dir)
        .args(["migrate", "apply"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to do"));
}

#[test]
fn migrate_flags_unknown_status_and_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    legacy_project(&dir);
    let odd = "docs/planning/decision-records/002-odd.md";
    write(&dir, odd, "# ADR-002\n\n## Status\n\nMaybe\n");

    planning(&dir)
        .args(["migrate", "apply"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("review:"))
        .stderr(predicate::str::contains("need review"));
    assert_eq!(read(&dir, odd), "# ADR-002\n\n## Status\n\nMaybe\n");

    planning(&dir)
        .args(["migrate", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current version: 0.2.0"));
}

#[test]
fn migrate_changelog_lists_versions() {
    let dir = TempDir::new().unwrap();
    planning(&dir)
        .args(["migrate", "changelog"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.2.0"))
        .stdout(predicate::str::contains("0.2.1 [BREAKING]"));
}

#[test]
fn migrate_rejects_unknown_target() {
    let dir = TempDir::new().unwrap();
    planning(&dir)
        .args(["migrate", "plan", "--to", "not-a-version"])
        .assert()
        .failure();
    planning(&dir)
        .args(["migrate", "plan", "--to", "3.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("latest known version"));
}

// ---------------------------------------------------------------------------
// planning config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    planning(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));

    write(
        &dir,
        ".claude/vibe-hacker.json",
        r#"{"protected_paths": {"rules": [{"pattern": "src/[oops", "tier": "readonly", "message": "x"}]}}"#,
    );
    planning(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, ".claude/vibe-hacker.json", "{ not json");
    planning(&dir)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error: failed to load config"));
}

#[test]
fn config_types_shows_custom_types() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        ".claude/vibe-hacker.json",
        r#"{"planning": {"types": {"rfc": {
            "name": "Request for Comments", "dir": "rfcs", "prefix": "RFC-",
            "filename_format": "RFC-{number:03d}-{slug}.md", "id_format": "RFC-{number:03d}",
            "statuses": {"initial": "draft", "editable": ["draft"], "final": ["accepted"], "archive_triggers": ["withdrawn"]}
        }}}}"#,
    );
    planning(&dir)
        .args(["config", "types"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RFC-001"));
    planning(&dir)
        .args(["new", "rfc", "Streaming API"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docs/planning/rfcs/RFC-001-streaming-api.md"));
    assert!(Path::new(&dir.path().join("docs/planning/rfcs/RFC-001-streaming-api.md")).is_file());
}
