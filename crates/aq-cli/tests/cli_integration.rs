//! Drives the built `aq` binary against a scratch database.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn aq(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_aq"))
            .arg("--db")
            .arg(self.path("aqua.db"))
            .arg("--blobs")
            .arg(self.path("blobs"))
            .args(args)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to execute aq")
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.aq(args);
        assert!(
            output.status.success(),
            "aq {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        serde_json::from_str(&self.ok(args)).unwrap()
    }

    /// Key printed by an append command.
    fn appended(&self, args: &[&str]) -> String {
        let stdout = self.ok(args);
        stdout
            .lines()
            .find(|line| line.contains('✓'))
            .and_then(|line| line.split_whitespace().last())
            .expect("no key in output")
            .to_string()
    }

    fn file_chain(&self) -> (String, String) {
        let doc = self.path("doc.txt");
        fs::write(&doc, "tenancy agreement").unwrap();
        let genesis = self.appended(&["add-file", "0xalice", doc.to_str().unwrap()]);
        let form = self.appended(&[
            "add-form",
            "0xalice",
            "--previous",
            &genesis,
            "--field",
            "title=Lease",
        ]);
        (genesis, form)
    }
}

#[test]
fn test_add_walk_and_tree() {
    let ws = Workspace::new();
    let (genesis, form) = ws.file_chain();
    assert!(genesis.starts_with("0xalice_0x"));

    let walked = ws.ok(&["walk", &form]);
    assert!(walked.contains("Revisions: 2"));
    assert!(walked.contains(&genesis));
    assert!(walked.contains("doc.txt"));

    let tree = ws.json(&["tree", &form, "--files"]);
    assert_eq!(tree["revisions"].as_object().unwrap().len(), 2);
    let genesis_hash = genesis.split_once('_').unwrap().1;
    assert_eq!(tree["file_index"][genesis_hash], "doc.txt");
    let objects = tree["fileObjects"].as_array().unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[1]["fileName"], "doc.txt.aqua.json");

    let latest = ws.ok(&["latest", "0xalice"]);
    assert!(latest.contains(&form));
}

#[test]
fn test_tree_latest_follows_descendants() {
    let ws = Workspace::new();
    let (genesis, form) = ws.file_chain();
    let from_genesis = ws.json(&["tree", &genesis, "--latest"]);
    let from_head = ws.json(&["tree", &form]);
    assert_eq!(from_genesis, from_head);
}

#[test]
fn test_link_records_target() {
    let ws = Workspace::new();
    let (_, form) = ws.file_chain();
    let other = ws.path("id.txt");
    fs::write(&other, "identity").unwrap();
    let target = ws.appended(&["add-file", "0xbob", other.to_str().unwrap()]);

    let link = ws.appended(&["link", "0xalice", "--previous", &form, &target]);
    let tree = ws.json(&["tree", &link, "--linked"]);
    let link_hash = link.split_once('_').unwrap().1;
    let target_hash = target.split_once('_').unwrap().1;
    let chains = tree["linkedChains"].as_object().unwrap();
    assert!(chains.contains_key(&format!("{link_hash}_{target_hash}")));
    assert_eq!(tree["file_index"][target_hash], "id.txt");
}

#[test]
fn test_transfer_and_merge() {
    let ws = Workspace::new();
    let (_, form) = ws.file_chain();

    let report = ws.json(&["transfer", &form, "--to", "0xbob", "--json"]);
    assert_eq!(report["transferred"].as_array().unwrap().len(), 2);
    let bob_head = report["latest"].as_str().unwrap().to_string();
    assert!(bob_head.starts_with("0xbob_"));
    assert_eq!(ws.json(&["tree", &bob_head]), ws.json(&["tree", &form]));

    let merged = ws.json(&["merge", &form, "--to", "0xbob", "--strategy", "fork", "--json"]);
    assert_eq!(merged["outcome"], "no_op");

    let merged = ws.json(&["merge", &form, "--to", "0xcarol", "--json"]);
    assert_eq!(merged["outcome"], "full_transfer");
}

#[test]
fn test_stale_expected_version_fails() {
    let ws = Workspace::new();
    let (_, form) = ws.file_chain();
    let output = ws.aq(&["transfer", &form, "--to", "0xbob", "--expect-version", "7"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("changed concurrently"));
}

#[test]
fn test_purge_and_delete_permissions() {
    let ws = Workspace::new();
    let (genesis, form) = ws.file_chain();

    let denied = ws.aq(&["delete", &form, "--actor", "0xmallory"]);
    assert!(!denied.status.success());
    assert!(String::from_utf8_lossy(&denied.stderr).contains("not allowed"));

    let report = ws.json(&["purge", &genesis, "--actor", "0xalice", "--json"]);
    assert_eq!(report["deleted"].as_array().unwrap().len(), 2);
    assert_eq!(report["freed"]["0xalice"]["files"], 1);
    assert!(ws.ok(&["latest", "0xalice"]).contains("No chains"));
}

#[test]
fn test_rejects_unqualified_key() {
    let ws = Workspace::new();
    let output = ws.aq(&["walk", "0xabc"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected owner_hash"));
}

#[test]
fn test_tag_shows_in_latest() {
    let ws = Workspace::new();
    let (genesis, form) = ws.file_chain();
    ws.ok(&["tag", &form, "--template", "aqua_sign", "--workflow"]);
    let latest = ws.ok(&["latest", "0xalice"]);
    assert!(latest.contains("[aqua_sign]"));
    assert!(latest.contains("workflow"));

    let output = ws.aq(&["tag", &genesis, "--template", "aqua_sign"]);
    assert!(!output.status.success());
}
