use std::path::Path;

use assert_cmd::Command;
use clickpace::{store::keys, KeyValueStore, SqliteStore};

fn clickpace(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("clickpace").unwrap();
    cmd.arg("--db")
        .arg(dir.join("state.db"))
        .arg("--config")
        .arg(dir.join("config.json"))
        .env("CLICKPACE_LOG", "off");
    cmd
}

fn stdout(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{output:?}");
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn cached_listing_and_finish_by_path() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = SqliteStore::open(dir.path().join("state.db")).unwrap();
        store
            .set(
                keys::TASK_LIST,
                r#"[{"href":"https://host/v2/task/7/queue/","title":"Street signs"},
                    {"href":"https://host/v2/task/8/queue/","title":"Shop fronts"}]"#,
            )
            .unwrap();
    }

    let listed = stdout(clickpace(dir.path()).args(["tasks", "--cached"]));
    assert_eq!(listed.lines().count(), 2);
    assert!(listed.contains("https://host/v2/task/7/queue/\tStreet signs"));

    let done = stdout(clickpace(dir.path()).args(["finish", "/v2/task/7/queue/continue/"]));
    assert!(done.contains("marked finished"));
    let again = stdout(clickpace(dir.path()).args(["finish", "7"]));
    assert!(again.contains("already finished"));

    let listed = stdout(clickpace(dir.path()).args(["tasks", "--cached"]));
    assert_eq!(listed.trim(), "https://host/v2/task/8/queue/\tShop fronts");
}

#[test]
fn cached_listing_of_a_fresh_database_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let listed = stdout(clickpace(dir.path()).args(["tasks", "--cached"]));
    assert!(listed.is_empty());
}
