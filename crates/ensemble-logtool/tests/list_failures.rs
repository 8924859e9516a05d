use std::fs;
use std::path::Path;

use ensemble_logtool::cluster::Cluster;
use ensemble_logtool::error::ErrorKind;
use ensemble_logtool::keys::EnsembleId;
use ensemble_logtool::ops;
use ensemble_logtool::process::shell_word;

fn write_cluster(tmp: &Path) -> std::path::PathBuf {
    let cluster_file = tmp.join("cluster.toml");
    fs::write(
        &cluster_file,
        r#"
[store]
kind = "local"
root = "blobs"

[feed]
kind = "local"
root = "results"
"#,
    )
    .expect("cluster file");
    fs::create_dir_all(tmp.join("results")).expect("results dir");
    cluster_file
}

fn record(sequence: u64, exit_code: i32, harness_output: &str) -> String {
    serde_json::json!({
        "sequence": sequence,
        "host": "agent-1",
        "exit_code": exit_code,
        "harness_output": harness_output,
    })
    .to_string()
}

fn ensemble(id: &str) -> EnsembleId {
    EnsembleId::parse(id).expect("ensemble")
}

#[test]
fn lists_one_reference_per_failed_test_with_uid() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cluster_file = write_cluster(tmp.path());
    let lines = [
        record(1, 0, r#"<Test TestUID="aaaa-0001" Ok="1"/>"#),
        record(2, 1, r#"<Test TestUID="1ad90d42-824b-4693-aacf-53de3a6ccd27" Ok="0"/>"#),
        String::new(),
        record(3, 1, "segfault before the harness printed anything"),
        record(4, 2, r#"<Test testuid="BEEF-02" Ok="0"/>"#),
    ];
    fs::write(tmp.path().join("results/E1.jsonl"), lines.join("\n")).expect("feed");

    let cluster = Cluster::open(Some(cluster_file.as_path())).expect("open");
    let refs: Vec<String> = ops::list(&cluster, ensemble("E1"))
        .expect("list")
        .map(|r| r.expect("ref").to_string())
        .collect();

    let prefix = format!(
        "logtool --cluster-file {}",
        shell_word(&cluster_file.display().to_string())
    );
    assert_eq!(
        refs,
        vec![
            format!(
                "{prefix} download --ensemble-id E1 --test-uid 1ad90d42-824b-4693-aacf-53de3a6ccd27"
            ),
            format!("{prefix} download --ensemble-id E1 --test-uid BEEF-02"),
        ]
    );
}

#[test]
fn ensemble_without_results_lists_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cluster_file = write_cluster(tmp.path());
    let cluster = Cluster::open(Some(cluster_file.as_path())).expect("open");
    assert_eq!(ops::list(&cluster, ensemble("E9")).expect("list").count(), 0);
}

#[test]
fn malformed_feed_line_surfaces_as_feed_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cluster_file = write_cluster(tmp.path());
    let lines = [
        record(1, 1, r#"<Test TestUID="abcd-1"/>"#),
        "{not json".to_string(),
    ];
    fs::write(tmp.path().join("results/E1.jsonl"), lines.join("\n")).expect("feed");

    let cluster = Cluster::open(Some(cluster_file.as_path())).expect("open");
    let items: Vec<_> = ops::list(&cluster, ensemble("E1")).expect("list").collect();
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].as_ref().expect("first ok").test_uid.as_str(),
        "abcd-1"
    );
    let err = items[1].as_ref().expect_err("bad line");
    assert_eq!(err.kind(), ErrorKind::Feed);
}
