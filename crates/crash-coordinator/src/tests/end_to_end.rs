//! A dump left by a crashed session is delivered on the next start with the
//! scope that session cached, exactly once.

use super::harness::{wait_for, TestHarness};
use crash_protocol_types::{Breadcrumb, Scope, User};

fn crashed_session_scope() -> Scope {
    let mut scope = Scope::default();
    scope.user = Some(User {
        id: Some("user-42".into()),
        email: Some("ada@example.com".into()),
        ..Default::default()
    });
    scope.set_tag("release", "3.1.0");
    scope.add_breadcrumb(Breadcrumb::new("opened settings"), 10);
    scope
}

#[tokio::test]
async fn cached_scope_and_dump_are_delivered_once() {
    let harness = TestHarness::new();
    harness.seed_scope(crashed_session_scope());
    let dump = harness.write_dump("0001-renderer.dmp", b"MDMP\x93\xa7");

    let coordinator = harness.start().unwrap();

    assert!(wait_for(|| !dump.exists()).await, "startup flush should deliver the dump");

    let uploads = harness.transport.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].file_name, "0001-renderer.dmp");
    assert_eq!(uploads[0].bytes, b"MDMP\x93\xa7");
    let sidecar = &uploads[0].sidecar;
    assert_eq!(sidecar["user"]["id"], "user-42");
    assert_eq!(sidecar["tags"]["release"], "3.1.0");
    assert_eq!(sidecar["breadcrumbs"]["values"][0]["message"], "opened settings");

    let ledger = harness.ledger_json();
    assert!(ledger["uploaded"]["0001-renderer.dmp"].is_string());

    // A later dump reusing the name is still treated as handled.
    harness.write_dump("0001-renderer.dmp", b"MDMP\x93\xa7");
    let summary = coordinator.flush_now().await.unwrap();
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.delivered, 0);
    assert_eq!(harness.transport.upload_count(), 1);
    assert!(harness.ledger_json()["uploaded"]["0001-renderer.dmp"].is_string());

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn dumps_are_sent_in_lexical_order() {
    let harness = TestHarness::new();
    for name in ["c.dmp", "a.dmp", "b.dmp"] {
        harness.write_dump(name, b"MDMP");
    }

    let coordinator = harness.start().unwrap();
    assert!(wait_for(|| harness.transport.upload_count() == 3).await);

    let names: Vec<_> = harness
        .transport
        .uploads()
        .into_iter()
        .map(|upload| upload.file_name)
        .collect();
    assert_eq!(names, vec!["a.dmp", "b.dmp", "c.dmp"]);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_upload_is_retried_after_restart() {
    let harness = TestHarness::new();
    harness.transport.answer_with(503);
    let dump = harness.write_dump("a.dmp", b"MDMP");

    let first = harness.start().unwrap();
    assert!(wait_for(|| harness.transport.upload_count() == 1).await);
    first.shutdown().await.unwrap();
    assert!(dump.exists(), "a 5xx keeps the dump pending");

    let second = harness.start().unwrap();
    assert!(wait_for(|| !dump.exists()).await);
    assert_eq!(harness.transport.upload_count(), 2);
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejected_dump_is_archived_and_not_resent() {
    let harness = TestHarness::new();
    harness.transport.answer_with(400);
    let dump = harness.write_dump("bad.dmp", b"not a minidump");

    let coordinator = harness.start().unwrap();
    let archived = harness.crash_dir().join("rejected").join("bad.dmp");
    assert!(wait_for(|| archived.exists()).await);
    assert!(!dump.exists());
    coordinator.shutdown().await.unwrap();

    let restarted = harness.start().unwrap();
    let summary = restarted.flush_now().await.unwrap();
    assert_eq!(summary.discovered, 0);
    assert_eq!(harness.transport.upload_count(), 1);
    restarted.shutdown().await.unwrap();
}

#[tokio::test]
async fn without_ingestion_key_dumps_stay_on_disk() {
    let harness = TestHarness::new();
    let dump = harness.write_dump("a.dmp", b"MDMP");

    let coordinator = harness.start_without_uploads().unwrap();
    let summary = coordinator.flush_now().await.unwrap();

    assert_eq!(summary.remaining, 1);
    assert_eq!(summary.delivered, 0);
    assert!(dump.exists());
    assert_eq!(harness.transport.upload_count(), 0);

    coordinator.shutdown().await.unwrap();
}
