//! Host registry membership and fleet operations

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{wait_for_output, MockTransport, RecordingLayout};
use ht_core::error::{ConfigError, HtError, SessionError};
use ht_core::types::TerminalSize;
use ht_engine::{ConnectionManager, HostRegistry, SessionState};

fn registry(
    transport: &MockTransport,
    layout: &Arc<RecordingLayout>,
    log_dir: &std::path::Path,
) -> HostRegistry<MockTransport> {
    HostRegistry::new(
        Arc::new(ConnectionManager::new(transport.clone())),
        layout.clone(),
        log_dir,
        TerminalSize::default(),
    )
}

#[tokio::test]
async fn test_add_list_get() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    let web = hosts.add_host("bastion/web", "web").await.unwrap();
    hosts.add_host("bastion/db", "db").await.unwrap();
    hosts.add_host("cache", "cache").await.unwrap();

    assert!(web.is_connected());
    assert_eq!(hosts.len(), 3);
    assert_eq!(hosts.titles(), vec!["web", "db", "cache"]);
    let listed: Vec<String> = hosts
        .list_hosts()
        .iter()
        .map(|s| s.title().to_string())
        .collect();
    assert_eq!(listed, vec!["web", "db", "cache"]);

    assert!(Arc::ptr_eq(&hosts.get_host("web").unwrap(), &web));
    assert!(hosts.get_host("nope").is_none());

    assert_eq!(
        layout.reflows(),
        vec![
            vec!["web".to_string()],
            vec!["web".to_string(), "db".to_string()],
            vec!["web".to_string(), "db".to_string(), "cache".to_string()],
        ]
    );

    // bastion was dialed once for both hosts behind it
    assert_eq!(transport.state.events_starting_with("dial"), vec!["dial bastion:22", "dial cache:22"]);
}

#[tokio::test]
async fn test_duplicate_title_is_rejected_without_change() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    let original = hosts.add_host("a", "web").await.unwrap();
    transport.state.clear();

    let err = hosts.add_host("b", "web").await.unwrap_err();
    assert!(matches!(err, HtError::Session(SessionError::AlreadyExists(_))));

    assert_eq!(hosts.len(), 1);
    assert!(Arc::ptr_eq(&hosts.get_host("web").unwrap(), &original));
    assert_eq!(layout.reflows().len(), 1);
    assert!(transport.state.events().is_empty());
}

#[tokio::test]
async fn test_titles_sharing_a_log_file_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    let first = hosts.add_host("a/b", "a/b").await.unwrap();
    transport.state.clear();

    let err = hosts.add_host("a_b", "a_b").await.unwrap_err();
    match err {
        HtError::Session(SessionError::LogInUse { title, holder, file }) => {
            assert_eq!(title, "a_b");
            assert_eq!(holder, "a/b");
            assert_eq!(file, "a_b.log");
        }
        other => panic!("expected LogInUse, got {:?}", other),
    }
    assert_eq!(hosts.titles(), vec!["a/b"]);
    assert!(transport.state.events().is_empty());

    // the first host's transcript is untouched
    first.run("echo first-host-output", None).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(first.log_path()).unwrap(),
        "first-host-output\r\n"
    );

    // once the holder is gone the name is free again
    hosts.remove_host("a/b").await.unwrap();
    let second = hosts.add_host("a_b", "a_b").await.unwrap();
    second.run("echo 2nd", None).await.unwrap();
    assert_eq!(std::fs::read_to_string(second.log_path()).unwrap(), "2nd\r\n");
}

#[tokio::test]
async fn test_malformed_chain_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    let err = hosts.add_host("", "empty").await.unwrap_err();
    assert!(matches!(err, HtError::Config(ConfigError::InvalidChain(_))));
    assert!(hosts.is_empty());
    assert!(layout.pane("empty").is_none());
}

#[tokio::test]
async fn test_connection_failure_registers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    transport.fail_host("down");
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    let err = hosts.add_host("jump/down", "down").await.unwrap_err();
    match err {
        HtError::Connection(e) => assert_eq!(e.failing_prefix(), Some("jump:22/down:22")),
        other => panic!("unexpected error {:?}", other),
    }

    assert!(hosts.is_empty());
    assert!(layout.reflows().is_empty());
    assert_eq!(layout.closed(), vec!["down"]);

    // the title is free again once the host comes back
    transport.heal_host("down");
    hosts.add_host("jump/down", "down").await.unwrap();
    assert_eq!(hosts.titles(), vec!["down"]);
}

#[tokio::test]
async fn test_remove_absent_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());
    hosts.add_host("a", "a").await.unwrap();

    hosts.remove_host("missing").await.unwrap();

    assert_eq!(hosts.len(), 1);
    assert_eq!(layout.reflows().len(), 1);
    assert!(layout.closed().is_empty());
}

#[tokio::test]
async fn test_remove_then_add_gives_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    let old = hosts.add_host("a/web", "web").await.unwrap();
    old.run("echo first", None).await.unwrap();

    hosts.remove_host("web").await.unwrap();
    assert_eq!(old.state(), SessionState::Closed);
    assert!(hosts.get_host("web").is_none());
    assert_eq!(layout.last_reflow(), Some(vec![]));
    assert_eq!(layout.closed(), vec!["web"]);

    let fresh = hosts.add_host("a/web", "web").await.unwrap();
    assert!(!Arc::ptr_eq(&old, &fresh));
    assert_eq!(fresh.state(), SessionState::Idle);

    // new log replaces the old transcript
    fresh.run("echo second", None).await.unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("web.log")).unwrap(),
        b"second\r\n".to_vec()
    );
}

#[tokio::test]
async fn test_remove_cancels_running_command() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    let session = hosts.add_host("a", "tail").await.unwrap();
    let running = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run("stream", None).await })
    };
    wait_for_output(&layout.pane("tail").unwrap(), 10).await;

    tokio::time::timeout(Duration::from_secs(1), hosts.remove_host("tail"))
        .await
        .expect("remove blocked on a running command")
        .unwrap();

    assert!(running.await.unwrap().unwrap().cancelled);
    assert!(hosts.is_empty());
}

#[tokio::test]
async fn test_run_all_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    hosts.add_host("j/web-1", "web-1").await.unwrap();
    hosts.add_host("j/noexec-1", "broken").await.unwrap();
    hosts.add_host("j/web-2", "web-2").await.unwrap();

    let results = hosts.run_all("hostname").await;
    let titles: Vec<&str> = results.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(titles, vec!["web-1", "broken", "web-2"]);

    assert!(results[0].1.is_ok());
    assert!(matches!(results[1].1, Err(SessionError::Exec(_))));
    assert!(results[2].1.is_ok());

    assert_eq!(layout.pane("web-1").unwrap().text(), "web-1\r\n");
    assert_eq!(layout.pane("web-2").unwrap().text(), "web-2\r\n");
}

#[tokio::test]
async fn test_run_all_runs_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = registry(&transport, &layout, dir.path());

    for i in 0..4 {
        hosts.add_host(&format!("h{}", i), &format!("h{}", i)).await.unwrap();
    }

    let started = tokio::time::Instant::now();
    let results = hosts.run_all("slow 100 done").await;
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert!(started.elapsed() < Duration::from_millis(350));
}

#[tokio::test]
async fn test_cancel_all_and_remove_all() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let layout = Arc::new(RecordingLayout::default());
    let hosts = Arc::new(registry(&transport, &layout, dir.path()));

    hosts.add_host("a", "a").await.unwrap();
    hosts.add_host("b", "b").await.unwrap();

    let broadcast = {
        let hosts = Arc::clone(&hosts);
        tokio::spawn(async move { hosts.run_all("stream").await })
    };
    wait_for_output(&layout.pane("a").unwrap(), 10).await;
    wait_for_output(&layout.pane("b").unwrap(), 10).await;

    hosts.cancel_all().await;
    for session in hosts.list_hosts() {
        assert_eq!(session.state(), SessionState::Idle);
    }
    let results = broadcast.await.unwrap();
    assert!(results.iter().all(|(_, r)| r.as_ref().unwrap().cancelled));

    hosts.remove_all().await;
    assert!(hosts.is_empty());
    assert_eq!(layout.last_reflow(), Some(vec![]));
    assert_eq!(layout.closed(), vec!["a", "b"]);
}
