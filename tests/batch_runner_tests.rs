mod common;

use std::time::Duration;

use common::{Reply, TestServer, refused_url};
use getman_runner::engine::cancel::{CancelRegistry, uncancellable};
use getman_runner::store::CollectionStore;
use getman_runner::store::sqlite::SqliteStore;
use getman_runner::{
    BatchRunner, Collection, Dispatcher, EngineConfig, EngineError, HttpMethod, RequestSpec,
    RunEvent, RunSignal, TestCase, Workspace,
};
use serde_json::json;
use test_log::test;
use tokio::sync::mpsc;

async fn api() -> TestServer {
    TestServer::start(|request| match request.target.as_str() {
        "/ok" => Reply::json(200, "OK", r#"{"ok":true}"#),
        "/slow" => Reply::json(200, "OK", "{}").delayed(Duration::from_secs(5)),
        _ => Reply::json(404, "Not Found", r#"{"error":"missing"}"#),
    })
    .await
}

fn case(id: &str, url: String, expected_status: bool) -> TestCase {
    TestCase::new(id, "c1")
        .with_request(RequestSpec::new(HttpMethod::Get, url))
        .with_expected_status(expected_status)
}

async fn mixed_collection(server: &TestServer) -> Collection {
    Collection::new("c1", "Mixed")
        .with_case(case("t1", server.url("/ok"), true))
        .with_case(case("t2", refused_url().await, true))
        .with_case(case("t3", server.url("/missing"), false))
        .with_case(case("t4", server.url("/ok"), false))
}

#[test(tokio::test)]
async fn runs_every_case_and_isolates_transport_failures() {
    let server = api().await;
    let collection = mixed_collection(&server).await;
    let store = SqliteStore::open_in_memory().unwrap();
    store.create_collection(&collection).await.unwrap();
    let mut workspace = Workspace::new(vec![collection]);
    let dispatcher = Dispatcher::new(&EngineConfig::default()).unwrap();

    let report = BatchRunner::new(&dispatcher, &store)
        .run_all(&mut workspace, "c1", &mut uncancellable(), None)
        .await
        .unwrap();

    assert_eq!(report.signal, RunSignal::Completed);
    assert_eq!(report.total, 4);
    assert_eq!(report.results.len(), 4);
    let verdicts: Vec<bool> = report.results.iter().map(|run| run.passed).collect();
    assert_eq!(verdicts, vec![true, false, true, false]);
    assert_eq!((report.passed, report.failed), (2, 2));

    let failed = &report.results[1];
    assert_eq!(failed.record.status, 0);
    assert_eq!(failed.record.status_text, "Request Failed");
    assert_eq!(failed.case.result_status, Some(false));

    let not_found = &report.results[2];
    assert_eq!(not_found.record.status, 404);
    assert_eq!(not_found.case.time_taken.as_deref(), Some("0.00"));

    let in_memory = workspace.collection("c1").unwrap();
    let statuses: Vec<Option<bool>> =
        in_memory.test_cases.iter().map(|c| c.result_status).collect();
    assert_eq!(statuses, vec![Some(true), Some(false), Some(false), Some(true)]);

    let stored = store.list_collections().await.unwrap();
    assert_eq!(stored[0], *in_memory);
    assert_eq!(stored[0].test_cases[0].result_body, json!({"ok": true}));
}

#[test(tokio::test)]
async fn reports_progress_in_order() {
    let server = api().await;
    let collection = Collection::new("c1", "Two")
        .with_case(case("a", server.url("/ok"), true))
        .with_case(case("b", server.url("/ok"), true));
    let store = SqliteStore::open_in_memory().unwrap();
    store.create_collection(&collection).await.unwrap();
    let mut workspace = Workspace::new(vec![collection]);
    let dispatcher = Dispatcher::new(&EngineConfig::default()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    BatchRunner::new(&dispatcher, &store)
        .run_all(&mut workspace, "c1", &mut uncancellable(), Some(&tx))
        .await
        .unwrap();
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            RunEvent::Started {
                collection_id: "c1".into(),
                total: 2
            },
            RunEvent::CaseStarted {
                index: 0,
                case_id: "a".into()
            },
            RunEvent::CaseFinished {
                index: 0,
                case_id: "a".into(),
                passed: true
            },
            RunEvent::CaseStarted {
                index: 1,
                case_id: "b".into()
            },
            RunEvent::CaseFinished {
                index: 1,
                case_id: "b".into(),
                passed: true
            },
            RunEvent::Finished {
                signal: RunSignal::Completed
            },
        ]
    );

    // requests went out strictly one after another
    let targets: Vec<String> = server.received().into_iter().map(|r| r.target).collect();
    assert_eq!(targets, vec!["/ok", "/ok"]);
}

#[test(tokio::test)]
async fn store_failures_fail_the_run_but_keep_results() {
    let server = api().await;
    let collection = mixed_collection(&server).await;
    // nothing stored: every save_result hits a missing row
    let store = SqliteStore::open_in_memory().unwrap();
    let mut workspace = Workspace::new(vec![collection]);
    let dispatcher = Dispatcher::new(&EngineConfig::default()).unwrap();

    let report = BatchRunner::new(&dispatcher, &store)
        .run_all(&mut workspace, "c1", &mut uncancellable(), None)
        .await
        .unwrap();

    assert_eq!(report.results.len(), 4);
    match &report.signal {
        RunSignal::Failed { errors } => assert_eq!(errors.len(), 4),
        other => panic!("expected a failed run, got {other:?}"),
    }
    assert!(
        workspace.collection("c1").unwrap().test_cases.iter().all(|c| c.result_status.is_some())
    );
}

#[test(tokio::test)]
async fn cancelling_stops_before_remaining_cases() {
    let server = api().await;
    let collection = Collection::new("c1", "Slow")
        .with_case(case("fast", server.url("/ok"), true))
        .with_case(case("slow", server.url("/slow"), true))
        .with_case(case("never", server.url("/ok"), true));
    let store = SqliteStore::open_in_memory().unwrap();
    store.create_collection(&collection).await.unwrap();
    let mut workspace = Workspace::new(vec![collection]);
    let dispatcher = Dispatcher::new(&EngineConfig::default()).unwrap();

    let registry = CancelRegistry::new();
    let mut guard = registry.register("c1").unwrap();
    let runner = BatchRunner::new(&dispatcher, &store);

    let (report, _) = tokio::join!(
        runner.run_all(&mut workspace, "c1", guard.receiver(), None),
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            registry.cancel("c1")
        },
    );
    let report = report.unwrap();

    assert_eq!(report.results.len(), 1);
    assert!(matches!(report.signal, RunSignal::Failed { .. }));
    let cases = &workspace.collection("c1").unwrap().test_cases;
    assert_eq!(cases[0].result_status, Some(true));
    assert_eq!(cases[1].result_status, None);
    assert_eq!(cases[2].result_status, None);
    assert_eq!(server.received().len(), 2);
}

#[test(tokio::test)]
async fn unknown_collection_is_not_found() {
    let store = SqliteStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&EngineConfig::default()).unwrap();
    let mut workspace = Workspace::default();

    let err = BatchRunner::new(&dispatcher, &store)
        .run_all(&mut workspace, "nope", &mut uncancellable(), None)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::not_found("Collection", "nope"));
}
