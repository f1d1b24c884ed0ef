//! End-to-end sweep through the worker pool against a wiremock site

use crate::http_tests::test_fetcher;
use chrono::Utc;
use ielove_mirror::crawler::{HtmlExtractor, Orchestrator};
use ielove_mirror::queue::{
    KindLimiters, SqliteTaskQueue, Task, TaskKind, WorkerOptions, WorkerPool,
};
use ielove_mirror::storage::{DocumentStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/chintai/tokyo/result/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
              <form id="pagerParams"><input type="hidden" name="pref" value="tokyo"></form>
              <a class="result-panel-room__inner" href="/chintai/c1-1/">one</a>
              <a class="result-panel-room__inner" href="/chintai/c1-2/">two</a>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/bkn/ajax/count/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "pcPager": "<ul><li>1</li></ul>" })),
        )
        .mount(server)
        .await;

    for key in ["c1-1", "c1-2"] {
        Mock::given(method("GET"))
            .and(path(format!("/chintai/{}/", key)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><body>
                  <h1 class="detail-summary__tatemononame">Room {}</h1>
                  <div class="detail-bkninfo__block"><dl>
                    <dt class="detail-bkninfo__head">賃料</dt>
                    <dd class="detail-bkninfo__txt">80000</dd>
                  </dl></div>
                </body></html>"#,
                key
            )))
            .expect(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_sweep_mirrors_listing_and_schedules_refresh() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(&dir.path().join("items.db")).unwrap());
    let queue = Arc::new(SqliteTaskQueue::new(&dir.path().join("queue.db")).unwrap());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(test_fetcher(&server)),
        Arc::new(HtmlExtractor::new(server.uri())),
        store.clone(),
        queue.clone(),
        server.uri(),
    ));
    orchestrator
        .sweep(Some("tokyo"), Some("chintai"), 3)
        .await
        .unwrap();

    let pool = WorkerPool::new(
        queue.clone(),
        orchestrator.clone(),
        KindLimiters::unlimited(),
        WorkerOptions {
            workers: 2,
            poll_interval: Duration::from_millis(20),
        },
    );
    tokio::time::timeout(Duration::from_secs(30), pool.run_until_idle())
        .await
        .expect("pool did not go idle");

    assert_eq!(store.count_items().await.unwrap(), 2);
    let page = store
        .find_page("chintai", "tokyo", 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(page.items.len(), 2);

    // Only the two refresh tasks remain, a month out
    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 2);
    for delivery in &pending {
        assert!(matches!(delivery.task, Task::ScrapeItem { .. }));
        assert!(delivery.not_before > Utc::now() + chrono::Duration::days(29));
    }

    let stats = pool.statistics();
    assert_eq!(stats.claimed(), 4);
    assert_eq!(stats.claimed_of(TaskKind::ScrapeItem), 2);
    assert_eq!(stats.panicked(), 0);
}
