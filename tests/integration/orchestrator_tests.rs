//! Orchestrator behaviour against fake fetchers and a pinned clock

use crate::common::{
    day, item_html, item_url, listing_html, listing_page_url, FakeFetcher, Harness,
    UnreadableStore, BASE,
};
use chrono::{Datelike, Duration};
use ielove_mirror::clock::ManualClock;
use ielove_mirror::crawler::{FetchError, HtmlExtractor, ItemOutcome, Orchestrator};
use ielove_mirror::queue::{SqliteTaskQueue, Task, TaskHandler};
use ielove_mirror::storage::DocumentStore;
use ielove_mirror::{ItemState, MirrorError};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_new_item_is_stored_and_rescheduled_thirty_days_out() {
    let h = Harness::new(day(1));
    h.fetcher.serve(&item_url("c1-1"), item_html("Park Heights", 120000, None));

    let outcome = h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();
    assert_eq!(
        outcome,
        ItemOutcome::Fetched {
            key: "c1-1".to_string(),
            next_eligible_at: day(1) + Duration::days(30),
        }
    );

    let record = h.store.find_item("c1-1").await.unwrap().unwrap();
    assert_eq!(record.fetched_at, day(1));
    assert_eq!(record.next_eligible_at, day(1) + Duration::days(30));
    assert_eq!(record.category, "chintai");
    assert_eq!(record.fields["name"], json!("Park Heights"));
    assert_eq!(record.fields["details"]["賃料"], json!(120000));

    let pending = h.queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task, Task::scrape_item(&item_url("c1-1")));
    assert_eq!(pending[0].not_before, day(1) + Duration::days(30));
}

#[tokio::test]
async fn test_future_hint_reschedules_one_day_after_hint() {
    let h = Harness::new(day(1));
    h.fetcher.serve(
        &item_url("c1-1"),
        item_html("Park Heights", 120000, Some("2024年6月20日")),
    );

    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();

    let record = h.store.find_item("c1-1").await.unwrap().unwrap();
    assert_eq!(record.fields["next_update"], json!("2024-06-20"));
    // Midnight JST on the 21st
    let expected = day(20) + Duration::hours(15);
    assert_eq!(record.next_eligible_at, expected);

    let pending = h.queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].not_before, expected);
}

#[tokio::test]
async fn test_elapsed_hint_falls_back_to_thirty_days() {
    let h = Harness::new(day(10));
    h.fetcher.serve(
        &item_url("c1-1"),
        item_html("Park Heights", 120000, Some("2024年6月2日")),
    );

    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();

    let record = h.store.find_item("c1-1").await.unwrap().unwrap();
    assert_eq!(record.next_eligible_at, day(10) + Duration::days(30));
}

#[tokio::test]
async fn test_far_future_hint_keeps_record_readable() {
    let h = Harness::new(day(1));
    h.fetcher.serve(
        &item_url("c1-1"),
        item_html("Park Heights", 120000, Some("10000年1月1日")),
    );

    let outcome = h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();

    let record = h.store.find_item("c1-1").await.unwrap().unwrap();
    assert!(record.next_eligible_at.year() > 9999);
    assert_eq!(
        outcome,
        ItemOutcome::Fetched {
            key: "c1-1".to_string(),
            next_eligible_at: record.next_eligible_at,
        }
    );
    assert!(!h.orchestrator.should_fetch("c1-1").await.unwrap());

    // The rest of a listing page is still fanned out
    h.fetcher
        .serve(&listing_page_url(1), listing_html(&["c1-1", "c1-2", "c1-3"]));
    let outcome = h.orchestrator.scrape_page("chintai", "tokyo", 1).await.unwrap();
    assert_eq!(outcome.items_enqueued, 2);
}

#[tokio::test]
async fn test_extreme_hint_does_not_crash_the_handler() {
    let h = Harness::new(day(1));
    h.fetcher.serve(
        &item_url("c1-1"),
        item_html("Park Heights", 120000, Some("262142年12月31日")),
    );

    let outcome = h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();
    assert!(matches!(outcome, ItemOutcome::Fetched { .. }));

    let record = h.store.find_item("c1-1").await.unwrap().unwrap();
    assert!(record.next_eligible_at >= day(1) + Duration::days(30));
    assert!(!h.orchestrator.should_fetch("c1-1").await.unwrap());
    assert_eq!(h.queue.pending().unwrap().len(), 1);
}

#[tokio::test]
async fn test_scrape_page_enqueues_past_an_unreadable_item() {
    let fetcher = Arc::new(FakeFetcher::new());
    let queue = Arc::new(SqliteTaskQueue::new_in_memory().unwrap());
    let orchestrator = Orchestrator::new(
        fetcher.clone(),
        Arc::new(HtmlExtractor::new(BASE)),
        Arc::new(UnreadableStore::new(&["c1-1"])),
        queue.clone(),
        BASE,
    )
    .with_clock(Arc::new(ManualClock::new(day(1))));

    fetcher.serve(&listing_page_url(1), listing_html(&["c1-1", "c1-2", "c1-3"]));
    let outcome = orchestrator.scrape_page("chintai", "tokyo", 1).await.unwrap();

    assert_eq!(outcome.items_seen, 3);
    assert_eq!(outcome.items_enqueued, 2);
    let tasks: Vec<Task> = queue.pending().unwrap().into_iter().map(|d| d.task).collect();
    assert_eq!(
        tasks,
        vec![
            Task::scrape_item(&item_url("c1-2")),
            Task::scrape_item(&item_url("c1-3")),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_item_task_fetches_once() {
    let h = Harness::new(day(1));
    h.fetcher.serve(&item_url("c1-1"), item_html("Park Heights", 120000, None));

    let first = h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();
    let second = h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();

    assert!(matches!(first, ItemOutcome::Fetched { .. }));
    assert!(matches!(second, ItemOutcome::Skipped { .. }));
    assert_eq!(h.fetcher.calls(), vec![item_url("c1-1")]);
    assert_eq!(h.store.count_items().await.unwrap(), 1);
    assert_eq!(h.queue.pending().unwrap().len(), 1);
}

#[tokio::test]
async fn test_should_fetch_lifecycle() {
    let h = Harness::new(day(1));
    h.fetcher.serve(&item_url("c1-1"), item_html("Park Heights", 120000, None));

    assert!(h.orchestrator.should_fetch("c1-1").await.unwrap());
    assert_eq!(
        h.orchestrator.item_state("c1-1").await.unwrap(),
        ItemState::Unseen
    );

    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();
    assert!(!h.orchestrator.should_fetch("c1-1").await.unwrap());

    h.clock.advance(Duration::days(29));
    assert!(!h.orchestrator.should_fetch("c1-1").await.unwrap());

    h.clock.advance(Duration::days(1));
    assert!(h.orchestrator.should_fetch("c1-1").await.unwrap());
    assert_eq!(
        h.orchestrator.item_state("c1-1").await.unwrap(),
        ItemState::Stale
    );
}

#[tokio::test]
async fn test_hint_tomorrow_not_due_today_due_day_after_tomorrow() {
    // Fetched on the 9th with a next update announced for the 11th
    let h = Harness::new(day(9));
    h.fetcher.serve(
        &item_url("c1-1"),
        item_html("Park Heights", 120000, Some("2024年6月11日")),
    );
    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();

    h.clock.set(day(10));
    assert!(!h.orchestrator.should_fetch("c1-1").await.unwrap());

    h.clock.set(day(12));
    assert!(h.orchestrator.should_fetch("c1-1").await.unwrap());
}

#[tokio::test]
async fn test_refetch_replaces_record() {
    let h = Harness::new(day(1));
    h.fetcher.serve(
        &item_url("c1-1"),
        item_html("Park Heights", 120000, Some("2024年6月5日")),
    );
    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();

    h.clock.set(day(6));
    h.fetcher.serve(&item_url("c1-1"), item_html("Park Heights II", 99000, None));
    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();

    let record = h.store.find_item("c1-1").await.unwrap().unwrap();
    assert_eq!(record.fetched_at, day(6));
    assert_eq!(record.fields["name"], json!("Park Heights II"));
    assert_eq!(record.fields["details"]["賃料"], json!(99000));
    assert!(record.fields.get("next_update").is_none());
    assert_eq!(record.next_eligible_at, day(6) + Duration::days(30));
}

#[tokio::test]
async fn test_scrape_page_skips_fresh_items() {
    let h = Harness::new(day(1));
    h.fetcher.serve(&item_url("c1-1"), item_html("Fresh", 100000, None));
    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();
    let before = h.queue.pending().unwrap().len();

    h.fetcher
        .serve(&listing_page_url(2), listing_html(&["c1-1", "c1-2", "c1-3"]));
    let outcome = h.orchestrator.scrape_page("chintai", "tokyo", 2).await.unwrap();

    assert_eq!(outcome.items_seen, 3);
    assert_eq!(outcome.items_enqueued, 2);

    let enqueued: Vec<Task> = h
        .queue
        .pending()
        .unwrap()
        .into_iter()
        .map(|d| d.task)
        .filter(|t| *t != Task::scrape_item(&item_url("c1-1")))
        .collect();
    assert_eq!(
        enqueued,
        vec![
            Task::scrape_item(&item_url("c1-2")),
            Task::scrape_item(&item_url("c1-3")),
        ]
    );
    assert_eq!(h.queue.pending().unwrap().len(), before + 2);

    let page = h
        .store
        .find_page("chintai", "tokyo", 2)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(page.fetched_at, day(1));
    let keys: Vec<&str> = page.items.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["c1-1", "c1-2", "c1-3"]);
}

#[tokio::test]
async fn test_scrape_page_enqueues_stale_items() {
    let h = Harness::new(day(1));
    h.fetcher.serve(&item_url("c1-1"), item_html("Old", 100000, None));
    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();

    h.clock.advance(Duration::days(31));
    h.fetcher.serve(&listing_page_url(1), listing_html(&["c1-1"]));
    let outcome = h.orchestrator.scrape_page("chintai", "tokyo", 1).await.unwrap();

    assert_eq!(outcome.items_enqueued, 1);
}

#[tokio::test]
async fn test_region_sweep_is_bounded_by_limit() {
    let h = Harness::new(day(1));
    h.fetcher.set_page_count(Ok(12));

    let outcome = h
        .orchestrator
        .scrape_region("tokyo", "chintai", 5)
        .await
        .unwrap();
    assert_eq!(outcome.page_count, Some(12));
    assert_eq!(outcome.pages_enqueued, 5);

    let tasks: Vec<Task> = h.queue.pending().unwrap().into_iter().map(|d| d.task).collect();
    let expected: Vec<Task> = (1..=5)
        .map(|i| Task::scrape_page("chintai", "tokyo", i))
        .collect();
    assert_eq!(tasks, expected);
    assert!(h
        .queue
        .pending()
        .unwrap()
        .iter()
        .all(|d| d.not_before == day(1)));
}

#[tokio::test]
async fn test_region_sweep_with_fewer_pages_than_limit() {
    let h = Harness::new(day(1));
    h.fetcher.set_page_count(Ok(3));

    let outcome = h
        .orchestrator
        .scrape_region("tokyo", "chintai", 50)
        .await
        .unwrap();
    assert_eq!(outcome.pages_enqueued, 3);
    assert_eq!(h.queue.pending().unwrap().len(), 3);
}

#[tokio::test]
async fn test_region_sweep_falls_back_to_limit_when_count_fails() {
    let h = Harness::new(day(1));
    h.fetcher.set_page_count(Err(FetchError::transient(
        &listing_page_url(1),
        "request timeout",
    )));

    let outcome = h
        .orchestrator
        .scrape_region("tokyo", "chintai", 4)
        .await
        .unwrap();
    assert_eq!(outcome.page_count, None);
    assert_eq!(outcome.pages_enqueued, 4);
    assert_eq!(h.queue.pending().unwrap().len(), 4);
}

#[tokio::test]
async fn test_unknown_region_enqueues_nothing() {
    let h = Harness::new(day(1));

    let err = h
        .orchestrator
        .scrape_region("atlantis", "chintai", 5)
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::UnknownTarget { kind: "region", .. }));
    assert!(h.queue.pending().unwrap().is_empty());
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_transient_failure_leaves_store_and_queue_untouched() {
    let h = Harness::new(day(1));
    h.fetcher.serve(&item_url("c1-1"), item_html("Before", 100000, None));
    h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap();
    let before = h.store.find_item("c1-1").await.unwrap().unwrap();
    let pending_before = h.queue.pending().unwrap();

    h.clock.advance(Duration::days(30));
    h.fetcher.fail(
        &item_url("c1-1"),
        FetchError::transient(&item_url("c1-1"), "HTTP 503"),
    );

    let err = h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap_err();
    assert!(matches!(err, MirrorError::Fetch(ref e) if e.is_transient()));

    let after = h.store.find_item("c1-1").await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(h.queue.pending().unwrap(), pending_before);
    assert_eq!(
        h.orchestrator.item_state("c1-1").await.unwrap(),
        ItemState::Stale
    );
}

#[tokio::test]
async fn test_extraction_failure_stores_nothing() {
    let h = Harness::new(day(1));
    h.fetcher
        .serve(&item_url("c1-1"), "<html><body>Under maintenance</body></html>");

    let err = h.orchestrator.scrape_item(&item_url("c1-1")).await.unwrap_err();
    assert!(matches!(err, MirrorError::Extract(_)));
    assert!(h.store.find_item("c1-1").await.unwrap().is_none());
    assert!(h.queue.pending().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_listing_page_records_nothing() {
    let h = Harness::new(day(1));
    h.fetcher.fail(
        &listing_page_url(1),
        FetchError::transient(&listing_page_url(1), "HTTP 502"),
    );

    assert!(h.orchestrator.scrape_page("chintai", "tokyo", 1).await.is_err());
    assert!(h
        .store
        .find_page("chintai", "tokyo", 1)
        .await
        .unwrap()
        .is_none());
    assert!(h.queue.pending().unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_swallows_failures() {
    let h = Harness::new(day(1));
    h.fetcher.fail(
        &item_url("c1-1"),
        FetchError::permanent(&item_url("c1-1"), "HTTP 410"),
    );

    // Neither panics nor leaves anything behind
    h.orchestrator
        .handle(Task::scrape_item(&item_url("c1-1")))
        .await;
    h.orchestrator
        .handle(Task::scrape_region("atlantis", "chintai", 3))
        .await;

    assert!(h.queue.pending().unwrap().is_empty());
    assert_eq!(h.store.count_items().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_enqueues_one_region_task_per_target() {
    let h = Harness::new(day(1));

    let count = h
        .orchestrator
        .sweep(Some("tokyo"), None, 7)
        .await
        .unwrap();
    assert_eq!(count, h.orchestrator.catalog().categories().len());

    let pending = h.queue.pending().unwrap();
    assert_eq!(pending.len(), count);
    assert!(pending.iter().all(|d| matches!(
        &d.task,
        Task::ScrapeRegion { region, limit: 7, .. } if region == "tokyo"
    )));

    assert!(h.orchestrator.sweep(None, Some("castle"), 7).await.is_err());
}
