//! Page and session teardown on every exit path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_settings, page_html, registry, MockProvider, Script};
use egress_scraper::Scraper;

/// Scrape a US target whose preferred attempt follows `script` and whose
/// baseline attempt fails unscripted, then check teardown counts.
async fn assert_single_teardown(script: Script, expect_page: bool) {
    let provider = MockProvider::new(vec![script]);
    let scraper = common::scraper(&provider, &[]);

    let _ = scraper.scrape("example.com").await;

    // The preferred attempt consumed the script; the baseline runs unscripted
    assert_eq!(provider.opened(), 2);
    assert_eq!(provider.closed(), 2, "every session closed exactly once");
    let pages = if expect_page { 2 } else { 1 };
    assert_eq!(provider.pages_opened(), pages);
    assert_eq!(provider.pages_closed(), pages, "every page closed exactly once");
}

#[tokio::test]
async fn test_teardown_when_page_cannot_open() {
    assert_single_teardown(Script::FailNewPage, false).await;
}

#[tokio::test]
async fn test_teardown_when_configure_fails() {
    assert_single_teardown(Script::FailConfigure, true).await;
}

#[tokio::test]
async fn test_teardown_when_navigation_fails() {
    assert_single_teardown(Script::FailNavigate("reset".into()), true).await;
}

#[tokio::test]
async fn test_teardown_when_content_is_short() {
    assert_single_teardown(Script::ShortHtml, true).await;
}

#[tokio::test]
async fn test_teardown_on_success() {
    let provider = MockProvider::new(vec![Script::ok(page_html("Example", "ok"))]);
    let scraper = common::scraper(&provider, &[]);

    scraper.scrape("example.com").await.unwrap();

    assert_eq!(provider.opened(), 1);
    assert_eq!(provider.closed(), 1);
    assert_eq!(provider.pages_closed(), 1);
}

#[tokio::test]
async fn test_page_closed_before_session() {
    let provider = MockProvider::new(vec![
        Script::FailNavigate("reset".into()),
        Script::ok(page_html("Example", "ok")),
    ]);
    let scraper = common::scraper(&provider, &[]);

    scraper.scrape("example.com").await.unwrap();

    assert_eq!(
        provider.events(),
        vec![
            "mock-0 page closed",
            "mock-0 session closed",
            "mock-1 page closed",
            "mock-1 session closed",
        ]
    );
}

#[tokio::test]
async fn test_navigation_timeout_tears_down() {
    let provider = MockProvider::new(vec![
        Script::HangNavigate,
        Script::ok(page_html("Example", "ok")),
    ]);
    let settings = egress_scraper::SessionSettings {
        navigation_timeout_secs: 1,
        ..fast_settings()
    };
    let scraper = Scraper::new(provider.clone(), registry(&[]), settings);

    let result = scraper.scrape("example.com").await.unwrap();

    assert_eq!(result.metadata.status_code, 200);
    assert_eq!(provider.closed(), 2);
    assert_eq!(provider.pages_closed(), 2);
}

#[tokio::test]
async fn test_cancelled_scrape_releases_session() {
    let provider = MockProvider::new(vec![Script::HangNavigate]);
    let scraper = Arc::new(common::scraper(&provider, &[]));

    let task = {
        let scraper = scraper.clone();
        tokio::spawn(async move { scraper.scrape("example.com").await })
    };

    wait_for(|| provider.pages_opened() == 1).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    wait_for(|| provider.closed() == 1 && provider.pages_closed() == 1).await;
    assert_eq!(provider.opened(), 1);
    assert_eq!(
        provider.events(),
        vec!["mock-0 page closed", "mock-0 session closed"],
        "background teardown closes the page before the session"
    );
    assert_eq!(scraper.stats().sessions_opened, 1);
}

async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
