//! End-to-end orchestrator behaviour against a scripted network.
//!
//! Covers the four outcomes of a fetch:
//! 1. Fresh cache hit, no network at all
//! 2. Live fetch, primary first, fallbacks in order
//! 3. Every source failed, expired entry served as Stale
//! 4. Every source failed and nothing cached, Failed

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{chain, secs, source, RecordingSleeper, Reply, ScriptedTransport};
use marketfeed_core::{
    CacheStore, ContentCheck, FetchConfig, FetchError, FetchOptions, FetchOutcome, Orchestrator,
    Payload, RetryPolicy, SeriesKey,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

struct Harness {
    orchestrator: Orchestrator,
    transport: Arc<ScriptedTransport>,
    sleeper: Arc<RecordingSleeper>,
}

fn harness(dir: &Path, transport: ScriptedTransport) -> Harness {
    let transport = Arc::new(transport);
    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = Orchestrator::new(FetchConfig::new(dir), transport.clone(), sleeper.clone());
    Harness {
        orchestrator,
        transport,
        sleeper,
    }
}

/// Write a record by hand, as an earlier run would have left it.
fn write_record(store: &CacheStore, key: &SeriesKey, source: &str, age: ChronoDuration) {
    std::fs::create_dir_all(store.cache_dir()).unwrap();
    let record = serde_json::json!({
        "key": key.as_str(),
        "payload": {"close": [101.5, 102.25]},
        "fetched_at": (Utc::now() - age).to_rfc3339(),
        "source": source,
    });
    std::fs::write(store.entry_path(key), record.to_string()).unwrap();
}

#[test]
fn fresh_entry_is_served_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), ScriptedTransport::new());
    let key = SeriesKey::new("DGS10");
    write_record(h.orchestrator.store(), &key, "fred_graph", ChronoDuration::minutes(30));

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![source("primary")]),
        &FetchOptions::new(HOUR),
    );

    match outcome {
        FetchOutcome::Fresh(entry) => assert_eq!(entry.source, "fred_graph"),
        other => panic!("expected Fresh, got {other:?}"),
    }
    assert_eq!(h.transport.call_count(), 0);
}

#[test]
fn primary_outage_falls_back_to_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new()
        .on("primary", vec![Reply::Status(503)])
        .on("mirror", vec![Reply::Status(200)]);
    let h = harness(dir.path(), transport);
    let key = SeriesKey::new("DGS10");

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![source("primary"), source("mirror")]),
        &FetchOptions::new(HOUR).with_retry(RetryPolicy::from_secs(3, &[1, 2, 4]).unwrap()),
    );

    match &outcome {
        FetchOutcome::Fresh(entry) => assert_eq!(entry.source, "mirror"),
        other => panic!("expected Fresh, got {other:?}"),
    }
    assert_eq!(
        h.transport.calls(),
        vec!["primary", "primary", "primary", "mirror"]
    );
    assert_eq!(h.sleeper.slept(), secs(&[1, 2]));
    assert_eq!(h.sleeper.total(), Duration::from_secs(3));

    let cached = h.orchestrator.store().get(&key).unwrap();
    assert_eq!(cached.source, "mirror");
    assert!(CacheStore::is_fresh(&cached, HOUR));
}

#[test]
fn live_fetch_is_cached_for_the_next_call() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedTransport::new().on("primary", vec![Reply::Status(200)]),
    );
    let key = SeriesKey::new("^TNX");
    let sources = chain(vec![source("primary")]);
    let options = FetchOptions::new(HOUR);

    let first = h.orchestrator.fetch(&key, &sources, &options);
    let second = h.orchestrator.fetch(&key, &sources, &options);

    assert_eq!(first.entry(), second.entry());
    assert_eq!(h.transport.call_count(), 1);
}

#[test]
fn expired_entry_is_returned_as_stale_when_all_sources_fail() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new()
        .on("primary", vec![Reply::Status(503)])
        .on("mirror", vec![Reply::Timeout]);
    let h = harness(dir.path(), transport);
    let key = SeriesKey::new("JGB10Y");
    write_record(h.orchestrator.store(), &key, "mof_jgbcm", ChronoDuration::days(3));
    let before = std::fs::read(h.orchestrator.store().entry_path(&key)).unwrap();

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![source("primary"), source("mirror")]),
        &FetchOptions::new(HOUR).with_retry(RetryPolicy::from_secs(2, &[1]).unwrap()),
    );

    match &outcome {
        FetchOutcome::Stale { entry, reason } => {
            assert_eq!(entry.source, "mof_jgbcm");
            assert!(entry.age() >= Duration::from_secs(3 * 86_400 - 60));
            assert!(reason.starts_with("all sources failed, returning expired cache"));
            assert!(reason.contains("mirror"));
        }
        other => panic!("expected Stale, got {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.summary_line(Utc::now()).starts_with("STALE JGB10Y via mof_jgbcm (age 3d"));

    // A failed fetch never touches the existing record.
    let after = std::fs::read(h.orchestrator.store().entry_path(&key)).unwrap();
    assert_eq!(before, after);
    assert_eq!(h.transport.call_count(), 4);
}

#[test]
fn nothing_cached_and_all_sources_down_is_failed() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedTransport::new()
            .on("primary", vec![Reply::Status(500)])
            .on("mirror", vec![Reply::Status(404)]),
    );
    let key = SeriesKey::new("WASDE-2024-06");

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![source("primary"), source("mirror")]),
        &FetchOptions::new(HOUR).with_retry(RetryPolicy::from_secs(3, &[1, 2]).unwrap()),
    );

    match &outcome {
        FetchOutcome::Failed {
            error:
                FetchError::ChainExhausted {
                    last_source,
                    attempts,
                    ..
                },
        } => {
            assert_eq!(last_source, "mirror");
            // Three on the primary, one on the mirror (404 is permanent).
            assert_eq!(*attempts, 4);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.entry().is_none());
    assert!(!h.orchestrator.store().entry_path(&key).exists());
}

#[test]
fn empty_chain_with_nothing_cached_is_failed() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), ScriptedTransport::new());
    let key = SeriesKey::new("DGS10");

    let outcome = h
        .orchestrator
        .fetch(&key, &chain(vec![]), &FetchOptions::new(HOUR));

    assert!(matches!(
        outcome,
        FetchOutcome::Failed {
            error: FetchError::EmptyChain { .. }
        }
    ));
    assert_eq!(h.transport.call_count(), 0);
}

#[test]
fn corrupt_record_is_replaced_by_live_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedTransport::new().on("primary", vec![Reply::Status(200)]),
    );
    let key = SeriesKey::new("DGS10");
    let path = h.orchestrator.store().entry_path(&key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"{\"key\": \"DGS10\", \"payl").unwrap();

    let outcome = h
        .orchestrator
        .fetch(&key, &chain(vec![source("primary")]), &FetchOptions::new(HOUR));

    assert!(matches!(outcome, FetchOutcome::Fresh(_)));
    let repaired = h.orchestrator.store().get(&key).unwrap();
    assert_eq!(repaired.source, "primary");
}

#[test]
fn corrupt_record_and_all_sources_down_is_failed() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), ScriptedTransport::new());
    let key = SeriesKey::new("DGS10");
    let path = h.orchestrator.store().entry_path(&key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"not json").unwrap();

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![source("primary")]),
        &FetchOptions::new(HOUR).with_retry(RetryPolicy::no_retry()),
    );

    assert!(matches!(outcome, FetchOutcome::Failed { .. }));
}

#[test]
fn rejected_content_is_retried_then_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let pdf: &'static [u8] = b"%PDF-1.7 world agricultural supply and demand estimates ........";
    let h = harness(
        dir.path(),
        ScriptedTransport::new()
            .on("usda", vec![Reply::Body(b"<html>maintenance</html>")])
            .on("mirror", vec![Reply::Body(pdf)]),
    );
    let key = SeriesKey::new("2024-06");
    let check = ContentCheck::Pdf { min_bytes: 32 };

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![
            source("usda").with_check(check.clone()),
            source("mirror").with_check(check),
        ]),
        &FetchOptions::new(HOUR).with_retry(RetryPolicy::from_secs(2, &[5]).unwrap()),
    );

    let entry = outcome.into_entry().unwrap();
    assert_eq!(entry.source, "mirror");
    assert_eq!(entry.payload, Payload::Bytes(pdf.to_vec()));
    assert_eq!(h.transport.calls(), vec!["usda", "usda", "mirror"]);
    assert_eq!(h.sleeper.slept(), secs(&[5]));

    // Binary payloads survive the trip through the cache file.
    let cached = h.orchestrator.store().get(&key).unwrap();
    assert_eq!(cached.payload.as_bytes(), Some(pdf));
}

#[test]
fn timeout_then_success_stays_on_the_same_source() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedTransport::new().on("primary", vec![Reply::Timeout, Reply::Status(200)]),
    );

    let outcome = h.orchestrator.fetch(
        &SeriesKey::new("DGS10"),
        &chain(vec![source("primary"), source("mirror")]),
        &FetchOptions::new(HOUR),
    );

    assert_eq!(outcome.entry().unwrap().source, "primary");
    assert_eq!(h.transport.calls(), vec!["primary", "primary"]);
    assert_eq!(h.sleeper.slept(), secs(&[1]));
}

#[test]
fn proxy_source_is_visible_in_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedTransport::new()
            .on("mof", vec![Reply::Status(404)])
            .on("yahoo_tnx", vec![Reply::Status(200)]),
    );
    let key = SeriesKey::new("JGB10Y");

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![
            source("mof"),
            source("yahoo_tnx").proxying("JGB 10Y via US 10Y"),
        ]),
        &FetchOptions::new(HOUR),
    );

    assert_eq!(outcome.proxied_for(), Some("JGB 10Y via US 10Y"));
    assert!(outcome
        .summary_line(Utc::now())
        .contains("[PROXY for JGB 10Y via US 10Y]"));

    // The marker is persisted and survives a cache hit.
    let again = h.orchestrator.fetch(&key, &chain(vec![source("mof")]), &FetchOptions::new(HOUR));
    assert_eq!(again.proxied_for(), Some("JGB 10Y via US 10Y"));
    assert_eq!(h.transport.call_count(), 2);
}

#[test]
fn unwritable_cache_still_returns_fresh_data() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the cache directory should be.
    let blocked = dir.path().join("cache");
    std::fs::write(&blocked, b"").unwrap();
    let h = harness(
        &blocked,
        ScriptedTransport::new().on("primary", vec![Reply::Status(200)]),
    );
    let key = SeriesKey::new("DGS10");

    let outcome = h
        .orchestrator
        .fetch(&key, &chain(vec![source("primary")]), &FetchOptions::new(HOUR));

    match outcome {
        FetchOutcome::Fresh(entry) => assert_eq!(entry.source, "primary"),
        other => panic!("expected Fresh, got {other:?}"),
    }
    assert!(h.orchestrator.store().get(&key).is_none());
}

#[test]
fn zero_max_age_always_refetches() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedTransport::new().on("primary", vec![Reply::Status(200)]),
    );
    let key = SeriesKey::new("DGS10");
    write_record(h.orchestrator.store(), &key, "old", ChronoDuration::seconds(1));

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![source("primary")]),
        &FetchOptions::new(Duration::ZERO),
    );

    assert_eq!(outcome.entry().unwrap().source, "primary");
    assert_eq!(h.transport.call_count(), 1);
}

#[test]
fn long_key_is_cached_and_served_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedTransport::new().on("primary", vec![Reply::Status(200)]),
    );
    let key = SeriesKey::new(format!(
        "https://www.example.org/reports/{}.pdf",
        "k".repeat(250)
    ));
    let sources = chain(vec![source("primary")]);
    let options = FetchOptions::new(HOUR);

    let first = h.orchestrator.fetch(&key, &sources, &options);
    let second = h.orchestrator.fetch(&key, &sources, &options);

    assert!(matches!(first, FetchOutcome::Fresh(_)));
    assert!(matches!(second, FetchOutcome::Fresh(_)));
    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(h.orchestrator.store().get(&key).unwrap().key, key);
}

#[test]
fn forced_refresh_failure_keeps_unexpired_entry_without_calling_it_expired() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), ScriptedTransport::new());
    let key = SeriesKey::new("DGS10");
    write_record(h.orchestrator.store(), &key, "fred_graph", ChronoDuration::minutes(5));

    let outcome = h.orchestrator.fetch(
        &key,
        &chain(vec![source("primary")]),
        &FetchOptions::new(HOUR)
            .with_retry(RetryPolicy::no_retry())
            .forced(true),
    );

    match outcome {
        FetchOutcome::Stale { entry, reason } => {
            assert_eq!(entry.source, "fred_graph");
            assert!(reason.starts_with("all sources failed, returning cached entry"));
            assert!(!reason.contains("expired"));
        }
        other => panic!("expected Stale, got {other:?}"),
    }
}
