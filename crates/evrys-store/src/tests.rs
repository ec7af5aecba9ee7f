//! Unit tests for the store capabilities and backends.

use chrono::{DateTime, Duration, TimeZone, Utc};
use evrys_db::DbRuntimeSettings;
use evrys_types::{Data, Event};
use mongodb::bson::{doc, oid::ObjectId, Bson};
use serde_json::json;
use tempfile::TempDir;
use tracing::Span;

use crate::document::{from_document, slice_filter, to_document};
use crate::*;

/// Opens a SQLite store in a fresh temporary directory.
fn sqlite_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("events.db");
    let store = SqliteStore::open(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
        Span::none(),
    )
    .expect("store should open");
    (dir, store)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn at(id: &str, offset_secs: i64) -> Event {
    Event::new(id, "https://example.com/src", "com.example.thing")
        .with_time(t0() + Duration::seconds(offset_secs))
}

fn full_event() -> Event {
    Event::new("evt-full", "https://example.com/orders", "com.example.order.created")
        .with_subject("orders/42")
        .with_time(t0())
        .with_data("application/json", Data::Json(json!({"total": 12.5, "items": [1, 2]})))
}

fn ids(page: &EventPage) -> Vec<&str> {
    page.events.iter().map(|e| e.id.as_str()).collect()
}

// ── cursor ───────────────────────────────────────────────────────────

#[test]
fn cursor_token_is_opaque_and_reversible() {
    let cursor = Cursor {
        until: "2024-03-01T12:00:00.000000000Z".to_string(),
        time: "2024-03-01T11:00:00.000000000Z".to_string(),
        position: "17".to_string(),
        horizon: "42".to_string(),
    };
    let token = cursor.encode();
    assert!(token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    assert_eq!(Cursor::decode(&token).unwrap(), cursor);
}

#[test]
fn garbage_cursor_is_rejected() {
    for token in ["***", "bm90IGpzb24", ""] {
        assert!(
            matches!(Cursor::decode(token), Err(StoreError::InvalidCursor(_))),
            "{token:?}"
        );
    }
}

#[test]
fn slice_limit_defaults_and_caps() {
    let mut req = SliceRequest::default();
    assert_eq!(req.effective_limit(), DEFAULT_PAGE_SIZE);
    req.limit = 7;
    assert_eq!(req.effective_limit(), 7);
    req.limit = 50_000;
    assert_eq!(req.effective_limit(), MAX_PAGE_SIZE);
}

#[test]
fn transient_classification() {
    let boxed = || -> BoxError { "boom".into() };
    assert!(StoreError::Connection { backend: "x", source: boxed() }.is_transient());
    assert!(StoreError::Put { backend: "x", source: boxed() }.is_transient());
    assert!(StoreError::Query { backend: "x", source: boxed() }.is_transient());
    assert!(!StoreError::Marshal { from: "a", to: "b", source: boxed() }.is_transient());
    assert!(!StoreError::NotFound { id: "a".into() }.is_transient());
    assert!(!StoreError::InvalidCursor("x".into()).is_transient());
}

// ── sqlite: append / get_by_id ───────────────────────────────────────

#[tokio::test]
async fn sqlite_round_trip_preserves_attributes() {
    let (_dir, store) = sqlite_store();
    let event = full_event();

    store.append(&event).await.expect("append should succeed");
    let fetched = store.get_by_id("evt-full").await.expect("event should exist");

    assert_eq!(fetched, event);
}

#[tokio::test]
async fn sqlite_round_trip_binary_payload() {
    let (_dir, store) = sqlite_store();
    let event = Event::new("bin", "s", "t")
        .with_data("application/octet-stream", Data::Binary(vec![0, 159, 146, 150]));

    store.append(&event).await.expect("append should succeed");
    assert_eq!(store.get_by_id("bin").await.unwrap(), event);
}

#[tokio::test]
async fn sqlite_get_by_id_on_empty_store_is_not_found() {
    let (_dir, store) = sqlite_store();
    match store.get_by_id("nope").await {
        Err(StoreError::NotFound { id }) => assert_eq!(id, "nope"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn sqlite_duplicate_ids_return_earliest() {
    let (_dir, store) = sqlite_store();
    store.append(&Event::new("dup", "first", "t")).await.unwrap();
    store.append(&Event::new("dup", "second", "t")).await.unwrap();

    assert_eq!(store.get_by_id("dup").await.unwrap().source, "first");
}

// ── sqlite: events_before ────────────────────────────────────────────

#[tokio::test]
async fn slice_orders_by_time_then_insertion() {
    let (_dir, store) = sqlite_store();
    for event in [at("c", 20), at("a", 0), at("b1", 10), at("b2", 10)] {
        store.append(&event).await.unwrap();
    }

    let page = store
        .events_before(t0() + Duration::hours(1), &SliceRequest::default())
        .await
        .unwrap();

    assert_eq!(ids(&page), ["a", "b1", "b2", "c"]);
    assert!(page.cursor.is_none(), "no cursor when nothing remains");
}

#[tokio::test]
async fn slice_upper_bound_is_inclusive_and_skips_untimed_events() {
    let (_dir, store) = sqlite_store();
    store.append(&at("before", -1)).await.unwrap();
    store.append(&at("exact", 0)).await.unwrap();
    store.append(&at("after", 1)).await.unwrap();
    store.append(&Event::new("untimed", "s", "t")).await.unwrap();

    let page = store
        .events_before(t0(), &SliceRequest::default())
        .await
        .unwrap();

    assert_eq!(ids(&page), ["before", "exact"]);
}

#[tokio::test]
async fn slice_on_empty_store_is_empty() {
    let (_dir, store) = sqlite_store();
    let page = store
        .events_before(Utc::now(), &SliceRequest::default())
        .await
        .unwrap();
    assert!(page.events.is_empty());
    assert!(page.cursor.is_none());
}

#[tokio::test]
async fn slice_pages_forward_with_cursor() {
    let (_dir, store) = sqlite_store();
    for i in 0..5 {
        store.append(&at(&format!("e{i}"), i)).await.unwrap();
    }
    let until = t0() + Duration::hours(1);

    let mut request = SliceRequest {
        limit: 2,
        ..SliceRequest::default()
    };
    let mut seen = Vec::new();
    let mut pages = 0;
    loop {
        let page = store.events_before(until, &request).await.unwrap();
        pages += 1;
        seen.extend(ids(&page).into_iter().map(str::to_string));
        match page.cursor {
            Some(cursor) => request.cursor = Some(cursor),
            None => break,
        }
    }

    assert_eq!(seen, ["e0", "e1", "e2", "e3", "e4"]);
    assert_eq!(pages, 3);
}

#[tokio::test]
async fn slice_cursor_is_absent_when_page_is_exactly_full() {
    let (_dir, store) = sqlite_store();
    store.append(&at("a", 0)).await.unwrap();
    store.append(&at("b", 1)).await.unwrap();

    let request = SliceRequest {
        limit: 2,
        ..SliceRequest::default()
    };
    let page = store.events_before(t0() + Duration::hours(1), &request).await.unwrap();
    assert_eq!(ids(&page), ["a", "b"]);
    assert!(page.cursor.is_none());
}

#[tokio::test]
async fn slice_continuation_ignores_later_appends() {
    let (_dir, store) = sqlite_store();
    for i in 0..4 {
        store.append(&at(&format!("e{i}"), i * 10)).await.unwrap();
    }

    let first = store
        .events_before(
            t0() + Duration::hours(1),
            &SliceRequest {
                limit: 2,
                ..SliceRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&first), ["e0", "e1"]);

    // Sorts after the cursor by time but was appended after the first page.
    store.append(&at("late", 15)).await.unwrap();

    let second = store
        .events_before(
            t0() + Duration::hours(1),
            &SliceRequest {
                limit: 10,
                cursor: first.cursor,
                ..SliceRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&second), ["e2", "e3"]);
}

#[tokio::test]
async fn slice_filters_by_type_and_source() {
    let (_dir, store) = sqlite_store();
    let mk = |id: &str, source: &str, ty: &str| {
        Event::new(id, source, ty).with_time(t0())
    };
    store.append(&mk("1", "a", "created")).await.unwrap();
    store.append(&mk("2", "b", "created")).await.unwrap();
    store.append(&mk("3", "a", "deleted")).await.unwrap();

    let by_type = SliceRequest {
        event_type: Some("created".into()),
        ..SliceRequest::default()
    };
    let page = store.events_before(t0(), &by_type).await.unwrap();
    assert_eq!(ids(&page), ["1", "2"]);

    let both = SliceRequest {
        event_type: Some("created".into()),
        source: Some("a".into()),
        ..SliceRequest::default()
    };
    let page = store.events_before(t0(), &both).await.unwrap();
    assert_eq!(ids(&page), ["1"]);
}

#[tokio::test]
async fn slice_rejects_foreign_cursor() {
    let (_dir, store) = sqlite_store();
    let request = SliceRequest {
        cursor: Some(Cursor {
            until: "2024-03-01T12:00:00.000000000Z".into(),
            time: "2024-03-01T12:00:00.000000000Z".into(),
            position: ObjectId::new().to_hex(),
            horizon: "9".into(),
        }),
        ..SliceRequest::default()
    };
    assert!(matches!(
        store.events_before(t0(), &request).await,
        Err(StoreError::InvalidCursor(_))
    ));
}

// ── document backend ─────────────────────────────────────────────────

fn document_config() -> DocumentConfig {
    DocumentConfig {
        host: "localhost".into(),
        port: "27017".into(),
        username: "evrys".into(),
        password: "secret".into(),
        database: "evrys".into(),
        collection: "events".into(),
        ..DocumentConfig::default()
    }
}

#[test]
fn document_config_valid() {
    assert_eq!(document_config().validate().unwrap(), 27017);
}

#[test]
fn document_config_fields_checked_in_order() {
    let cases: Vec<(DocumentConfig, &str)> = vec![
        (DocumentConfig::default(), "host"),
        (
            DocumentConfig {
                port: "mongo".into(),
                username: String::new(),
                ..document_config()
            },
            "port",
        ),
        (
            DocumentConfig {
                port: "70000".into(),
                ..document_config()
            },
            "port",
        ),
        (
            DocumentConfig {
                username: "  ".into(),
                password: String::new(),
                ..document_config()
            },
            "username",
        ),
        (
            DocumentConfig {
                password: String::new(),
                database: String::new(),
                ..document_config()
            },
            "password",
        ),
        (
            DocumentConfig {
                database: String::new(),
                collection: String::new(),
                ..document_config()
            },
            "database",
        ),
        (
            DocumentConfig {
                collection: String::new(),
                ..document_config()
            },
            "collection",
        ),
    ];

    for (config, expected) in cases {
        match config.validate() {
            Err(StoreError::Validation { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected validation error on {expected}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn document_connect_validates_before_io() {
    let config = DocumentConfig {
        port: "not-a-port".into(),
        ..document_config()
    };
    match DocumentStore::connect(&config, Span::none()).await {
        Err(StoreError::Validation { field, .. }) => assert_eq!(field, "port"),
        Err(other) => panic!("expected validation error, got {other:?}"),
        Ok(_) => panic!("expected validation error"),
    }
}

#[test]
fn document_layout_has_top_level_attributes() {
    let document = to_document(&full_event()).expect("event should convert");

    assert_eq!(document.get_str("id").unwrap(), "evt-full");
    assert_eq!(document.get_str("specversion").unwrap(), "1.0");
    assert_eq!(document.get_str("source").unwrap(), "https://example.com/orders");
    assert_eq!(document.get_str("type").unwrap(), "com.example.order.created");
    assert_eq!(document.get_str("subject").unwrap(), "orders/42");
    assert_eq!(document.get_str("datacontenttype").unwrap(), "application/json");
    assert_eq!(
        document.get_str("time").unwrap(),
        "2024-03-01T12:00:00.000000000Z"
    );
    assert!(document.get_document("data").is_ok());
    assert!(!document.contains_key("_id"));
    assert!(!document.contains_key("seq"));
}

#[test]
fn document_round_trip_strips_backend_fields() {
    let event = full_event();
    let mut document = to_document(&event).unwrap();
    document.insert("_id", Bson::ObjectId(ObjectId::new()));
    document.insert("seq", 7_i64);

    let decoded = from_document(document).expect("document should decode");
    assert_eq!(decoded, event);
}

#[test]
fn document_slice_filter_bounds_by_seq() {
    let request = SliceRequest {
        event_type: Some("com.example.order.created".into()),
        ..SliceRequest::default()
    };

    let first = slice_filter("2024-03-01T13:00:00.000000000Z", 41, None, &request);
    assert_eq!(
        first,
        doc! {
            "time": { "$lte": "2024-03-01T13:00:00.000000000Z" },
            "seq": { "$lte": 41_i64 },
            "type": "com.example.order.created",
        }
    );

    let next = slice_filter(
        "2024-03-01T13:00:00.000000000Z",
        41,
        Some(("2024-03-01T12:00:01.000000000Z", 17)),
        &SliceRequest::default(),
    );
    assert_eq!(next.get_document("seq").unwrap(), &doc! { "$lte": 41_i64 });
    assert_eq!(
        next.get_array("$or").unwrap(),
        &vec![
            Bson::Document(doc! { "time": { "$gt": "2024-03-01T12:00:01.000000000Z" } }),
            Bson::Document(doc! {
                "time": "2024-03-01T12:00:01.000000000Z",
                "seq": { "$gt": 17_i64 },
            }),
        ]
    );
    assert!(!next.contains_key("_id"));
}

#[test]
fn document_with_wrong_shape_is_a_marshal_error() {
    let document = doc! { "_id": ObjectId::new(), "specversion": 1 };
    assert!(matches!(
        from_document(document),
        Err(StoreError::Marshal { from: "bson", to: "event", .. })
    ));
}

/// Runs against a live MongoDB. Configure with `EVRYS_TEST_MONGO_HOST`,
/// `EVRYS_TEST_MONGO_PORT`, `EVRYS_TEST_MONGO_USER`, `EVRYS_TEST_MONGO_PASSWORD`.
#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn document_store_live_round_trip() {
    let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());
    let config = DocumentConfig {
        host: env("EVRYS_TEST_MONGO_HOST", "localhost"),
        port: env("EVRYS_TEST_MONGO_PORT", "27017"),
        username: env("EVRYS_TEST_MONGO_USER", "root"),
        password: env("EVRYS_TEST_MONGO_PASSWORD", "example"),
        database: "evrys_test".into(),
        collection: format!("events_{}", ObjectId::new().to_hex()),
        ..DocumentConfig::default()
    };
    let store = DocumentStore::connect(&config, Span::none())
        .await
        .expect("should connect");

    assert!(matches!(
        store.get_by_id("evt-full").await,
        Err(StoreError::NotFound { .. })
    ));

    let event = full_event();
    store.append(&event).await.expect("append should succeed");
    assert_eq!(store.get_by_id("evt-full").await.unwrap(), event);

    for i in 0..3 {
        store.append(&at(&format!("e{i}"), i + 1)).await.unwrap();
    }
    let first = store
        .events_before(
            t0() + Duration::hours(1),
            &SliceRequest {
                limit: 2,
                ..SliceRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&first), ["evt-full", "e0"]);
    // Appended after the first page, inside the time range: past the horizon.
    store.append(&at("late", 2)).await.unwrap();
    let second = store
        .events_before(
            t0() + Duration::hours(1),
            &SliceRequest {
                limit: 2,
                cursor: first.cursor,
                ..SliceRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&second), ["e1", "e2"]);
    assert!(second.cursor.is_none());
}

// ── factory ──────────────────────────────────────────────────────────

#[tokio::test]
async fn open_store_sqlite_has_both_capabilities() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        sqlite: SqliteConfig {
            path: dir.path().join("f.db").to_str().unwrap().to_string(),
            ..SqliteConfig::default()
        },
        ..StoreConfig::default()
    };

    let opened = open_store(&config, Span::none()).await.expect("should open");
    opened.append.append(&at("x", 0)).await.unwrap();
    let query = opened.query.expect("sqlite can query");
    assert_eq!(query.get_by_id("x").await.unwrap().id, "x");
}

#[tokio::test]
async fn open_store_document_requires_section() {
    let config = StoreConfig {
        kind: StoreKind::Document,
        ..StoreConfig::default()
    };
    match open_store(&config, Span::none()).await {
        Err(StoreError::Validation { field, .. }) => assert_eq!(field, "document"),
        Err(other) => panic!("expected validation error, got {other:?}"),
        Ok(_) => panic!("expected validation error"),
    }
}

#[test]
fn store_kind_names() {
    #[derive(serde::Deserialize)]
    struct Wrap {
        kind: StoreKind,
    }
    for (raw, kind) in [
        ("sqlite", StoreKind::Sqlite),
        ("document", StoreKind::Document),
        ("wide-column", StoreKind::WideColumn),
    ] {
        let parsed: Wrap = serde_json::from_value(json!({ "kind": raw })).unwrap();
        assert_eq!(parsed.kind, kind);
    }
}
