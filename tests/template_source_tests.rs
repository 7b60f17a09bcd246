//! Remote Template Source Tests
//!
//! Both call shapes against the fixture catalog in `common`, plus handle
//! caching, reset and error classification.

mod common;

use common::*;
use dbtemplate_core::config::TemplateSourceConfig;
use dbtemplate_core::database::memory::{MemoryConnector, MemoryDatabase};
use dbtemplate_core::database::ConnectionRegistry;
use dbtemplate_core::error::{DriverError, TemplateSourceError};
use dbtemplate_core::template_source::{
    LocationDescriptor, RemoteTemplateSource, SourceVariant, TemplateLoader, TemplateLocator,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

fn object_source(db: &MemoryDatabase, with_checker: bool) -> RemoteTemplateSource {
    RemoteTemplateSource::object(
        db.connect(),
        RESOLVE_CALL,
        LOAD_CALL,
        with_checker.then_some(CHECK_CALL),
    )
}

fn locator_source(db: &MemoryDatabase, with_checker: bool) -> RemoteTemplateSource {
    RemoteTemplateSource::locator(
        db.connect(),
        RESOLVE_FUNCTION,
        LOAD_FUNCTION,
        with_checker.then_some(CHECK_FUNCTION),
    )
}

async fn read_all(source: &RemoteTemplateSource, descriptor: &LocationDescriptor) -> String {
    let mut reader = source.reader(descriptor).await.unwrap();
    let mut text = String::new();
    reader.read_to_string(&mut text).await.unwrap();
    text
}

mod object_variant {
    use super::*;

    #[tokio::test]
    async fn test_resolve_load_and_check() {
        let db = template_database();
        let source = object_source(&db, true);

        let found = source
            .find_template_source("orders/summary.ftl")
            .await
            .unwrap()
            .unwrap();
        let LocationDescriptor::Object(locator) = &found else {
            panic!("expected an object descriptor, got {found:?}");
        };
        assert_eq!(locator.name(), "orders/summary.ftl");
        assert_eq!(locator.section(), "SUMMARY");
        assert_eq!(locator.dblink(), "");
        assert_eq!(locator.kind(), "PACKAGE");
        assert_eq!(found.to_string(), "APP.TEMPLATES%SUMMARY (PACKAGE)");

        assert_eq!(source.last_modified(&found).await.unwrap(), 1_700_000_000_000);
        assert_eq!(read_all(&source, &found).await, "<#list orders as o>${o.id}</#list>");
    }

    #[tokio::test]
    async fn test_mixed_case_owner_is_kept() {
        let db = template_database();
        let source = object_source(&db, true);

        let found = source.find_template_source("header.ftl").await.unwrap().unwrap();
        assert_eq!(found.to_string(), "\"App\".LAYOUT (PROCEDURE)");
        assert_eq!(read_all(&source, &found).await, "<h1>${title}</h1>");
        assert_eq!(source.last_modified(&found).await.unwrap(), 1_650_000_000_000);
    }

    #[tokio::test]
    async fn test_unknown_name_resolves_to_none() {
        let db = template_database();
        let source = object_source(&db, false);
        assert!(source.find_template_source("missing.ftl").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_descriptor_equality_ignores_requested_name() {
        let a = TemplateLocator::new("a.ftl", "APP", "TEMPLATES", Some("summary"), None, "package");
        let b = TemplateLocator::new("b.ftl", "APP", "TEMPLATES", Some("SUMMARY"), None, "PACKAGE");
        assert_eq!(LocationDescriptor::Object(a), LocationDescriptor::Object(b));
    }

    #[tokio::test]
    async fn test_handles_are_prepared_once() {
        let db = template_database();
        let source = object_source(&db, true);

        for _ in 0..3 {
            let found = source.find_template_source("header.ftl").await.unwrap().unwrap();
            source.last_modified(&found).await.unwrap();
            read_all(&source, &found).await;
        }
        assert_eq!(db.stats().calls_prepared, 3);
        assert_eq!(db.stats().executions, 9);
    }
}

mod locator_variant {
    use super::*;

    #[tokio::test]
    async fn test_resolve_load_and_check() {
        let db = template_database();
        let source = locator_source(&db, true);
        assert_eq!(source.variant(), SourceVariant::Locator);

        let found = source
            .find_template_source("orders/summary.ftl")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, LocationDescriptor::Locator("loc:orders/summary.ftl".to_string()));
        assert_eq!(source.last_modified(&found).await.unwrap(), 1_700_000_000_000);
        assert_eq!(read_all(&source, &found).await, "<#list orders as o>${o.id}</#list>");
    }

    #[tokio::test]
    async fn test_unknown_name_resolves_to_none() {
        let db = template_database();
        let source = locator_source(&db, true);
        assert!(source.find_template_source("nope.ftl").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_is_bound_at_position_two() {
        let db = template_database();
        let source = locator_source(&db, false);
        source.find_template_source("header.ftl").await.unwrap();

        let observed = db.observed_binds();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].position, 2);
        assert_eq!(observed[0].statement, locator_call(RESOLVE_FUNCTION));
    }
}

#[tokio::test]
async fn test_freshness_without_checker_never_decreases() {
    let db = template_database();
    let source = object_source(&db, false);
    assert!(!source.has_checker());

    let found = source.find_template_source("header.ftl").await.unwrap().unwrap();
    let mut previous = source.last_modified(&found).await.unwrap();
    for _ in 0..50 {
        let now = source.last_modified(&found).await.unwrap();
        assert!(now >= previous);
        previous = now;
    }
    assert!(previous > 1_600_000_000_000);
    assert_eq!(db.stats().calls_prepared, 1);
}

#[tokio::test]
async fn test_reset_is_observationally_transparent() {
    let db = template_database();
    let source = object_source(&db, true);

    let before = source.find_template_source("orders/summary.ftl").await.unwrap();
    source.reset_state().await;
    let after = source.find_template_source("orders/summary.ftl").await.unwrap();
    assert_eq!(before, after);

    let stats = db.stats();
    assert_eq!(stats.calls_prepared, 2);
    assert_eq!(stats.statements_closed, 1);
}

#[tokio::test]
async fn test_reset_ignores_close_failures() {
    let db = template_database();
    let source = object_source(&db, true);
    source.find_template_source("header.ftl").await.unwrap();

    db.set_fail_on_close(true);
    source.reset().await;
    db.set_fail_on_close(false);

    assert!(source.find_template_source("header.ftl").await.unwrap().is_some());
}

#[tokio::test]
async fn test_failures_are_classified_by_operation() {
    let db = template_database();
    db.register_procedure("{call broken_resolve(?, ?, ?, ?, ?, ?)}", |_| {
        Err(DriverError::Database("ORA-06550".to_string()))
    });
    db.register_procedure("{call broken_check(?, ?, ?, ?, ?, ?)}", |_| {
        Err(DriverError::Database("ORA-04063".to_string()))
    });

    let source = RemoteTemplateSource::object(
        db.connect(),
        "{call broken_resolve(?, ?, ?, ?, ?, ?)}",
        LOAD_CALL,
        Some("{call broken_check(?, ?, ?, ?, ?, ?)}"),
    );

    let err = source.find_template_source("header.ftl").await.unwrap_err();
    assert!(matches!(err, TemplateSourceError::SourceResolution { ref name, .. } if name == "header.ftl"));

    let descriptor = LocationDescriptor::Object(TemplateLocator::new(
        "header.ftl", "App", "LAYOUT", None, None, "procedure",
    ));
    let err = source.last_modified(&descriptor).await.unwrap_err();
    assert!(matches!(err, TemplateSourceError::FreshnessCheck { .. }));
    assert!(err.to_string().contains("\"App\".LAYOUT (PROCEDURE)"));

    let unknown = LocationDescriptor::Object(TemplateLocator::new(
        "gone.ftl", "APP", "GONE", None, None, "package",
    ));
    let err = source.reader(&unknown).await.err().unwrap();
    assert!(matches!(err, TemplateSourceError::SourceLoad { .. }));
}

#[tokio::test]
async fn test_null_checker_result_reads_as_zero() {
    let db = template_database();
    db.register_procedure("{call null_check(?, ?, ?, ?, ?, ?)}", |_| Ok(BTreeMap::new()));
    let source = RemoteTemplateSource::object(
        db.connect(),
        RESOLVE_CALL,
        LOAD_CALL,
        Some("{call null_check(?, ?, ?, ?, ?, ?)}"),
    );

    let found = source.find_template_source("header.ftl").await.unwrap().unwrap();
    assert_eq!(source.last_modified(&found).await.unwrap(), 0);
}

#[tokio::test]
async fn test_describe_redacts_and_truncates() {
    let db = MemoryDatabase::new();
    let long_loader = format!("{{call {}(?, ?, ?, ?, ?, ?)}}", "pkg.load_".repeat(20));
    let source = RemoteTemplateSource::object(
        db.connect(),
        "{call api.resolve(?,\n   'tenant-secret', ?, ?, ?, ?, ?)}",
        &long_loader,
        None,
    );

    let description = source.describe();
    assert!(description.contains("resolver_call=\"{call api.resolve(?, '***', ?, ?, ?, ?, ?)}\""));
    assert!(!description.contains("tenant-secret"));
    assert!(description.contains("...\""));
    assert!(description.ends_with("checker_call=null)"));
    assert_eq!(db.stats().calls_prepared, 0);
}

#[tokio::test]
async fn test_built_from_config_on_default_connection() {
    let db = template_database();
    let registry = ConnectionRegistry::new(Arc::new(MemoryConnector::new(db.clone())));
    let config = TemplateSourceConfig {
        variant: SourceVariant::Locator,
        resolver_call: RESOLVE_FUNCTION.to_string(),
        loader_call: LOAD_FUNCTION.to_string(),
        checker_call: Some(CHECK_FUNCTION.to_string()),
    };

    let source = RemoteTemplateSource::with_default_connection(&registry, &config)
        .await
        .unwrap();
    let found = source.find_template_source("header.ftl").await.unwrap().unwrap();
    assert_eq!(source.last_modified(&found).await.unwrap(), 1_650_000_000_000);
    assert_eq!(db.stats().connections_opened, 1);
}
