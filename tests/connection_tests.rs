//! Connection Facade and Registry Tests

mod common;

use common::codec;
use dbtemplate_core::database::memory::{MemoryConnector, MemoryDatabase, MemoryTable, MemoryValue};
use dbtemplate_core::database::{ConnectionFacade, ConnectionRegistry};
use dbtemplate_core::types::BindValue;
use std::collections::BTreeMap;
use std::sync::Arc;

fn health_database() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.register_query("SELECT 1 AS health", |_| {
        Ok(MemoryTable::new(&[("HEALTH", "INT4")]).row(vec![MemoryValue::scalar(1_i64)]))
    });
    db
}

fn memory_registry(db: &MemoryDatabase) -> ConnectionRegistry {
    ConnectionRegistry::new(Arc::new(MemoryConnector::new(db.clone())))
}

mod facade {
    use super::*;

    #[tokio::test]
    async fn test_helpers_are_memoized() {
        let db = health_database();
        let facade = ConnectionFacade::new(db.connect(), codec());

        assert!(Arc::ptr_eq(&facade.query_runner(), &facade.query_runner()));
        assert!(Arc::ptr_eq(&facade.call_binder(), &facade.call_binder()));
    }

    #[tokio::test]
    async fn test_query_and_call_delegate() {
        let db = health_database();
        db.register_query("select ? as echo", |binds| {
            let value = binds[0].as_scalar().cloned().map_or(MemoryValue::Null, MemoryValue::Scalar);
            Ok(MemoryTable::new(&[("ECHO", "TEXT")]).row(vec![value]))
        });
        db.register_procedure("{call greet(?, ?)}", |inv| {
            let name = inv.input_str(1).unwrap_or("nobody");
            Ok(BTreeMap::from([(2, MemoryValue::scalar(format!("hello {name}")))]))
        });
        let facade = ConnectionFacade::new(db.connect(), codec());

        let result = facade
            .query_with_binds("select ? as echo", &[BindValue::from("x")])
            .await
            .unwrap();
        assert_eq!(result.cell_by_name(0, "ECHO").unwrap().as_str(), Some("x"));

        let outputs = facade
            .call(
                "{call greet(?, ?)}",
                &BTreeMap::from([("1".to_string(), BindValue::from("ada"))]),
                &BTreeMap::from([("2".to_string(), "VARCHAR".to_string())]),
            )
            .await
            .unwrap();
        assert_eq!(outputs["2"].as_str(), Some("hello ada"));
    }

    #[tokio::test]
    async fn test_health_check_and_close() {
        let db = health_database();
        let facade = ConnectionFacade::new(db.connect(), codec());

        assert!(facade.health_check().await.unwrap());
        facade.close().await.unwrap();
        assert!(facade.is_closed());
        assert!(!facade.health_check().await.unwrap());
        assert!(facade.query("SELECT 1 AS health").await.is_err());
    }
}

mod registry {
    use super::*;

    #[tokio::test]
    async fn test_default_connection_is_created_once() {
        let db = health_database();
        let registry = memory_registry(&db);

        let first = registry.default_connection().await.unwrap();
        let second = registry.default_connection().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(db.stats().connections_opened, 1);
    }

    #[tokio::test]
    async fn test_closed_default_is_replaced() {
        let db = health_database();
        let registry = memory_registry(&db);

        let first = registry.default_connection().await.unwrap();
        first.close().await.unwrap();
        let second = registry.default_connection().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_set_and_clear_default() {
        let db = health_database();
        let registry = memory_registry(&db);

        let explicit = Arc::new(ConnectionFacade::new(db.connect(), codec()));
        assert!(registry.set_default(explicit.clone()).await.is_none());
        assert!(Arc::ptr_eq(&registry.default_connection().await.unwrap(), &explicit));

        let cleared = registry.clear_default().await.unwrap();
        assert!(Arc::ptr_eq(&cleared, &explicit));
        assert!(!cleared.is_closed());

        let fresh = registry.default_connection().await.unwrap();
        assert!(!Arc::ptr_eq(&fresh, &explicit));
    }

    #[tokio::test]
    async fn test_new_connections_are_not_stored() {
        let db = health_database();
        let registry = memory_registry(&db);

        let a = registry.new_connection().await.unwrap();
        let b = registry
            .new_connection_with("memory://reports", "reporter", "pw")
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(
            db.connect_requests(),
            vec![("memory://reports".to_string(), "reporter".to_string())]
        );

        assert!(registry.clear_default().await.is_none());
        assert!(registry.new_connection_with(" ", "x", "y").await.is_err());
    }
}
