//! Query Runner and Call Binder Tests
//!
//! Positional binds, keyed in/out bind sets, operation ordering and statement
//! cleanup against the in-memory backend.

mod common;

use chrono::NaiveDate;
use common::codec;
use dbtemplate_core::database::memory::{CallOp, MemoryDatabase, MemoryTable, MemoryValue};
use dbtemplate_core::database::{CallBinder, QueryRunner};
use dbtemplate_core::error::{BindDirection, SqlError, StatementKind};
use dbtemplate_core::tabular::Cell;
use dbtemplate_core::types::{BindValue, Value};
use std::collections::BTreeMap;

fn binds<const N: usize>(entries: [(&str, BindValue); N]) -> BTreeMap<String, BindValue> {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn outs<const N: usize>(entries: [(&str, &str); N]) -> BTreeMap<String, String> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

mod query_runner {
    use super::*;

    #[tokio::test]
    async fn test_binds_are_positional_and_statement_is_closed() {
        let db = MemoryDatabase::new();
        db.register_query("select name from widgets where id = ? and kind = ?", |binds| {
            let id = binds[0].as_scalar().and_then(Value::as_i64).unwrap_or_default();
            let kind = binds[1].as_scalar().and_then(Value::as_str).unwrap_or_default();
            Ok(MemoryTable::new(&[("NAME", "TEXT")])
                .row(vec![MemoryValue::scalar(format!("{kind}-{id}"))]))
        });

        let runner = QueryRunner::new(db.connect(), codec());
        let result = runner
            .execute_query(
                "select name from widgets where id = ? and kind = ?",
                &[BindValue::from(7_i64), BindValue::from("bolt")],
            )
            .await
            .unwrap();

        assert_eq!(result.cell(0, 0).unwrap().as_str(), Some("bolt-7"));
        let stats = db.stats();
        assert_eq!(stats.statements_prepared, 1);
        assert_eq!(stats.statements_closed, 1);
        assert_eq!(stats.open_cursors, 0);
    }

    #[tokio::test]
    async fn test_temporal_binds_are_classified() {
        let db = MemoryDatabase::new();
        db.register_query("select ? as d, ? as ts from dual", |_| {
            Ok(MemoryTable::new(&[("D", "DATE"), ("TS", "TIMESTAMP")]))
        });
        let runner = QueryRunner::new(db.connect(), codec());

        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let afternoon = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(15, 30, 0).unwrap();
        runner
            .execute_query(
                "select ? as d, ? as ts from dual",
                &[BindValue::Temporal(midnight), BindValue::Temporal(afternoon)],
            )
            .await
            .unwrap();

        let observed = db.observed_binds();
        assert_eq!(observed[0].value, BindValue::Scalar(Value::Date(midnight.date())));
        assert_eq!(observed[1].value, BindValue::Scalar(Value::Timestamp(afternoon)));
    }

    #[tokio::test]
    async fn test_blank_sql_is_rejected_before_prepare() {
        let db = MemoryDatabase::new();
        let runner = QueryRunner::new(db.connect(), codec());

        let err = runner.execute_query("   ", &[]).await.unwrap_err();
        assert!(matches!(err, SqlError::EmptyStatement(StatementKind::Query)));
        assert_eq!(db.stats().statements_prepared, 0);
    }

    #[tokio::test]
    async fn test_execution_failure_closes_statement_and_names_it() {
        let db = MemoryDatabase::new();
        db.register_query("select broken", |_| {
            Err(dbtemplate_core::error::DriverError::Database("relation does not exist".to_string()))
        });
        let runner = QueryRunner::new(db.connect(), codec());

        let err = runner.execute_query("select broken", &[]).await.unwrap_err();
        assert!(matches!(&err, SqlError::Database { statement, .. } if statement == "select broken"));
        assert_eq!(db.stats().statements_closed, 1);
    }

    #[tokio::test]
    async fn test_prepare_failure_is_reported() {
        let db = MemoryDatabase::new();
        db.register_query("select 1", |_| Ok(MemoryTable::default()));
        db.set_fail_on_prepare(true);
        let runner = QueryRunner::new(db.connect(), codec());

        let err = runner.execute_query("select 1", &[]).await.unwrap_err();
        assert!(err.to_string().contains("simulated prepare failure"));
    }
}

mod call_binder {
    use super::*;

    const ECHO: &str = "{call echo(?, ?)}";

    fn echo_database() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.register_procedure(ECHO, |inv| {
            let mut out = BTreeMap::new();
            for position in inv.outputs.keys() {
                let value = inv
                    .input(*position)
                    .and_then(BindValue::as_scalar)
                    .cloned()
                    .map_or(MemoryValue::Null, MemoryValue::Scalar);
                out.insert(*position, value);
            }
            Ok(out)
        });
        db
    }

    #[tokio::test]
    async fn test_inout_parameter_round_trip() {
        let db = echo_database();
        let binder = CallBinder::new(db.connect(), codec());

        let result = binder
            .execute_call(
                ECHO,
                &binds([("1", BindValue::from("hello"))]),
                &outs([("1", "VARCHAR")]),
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result["1"].as_str(), Some("hello"));
        assert_eq!(db.stats().statements_closed, 1);
    }

    #[tokio::test]
    async fn test_inputs_are_bound_before_outputs_are_registered() {
        let db = echo_database();
        let binder = CallBinder::new(db.connect(), codec());

        binder
            .execute_call(
                ECHO,
                &binds([("2", BindValue::from(5_i64)), ("1", BindValue::from("a"))]),
                &outs([("2", "NUMERIC"), ("1", "VARCHAR")]),
            )
            .await
            .unwrap();

        let log = db.call_log();
        let last_bind = log.iter().rposition(|op| matches!(op, CallOp::Bind(_))).unwrap();
        let first_register = log.iter().position(|op| matches!(op, CallOp::Register(_))).unwrap();
        assert!(last_bind < first_register);
        assert_eq!(log.last(), Some(&CallOp::Execute));
    }

    #[tokio::test]
    async fn test_output_keys_are_normalized() {
        let db = echo_database();
        let binder = CallBinder::new(db.connect(), codec());

        let result = binder
            .execute_call(
                ECHO,
                &binds([(" 02", BindValue::from(9_i64))]),
                &outs([("2 ", "BIGINT")]),
            )
            .await
            .unwrap();
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["2"]);
        assert_eq!(result["2"].as_i64(), Some(9));
    }

    #[tokio::test]
    async fn test_bad_bind_index_is_rejected() {
        let db = echo_database();
        let binder = CallBinder::new(db.connect(), codec());

        let err = binder
            .execute_call(ECHO, &binds([("first", BindValue::from(1_i64))]), &outs([]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SqlError::BadBindIndex { direction: BindDirection::In, ref key } if key == "first"
        ));

        let err = binder
            .execute_call(ECHO, &binds([]), &outs([("0", "VARCHAR")]))
            .await
            .unwrap_err();
        assert!(matches!(err, SqlError::BadBindIndex { direction: BindDirection::Out, .. }));

        // Both attempts still released their prepared call.
        assert_eq!(db.stats().statements_closed, 2);
    }

    #[tokio::test]
    async fn test_unknown_output_type_names_position() {
        let db = echo_database();
        let binder = CallBinder::new(db.connect(), codec());

        let err = binder
            .execute_call(ECHO, &binds([]), &outs([("2", "NOT_A_TYPE")]))
            .await
            .unwrap_err();
        match err {
            SqlError::UnknownOutputType { position, type_name, source } => {
                assert_eq!(position, 2);
                assert_eq!(type_name, "NOT_A_TYPE");
                assert!(matches!(*source, SqlError::UnknownType { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_user_type_is_passed_through() {
        let db = MemoryDatabase::new();
        db.register_procedure("{call list_ids(?)}", |inv| {
            let param = &inv.outputs[&1];
            assert_eq!(param.user_type.as_deref(), Some("APP.ID_LIST"));
            Ok(BTreeMap::from([(
                1,
                MemoryValue::scalar(vec![Some(1_i64), None, Some(3)]),
            )]))
        });
        let binder = CallBinder::new(db.connect(), codec());

        let result = binder
            .execute_call("{call list_ids(?)}", &binds([]), &outs([("1", "ARRAY:APP.ID_LIST")]))
            .await
            .unwrap();
        let ids = result["1"].as_scalar().and_then(Value::as_array).unwrap();
        assert_eq!(ids, &[Some(Value::Int(1)), None, Some(Value::Int(3))]);
        assert_eq!(result["1"].to_string(), "[1, null, 3]");
    }

    #[tokio::test]
    async fn test_cursor_and_clob_outputs_are_materialized() {
        let db = MemoryDatabase::new();
        db.register_procedure("{call report(?, ?, ?)}", |inv| {
            let region = inv.input_str(1).unwrap_or_default().to_string();
            Ok(BTreeMap::from([
                (
                    2,
                    MemoryTable::new(&[("REGION", "TEXT"), ("TOTAL", "INT8")])
                        .row(vec![MemoryValue::scalar(region), MemoryValue::scalar(42_i64)])
                        .into(),
                ),
                (3, MemoryValue::scalar("report body")),
            ]))
        });
        let binder = CallBinder::new(db.connect(), codec());

        let result = binder
            .execute_call(
                "{call report(?, ?, ?)}",
                &binds([("1", BindValue::from("EMEA"))]),
                &outs([("2", "oracle.jdbc.OracleTypes.CURSOR"), ("3", "CLOB")]),
            )
            .await
            .unwrap();

        let table = result["2"].as_nested().unwrap();
        assert_eq!(table.cell_by_name(0, "REGION").unwrap().as_str(), Some("EMEA"));
        assert_eq!(result["3"], Cell::Scalar(Value::from("report body")));
        assert_eq!(db.stats().open_cursors, 0);
    }

    #[tokio::test]
    async fn test_unproduced_outputs_are_null() {
        let db = MemoryDatabase::new();
        db.register_procedure("{call noop(?)}", |_| Ok(BTreeMap::new()));
        let binder = CallBinder::new(db.connect(), codec());

        let result = binder
            .execute_call("{call noop(?)}", &binds([]), &outs([("1", "VARCHAR")]))
            .await
            .unwrap();
        assert!(result["1"].is_null());
    }
}
