use dbtemplate_core::database::memory::{MemoryTable, MemoryValue};
use dbtemplate_core::types::Value;
use proptest::prelude::*;

/// Strategy for SQL-ish column labels; duplicates are likely on purpose
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof!["[A-C]", "[A-Z][A-Z0-9_]{0,7}"]
}

/// Strategy for scalar or null cells
pub fn memory_value_strategy() -> impl Strategy<Value = MemoryValue> {
    prop_oneof![
        Just(MemoryValue::Null),
        any::<i64>().prop_map(|i| MemoryValue::Scalar(Value::Int(i))),
        "[a-z ]{0,12}".prop_map(|s| MemoryValue::Scalar(Value::Text(s))),
        any::<bool>().prop_map(|b| MemoryValue::Scalar(Value::Bool(b))),
    ]
}

/// Strategy for rectangular tables of 1..6 columns and 0..12 rows
pub fn memory_table_strategy() -> impl Strategy<Value = MemoryTable> {
    (1usize..6)
        .prop_flat_map(|width| {
            (
                prop::collection::vec(column_name_strategy(), width),
                prop::collection::vec(prop::collection::vec(memory_value_strategy(), width), 0..12),
            )
        })
        .prop_map(|(names, rows)| {
            let columns: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "TEXT")).collect();
            rows.into_iter()
                .fold(MemoryTable::new(&columns), |table, row| table.row(row))
        })
}
