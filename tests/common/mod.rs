#![allow(dead_code)]

pub mod strategies;

use dbtemplate_core::database::memory::{MemoryDatabase, MemoryValue};
use dbtemplate_core::types::TypeCodec;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RESOLVE_CALL: &str = "{call tmpl_api.resolve(?, ?, ?, ?, ?, ?)}";
pub const LOAD_CALL: &str = "{call tmpl_api.load(?, ?, ?, ?, ?, ?)}";
pub const CHECK_CALL: &str = "{call tmpl_api.modified(?, ?, ?, ?, ?, ?)}";

pub const RESOLVE_FUNCTION: &str = "tmpl.resolve";
pub const LOAD_FUNCTION: &str = "tmpl.load";
pub const CHECK_FUNCTION: &str = "tmpl.modified";

/// A stored template as the fixture database knows it
#[derive(Debug, Clone)]
pub struct StoredTemplate {
    pub name: &'static str,
    pub owner: &'static str,
    pub object: &'static str,
    pub section: Option<&'static str>,
    pub kind: &'static str,
    pub body: &'static str,
    pub modified: i64,
}

pub fn catalog() -> Vec<StoredTemplate> {
    vec![
        StoredTemplate {
            name: "orders/summary.ftl",
            owner: "APP",
            object: "TEMPLATES",
            section: Some("SUMMARY"),
            kind: "PACKAGE",
            body: "<#list orders as o>${o.id}</#list>",
            modified: 1_700_000_000_000,
        },
        StoredTemplate {
            name: "header.ftl",
            owner: "App",
            object: "LAYOUT",
            section: None,
            kind: "PROCEDURE",
            body: "<h1>${title}</h1>",
            modified: 1_650_000_000_000,
        },
    ]
}

pub fn codec() -> Arc<TypeCodec> {
    Arc::new(TypeCodec::new())
}

fn find_by_name(name: Option<&str>) -> Option<StoredTemplate> {
    catalog().into_iter().find(|t| Some(t.name) == name)
}

fn find_by_object(owner: Option<&str>, object: Option<&str>, section: Option<&str>) -> Option<StoredTemplate> {
    catalog().into_iter().find(|t| {
        Some(t.owner) == owner
            && Some(t.object) == object
            && t.section.unwrap_or("") == section.unwrap_or("")
    })
}

fn find_by_locator(locator: Option<&str>) -> Option<StoredTemplate> {
    let name = locator.and_then(|l| l.strip_prefix("loc:"));
    find_by_name(name)
}

/// A database serving [`catalog`] through both procedure shapes
pub fn template_database() -> MemoryDatabase {
    let db = MemoryDatabase::new();

    db.register_procedure(RESOLVE_CALL, |inv| {
        let mut out = BTreeMap::new();
        if let Some(t) = find_by_name(inv.input_str(1)) {
            out.insert(2, MemoryValue::scalar(t.owner));
            out.insert(3, MemoryValue::scalar(t.object));
            out.insert(4, t.section.map_or(MemoryValue::Null, |s| MemoryValue::scalar(s)));
            out.insert(5, MemoryValue::Null);
            out.insert(6, MemoryValue::scalar(t.kind.to_lowercase()));
        }
        Ok(out)
    });
    db.register_procedure(LOAD_CALL, |inv| {
        let found = find_by_object(inv.input_str(1), inv.input_str(2), inv.input_str(3));
        Ok(found
            .map(|t| BTreeMap::from([(6, MemoryValue::scalar(t.body))]))
            .unwrap_or_default())
    });
    db.register_procedure(CHECK_CALL, |inv| {
        let found = find_by_object(inv.input_str(1), inv.input_str(2), inv.input_str(3));
        Ok(found
            .map(|t| BTreeMap::from([(6, MemoryValue::scalar(t.modified))]))
            .unwrap_or_default())
    });

    db.register_procedure(&locator_call(RESOLVE_FUNCTION), |inv| {
        Ok(find_by_name(inv.input_str(2))
            .map(|t| BTreeMap::from([(1, MemoryValue::scalar(format!("loc:{}", t.name)))]))
            .unwrap_or_default())
    });
    db.register_procedure(&locator_call(LOAD_FUNCTION), |inv| {
        Ok(find_by_locator(inv.input_str(2))
            .map(|t| BTreeMap::from([(1, MemoryValue::scalar(t.body))]))
            .unwrap_or_default())
    });
    db.register_procedure(&locator_call(CHECK_FUNCTION), |inv| {
        Ok(find_by_locator(inv.input_str(2))
            .map(|t| BTreeMap::from([(1, MemoryValue::scalar(t.modified))]))
            .unwrap_or_default())
    });

    db
}

pub fn locator_call(function: &str) -> String {
    format!("{{? = call {function}(?)}}")
}
