use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Where a resolved template lives, as a database object description.
///
/// `section` and `dblink` are stored upper-cased (absent becomes empty) and
/// `kind` upper-cased; `owner` and `object` keep their case. Two locators are
/// equal when they point at the same container, whatever name was used to
/// resolve them.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateLocator {
    name: String,
    owner: String,
    object: String,
    section: String,
    dblink: String,
    kind: String,
}

impl TemplateLocator {
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        object: impl Into<String>,
        section: Option<&str>,
        dblink: Option<&str>,
        kind: &str,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            object: object.into(),
            section: section.map(str::to_uppercase).unwrap_or_default(),
            dblink: dblink.map(str::to_uppercase).unwrap_or_default(),
            kind: kind.to_uppercase(),
        }
    }

    /// The name the template was requested by
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn dblink(&self) -> &str {
        &self.dblink
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Positional values for the loader and checker calls: owner, object,
    /// section, dblink, kind
    pub fn call_arguments(&self) -> [&str; 5] {
        [
            &self.owner,
            &self.object,
            &self.section,
            &self.dblink,
            &self.kind,
        ]
    }
}

impl PartialEq for TemplateLocator {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.object == other.object
            && self.section == other.section
            && self.dblink == other.dblink
            && self.kind == other.kind
    }
}

impl Eq for TemplateLocator {}

impl Hash for TemplateLocator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.object.hash(state);
        self.section.hash(state);
        self.dblink.hash(state);
        self.kind.hash(state);
    }
}

fn write_identifier(f: &mut fmt::Formatter<'_>, ident: &str) -> fmt::Result {
    if ident.to_uppercase() == ident {
        f.write_str(ident)
    } else {
        write!(f, "\"{ident}\"")
    }
}

/// `OWNER.OBJECT%SECTION@DBLINK (KIND)`; empty section and dblink are left out
impl fmt::Display for TemplateLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_identifier(f, &self.owner)?;
        f.write_str(".")?;
        write_identifier(f, &self.object)?;
        if !self.section.is_empty() {
            write!(f, "%{}", self.section)?;
        }
        if !self.dblink.is_empty() {
            write!(f, "@{}", self.dblink)?;
        }
        write!(f, " ({})", self.kind)
    }
}

/// The result of resolving a template name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationDescriptor {
    /// An opaque locator string handed back to the loader and checker
    Locator(String),
    Object(TemplateLocator),
}

impl fmt::Display for LocationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationDescriptor::Locator(locator) => write!(f, "locator {locator}"),
            LocationDescriptor::Object(locator) => write!(f, "{locator}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_normalization() {
        let l = TemplateLocator::new("orders", "App", "TEMPLATES", Some("body"), None, "package");
        assert_eq!(l.owner(), "App");
        assert_eq!(l.section(), "BODY");
        assert_eq!(l.dblink(), "");
        assert_eq!(l.kind(), "PACKAGE");
        assert_eq!(l.call_arguments(), ["App", "TEMPLATES", "BODY", "", "PACKAGE"]);
    }

    #[test]
    fn test_display_quotes_mixed_case_identifiers() {
        let l = TemplateLocator::new("x", "App", "TEMPLATES", Some("hdr"), Some("remote"), "package body");
        assert_eq!(l.to_string(), "\"App\".TEMPLATES%HDR@REMOTE (PACKAGE BODY)");

        let l = TemplateLocator::new("x", "APP", "tpl", None, None, "view");
        assert_eq!(l.to_string(), "APP.\"tpl\" (VIEW)");
    }

    #[test]
    fn test_equality_ignores_requested_name() {
        let a = TemplateLocator::new("a", "APP", "T", Some("s"), None, "table");
        let b = TemplateLocator::new("b", "APP", "T", Some("S"), Some(""), "TABLE");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(LocationDescriptor::Object(a));
        assert!(set.contains(&LocationDescriptor::Object(b)));

        let c = TemplateLocator::new("a", "app", "T", Some("S"), None, "TABLE");
        assert!(!set.contains(&LocationDescriptor::Object(c)));
    }
}
