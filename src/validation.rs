//! Input validation for statement text and call bind sets.
//!
//! Bind keys arrive as strings from template code, so they are validated here
//! before anything reaches the driver.

use crate::error::{BindDirection, SqlError, SqlResult, StatementKind};

/// A parsed output type specification: `TYPE_NAME` or
/// `TYPE_NAME:USER_DEFINED_TYPE_NAME`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpec<'a> {
    pub sql_type: &'a str,
    pub user_type: Option<&'a str>,
}

/// Reject blank statement text, returning the trimmed text otherwise
pub fn require_statement(text: &str, kind: StatementKind) -> SqlResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SqlError::EmptyStatement(kind));
    }
    Ok(trimmed)
}

/// Parse a bind key into a 1-based position.
///
/// Surrounding whitespace is ignored; zero, negatives and anything that is not
/// a base-10 integer are rejected.
pub fn parse_bind_index(key: &str, direction: BindDirection) -> SqlResult<usize> {
    match key.trim().parse::<usize>() {
        Ok(position) if position > 0 => Ok(position),
        _ => Err(SqlError::BadBindIndex {
            direction,
            key: key.to_string(),
        }),
    }
}

/// Split a type specification on its first `:`.
///
/// A blank user type counts as absent.
pub fn parse_type_spec(spec: &str) -> TypeSpec<'_> {
    match spec.split_once(':') {
        Some((sql_type, user_type)) => TypeSpec {
            sql_type: sql_type.trim(),
            user_type: Some(user_type.trim()).filter(|u| !u.is_empty()),
        },
        None => TypeSpec {
            sql_type: spec.trim(),
            user_type: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_statement() {
        assert_eq!(
            require_statement("  select 1 ", StatementKind::Query).unwrap(),
            "select 1"
        );
        assert!(matches!(
            require_statement(" \n\t", StatementKind::Call),
            Err(SqlError::EmptyStatement(StatementKind::Call))
        ));
    }

    #[test]
    fn test_parse_bind_index() {
        assert_eq!(parse_bind_index("1", BindDirection::In).unwrap(), 1);
        assert_eq!(parse_bind_index(" 07 ", BindDirection::In).unwrap(), 7);

        for bad in ["0", "-1", "x", "", "1.5"] {
            let err = parse_bind_index(bad, BindDirection::Out).unwrap_err();
            assert!(
                matches!(err, SqlError::BadBindIndex { direction: BindDirection::Out, ref key } if key == bad),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_type_spec() {
        assert_eq!(
            parse_type_spec("VARCHAR"),
            TypeSpec { sql_type: "VARCHAR", user_type: None }
        );
        assert_eq!(
            parse_type_spec("ARRAY:SCHEMA.NUM_LIST"),
            TypeSpec { sql_type: "ARRAY", user_type: Some("SCHEMA.NUM_LIST") }
        );
        assert_eq!(
            parse_type_spec("STRUCT:a:b"),
            TypeSpec { sql_type: "STRUCT", user_type: Some("a:b") }
        );
        assert_eq!(
            parse_type_spec("CLOB:  "),
            TypeSpec { sql_type: "CLOB", user_type: None }
        );
    }
}
