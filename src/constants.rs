//! # System Constants
//!
//! Numeric SQL type codes and the names that resolve to them, plus the
//! environment variable names and defaults shared by the configuration and
//! logging layers.
//!
//! Type codes follow the JDBC 4.2 numbering so that type specs written for
//! existing stored-procedure wrappers (`"VARCHAR"`, `"CLOB"`,
//! `"oracle.jdbc.OracleTypes.CURSOR"`) keep resolving to the same codes.

/// Version tag of the standard type table in [`STANDARD_TYPE_NAMES`].
pub const STANDARD_TYPES_VERSION: &str = "jdbc-4.2";

/// Standard SQL type codes
pub mod sql_types {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const FLOAT: i32 = 6;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const LONGVARBINARY: i32 = -4;
    pub const NULL: i32 = 0;
    pub const OTHER: i32 = 1111;
    pub const JAVA_OBJECT: i32 = 2000;
    pub const DISTINCT: i32 = 2001;
    pub const STRUCT: i32 = 2002;
    pub const ARRAY: i32 = 2003;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const REF: i32 = 2006;
    pub const DATALINK: i32 = 70;
    pub const BOOLEAN: i32 = 16;
    pub const ROWID: i32 = -8;
    pub const NCHAR: i32 = -15;
    pub const NVARCHAR: i32 = -9;
    pub const LONGNVARCHAR: i32 = -16;
    pub const NCLOB: i32 = 2011;
    pub const SQLXML: i32 = 2009;
    pub const REF_CURSOR: i32 = 2012;
    pub const TIME_WITH_TIMEZONE: i32 = 2013;
    pub const TIMESTAMP_WITH_TIMEZONE: i32 = 2014;
}

/// Oracle driver extension codes
pub mod oracle_types {
    pub const CURSOR: i32 = -10;
    pub const BFILE: i32 = -13;
    pub const TIMESTAMPTZ: i32 = -101;
    pub const TIMESTAMPLTZ: i32 = -102;
    pub const INTERVALYM: i32 = -103;
    pub const INTERVALDS: i32 = -104;
    pub const BINARY_FLOAT: i32 = 100;
    pub const BINARY_DOUBLE: i32 = 101;
    pub const PLSQL_BOOLEAN: i32 = 252;
}

/// Bare type names accepted by the type codec, in declaration order.
pub const STANDARD_TYPE_NAMES: &[(&str, i32)] = &[
    ("BIT", sql_types::BIT),
    ("TINYINT", sql_types::TINYINT),
    ("SMALLINT", sql_types::SMALLINT),
    ("INTEGER", sql_types::INTEGER),
    ("BIGINT", sql_types::BIGINT),
    ("FLOAT", sql_types::FLOAT),
    ("REAL", sql_types::REAL),
    ("DOUBLE", sql_types::DOUBLE),
    ("NUMERIC", sql_types::NUMERIC),
    ("DECIMAL", sql_types::DECIMAL),
    ("CHAR", sql_types::CHAR),
    ("VARCHAR", sql_types::VARCHAR),
    ("LONGVARCHAR", sql_types::LONGVARCHAR),
    ("DATE", sql_types::DATE),
    ("TIME", sql_types::TIME),
    ("TIMESTAMP", sql_types::TIMESTAMP),
    ("BINARY", sql_types::BINARY),
    ("VARBINARY", sql_types::VARBINARY),
    ("LONGVARBINARY", sql_types::LONGVARBINARY),
    ("NULL", sql_types::NULL),
    ("OTHER", sql_types::OTHER),
    ("JAVA_OBJECT", sql_types::JAVA_OBJECT),
    ("DISTINCT", sql_types::DISTINCT),
    ("STRUCT", sql_types::STRUCT),
    ("ARRAY", sql_types::ARRAY),
    ("BLOB", sql_types::BLOB),
    ("CLOB", sql_types::CLOB),
    ("REF", sql_types::REF),
    ("DATALINK", sql_types::DATALINK),
    ("BOOLEAN", sql_types::BOOLEAN),
    ("ROWID", sql_types::ROWID),
    ("NCHAR", sql_types::NCHAR),
    ("NVARCHAR", sql_types::NVARCHAR),
    ("LONGNVARCHAR", sql_types::LONGNVARCHAR),
    ("NCLOB", sql_types::NCLOB),
    ("SQLXML", sql_types::SQLXML),
    ("REF_CURSOR", sql_types::REF_CURSOR),
    ("TIME_WITH_TIMEZONE", sql_types::TIME_WITH_TIMEZONE),
    ("TIMESTAMP_WITH_TIMEZONE", sql_types::TIMESTAMP_WITH_TIMEZONE),
];

/// Fully qualified vendor constants registered with every new codec.
pub const VENDOR_TYPE_NAMES: &[(&str, i32)] = &[
    ("oracle.jdbc.OracleTypes.CURSOR", oracle_types::CURSOR),
    ("oracle.jdbc.OracleTypes.BFILE", oracle_types::BFILE),
    ("oracle.jdbc.OracleTypes.TIMESTAMPTZ", oracle_types::TIMESTAMPTZ),
    ("oracle.jdbc.OracleTypes.TIMESTAMPLTZ", oracle_types::TIMESTAMPLTZ),
    ("oracle.jdbc.OracleTypes.INTERVALYM", oracle_types::INTERVALYM),
    ("oracle.jdbc.OracleTypes.INTERVALDS", oracle_types::INTERVALDS),
    ("oracle.jdbc.OracleTypes.BINARY_FLOAT", oracle_types::BINARY_FLOAT),
    ("oracle.jdbc.OracleTypes.BINARY_DOUBLE", oracle_types::BINARY_DOUBLE),
    ("oracle.jdbc.OracleTypes.PLSQL_BOOLEAN", oracle_types::PLSQL_BOOLEAN),
    ("oracle.jdbc.OracleTypes.CLOB", sql_types::CLOB),
    ("oracle.jdbc.OracleTypes.VARCHAR", sql_types::VARCHAR),
    ("oracle.jdbc.OracleTypes.NUMBER", sql_types::NUMERIC),
];

/// Environment and defaults shared by configuration and logging
pub mod system {
    /// Environment variable naming the deployment environment
    pub const ENV_VAR: &str = "DBTEMPLATE_ENV";
    /// Prefix for `DBTEMPLATE__SECTION__KEY` configuration overrides
    pub const ENV_PREFIX: &str = "DBTEMPLATE";
    /// Standard database URL override
    pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
    pub const DEFAULT_ENVIRONMENT: &str = "development";
    pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/dbtemplate_development";
    /// Rows fetched per round trip when draining server-side cursors
    pub const DEFAULT_FETCH_SIZE: u32 = 256;
    /// Maximum length of a call text in diagnostic output
    pub const DESCRIBE_CALL_MAX_LEN: usize = 100;
}
