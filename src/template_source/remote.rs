use super::locator::{LocationDescriptor, TemplateLocator};
use super::{TemplateLoader, TemplateReader};
use crate::config::TemplateSourceConfig;
use crate::constants::{sql_types, system};
use crate::database::driver::{DbConnection, Fetched, PreparedCall};
use crate::database::ConnectionRegistry;
use crate::error::{DriverError, DriverResult, TemplateSourceError, TemplateSourceResult};
use crate::logging::{log_error, log_template_operation};
use crate::types::{BindValue, Value};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shape of the resolver, loader and checker calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceVariant {
    /// Procedures exchanging the five-part object description
    #[default]
    Object,
    /// Functions exchanging a single opaque locator string
    Locator,
}

#[derive(Default)]
struct Handles {
    resolver: Option<Box<dyn PreparedCall>>,
    loader: Option<Box<dyn PreparedCall>>,
    checker: Option<Box<dyn PreparedCall>>,
}

/// Reads templates from the database through three cached prepared calls on
/// one connection.
///
/// Handles are prepared on first use and kept until [`reset`](Self::reset).
/// Object variant call shapes:
///
/// - resolver: `(name IN, owner OUT, object OUT, section OUT, dblink OUT, kind OUT)`
/// - loader: `(owner, object, section, dblink, kind IN, body OUT CLOB)`
/// - checker: `(owner, object, section, dblink, kind IN, timestamp OUT BIGINT)`
///
/// The locator variant uses `{? = call f(?)}` for each, with the return value
/// at position 1 and the name or locator at position 2.
pub struct RemoteTemplateSource {
    connection: Arc<dyn DbConnection>,
    variant: SourceVariant,
    resolver_call: String,
    loader_call: String,
    checker_call: Option<String>,
    handles: Mutex<Handles>,
    last_now: AtomicI64,
}

impl std::fmt::Debug for RemoteTemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

fn locator_call(function: &str) -> String {
    format!("{{? = call {}(?)}}", function.trim())
}

fn non_blank(call: Option<&str>) -> Option<&str> {
    call.filter(|c| !c.trim().is_empty())
}

impl RemoteTemplateSource {
    /// Object variant; the calls are used verbatim
    pub fn object(
        connection: Arc<dyn DbConnection>,
        resolver_call: &str,
        loader_call: &str,
        checker_call: Option<&str>,
    ) -> Self {
        Self::build(
            connection,
            SourceVariant::Object,
            resolver_call.to_string(),
            loader_call.to_string(),
            non_blank(checker_call).map(str::to_string),
        )
    }

    /// Locator variant; the arguments are function names
    pub fn locator(
        connection: Arc<dyn DbConnection>,
        resolver_function: &str,
        loader_function: &str,
        checker_function: Option<&str>,
    ) -> Self {
        Self::build(
            connection,
            SourceVariant::Locator,
            locator_call(resolver_function),
            locator_call(loader_function),
            non_blank(checker_function).map(locator_call),
        )
    }

    pub fn from_config(connection: Arc<dyn DbConnection>, config: &TemplateSourceConfig) -> Self {
        let checker = config.checker_call.as_deref();
        match config.variant {
            SourceVariant::Object => {
                Self::object(connection, &config.resolver_call, &config.loader_call, checker)
            }
            SourceVariant::Locator => {
                Self::locator(connection, &config.resolver_call, &config.loader_call, checker)
            }
        }
    }

    /// Build on the registry's default connection
    pub async fn with_default_connection(
        registry: &ConnectionRegistry,
        config: &TemplateSourceConfig,
    ) -> DriverResult<Self> {
        let facade = registry.default_connection().await?;
        Ok(Self::from_config(facade.connection().clone(), config))
    }

    fn build(
        connection: Arc<dyn DbConnection>,
        variant: SourceVariant,
        resolver_call: String,
        loader_call: String,
        checker_call: Option<String>,
    ) -> Self {
        Self {
            connection,
            variant,
            resolver_call,
            loader_call,
            checker_call,
            handles: Mutex::new(Handles::default()),
            last_now: AtomicI64::new(i64::MIN),
        }
    }

    pub fn variant(&self) -> SourceVariant {
        self.variant
    }

    pub fn has_checker(&self) -> bool {
        self.checker_call.is_some()
    }

    /// Resolve a template name; `None` when the database does not know it
    pub async fn resolve(&self, name: &str) -> TemplateSourceResult<Option<LocationDescriptor>> {
        let mut handles = self.handles.lock().await;
        let outcome = async {
            let call =
                prepared(&mut handles.resolver, self.connection.as_ref(), &self.resolver_call)
                    .await?;
            match self.variant {
                SourceVariant::Object => resolve_object(call, name).await,
                SourceVariant::Locator => resolve_locator(call, name).await,
            }
        }
        .await;

        let resolved = outcome.map_err(|source| {
            log_error("template_source", "resolve", &source.to_string(), Some(name));
            TemplateSourceError::SourceResolution {
                name: name.to_string(),
                source,
            }
        })?;
        log_template_operation(
            "resolve",
            name,
            if resolved.is_some() { "found" } else { "not_found" },
            None,
        );
        Ok(resolved)
    }

    /// Modification timestamp of a resolved template in epoch milliseconds.
    ///
    /// Without a checker call this is the current time, never smaller than a
    /// value returned before.
    pub async fn check_freshness(&self, descriptor: &LocationDescriptor) -> TemplateSourceResult<i64> {
        let Some(checker_call) = &self.checker_call else {
            return Ok(self.now_millis());
        };

        let mut handles = self.handles.lock().await;
        let outcome = async {
            let call =
                prepared(&mut handles.checker, self.connection.as_ref(), checker_call).await?;
            let position = bind_descriptor(call, descriptor, sql_types::BIGINT)?;
            call.execute().await?;
            fetched_to_millis(call.take_out(position)?).await
        }
        .await;

        outcome.map_err(|source| TemplateSourceError::FreshnessCheck {
            locator: descriptor.to_string(),
            source,
        })
    }

    /// Open the body of a resolved template as a character stream
    pub async fn load(&self, descriptor: &LocationDescriptor) -> TemplateSourceResult<TemplateReader> {
        let mut handles = self.handles.lock().await;
        let outcome = async {
            let call =
                prepared(&mut handles.loader, self.connection.as_ref(), &self.loader_call).await?;
            let position = bind_descriptor(call, descriptor, sql_types::CLOB)?;
            call.execute().await?;
            fetched_to_reader(call.take_out(position)?).await
        }
        .await;

        let reader = outcome.map_err(|source| {
            let locator = descriptor.to_string();
            log_error("template_source", "load", &source.to_string(), Some(&locator));
            TemplateSourceError::SourceLoad { locator, source }
        })?;
        log_template_operation("load", &descriptor.to_string(), "loaded", None);
        Ok(reader)
    }

    /// Close and forget every cached handle; close failures are ignored
    pub async fn reset(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for (label, handle) in [
            ("resolver", handles.resolver),
            ("loader", handles.loader),
            ("checker", handles.checker),
        ] {
            if let Some(mut handle) = handle {
                if let Err(e) = handle.close().await {
                    debug!(handle = label, error = %e, "Ignoring failure to close template source call");
                }
            }
        }
        debug!("Template source handles reset");
    }

    /// Diagnostic form of the configured calls; never touches the connection
    pub fn describe(&self) -> String {
        format!(
            "RemoteTemplateSource(variant={:?}; resolver_call={}; loader_call={}; checker_call={})",
            self.variant,
            format_call(Some(&self.resolver_call)),
            format_call(Some(&self.loader_call)),
            format_call(self.checker_call.as_deref()),
        )
    }

    fn now_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self.last_now.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}

async fn prepared<'a>(
    slot: &'a mut Option<Box<dyn PreparedCall>>,
    connection: &dyn DbConnection,
    call: &str,
) -> DriverResult<&'a mut (dyn PreparedCall + 'static)> {
    if slot.is_none() {
        *slot = Some(connection.prepare_call(call).await?);
        debug!(call = %call, "Prepared template source call");
    }
    slot.as_deref_mut().ok_or(DriverError::StatementClosed)
}

async fn resolve_object(
    call: &mut dyn PreparedCall,
    name: &str,
) -> DriverResult<Option<LocationDescriptor>> {
    call.bind(1, BindValue::from(name))?;
    for position in 2..=6 {
        call.register_out(position, sql_types::VARCHAR, None)?;
    }
    call.execute().await?;

    let mut parts = Vec::with_capacity(5);
    for position in 2..=6 {
        parts.push(fetched_to_string(call.take_out(position)?).await?);
    }
    let [owner, object, section, dblink, kind]: [Option<String>; 5] = parts
        .try_into()
        .map_err(|_| DriverError::Protocol("resolver produced the wrong number of outputs".to_string()))?;

    let (Some(owner), Some(object), Some(kind)) = (
        owner.filter(|s| !s.is_empty()),
        object.filter(|s| !s.is_empty()),
        kind.filter(|s| !s.is_empty()),
    ) else {
        return Ok(None);
    };
    Ok(Some(LocationDescriptor::Object(TemplateLocator::new(
        name,
        owner,
        object,
        section.as_deref(),
        dblink.as_deref(),
        &kind,
    ))))
}

async fn resolve_locator(
    call: &mut dyn PreparedCall,
    name: &str,
) -> DriverResult<Option<LocationDescriptor>> {
    call.bind(2, BindValue::from(name))?;
    call.register_out(1, sql_types::VARCHAR, None)?;
    call.execute().await?;
    Ok(fetched_to_string(call.take_out(1)?)
        .await?
        .filter(|s| !s.is_empty())
        .map(LocationDescriptor::Locator))
}

/// Bind a descriptor as inputs and register the single output of type
/// `out_type`, returning the output position
fn bind_descriptor(
    call: &mut dyn PreparedCall,
    descriptor: &LocationDescriptor,
    out_type: i32,
) -> DriverResult<usize> {
    match descriptor {
        LocationDescriptor::Object(locator) => {
            for (i, arg) in locator.call_arguments().into_iter().enumerate() {
                call.bind(i + 1, BindValue::from(arg))?;
            }
            call.register_out(6, out_type, None)?;
            Ok(6)
        }
        LocationDescriptor::Locator(locator) => {
            call.bind(2, BindValue::from(locator.as_str()))?;
            call.register_out(1, out_type, None)?;
            Ok(1)
        }
    }
}

async fn discard_cursor(value: Fetched) -> DriverError {
    if let Fetched::Cursor(mut cursor) = value {
        let _ = cursor.close().await;
    }
    DriverError::Protocol("template source call returned a cursor".to_string())
}

async fn fetched_to_string(value: Fetched) -> DriverResult<Option<String>> {
    match value {
        Fetched::Null => Ok(None),
        Fetched::Scalar(Value::Text(text)) => Ok(Some(text)),
        Fetched::Scalar(other) => Ok(Some(other.to_string())),
        Fetched::Clob(clob) => Ok(Some(clob.read_to_string().await?)),
        cursor @ Fetched::Cursor(_) => Err(discard_cursor(cursor).await),
    }
}

/// A null timestamp reads as 0
async fn fetched_to_millis(value: Fetched) -> DriverResult<i64> {
    let invalid = |shown: String| {
        DriverError::Protocol(format!("checker returned a non-integer timestamp: {shown}"))
    };
    match value {
        Fetched::Null => Ok(0),
        Fetched::Scalar(Value::Int(millis)) => Ok(millis),
        Fetched::Scalar(Value::Decimal(d)) => d
            .with_scale(0)
            .to_string()
            .parse()
            .map_err(|_| invalid(d.to_string())),
        Fetched::Scalar(Value::Text(text)) => {
            text.trim().parse().map_err(|_| invalid(text.clone()))
        }
        Fetched::Scalar(other) => Err(invalid(other.to_string())),
        Fetched::Clob(_) => Err(invalid("CLOB".to_string())),
        cursor @ Fetched::Cursor(_) => Err(discard_cursor(cursor).await),
    }
}

async fn fetched_to_reader(value: Fetched) -> DriverResult<TemplateReader> {
    match value {
        Fetched::Clob(clob) => Ok(clob.into_reader()),
        Fetched::Scalar(Value::Text(text)) => Ok(Box::new(std::io::Cursor::new(text.into_bytes()))),
        Fetched::Null => Err(DriverError::Protocol(
            "loader returned no template body".to_string(),
        )),
        Fetched::Scalar(other) => Err(DriverError::UnsupportedType {
            type_name: other.kind().to_string(),
            context: "template body".to_string(),
        }),
        cursor @ Fetched::Cursor(_) => Err(discard_cursor(cursor).await),
    }
}

/// Collapse whitespace, redact quoted literals and cap the length
fn format_call(call: Option<&str>) -> String {
    let Some(call) = call else {
        return "null".to_string();
    };

    let mut redacted = String::with_capacity(call.len());
    let mut in_literal = false;
    for ch in call.chars() {
        if ch == '\'' {
            if !in_literal {
                redacted.push_str("'***");
            } else {
                redacted.push('\'');
            }
            in_literal = !in_literal;
        } else if !in_literal {
            redacted.push(ch);
        }
    }
    if in_literal {
        redacted.push('\'');
    }

    let collapsed = redacted.split_whitespace().collect::<Vec<_>>().join(" ");
    let max = system::DESCRIBE_CALL_MAX_LEN;
    if collapsed.chars().count() > max {
        let truncated: String = collapsed.chars().take(max).collect();
        format!("\"{truncated}...\"")
    } else {
        format!("\"{collapsed}\"")
    }
}

#[async_trait]
impl TemplateLoader for RemoteTemplateSource {
    type Source = LocationDescriptor;

    async fn find_template_source(&self, name: &str) -> TemplateSourceResult<Option<Self::Source>> {
        self.resolve(name).await
    }

    async fn last_modified(&self, source: &Self::Source) -> TemplateSourceResult<i64> {
        self.check_freshness(source).await
    }

    async fn reader(&self, source: &Self::Source) -> TemplateSourceResult<TemplateReader> {
        self.load(source).await
    }

    async fn reset_state(&self) {
        self.reset().await
    }
}
