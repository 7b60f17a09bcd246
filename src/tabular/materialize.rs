//! Cursor draining.

use super::{Cell, ColumnDescriptor, TabularResult};
use crate::database::driver::{Fetched, RowCursor};
use crate::error::{DriverError, DriverResult};
use crate::types::Value;
use futures::future::BoxFuture;
use tracing::{debug, warn};

/// Drain a cursor into a [`TabularResult`].
///
/// The cursor is closed after the drain whether or not it succeeded. A close
/// failure is logged and never replaces the drain outcome.
pub fn materialize(cursor: Box<dyn RowCursor>) -> BoxFuture<'static, DriverResult<TabularResult>> {
    Box::pin(async move {
        let mut cursor = cursor;
        let drained = drain(cursor.as_mut()).await;

        if let Err(e) = cursor.close().await {
            warn!(error = %e, "Failed to close result cursor after fetch");
        }

        let (columns, rows) = drained?;
        debug!(
            rows = rows.len(),
            columns = columns.len(),
            "Materialized result cursor"
        );
        TabularResult::from_parts(columns, rows)
    })
}

async fn drain(cursor: &mut dyn RowCursor) -> DriverResult<(Vec<ColumnDescriptor>, Vec<Vec<Cell>>)> {
    let columns = cursor.columns().await?;
    let width = columns.len();
    let mut rows = Vec::with_capacity(64);

    while let Some(raw) = cursor.next_row().await? {
        if raw.len() != width {
            return Err(DriverError::Protocol(format!(
                "cursor produced a row of {} values for {width} columns",
                raw.len()
            )));
        }
        let mut row = Vec::with_capacity(width);
        let mut values = raw.into_iter();
        while let Some(value) = values.next() {
            match resolve_fetched(value).await {
                Ok(cell) => row.push(cell),
                Err(e) => {
                    close_unread(values).await;
                    return Err(e);
                }
            }
        }
        rows.push(row);
    }

    Ok((columns, rows))
}

async fn close_unread(values: impl Iterator<Item = Fetched>) {
    for value in values {
        if let Fetched::Cursor(mut nested) = value {
            if let Err(e) = nested.close().await {
                warn!(error = %e, "Failed to close nested cursor");
            }
        }
    }
}

/// Turn a raw backend value into a cell, materializing nested cursors and
/// reading large character objects to text
pub async fn resolve_fetched(value: Fetched) -> DriverResult<Cell> {
    Ok(match value {
        Fetched::Null => Cell::Null,
        Fetched::Scalar(v) => Cell::Scalar(v),
        Fetched::Cursor(nested) => Cell::Nested(materialize(nested).await?),
        Fetched::Clob(clob) => Cell::Scalar(Value::Text(clob.read_to_string().await?)),
    })
}
