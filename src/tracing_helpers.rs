//! Span constructors used when the `tracing` feature is enabled.
//!
//! Callers enter the span for the duration of the operation:
//! `let _span = tracing_helpers::execute_query_span(sql).entered();`

use tracing::{info_span, Span};

pub fn acquire_connection_span(target: &str) -> Span {
    info_span!("keel.connection.acquire", db.target = target)
}

pub fn execute_query_span(sql: &str) -> Span {
    info_span!("keel.query.execute", db.statement = sql)
}

pub fn begin_transaction_span() -> Span {
    info_span!("keel.transaction.begin")
}

pub fn commit_transaction_span() -> Span {
    info_span!("keel.transaction.commit")
}

pub fn rollback_transaction_span() -> Span {
    info_span!("keel.transaction.rollback")
}

pub fn apply_migration_span(name: &str, version: i64) -> Span {
    info_span!("keel.migration.apply", migration.name = name, migration.version = version)
}
