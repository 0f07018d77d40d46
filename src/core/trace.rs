// optional sink that sees every statement sent to the engine

use tracing::info;

pub trait TraceSink: Send + Sync {
    fn trace(&self, database: &str, sql: &str);
}

/// Logs each statement as `[database] statement`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    fn trace(&self, database: &str, sql: &str) {
        info!(target: "sqlward::trace", "[{database}] {sql}");
    }
}

impl<F> TraceSink for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn trace(&self, database: &str, sql: &str) {
        self(database, sql)
    }
}
