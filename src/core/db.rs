// guarded sqlite connection - every statement is classified and checked
// against this connection's policy before the engine sees it

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use tracing::{debug, error, info, warn};

use super::classify::{self, Classified, StatementKind};
use super::engine::Engine;
use super::param::Param;
use super::policy::{Decision, DenyReason, ErrorMode, Policy};
use super::rows::{QueryResult, RowFactory, Tuples};
use super::shadow;
use super::trace::TraceSink;
use crate::Error;

const MEMORY: &str = ":memory:";

/// Result of one guarded execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed(QueryResult),
    /// nothing was changed
    Skipped(Skip),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Skip {
    WouldEmptyTable { table: String },
    Denied { denied: DenyReason },
    Swallowed { error: String },
}

impl Outcome {
    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

pub struct Database {
    name: String,
    path: Option<PathBuf>,
    conn: SqliteConnection,
    policy: Policy,
    rows: Arc<dyn RowFactory>,
    trace: Option<Arc<dyn TraceSink>>,
    recent: Option<QueryResult>,
}

impl Database {
    /// Opens an existing database file. Unlike plain sqlite this never
    /// creates a new file; `:memory:` opens a private in-memory database.
    pub async fn open(path: impl AsRef<Path>, name: Option<&str>) -> Result<Self, Error> {
        let path = path.as_ref();
        if path.as_os_str() == MEMORY {
            return Self::memory().await;
        }

        if !tokio::fs::try_exists(path).await? {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };

        let conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .connect()
            .await?;

        info!(database = %name, path = %path.display(), "opened database");
        Ok(Self::with_connection(name, Some(path.to_path_buf()), conn))
    }

    pub async fn memory() -> Result<Self, Error> {
        let conn = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()?
            .connect()
            .await?;

        info!(database = "memory", "opened in-memory database");
        Ok(Self::with_connection("memory".to_string(), None, conn))
    }

    fn with_connection(name: String, path: Option<PathBuf>, conn: SqliteConnection) -> Self {
        Self {
            name,
            path,
            conn,
            policy: Policy::default(),
            rows: Arc::new(Tuples),
            trace: None,
            recent: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn close(self) -> Result<(), Error> {
        self.conn.close().await?;
        Ok(())
    }

    // policy

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    pub fn set_allow_dropping(&mut self, allow: bool) {
        self.policy.allow_dropping = allow;
    }

    pub fn set_delete_checking(&mut self, enable: bool) {
        self.policy.check_delete_statements = enable;
    }

    pub fn set_verify_selective_deletes(&mut self, enable: bool) {
        self.policy.verify_selective_deletes = enable;
    }

    pub fn ban(&mut self, kind: StatementKind) {
        self.policy.banned.insert(kind);
    }

    pub fn unban(&mut self, kind: StatementKind) {
        self.policy.banned.remove(&kind);
    }

    pub fn set_error_mode(&mut self, mode: ErrorMode) {
        self.policy.error_mode = mode;
    }

    // hooks

    /// Every statement sent to the engine, internal ones included, is
    /// passed to the sink. `None` turns tracing off.
    pub fn set_trace_sink(&mut self, sink: Option<Arc<dyn TraceSink>>) {
        self.trace = sink;
    }

    pub fn set_row_factory(&mut self, factory: Arc<dyn RowFactory>) {
        self.rows = factory;
    }

    /// Last result returned by a completed `execute` or `execute_batch`.
    pub fn recent(&self) -> Option<&QueryResult> {
        self.recent.as_ref()
    }

    // execution

    /// Runs exactly one statement. Anything with more than one statement
    /// fails with `MultipleStatements`.
    pub async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<Outcome, Error> {
        let result = match classify::classify(sql) {
            Ok(statement) => self.run(&statement, params).await,
            Err(e) => Err(e),
        };

        let outcome = self.settle(result)?;
        self.remember(&outcome);
        Ok(outcome)
    }

    /// Runs every statement in order, each checked on its own. A denied or
    /// aborted statement doesn't stop the rest. Returns the first
    /// statement's outcome. Parameters only bind to statements that have
    /// placeholders.
    pub async fn execute_batch(&mut self, sql: &str, params: &[Param]) -> Result<Outcome, Error> {
        let statements = match classify::split(sql) {
            Ok(statements) => statements,
            Err(e) => return self.settle(Err(e)),
        };

        let mut first = None;
        for statement in &statements {
            let bound: &[Param] = if statement.placeholders() > 0 {
                params
            } else {
                &[]
            };

            let outcome = match self.run(statement, bound).await {
                Ok(outcome) => outcome,
                Err(Error::PolicyDenied(denied)) => Outcome::Skipped(Skip::Denied { denied }),
                Err(e) => self.settle(Err(e))?,
            };
            first.get_or_insert(outcome);
        }

        let outcome = first.unwrap_or_else(|| Outcome::Completed(QueryResult::default()));
        self.remember(&outcome);
        Ok(outcome)
    }

    async fn run(&mut self, statement: &Classified, params: &[Param]) -> Result<Outcome, Error> {
        if statement.is_empty() {
            return Ok(Outcome::Completed(QueryResult::default()));
        }

        let decision = self.policy.decide(statement);
        debug!(
            database = %self.name,
            kind = %statement.kind(),
            ?decision,
            "classified statement"
        );

        let engine = Engine {
            name: &self.name,
            rows: self.rows.as_ref(),
            trace: self.trace.as_deref(),
        };

        match decision {
            Decision::Deny(reason) => {
                warn!(database = %self.name, %reason, sql = statement.sql(), "statement denied");
                Err(Error::PolicyDenied(reason))
            }
            Decision::Protect => {
                shadow::protected_delete(&engine, &mut self.conn, statement, params).await
            }
            Decision::Allow => {
                let result = engine.raw_execute(&mut self.conn, statement, params).await?;
                Ok(Outcome::Completed(result))
            }
        }
    }

    // applies the error mode once the statement is fully cleaned up
    fn settle(&self, result: Result<Outcome, Error>) -> Result<Outcome, Error> {
        match (result, self.policy.error_mode) {
            (Ok(outcome), _) => Ok(outcome),
            (Err(e), ErrorMode::Propagate) => Err(e),
            (Err(Error::PolicyDenied(denied)), ErrorMode::Swallow) => {
                Ok(Outcome::Skipped(Skip::Denied { denied }))
            }
            (Err(e), ErrorMode::Swallow) => {
                error!(database = %self.name, error = %e, "statement failed");
                Ok(Outcome::Skipped(Skip::Swallowed {
                    error: e.to_string(),
                }))
            }
        }
    }

    fn remember(&mut self, outcome: &Outcome) {
        if let Outcome::Completed(result) = outcome {
            self.recent = Some(result.clone());
        }
    }

    /// Writes a consistent copy of the database to
    /// `dir/<timestamp>.<extension>` and returns the path.
    pub async fn backup(&mut self, dir: impl AsRef<Path>, extension: &str) -> Result<PathBuf, Error> {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H-%M-%S");
        let path = dir.as_ref().join(format!("{stamp}.{extension}"));

        let sql = "VACUUM INTO ?";
        if let Some(sink) = &self.trace {
            sink.trace(&self.name, sql);
        }
        sqlx::query(sql)
            .bind(path.to_string_lossy().into_owned())
            .execute(&mut self.conn)
            .await?;

        info!(database = %self.name, path = %path.display(), "backup written");
        Ok(path)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
