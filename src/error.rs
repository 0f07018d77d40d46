use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::core::DenyReason;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    #[diagnostic(code(sqlward::database))]
    Database(#[from] sqlx::Error),

    #[error("Multiple statements not allowed here ({0} found)")]
    #[diagnostic(
        code(sqlward::multiple_statements),
        help("use execute_batch (or the `batch` command) for more than one statement")
    )]
    MultipleStatements(usize),

    #[error("Statement denied: {0}")]
    #[diagnostic(code(sqlward::policy_denied))]
    PolicyDenied(DenyReason),

    #[error("Could not classify statement: {0}")]
    #[diagnostic(code(sqlward::ambiguous))]
    ClassificationAmbiguous(String),

    #[error("Delete check on `{table}` failed: {source}")]
    #[diagnostic(
        code(sqlward::shadow_copy),
        help("the statement was rolled back, no rows were changed")
    )]
    ShadowCopy {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database does not exist on path: {0}")]
    #[diagnostic(code(sqlward::not_found))]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}
