// delete protection - rehearse the delete on a temp copy of the table first.
// if the copy ends up empty the real delete never runs

use sqlx::{Connection, SqliteConnection};
use tracing::{debug, warn};

use super::classify::{Classified, Target};
use super::db::{Outcome, Skip};
use super::engine::Engine;
use super::param::Param;
use crate::Error;

enum Rehearsal {
    Proceed,
    WouldEmpty,
}

pub(crate) async fn protected_delete(
    engine: &Engine<'_>,
    conn: &mut SqliteConnection,
    statement: &Classified,
    params: &[Param],
) -> Result<Outcome, Error> {
    let Some(target) = statement.target() else {
        return Err(Error::ClassificationAmbiguous(format!(
            "no target table found in `{}`",
            statement.sql()
        )));
    };
    let table = target.text();

    let mut tx = conn.begin().await.map_err(|e| shadow_error(table, e))?;

    match rehearse(engine, &mut tx, statement, params, target).await {
        Ok(Rehearsal::Proceed) => {
            let result = match engine.raw_execute(&mut tx, statement, params).await {
                Ok(result) => result,
                Err(e) => {
                    if let Err(rb) = tx.rollback().await {
                        warn!(database = engine.name, error = %rb, "rollback failed");
                    }
                    return Err(e.into());
                }
            };
            tx.commit().await?;
            Ok(Outcome::Completed(result))
        }
        Ok(Rehearsal::WouldEmpty) => {
            tx.rollback().await.map_err(|e| shadow_error(table, e))?;
            warn!(
                database = engine.name,
                table, "delete would empty the table, not committed"
            );
            Ok(Outcome::Skipped(Skip::WouldEmptyTable {
                table: table.to_string(),
            }))
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(database = engine.name, error = %rb, "rollback failed");
            }
            Err(shadow_error(table, e))
        }
    }
}

async fn rehearse(
    engine: &Engine<'_>,
    conn: &mut SqliteConnection,
    statement: &Classified,
    params: &[Param],
    target: &Target,
) -> Result<Rehearsal, sqlx::Error> {
    let table = target.text();

    // an empty table has nothing to lose
    if engine.row_count(conn, table).await? == 0 {
        return Ok(Rehearsal::Proceed);
    }

    debug!(database = engine.name, table, "rehearsing delete on a shadow copy");
    let shadow = engine.create_temporary_copy(conn, target).await?;

    let remaining = simulate(engine, conn, statement, params, &shadow).await;
    let dropped = engine.drop_temporary_copy(conn, &shadow).await;
    let remaining = remaining?;
    dropped?;

    debug!(database = engine.name, table, remaining, "rehearsal finished");
    if remaining > 0 {
        Ok(Rehearsal::Proceed)
    } else {
        Ok(Rehearsal::WouldEmpty)
    }
}

async fn simulate(
    engine: &Engine<'_>,
    conn: &mut SqliteConnection,
    statement: &Classified,
    params: &[Param],
    shadow: &str,
) -> Result<i64, sqlx::Error> {
    let sql = statement
        .retarget(shadow)
        .ok_or_else(|| sqlx::Error::Protocol("delete has no target to rewrite".to_string()))?;

    engine.raw_fetch(conn, &sql, params, false).await?;
    engine.row_count(conn, shadow).await
}

fn shadow_error(table: &str, source: sqlx::Error) -> Error {
    Error::ShadowCopy {
        table: table.to_string(),
        source,
    }
}
