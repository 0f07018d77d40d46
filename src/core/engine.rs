// raw access to the sqlite connection - no policy applied at this level

use sqlx::SqliteConnection;
use uuid::Uuid;

use super::classify::{Classified, Target};
use super::param::Param;
use super::rows::{QueryResult, RowFactory};
use super::trace::TraceSink;

/// What the executor needs from the connection it guards.
pub(crate) struct Engine<'a> {
    pub name: &'a str,
    pub rows: &'a dyn RowFactory,
    pub trace: Option<&'a dyn TraceSink>,
}

impl Engine<'_> {
    fn traced(&self, sql: &str) {
        if let Some(sink) = self.trace {
            sink.trace(self.name, sql);
        }
    }

    /// Runs an already-approved statement and captures its rows.
    pub async fn raw_execute(
        &self,
        conn: &mut SqliteConnection,
        statement: &Classified,
        params: &[Param],
    ) -> Result<QueryResult, sqlx::Error> {
        self.raw_fetch(conn, statement.sql(), params, statement.kind().mutates_rows())
            .await
    }

    pub async fn raw_fetch(
        &self,
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[Param],
        mutates: bool,
    ) -> Result<QueryResult, sqlx::Error> {
        self.traced(sql);

        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Param::Null => query.bind(None::<i64>),
                Param::Bool(v) => query.bind(*v),
                Param::Integer(v) => query.bind(*v),
                Param::Real(v) => query.bind(*v),
                Param::Text(v) => query.bind(v.as_str()),
                Param::Blob(v) => query.bind(v.as_slice()),
            };
        }

        let rows = query.fetch_all(&mut *conn).await?;
        let mut result = QueryResult::from_rows(&rows, self.rows);
        if mutates {
            result.rows_affected = self.changes(conn).await?;
        }

        Ok(result)
    }

    // rows changed by the most recent insert/update/delete on this connection
    async fn changes(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let n: i64 = sqlx::query_scalar("SELECT changes()")
            .fetch_one(&mut *conn)
            .await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    pub async fn row_count(
        &self,
        conn: &mut SqliteConnection,
        relation: &str,
    ) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {relation}");
        self.traced(&sql);
        sqlx::query_scalar(&sql)
            .persistent(false)
            .fetch_one(&mut *conn)
            .await
    }

    /// Copies `target` into a fresh temp table and returns its quoted name.
    /// Rowids are carried over so predicates on them match the same rows.
    pub async fn create_temporary_copy(
        &self,
        conn: &mut SqliteConnection,
        target: &Target,
    ) -> Result<String, sqlx::Error> {
        let id = format!("shadow_{}", Uuid::new_v4().simple());
        let shadow = quote(&id);
        let table = target.text();

        let sql = format!("CREATE TEMP TABLE {shadow} AS SELECT * FROM {table} WHERE 0");
        self.execute_unprepared(conn, &sql).await?;

        let sql = "SELECT name FROM pragma_table_info(?1, 'temp') ORDER BY cid";
        self.traced(sql);
        let columns: Vec<String> = sqlx::query_scalar(sql)
            .bind(&id)
            .fetch_all(&mut *conn)
            .await?;

        let alias = if self.has_rowid(conn, target).await? {
            ROWID_ALIASES
                .iter()
                .find(|alias| !columns.iter().any(|c| c.eq_ignore_ascii_case(alias)))
        } else {
            None
        };

        let sql = match alias {
            Some(alias) => {
                let list: Vec<String> = columns.iter().map(|c| quote(c)).collect();
                format!(
                    "INSERT INTO {shadow} ({alias}, {}) SELECT {alias}, * FROM {table}",
                    list.join(", ")
                )
            }
            // WITHOUT ROWID tables and views have no rowid to keep
            None => format!("INSERT INTO {shadow} SELECT * FROM {table}"),
        };
        self.execute_unprepared(conn, &sql).await?;

        Ok(shadow)
    }

    // false for WITHOUT ROWID tables, views, and anything not found
    async fn has_rowid(
        &self,
        conn: &mut SqliteConnection,
        target: &Target,
    ) -> Result<bool, sqlx::Error> {
        let sql = match &target.schema {
            Some(schema) => format!(
                "SELECT sql FROM {}.sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                quote(schema)
            ),
            None => "SELECT sql FROM sqlite_temp_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE \
                     UNION ALL \
                     SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE"
                .to_string(),
        };

        self.traced(&sql);
        let definition: Option<String> = sqlx::query_scalar(&sql)
            .persistent(false)
            .bind(&target.name)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(definition.is_some_and(|text| !text.to_ascii_uppercase().contains("WITHOUT ROWID")))
    }

    async fn execute_unprepared(
        &self,
        conn: &mut SqliteConnection,
        sql: &str,
    ) -> Result<(), sqlx::Error> {
        self.traced(sql);
        sqlx::query(sql).persistent(false).execute(&mut *conn).await?;
        Ok(())
    }

    pub async fn drop_temporary_copy(
        &self,
        conn: &mut SqliteConnection,
        shadow: &str,
    ) -> Result<(), sqlx::Error> {
        let sql = format!("DROP TABLE IF EXISTS temp.{shadow}");
        self.execute_unprepared(conn, &sql).await
    }
}

// a column with one of these names hides that spelling of the rowid
const ROWID_ALIASES: &[&str] = &["rowid", "_rowid_", "oid"];

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
