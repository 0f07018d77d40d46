// command line interface

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use crate::output::Output;
use crate::{Database, ErrorMode, LogTrace, Param, Records, Server, StatementKind};

#[derive(Parser)]
#[command(name = "sqlward", about = "Run sql against sqlite without wiping your tables")]
struct Cli {
    /// database file (must already exist) or :memory:
    #[arg(long, short, env = "SQLWARD_DB", default_value = ":memory:", global = true)]
    db: PathBuf,

    /// name used in log lines
    #[arg(long, global = true)]
    name: Option<String>,

    /// allow DROP statements (also turns off delete checking)
    #[arg(long, env = "SQLWARD_ALLOW_DROP", global = true)]
    allow_drop: bool,

    /// skip the shadow-copy check on DELETE
    #[arg(long, env = "SQLWARD_NO_DELETE_CHECK", global = true)]
    no_delete_check: bool,

    /// refuse statements of this kind (repeatable)
    #[arg(long = "ban", value_name = "KIND", global = true)]
    banned: Vec<StatementKind>,

    /// log failures and carry on instead of exiting
    #[arg(long, global = true)]
    swallow_errors: bool,

    /// log every statement sent to sqlite
    #[arg(long, global = true)]
    trace: bool,

    /// rows as objects keyed by column instead of arrays
    #[arg(long, global = true)]
    records: bool,

    /// print raw json instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// run a single statement
    Exec {
        sql: String,

        /// bound parameter, in placeholder order
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,
    },

    /// run several statements; reads stdin when no sql is given
    Batch {
        sql: Option<String>,

        /// bound parameter, shared by every statement with placeholders
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,
    },

    /// write a timestamped copy of the database
    Backup {
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        #[arg(long, default_value = "db")]
        ext: String,
    },

    /// start as http server
    Serve {
        /// port number
        #[arg(long, short, default_value = "3000")]
        port: u16,

        /// host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut db = Database::open(&cli.db, cli.name.as_deref()).await?;
    db.set_allow_dropping(cli.allow_drop);
    db.set_delete_checking(!cli.no_delete_check);
    for kind in &cli.banned {
        db.ban(*kind);
    }
    if cli.swallow_errors {
        db.set_error_mode(ErrorMode::Swallow);
    }
    if cli.trace {
        db.set_trace_sink(Some(Arc::new(LogTrace)));
    }
    if cli.records {
        db.set_row_factory(Arc::new(Records));
    }

    match cli.command {
        Commands::Exec { sql, params } => {
            let params: Vec<Param> = params.iter().map(|p| Param::parse(p)).collect();
            let outcome = db.execute(&sql, &params).await?;
            Output::outcome(&outcome, cli.json);
        }

        Commands::Batch { sql, params } => {
            let sql = match sql {
                Some(sql) => sql,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf).into_diagnostic()?;
                    buf
                }
            };
            let params: Vec<Param> = params.iter().map(|p| Param::parse(p)).collect();
            let outcome = db.execute_batch(&sql, &params).await?;
            Output::outcome(&outcome, cli.json);
        }

        Commands::Backup { dir, ext } => {
            let path = db.backup(&dir, &ext).await?;
            println!("{}", path.display());
        }

        Commands::Serve { port, host } => {
            return Ok(Server::run(db, &host, port).await?);
        }
    }

    db.close().await?;
    Ok(())
}
