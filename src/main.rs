// sqlward - guarded sqlite from the command line

use sqlward::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // statement traces are opt-in per run (--trace), so let them through by default
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sqlward=warn,sqlward::trace=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run().await {
        eprintln!("error: {e:?}");
        std::process::exit(1);
    }
}
