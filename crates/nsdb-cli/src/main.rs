use clap::Parser;
use nsdb_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = logging::init_logging(cli.instance().as_ref()) {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr: {:#}", err);
    }

    if let Err(err) = cli.run().await {
        eprintln!("nsdb error: {:#}", err);
        std::process::exit(1);
    }
}
