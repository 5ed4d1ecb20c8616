use clap::Parser;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;
use vclink_core::server::LinkServer;

/// Feeds host game events into the positional voice link bridge.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Read events from a file instead of stdin
    #[arg(long)]
    feed: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let logfile = tracing_appender::rolling::daily("./logs", "vclink.log");
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("VCLINK_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_writer(logfile.and(std::io::stdout))
        .with_env_filter(env_filter)
        .init();

    if let Err(err) = LinkServer::run(cli.feed.as_deref()) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
