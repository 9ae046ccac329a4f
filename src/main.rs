use clap::Parser;
use demandcast::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demandcast=info".into()),
        )
        .init();

    cli::run(Cli::parse())
}
