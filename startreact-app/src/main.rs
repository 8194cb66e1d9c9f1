mod app;
mod cue;
mod sources;

use app::{App, Cli};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "startreact=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = App::new(Cli::parse())?;
    app.run()?;

    Ok(())
}
