use clap::Parser;
use suffixarray_builder::{run, Arguments};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Arguments::parse();
    if let Err(err) = run(args) {
        error!("{err}");
        std::process::exit(1);
    }
}
