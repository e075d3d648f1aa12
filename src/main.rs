use clap::Parser;
use anyhow::{Context, Result};

use mailwatch::{
    cli::Cli,
    lifecycle,
    processors::ProcessorRegistry,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.setup_logging();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ERROR! {}", err);
            std::process::exit(1);
        }
    };

    let registry = ProcessorRegistry::with_builtins();
    let ctx = cli.processor_context();

    let running = match lifecycle::start(&config, &registry, &ctx) {
        Ok(running) => running,
        Err(err) => {
            eprintln!("ERROR! {}", err);
            std::process::exit(err.exit_code());
        }
    };

    tracing::info!("Watching {} directories, press Ctrl+C to quit", running.watch_set().len());

    let shutdown = running.shutdown_signal();
    ctrlc::set_handler(move || {
        shutdown.trigger();
    })
    .context("Failed to install Ctrl+C handler")?;

    running.wait();
    Ok(())
}
