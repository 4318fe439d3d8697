use std::io;

use clap::Parser;
use rulebook::cli::{Cli, Commands};
use rulebook::commands;
use rulebook::config::Config;
use rulebook::index::IndexOrigin;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init()
        .ok();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(storage) = &cli.storage {
        config.index.storage_dir = storage.to_string_lossy().to_string();
    }
    if let Some(data) = &cli.data {
        config.index.data_dir = data.to_string_lossy().to_string();
    }

    match cli.command {
        Some(Commands::Index) => {
            let summary = commands::index(&config)?;
            let action = match summary.origin {
                IndexOrigin::Built => "Built",
                IndexOrigin::Loaded => "Loaded",
            };
            println!(
                "{action} index at {} ({} document(s), {} passage(s))",
                summary.storage.display(),
                summary.documents,
                summary.passages
            );
            Ok(())
        }
        Some(Commands::Ask { question, sources }) => {
            let result = commands::ask(&config, &question)?;
            println!("{}", result.response);

            if sources {
                for (i, passage) in result.source_nodes.iter().enumerate() {
                    println!(
                        "\n[{}] {} (score: {:.2})\n{}",
                        i + 1,
                        passage.path.display(),
                        passage.score,
                        passage.text
                    );
                }
            }
            Ok(())
        }
        Some(Commands::Chat { no_typing }) => {
            let session = commands::open_session(&config)?;
            commands::chat(&session, io::stdin().lock(), io::stdout(), !no_typing)
        }
        None => {
            Cli::parse_from(["rulebook", "--help"]);
            Ok(())
        }
    }
}
