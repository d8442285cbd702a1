use std::path::PathBuf;

use anyhow::Context;
use catalog_kernel::settings::Settings;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "catalog", version, about = "Book catalog service")]
struct Cli {
    /// Directory holding `base.toml` and `<env>.toml`
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Deployment environment: local, staging or production
    #[arg(long, global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bootstrap every module and serve HTTP (default)
    Serve,
    /// Create tables and indexes, then exit
    InitDb,
    /// Print the resolved settings as JSON
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_with(cli.config_dir, cli.env)
        .with_context(|| "failed to load catalog settings")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            catalog_telemetry::init(&settings.telemetry)?;
            tracing::info!(
                env = ?settings.environment,
                db = %settings.database.url,
                "catalog serve starting"
            );
            catalog_app::run(settings).await
        }
        Command::InitDb => {
            catalog_telemetry::init(&settings.telemetry)?;
            let applied = catalog_app::init_database(&settings).await?;
            tracing::info!(applied, db = %settings.database.url, "schema applied");
            Ok(())
        }
        Command::Config => {
            let rendered = serde_json::to_string_pretty(&settings)
                .context("failed to render settings")?;
            println!("{}", rendered);
            Ok(())
        }
    }
}
