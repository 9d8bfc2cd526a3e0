use anyhow::Context;
use clap::{Parser, Subcommand};
use libris_kernel::settings::Settings;

#[derive(Parser)]
#[command(name = "libris")]
#[command(about = "Book catalogue API server", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Interface to bind, overrides `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides `server.port`
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the resolved settings as JSON
    Settings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().with_context(|| "failed to load Libris settings")?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }

            libris_telemetry::init(&settings.telemetry)?;
            libris_app::run(settings).await?;
        }
        Commands::Settings => {
            let mut rendered =
                serde_json::to_value(&settings).context("failed to render settings")?;
            rendered["database"]["url"] = serde_json::json!(settings.database.redacted_url());
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
    }

    Ok(())
}
