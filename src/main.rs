use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use toolbus::logging;
use toolbus::server::Server;
use toolbus::tool::{integration_registry, notify_registry, weather_registry};
use toolbus::transport::Transport;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toolset {
    /// Arithmetic, text, and the interactive demo tools
    Integration,
    /// Canned weather lookup
    Weather,
    /// Webhook notification delivery
    Notify,
}

#[derive(Parser, Debug)]
#[command(name = "toolbus")]
#[command(about = "Serve a toolbus tool registry over stdio")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a toolset on stdin/stdout (newline-delimited JSON)
    Serve {
        /// Which builtin toolset to expose
        #[arg(long, value_enum, default_value = "integration")]
        toolset: Toolset,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    logging::cleanup_old_logs();

    let args = Args::parse();
    match args.command {
        Command::Serve { toolset } => {
            let registry = match toolset {
                Toolset::Integration => integration_registry(),
                Toolset::Weather => weather_registry(),
                Toolset::Notify => notify_registry(),
            };
            let server = Server::new(registry);
            server.serve(Transport::stdio()).await
        }
    }
}
