mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use teleflow_core::logging::{self, LogFormat};
use teleflow_core::TeleflowError;

#[derive(Parser)]
#[command(
    name = "teleflow",
    version,
    about = "Telemetry declaration validator and data normalizer"
)]
struct Cli {
    /// Agent settings file (teleflow.toml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a declaration and print the resulting document
    Validate {
        /// Declaration file, or "-" for stdin
        file: String,
        /// Validate a single Telemetry_Namespace object
        #[arg(long)]
        namespace: bool,
        /// Leave backtick pointers unexpanded
        #[arg(long)]
        no_expand: bool,
        /// Device type the agent runs on (bigip, container)
        #[arg(long, default_value = "container")]
        device_type: String,
    },
    /// Normalize raw events, one per line
    NormalizeEvent {
        /// Event file, or "-" for stdin
        input: String,
    },
    /// Build the system info record from endpoint responses
    NormalizeStats {
        /// JSON object mapping endpoint to raw response, or "-" for stdin
        file: String,
    },
    /// Check an agent settings file
    CheckConfig {
        /// Settings file to check
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match commands::load_settings(cli.settings.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let format = LogFormat::parse(&settings.logging.format).unwrap_or_default();
    if let Err(e) = logging::init(&settings.logging.level, format) {
        eprintln!("Warning: {e}");
    }

    let result = match cli.command {
        Commands::Validate {
            file,
            namespace,
            no_expand,
            device_type,
        } => commands::validate::run(&settings, file, namespace, no_expand, device_type).await,
        Commands::NormalizeEvent { input } => commands::normalize_event::run(&settings, input),
        Commands::NormalizeStats { file } => commands::normalize_stats::run(&settings, file),
        Commands::CheckConfig { file } => commands::check_config::run(file),
    };

    if let Err(e) = result {
        match &e {
            TeleflowError::Validation(failure) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&failure.to_json()).unwrap_or_default()
                );
                eprintln!("Error: declaration is invalid");
            }
            _ => {
                eprintln!("Error: {e}");
            }
        }
        std::process::exit(1);
    }
}
