mod fixtures;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

/// Server ownership claim and verification service.
#[derive(Parser)]
#[command(name = "holist", version, about = "Server ownership claim and verification service")]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the claim HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Path to TLS certificate PEM file (requires --tls-key)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires --tls-cert)
        #[arg(long)]
        tls_key: Option<PathBuf>,
        /// Fixture JSON files with server listings and users to pre-load
        #[arg()]
        fixtures: Vec<PathBuf>,
    },

    /// Validate a fixture file without starting the server
    CheckFixtures {
        /// Path to the fixture JSON file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            tls_cert,
            tls_key,
            fixtures,
        } => {
            // Validate TLS flags: both must be provided or neither
            if tls_cert.is_some() != tls_key.is_some() {
                eprintln!("error: --tls-cert and --tls-key must both be provided");
                process::exit(1);
            }
            let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            if let Err(e) = rt.block_on(serve::start_server(port, fixtures, tls_cert, tls_key)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::CheckFixtures { file } => {
            cmd_check_fixtures(&file, cli.quiet);
        }
    }
}

fn cmd_check_fixtures(path: &Path, quiet: bool) {
    match fixtures::load(path) {
        Ok(fixture) => {
            if !quiet {
                println!(
                    "{}: {} servers, {} users",
                    path.display(),
                    fixture.servers.len(),
                    fixture.users.len()
                );
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
