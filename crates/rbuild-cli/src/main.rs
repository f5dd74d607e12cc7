//! Main CLI entry point for rbuild

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use rbuild_config::DEFAULT_CONFIG_FILE;
use tracing_subscriber::EnvFilter;

mod commands;

/// rbuild - Build native packages locally or as a broker-driven worker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Configuration file path (global option)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve build requests for one platform and architecture
    Serve {
        /// Target platform (defaults to the host platform)
        platform: Option<String>,

        /// Target architecture (defaults to the host architecture)
        arch: Option<String>,
    },

    /// Send a build request to a worker and wait for the result
    Request {
        /// Correlation id (random when omitted)
        #[arg(long, value_name = "ID")]
        op_id: Option<String>,

        /// Target platform
        #[arg(long, value_name = "PLATFORM")]
        platform: String,

        /// Target architecture
        #[arg(long, value_name = "ARCH")]
        arch: String,

        /// Generator arguments as one shell-quoted string
        #[arg(long, value_name = "ARGS", default_value = "")]
        branding: String,

        /// Package generator (e.g. DEB, RPM, APK)
        #[arg(long, value_name = "TYPE")]
        package_type: Option<String>,

        /// Where the worker hands the package off to
        #[arg(long, value_name = "DEST", default_value = "")]
        destination: String,

        /// Seconds to wait for the response
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Build a project locally
    Build {
        /// Project root containing the top-level CMakeLists.txt
        project_root: PathBuf,

        /// File with one generator argument per line
        #[arg(long, value_name = "FILE")]
        branding_file: Option<PathBuf>,

        /// Target platform (defaults to the host platform)
        #[arg(long, value_name = "PLATFORM")]
        platform: Option<String>,

        /// Target architecture (defaults to the host architecture)
        #[arg(long, value_name = "ARCH")]
        arch: Option<String>,

        /// Build driver: ninja or make
        #[arg(long, value_name = "SYSTEM")]
        build_system: Option<String>,

        /// Package generators (defaults to the platform's list)
        #[arg(long, value_name = "TYPE", value_delimiter = ',')]
        packages: Vec<String>,

        /// Build directory (defaults to build_<platform>_<arch> under the build root)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Validate configuration file and toolchain
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        /// Force overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Remove leftover build directories
    Clean {
        /// Only list what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre for better error reports
    color_eyre::install()?;

    // Parse command line arguments
    let cli = Cli::parse();

    // Set up logging
    setup_logging(cli.verbose, cli.quiet)?;

    // Determine config path
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    // Handle commands
    let result = match cli.command {
        Commands::Serve { platform, arch } => {
            let command = commands::ServeCommand::new(config_path, platform, arch);
            command.execute().await
        }

        Commands::Request {
            op_id,
            platform,
            arch,
            branding,
            package_type,
            destination,
            timeout,
        } => {
            let command = commands::RequestCommand {
                config_path,
                op_id,
                platform,
                arch,
                branding,
                package_type,
                destination,
                timeout,
            };
            command.execute().await
        }

        Commands::Build {
            project_root,
            branding_file,
            platform,
            arch,
            build_system,
            packages,
            output,
        } => {
            let command = commands::BuildCommand {
                config_path,
                project_root,
                branding_file,
                platform,
                arch,
                build_system,
                packages,
                output,
            };
            command.execute().await
        }

        Commands::Validate => {
            let command = commands::ValidateCommand::new(config_path);
            command.execute().await
        }

        Commands::Init { output, force } => {
            let command = commands::InitCommand::new(output, force);
            command.execute().await
        }

        Commands::Clean { dry_run } => {
            let command = commands::CleanCommand::new(config_path, dry_run);
            command.execute().await
        }
    };

    // Handle command execution result
    if let Err(e) = result {
        tracing::error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn setup_logging(verbose: u8, quiet: u8) -> Result<()> {
    let log_level = match (verbose, quiet) {
        (0, 0) => "info",
        (1, 0) => "debug",
        (v, 0) if v >= 2 => "trace",
        (0, 1) => "warn",
        (0, 2) => "error",
        (0, q) if q > 2 => "off",
        _ => "info", // If both are set, default to info
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
