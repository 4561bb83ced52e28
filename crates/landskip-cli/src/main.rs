//! Landskip CLI - a landscape desired state applicator

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod error;
mod exit_codes;

use commands::apply::ApplyArgs;

#[derive(Parser)]
#[command(name = "landskip")]
#[command(version)]
#[command(about = "A landscape desired state applicator", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Be verbose
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Make the current landscape match the desired landscape
    Apply {
        /// Component descriptor files, or directories of them
        files: Vec<PathBuf>,

        /// Don't modify anything, only report what would change
        #[arg(long)]
        dry_run: bool,

        /// Wait until installed resources become ready
        #[arg(long)]
        wait: bool,

        /// How long to wait, in seconds
        #[arg(long, default_value_t = 300)]
        wait_timeout: u64,

        /// Don't prefix release names
        #[arg(long)]
        no_prefix: bool,

        /// Prepend this string to release names
        #[arg(long)]
        prefix: Option<String>,

        /// Default namespace for components that don't set one
        #[arg(short, long)]
        namespace: Option<String>,

        /// Kubernetes context to use
        #[arg(long)]
        context: Option<String>,

        /// Keep converging at --loop-interval
        #[arg(long = "loop")]
        loop_mode: bool,

        /// Seconds between reconciliation ticks
        #[arg(long, default_value_t = 300)]
        loop_interval: u64,

        /// Disable a stage (create, update, delete, deleteSecrets); repeatable
        #[arg(long = "disable", value_name = "STAGE")]
        disable: Vec<String>,

        /// Environment whose overlays apply
        #[arg(short, long)]
        environment: Option<String>,

        /// Global configuration override file
        #[arg(long)]
        config_override: Option<PathBuf>,

        /// Chart home directory
        #[arg(long)]
        chart_home: Option<PathBuf>,
    },

    /// Print version and build information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Apply {
            files,
            dry_run,
            wait,
            wait_timeout,
            no_prefix,
            prefix,
            namespace,
            context,
            loop_mode,
            loop_interval,
            disable,
            environment,
            config_override,
            chart_home,
        } => {
            commands::apply::run(ApplyArgs {
                files,
                dry_run,
                wait,
                wait_timeout,
                no_prefix,
                prefix,
                namespace,
                context,
                loop_mode,
                loop_interval,
                disable,
                environment,
                config_override,
                chart_home,
            })
            .await
        }

        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::from(code)
        }
    }
}
