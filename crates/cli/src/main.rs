mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use whisker_eval::{Encoding, OverflowBehavior};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Whisker template renderer.
#[derive(Parser)]
#[command(name = "whisker", version, about = "Whisker template renderer")]
struct Cli {
    /// Output format for diagnostics (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log render diagnostics to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template against JSON data
    Render {
        /// Path to the template file
        template: PathBuf,
        /// JSON file with the data to render (default: empty object)
        #[arg(long)]
        data: Option<PathBuf>,
        /// TOML file with render settings
        #[arg(long)]
        config: Option<PathBuf>,
        /// Maximum output size in bytes (0 = unlimited)
        #[arg(long)]
        max_size: Option<usize>,
        /// Output encoding (utf-8, utf-16le, utf-16be, latin1)
        #[arg(long)]
        encoding: Option<Encoding>,
        /// Do not HTML-escape {{value}} output
        #[arg(long)]
        no_escape: bool,
        /// Text written for null values
        #[arg(long)]
        null: Option<String>,
        /// Maximum nesting depth of partial includes
        #[arg(long)]
        partial_stack_size: Option<usize>,
        /// Stop descending instead of failing when partials nest too deep
        #[arg(long)]
        silent_overflow: bool,
        /// Abort the render after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Write output to a file instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Check a template for syntax errors
    Check {
        /// Path to the template file
        template: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Render {
            template,
            data,
            config,
            max_size,
            encoding,
            no_escape,
            null,
            partial_stack_size,
            silent_overflow,
            timeout_ms,
            out,
        } => {
            let overrides = config::Overrides {
                max_size,
                encoding,
                no_escape,
                null,
                partial_stack_size,
                overflow: silent_overflow.then_some(OverflowBehavior::Silent),
                timeout_ms,
            };
            commands::render::cmd_render(
                &template,
                data.as_deref(),
                config.as_deref(),
                overrides,
                out.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Check { template } => {
            commands::check::cmd_check(&template, cli.output, cli.quiet);
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
