use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tabread_core::{ReaderOptions, records};

mod formatter;

#[derive(Parser)]
#[command(name = "tabcli")]
#[command(about = "Dump rows and headers of CSV, XLS and XLSX files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Print the rows of a file
    Rows {
        /// Path to the CSV/XLS/XLSX file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// First row number to print (zero-based)
        #[arg(long)]
        offset: Option<usize>,

        /// Maximum number of rows to print
        #[arg(long)]
        limit: Option<usize>,

        /// Leading lines (CSV) or rows (spreadsheets) to drop
        #[arg(long, value_name = "N")]
        skip_lines: Option<usize>,

        /// Skip rows whose cells are all blank
        #[arg(long)]
        skip_empty: bool,

        /// CSV field separator
        #[arg(long, value_name = "CHAR")]
        separator: Option<char>,
    },
    /// Print the header row of a file, numbered from 1
    Headers {
        /// Path to the CSV/XLS/XLSX file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn load_options(config: Option<&Path>) -> Result<ReaderOptions> {
    if let Some(config_path) = config {
        return ReaderOptions::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    // Fall back to tabread.toml in the working directory
    let default_config_path = PathBuf::from("tabread.toml");
    if default_config_path.exists() {
        ReaderOptions::from_file(&default_config_path).with_context(|| {
            format!(
                "Failed to load config from {}",
                default_config_path.display()
            )
        })
    } else {
        Ok(ReaderOptions::default())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut options = load_options(cli.config.as_deref())?;

    match cli.command {
        Command::Rows {
            file,
            offset,
            limit,
            skip_lines,
            skip_empty,
            separator,
        } => {
            if let Some(skip_lines) = skip_lines {
                options.skip_lines = skip_lines;
            }
            if skip_empty {
                options.read_empty_rows = false;
            }
            if let Some(separator) = separator {
                options.csv.separator = separator;
                options.csv.validate().context("Invalid --separator")?;
            }

            let mut source = tabread_core::open(&file, &options)
                .with_context(|| format!("Failed to open file: {}", file.display()))?;
            let rows = records::collect_rows(&mut source, offset, limit)
                .with_context(|| format!("Failed to read file: {}", file.display()))?;
            let anomalies = source.anomalies().to_vec();
            source.close()?;

            match cli.format {
                OutputFormat::Human => formatter::print_rows_human(&file, &rows),
                OutputFormat::Json => formatter::print_rows_json(&file, &rows)?,
            }
            formatter::print_anomalies(&anomalies);
        }
        Command::Headers { file } => {
            let headers = records::headers(&file)
                .with_context(|| format!("Failed to read headers: {}", file.display()))?;

            match cli.format {
                OutputFormat::Human => formatter::print_headers_human(&file, &headers),
                OutputFormat::Json => formatter::print_headers_json(&file, &headers)?,
            }
        }
    }

    Ok(())
}
