//! Alma export CLI - fetch bib records by MMS ID and flatten them to CSV
//!
//! # Main Commands
//!
//! ```bash
//! alma-export export ids.csv              # Export every MMS ID in ids.csv
//! alma-export export ids.csv --limit 10   # Only the first 10
//! alma-export serve                       # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! alma-export ids ids.csv                 # Show the MMS IDs that would be exported
//! alma-export parse record.json           # Map a saved API response to a row
//! alma-export columns                     # Show the output column table
//! ```

use clap::{Parser, Subcommand};
use alma_export::{
    dublin_core, init_file_logging, map_row, parse_bib_response, read_identifiers_file,
    run_export, AlmaClient, ExportConfig, ExportOptions, LogLevel, OutputSchema, Region,
    LOG_BROADCASTER,
};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "alma-export")]
#[command(about = "Export Alma bibliographic records to Alma Digital CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every MMS ID in a CSV file and write the export CSV
    Export {
        /// CSV file listing MMS IDs
        input: PathBuf,

        /// Alma API key (default: ALMA_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// API region: na, eu, ap, ca, cn (default: ALMA_REGION or na)
        #[arg(long)]
        region: Option<Region>,

        /// Institution code for custom fields (default: from each record)
        #[arg(long)]
        institution: Option<String>,

        /// Only export the first N MMS IDs
        #[arg(short, long)]
        limit: Option<usize>,

        /// Directory for the timestamped CSV (default: ALMA_EXPORT_DIR or exports)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Exact output file, overriding the timestamped name
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write deleted records as comment lines
        #[arg(long)]
        mark_deleted: bool,

        /// Stream rows to disk, flushing every N rows
        #[arg(long)]
        flush_every: Option<usize>,

        /// Separator for multi-value columns
        #[arg(long, default_value = "; ")]
        delimiter: String,

        /// Show debug logs on the console
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the MMS IDs read from a CSV file
    Ids {
        /// CSV file listing MMS IDs
        input: PathBuf,
    },

    /// Map a saved Alma API response (JSON) to an output row
    Parse {
        /// JSON file with one bib record
        input: PathBuf,

        /// Institution code for custom fields
        #[arg(long)]
        institution: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the output column table
    Columns,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Export {
            input,
            api_key,
            region,
            institution,
            limit,
            output_dir,
            output,
            mark_deleted,
            flush_every,
            delimiter,
            verbose,
        } => {
            let overrides = ExportOverrides {
                api_key,
                region,
                institution,
                output_dir,
            };
            let options = ExportOptions::default()
                .with_limit(limit)
                .with_mark_deleted(mark_deleted)
                .with_flush_every(flush_every)
                .with_join_delimiter(delimiter);
            let options = match output {
                Some(path) => options.with_output_path(path),
                None => options,
            };
            cmd_export(&input, overrides, options, verbose).await
        }

        Commands::Ids { input } => cmd_ids(&input),

        Commands::Parse {
            input,
            institution,
            output,
        } => cmd_parse(&input, institution, output.as_deref()),

        Commands::Columns => cmd_columns(),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// CLI values that override the environment
struct ExportOverrides {
    api_key: Option<String>,
    region: Option<Region>,
    institution: Option<String>,
    output_dir: Option<PathBuf>,
}

async fn cmd_export(
    input: &Path,
    overrides: ExportOverrides,
    options: ExportOptions,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ExportConfig::from_env()?
        .with_api_key(overrides.api_key)
        .with_region(overrides.region)
        .with_institution(overrides.institution)
        .with_export_dir(overrides.output_dir);

    if verbose {
        LOG_BROADCASTER.set_console_level(LogLevel::Debug);
    }
    let log_path = init_file_logging(&config.log_dir)?;
    eprintln!("📝 Logging to: {}", log_path.display());

    let client = AlmaClient::from_config(&config)?;
    eprintln!("📄 Reading MMS IDs: {}", input.display());
    let ids = read_identifiers_file(input)?;

    let options = options.with_output_dir(config.export_dir.clone());
    let schema = OutputSchema::alma_digital();
    let report = run_export(&client, &ids.identifiers, &config.catalog(), &schema, &options).await?;

    eprintln!("\n📊 SUMMARY");
    eprintln!("   Records written:  {}", report.records_written);
    if report.deleted_commented > 0 {
        eprintln!("   Deleted records:  {}", report.deleted_commented);
    }
    eprintln!("   XML warnings:     {}", report.parse_warnings);
    eprintln!("   Failed:           {}", report.failed.len());
    for id in report.failed_identifiers().iter().take(10) {
        eprintln!("     - {}", id);
    }
    if report.failed.len() > 10 {
        eprintln!("     ... and {} more", report.failed.len() - 10);
    }
    eprintln!("   Elapsed:          {:.1}s", report.elapsed.as_secs_f64());
    eprintln!("\n✨ Done! Output: {}", report.output_path.display());
    Ok(())
}

fn cmd_ids(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Reading MMS IDs: {}", input.display());
    let file = read_identifiers_file(input)?;

    eprintln!("   Encoding: {}", file.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(file.delimiter));
    match &file.id_header {
        Some(header) => eprintln!("   Column: {} ('{}')", file.id_column, header),
        None => eprintln!("   Column: {} (no header)", file.id_column),
    }
    eprintln!("✅ {} MMS IDs", file.identifiers.len());

    for id in &file.identifiers {
        println!("{}", id);
    }
    Ok(())
}

fn cmd_parse(
    input: &Path,
    institution: Option<String>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing record: {}", input.display());
    let body = fs::read_to_string(input)?;
    let raw = parse_bib_response("", &body)?;

    let config = ExportConfig::default().with_institution(institution);
    let catalog = config.catalog();
    let record = dublin_core::parse(&raw, &catalog);
    if let Some(warning) = record.warning() {
        eprintln!("   ⚠️  {}", warning);
    }
    eprintln!("   Institution: {}", catalog.institution_for(&raw));

    let schema = OutputSchema::alma_digital();
    let row = map_row(&record, &schema);
    for index in &row.lossy_columns {
        if let Some(id) = schema.column_id(*index) {
            eprintln!("   ⚠️  Extra values dropped in {}", id);
        }
    }

    let mut cells = Map::new();
    for (index, cell) in row.cells.iter().enumerate() {
        if cell.is_empty() {
            continue;
        }
        if let Some(id) = schema.column_id(index) {
            cells.insert(id, Value::String(cell.clone()));
        }
    }
    eprintln!("✅ {} of {} columns filled", cells.len(), schema.len());

    let json = serde_json::to_string_pretty(&Value::Object(cells))?;
    write_output(&json, output)?;
    Ok(())
}

fn cmd_columns() -> Result<(), Box<dyn std::error::Error>> {
    let schema = OutputSchema::alma_digital();
    println!("{:>3}  {:<34} {:<10} {}", "#", "HEADER", "POLICY", "SOURCES");
    for (index, column) in schema.columns().iter().enumerate() {
        let sources = if column.is_blank() {
            "(blank)".to_string()
        } else {
            column.sources.join(" + ")
        };
        let policy = column.policy.to_string();
        println!("{:>3}  {:<34} {:<10} {}", index, column.header, policy, sources);
    }
    eprintln!("\n{} columns", schema.len());
    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = ExportConfig::from_env()?;
    init_file_logging(&config.log_dir)?;
    alma_export::server::start_server(port, config).await
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
