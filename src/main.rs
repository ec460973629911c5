use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use iam_validate::config::ValidationConfig;
use iam_validate::data::filter::{apply_filters, parse_filters};
use iam_validate::data::loader::load_file;
use iam_validate::engine::ComparisonRegistry;
use iam_validate::report::{sheet_file_name, write_csv};

/// Compare IAM model output with reference data and write report sheets.
#[derive(Debug, Parser)]
#[command(name = "iam-validate", version)]
struct Cli {
    /// Validation config (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Model output (.csv, .json or .parquet)
    #[arg(long)]
    model: PathBuf,

    /// Reference timeseries (.csv, .json or .parquet)
    #[arg(long)]
    reference: PathBuf,

    /// Directory receiving one CSV file per sheet
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Keep only model rows with this label, e.g. `region=World` (repeatable)
    #[arg(long = "filter", value_name = "DIM=VALUE")]
    filters: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = ValidationConfig::from_path(&cli.config)?;
    let reference = load_file(&cli.reference)?;
    let report = config
        .build(&reference, &ComparisonRegistry::new())
        .context("building validation from config")?;

    let mut model = load_file(&cli.model)?;
    let filters = parse_filters(&cli.filters)?;
    if !filters.is_empty() {
        model = apply_filters(&model, &filters).context("applying filters")?;
    }

    let sheets = report.prepare_output(&model)?;

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;
    for sheet in &sheets {
        let path = cli.out_dir.join(sheet_file_name(sheet));
        write_csv(sheet, &path)?;
        log::info!("wrote '{}' ({} rows) to {}", sheet.name, sheet.rows.len(), path.display());
    }
    Ok(())
}
