use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser};

use resource_planner::{
    ChartConfig, Frequency, LedgerLayout, PipelineConfig, ResourcePlanner,
};

/// Chart cumulative resource availability per pair of ledger categories.
#[derive(Parser, Debug)]
#[command(name = "resource-planner", version)]
struct Args {
    /// Ledger workbook (.xlsx, .xlsm, .xls, .xlsb, .ods) or CSV file
    input: PathBuf,

    /// Directory the SVG charts are written to
    #[arg(short, long, default_value = "charts")]
    output: PathBuf,

    /// Bin frequency: 7D, 14D, 28D, M or Q
    #[arg(short, long, default_value = "M")]
    frequency: String,

    /// Zero-based position of the date column
    #[arg(long, default_value_t = 0)]
    date_col: usize,

    /// Zero-based position of the delta column
    #[arg(long, default_value_t = 1)]
    delta_col: usize,

    /// Zero-based positions of the two category columns
    #[arg(long, num_args = 2, value_names = ["A", "B"], default_values_t = [2usize, 3])]
    category_cols: Vec<usize>,

    /// Text prepended to every chart title
    #[arg(long)]
    title_prefix: Option<String>,

    /// -v for info, -vv for debug (RUST_LOG overrides)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // Reject bad selectors before touching the input.
    let frequency: Frequency = args.frequency.parse()?;

    let config = PipelineConfig {
        layout: LedgerLayout {
            date_column_index: args.date_col,
            delta_column_index: args.delta_col,
            category_column_1_index: args.category_cols[0],
            category_column_2_index: args.category_cols[1],
        },
        frequency,
        chart: ChartConfig {
            title_prefix: args.title_prefix.clone(),
            ..Default::default()
        },
    };

    let mut planner = ResourcePlanner::new(".", config)?;
    let summary = planner
        .run(&args.input, &args.output)
        .with_context(|| format!("failed to process {}", args.input.display()))?;

    println!(
        "{} sheet(s), {} partition(s): {} chart(s) written to {}",
        summary.sheets,
        summary.partitions,
        summary.charts.len(),
        args.output.display()
    );
    if !summary.empty.is_empty() {
        println!("no rows (no chart): {}", summary.empty.join(", "));
    }
    for failure in &summary.failures {
        eprintln!("skipped {}: {}", failure.label, failure.error);
    }

    Ok(())
}
