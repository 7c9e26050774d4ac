use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wafertrim_core::{
    numeric_column, polyfit, read_delimited, separator_byte, write_delimited, write_ibe,
    IbeHeader, LinearFit, Plan, PlanError,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wafer measurement filtering and trim correction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the plan's filter steps and write the surviving rows
    Filter(TableArgs),
    /// Filter, then compute the (x, y, shift) trim table
    Trim(TrimArgs),
    /// Fit a polynomial between two columns and print it as JSON
    Fit(FitArgs),
}

#[derive(Args, Debug)]
struct TableArgs {
    /// TOML plan describing filters, trim settings and rate function
    #[arg(long)]
    plan: PathBuf,
    /// Delimited input table with a header row
    #[arg(long)]
    input: PathBuf,
    /// Output path; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,
    /// Input column separator
    #[arg(long, default_value_t = ',')]
    separator: char,
    /// Output column separator
    #[arg(long, default_value_t = '\t')]
    output_separator: char,
}

#[derive(Args, Debug)]
struct TrimArgs {
    #[command(flatten)]
    table: TableArgs,
    /// Output layout of the trim table
    #[arg(long, value_enum, default_value_t = TrimFormat::Delimited)]
    format: TrimFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TrimFormat {
    /// Header row plus delimited (x, y, shift) rows
    Delimited,
    /// Ion-beam-etch file with target and rate coefficients in the header
    Ibe,
}

#[derive(Args, Debug)]
struct FitArgs {
    /// Delimited input table with a header row
    #[arg(long)]
    input: PathBuf,
    /// Column used as the independent variable
    #[arg(long)]
    x: String,
    /// Column used as the dependent variable
    #[arg(long)]
    y: String,
    /// Polynomial degree
    #[arg(long, default_value_t = 1)]
    degree: usize,
    /// Input column separator
    #[arg(long, default_value_t = ',')]
    separator: char,
}

#[derive(Serialize)]
struct FitReport {
    degree: usize,
    coefficients: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r_squared: Option<f64>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Filter(args) => handle_filter(args),
        Command::Trim(args) => handle_trim(args),
        Command::Fit(args) => handle_fit(args),
    }
}

fn handle_filter(args: TableArgs) -> Result<()> {
    let plan = Plan::from_path(&args.plan)?;
    let table = read_table(&args.input, args.separator)?;

    let mut filtered = plan.apply_filters(&table)?;
    info!(
        input_rows = table.height(),
        output_rows = filtered.height(),
        "Applied filter plan"
    );

    let separator = separator_byte(args.output_separator)?;
    let writer = open_output(args.output.as_deref())?;
    write_delimited(writer, &mut filtered, separator)?;
    Ok(())
}

fn handle_trim(args: TrimArgs) -> Result<()> {
    let TrimArgs { table: args, format } = args;
    let plan = Plan::from_path(&args.plan)?;
    let table = read_table(&args.input, args.separator)?;

    let mut outcome = plan.run(&table)?;
    info!(
        input_rows = table.height(),
        output_rows = outcome.frame.height(),
        clipped = outcome.clipped,
        "Computed trim table"
    );

    match format {
        TrimFormat::Delimited => {
            let separator = separator_byte(args.output_separator)?;
            let writer = open_output(args.output.as_deref())?;
            write_delimited(writer, &mut outcome.frame, separator)?;
        }
        TrimFormat::Ibe => {
            let trim = plan.trim.as_ref().ok_or(PlanError::MissingTrim)?;
            let header = IbeHeader::from_rate(trim.target, &plan.rate)?;
            let writer = open_output(args.output.as_deref())?;
            write_ibe(writer, &outcome.frame, &header)?;
        }
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<()> {
    let table = read_table(&args.input, args.separator)?;
    let x = numeric_column(&table, &args.x)?;
    let y = numeric_column(&table, &args.y)?;

    let report = if args.degree == 1 {
        let fit = LinearFit::fit(&x, &y)?;
        FitReport {
            degree: 1,
            coefficients: vec![fit.slope, fit.intercept],
            r_squared: Some(fit.r_squared),
        }
    } else {
        let polynomial = polyfit(&x, &y, args.degree)?;
        FitReport {
            degree: args.degree,
            coefficients: polynomial.coefficients().to_vec(),
            r_squared: None,
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_table(path: &Path, separator: char) -> Result<DataFrame> {
    let separator = separator_byte(separator)?;
    read_delimited(path, separator).with_context(|| format!("failed to load {}", path.display()))
}

fn open_output(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            info!(path = %path.display(), "Writing output");
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}
