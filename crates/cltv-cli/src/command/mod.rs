use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cltv_analysis::config::PipelineConfig;
use cltv_core::transaction::RawTransaction;

use crate::{data, util};

use self::{
    generate_transactions::GenerateTransactionsArg, predict::PredictArg,
    summarize::SummarizeArg,
};

mod generate_transactions;
mod predict;
mod summarize;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Fit the purchase and spend models and score every customer
    Predict(#[clap(flatten)] PredictArg),
    /// Clean and summarize transactions without fitting models
    Summarize(#[clap(flatten)] SummarizeArg),
    /// Write a synthetic transaction log
    GenerateTransactions(#[clap(flatten)] GenerateTransactionsArg),
}

/// Where transactions are read from.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct InputArg {
    /// Transaction file (.csv, .xlsx or .xls)
    #[arg(long)]
    input: PathBuf,
    /// Worksheet to read from a spreadsheet (default: first sheet)
    #[arg(long)]
    sheet: Option<String>,
}

impl InputArg {
    pub(crate) fn read(&self) -> anyhow::Result<Vec<RawTransaction>> {
        eprintln!("Loading transactions from {}...", self.input.display());
        let rows = data::read_transactions(&self.input, self.sheet.as_deref())?;
        eprintln!("Loaded {} rows", rows.len());
        Ok(rows)
    }
}

/// Pipeline config file and the overrides shared by every analysis mode.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ConfigArg {
    /// JSON config file; unset keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Reference date for customer age (default: day after the last transaction)
    #[arg(long)]
    anchor_date: Option<NaiveDate>,
    /// Minimum number of eligible customers required to fit models
    #[arg(long)]
    min_cohort_size: Option<usize>,
}

impl ConfigArg {
    pub(crate) fn load(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = util::read_config_file(self.config.as_deref())?;
        if let Some(anchor_date) = self.anchor_date {
            config.anchor_date = Some(anchor_date);
        }
        if let Some(min_cohort_size) = self.min_cohort_size {
            config.min_cohort_size = min_cohort_size;
        }
        Ok(config)
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Predict(arg) => predict::run(&arg)?,
        Mode::Summarize(arg) => summarize::run(&arg)?,
        Mode::GenerateTransactions(arg) => generate_transactions::run(&arg)?,
    }
    Ok(())
}
