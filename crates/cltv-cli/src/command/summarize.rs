use std::path::PathBuf;

use cltv_core::{
    cleaner::Cleaner,
    summary::{CohortFilter, resolve_anchor, summarize},
};

use super::{ConfigArg, InputArg};
use crate::{
    data,
    util::{Output, OutputFormat},
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SummarizeArg {
    #[clap(flatten)]
    input: InputArg,
    #[clap(flatten)]
    config: ConfigArg,
    /// Format of the cohort table (csv or json)
    #[arg(long, default_value = "csv")]
    format: OutputFormat,
    /// Output file path (default: stdout)
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &SummarizeArg) -> anyhow::Result<()> {
    let config = arg.config.load()?;
    config.validate()?;
    let rows = arg.input.read()?;

    let cleaned = Cleaner::new(config.winsorize_params()).clean(&rows)?;
    let report = cleaned.report();
    eprintln!(
        "Cleaned {} rows into {} (clipped {} quantities, {} prices)",
        report.input_rows, report.output_rows, report.clipped_quantity, report.clipped_price,
    );

    let anchor = resolve_anchor(cleaned.transactions(), config.anchor())?;
    let summaries = summarize(cleaned.transactions(), anchor)?;
    let customers = summaries.len();
    let cohort = CohortFilter::new(config.min_cohort_size).filter(summaries)?;
    eprintln!(
        "Anchor {anchor}: {customers} customers, {} in cohort",
        cohort.len()
    );

    let mut output = Output::from_output_path(arg.output.as_deref())?;
    match arg.format {
        OutputFormat::Csv => {
            output.write_csv(|out| data::write_summaries_csv(out, cohort.customers()))?;
        }
        OutputFormat::Json => output.write_json(cohort.customers())?,
    }
    eprintln!(
        "Wrote {} customers to {}",
        cohort.len(),
        output.display_path()
    );
    Ok(())
}
