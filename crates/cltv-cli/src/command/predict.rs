use std::path::PathBuf;

use cltv_analysis::{
    config::PipelineConfig,
    pipeline::{CltvReport, Pipeline},
};

use super::{ConfigArg, InputArg};
use crate::{
    data,
    util::{Output, OutputFormat},
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct PredictArg {
    #[clap(flatten)]
    input: InputArg,
    #[clap(flatten)]
    config: ConfigArg,
    /// Months of future value to sum
    #[arg(long)]
    horizon_months: Option<u32>,
    /// Monthly discount rate
    #[arg(long)]
    discount_rate: Option<f64>,
    /// Format of the customer and segment tables (csv or json)
    #[arg(long, default_value = "csv")]
    format: OutputFormat,
    /// Customer table output path (default: stdout)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Segment table output path (default: printed to stderr)
    #[arg(long)]
    segments_output: Option<PathBuf>,
    /// Full report (cleaning, fitted models, scaler, customers, segments) as JSON
    #[arg(long)]
    report_output: Option<PathBuf>,
    /// Print the customers with the highest scaled CLTV to stderr
    #[arg(long)]
    top: Option<usize>,
}

impl PredictArg {
    pub(crate) fn config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = self.config.load()?;
        if let Some(horizon_months) = self.horizon_months {
            config.horizon_months = horizon_months;
        }
        if let Some(discount_rate) = self.discount_rate {
            config.discount_rate = discount_rate;
        }
        Ok(config)
    }
}

pub(crate) fn run(arg: &PredictArg) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(arg.config()?)?;
    let rows = arg.input.read()?;

    eprintln!("Fitting models...");
    let report = pipeline.run(&rows)?;
    print_summary(&report);

    let analysis = &report.analysis;
    let mut output = Output::from_output_path(arg.output.as_deref())?;
    match arg.format {
        OutputFormat::Csv => {
            output.write_csv(|out| data::write_predictions_csv(out, &analysis.predictions))?;
        }
        OutputFormat::Json => output.write_json(&analysis.predictions)?,
    }
    eprintln!(
        "Wrote {} customers to {}",
        analysis.predictions.len(),
        output.display_path()
    );

    if let Some(path) = &arg.segments_output {
        let mut output = Output::open(path.clone())?;
        match arg.format {
            OutputFormat::Csv => {
                output.write_csv(|out| data::write_segments_csv(out, &analysis.segments))?;
            }
            OutputFormat::Json => output.write_json(&analysis.segments)?,
        }
        eprintln!("Wrote segment table to {}", output.display_path());
    } else {
        print_segments(&report);
    }

    if let Some(path) = &arg.report_output {
        let mut output = Output::open(path.clone())?;
        output.write_json(&report)?;
        eprintln!("Wrote report to {}", output.display_path());
    }

    if let Some(n) = arg.top {
        print_top_customers(&report, n);
    }
    Ok(())
}

fn print_summary(report: &CltvReport) {
    let cleaning = &report.cleaning;
    eprintln!(
        "Cleaned {} rows into {} ({} missing, {} returns, {} non-positive quantity)",
        cleaning.input_rows,
        cleaning.output_rows,
        cleaning.dropped_missing,
        cleaning.dropped_returns,
        cleaning.dropped_non_positive_quantity,
    );
    eprintln!(
        "Anchor {}: {} customers, {} in cohort",
        report.anchor,
        report.customers,
        report.customers - report.dropped_customers,
    );

    let models = &report.analysis.models;
    eprintln!(
        "BG/NBD:      {:.4?} (log-likelihood {:.4}, {} iterations)",
        models.bg_nbd.params(),
        models.bg_nbd.log_likelihood(),
        models.bg_nbd.iterations(),
    );
    eprintln!(
        "Gamma-Gamma: {:.4?} (log-likelihood {:.4}, {} iterations)",
        models.gamma_gamma.params(),
        models.gamma_gamma.log_likelihood(),
        models.gamma_gamma.iterations(),
    );
    match models.gamma_gamma.population_mean() {
        Some(mean) => eprintln!("Population mean spend per invoice: {mean:.2}"),
        None => eprintln!("Population mean spend per invoice is unbounded (q <= 1)"),
    }
}

fn print_segments(report: &CltvReport) {
    eprintln!("Segments:");
    eprintln!(
        "  {:>8} {:>6} {:>12} {:>12} {:>12}",
        "segment", "count", "clv_mean", "clv_sum", "scaled_mean"
    );
    for segment in &report.analysis.segments {
        let (clv_mean, clv_sum) = segment
            .column("clv")
            .map_or((f64::NAN, f64::NAN), |c| (c.mean, c.sum));
        let scaled_mean = segment.column("scaled_clv").map_or(f64::NAN, |c| c.mean);
        eprintln!(
            "  {:>8} {:>6} {clv_mean:>12.2} {clv_sum:>12.2} {scaled_mean:>12.3}",
            segment.segment,
            segment.count(),
        );
    }
}

fn print_top_customers(report: &CltvReport, n: usize) {
    eprintln!("Top {n} customers by scaled CLTV:");
    for (rank, customer) in report.analysis.top_customers(n).into_iter().enumerate() {
        eprintln!(
            "  {:3}: {:>8} {:>2} clv={:10.2} scaled={:.3} purchases/month={:.3}",
            rank + 1,
            customer.customer_id,
            customer.segment,
            customer.clv,
            customer.scaled_clv,
            customer.expected_purc_1_month,
        );
    }
}
