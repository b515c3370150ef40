use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
};

use anyhow::Context;
use calamine::{Reader, open_workbook_auto};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use cltv_analysis::{prediction::CustomerPrediction, segmentation::SegmentAggregate};
use cltv_core::{
    CltvError,
    summary::CustomerSummary,
    transaction::{CustomerId, RawTransaction, TransactionColumn},
};

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMAT: &str = "%Y-%m-%d";
const WRITE_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest serial Excel can represent (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Position of every transaction column in a header row.
#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    positions: [usize; TransactionColumn::ALL.len()],
}

impl ColumnIndex {
    fn from_headers<'a, I>(headers: I) -> Result<Self, CltvError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let headers = headers.into_iter().map(str::trim).collect::<Vec<_>>();
        let mut positions = [0; TransactionColumn::ALL.len()];
        let mut missing = Vec::new();
        for (slot, column) in positions.iter_mut().zip(TransactionColumn::ALL) {
            match headers.iter().position(|h| *h == column.header()) {
                Some(pos) => *slot = pos,
                None => missing.push(column.header()),
            }
        }
        if !missing.is_empty() {
            return Err(CltvError::schema(format!(
                "missing columns {missing:?} (found {headers:?})"
            )));
        }
        Ok(Self { positions })
    }

    fn position(&self, column: TransactionColumn) -> usize {
        self.positions[column as usize]
    }
}

fn parse_error(row: usize, column: TransactionColumn, value: &str) -> CltvError {
    CltvError::schema(format!(
        "row {row}: cannot parse {value:?} in column {:?}",
        column.header()
    ))
}

fn excel_serial_to_date_time(serial: f64) -> Option<NaiveDateTime> {
    if !(0.0..=EXCEL_MAX_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    #[expect(clippy::cast_possible_truncation)]
    let seconds = (serial * SECONDS_PER_DAY).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

pub(crate) fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .or_else(|| value.parse().ok().and_then(excel_serial_to_date_time))
}

#[expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn parse_integer(value: &str) -> Option<i64> {
    value.parse().ok().or_else(|| {
        let float = value.parse::<f64>().ok()?;
        (float.fract() == 0.0 && float.abs() < i64::MAX as f64).then_some(float as i64)
    })
}

fn parse_customer_id(value: &str) -> Option<CustomerId> {
    parse_integer(value).and_then(|id| CustomerId::try_from(id).ok())
}

/// Converts one data row; `row` is the 1-based line number for messages.
fn parse_row<'a, F>(index: &ColumnIndex, row: usize, cell: F) -> Result<RawTransaction, CltvError>
where
    F: Fn(usize) -> Option<&'a str>,
{
    let text = |column: TransactionColumn| {
        cell(index.position(column))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let quantity = text(TransactionColumn::Quantity)
        .map(|v| parse_integer(v).ok_or_else(|| parse_error(row, TransactionColumn::Quantity, v)))
        .transpose()?;
    let invoice_date = text(TransactionColumn::InvoiceDate)
        .map(|v| {
            parse_date_time(v).ok_or_else(|| parse_error(row, TransactionColumn::InvoiceDate, v))
        })
        .transpose()?;
    let price = text(TransactionColumn::Price)
        .map(|v| v.parse::<f64>().map_err(|_| parse_error(row, TransactionColumn::Price, v)))
        .transpose()?;
    let customer_id = text(TransactionColumn::CustomerId)
        .map(|v| {
            parse_customer_id(v).ok_or_else(|| parse_error(row, TransactionColumn::CustomerId, v))
        })
        .transpose()?;

    Ok(RawTransaction {
        invoice: text(TransactionColumn::Invoice).map(str::to_owned),
        stock_code: text(TransactionColumn::StockCode).map(str::to_owned),
        description: text(TransactionColumn::Description).map(str::to_owned),
        quantity,
        invoice_date,
        price,
        customer_id,
        country: text(TransactionColumn::Country).map(str::to_owned),
    })
}

/// Reads transactions from CSV text with a header row.
pub fn read_csv<R>(reader: R) -> anyhow::Result<Vec<RawTransaction>>
where
    R: Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let index = ColumnIndex::from_headers(reader.headers().context("Failed to read CSV header")?)?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 2;
        let record = record.with_context(|| format!("Failed to read CSV row {row}"))?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(parse_row(&index, row, |pos| record.get(pos))?);
    }
    Ok(rows)
}

/// Reads transactions from a spreadsheet, using `sheet` or the first sheet.
pub fn read_workbook(path: &Path, sheet: Option<&str>) -> anyhow::Result<Vec<RawTransaction>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
    let sheet_name = match sheet {
        Some(name) => name.to_owned(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| CltvError::schema(format!("{} has no sheets", path.display())))?,
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet {sheet_name:?} of {}", path.display()))?;

    let mut cells = range
        .rows()
        .map(|cells| cells.iter().map(ToString::to_string).collect::<Vec<_>>());
    let header = cells
        .next()
        .ok_or_else(|| CltvError::schema(format!("sheet {sheet_name:?} is empty")))?;
    let index = ColumnIndex::from_headers(header.iter().map(String::as_str))?;

    let mut rows = Vec::new();
    for (i, record) in cells.enumerate() {
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(parse_row(&index, i + 2, |pos| {
            record.get(pos).map(String::as_str)
        })?);
    }
    Ok(rows)
}

/// Reads a transaction file, choosing the format by extension.
pub fn read_transactions(path: &Path, sheet: Option<&str>) -> anyhow::Result<Vec<RawTransaction>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let rows = match extension.as_str() {
        "csv" => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open transactions file: {}", path.display()))?;
            read_csv(io::BufReader::new(file))
                .with_context(|| format!("Failed to load transactions from {}", path.display()))?
        }
        "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(path, sheet)
            .with_context(|| format!("Failed to load transactions from {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported transactions file extension {extension:?}: {}",
            path.display()
        ),
    };
    tracing::info!(rows = rows.len(), path = %path.display(), "loaded transactions");
    Ok(rows)
}

pub fn write_transactions_csv<W>(writer: W, rows: &[RawTransaction]) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(TransactionColumn::ALL.map(TransactionColumn::header))?;
    for row in rows {
        writer.write_record([
            row.invoice.clone().unwrap_or_default(),
            row.stock_code.clone().unwrap_or_default(),
            row.description.clone().unwrap_or_default(),
            row.quantity.as_ref().map(ToString::to_string).unwrap_or_default(),
            row.invoice_date
                .map(|d| d.format(WRITE_DATE_TIME_FORMAT).to_string())
                .unwrap_or_default(),
            row.price.as_ref().map(ToString::to_string).unwrap_or_default(),
            row.customer_id.as_ref().map(ToString::to_string).unwrap_or_default(),
            row.country.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summaries_csv<W>(writer: W, summaries: &[CustomerSummary]) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = csv::Writer::from_writer(writer);
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_predictions_csv<W>(writer: W, predictions: &[CustomerPrediction]) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = csv::Writer::from_writer(writer);
    for prediction in predictions {
        writer.serialize(prediction)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes one row per segment with `<column>_mean`, `<column>_count` and
/// `<column>_sum` for every numeric column.
pub fn write_segments_csv<W>(writer: W, segments: &[SegmentAggregate]) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = csv::Writer::from_writer(writer);
    let columns = CustomerPrediction::NUMERIC_COLUMNS;
    let mut header = vec!["segment".to_owned()];
    for column in columns {
        header.extend(["mean", "count", "sum"].map(|stat| format!("{column}_{stat}")));
    }
    writer.write_record(&header)?;

    for segment in segments {
        let mut record = vec![segment.segment.clone()];
        for column in columns {
            match segment.column(column) {
                Some(agg) => record.extend([
                    agg.mean.to_string(),
                    agg.count.to_string(),
                    agg.sum.to_string(),
                ]),
                None => record.extend([String::new(), String::new(), String::new()]),
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    const HEADER: &str = "Invoice,StockCode,Description,Quantity,InvoiceDate,Price,Customer ID,Country";

    fn load(body: &str) -> anyhow::Result<Vec<RawTransaction>> {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;
        writeln!(file, "{HEADER}")?;
        write!(file, "{body}")?;
        file.flush()?;
        read_transactions(file.path(), None)
    }

    fn schema_error(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| cause.downcast_ref::<CltvError>().is_some_and(CltvError::is_schema))
    }

    #[test]
    fn test_reads_rows_with_missing_cells() {
        let rows = load(
            "536365,85123A,WHITE HANGING HEART,6,2010-12-01 08:26:00,2.55,17850.0,United Kingdom\n\
             C536379,D,Discount,-1,12/1/2010 9:41,27.5,14527,United Kingdom\n\
             536414,22139,,56,2010-12-01 11:52,0,,United Kingdom\n",
        )
        .unwrap();
        assert_eq!(rows.len(), 3);

        let first = &rows[0];
        assert_eq!(first.invoice.as_deref(), Some("536365"));
        assert_eq!(first.quantity, Some(6));
        assert_eq!(first.price, Some(2.55));
        assert_eq!(first.customer_id, Some(17850));
        assert_eq!(
            first.invoice_date.unwrap().to_string(),
            "2010-12-01 08:26:00"
        );

        assert!(rows[1].is_return());
        assert_eq!(rows[1].quantity, Some(-1));
        assert_eq!(
            rows[1].invoice_date.unwrap().to_string(),
            "2010-12-01 09:41:00"
        );

        assert_eq!(rows[2].description, None);
        assert_eq!(rows[2].customer_id, None);
        assert_eq!(
            rows[2].missing_mandatory(),
            Some(TransactionColumn::CustomerId)
        );
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let rows = load("536365,85123A,X,6,2010-12-01,2.55,17850,UK\n,,,,,,,\n").unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_missing_header_is_schema_error() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Invoice,Quantity,InvoiceDate,Price,Country").unwrap();
        file.flush().unwrap();
        let err = read_transactions(file.path(), None).unwrap_err();
        assert!(schema_error(&err), "{err:?}");
        assert!(format!("{err:#}").contains("Customer ID"));
    }

    #[test]
    fn test_unparsable_cell_is_schema_error() {
        let err = load("536365,85123A,X,six,2010-12-01,2.55,17850,UK\n").unwrap_err();
        assert!(schema_error(&err), "{err:?}");
        assert!(format!("{err:#}").contains("row 2"));

        let err = load("536365,85123A,X,6,yesterday,2.55,17850,UK\n").unwrap_err();
        assert!(schema_error(&err));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        assert!(read_transactions(file.path(), None).is_err());
    }

    #[test]
    fn test_date_formats() {
        let expected = "2011-12-09 12:50:00";
        for value in [
            "2011-12-09 12:50:00",
            "2011-12-09T12:50:00",
            "2011-12-09 12:50",
            "12/9/2011 12:50",
        ] {
            assert_eq!(parse_date_time(value).unwrap().to_string(), expected, "{value}");
        }
        assert_eq!(
            parse_date_time("2011-12-09").unwrap().to_string(),
            "2011-12-09 00:00:00"
        );
        // Excel serial for 2010-12-01 08:26
        let serial = parse_date_time("40513.35138888889").unwrap();
        assert_eq!(serial.to_string(), "2010-12-01 08:26:00");
        assert_eq!(parse_date_time("not a date"), None);
    }

    #[test]
    fn test_written_transactions_load_back() {
        let date = NaiveDate::from_ymd_opt(2011, 1, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let rows = vec![
            RawTransaction::new("539993", 10, date, 1.25, 13313),
            RawTransaction {
                customer_id: None,
                country: Some("France".to_owned()),
                ..RawTransaction::new("539994", 2, date, 4.95, 1)
            },
        ];
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write_transactions_csv(&mut file, &rows).unwrap();
        file.flush().unwrap();
        assert_eq!(read_transactions(file.path(), None).unwrap(), rows);
    }

    #[test]
    fn test_summary_csv_header() {
        let summaries = [CustomerSummary {
            customer_id: 12_347,
            recency: 52.14,
            t: 52.57,
            frequency: 7,
            monetary: 615.71,
        }];
        let mut buf = Vec::new();
        write_summaries_csv(&mut buf, &summaries).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text.lines().next(),
            Some("Customer ID,recency,T,frequency,monetary")
        );
    }

    #[test]
    fn test_prediction_csv_header() {
        let predictions = [CustomerPrediction {
            customer_id: 12_347,
            recency: 52.14,
            t: 52.57,
            frequency: 7,
            monetary: 615.71,
            expected_purc_1_week: 0.15,
            expected_purc_1_month: 0.6,
            expected_average_profit: 631.9,
            clv: 2_409.8,
            scaled_clv: 0.53,
            segment: "A".to_owned(),
        }];
        let mut buf = Vec::new();
        write_predictions_csv(&mut buf, &predictions).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("Customer ID,recency,T,frequency,monetary,"));
        assert!(header.ends_with(",clv,scaled_clv,segment"));
    }
}
