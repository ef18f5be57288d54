//! CSV download of the query log.

use std::io::Write;

use anyhow::Result;
use chrono::{FixedOffset, NaiveDate};
use serde::Deserialize;

use crate::database::QueryLogEntry;

const HEADERS: [&str; 10] = [
    "Sqft Living",
    "Bedrooms",
    "Bathrooms",
    "Lot Size",
    "Floors",
    "House Age",
    "Zipcode",
    "Purpose",
    "Predicted Price",
    "Date",
];

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Query-string filters for the filtered export. Dates are calendar days in
/// the display offset, both ends inclusive.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportFilter {
    pub(crate) min_price: Option<f64>,
    pub(crate) max_price: Option<f64>,
    pub(crate) start_date: Option<NaiveDate>,
    pub(crate) end_date: Option<NaiveDate>,
}

impl ExportFilter {
    fn matches(&self, entry: &QueryLogEntry, offset: FixedOffset) -> bool {
        let date = entry.timestamp.with_timezone(&offset).date_naive();
        self.min_price.is_none_or(|min| entry.predicted_price >= min)
            && self.max_price.is_none_or(|max| entry.predicted_price <= max)
            && self.start_date.is_none_or(|start| date >= start)
            && self.end_date.is_none_or(|end| date <= end)
    }
}

/// Writes the header row and every entry accepted by `filter`.
pub(crate) fn write_csv<W: Write>(
    entries: &[QueryLogEntry],
    filter: &ExportFilter,
    offset: FixedOffset,
    writer: W,
) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(HEADERS)?;
    let mut written = 0;
    for entry in entries.iter().filter(|e| filter.matches(e, offset)) {
        let f = &entry.features;
        csv.write_record([
            f.sqft_living().to_string(),
            f.bedrooms().to_string(),
            f.bathrooms().to_string(),
            f.sqft_lot().to_string(),
            f.floors().to_string(),
            f.house_age().to_string(),
            f.zipcode().to_string(),
            entry.purpose.to_string(),
            entry.predicted_price.to_string(),
            entry
                .timestamp
                .with_timezone(&offset)
                .format(DATE_FORMAT)
                .to_string(),
        ])?;
        written += 1;
    }
    csv.flush()?;
    Ok(written)
}
