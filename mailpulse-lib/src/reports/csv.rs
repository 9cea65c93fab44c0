use crate::Result;
use crate::stats::Snapshot;
use ohno::IntoAppError;
use std::io::Write;

/// Write the monthly series as CSV, one row per month in chronological order.
pub fn generate<W: Write>(snapshot: &Snapshot, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    csv.write_record(["month", "year", "month_number", "received", "sent"])
        .into_app_err("writing CSV header")?;

    for m in &snapshot.monthly_series {
        csv.write_record([
            m.month_label.clone(),
            m.year.to_string(),
            m.month.to_string(),
            m.received.to_string(),
            m.sent.to_string(),
        ])
        .into_app_err_with(|| format!("writing CSV row for {}", m.month_label))?;
    }

    csv.flush().into_app_err("flushing CSV output")?;
    Ok(())
}
