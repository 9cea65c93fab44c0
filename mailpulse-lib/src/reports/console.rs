use super::common::{format_count, format_storage};
use crate::Result;
use crate::stats::Snapshot;
use core::fmt::Write;
use owo_colors::OwoColorize;

const MONTH_HEADER: &str = "Month";
const RECEIVED_HEADER: &str = "Received";
const SENT_HEADER: &str = "Sent";
const TOTAL_LABEL: &str = "Total";

pub fn generate<W: Write>(snapshot: &Snapshot, use_colors: bool, writer: &mut W) -> Result<()> {
    let who = match (snapshot.identity_name.is_empty(), snapshot.identity_email.is_empty()) {
        (false, false) => format!("{} <{}>", snapshot.identity_name, snapshot.identity_email),
        (false, true) => snapshot.identity_name.clone(),
        (true, false) => snapshot.identity_email.clone(),
        (true, true) => "Unknown account".to_string(),
    };

    if use_colors {
        writeln!(writer, "{}", who.bold())?;
    } else {
        writeln!(writer, "{who}")?;
    }

    writeln!(writer)?;
    heading(writer, "This month", use_colors)?;
    writeln!(writer, "  Received : {}", format_count(snapshot.current_received))?;
    writeln!(writer, "  Sent     : {}", format_count(snapshot.current_sent))?;
    writeln!(writer, "  Storage  : {}", format_storage(snapshot.storage_used_gb))?;

    writeln!(writer)?;
    heading(writer, "Last 12 months", use_colors)?;

    let rows: Vec<_> = snapshot
        .monthly_series
        .iter()
        .map(|m| (m.month_label.as_str(), format_count(m.received), format_count(m.sent)))
        .collect();
    let total_received = format_count(snapshot.series_received());
    let total_sent = format_count(snapshot.series_sent());

    let label_width = rows
        .iter()
        .map(|(label, _, _)| label.len())
        .chain([MONTH_HEADER.len(), TOTAL_LABEL.len()])
        .max()
        .unwrap_or(0);
    let received_width = rows
        .iter()
        .map(|(_, received, _)| received.len())
        .chain([RECEIVED_HEADER.len(), total_received.len()])
        .max()
        .unwrap_or(0);
    let sent_width = rows
        .iter()
        .map(|(_, _, sent)| sent.len())
        .chain([SENT_HEADER.len(), total_sent.len()])
        .max()
        .unwrap_or(0);

    let header = format!("  {MONTH_HEADER:<label_width$}  {RECEIVED_HEADER:>received_width$}  {SENT_HEADER:>sent_width$}");
    if use_colors {
        writeln!(writer, "{}", header.dimmed())?;
    } else {
        writeln!(writer, "{header}")?;
    }

    for (label, received, sent) in &rows {
        writeln!(writer, "  {label:<label_width$}  {received:>received_width$}  {sent:>sent_width$}")?;
    }

    let footer = format!("  {TOTAL_LABEL:<label_width$}  {total_received:>received_width$}  {total_sent:>sent_width$}");
    if use_colors {
        writeln!(writer, "{}", footer.bold())?;
    } else {
        writeln!(writer, "{footer}")?;
    }

    Ok(())
}

fn heading<W: Write>(writer: &mut W, text: &str, use_colors: bool) -> core::fmt::Result {
    if use_colors {
        writeln!(writer, "{}", text.cyan().bold())
    } else {
        writeln!(writer, "{text}")
    }
}
