use crate::Result;
use crate::stats::Snapshot;
use core::fmt::Write;
use serde_json::json;

pub fn generate<W: Write>(snapshot: &Snapshot, writer: &mut W) -> Result<()> {
    let series: Vec<_> = snapshot
        .monthly_series
        .iter()
        .map(|m| {
            json!({
                "month": m.month_label,
                "year": m.year,
                "month_number": m.month,
                "received": m.received,
                "sent": m.sent,
            })
        })
        .collect();

    let output = json!({
        "identity": {
            "name": snapshot.identity_name,
            "email": snapshot.identity_email,
        },
        "current_month": {
            "received": snapshot.current_received,
            "sent": snapshot.current_sent,
        },
        "storage_used_gb": snapshot.storage_used_gb,
        "monthly_series": series,
    });

    write!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::test_snapshot;

    #[test]
    fn test_generate_structure() {
        let mut output = String::new();
        generate(&test_snapshot(), &mut output).unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["identity"]["email"], "ada@example.com");
        assert_eq!(value["current_month"]["received"], 1234);
        assert_eq!(value["current_month"]["sent"], 56);
        assert_eq!(value["storage_used_gb"], 1.5);

        let series = value["monthly_series"].as_array().unwrap();
        assert_eq!(series.len(), 12);
        assert_eq!(series[0]["month"], "Jul 2024");
        assert_eq!(series[0]["received"], 700);
        assert_eq!(series[11]["month"], "Jun 2025");
        assert_eq!(series[11]["month_number"], 6);
    }
}
