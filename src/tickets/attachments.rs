//! CSV report files attached to tickets by IT staff.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::ReportFile;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("Only CSV report files are accepted")]
    NotCsv,
    #[error("Report file is empty")]
    Empty,
    #[error("Report file exceeds {max} bytes")]
    TooLarge { max: usize },
    #[error("Report file is not valid UTF-8")]
    NotUtf8,
    #[error("Report file is not valid CSV: {0}")]
    Malformed(String),
}

fn is_csv_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".csv")
}

fn is_csv_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().eq_ignore_ascii_case(CSV_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Accepts an upload when either the file name or the content type says CSV,
/// then checks every row has the same number of fields. The stored text is
/// the body as sent.
pub fn accept_report(
    file_name: &str,
    content_type: Option<&str>,
    body: &[u8],
    max_bytes: usize,
    now: DateTime<Utc>,
) -> Result<ReportFile, ReportError> {
    if !is_csv_name(file_name) && !is_csv_content_type(content_type) {
        return Err(ReportError::NotCsv);
    }
    if body.is_empty() {
        return Err(ReportError::Empty);
    }
    if body.len() > max_bytes {
        return Err(ReportError::TooLarge { max: max_bytes });
    }
    let text = std::str::from_utf8(body).map_err(|_| ReportError::NotUtf8)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(text.as_bytes());
    for record in reader.records() {
        record.map_err(|e| ReportError::Malformed(e.to_string()))?;
    }

    let name = if file_name.trim().is_empty() {
        "report.csv".to_string()
    } else {
        file_name.trim().to_string()
    };

    Ok(ReportFile {
        name,
        data: text.to_string(),
        uploaded_at: now,
    })
}

/// `Content-Disposition` value for downloading `name`.
pub fn attachment_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "part,cost\nkeyboard,45\n\"battery, 6-cell\",80\n";

    #[test]
    fn test_accepts_by_name_or_content_type() {
        let now = Utc::now();
        let by_name = accept_report("Repair.CSV", None, REPORT.as_bytes(), 1024, now).unwrap();
        assert_eq!(by_name.data, REPORT);
        assert_eq!(by_name.name, "Repair.CSV");

        let by_type = accept_report(
            "repair",
            Some("text/csv; charset=utf-8"),
            REPORT.as_bytes(),
            1024,
            now,
        )
        .unwrap();
        assert_eq!(by_type.uploaded_at, now);
    }

    #[test]
    fn test_rejections() {
        let now = Utc::now();
        assert_eq!(
            accept_report("repair.pdf", Some("application/pdf"), b"%PDF", 1024, now),
            Err(ReportError::NotCsv)
        );
        assert_eq!(
            accept_report("repair.csv", None, b"", 1024, now),
            Err(ReportError::Empty)
        );
        assert_eq!(
            accept_report("repair.csv", None, REPORT.as_bytes(), 8, now),
            Err(ReportError::TooLarge { max: 8 })
        );
        assert_eq!(
            accept_report("repair.csv", None, &[0xff, 0xfe, b','], 1024, now),
            Err(ReportError::NotUtf8)
        );
        assert!(matches!(
            accept_report("repair.csv", None, b"part,cost\nkeyboard\n", 1024, now),
            Err(ReportError::Malformed(_))
        ));
    }

    #[test]
    fn test_disposition_escapes_quotes() {
        assert_eq!(
            attachment_disposition("a\"b.csv"),
            "attachment; filename=\"a_b.csv\""
        );
    }
}
