use anyhow::{Context, Result};

use crate::models::CodeRecord;

/// Serialize the log (newest first) to the persisted JSON blob.
pub fn encode_history(records: &[CodeRecord]) -> Result<String> {
    serde_json::to_string(records).context("failed to encode history")
}

pub fn decode_history(blob: &str) -> Result<Vec<CodeRecord>> {
    serde_json::from_str(blob).context("failed to decode history")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodeSource;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn blob_round_trips_byte_for_byte() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap()
            + Duration::nanoseconds(123_456_789);
        let records = vec![
            CodeRecord::new("482913", CodeSource::Sms, base),
            CodeRecord::new("7788", CodeSource::Image, base - Duration::minutes(5)),
            CodeRecord::new("12345678", CodeSource::Clipboard, base - Duration::hours(3)),
        ];

        let blob = encode_history(&records).unwrap();
        let decoded = decode_history(&blob).unwrap();
        assert_eq!(decoded, records);
        assert_eq!(encode_history(&decoded).unwrap(), blob);
    }

    #[test]
    fn uses_lowercase_source_tags() {
        let record = CodeRecord::new("1234", CodeSource::Notification, Utc::now());
        let blob = encode_history(&[record]).unwrap();
        assert!(blob.contains("\"source\":\"notification\""));
    }

    #[test]
    fn rejects_corrupt_blob() {
        assert!(decode_history("{not json").is_err());
        assert!(decode_history("[{\"code\":1}]").is_err());
    }
}
