use chrono::{DateTime, Local, TimeZone, Utc};

/// Milliseconds since the UNIX epoch, the unit used by persisted cache records.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render epoch milliseconds as a local `YYYY-MM-DD HH:MM` label for the UI.
pub fn format_millis_local(millis: i64) -> Option<String> {
    let utc: DateTime<Utc> = Utc.timestamp_millis_opt(millis).single()?;
    Some(utc.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_known_timestamp() {
        let label = format_millis_local(0).unwrap();
        assert_eq!(label.len(), "1970-01-01 00:00".len());
    }
}
