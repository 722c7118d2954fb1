use chrono::{DateTime, TimeZone, Utc};

fn fmt_ts(ms: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now);
    dt.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

/// File name of the n-th exported frame.
/// e.g. "exportsequence_000042.jpg"
pub fn sequence_file_name(prefix: &str, n: u64, extension: &str) -> String {
    format!("{prefix}{n:06}.{extension}")
}

/// File name of the framerate CSV for a run started at `started_at_ms`.
/// e.g. "framerate_20260218T093000000Z.csv"
pub fn csv_file_name(started_at_ms: i64) -> String {
    format!("framerate_{}.csv", fmt_ts(started_at_ms))
}

/// File name of the JSON run summary.
/// e.g. "summary_20260218T093000000Z.json"
pub fn summary_file_name(started_at_ms: i64) -> String {
    format!("summary_{}.json", fmt_ts(started_at_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_names_sort_numerically() {
        assert_eq!(
            sequence_file_name("exportsequence_", 7, "jpg"),
            "exportsequence_000007.jpg"
        );
        let mut names: Vec<String> = [10, 2, 1]
            .iter()
            .map(|&n| sequence_file_name("f", n, "png"))
            .collect();
        names.sort();
        assert_eq!(names, vec!["f000001.png", "f000002.png", "f000010.png"]);
    }

    #[test]
    fn report_names_share_the_run_timestamp() {
        // 2025-02-18T09:30:00.000Z
        let start = 1739871000000i64;
        assert_eq!(csv_file_name(start), "framerate_20250218T093000000Z.csv");
        assert_eq!(summary_file_name(start), "summary_20250218T093000000Z.json");
    }
}
