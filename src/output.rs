use serde::Serialize;

/// What the watch side set up before entering its event loop.
#[derive(Debug, Serialize)]
pub struct WatchSummary {
    pub targets: usize,
    pub directories: usize,
    /// Originals already evicted by a previous run.
    pub placeholders: usize,
}

/// Print the startup summary.
///
/// - `json = true`: emit a single-line JSON object to stdout.
/// - `json = false`: emit a human-readable line to stdout.
///
/// Logs go to stderr, so stdout stays clean for anything waiting on this line.
pub fn print_watch_summary(summary: &WatchSummary, json: bool) {
    if json {
        match serde_json::to_string(summary) {
            Ok(s) => println!("{}", s),
            Err(e) => tracing::error!(error = %e, "error serialising summary"),
        }
        return;
    }

    println!("{}", format_summary(summary));
}

fn format_summary(summary: &WatchSummary) -> String {
    let mut line = format!(
        "Watching {} {} under {} {}",
        summary.directories,
        plural(summary.directories, "directory", "directories"),
        summary.targets,
        plural(summary.targets, "target", "targets"),
    );
    if summary.placeholders > 0 {
        line.push_str(&format!(
            " ({} {} held)",
            summary.placeholders,
            plural(summary.placeholders, "placeholder", "placeholders")
        ));
    }
    line
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_summary() {
        let summary = WatchSummary {
            targets: 1,
            directories: 3,
            placeholders: 0,
        };
        assert_eq!(format_summary(&summary), "Watching 3 directories under 1 target");

        let summary = WatchSummary {
            targets: 2,
            directories: 1,
            placeholders: 1,
        };
        assert_eq!(
            format_summary(&summary),
            "Watching 1 directory under 2 targets (1 placeholder held)"
        );
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = WatchSummary {
            targets: 2,
            directories: 5,
            placeholders: 0,
        };
        let value: serde_json::Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"targets": 2, "directories": 5, "placeholders": 0})
        );
    }
}
