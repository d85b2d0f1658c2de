/// Diagnostic dump of the per-cycle forecast cache.
///
/// When `dump_json` is set (or `--dump` is passed) every fetched document is
/// written to `{logs_dir}/{YYYY-MM-DD} Forecast Service.txt`. The file is
/// rewritten on every cycle, so each day keeps only its latest dump.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::logging::{self, Source};
use crate::model::LocationKey;

pub fn dump_file_name(logs_dir: &Path, date: NaiveDate) -> PathBuf {
    logs_dir.join(format!("{} Forecast Service.txt", date.format("%Y-%m-%d")))
}

/// Writes every cached document, locations sorted for a stable layout.
/// Returns the path written.
pub fn write_dump(
    logs_dir: &Path,
    documents: &HashMap<LocationKey, Value>,
    now: NaiveDateTime,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)?;
    let path = dump_file_name(logs_dir, now.date());

    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "Forecast Service JSON Data")?;
    writeln!(file, "Written at: {}", now.format("%Y-%m-%d %H:%M"))?;
    writeln!(file, "{}", "=".repeat(72))?;

    let mut locations: Vec<&LocationKey> = documents.keys().collect();
    locations.sort();
    for location in locations {
        writeln!(file, "Location Specified: {}", location)?;
        let pretty = serde_json::to_string_pretty(&documents[location]).map_err(std::io::Error::other)?;
        writeln!(file, "{}\n", pretty)?;
    }

    logging::info(
        Source::System,
        None,
        &format!("Weather data written to: {}", path.display()),
    );
    Ok(path)
}
