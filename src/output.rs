//! Rendering of task stdout for the command line

use clap::ValueEnum;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One pretty-printed JSON array of all records
    #[default]
    Json,
    /// One compact JSON record per line
    Jsonl,
    /// Output exactly as the task wrote it
    Raw,
}

/// Render captured stdout in the requested format.
///
/// Lines that are not valid JSON are kept verbatim; in `json` mode they
/// become string elements of the array.
pub fn render(stdout: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Raw => stdout.to_string(),
        OutputFormat::Jsonl => {
            let mut out = String::new();
            for line in records(stdout) {
                match serde_json::from_str::<Value>(line) {
                    Ok(value) => out.push_str(&value.to_string()),
                    Err(_) => out.push_str(line),
                }
                out.push('\n');
            }
            out
        }
        OutputFormat::Json => {
            let values: Vec<Value> = records(stdout)
                .map(|line| {
                    serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string()))
                })
                .collect();
            serde_json::to_string_pretty(&values).unwrap_or_default() + "\n"
        }
    }
}

fn records(stdout: &str) -> impl Iterator<Item = &str> {
    stdout.lines().map(str::trim).filter(|line| !line.is_empty())
}
