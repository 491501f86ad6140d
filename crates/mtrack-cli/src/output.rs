//! Output layer for the run summary and errors.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use mtrack_core::error::ErrorCode;
use mtrack_core::pipeline::RunSummary;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, aligned fields).
    Pretty,
    /// Plain rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {}
        }
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, and TTY defaults.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub error_code: String,
}

impl CliError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_string),
            error_code: code.code().to_string(),
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> io::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(mode, error, &mut out)
}

fn write_error(mode: OutputMode, error: &CliError, out: &mut dyn Write) -> io::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error[{}]: {}", error.error_code, error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
            Ok(())
        }
    }
}

/// Render the run summary to stdout.
pub fn render_summary(mode: OutputMode, summary: &RunSummary) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_summary(mode, summary, &mut out)
}

fn write_summary(mode: OutputMode, summary: &RunSummary, out: &mut dyn Write) -> io::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut *out, summary)?;
            writeln!(out)
        }
        OutputMode::Text => {
            writeln!(out, "destination  rows  path")?;
            for dest in &summary.destinations {
                writeln!(out, "{}  {}  {}", dest.name, dest.rows, dest.path.display())?;
            }
            Ok(())
        }
        OutputMode::Pretty => {
            pretty_section(out, &format!("mtrack {} run", summary.grouping))?;
            pretty_kv(out, "input", summary.input.display().to_string())?;
            pretty_kv(out, "output", summary.output_directory.display().to_string())?;
            pretty_kv(out, "intervals", summary.intervals.to_string())?;
            pretty_kv(out, "machines", summary.machines.to_string())?;
            pretty_kv(out, "resolved", summary.resolved_rows.to_string())?;
            pretty_kv(out, "written", summary.written_rows.to_string())?;

            if !summary.destinations.is_empty() {
                writeln!(out)?;
                pretty_section(out, "Destinations")?;
                for dest in &summary.destinations {
                    writeln!(out, "{:>8}  {}", dest.rows, dest.name)?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtrack_core::route::{DestinationSummary, Grouping};
    use std::path::PathBuf;

    fn summary() -> RunSummary {
        RunSummary {
            grouping: Grouping::Id,
            input: PathBuf::from("in.csv"),
            output_directory: PathBuf::from("out/by_id"),
            intervals: 3,
            machines: 2,
            resolved_rows: 5,
            written_rows: 4,
            destinations: vec![DestinationSummary {
                name: "M1".to_string(),
                path: PathBuf::from("out/by_id/M1.csv"),
                rows: 4,
            }],
        }
    }

    fn rendered(mode: OutputMode) -> String {
        let mut buf = Vec::new();
        write_summary(mode, &summary(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn resolve_format_flag_wins_over_json_and_env() {
        let mode = resolve_output_mode_inner(Some(OutputMode::Text), true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_json_flag_beats_env() {
        let mode = resolve_output_mode_inner(None, true, Some("text"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_env_then_tty() {
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("JSON"), false),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("bogus"), true),
            OutputMode::Pretty
        );
        assert_eq!(resolve_output_mode_inner(None, false, None, false), OutputMode::Text);
    }

    #[test]
    fn json_summary_is_parseable() {
        let json: serde_json::Value = serde_json::from_str(&rendered(OutputMode::Json)).unwrap();
        assert_eq!(json["grouping"], "id");
        assert_eq!(json["written_rows"], 4);
        assert_eq!(json["destinations"][0]["name"], "M1");
    }

    #[test]
    fn text_summary_lists_destinations() {
        let text = rendered(OutputMode::Text);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("M1  4  out/by_id/M1.csv"));
    }

    #[test]
    fn pretty_summary_has_sections() {
        let text = rendered(OutputMode::Pretty);
        assert!(text.starts_with("mtrack id run\n"));
        assert!(text.contains("Destinations"));
    }

    #[test]
    fn errors_carry_code_and_hint() {
        let error = CliError::new(ErrorCode::MissingColumn, "in.csv: missing required column `endY`");
        let mut buf = Vec::new();
        write_error(OutputMode::Text, &error, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("error[E2002]: in.csv"));
        assert!(text.contains("suggestion:"));

        let mut buf = Vec::new();
        write_error(OutputMode::Json, &error, &mut buf).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["error"]["error_code"], "E2002");
    }
}
