use std::path::PathBuf;

/// Clap value parser for the input argument: a path ending in `.csv`.
pub fn csv_path(raw: &str) -> Result<PathBuf, String> {
    if raw.trim().is_empty() {
        return Err("input path must not be empty".to_string());
    }
    if !raw.ends_with(".csv") {
        return Err(format!("'{raw}' is not a .csv file"));
    }
    Ok(PathBuf::from(raw))
}
