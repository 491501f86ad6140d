use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clock::Zone;
use crate::resolve::OverlapPolicy;

/// Project config file, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "mtrack.toml";

/// One config file layer. Every field is optional so layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub timezone: Option<Zone>,
    #[serde(default)]
    pub overlap: Option<OverlapPolicy>,
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
}

/// Values given on the command line; `None` defers to lower layers.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_dir: Option<PathBuf>,
    pub timezone: Option<Zone>,
    pub allow_overlap: bool,
}

/// Settings for one run after all layers are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    pub timezone: Zone,
    pub overlap: OverlapPolicy,
    pub lock_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            timezone: Zone::default(),
            overlap: OverlapPolicy::default(),
            lock_timeout: Duration::from_millis(default_lock_timeout_ms()),
        }
    }
}

pub fn load_project_config(project_root: &Path) -> Result<FileConfig> {
    load_file(&project_root.join(PROJECT_CONFIG_FILE))
}

pub fn load_user_config() -> Result<FileConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(FileConfig::default());
    };
    load_file(&config_dir.join("mtrack/config.toml"))
}

fn load_file(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<FileConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge CLI flags, environment, project file and user file, in that order
/// of precedence.
pub fn resolve_config(project_root: &Path, cli: &CliOverrides) -> Result<RunConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env = EnvLayer {
        output_dir: env::var_os("MTRACK_OUTPUT_DIR").map(PathBuf::from),
        timezone: env::var("MTRACK_TIMEZONE").ok(),
        overlap: env::var("MTRACK_OVERLAP").ok(),
    };

    merge(cli, &env, &project, &user)
}

/// Raw `MTRACK_*` environment values.
#[derive(Debug, Clone, Default)]
struct EnvLayer {
    output_dir: Option<PathBuf>,
    timezone: Option<String>,
    overlap: Option<String>,
}

fn merge(
    cli: &CliOverrides,
    env: &EnvLayer,
    project: &FileConfig,
    user: &FileConfig,
) -> Result<RunConfig> {
    let env_zone = match env.timezone.as_deref() {
        Some(raw) => match Zone::parse(raw) {
            Some(zone) => Some(zone),
            None => bail!("MTRACK_TIMEZONE must be `local` or `utc`, got `{raw}`"),
        },
        None => None,
    };
    let env_overlap = match env.overlap.as_deref() {
        Some(raw) => match OverlapPolicy::parse(raw) {
            Some(policy) => Some(policy),
            None => bail!("MTRACK_OVERLAP must be `reject` or `allow`, got `{raw}`"),
        },
        None => None,
    };

    let output_dir = cli
        .output_dir
        .clone()
        .or_else(|| env.output_dir.clone())
        .or_else(|| project.output_dir.clone())
        .or_else(|| user.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let timezone = cli
        .timezone
        .or(env_zone)
        .or(project.timezone)
        .or(user.timezone)
        .unwrap_or_default();

    let overlap = if cli.allow_overlap {
        OverlapPolicy::Allow
    } else {
        env_overlap
            .or(project.overlap)
            .or(user.overlap)
            .unwrap_or_default()
    };

    let lock_timeout_ms = project
        .lock_timeout_ms
        .or(user.lock_timeout_ms)
        .unwrap_or_else(default_lock_timeout_ms);

    Ok(RunConfig {
        output_dir,
        timezone,
        overlap,
        lock_timeout: Duration::from_millis(lock_timeout_ms),
    })
}

const fn default_lock_timeout_ms() -> u64 {
    2_000
}
