use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::stages::INSTALL_HOOKS;

pub const CONFIG_FILENAME: &str = "hookstage.yaml";

const DEFAULT_SOURCE: &str = "config/git/pre-commit";
const DEFAULT_HOOKS_DIR: &str = ".git/hooks";
const DEFAULT_MODE: &str = "rwxrwxrwx";

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_hooks_dir() -> String {
    DEFAULT_HOOKS_DIR.to_string()
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

/// Where hooks come from and where they go (paths relative to the repo root)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct HooksRaw {
    /// Tracked hook file, or a glob matching several hook files
    #[serde(default = "default_source")]
    source: String,
    /// Directory the hooks are copied into
    #[serde(default = "default_hooks_dir")]
    hooks_dir: String,
    /// Symbolic (`rwxr-xr-x`) or octal (`0755`) file mode
    #[serde(default = "default_mode")]
    mode: String,
}

impl Default for HooksRaw {
    fn default() -> Self {
        HooksRaw {
            source: default_source(),
            hooks_dir: default_hooks_dir(),
            mode: default_mode(),
        }
    }
}

/// A stage definition (or an extension of a built-in stage)
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StageDef {
    pub name: String,
    /// Stages that must complete before this one
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Shell commands run in the repository root, in order
    #[serde(default)]
    pub commands: Vec<String>,
}

/// Raw configuration structure (as parsed from YAML)
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HookstageConfigRaw {
    hooks: Option<HooksRaw>,
    stages: Option<Vec<StageDef>>,
}

/// Validated installer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSettings {
    pub source: String,
    pub hooks_dir: PathBuf,
    pub mode: u32,
}

/// Resolved configuration (defaults applied, mode parsed)
#[derive(Debug, Clone)]
pub struct HookstageConfig {
    pub hooks: HookSettings,
    pub stages: Vec<StageDef>,
}

impl Default for HookstageConfig {
    fn default() -> Self {
        HookstageConfig {
            hooks: HookSettings {
                source: DEFAULT_SOURCE.to_string(),
                hooks_dir: PathBuf::from(DEFAULT_HOOKS_DIR),
                mode: 0o777,
            },
            stages: Vec::new(),
        }
    }
}

/// Parses a permission string: `rwxrwxrwx`-style or 3/4 digit octal.
pub fn parse_mode(mode: &str) -> Result<u32> {
    let mode = mode.trim();

    if mode.len() == 9 && mode.chars().all(|c| "rwx-".contains(c)) {
        let mut bits = 0u32;
        for (i, c) in mode.chars().enumerate() {
            let expected = ['r', 'w', 'x'][i % 3];
            bits <<= 1;
            if c == expected {
                bits |= 1;
            } else if c != '-' {
                bail!("invalid mode '{}': expected '{}' or '-' at position {}", mode, expected, i + 1);
            }
        }
        return Ok(bits);
    }

    let digits = mode.strip_prefix("0o").unwrap_or(mode);
    if (3..=4).contains(&digits.len()) && digits.chars().all(|c| ('0'..='7').contains(&c)) {
        let bits = u32::from_str_radix(digits, 8)
            .with_context(|| format!("invalid octal mode '{}'", mode))?;
        if bits > 0o777 {
            bail!("invalid mode '{}': special bits are not supported", mode);
        }
        return Ok(bits);
    }

    bail!("invalid mode '{}': use 'rwxrwxrwx' or octal like '0777'", mode)
}

/// Validates hook settings and turns them into their resolved form
fn resolve_hooks(raw: HooksRaw, config_path: &Path) -> Result<HookSettings> {
    if raw.source.trim().is_empty() {
        bail!("Invalid config at {}: 'hooks.source' is empty", config_path.display());
    }
    if Path::new(&raw.source).is_absolute() || Path::new(&raw.hooks_dir).is_absolute() {
        bail!(
            "Invalid config at {}: hook paths must be relative to the repository root",
            config_path.display()
        );
    }
    if raw.hooks_dir.trim().is_empty() {
        bail!("Invalid config at {}: 'hooks.hooks_dir' is empty", config_path.display());
    }
    glob::Pattern::new(&raw.source).with_context(|| {
        format!(
            "Invalid config at {}: 'hooks.source' is not a valid pattern",
            config_path.display()
        )
    })?;
    let mode = parse_mode(&raw.mode)
        .with_context(|| format!("Invalid config at {}", config_path.display()))?;
    if mode & 0o111 != 0o111 {
        bail!(
            "Invalid config at {}: mode '{}' must let owner, group and others execute the hook",
            config_path.display(),
            raw.mode
        );
    }

    Ok(HookSettings {
        source: raw.source,
        hooks_dir: PathBuf::from(raw.hooks_dir),
        mode,
    })
}

/// Validates a stage definition
fn validate_stage(stage: &StageDef, config_path: &Path) -> Result<()> {
    if stage.name.trim().is_empty() {
        bail!("Invalid config at {}: stage missing 'name'", config_path.display());
    }
    if stage.name == INSTALL_HOOKS && !stage.commands.is_empty() {
        bail!(
            "Invalid config at {}: stage '{}' is built in and cannot have 'commands'",
            config_path.display(),
            INSTALL_HOOKS
        );
    }
    if stage.depends_on.iter().any(|d| d == &stage.name) {
        bail!(
            "Invalid config at {}: stage '{}' depends on itself",
            config_path.display(),
            stage.name
        );
    }
    Ok(())
}

/// Loads and parses a hookstage.yaml config file.
pub fn load_config(config_path: &Path) -> Result<HookstageConfig> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

    // An empty file is a valid "all defaults" config
    let parsed: HookstageConfigRaw = if content.trim().is_empty() {
        HookstageConfigRaw::default()
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", config_path.display()))?
    };

    let hooks = resolve_hooks(parsed.hooks.unwrap_or_default(), config_path)?;
    let stages = parsed.stages.unwrap_or_default();

    let mut seen = HashSet::new();
    for stage in &stages {
        validate_stage(stage, config_path)?;
        if !seen.insert(stage.name.as_str()) {
            bail!(
                "Invalid config at {}: stage '{}' defined more than once",
                config_path.display(),
                stage.name
            );
        }
    }

    Ok(HookstageConfig { hooks, stages })
}

/// Loads the config for a repository.
/// An explicit path must exist; otherwise `<root>/hookstage.yaml` is used when present.
pub fn load_for_root(root: &Path, explicit: Option<&Path>) -> Result<HookstageConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let candidate = root.join(CONFIG_FILENAME);
    if candidate.is_file() {
        tracing::debug!(path = %candidate.display(), "loading config");
        load_config(&candidate)
    } else {
        tracing::debug!(root = %root.display(), "no config file, using defaults");
        Ok(HookstageConfig::default())
    }
}
