use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::parallel::ParseOptions;
use crate::taxonomy::ResolverConfig;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TAXATSV_CONFIG";
/// Project config file name, looked up from the working directory upwards
pub const PROJECT_CONFIG_NAME: &str = ".taxatsvrc";

/// `[parse]` section. Unset keys keep the `ParseOptions` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseSection {
    pub buffer_size: Option<usize>,
    pub chunk_size: Option<usize>,
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub strict_columns: Option<bool>,
    pub expected_columns: Option<usize>,
    pub preserve_order: Option<bool>,
    pub allow_crlf: Option<bool>,
    pub skip_progress_first_row: Option<bool>,
    pub timeout: Option<Duration>,
}

/// `[taxonomy]` and `[taxonomy.aliases]` sections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomySection {
    pub max_hops: Option<usize>,
    pub aliases: HashMap<String, String>,
}

/// Configuration file handler for taxatsv
///
/// ```ini
/// [parse]
/// chunk_size = 8M
/// workers = 4
/// timeout = 5m
///
/// [taxonomy]
/// max_hops = 64
///
/// [taxonomy.aliases]
/// superkingdom = kingdom
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub parse: ParseSection,
    pub taxonomy: TaxonomySection,
}

impl ConfigFile {
    /// Find project-level .taxatsvrc by walking up from `start`
    pub fn find_project_config_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            let config_path = current.join(PROJECT_CONFIG_NAME);
            if config_path.is_file() {
                return Some(config_path);
            }
            if !current.pop() {
                // Reached filesystem root
                break;
            }
        }
        None
    }

    /// Find project-level .taxatsvrc by walking up from the working directory
    pub fn find_project_config() -> Option<PathBuf> {
        let current = env::current_dir().ok()?;
        Self::find_project_config_from(&current)
    }

    /// Pick the config file: explicit path > env var > project walk-up.
    fn resolve_path(
        explicit: Option<&Path>,
        env_value: Option<OsString>,
        start: Option<&Path>,
    ) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(value) = env_value.filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(value));
        }
        start.and_then(Self::find_project_config_from)
    }

    /// Load configuration with precedence: explicit path > $TAXATSV_CONFIG >
    /// project .taxatsvrc > defaults. A named file that cannot be read is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let cwd = env::current_dir().ok();
        match Self::resolve_path(explicit, env::var_os(CONFIG_ENV_VAR), cwd.as_deref()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::load_from_path(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse_ini_content(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse INI content from string
    pub fn parse_ini_content(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Check for section headers
            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            let Some(eq_pos) = line.find('=') else {
                bail!("line {line_no}: expected key = value, got {line:?}");
            };
            let key = line[..eq_pos].trim();
            let value = line[eq_pos + 1..].trim();

            match current_section.as_str() {
                "parse" => config
                    .set_parse_key(key, value)
                    .with_context(|| format!("line {line_no}: [parse] {key}"))?,
                "taxonomy" => match key {
                    "max_hops" => {
                        config.taxonomy.max_hops = Some(
                            parse_count(value)
                                .with_context(|| format!("line {line_no}: [taxonomy] {key}"))?,
                        )
                    }
                    _ => tracing::warn!(line = line_no, key, "ignoring unknown [taxonomy] key"),
                },
                "taxonomy.aliases" => {
                    config
                        .taxonomy
                        .aliases
                        .insert(key.to_string(), value.to_string());
                }
                _ => tracing::warn!(
                    line = line_no,
                    section = %current_section,
                    key,
                    "ignoring key outside known sections"
                ),
            }
        }

        Ok(config)
    }

    fn set_parse_key(&mut self, key: &str, value: &str) -> Result<()> {
        let parse = &mut self.parse;
        match key {
            "buffer_size" => parse.buffer_size = Some(parse_size(value)?),
            "chunk_size" => parse.chunk_size = Some(parse_size(value)?),
            "batch_size" => parse.batch_size = Some(parse_count(value)?),
            "workers" => parse.workers = Some(parse_count(value)?),
            "strict_columns" => parse.strict_columns = Some(parse_bool(value)?),
            "expected_columns" => parse.expected_columns = Some(parse_count(value)?),
            "preserve_order" => parse.preserve_order = Some(parse_bool(value)?),
            "allow_crlf" => parse.allow_crlf = Some(parse_bool(value)?),
            "skip_progress_first_row" => parse.skip_progress_first_row = Some(parse_bool(value)?),
            "timeout" => {
                parse.timeout = Some(
                    humantime::parse_duration(value)
                        .map_err(|e| anyhow!("invalid duration {value:?}: {e}"))?,
                )
            }
            _ => tracing::warn!(key, "ignoring unknown [parse] key"),
        }
        Ok(())
    }

    /// Merge two configuration objects, with the second taking precedence
    pub fn merge_configs(base: Self, overlay: Self) -> Self {
        let (b, o) = (base.parse, overlay.parse);
        Self {
            parse: ParseSection {
                buffer_size: o.buffer_size.or(b.buffer_size),
                chunk_size: o.chunk_size.or(b.chunk_size),
                batch_size: o.batch_size.or(b.batch_size),
                workers: o.workers.or(b.workers),
                strict_columns: o.strict_columns.or(b.strict_columns),
                expected_columns: o.expected_columns.or(b.expected_columns),
                preserve_order: o.preserve_order.or(b.preserve_order),
                allow_crlf: o.allow_crlf.or(b.allow_crlf),
                skip_progress_first_row: o.skip_progress_first_row.or(b.skip_progress_first_row),
                timeout: o.timeout.or(b.timeout),
            },
            taxonomy: TaxonomySection {
                max_hops: overlay.taxonomy.max_hops.or(base.taxonomy.max_hops),
                aliases: {
                    let mut merged = base.taxonomy.aliases;
                    merged.extend(overlay.taxonomy.aliases);
                    merged
                },
            },
        }
    }

    /// Overlay the `[parse]` section onto `options`.
    pub fn apply_parse_options(&self, mut options: ParseOptions) -> ParseOptions {
        let parse = &self.parse;
        if let Some(v) = parse.buffer_size {
            options.buffer_size = v;
        }
        if let Some(v) = parse.chunk_size {
            options.chunk_size = v;
        }
        if let Some(v) = parse.batch_size {
            options.batch_size = v;
        }
        if let Some(v) = parse.workers {
            options.workers = v;
        }
        if let Some(v) = parse.strict_columns {
            options.strict_columns = v;
        }
        if parse.expected_columns.is_some() {
            options.expected_columns = parse.expected_columns;
            options.strict_columns = parse.strict_columns.unwrap_or(true);
        }
        if let Some(v) = parse.preserve_order {
            options.preserve_order = v;
        }
        if let Some(v) = parse.allow_crlf {
            options.allow_crlf = v;
        }
        if let Some(v) = parse.skip_progress_first_row {
            options.skip_progress_first_row = v;
        }
        if parse.timeout.is_some() {
            options.timeout = parse.timeout;
        }
        options.with_defaults()
    }

    pub fn parse_options(&self) -> ParseOptions {
        self.apply_parse_options(ParseOptions::default())
    }

    /// Resolver policy: defaults, then `[taxonomy]` overrides and extra aliases.
    pub fn resolver_config(&self) -> ResolverConfig {
        let mut config = ResolverConfig::default();
        if let Some(max_hops) = self.taxonomy.max_hops {
            config.max_hops = max_hops;
        }
        config.aliases.extend(
            self.taxonomy
                .aliases
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        config
    }
}

/// Byte size with optional K/M/G suffix (binary units), e.g. `8M`, `512k`, `1048576`.
pub fn parse_size(value: &str) -> Result<usize> {
    let value = value.trim();
    let trimmed = value.trim_end_matches(['B', 'b']);
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('K' | 'k') => (&trimmed[..trimmed.len() - 1], 1usize << 10),
        Some('M' | 'm') => (&trimmed[..trimmed.len() - 1], 1usize << 20),
        Some('G' | 'g') => (&trimmed[..trimmed.len() - 1], 1usize << 30),
        _ => (trimmed, 1usize),
    };
    let number: usize = digits
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid size {value:?}"))?;
    number
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("size {value:?} overflows"))
}

fn parse_count(value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid number {value:?}"))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow!("invalid boolean {value:?}")),
    }
}
