use crate::Result;
use crate::extract::ItemType;
use crate::extract::field_resolver;
use crate::extract::range_walker::RangeSpec;
use crate::github::RepoId;
use camino::{Utf8Path, Utf8PathBuf};
use ohno::{IntoAppError, app_err, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Which pull requests are worth collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    /// Only open pull requests are collected.
    Open,

    /// Only merged pull requests are collected; ones closed without merging
    /// are skipped.
    #[default]
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Repository to mine, in `owner/name` form.
    pub repo: String,

    #[serde(default)]
    pub state: StateFilter,

    /// Inclusive `[low, high]` item number range, applied per item type.
    pub range: RangeSpec,

    /// Directory the output document is written under.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Optional fields to collect per item type. An item type is only
    /// processed when it has an entry here; an empty list collects just the
    /// mandatory fields.
    #[serde(default)]
    pub fields: BTreeMap<ItemType, Vec<String>>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Config {
    /// Load configuration from an explicit path, or from the first of
    /// `miner.[toml|yml|yaml|json]` found under `base_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if no configuration file is found, or if the file
    /// cannot be read, parsed, or validated.
    pub fn load(base_path: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<(Self, Vec<String>)> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading repo-miner configuration from {path}"))?;
            (path.clone(), text)
        } else {
            let candidates = [
                base_path.join("miner.toml"),
                base_path.join("miner.yml"),
                base_path.join("miner.yaml"),
                base_path.join("miner.json"),
            ];

            let mut found = None;
            for path in &candidates {
                match fs::read_to_string(path) {
                    Ok(text) => {
                        found = Some((path.clone(), text));
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e).into_app_err_with(|| format!("reading repo-miner configuration from {path}")),
                }
            }

            let Some(result) = found else {
                bail!("no configuration file found (looked for miner.[toml|yml|yaml|json]); run `repo-miner init` to create one");
            };
            result
        };

        let extension = final_path.extension().unwrap_or_default();
        let config: Self = match extension {
            "toml" => toml::from_str(&text).into_app_err_with(|| format!("parsing TOML configuration from {final_path}"))?,
            "yml" | "yaml" => serde_yaml::from_str(&text).into_app_err_with(|| format!("parsing YAML configuration from {final_path}"))?,
            "json" => serde_json::from_str(&text).into_app_err_with(|| format!("parsing JSON configuration from {final_path}"))?,
            _ => return Err(app_err!("unsupported configuration file extension: {extension}")),
        };

        let mut warnings = Vec::new();
        config.validate(&mut warnings)?;
        Ok((config, warnings))
    }

    pub fn repo_id(&self) -> Result<RepoId> {
        RepoId::parse(&self.repo)
    }

    fn validate(&self, warnings: &mut Vec<String>) -> Result<()> {
        let _ = self.repo_id()?;

        if self.range.low == 0 {
            bail!("range low bound must be a positive item number");
        }

        if self.range.low > self.range.high {
            bail!("range low bound {} exceeds high bound {}", self.range.low, self.range.high);
        }

        for (item_type, fields) in &self.fields {
            for field in fields {
                if !field_resolver::is_known_field(*item_type, field) {
                    bail!(
                        "unknown {item_type} field '{field}' (known fields: {})",
                        field_resolver::known_fields(*item_type).join(", ")
                    );
                }

                if field_resolver::mandatory_fields(*item_type).contains(&field.as_str()) {
                    warnings.push(format!(
                        "{item_type} field '{field}' is always collected and does not need to be requested"
                    ));
                }
            }
        }

        if self.fields.is_empty() {
            warnings.push("no item types configured under [fields]; nothing will be extracted".to_string());
        }

        Ok(())
    }
}
