//! Startup configuration.
//!
//! Two layers, both resolved once before the server starts listening:
//! process-level settings come from the environment (`AppConfig`), the
//! experiment definition comes from a YAML file (`ExperimentConfig`).
//! Any problem with either is fatal; a session never starts from a
//! partial configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read experiment config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse experiment config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid experiment config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port the coordinator listens on
    pub port: u16,
    /// Path to the experiment YAML definition
    pub experiment_config: PathBuf,
    /// Directory served under /images
    pub assets_dir: PathBuf,
    /// Base URL clients can reach this server on; used when building
    /// image URLs pushed over the WebSocket.
    pub public_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let port = env_parse("LAB_PORT", 8000)?;
        let public_base_url = std::env::var("LAB_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{port}"));

        Ok(Self {
            port,
            experiment_config: PathBuf::from(env_str("LAB_CONFIG", "cfg/experiment.yml")),
            assets_dir: PathBuf::from(env_str("LAB_ASSETS_DIR", "assets")),
            public_base_url,
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

// ============================================================================
// Experiment definition
// ============================================================================

fn default_repeat() -> u32 {
    1
}

/// One role slot block within a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleConfig {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupConfig {
    pub name: String,
    pub roles: Vec<RoleConfig>,
}

/// Filter selecting which participants decide in a sub-round.
/// An absent axis means "everyone" on that axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MakerConfig {
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionConfig {
    /// `None` means every registered participant decides.
    #[serde(default)]
    pub makers: Option<Vec<MakerConfig>>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubRoundConfig {
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    pub decision: DecisionConfig,
    #[serde(default)]
    pub hint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MainRoundConfig {
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    pub sub_rounds: Vec<SubRoundConfig>,
}

/// The immutable experiment definition loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentConfig {
    pub groups: Vec<GroupConfig>,
    pub main_rounds: Vec<MainRoundConfig>,
    /// Key into the scoring-algorithm registry.
    pub algorithm: String,
    /// Image names shown alongside every round, resolved to /images URLs.
    #[serde(default)]
    pub hint_pics: Vec<String>,
}

impl ExperimentConfig {
    /// Total number of participants the session waits for.
    pub fn total_participants(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.roles.iter())
            .map(|r| r.count as usize)
            .sum()
    }

    fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn has_role(&self, name: &str) -> bool {
        self.groups
            .iter()
            .flat_map(|g| g.roles.iter())
            .any(|r| r.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.groups.is_empty() {
            return invalid("at least one group is required".into());
        }
        for group in &self.groups {
            if group.roles.is_empty() {
                return invalid(format!("group '{}' has no roles", group.name));
            }
            for role in &group.roles {
                if role.count == 0 {
                    return invalid(format!(
                        "role '{}' in group '{}' has count 0",
                        role.name, group.name
                    ));
                }
            }
        }
        if self.main_rounds.is_empty() {
            return invalid("at least one main round is required".into());
        }
        for (mi, main_round) in self.main_rounds.iter().enumerate() {
            if main_round.repeat == 0 {
                return invalid(format!("main round {mi} has repeat 0"));
            }
            if main_round.sub_rounds.is_empty() {
                return invalid(format!("main round {mi} has no sub-rounds"));
            }
            for (si, sub_round) in main_round.sub_rounds.iter().enumerate() {
                if sub_round.repeat == 0 {
                    return invalid(format!("sub-round {mi}.{si} has repeat 0"));
                }
                if sub_round.decision.options.is_empty() {
                    return invalid(format!("sub-round {mi}.{si} has no decision options"));
                }
                if let Some(makers) = &sub_round.decision.makers {
                    if makers.is_empty() {
                        return invalid(format!(
                            "sub-round {mi}.{si} has an empty makers list; omit it to mean everyone"
                        ));
                    }
                    for maker in makers {
                        for name in maker.groups.iter().flatten() {
                            if self.group(name).is_none() {
                                return invalid(format!(
                                    "sub-round {mi}.{si} references unknown group '{name}'"
                                ));
                            }
                        }
                        for name in maker.roles.iter().flatten() {
                            if !self.has_role(name) {
                                return invalid(format!(
                                    "sub-round {mi}.{si} references unknown role '{name}'"
                                ));
                            }
                        }
                    }
                }
            }
        }
        if self.algorithm.trim().is_empty() {
            return invalid("algorithm key must not be empty".into());
        }
        Ok(())
    }
}

/// Load and validate the experiment definition. Any failure here
/// aborts startup.
pub fn load_experiment_config(path: &Path) -> Result<ExperimentConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_experiment_config(&raw)
}

pub fn parse_experiment_config(raw: &str) -> Result<ExperimentConfig, ConfigError> {
    let config: ExperimentConfig = serde_yaml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
groups:
  - name: A
    roles:
      - name: commander
        count: 1
      - name: soldier
        count: 2
  - name: B
    roles:
      - name: commander
        count: 1
main_rounds:
  - repeat: 2
    sub_rounds:
      - repeat: 1
        hint: "pick a battlefield"
        decision:
          makers:
            - roles: [commander]
          options: ["field 1", "field 2"]
      - decision:
          options: ["stay", "leave"]
algorithm: demo
hint_pics: [map.png]
"#;

    #[test]
    fn parses_minimal_config() {
        let cfg = parse_experiment_config(MINIMAL).unwrap();
        assert_eq!(cfg.total_participants(), 4);
        assert_eq!(cfg.main_rounds.len(), 1);
        assert_eq!(cfg.main_rounds[0].repeat, 2);
        // defaults
        let second = &cfg.main_rounds[0].sub_rounds[1];
        assert_eq!(second.repeat, 1);
        assert!(second.hint.is_empty());
        assert!(second.decision.makers.is_none());
        assert_eq!(cfg.hint_pics, vec!["map.png"]);
    }

    #[test]
    fn rejects_unknown_maker_group() {
        let raw = MINIMAL.replace("roles: [commander]", "groups: [C]");
        let err = parse_experiment_config(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn rejects_zero_role_count() {
        let raw = MINIMAL.replace("count: 2", "count: 0");
        assert!(parse_experiment_config(&raw).is_err());
    }

    #[test]
    fn rejects_empty_options() {
        let raw = MINIMAL.replace(r#"options: ["stay", "leave"]"#, "options: []");
        assert!(parse_experiment_config(&raw).is_err());
    }

    #[test]
    fn rejects_missing_rounds() {
        let err = parse_experiment_config("groups: [{name: A, roles: [{name: r, count: 1}]}]\nmain_rounds: []\nalgorithm: demo\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
