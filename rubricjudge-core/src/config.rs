// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for judging behavior
//!
//! Loaded from TOML, with environment variable overrides:
//!
//! ```toml
//! [judge]
//! check_positional_bias = true
//! persona = "critical_thinker"
//!
//! [repair]
//! max_retries = 3
//! on_failure = "random_default"
//!
//! [inference]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```

use crate::error::{Result, RubricError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of repair rounds per call
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// What to do with items still malformed after the last repair round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole call with `GenerationRepairExhausted`
    #[default]
    Raise,
    /// Substitute a placeholder record flagged `generation_failed`
    RandomDefault,
}

impl std::str::FromStr for FailurePolicy {
    type Err = RubricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "raise" => Ok(FailurePolicy::Raise),
            "random_default" => Ok(FailurePolicy::RandomDefault),
            other => Err(RubricError::Config(format!(
                "unknown failure policy '{}'",
                other
            ))),
        }
    }
}

/// Verdict kept when the two orderings of a pairwise contest disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasTieBreak {
    #[default]
    FirstPass,
    SecondPass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// Seed for the fallback option choice; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            on_failure: FailurePolicy::Raise,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeSettings {
    /// Re-run direct assessments with reversed options
    #[serde(default)]
    pub check_positional_bias: bool,

    /// Persona key, e.g. "critical_thinker"
    #[serde(default)]
    pub persona: Option<String>,

    #[serde(default)]
    pub bias_tie_break: BiasTieBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_model")]
    pub model: String,

    /// Override for OpenAI-compatible servers (vLLM, Ollama, ...)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum in-flight requests per batch
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Response cache TTL; 0 disables caching
    #[serde(default)]
    pub cache_ttl_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_concurrent() -> usize {
    8
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAI,
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            max_concurrent: default_max_concurrent(),
            cache_ttl_secs: 0,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricConfig {
    #[serde(default)]
    pub judge: JudgeSettings,

    #[serde(default)]
    pub repair: RepairConfig,

    #[serde(default)]
    pub inference: InferenceSettings,
}

impl RubricConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RubricError::Config(e.to_string()))
    }

    /// Defaults overridden by environment variables
    ///
    /// Supported environment variables:
    /// - RUBRICJUDGE_MAX_RETRIES: repair rounds per call (default: 3)
    /// - RUBRICJUDGE_ON_FAILURE: raise | random_default (default: raise)
    /// - RUBRICJUDGE_CHECK_POSITIONAL_BIAS: true | false (default: false)
    /// - RUBRICJUDGE_MODEL: model name (default: gpt-4o-mini)
    /// - RUBRICJUDGE_BASE_URL: inference endpoint override
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply environment overrides on top of this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(retries) = std::env::var("RUBRICJUDGE_MAX_RETRIES") {
            self.repair.max_retries = retries.parse().map_err(|_| {
                RubricError::Config(format!("RUBRICJUDGE_MAX_RETRIES is not a number: {}", retries))
            })?;
        }

        if let Ok(policy) = std::env::var("RUBRICJUDGE_ON_FAILURE") {
            self.repair.on_failure = policy.parse()?;
        }

        if let Ok(check) = std::env::var("RUBRICJUDGE_CHECK_POSITIONAL_BIAS") {
            self.judge.check_positional_bias = check.parse().map_err(|_| {
                RubricError::Config(format!(
                    "RUBRICJUDGE_CHECK_POSITIONAL_BIAS is not true or false: {}",
                    check
                ))
            })?;
        }

        if let Ok(model) = std::env::var("RUBRICJUDGE_MODEL") {
            self.inference.model = model;
        }

        if let Ok(base_url) = std::env::var("RUBRICJUDGE_BASE_URL") {
            self.inference.base_url = Some(base_url);
        }

        Ok(())
    }
}
