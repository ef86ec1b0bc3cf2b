// SPDX-License-Identifier: MIT

//! Runtime configuration
//!
//! [`WorkflowConfig`] is read from `TRIAGE_*` environment variables (a `.env`
//! file is loaded by the binary first). [`ExecutionConfig`] is the subset the
//! graph executor needs.

use crate::adk::error::TriageError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "TRIAGE_";

/// Executor limits applied to every run of a compiled graph
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionConfig {
    /// Abort with `MaxStepsExceeded` after this many node executions
    pub max_steps: Option<usize>,
    /// Abort with a timeout failure when a single node runs longer
    pub node_timeout: Option<Duration>,
}

impl ExecutionConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }
}

/// Where checkpoints are kept
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryType {
    InMemory,
    File(PathBuf),
}

/// Which conversation extractor the intake agent uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractorKind {
    Keyword,
    Llm,
}

/// Which decision maker the triage node uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriageKind {
    Rules,
    Llm,
}

/// Configuration for the workflow system
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub max_steps: usize,
    pub memory_type: MemoryType,

    pub gemini_api_key: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,

    pub extractor: ExtractorKind,
    pub triage: TriageKind,
    /// YAML patient directory replacing the built-in records
    pub patients_file: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_seconds: 30,
            max_steps: 25,
            memory_type: MemoryType::InMemory,
            gemini_api_key: String::new(),
            model_name: "gemini-2.5-flash".to_string(),
            temperature: 1.0,
            max_tokens: 1000,
            extractor: ExtractorKind::Keyword,
            triage: TriageKind::Rules,
            patients_file: None,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, TriageError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TriageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("MAX_RETRIES") {
            config.max_retries = parse("TRIAGE_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("TIMEOUT_SECONDS") {
            config.timeout_seconds = parse("TRIAGE_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("MAX_STEPS") {
            config.max_steps = parse("TRIAGE_MAX_STEPS", &v)?;
        }
        if let Some(v) = get("MODEL_NAME") {
            config.model_name = v;
        }
        if let Some(v) = get("TEMPERATURE") {
            config.temperature = parse("TRIAGE_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("MAX_TOKENS") {
            config.max_tokens = parse("TRIAGE_MAX_TOKENS", &v)?;
        }

        let checkpoint_dir = get("CHECKPOINT_DIR").unwrap_or_else(|| ".checkpoints".to_string());
        config.memory_type = match get("MEMORY_TYPE").as_deref() {
            None | Some("in_memory") => MemoryType::InMemory,
            Some("file") => MemoryType::File(PathBuf::from(checkpoint_dir)),
            Some(other) => {
                return Err(TriageError::config(format!(
                    "TRIAGE_MEMORY_TYPE must be 'in_memory' or 'file', got '{}'",
                    other
                )))
            }
        };

        config.extractor = match get("EXTRACTOR").as_deref() {
            None | Some("keyword") => ExtractorKind::Keyword,
            Some("llm") => ExtractorKind::Llm,
            Some(other) => {
                return Err(TriageError::config(format!(
                    "TRIAGE_EXTRACTOR must be 'keyword' or 'llm', got '{}'",
                    other
                )))
            }
        };

        config.triage = match get("TRIAGE_AGENT").as_deref() {
            None | Some("rules") => TriageKind::Rules,
            Some("llm") => TriageKind::Llm,
            Some(other) => {
                return Err(TriageError::config(format!(
                    "TRIAGE_TRIAGE_AGENT must be 'rules' or 'llm', got '{}'",
                    other
                )))
            }
        };

        config.patients_file = get("PATIENTS_FILE").map(PathBuf::from);
        // Unprefixed
        config.gemini_api_key = lookup("GEMINI_API_KEY").unwrap_or_default();

        Ok(config)
    }

    /// Executor limits derived from this configuration
    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            max_steps: Some(self.max_steps),
            node_timeout: (self.timeout_seconds > 0)
                .then(|| Duration::from_secs(self.timeout_seconds)),
        }
    }

    pub fn uses_model(&self) -> bool {
        self.extractor == ExtractorKind::Llm || self.triage == TriageKind::Llm
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, TriageError> {
    value
        .trim()
        .parse()
        .map_err(|_| TriageError::config(format!("invalid value for {}: '{}'", key, value)))
}
