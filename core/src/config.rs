//! Runner and harness configuration.
//!
//! Both structs deserialize from TOML with every field optional. The runner's
//! output directory can be overridden with `SEIR_OUTPUT_DIR`.

use crate::artifact::{ArtifactKind, ArtifactLayout, ArtifactResolver, InterventionIndex};
use crate::error::{Error, Result};
use crate::region::RegionRegistry;
use crate::validation::RtBounds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const OUTPUT_DIR_ENV: &str = "SEIR_OUTPUT_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub output_dir: PathBuf,
    pub interventions: Vec<InterventionIndex>,
    /// Per-kind template overrides merged over the default layout.
    pub layout: BTreeMap<ArtifactKind, String>,
    pub county_metadata: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            interventions: (0..4).map(InterventionIndex::new).collect(),
            layout: BTreeMap::new(),
            county_metadata: None,
        }
    }
}

impl RunnerConfig {
    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Self::from_toml_str(&content)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = env::var(OUTPUT_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.interventions.is_empty() {
            return Err(Error::Config(
                "at least one intervention index is required".to_string(),
            ));
        }
        if let Some((kind, _)) = self
            .layout
            .iter()
            .find(|(_, template)| template.trim().is_empty())
        {
            return Err(Error::Config(format!("empty template for artifact kind '{kind}'")));
        }
        Ok(())
    }

    pub fn layout(&self) -> ArtifactLayout {
        let mut layout = ArtifactLayout::default();
        layout.merge(&self.layout);
        layout
    }

    pub fn build_resolver(&self) -> Result<ArtifactResolver> {
        self.validate()?;
        let mut registry = RegionRegistry::builtin();
        if let Some(path) = &self.county_metadata {
            registry.load_county_metadata(path)?;
        }
        Ok(ArtifactResolver::new(
            self.output_dir.clone(),
            self.layout(),
            registry,
        ))
    }
}

/// Settings passed explicitly into a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Treat every warning diagnostic as fatal.
    pub strict: bool,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `seir_artifacts=debug`.
    pub log_filter: Option<String>,
    pub rt_bounds: RtBounds,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            strict: true,
            log_filter: None,
            rt_bounds: RtBounds::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| Error::Config(err.to_string()))
    }
}
