//! Parts file parsing
//!
//! ```yaml
//! parts:
//!   hello:
//!     plugin: dump
//!     source: src/hello
//!     stage-packages: [curl]
//!     after: [base]
//! ```

use crate::error::{StagecraftError, StagecraftResult};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

/// Top-level layout of the parts file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartsFile {
    pub parts: BTreeMap<String, PartSpec>,
}

/// How a part produces its install tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plugin {
    /// Nothing to build; the part only contributes stage packages
    #[default]
    Nil,
    /// Copy `source` verbatim
    Dump,
}

/// One part declaration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartSpec {
    #[serde(default)]
    pub plugin: Plugin,

    pub source: Option<PathBuf>,

    #[serde(default)]
    pub stage_packages: Vec<String>,

    #[serde(default)]
    pub after: Vec<String>,
}

/// A named, validated part
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub spec: PartSpec,
}

impl PartsFile {
    /// Parse YAML text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> StagecraftResult<Self> {
        let file: PartsFile =
            serde_yaml::from_str(content).map_err(|e| StagecraftError::spec(origin, e.to_string()))?;
        file.validate(origin)?;
        Ok(file)
    }

    /// Read and parse a parts file
    pub async fn load(path: &Path) -> StagecraftResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StagecraftError::io(format!("reading {}", path.display()), e))?;
        Self::parse(&content, path)
    }

    fn validate(&self, origin: &Path) -> StagecraftResult<()> {
        for (name, spec) in &self.parts {
            if !is_plain_name(name) {
                return Err(StagecraftError::spec(
                    origin,
                    format!("invalid part name '{}'", name),
                ));
            }
            if spec.plugin == Plugin::Dump && spec.source.is_none() {
                return Err(StagecraftError::spec(
                    origin,
                    format!("part '{}' uses the dump plugin but has no source", name),
                ));
            }
            for dep in &spec.after {
                if !self.parts.contains_key(dep) {
                    return Err(StagecraftError::spec(
                        origin,
                        format!("part '{}' depends on undefined part '{}'", name, dep),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Parts in dependency order, ties broken by name
    pub fn ordered(&self, origin: &Path) -> StagecraftResult<Vec<Part>> {
        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = self
            .parts
            .iter()
            .map(|(name, spec)| {
                let deps = spec.after.iter().map(String::as_str).collect();
                (name.as_str(), deps)
            })
            .collect();

        let mut ordered = Vec::with_capacity(self.parts.len());
        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(name, _)| *name)
                .collect();

            let Some(next) = ready.first().copied() else {
                let cycle: Vec<&str> = remaining.keys().copied().collect();
                return Err(StagecraftError::spec(
                    origin,
                    format!("circular dependency between parts: {}", cycle.join(", ")),
                ));
            };

            remaining.remove(next);
            for deps in remaining.values_mut() {
                deps.remove(next);
            }
            ordered.push(Part {
                name: next.to_string(),
                spec: self.parts[next].clone(),
            });
        }

        Ok(ordered)
    }
}

/// Part names become directory names under the parts directory
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    !name.contains(['/', '\\'])
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
}
