//! Kubeware packages: `kubeware.toml` metadata and JSON templates.
//!
//! A package is a directory:
//!
//! ```text
//! guestbook/
//!   kubeware.toml          name, version, template lists, [attributes]
//!   controllers/*.json     replication controller templates
//!   services/*.json        service templates
//! ```
//!
//! Templates are JSON documents whose strings may contain `{{ key }}`
//! placeholders. A string that is exactly one placeholder is replaced by
//! the attribute value itself, so `"replicas": "{{ replicas }}"` renders
//! to a number. Placeholders inside longer strings are interpolated.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::attributes::AttributeSet;
use crate::source::{self, SourceError};
use crate::types::{
    object_at, ControllerSpec, ServiceSpec, SpecError, COMPONENT_LABEL, KUBEWARE_LABEL,
    VERSION_LABEL,
};

/// Metadata file at the root of every package.
pub const METADATA_FILE: &str = "kubeware.toml";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Errors raised while reading a package or rendering its templates.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid kubeware metadata in {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid kubeware metadata in {}: {reason}", .path.display())]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("template {} is not valid JSON: {source}", .path.display())]
    TemplateJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("template failure in {}: {reason}", .path.display())]
    TemplateFailure { path: PathBuf, reason: String },

    #[error("template {} rendered an invalid document: {source}", .path.display())]
    Spec { path: PathBuf, source: SpecError },
}

/// Renders the desired-state documents of a release.
pub trait SpecGenerator: Send + Sync {
    fn render_services(&self, attributes: &AttributeSet) -> Result<Vec<ServiceSpec>, GenerateError>;

    fn render_controllers(
        &self,
        attributes: &AttributeSet,
    ) -> Result<Vec<ControllerSpec>, GenerateError>;
}

/// A parsed kubeware: identity, defaults, and a spec generator.
pub trait Kubeware: SpecGenerator {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn attribute_defaults(&self) -> AttributeSet;
}

/// Errors raised while locating or parsing a package.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Package(#[from] GenerateError),
}

/// Turns a kubeware identifier into a parsed package.
pub trait KubewareLoader: Send + Sync {
    fn load(&self, identifier: &str) -> Result<Box<dyn Kubeware>, LoadError>;
}

/// Loads packages from local directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLoader;

impl KubewareLoader for LocalLoader {
    fn load(&self, identifier: &str) -> Result<Box<dyn Kubeware>, LoadError> {
        let dir = source::fetch(identifier)?;
        Ok(Box::new(KubewarePackage::open(&dir)?))
    }
}

/// Contents of `kubeware.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubewareMetadata {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    #[serde(default)]
    pub services: Vec<PathBuf>,
    #[serde(default)]
    pub controllers: Vec<PathBuf>,
    #[serde(default)]
    pub attributes: toml::Table,
}

/// A kubeware package on the local filesystem.
#[derive(Debug, Clone)]
pub struct KubewarePackage {
    root: PathBuf,
    metadata: KubewareMetadata,
}

impl KubewarePackage {
    /// Open the package rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, GenerateError> {
        let path = root.join(METADATA_FILE);
        let content = std::fs::read_to_string(&path).map_err(|source| GenerateError::Io {
            path: path.clone(),
            source,
        })?;
        let metadata: KubewareMetadata =
            toml::from_str(&content).map_err(|source| GenerateError::Metadata {
                path: path.clone(),
                source,
            })?;

        if metadata.name.trim().is_empty() {
            return Err(GenerateError::InvalidMetadata {
                path,
                reason: "name is empty".into(),
            });
        }
        if metadata.version.trim().is_empty() {
            return Err(GenerateError::InvalidMetadata {
                path,
                reason: "version is empty".into(),
            });
        }

        debug!(
            name = %metadata.name,
            version = %metadata.version,
            services = metadata.services.len(),
            controllers = metadata.controllers.len(),
            "parsed kubeware metadata"
        );

        Ok(Self {
            root: root.to_path_buf(),
            metadata,
        })
    }

    pub fn metadata(&self) -> &KubewareMetadata {
        &self.metadata
    }

    fn render_all<T>(
        &self,
        files: &[PathBuf],
        attributes: &AttributeSet,
        parse: fn(Value) -> Result<T, SpecError>,
    ) -> Result<Vec<T>, GenerateError> {
        files
            .iter()
            .map(|file| {
                let path = self.root.join(file);
                let raw = std::fs::read(&path).map_err(|source| GenerateError::Io {
                    path: path.clone(),
                    source,
                })?;
                let template: Value =
                    serde_json::from_slice(&raw).map_err(|source| GenerateError::TemplateJson {
                        path: path.clone(),
                        source,
                    })?;
                let document = render_document(
                    template,
                    attributes,
                    &self.metadata.name,
                    &self.metadata.version,
                )
                .map_err(|reason| GenerateError::TemplateFailure {
                    path: path.clone(),
                    reason,
                })?;
                parse(document).map_err(|source| GenerateError::Spec { path, source })
            })
            .collect()
    }
}

impl SpecGenerator for KubewarePackage {
    fn render_services(&self, attributes: &AttributeSet) -> Result<Vec<ServiceSpec>, GenerateError> {
        self.render_all(&self.metadata.services, attributes, ServiceSpec::from_value)
    }

    fn render_controllers(
        &self,
        attributes: &AttributeSet,
    ) -> Result<Vec<ControllerSpec>, GenerateError> {
        self.render_all(&self.metadata.controllers, attributes, ControllerSpec::from_value)
    }
}

impl Kubeware for KubewarePackage {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn version(&self) -> &str {
        &self.metadata.version
    }

    fn attribute_defaults(&self) -> AttributeSet {
        AttributeSet::from_toml(&self.metadata.attributes)
    }
}

/// Substitute placeholders and stamp the kubeware labels on a document.
pub fn render_document(
    mut template: Value,
    attributes: &AttributeSet,
    name: &str,
    version: &str,
) -> Result<Value, String> {
    render_value(&mut template, attributes)?;

    let component = template
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let labels = object_at(&mut template, &["metadata", "labels"]);
    labels.insert(KUBEWARE_LABEL.into(), Value::from(name));
    labels.insert(VERSION_LABEL.into(), Value::from(version));
    if let Some(component) = component {
        labels.entry(COMPONENT_LABEL.to_string()).or_insert(Value::from(component));
    }
    Ok(template)
}

fn render_value(value: &mut Value, attributes: &AttributeSet) -> Result<(), String> {
    match value {
        Value::String(s) => {
            if let Some(rendered) = render_string(s, attributes)? {
                *value = rendered;
            }
        }
        Value::Array(items) => {
            for item in items {
                render_value(item, attributes)?;
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                render_value(v, attributes)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn render_string(s: &str, attributes: &AttributeSet) -> Result<Option<Value>, String> {
    let Some(caps) = PLACEHOLDER.captures(s) else {
        return Ok(None);
    };

    // A string that is exactly one placeholder takes the attribute's type.
    if let Some(whole) = caps.get(0)
        && whole.start() == 0
        && whole.end() == s.len()
    {
        return attributes
            .get(&caps[1])
            .cloned()
            .map(Some)
            .ok_or_else(|| format!("unknown attribute '{}'", &caps[1]));
    }

    let mut missing = None;
    let rendered = PLACEHOLDER.replace_all(s, |caps: &Captures<'_>| match attributes.get(&caps[1]) {
        Some(Value::String(v)) => v.clone(),
        Some(other) => other.to_string(),
        None => {
            missing.get_or_insert_with(|| caps[1].to_string());
            String::new()
        }
    });

    match missing {
        Some(key) => Err(format!("unknown attribute '{key}'")),
        None => Ok(Some(Value::String(rendered.into_owned()))),
    }
}
