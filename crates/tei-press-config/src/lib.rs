//! Project configuration and publication manifests.
//!
//! A config file maps project names to a file root and pipeline settings.
//! Each project carries a publication manifest listing its reading text /
//! annotations pairs, variants, manuscripts and comment records; the
//! manifest stands in for the publication database the wider platform
//! keeps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use tei_press_engine::notes::CommentRecord;
use tei_press_engine::publish::{
    CommentSource, EstComPair, ManuscriptItem, PublicationBatch, VariantItem,
};
use tei_press_engine::PipelineConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Root of the project's master and generated files.
    pub file_root: PathBuf,
    /// Publication manifest path, relative to `file_root` unless absolute.
    pub manifest: PathBuf,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ProjectConfig {
    pub fn manifest_path(&self) -> PathBuf {
        if self.manifest.is_absolute() {
            self.manifest.clone()
        } else {
            self.file_root.join(&self.manifest)
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        // Expand shell variables and tilde in each project's file root
        for project in config.projects.values_mut() {
            project.file_root = expand_path(&project.file_root).unwrap_or(project.file_root.clone());
        }

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/tei-press");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }
}

fn expand_path(path: &Path) -> Option<PathBuf> {
    let path_str = path.to_string_lossy();
    match shellexpand::full(&path_str) {
        Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
        Err(_) => None,
    }
}

/// Publication rows for one project, read from TOML instead of the
/// platform database.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub publications: Vec<PublicationEntry>,
    #[serde(default)]
    pub variants: Vec<VariantEntry>,
    #[serde(default)]
    pub manuscripts: Vec<ManuscriptEntry>,
    #[serde(default)]
    pub comments: Vec<CommentEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicationEntry {
    pub id: i64,
    pub collection_id: i64,
    pub original_filename: PathBuf,
    pub comment_filename: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VariantEntry {
    pub id: i64,
    pub publication_id: i64,
    pub collection_id: i64,
    pub original_filename: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManuscriptEntry {
    pub id: i64,
    pub publication_id: i64,
    pub collection_id: i64,
    pub original_filename: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentEntry {
    pub id: i64,
    pub publication_id: i64,
    pub shortened_selection: String,
    pub description: String,
}

impl Manifest {
    pub fn load_from_path<P: AsRef<Path>>(manifest_path: P) -> Result<Option<Self>, ConfigError> {
        let manifest_path = manifest_path.as_ref();
        if !manifest_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(manifest_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: manifest_path.to_path_buf(),
                source,
            }
        })?;

        let manifest =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: manifest_path.to_path_buf(),
                source,
            })?;

        Ok(Some(manifest))
    }

    /// Resolve every entry into source and target paths under `file_root`.
    /// Generated files land under `xml/est`, `xml/com`, `xml/var` and
    /// `xml/ms`, named after their database ids.
    pub fn to_batch(&self, file_root: &Path) -> PublicationBatch {
        let pairs = self
            .publications
            .iter()
            .map(|p| {
                let est_name = format!("{}_{}_est.xml", p.id, p.collection_id);
                let com_name = format!("{}_{}_com.xml", p.id, p.collection_id);
                EstComPair {
                    publication_id: p.id,
                    est_source: file_root.join(&p.original_filename),
                    com_source: file_root.join(&p.comment_filename),
                    est_target: file_root.join("xml").join("est").join(est_name),
                    com_target: file_root.join("xml").join("com").join(com_name),
                }
            })
            .collect();

        let variants = self
            .variants
            .iter()
            .map(|v| {
                let name = format!("{}_{}_var_{}.xml", v.collection_id, v.publication_id, v.id);
                VariantItem {
                    version_id: v.id,
                    publication_id: v.publication_id,
                    source: file_root.join(&v.original_filename),
                    target: file_root.join("xml").join("var").join(name),
                }
            })
            .collect();

        let manuscripts = self
            .manuscripts
            .iter()
            .map(|m| {
                let name = format!("{}_{}_ms_{}.xml", m.collection_id, m.publication_id, m.id);
                ManuscriptItem {
                    manuscript_id: m.id,
                    source: file_root.join(&m.original_filename),
                    target: file_root.join("xml").join("ms").join(name),
                }
            })
            .collect();

        PublicationBatch {
            pairs,
            variants,
            manuscripts,
        }
    }
}

impl CommentSource for Manifest {
    fn comments_for(&self, publication_id: i64, note_ids: &[String]) -> Vec<CommentRecord> {
        self.comments
            .iter()
            .filter(|c| c.publication_id == publication_id)
            .filter(|c| note_ids.contains(&c.id.to_string()))
            .map(|c| CommentRecord {
                id: c.id,
                shortened_selection: c.shortened_selection.clone(),
                description: c.description.clone(),
            })
            .collect()
    }
}
