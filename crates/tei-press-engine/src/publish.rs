//! Batch regeneration of web files from master files.
//!
//! Each publication owns a reading text and annotations master pair, plus
//! any number of variant and manuscript masters. Targets are regenerated
//! only when stale against their sources, and a failing item never stops
//! the rest of the batch. The caller receives the changed target paths for
//! downstream version-control sync.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::header;
use crate::notes::{self, CommentRecord};
use crate::variants;
use crate::xml::{LoadError, LoadOptions, XmlDocument};

/// Where comment records come from. The annotations store itself is a
/// collaborator; tests inject records directly.
pub trait CommentSource {
    /// Comment rows for one publication, restricted to the note ids present
    /// in its reading text.
    fn comments_for(&self, publication_id: i64, note_ids: &[String]) -> Vec<CommentRecord>;
}

/// A comment source with no records. Annotations documents still get their
/// notes container, just no notes.
pub struct NoComments;

impl CommentSource for NoComments {
    fn comments_for(&self, _publication_id: i64, _note_ids: &[String]) -> Vec<CommentRecord> {
        Vec::new()
    }
}

/// Reading text and annotations master pair for one publication.
#[derive(Debug, Clone)]
pub struct EstComPair {
    pub publication_id: i64,
    pub est_source: PathBuf,
    pub com_source: PathBuf,
    pub est_target: PathBuf,
    pub com_target: PathBuf,
}

/// One publication version master.
#[derive(Debug, Clone)]
pub struct VariantItem {
    pub version_id: i64,
    pub publication_id: i64,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// One publication manuscript master.
#[derive(Debug, Clone)]
pub struct ManuscriptItem {
    pub manuscript_id: i64,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Everything one regeneration pass covers, with source and target paths
/// already resolved by the caller.
#[derive(Debug, Clone, Default)]
pub struct PublicationBatch {
    pub pairs: Vec<EstComPair>,
    pub variants: Vec<VariantItem>,
    pub manuscripts: Vec<ManuscriptItem>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Outcome of one batch run. `changed` is handed to the version-control
/// collaborator; `failed` pairs each failing target with its error.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub changed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, PublishError)>,
}

/// True when any target is missing or unreadable, or strictly older than
/// any source.
pub fn is_stale(sources: &[&Path], targets: &[&Path]) -> bool {
    let newest_source = match sources.iter().map(|p| mtime(p)).collect::<Option<Vec<_>>>() {
        Some(times) => match times.into_iter().max() {
            Some(newest) => newest,
            None => return false,
        },
        // An unreadable source still triggers regeneration; the load step
        // reports the real error.
        None => return true,
    };
    for target in targets {
        match mtime(target) {
            Some(target_mtime) if target_mtime >= newest_source => {}
            _ => return true,
        }
    }
    false
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Runs regeneration batches against one project's pipeline configuration.
pub struct Publisher<'a, S: CommentSource> {
    config: &'a PipelineConfig,
    comments: &'a S,
}

impl<'a, S: CommentSource> Publisher<'a, S> {
    pub fn new(config: &'a PipelineConfig, comments: &'a S) -> Self {
        Self { config, comments }
    }

    pub fn run(&self, batch: &PublicationBatch) -> PublishReport {
        let mut report = PublishReport::default();

        for pair in &batch.pairs {
            if !is_stale(
                &[&pair.est_source, &pair.com_source],
                &[&pair.est_target, &pair.com_target],
            ) {
                continue;
            }
            info!(publication_id = pair.publication_id, "regenerating est/com pair");
            match self.generate_pair(pair) {
                Ok(()) => {
                    report.changed.push(pair.est_target.clone());
                    report.changed.push(pair.com_target.clone());
                }
                Err(e) => {
                    warn!(publication_id = pair.publication_id, error = %e, "est/com regeneration failed");
                    report.failed.push((pair.est_target.clone(), e));
                }
            }
        }

        self.run_variants(batch, &mut report);

        for item in &batch.manuscripts {
            if !is_stale(&[&item.source], &[&item.target]) {
                continue;
            }
            info!(manuscript_id = item.manuscript_id, "regenerating manuscript");
            match self.generate_single(&item.source, &item.target, LoadOptions::default()) {
                Ok(()) => report.changed.push(item.target.clone()),
                Err(e) => {
                    warn!(manuscript_id = item.manuscript_id, error = %e, "manuscript regeneration failed");
                    report.failed.push((item.target.clone(), e));
                }
            }
        }

        report
    }

    fn generate_pair(&self, pair: &EstComPair) -> Result<(), PublishError> {
        let mut est = XmlDocument::load(
            &pair.est_source,
            &self.config.namespace_uri,
            LoadOptions {
                remove_del_spans: true,
            },
        )?;
        header::post_process(&mut est);
        write_target(&est, &pair.est_target)?;

        let mut com = XmlDocument::load(
            &pair.com_source,
            &self.config.namespace_uri,
            LoadOptions::default(),
        )?;
        header::post_process(&mut com);

        let note_ids = header::note_ids(&est);
        let records = self.comments.comments_for(pair.publication_id, &note_ids);
        notes::merge_comments(&mut com, &est, &records, self.config);

        write_target(&com, &pair.com_target)
    }

    /// Variants are regenerated per publication group: classifying one
    /// variant's apparatus needs every sibling's master loaded, stale or
    /// not.
    fn run_variants(&self, batch: &PublicationBatch, report: &mut PublishReport) {
        let mut publication_ids: Vec<i64> =
            batch.variants.iter().map(|v| v.publication_id).collect();
        publication_ids.sort_unstable();
        publication_ids.dedup();

        for publication_id in publication_ids {
            let group: Vec<&VariantItem> = batch
                .variants
                .iter()
                .filter(|v| v.publication_id == publication_id)
                .collect();
            let any_stale = group
                .iter()
                .any(|item| is_stale(&[&item.source], &[&item.target]));
            if !any_stale {
                continue;
            }

            let mut docs: Vec<Option<XmlDocument>> = Vec::with_capacity(group.len());
            for item in &group {
                match XmlDocument::load(
                    &item.source,
                    &self.config.namespace_uri,
                    LoadOptions::default(),
                ) {
                    Ok(mut doc) => {
                        header::post_process(&mut doc);
                        docs.push(Some(doc));
                    }
                    Err(e) => {
                        warn!(version_id = item.version_id, error = %e, "variant master could not be loaded");
                        report.failed.push((item.target.clone(), e.into()));
                        docs.push(None);
                    }
                }
            }

            for (i, item) in group.iter().enumerate() {
                if !is_stale(&[&item.source], &[&item.target]) {
                    continue;
                }
                let Some(mut doc) = docs[i].clone() else {
                    continue;
                };
                info!(version_id = item.version_id, "regenerating variant");
                let siblings: Vec<XmlDocument> = docs
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .filter_map(|(_, d)| d.clone())
                    .collect();
                variants::classify_variants(&mut doc, &siblings);
                match write_target(&doc, &item.target) {
                    Ok(()) => report.changed.push(item.target.clone()),
                    Err(e) => {
                        warn!(version_id = item.version_id, error = %e, "variant regeneration failed");
                        report.failed.push((item.target.clone(), e));
                    }
                }
            }
        }
    }

    fn generate_single(
        &self,
        source: &Path,
        target: &Path,
        options: LoadOptions,
    ) -> Result<(), PublishError> {
        let mut doc = XmlDocument::load(source, &self.config.namespace_uri, options)?;
        header::post_process(&mut doc);
        write_target(&doc, target)
    }
}

fn write_target(doc: &XmlDocument, target: &Path) -> Result<(), PublishError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| PublishError::Write {
            path: target.to_path_buf(),
            source,
        })?;
    }
    doc.save(target).map_err(|source| PublishError::Write {
        path: target.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct FixedComments(Vec<CommentRecord>);

    impl CommentSource for FixedComments {
        fn comments_for(&self, _publication_id: i64, note_ids: &[String]) -> Vec<CommentRecord> {
            self.0
                .iter()
                .filter(|c| note_ids.contains(&c.id.to_string()))
                .cloned()
                .collect()
        }
    }

    const EST: &str = r#"<TEI xmlns="urn:old"><teiHeader><profileDesc/></teiHeader><text><body><p>text<anchor xml:id="start1"/>word<anchor xml:id="end1"/></p></body></text></TEI>"#;
    const COM: &str = r#"<TEI xmlns="urn:old"><teiHeader><profileDesc/></teiHeader><text><body><p/></body></text></TEI>"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn pair(dir: &TempDir) -> EstComPair {
        EstComPair {
            publication_id: 1,
            est_source: write(dir, "est_master.xml", EST),
            com_source: write(dir, "com_master.xml", COM),
            est_target: dir.path().join("out/1_est.xml"),
            com_target: dir.path().join("out/1_com.xml"),
        }
    }

    #[test]
    fn missing_target_is_stale() {
        let dir = TempDir::new().unwrap();
        let source = write(&dir, "a.xml", "<x/>");
        assert!(is_stale(&[&source], &[&dir.path().join("missing.xml")]));
    }

    #[test]
    fn target_written_after_source_is_fresh() {
        let dir = TempDir::new().unwrap();
        let source = write(&dir, "a.xml", "<x/>");
        let target = write(&dir, "b.xml", "<x/>");
        assert!(!is_stale(&[&source], &[&target]));
    }

    #[test]
    fn fresh_pair_is_not_regenerated() {
        let dir = TempDir::new().unwrap();
        let mut p = pair(&dir);
        p.est_target = write(&dir, "1_est.xml", "old");
        p.com_target = write(&dir, "1_com.xml", "old");

        let config = PipelineConfig::default();
        let report = Publisher::new(&config, &NoComments).run(&PublicationBatch {
            pairs: vec![p.clone()],
            ..Default::default()
        });

        assert!(report.changed.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(fs::read_to_string(&p.est_target).unwrap(), "old");
    }

    #[test]
    fn stale_pair_regenerates_est_and_merged_com() {
        let dir = TempDir::new().unwrap();
        let p = pair(&dir);
        let comments = FixedComments(vec![CommentRecord {
            id: 1,
            shortened_selection: "word".to_string(),
            description: "<p>a note</p>".to_string(),
        }]);

        let config = PipelineConfig::default();
        let report = Publisher::new(&config, &comments).run(&PublicationBatch {
            pairs: vec![p.clone()],
            ..Default::default()
        });

        assert_eq!(report.changed, vec![p.est_target.clone(), p.com_target.clone()]);
        assert!(report.failed.is_empty());

        let est = fs::read_to_string(&p.est_target).unwrap();
        assert!(est.contains(&format!("xmlns=\"{}\"", config.namespace_uri)));
        assert!(est.contains(r#"xml:id="p1""#));

        let com = fs::read_to_string(&p.com_target).unwrap();
        assert!(com.contains(r#"<div type="notes">"#));
        assert!(com.contains(r##"<note type="editor" id="en1" target="#start1">"##));
        assert!(com.contains("a note"));
    }

    #[test]
    fn one_failing_item_does_not_abort_the_batch() {
        let dir = TempDir::new().unwrap();
        let broken = EstComPair {
            publication_id: 2,
            est_source: write(&dir, "broken.xml", "<TEI><body></TEI>"),
            com_source: write(&dir, "com2.xml", COM),
            est_target: dir.path().join("out/2_est.xml"),
            com_target: dir.path().join("out/2_com.xml"),
        };
        let good = pair(&dir);

        let config = PipelineConfig::default();
        let report = Publisher::new(&config, &NoComments).run(&PublicationBatch {
            pairs: vec![broken, good.clone()],
            ..Default::default()
        });

        assert_eq!(report.failed.len(), 1);
        assert!(report.changed.contains(&good.est_target));
        assert!(good.est_target.exists());
    }

    #[test]
    fn stale_variant_is_classified_against_its_siblings() {
        let dir = TempDir::new().unwrap();
        let base = write(
            &dir,
            "v1.xml",
            r#"<TEI xmlns="urn:old"><text><body><app id="x"/></body></text></TEI>"#,
        );
        let sibling = write(
            &dir,
            "v2.xml",
            r#"<TEI xmlns="urn:old"><text><body><app id="x" type="substantial"/></body></text></TEI>"#,
        );
        // The sibling's target is fresh, so only the base is rewritten.
        let sibling_target = write(&dir, "v2_out.xml", "old");

        let batch = PublicationBatch {
            variants: vec![
                VariantItem {
                    version_id: 1,
                    publication_id: 7,
                    source: base,
                    target: dir.path().join("out/v1_out.xml"),
                },
                VariantItem {
                    version_id: 2,
                    publication_id: 7,
                    source: sibling,
                    target: sibling_target.clone(),
                },
            ],
            ..Default::default()
        };

        let config = PipelineConfig::default();
        let report = Publisher::new(&config, &NoComments).run(&batch);

        assert_eq!(report.changed, vec![dir.path().join("out/v1_out.xml")]);
        let out = fs::read_to_string(&report.changed[0]).unwrap();
        assert!(out.contains(r#"<app id="x" type="sub"/>"#));
        assert_eq!(fs::read_to_string(&sibling_target).unwrap(), "old");
    }

    #[test]
    fn manuscript_regenerated_when_target_missing() {
        let dir = TempDir::new().unwrap();
        let batch = PublicationBatch {
            manuscripts: vec![ManuscriptItem {
                manuscript_id: 3,
                source: write(&dir, "ms.xml", EST),
                target: dir.path().join("out/ms_out.xml"),
            }],
            ..Default::default()
        };

        let config = PipelineConfig::default();
        let report = Publisher::new(&config, &NoComments).run(&batch);

        assert_eq!(report.changed.len(), 1);
        let out = fs::read_to_string(&report.changed[0]).unwrap();
        assert!(out.contains(r#"xml:space="preserve""#));
    }
}
