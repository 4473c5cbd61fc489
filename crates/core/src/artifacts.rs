//! On-disk persistence for a trained model.
//!
//! A model is stored as two JSON files: the classifier artifact and the feature-name
//! artifact. Both carry the schema stamp and the model id of the training run that wrote
//! them; a pair that disagrees with itself or with the runtime schema is refused.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

use crate::features::{FeatureSchema, SchemaStamp};
use crate::ml::{GradientBoostedClassifier, ModelMetadata, TrainedModel};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("model artifact not found at {path}")]
    Missing { path: String },
    #[error("failed to read model artifact {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to write model artifact {path}: {message}")]
    Write { path: String, message: String },
    #[error("model artifact {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
    #[error("feature schema skew: {detail}")]
    FeatureSkew { detail: String },
}

#[derive(Serialize, Deserialize)]
struct ClassifierArtifact {
    stamp: SchemaStamp,
    schema: FeatureSchema,
    metadata: ModelMetadata,
    classifier: GradientBoostedClassifier,
}

#[derive(Serialize, Deserialize)]
struct FeatureNamesArtifact {
    stamp: SchemaStamp,
    model_id: Uuid,
    feature_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactStore {
    classifier_path: PathBuf,
    feature_names_path: PathBuf,
}

impl ArtifactStore {
    pub fn new(classifier_path: impl Into<PathBuf>, feature_names_path: impl Into<PathBuf>) -> Self {
        Self { classifier_path: classifier_path.into(), feature_names_path: feature_names_path.into() }
    }

    pub fn classifier_path(&self) -> &Path {
        &self.classifier_path
    }

    pub fn feature_names_path(&self) -> &Path {
        &self.feature_names_path
    }

    pub fn exists(&self) -> bool {
        self.classifier_path.is_file() && self.feature_names_path.is_file()
    }

    /// Writes both artifacts to uniquely named temporary siblings first and renames them
    /// into place, so readers never observe a partially written file and concurrent
    /// savers never share a staging file.
    pub fn save(&self, model: &TrainedModel) -> Result<(), ArtifactError> {
        let stamp = model.schema.stamp();
        let classifier = ClassifierArtifact {
            stamp: stamp.clone(),
            schema: model.schema.clone(),
            metadata: model.metadata.clone(),
            classifier: model.classifier.clone(),
        };
        let names = FeatureNamesArtifact {
            stamp,
            model_id: model.metadata.model_id,
            feature_names: model.schema.names.clone(),
        };

        let classifier_tmp = stage(&self.classifier_path, &classifier)?;
        let names_tmp = stage(&self.feature_names_path, &names)?;

        commit(classifier_tmp, &self.classifier_path)?;
        commit(names_tmp, &self.feature_names_path)
    }

    /// Loads the pair and checks it against the runtime feature schema.
    pub fn load(&self) -> Result<TrainedModel, ArtifactError> {
        let classifier: ClassifierArtifact = read_json(&self.classifier_path)?;
        let names: FeatureNamesArtifact = read_json(&self.feature_names_path)?;

        let runtime = FeatureSchema::current();
        let runtime_stamp = runtime.stamp();

        if classifier.stamp != runtime_stamp || classifier.schema != runtime {
            return Err(skew(format!(
                "classifier was trained on schema v{} ({}), runtime expects v{} ({})",
                classifier.stamp.version,
                short(&classifier.stamp.fingerprint),
                runtime_stamp.version,
                short(&runtime_stamp.fingerprint)
            )));
        }
        if names.stamp != runtime_stamp || names.feature_names != runtime.names {
            return Err(skew(format!(
                "feature names artifact lists [{}], runtime expects [{}]",
                names.feature_names.join(", "),
                runtime.names.join(", ")
            )));
        }
        if names.model_id != classifier.metadata.model_id {
            return Err(ArtifactError::Corrupt {
                path: display(&self.feature_names_path),
                message: format!(
                    "belongs to model {} but classifier is model {}",
                    names.model_id, classifier.metadata.model_id
                ),
            });
        }
        if classifier.classifier.num_features() != runtime.len() {
            return Err(skew(format!(
                "classifier expects {} features, runtime produces {}",
                classifier.classifier.num_features(),
                runtime.len()
            )));
        }

        Ok(TrainedModel {
            classifier: classifier.classifier,
            schema: classifier.schema,
            metadata: classifier.metadata,
        })
    }
}

fn stage<T: Serialize>(target: &Path, value: &T) -> Result<NamedTempFile, ArtifactError> {
    let write_error = |message: String| ArtifactError::Write { path: display(target), message };

    let parent = match target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|error| write_error(error.to_string()))?;
            parent
        }
        None => Path::new("."),
    };
    let bytes = serde_json::to_vec_pretty(value).map_err(|error| write_error(error.to_string()))?;

    // Dropped without `persist` on any error path, which removes the staged file.
    let mut staged = tempfile::Builder::new()
        .prefix(".menuwise-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|error| write_error(error.to_string()))?;
    staged.write_all(&bytes).map_err(|error| write_error(error.to_string()))?;
    staged.as_file().sync_all().map_err(|error| write_error(error.to_string()))?;
    Ok(staged)
}

fn commit(staged: NamedTempFile, target: &Path) -> Result<(), ArtifactError> {
    staged.persist(target).map(drop).map_err(|error| ArtifactError::Write {
        path: display(target),
        message: error.error.to_string(),
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArtifactError> {
    let raw = fs::read_to_string(path).map_err(|error| match error.kind() {
        ErrorKind::NotFound => ArtifactError::Missing { path: display(path) },
        _ => ArtifactError::Read { path: display(path), message: error.to_string() },
    })?;
    serde_json::from_str(&raw)
        .map_err(|error| ArtifactError::Corrupt { path: display(path), message: error.to_string() })
}

fn skew(detail: String) -> ArtifactError {
    ArtifactError::FeatureSkew { detail }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::{ArtifactError, ArtifactStore};
    use crate::features::{FeatureSchema, FEATURE_COUNT};
    use crate::ml::{BoostingParams, GradientBoostedClassifier, ModelMetadata, TrainedModel};

    fn tiny_model() -> TrainedModel {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|step| {
                let mut row = vec![0.0; FEATURE_COUNT];
                row[7] = step as f64 / 40.0;
                row
            })
            .collect();
        let labels: Vec<usize> = (0..40).map(|step| step / 10).collect();
        let params = BoostingParams {
            n_estimators: 5,
            max_depth: 2,
            subsample: 1.0,
            colsample_bytree: 1.0,
            ..BoostingParams::default()
        };

        TrainedModel {
            classifier: GradientBoostedClassifier::fit(&rows, &labels, 4, params).expect("fit"),
            schema: FeatureSchema::current(),
            metadata: ModelMetadata {
                model_id: Uuid::new_v4(),
                trained_at: Utc::now(),
                training_samples: 40,
                test_accuracy: 0.9,
            },
        }
    }

    fn store_in(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::new(dir.path().join("classifier.json"), dir.path().join("feature_names.json"))
    }

    #[test]
    fn saved_model_loads_back_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let model = tiny_model();

        store.save(&model).expect("save");
        assert!(store.exists());
        assert_eq!(store.load().expect("load"), model);
        assert_eq!(entries_in(&dir), vec!["classifier.json", "feature_names.json"]);
    }

    fn entries_in(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn concurrent_savers_do_not_collide_on_staging_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let models: Vec<TrainedModel> = (0..4).map(|_| tiny_model()).collect();

        std::thread::scope(|scope| {
            for model in &models {
                let store = store.clone();
                scope.spawn(move || {
                    for _ in 0..5 {
                        store.save(model).expect("every concurrent save succeeds");
                    }
                });
            }
        });

        assert_eq!(entries_in(&dir), vec!["classifier.json", "feature_names.json"]);
        store.save(&models[0]).expect("final save");
        assert_eq!(store.load().expect("load"), models[0]);
    }

    #[test]
    fn missing_artifacts_are_reported_as_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(store_in(&dir).load(), Err(ArtifactError::Missing { .. })));
    }

    #[test]
    fn garbage_json_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        store.save(&tiny_model()).expect("save");
        fs::write(store.classifier_path(), "{not json").expect("overwrite");

        assert!(matches!(store.load(), Err(ArtifactError::Corrupt { .. })));
    }

    #[test]
    fn reordered_feature_names_are_skew() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        store.save(&tiny_model()).expect("save");

        let raw = fs::read_to_string(store.feature_names_path()).expect("read");
        let mut names: serde_json::Value = serde_json::from_str(&raw).expect("json");
        let list = names["feature_names"].as_array_mut().expect("array");
        list.swap(0, 1);
        fs::write(store.feature_names_path(), names.to_string()).expect("write");

        assert!(matches!(store.load(), Err(ArtifactError::FeatureSkew { .. })));
    }

    #[test]
    fn drifted_scaling_constants_are_skew() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let mut model = tiny_model();
        model.schema.price_scale = 1000.0;
        store.save(&model).expect("save");

        assert!(matches!(store.load(), Err(ArtifactError::FeatureSkew { .. })));
    }

    #[test]
    fn mixed_training_runs_are_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        store.save(&tiny_model()).expect("save");
        let first_names = fs::read_to_string(store.feature_names_path()).expect("read");
        store.save(&tiny_model()).expect("save");
        fs::write(store.feature_names_path(), first_names).expect("restore stale names");

        assert!(matches!(store.load(), Err(ArtifactError::Corrupt { .. })));
    }
}
