//! Model artifact loading and single-row inference.
//!
//! The artifact is read once at startup into a `Predictor`, which is then
//! handed to whatever serves predictions. Nothing mutates it after load.

use std::fmt;
use std::path::Path;

use log::{debug, info};
use polars::prelude::{DataFrame, DataType, TakeRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::LogisticRegression;
use thiserror::Error;

use crate::records::{PatientRecord, FEATURE_COUNT, FEATURE_NAMES};

pub type HeartClassifier = LogisticRegression<f64, i32, DenseMatrix<f64>, Vec<i32>>;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("cannot load model from {origin}: {reason}")]
    ModelLoad { origin: String, reason: String },
    #[error("feature schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("classifier failed: {0}")]
    Inference(String),
    #[error("classifier returned label {0}, expected 0 or 1")]
    UnexpectedLabel(i32),
}

/// What gets displayed for a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoDisease,
    Disease,
}

impl Outcome {
    pub fn from_label(label: i32) -> Result<Self, PredictError> {
        match label {
            0 => Ok(Outcome::NoDisease),
            1 => Ok(Outcome::Disease),
            other => Err(PredictError::UnexpectedLabel(other)),
        }
    }

    pub fn label(self) -> u8 {
        match self {
            Outcome::NoDisease => 0,
            Outcome::Disease => 1,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Outcome::NoDisease => "The patient is not likely to have heart disease.",
            Outcome::Disease => "The patient is likely to have heart disease.",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Serialized form of a trained model: the classifier plus the column order
/// it was fitted on.
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub classifier: HeartClassifier,
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("feature_names", &self.feature_names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl ModelArtifact {
    /// Wraps a classifier fitted on `PatientRecord::to_vec` rows.
    pub fn new(classifier: HeartClassifier) -> Self {
        Self {
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            classifier,
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let bytes = serde_json::to_vec(self)?;
        tokio::fs::write(path, bytes).await
    }
}

fn check_artifact(artifact: &ModelArtifact) -> Result<(), String> {
    if artifact.feature_names.len() != FEATURE_COUNT {
        return Err(format!(
            "expected {} features, artifact declares {}",
            FEATURE_COUNT,
            artifact.feature_names.len()
        ));
    }
    for (position, (declared, expected)) in
        artifact.feature_names.iter().zip(FEATURE_NAMES).enumerate()
    {
        if declared != expected {
            return Err(format!(
                "feature {} is {:?}, expected {:?}",
                position, declared, expected
            ));
        }
    }

    // smartcore's accessors unwrap these fields, so inspect the serialized
    // form before touching them
    let fitted = serde_json::to_value(&artifact.classifier)
        .map_err(|e| format!("unreadable classifier: {}", e))?;
    check_fitted_state(&fitted)?;

    let coefficients = artifact.classifier.coefficients().shape();
    if coefficients != (1, FEATURE_COUNT) {
        return Err(format!(
            "coefficients have shape {:?}, expected (1, {})",
            coefficients, FEATURE_COUNT
        ));
    }
    let intercept = artifact.classifier.intercept().shape();
    if intercept != (1, 1) {
        return Err(format!(
            "intercept has shape {:?}, expected (1, 1)",
            intercept
        ));
    }
    Ok(())
}

/// A binary classifier fitted on labels 0 and 1, with every fitted field set.
fn check_fitted_state(classifier: &Value) -> Result<(), String> {
    for field in ["coefficients", "intercept", "classes"] {
        match classifier.get(field) {
            None | Some(Value::Null) => {
                return Err(format!("classifier has no {}", field));
            }
            Some(fitted) => check_matrix_values(field, fitted)?,
        }
    }

    let classes: Option<Vec<i64>> = classifier["classes"]
        .as_array()
        .and_then(|classes| classes.iter().map(Value::as_i64).collect());
    if classes.as_deref() != Some(&[0, 1][..]) {
        return Err(format!(
            "classifier classes are {}, expected [0,1]",
            classifier["classes"]
        ));
    }

    if let Some(num_classes) = classifier.get("num_classes") {
        if num_classes.as_u64() != Some(2) {
            return Err(format!(
                "classifier has {} classes, expected 2",
                num_classes
            ));
        }
    }
    Ok(())
}

fn check_matrix_values(field: &str, matrix: &Value) -> Result<(), String> {
    let dims = (
        matrix.get("nrows").and_then(Value::as_u64),
        matrix.get("ncols").and_then(Value::as_u64),
        matrix.get("values").and_then(Value::as_array),
    );
    if let (Some(nrows), Some(ncols), Some(values)) = dims {
        if nrows.checked_mul(ncols) != Some(values.len() as u64) {
            return Err(format!(
                "{} declares {}x{} but holds {} values",
                field,
                nrows,
                ncols,
                values.len()
            ));
        }
    }
    Ok(())
}

/// Turns a one-row frame into classifier input, checking it against the
/// trained column order.
fn convert_features_to_matrix(
    frame: &DataFrame,
    feature_names: &[String],
) -> Result<DenseMatrix<f64>, PredictError> {
    let columns = frame.get_column_names();
    let same_order = columns.len() == feature_names.len()
        && columns
            .iter()
            .zip(feature_names)
            .all(|(column, name)| *column == name.as_str());
    if !same_order {
        return Err(PredictError::SchemaMismatch(format!(
            "expected columns {:?}, got {:?}",
            feature_names, columns
        )));
    }
    if frame.height() != 1 {
        return Err(PredictError::SchemaMismatch(format!(
            "expected a single row, got {}",
            frame.height()
        )));
    }

    let mut values = Vec::with_capacity(columns.len());
    for series in frame.get_columns() {
        let mismatch = |what: String| {
            PredictError::SchemaMismatch(format!("column {}: {}", series.name(), what))
        };
        if !series.dtype().is_numeric() {
            return Err(mismatch(format!("non-numeric type {}", series.dtype())));
        }
        let as_float = series
            .cast(&DataType::Float64)
            .map_err(|e| mismatch(e.to_string()))?;
        let value = as_float
            .f64()
            .map_err(|e| mismatch(e.to_string()))?
            .get(0)
            .ok_or_else(|| mismatch("missing value".to_string()))?;
        values.push(value);
    }

    Ok(DenseMatrix::new(1, values.len(), values, false))
}

/// Loaded model handle.
#[derive(Debug)]
pub struct Predictor {
    artifact: ModelArtifact,
}

impl Predictor {
    /// Reads and validates the artifact at `path`.
    ///
    /// A missing, unreadable or incompatible artifact is a `ModelLoad` error;
    /// callers must not fall back to any default model.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, PredictError> {
        let path = path.as_ref();
        let load_error = |reason: String| PredictError::ModelLoad {
            origin: path.display().to_string(),
            reason,
        };

        info!("Loading model artifact {}", path.display());
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| load_error(e.to_string()))?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| load_error(format!("corrupt artifact: {}", e)))?;
        check_artifact(&artifact).map_err(load_error)?;

        debug!("Model expects features {:?}", artifact.feature_names);
        Ok(Self { artifact })
    }

    /// Validates an artifact that is already in memory.
    #[cfg(test)]
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, PredictError> {
        check_artifact(&artifact).map_err(|reason| PredictError::ModelLoad {
            origin: "in-memory artifact".to_string(),
            reason,
        })?;
        Ok(Self { artifact })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.artifact.feature_names
    }

    pub fn predict(&self, record: &PatientRecord) -> Result<Outcome, PredictError> {
        let frame = record
            .to_dataframe()
            .map_err(|e| PredictError::SchemaMismatch(e.to_string()))?;
        self.predict_frame(&frame)
    }

    /// Predicts on a one-row frame whose columns must match the trained
    /// feature names exactly, in order.
    pub fn predict_frame(&self, frame: &DataFrame) -> Result<Outcome, PredictError> {
        let matrix = convert_features_to_matrix(frame, &self.artifact.feature_names)?;
        let labels = self
            .artifact
            .classifier
            .predict(&matrix)
            .map_err(|e| PredictError::Inference(e.to_string()))?;

        match labels.as_slice() {
            [label] => {
                let outcome = Outcome::from_label(*label)?;
                debug!("Classifier returned {}", label);
                Ok(outcome)
            }
            other => Err(PredictError::Inference(format!(
                "expected one label, got {}",
                other.len()
            ))),
        }
    }
}
