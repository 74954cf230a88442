use polars::prelude::{DataFrame, DataType, Field, NamedFrom, PolarsResult, Schema, Series};

/// Number of features the classifier was trained on.
pub const FEATURE_COUNT: usize = 13;

/// Training column order. The model consumes features positionally, so this
/// order must never change.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

/// Human readable domain of each feature, same order as `FEATURE_NAMES`.
pub const FEATURE_DOMAINS: [&str; FEATURE_COUNT] = [
    "age in years, 1-120",
    "1 = male, 0 = female",
    "chest pain type code, 0-3",
    "resting blood pressure (mm Hg), 60-200",
    "serum cholesterol (mg/dL), 0-600",
    "fasting blood sugar > 120 mg/dL, 1 = yes, 0 = no",
    "resting ECG code, 0-2",
    "maximum heart rate, 0-250",
    "exercise induced angina, 1 = yes, 0 = no",
    "ST depression, 0.0-10.0",
    "ST slope code, 0-2",
    "number of major vessels, 0-4",
    "thalassemia code, 0-2",
];

/// Encoded patient features, one row of model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatientRecord {
    pub age: u8,
    pub sex: u8,
    pub cp: u8,
    pub trestbps: u16,
    pub chol: u16,
    pub fbs: u8,
    pub restecg: u8,
    pub thalach: u16,
    pub exang: u8,
    pub oldpeak: f64,
    pub slope: u8,
    pub ca: u8,
    pub thal: u8,
}

impl PatientRecord {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("age", DataType::Int64),
            Field::new("sex", DataType::Int64),
            Field::new("cp", DataType::Int64),
            Field::new("trestbps", DataType::Int64),
            Field::new("chol", DataType::Int64),
            Field::new("fbs", DataType::Int64),
            Field::new("restecg", DataType::Int64),
            Field::new("thalach", DataType::Int64),
            Field::new("exang", DataType::Int64),
            Field::new("oldpeak", DataType::Float64),
            Field::new("slope", DataType::Int64),
            Field::new("ca", DataType::Int64),
            Field::new("thal", DataType::Int64),
        ])
    }

    /// Feature values in training order.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            f64::from(self.age),
            f64::from(self.sex),
            f64::from(self.cp),
            f64::from(self.trestbps),
            f64::from(self.chol),
            f64::from(self.fbs),
            f64::from(self.restecg),
            f64::from(self.thalach),
            f64::from(self.exang),
            self.oldpeak,
            f64::from(self.slope),
            f64::from(self.ca),
            f64::from(self.thal),
        ]
    }

    /// Single-row frame with named columns laid out as `schema()`.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let int = |name: &str, value: i64| Series::new(name, &[value]);

        DataFrame::new(vec![
            int("age", i64::from(self.age)),
            int("sex", i64::from(self.sex)),
            int("cp", i64::from(self.cp)),
            int("trestbps", i64::from(self.trestbps)),
            int("chol", i64::from(self.chol)),
            int("fbs", i64::from(self.fbs)),
            int("restecg", i64::from(self.restecg)),
            int("thalach", i64::from(self.thalach)),
            int("exang", i64::from(self.exang)),
            Series::new("oldpeak", &[self.oldpeak]),
            int("slope", i64::from(self.slope)),
            int("ca", i64::from(self.ca)),
            int("thal", i64::from(self.thal)),
        ])
    }
}
