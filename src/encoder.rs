//! Form values to `PatientRecord`.
//!
//! Categorical fields arrive as `"<code>: <description>"` labels. The code is
//! parsed out and looked up in the field's table, so display text can change
//! without touching the trained encoding.

use std::fmt;

use log::trace;
use thiserror::Error;

use crate::records::PatientRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeBound {
    Min(f64),
    Max(f64),
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Min(min) => write!(f, "below the minimum of {}", min),
            RangeBound::Max(max) => write!(f, "above the maximum of {}", max),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("{field}: malformed label {label:?}, expected \"<code>: <description>\"")]
    MalformedLabel { field: &'static str, label: String },
    #[error("{field}: unrecognized value {value:?}, expected one of {expected}")]
    UnrecognizedValue {
        field: &'static str,
        value: String,
        expected: String,
    },
    #[error("{field}: value {value} is {bound}")]
    RangeValidation {
        field: &'static str,
        bound: RangeBound,
        value: f64,
    },
}

/// Field values as captured by the form, before any validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPatientInput {
    pub age: i64,
    pub sex: String,
    pub cp: String,
    pub trestbps: i64,
    pub chol: i64,
    pub fbs: String,
    pub restecg: String,
    pub thalach: i64,
    pub exang: String,
    pub oldpeak: f64,
    pub slope: String,
    pub ca: i64,
    pub thal: String,
}

impl Default for RawPatientInput {
    // Initial widget values of the form.
    fn default() -> Self {
        Self {
            age: 25,
            sex: "Male".to_string(),
            cp: ChestPainType::TypicalAngina.label().to_string(),
            trestbps: 120,
            chol: 200,
            fbs: "Yes".to_string(),
            restecg: RestingEcg::Normal.label().to_string(),
            thalach: 150,
            exang: "Yes".to_string(),
            oldpeak: 1.0,
            slope: StSlope::Upsloping.label().to_string(),
            ca: 0,
            thal: Thalassemia::Normal.label().to_string(),
        }
    }
}

/// Extracts the integer code in front of the first colon of a label.
pub fn parse_label_code(field: &'static str, label: &str) -> Result<i64, EncodeError> {
    let malformed = || EncodeError::MalformedLabel {
        field,
        label: label.to_string(),
    };

    let (code, _description) = label.split_once(':').ok_or_else(malformed)?;
    code.trim().parse::<i64>().map_err(|_| malformed())
}

/// A closed set of labeled choices with a trained numeric code per choice.
pub trait Categorical: Copy + PartialEq + Sized + 'static {
    const FIELD: &'static str;
    const VARIANTS: &'static [Self];

    fn code(self) -> u8;

    fn label(self) -> &'static str;

    fn from_code(code: i64) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .copied()
            .find(|variant| i64::from(variant.code()) == code)
    }

    fn from_label(label: &str) -> Result<Self, EncodeError> {
        let code = parse_label_code(Self::FIELD, label)?;
        Self::from_code(code).ok_or_else(|| EncodeError::UnrecognizedValue {
            field: Self::FIELD,
            value: label.to_string(),
            expected: Self::labels().join(", "),
        })
    }

    fn labels() -> Vec<&'static str> {
        Self::VARIANTS.iter().map(|variant| variant.label()).collect()
    }
}

macro_rules! categorical {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident = $code:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl Categorical for $name {
            const FIELD: &'static str = $field;
            const VARIANTS: &'static [Self] = &[$($name::$variant),+];

            fn code(self) -> u8 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }
    };
}

categorical! {
    /// Chest pain type.
    ChestPainType, "cp" {
        TypicalAngina = 0 => "0: Typical Angina",
        AtypicalAngina = 1 => "1: Atypical Angina",
        NonAnginal = 2 => "2: Non-Anginal",
        Asymptomatic = 3 => "3: Asymptomatic",
    }
}

categorical! {
    /// Resting electrocardiographic result.
    RestingEcg, "restecg" {
        Normal = 0 => "0: Normal",
        StTAbnormality = 1 => "1: ST-T Abnormality",
        ProbableLvh = 2 => "2: Probable LVH",
    }
}

categorical! {
    /// Slope of the peak exercise ST segment.
    StSlope, "slope" {
        Upsloping = 0 => "0: Upsloping",
        Flat = 1 => "1: Flat",
        Downsloping = 2 => "2: Downsloping",
    }
}

categorical! {
    Thalassemia, "thal" {
        Normal = 0 => "0: Normal",
        FixedDefect = 1 => "1: Fixed Defect",
        ReversibleDefect = 2 => "2: Reversible Defect",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn parse(value: &str) -> Result<Self, EncodeError> {
        match value {
            "Male" => Ok(Sex::Male),
            "Female" => Ok(Sex::Female),
            other => Err(EncodeError::UnrecognizedValue {
                field: "sex",
                value: other.to_string(),
                expected: "Male, Female".to_string(),
            }),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Sex::Male => 1,
            Sex::Female => 0,
        }
    }
}

/// Yes/No radio selection (fbs, exang).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn parse(field: &'static str, value: &str) -> Result<Self, EncodeError> {
        match value {
            "Yes" => Ok(YesNo::Yes),
            "No" => Ok(YesNo::No),
            other => Err(EncodeError::UnrecognizedValue {
                field,
                value: other.to_string(),
                expected: "Yes, No".to_string(),
            }),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            YesNo::Yes => 1,
            YesNo::No => 0,
        }
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64, EncodeError> {
    // NaN fails both comparisons, report it against the lower bound
    if !(value >= min) {
        return Err(EncodeError::RangeValidation {
            field,
            bound: RangeBound::Min(min),
            value,
        });
    }
    if !(value <= max) {
        return Err(EncodeError::RangeValidation {
            field,
            bound: RangeBound::Max(max),
            value,
        });
    }
    Ok(value)
}

fn check_int(field: &'static str, value: i64, min: u16, max: u16) -> Result<u16, EncodeError> {
    let out_of_range = |bound| EncodeError::RangeValidation {
        field,
        bound,
        value: value as f64,
    };

    if value < i64::from(min) {
        return Err(out_of_range(RangeBound::Min(f64::from(min))));
    }
    if value > i64::from(max) {
        return Err(out_of_range(RangeBound::Max(f64::from(max))));
    }
    // within [min, max], which fits u16
    Ok(value as u16)
}

/// Validates every field and produces the record in training order.
///
/// Pure: no side effects besides trace logging, and the first failing
/// field aborts encoding.
pub fn encode(input: &RawPatientInput) -> Result<PatientRecord, EncodeError> {
    let record = PatientRecord {
        age: check_int("age", input.age, 1, 120)? as u8,
        sex: Sex::parse(&input.sex)?.code(),
        cp: ChestPainType::from_label(&input.cp)?.code(),
        trestbps: check_int("trestbps", input.trestbps, 60, 200)?,
        chol: check_int("chol", input.chol, 0, 600)?,
        fbs: YesNo::parse("fbs", &input.fbs)?.code(),
        restecg: RestingEcg::from_label(&input.restecg)?.code(),
        thalach: check_int("thalach", input.thalach, 0, 250)?,
        exang: YesNo::parse("exang", &input.exang)?.code(),
        oldpeak: check_range("oldpeak", input.oldpeak, 0.0, 10.0)?,
        slope: StSlope::from_label(&input.slope)?.code(),
        ca: check_int("ca", input.ca, 0, 4)? as u8,
        thal: Thalassemia::from_label(&input.thal)?.code(),
    };
    trace!("Encoded {:?} into {:?}", input, record);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixed_example() -> RawPatientInput {
        RawPatientInput {
            age: 25,
            sex: "Male".to_string(),
            cp: "0: Typical Angina".to_string(),
            trestbps: 120,
            chol: 200,
            fbs: "No".to_string(),
            restecg: "0: Normal".to_string(),
            thalach: 150,
            exang: "No".to_string(),
            oldpeak: 1.0,
            slope: "0: Upsloping".to_string(),
            ca: 0,
            thal: "0: Normal".to_string(),
        }
    }

    fn assert_range_error(result: Result<PatientRecord, EncodeError>, field: &str, bound: RangeBound) {
        match result {
            Err(EncodeError::RangeValidation {
                field: got_field,
                bound: got_bound,
                ..
            }) => {
                assert_eq!(got_field, field);
                assert_eq!(got_bound, bound);
            }
            other => panic!("expected range error on {field}, got {other:?}"),
        }
    }

    #[test]
    fn fixed_example_encodes_in_training_order() {
        let record = encode(&fixed_example()).expect("valid input");
        assert_eq!(
            record.to_vec(),
            vec![25.0, 1.0, 0.0, 120.0, 200.0, 0.0, 0.0, 150.0, 0.0, 1.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn every_label_encodes_to_its_leading_integer() {
        fn check<T: Categorical>() {
            for label in T::labels() {
                let expected: u8 = label.split(':').next().unwrap().parse().unwrap();
                assert_eq!(T::from_label(label).unwrap().code(), expected, "{label}");
            }
        }
        check::<ChestPainType>();
        check::<RestingEcg>();
        check::<StSlope>();
        check::<Thalassemia>();

        let mut input = fixed_example();
        input.cp = "3: Asymptomatic".to_string();
        input.restecg = "2: Probable LVH".to_string();
        input.slope = "1: Flat".to_string();
        input.thal = "2: Reversible Defect".to_string();
        let record = encode(&input).unwrap();
        assert_eq!((record.cp, record.restecg, record.slope, record.thal), (3, 2, 1, 2));
    }

    #[test]
    fn description_text_does_not_affect_the_code() {
        assert_eq!(ChestPainType::from_label("2: renamed").unwrap(), ChestPainType::NonAnginal);
        assert_eq!(Thalassemia::from_label(" 1 :Fixed").unwrap(), Thalassemia::FixedDefect);
    }

    #[test]
    fn label_without_leading_code_is_malformed() {
        for label in ["Typical Angina", "", ": Typical Angina", "x: Typical Angina", "0"] {
            assert_eq!(
                ChestPainType::from_label(label),
                Err(EncodeError::MalformedLabel {
                    field: "cp",
                    label: label.to_string()
                })
            );
        }

        let mut input = fixed_example();
        input.slope = "Flat".to_string();
        assert!(matches!(
            encode(&input),
            Err(EncodeError::MalformedLabel { field: "slope", .. })
        ));
    }

    #[test]
    fn unknown_code_is_unrecognized() {
        let err = RestingEcg::from_label("7: Unknown").unwrap_err();
        assert_eq!(
            err,
            EncodeError::UnrecognizedValue {
                field: "restecg",
                value: "7: Unknown".to_string(),
                expected: "0: Normal, 1: ST-T Abnormality, 2: Probable LVH".to_string(),
            }
        );
    }

    #[test]
    fn binary_fields_map_onto_one_and_zero() {
        assert_eq!(Sex::parse("Male").unwrap().code(), 1);
        assert_eq!(Sex::parse("Female").unwrap().code(), 0);
        assert_eq!(YesNo::parse("fbs", "Yes").unwrap().code(), 1);
        assert_eq!(YesNo::parse("fbs", "No").unwrap().code(), 0);

        let mut input = fixed_example();
        input.sex = "Female".to_string();
        input.fbs = "Yes".to_string();
        input.exang = "Yes".to_string();
        let record = encode(&input).unwrap();
        assert_eq!((record.sex, record.fbs, record.exang), (0, 1, 1));
    }

    #[test]
    fn binary_fields_reject_anything_else() {
        for value in ["male", "M", "", "Other"] {
            assert!(matches!(
                Sex::parse(value),
                Err(EncodeError::UnrecognizedValue { field: "sex", .. })
            ));
        }

        let mut input = fixed_example();
        input.exang = "yes".to_string();
        assert!(matches!(
            encode(&input),
            Err(EncodeError::UnrecognizedValue { field: "exang", .. })
        ));
    }

    #[test]
    fn numeric_bounds_are_inclusive() {
        let bounds: [(&str, fn(&mut RawPatientInput, i64), i64, i64); 5] = [
            ("age", |i, v| i.age = v, 1, 120),
            ("trestbps", |i, v| i.trestbps = v, 60, 200),
            ("chol", |i, v| i.chol = v, 0, 600),
            ("thalach", |i, v| i.thalach = v, 0, 250),
            ("ca", |i, v| i.ca = v, 0, 4),
        ];

        for (field, set, min, max) in bounds {
            for accepted in [min, max] {
                let mut input = fixed_example();
                set(&mut input, accepted);
                let record = encode(&input).unwrap();
                let position = crate::records::FEATURE_NAMES
                    .iter()
                    .position(|name| *name == field)
                    .unwrap();
                assert_eq!(record.to_vec()[position], accepted as f64, "{field}");
            }

            let mut input = fixed_example();
            set(&mut input, min - 1);
            assert_range_error(encode(&input), field, RangeBound::Min(min as f64));

            let mut input = fixed_example();
            set(&mut input, max + 1);
            assert_range_error(encode(&input), field, RangeBound::Max(max as f64));
        }
    }

    #[test]
    fn oldpeak_bounds() {
        for accepted in [0.0, 10.0] {
            let mut input = fixed_example();
            input.oldpeak = accepted;
            assert_eq!(encode(&input).unwrap().oldpeak, accepted);
        }

        let mut input = fixed_example();
        input.oldpeak = -1.0;
        assert_range_error(encode(&input), "oldpeak", RangeBound::Min(0.0));

        input.oldpeak = 11.0;
        assert_range_error(encode(&input), "oldpeak", RangeBound::Max(10.0));

        input.oldpeak = f64::NAN;
        assert!(matches!(
            encode(&input),
            Err(EncodeError::RangeValidation { field: "oldpeak", .. })
        ));
    }

    #[test]
    fn range_error_names_field_bound_and_value() {
        let mut input = fixed_example();
        input.age = 121;
        let err = encode(&input).unwrap_err();
        assert_eq!(err.to_string(), "age: value 121 is above the maximum of 120");
    }

    #[test]
    fn defaults_match_the_form() {
        let record = encode(&RawPatientInput::default()).unwrap();
        assert_eq!(
            record.to_vec(),
            vec![25.0, 1.0, 0.0, 120.0, 200.0, 1.0, 0.0, 150.0, 1.0, 1.0, 0.0, 0.0, 0.0]
        );
    }
}
