extern crate serde;

mod encoder;
mod predictor;
mod records;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use encoder::{
    encode, Categorical, ChestPainType, EncodeError, RawPatientInput, RestingEcg, StSlope,
    Thalassemia,
};
use env_logger::{Builder, Env};
use log::{debug, info, LevelFilter};
use predictor::{Outcome, PredictError, Predictor};
use records::{PatientRecord, FEATURE_DOMAINS, FEATURE_NAMES};
use thiserror::Error;

static MODEL_PATH: &str = "best_logistic_regression_model.json";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = HeartAppArgs::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let env = Env::new().filter("HEART_LOG");
    Builder::new()
        .filter(Some("heart_predict"), log_level)
        .parse_env(env)
        .init();

    debug!("Arguments {:#?}", cli);

    match heart_app(cli).await {
        Ok(Some(outcome)) => {
            println!("{}", outcome);
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

#[derive(Parser, Debug)]
#[clap(name = "heart-predict", author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub struct HeartAppArgs {
    #[clap(short, long, parse(from_os_str), default_value = MODEL_PATH,
    help = "Trained model artifact")]
    model: PathBuf,
    #[clap(short, long, parse(from_occurrences),
    help = "Verbose level")]
    verbose: usize,
    #[clap(long, parse(from_flag),
    help = "Display the patient record schema and exit")]
    schema: bool,

    #[clap(long, default_value_t = 25, allow_hyphen_values = true, help = "Age")]
    age: i64,
    #[clap(long, default_value = "Male", help = "Sex: Male or Female")]
    sex: String,
    #[clap(long, default_value = "0: Typical Angina", help = "Chest pain type")]
    cp: String,
    #[clap(long, default_value_t = 120, allow_hyphen_values = true,
    help = "Resting BP (mm Hg)")]
    trestbps: i64,
    #[clap(long, default_value_t = 200, allow_hyphen_values = true,
    help = "Cholesterol (mg/dL)")]
    chol: i64,
    #[clap(long, default_value = "Yes", help = "Fasting blood sugar > 120 mg/dl: Yes or No")]
    fbs: String,
    #[clap(long, default_value = "0: Normal", help = "Resting ECG")]
    restecg: String,
    #[clap(long, default_value_t = 150, allow_hyphen_values = true, help = "Max heart rate")]
    thalach: i64,
    #[clap(long, default_value = "Yes", help = "Exercise induced angina: Yes or No")]
    exang: String,
    #[clap(long, default_value_t = 1.0, allow_hyphen_values = true,
    help = "Oldpeak (ST depression)")]
    oldpeak: f64,
    #[clap(long, default_value = "0: Upsloping", help = "Slope")]
    slope: String,
    #[clap(long, default_value_t = 0, allow_hyphen_values = true,
    help = "Number of major vessels")]
    ca: i64,
    #[clap(long, default_value = "0: Normal", help = "Thalassemia")]
    thal: String,
}

impl HeartAppArgs {
    fn patient_input(&self) -> RawPatientInput {
        RawPatientInput {
            age: self.age,
            sex: self.sex.clone(),
            cp: self.cp.clone(),
            trestbps: self.trestbps,
            chol: self.chol,
            fbs: self.fbs.clone(),
            restecg: self.restecg.clone(),
            thalach: self.thalach,
            exang: self.exang.clone(),
            oldpeak: self.oldpeak,
            slope: self.slope.clone(),
            ca: self.ca,
            thal: self.thal.clone(),
        }
    }
}

#[derive(Error, Debug)]
enum HeartAppError {
    #[error("invalid patient data: {0}")]
    Input(#[from] EncodeError),
    #[error(transparent)]
    Predict(#[from] PredictError),
}

impl HeartAppError {
    fn exit_code(&self) -> u8 {
        match self {
            HeartAppError::Input(_) => 2,
            HeartAppError::Predict(_) => 1,
        }
    }
}

fn print_schema() {
    let schema = PatientRecord::schema();
    println!("# Patient record schema");
    for (position, (name, domain)) in FEATURE_NAMES.iter().zip(FEATURE_DOMAINS).enumerate() {
        let dtype = schema
            .get(name)
            .map(|dtype| dtype.to_string())
            .unwrap_or_default();
        println!("{:>2} {:<9} {:<4} {}", position, name, dtype, domain);
    }

    println!("\n# Label choices");
    println!("cp:      {}", ChestPainType::labels().join(" | "));
    println!("restecg: {}", RestingEcg::labels().join(" | "));
    println!("slope:   {}", StSlope::labels().join(" | "));
    println!("thal:    {}", Thalassemia::labels().join(" | "));
}

/// Loads the model, then encodes and predicts the patient given on the
/// command line. Returns `None` when only the schema was requested.
async fn heart_app(opts: HeartAppArgs) -> Result<Option<Outcome>, HeartAppError> {
    if opts.schema {
        print_schema();
        return Ok(None);
    }

    // no model, no service: fail before looking at the input
    let predictor = Predictor::load(&opts.model).await?;
    info!("Model ready, {} features", predictor.feature_names().len());

    let record = encode(&opts.patient_input())?;
    debug!("Patient record {:?}", record.to_vec());

    let outcome = predictor.predict(&record)?;
    info!("Prediction label {}", outcome.label());
    Ok(Some(outcome))
}
