use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifacts::ArtifactStore;
use crate::ml::BoostingParams;
use crate::recommendation::RecommendationPolicy;
use crate::training::{TrainerSettings, DEFAULT_TEST_FRACTION};

pub const DEFAULT_CONFIG_FILE: &str = "menuwise.toml";
pub const NESTED_CONFIG_FILE: &str = "config/menuwise.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub simulation: SimulationConfig,
    pub training: TrainingConfig,
    pub recommendation: RecommendationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub classifier_path: PathBuf,
    pub feature_names_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub num_days: u32,
    /// `None` draws a fresh seed per run.
    pub seed: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub timeout_secs: u64,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub lambda: f64,
    pub min_samples_leaf: usize,
    pub min_child_weight: f64,
    pub min_split_gain: f64,
    pub max_bins: usize,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub confidence_threshold: f64,
    pub default_num_items: u32,
    pub default_order_duration_minutes: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub retrain_wait_secs: u64,
    pub retrain_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub classifier_path: Option<PathBuf>,
    pub feature_names_path: Option<PathBuf>,
    pub simulation_days: Option<u32>,
    pub simulation_seed: Option<u64>,
    pub training_timeout_secs: Option<u64>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub retrain_wait_secs: Option<u64>,
    pub retrain_token: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let boosting = BoostingParams::default();
        let policy = RecommendationPolicy::default();
        Self {
            model: ModelConfig {
                classifier_path: PathBuf::from("models/discount_classifier.json"),
                feature_names_path: PathBuf::from("models/feature_names.json"),
            },
            simulation: SimulationConfig { num_days: 180, seed: None },
            training: TrainingConfig {
                test_fraction: DEFAULT_TEST_FRACTION,
                timeout_secs: 600,
                n_estimators: boosting.n_estimators,
                max_depth: boosting.max_depth,
                learning_rate: boosting.learning_rate,
                subsample: boosting.subsample,
                colsample_bytree: boosting.colsample_bytree,
                lambda: boosting.lambda,
                min_samples_leaf: boosting.min_samples_leaf,
                min_child_weight: boosting.min_child_weight,
                min_split_gain: boosting.min_split_gain,
                max_bins: boosting.max_bins,
                seed: boosting.seed,
            },
            recommendation: RecommendationConfig {
                confidence_threshold: policy.confidence_threshold,
                default_num_items: policy.default_num_items,
                default_order_duration_minutes: policy.default_order_duration_minutes,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
                retrain_wait_secs: 30,
                retrain_token: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl ModelConfig {
    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(self.classifier_path.clone(), self.feature_names_path.clone())
    }
}

impl TrainingConfig {
    pub fn trainer_settings(&self) -> TrainerSettings {
        TrainerSettings {
            test_fraction: self.test_fraction,
            params: BoostingParams {
                n_estimators: self.n_estimators,
                max_depth: self.max_depth,
                learning_rate: self.learning_rate,
                subsample: self.subsample,
                colsample_bytree: self.colsample_bytree,
                lambda: self.lambda,
                min_samples_leaf: self.min_samples_leaf,
                min_child_weight: self.min_child_weight,
                min_split_gain: self.min_split_gain,
                max_bins: self.max_bins,
                seed: self.seed,
            },
        }
    }
}

impl RecommendationConfig {
    pub fn policy(&self) -> RecommendationPolicy {
        RecommendationPolicy {
            confidence_threshold: self.confidence_threshold,
            default_num_items: self.default_num_items,
            default_order_duration_minutes: self.default_order_duration_minutes,
        }
    }
}

impl ServerConfig {
    pub fn retrain_token_matches(&self, presented: Option<&str>) -> bool {
        match &self.retrain_token {
            None => true,
            Some(expected) => presented.is_some_and(|value| value == expected.expose_secret()),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(model) = patch.model {
            if let Some(classifier_path) = model.classifier_path {
                self.model.classifier_path = classifier_path;
            }
            if let Some(feature_names_path) = model.feature_names_path {
                self.model.feature_names_path = feature_names_path;
            }
        }

        if let Some(simulation) = patch.simulation {
            if let Some(num_days) = simulation.num_days {
                self.simulation.num_days = num_days;
            }
            if let Some(seed) = simulation.seed {
                self.simulation.seed = Some(seed);
            }
        }

        if let Some(training) = patch.training {
            let target = &mut self.training;
            if let Some(value) = training.test_fraction {
                target.test_fraction = value;
            }
            if let Some(value) = training.timeout_secs {
                target.timeout_secs = value;
            }
            if let Some(value) = training.n_estimators {
                target.n_estimators = value;
            }
            if let Some(value) = training.max_depth {
                target.max_depth = value;
            }
            if let Some(value) = training.learning_rate {
                target.learning_rate = value;
            }
            if let Some(value) = training.subsample {
                target.subsample = value;
            }
            if let Some(value) = training.colsample_bytree {
                target.colsample_bytree = value;
            }
            if let Some(value) = training.lambda {
                target.lambda = value;
            }
            if let Some(value) = training.min_samples_leaf {
                target.min_samples_leaf = value;
            }
            if let Some(value) = training.min_child_weight {
                target.min_child_weight = value;
            }
            if let Some(value) = training.min_split_gain {
                target.min_split_gain = value;
            }
            if let Some(value) = training.max_bins {
                target.max_bins = value;
            }
            if let Some(value) = training.seed {
                target.seed = value;
            }
        }

        if let Some(recommendation) = patch.recommendation {
            if let Some(value) = recommendation.confidence_threshold {
                self.recommendation.confidence_threshold = value;
            }
            if let Some(value) = recommendation.default_num_items {
                self.recommendation.default_num_items = value;
            }
            if let Some(value) = recommendation.default_order_duration_minutes {
                self.recommendation.default_order_duration_minutes = value;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(retrain_wait_secs) = server.retrain_wait_secs {
                self.server.retrain_wait_secs = retrain_wait_secs;
            }
            if let Some(retrain_token_value) = server.retrain_token {
                self.server.retrain_token = Some(secret_value(retrain_token_value));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let classifier_path =
            read_env("MENUWISE_MODEL_CLASSIFIER_PATH").or_else(|| read_env("MODEL_PATH"));
        if let Some(value) = classifier_path {
            self.model.classifier_path = PathBuf::from(value);
        }
        let feature_names_path = read_env("MENUWISE_MODEL_FEATURE_NAMES_PATH")
            .or_else(|| read_env("FEATURE_NAMES_PATH"));
        if let Some(value) = feature_names_path {
            self.model.feature_names_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("MENUWISE_SIMULATION_NUM_DAYS") {
            self.simulation.num_days = parse_u32("MENUWISE_SIMULATION_NUM_DAYS", &value)?;
        }
        if let Some(value) = read_env("MENUWISE_SIMULATION_SEED") {
            self.simulation.seed = Some(parse_u64("MENUWISE_SIMULATION_SEED", &value)?);
        }

        if let Some(value) = read_env("MENUWISE_TRAINING_TIMEOUT_SECS") {
            self.training.timeout_secs = parse_u64("MENUWISE_TRAINING_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MENUWISE_TRAINING_N_ESTIMATORS") {
            self.training.n_estimators = parse_usize("MENUWISE_TRAINING_N_ESTIMATORS", &value)?;
        }
        if let Some(value) = read_env("MENUWISE_TRAINING_MAX_DEPTH") {
            self.training.max_depth = parse_usize("MENUWISE_TRAINING_MAX_DEPTH", &value)?;
        }
        if let Some(value) = read_env("MENUWISE_TRAINING_LEARNING_RATE") {
            self.training.learning_rate = parse_f64("MENUWISE_TRAINING_LEARNING_RATE", &value)?;
        }
        if let Some(value) = read_env("MENUWISE_TRAINING_SEED") {
            self.training.seed = parse_u64("MENUWISE_TRAINING_SEED", &value)?;
        }

        if let Some(value) = read_env("MENUWISE_RECOMMENDATION_CONFIDENCE_THRESHOLD") {
            self.recommendation.confidence_threshold =
                parse_f64("MENUWISE_RECOMMENDATION_CONFIDENCE_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("MENUWISE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MENUWISE_SERVER_PORT") {
            self.server.port = parse_u16("MENUWISE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MENUWISE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MENUWISE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("MENUWISE_SERVER_RETRAIN_WAIT_SECS") {
            self.server.retrain_wait_secs = parse_u64("MENUWISE_SERVER_RETRAIN_WAIT_SECS", &value)?;
        }
        if let Some(value) = read_env("MENUWISE_SERVER_RETRAIN_TOKEN") {
            self.server.retrain_token = Some(secret_value(value));
        }

        let log_level =
            read_env("MENUWISE_LOGGING_LEVEL").or_else(|| read_env("MENUWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MENUWISE_LOGGING_FORMAT").or_else(|| read_env("MENUWISE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(classifier_path) = overrides.classifier_path {
            self.model.classifier_path = classifier_path;
        }
        if let Some(feature_names_path) = overrides.feature_names_path {
            self.model.feature_names_path = feature_names_path;
        }
        if let Some(num_days) = overrides.simulation_days {
            self.simulation.num_days = num_days;
        }
        if let Some(seed) = overrides.simulation_seed {
            self.simulation.seed = Some(seed);
        }
        if let Some(timeout_secs) = overrides.training_timeout_secs {
            self.training.timeout_secs = timeout_secs;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(retrain_wait_secs) = overrides.retrain_wait_secs {
            self.server.retrain_wait_secs = retrain_wait_secs;
        }
        if let Some(retrain_token) = overrides.retrain_token {
            self.server.retrain_token = Some(secret_value(retrain_token));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_model(&self.model)?;
        validate_simulation(&self.simulation)?;
        validate_training(&self.training)?;
        validate_recommendation(&self.recommendation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_model(model: &ModelConfig) -> Result<(), ConfigError> {
    if model.classifier_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("model.classifier_path must not be empty".to_string()));
    }
    if model.feature_names_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "model.feature_names_path must not be empty".to_string(),
        ));
    }
    if model.classifier_path == model.feature_names_path {
        return Err(ConfigError::Validation(
            "model.classifier_path and model.feature_names_path must differ".to_string(),
        ));
    }
    Ok(())
}

fn validate_simulation(simulation: &SimulationConfig) -> Result<(), ConfigError> {
    if simulation.num_days == 0 || simulation.num_days > 3650 {
        return Err(ConfigError::Validation(
            "simulation.num_days must be in range 1..=3650".to_string(),
        ));
    }
    Ok(())
}

fn validate_training(training: &TrainingConfig) -> Result<(), ConfigError> {
    if !(training.test_fraction > 0.0 && training.test_fraction < 1.0) {
        return Err(ConfigError::Validation(
            "training.test_fraction must be strictly between 0 and 1".to_string(),
        ));
    }
    if training.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "training.timeout_secs must be greater than zero".to_string(),
        ));
    }
    training
        .trainer_settings()
        .params
        .validate()
        .map_err(|error| ConfigError::Validation(format!("training: {error}")))
}

fn validate_recommendation(recommendation: &RecommendationConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&recommendation.confidence_threshold) {
        return Err(ConfigError::Validation(
            "recommendation.confidence_threshold must be in range 0..=1".to_string(),
        ));
    }
    if recommendation.default_num_items == 0 {
        return Err(ConfigError::Validation(
            "recommendation.default_num_items must be greater than zero".to_string(),
        ));
    }
    if recommendation.default_order_duration_minutes == 0 {
        return Err(ConfigError::Validation(
            "recommendation.default_order_duration_minutes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if let Some(token) = &server.retrain_token {
        if token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.retrain_token must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    model: Option<ModelPatch>,
    simulation: Option<SimulationPatch>,
    training: Option<TrainingPatch>,
    recommendation: Option<RecommendationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPatch {
    classifier_path: Option<PathBuf>,
    feature_names_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SimulationPatch {
    num_days: Option<u32>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TrainingPatch {
    test_fraction: Option<f64>,
    timeout_secs: Option<u64>,
    n_estimators: Option<usize>,
    max_depth: Option<usize>,
    learning_rate: Option<f64>,
    subsample: Option<f64>,
    colsample_bytree: Option<f64>,
    lambda: Option<f64>,
    min_samples_leaf: Option<usize>,
    min_child_weight: Option<f64>,
    min_split_gain: Option<f64>,
    max_bins: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationPatch {
    confidence_threshold: Option<f64>,
    default_num_items: Option<u32>,
    default_order_duration_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    retrain_wait_secs: Option<u64>,
    retrain_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
