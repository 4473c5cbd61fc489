use std::env;
use std::fs;
use std::path::Path;

use menuwise_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let training = &config.training;
    vec![
        Entry {
            key: "model.classifier_path",
            value: config.model.classifier_path.display().to_string(),
            env_keys: &["MENUWISE_MODEL_CLASSIFIER_PATH", "MODEL_PATH"],
        },
        Entry {
            key: "model.feature_names_path",
            value: config.model.feature_names_path.display().to_string(),
            env_keys: &["MENUWISE_MODEL_FEATURE_NAMES_PATH", "FEATURE_NAMES_PATH"],
        },
        Entry {
            key: "simulation.num_days",
            value: config.simulation.num_days.to_string(),
            env_keys: &["MENUWISE_SIMULATION_NUM_DAYS"],
        },
        Entry {
            key: "simulation.seed",
            value: config.simulation.seed.map_or_else(|| "<unset>".to_string(), |seed| seed.to_string()),
            env_keys: &["MENUWISE_SIMULATION_SEED"],
        },
        Entry {
            key: "training.test_fraction",
            value: training.test_fraction.to_string(),
            env_keys: &[],
        },
        Entry {
            key: "training.timeout_secs",
            value: training.timeout_secs.to_string(),
            env_keys: &["MENUWISE_TRAINING_TIMEOUT_SECS"],
        },
        Entry {
            key: "training.n_estimators",
            value: training.n_estimators.to_string(),
            env_keys: &["MENUWISE_TRAINING_N_ESTIMATORS"],
        },
        Entry {
            key: "training.max_depth",
            value: training.max_depth.to_string(),
            env_keys: &["MENUWISE_TRAINING_MAX_DEPTH"],
        },
        Entry {
            key: "training.learning_rate",
            value: training.learning_rate.to_string(),
            env_keys: &["MENUWISE_TRAINING_LEARNING_RATE"],
        },
        Entry {
            key: "training.min_child_weight",
            value: training.min_child_weight.to_string(),
            env_keys: &[],
        },
        Entry {
            key: "training.min_split_gain",
            value: training.min_split_gain.to_string(),
            env_keys: &[],
        },
        Entry {
            key: "training.seed",
            value: training.seed.to_string(),
            env_keys: &["MENUWISE_TRAINING_SEED"],
        },
        Entry {
            key: "recommendation.confidence_threshold",
            value: config.recommendation.confidence_threshold.to_string(),
            env_keys: &["MENUWISE_RECOMMENDATION_CONFIDENCE_THRESHOLD"],
        },
        Entry {
            key: "recommendation.default_num_items",
            value: config.recommendation.default_num_items.to_string(),
            env_keys: &[],
        },
        Entry {
            key: "recommendation.default_order_duration_minutes",
            value: config.recommendation.default_order_duration_minutes.to_string(),
            env_keys: &[],
        },
        Entry {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["MENUWISE_SERVER_BIND_ADDRESS"],
        },
        Entry {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["MENUWISE_SERVER_PORT"],
        },
        Entry {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["MENUWISE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Entry {
            key: "server.retrain_wait_secs",
            value: config.server.retrain_wait_secs.to_string(),
            env_keys: &["MENUWISE_SERVER_RETRAIN_WAIT_SECS"],
        },
        Entry {
            key: "server.retrain_token",
            value: redacted(config.server.retrain_token.is_some()),
            env_keys: &["MENUWISE_SERVER_RETRAIN_TOKEN"],
        },
        Entry {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["MENUWISE_LOGGING_LEVEL", "MENUWISE_LOG_LEVEL"],
        },
        Entry {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["MENUWISE_LOGGING_FORMAT", "MENUWISE_LOG_FORMAT"],
        },
    ]
}

fn redacted(is_set: bool) -> String {
    let label = if is_set { "<redacted>" } else { "<unset>" };
    label.to_string()
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
