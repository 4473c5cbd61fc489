use menuwise_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::{info, warn};

use crate::state::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Missing or unreadable artifacts leave the service running without a model.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        classifier_path = %config.model.classifier_path.display(),
        "starting application bootstrap"
    );
    let state = AppState::new(config.clone());

    let engine = state.engine.clone();
    match tokio::task::spawn_blocking(move || engine.reload()).await {
        Ok(Ok(model)) => info!(
            event_name = "system.bootstrap.model_loaded",
            correlation_id = "bootstrap",
            model_version = model.version,
            model_id = %model.metadata.model_id,
            "startup model loaded"
        ),
        Ok(Err(error)) => warn!(
            event_name = "system.bootstrap.model_unavailable",
            correlation_id = "bootstrap",
            error = %error,
            "starting without a model; predictions return 503 until a reload or retrain"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.model_unavailable",
            correlation_id = "bootstrap",
            error = %error,
            "startup model load aborted"
        ),
    }

    Ok(Application { config, state })
}

#[cfg(test)]
mod tests {
    use menuwise_core::config::{ConfigOverrides, LoadOptions};
    use menuwise_core::ml::BoostingParams;
    use menuwise_core::simulator::PolicySimulator;
    use menuwise_core::training::{Trainer, TrainerSettings};
    use menuwise_core::MenuCatalog;

    use crate::bootstrap::{bootstrap, bootstrap_with_config};
    use crate::testing::test_config;

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_config() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides { port: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("invalid port should fail").to_string();
        assert!(message.contains("server.port"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_without_artifacts_starts_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap_with_config(test_config(&dir)).await.expect("bootstrap");

        assert!(!app.state.engine.state().is_ready());
    }

    #[tokio::test]
    async fn bootstrap_loads_persisted_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(&dir);

        let mut simulator =
            PolicySimulator::new(MenuCatalog::default(), Some(5)).expect("simulator");
        let orders: Vec<_> = simulator.simulate(30).expect("window").collect();
        let trainer = Trainer::new(TrainerSettings {
            params: BoostingParams {
                n_estimators: 10,
                max_depth: 3,
                learning_rate: 0.3,
                ..BoostingParams::default()
            },
            ..TrainerSettings::default()
        });
        trainer.train_and_persist(&orders, &config.model.artifact_store()).expect("train");

        let app = bootstrap_with_config(config).await.expect("bootstrap");

        assert_eq!(app.state.engine.state().model_version(), Some(1));
    }
}
