use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use menuwise_core::config::{AppConfig, ConfigOverrides};
use menuwise_core::domain::menu::MenuCatalog;
use menuwise_core::domain::order::SimulatedOrder;
use menuwise_core::simulator::PolicySimulator;
use menuwise_core::training::Trainer;
use serde_json::json;
use tracing::info;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Clone, Default)]
pub struct TrainArgs {
    pub corpus: Option<PathBuf>,
    pub days: Option<u32>,
    pub seed: Option<u64>,
}

pub fn run(args: TrainArgs) -> CommandResult {
    let overrides = ConfigOverrides {
        simulation_days: args.days,
        simulation_seed: args.seed,
        ..ConfigOverrides::default()
    };
    let config = match load_config("train", overrides) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let orders = match &args.corpus {
        Some(path) => read_corpus(path),
        None => simulate_corpus(&config),
    };
    let orders = match orders {
        Ok(orders) => orders,
        Err(failure) => return failure,
    };

    let store = config.model.artifact_store();
    let trainer = Trainer::new(config.training.trainer_settings());
    match trainer.train_and_persist(&orders, &store) {
        Ok(outcome) => {
            info!(
                event_name = "cli.train.completed",
                correlation_id = "cli",
                model_id = %outcome.model.metadata.model_id,
                accuracy = outcome.report.evaluation.accuracy,
                "model trained from cli"
            );
            let message = format!(
                "trained on {} orders ({} quality, accuracy {:.3}); artifacts at {} and {}",
                outcome.report.total_orders,
                outcome.report.quality().as_str(),
                outcome.report.evaluation.accuracy,
                store.classifier_path().display(),
                store.feature_names_path().display(),
            );
            let data = json!({
                "model_id": outcome.model.metadata.model_id,
                "report": outcome.report,
            });
            CommandResult::success_with_data("train", message, Some(data))
        }
        Err(error) => CommandResult::failure("train", "training", error.to_string(), 5),
    }
}

fn simulate_corpus(config: &AppConfig) -> Result<Vec<SimulatedOrder>, CommandResult> {
    let mut simulator = PolicySimulator::new(MenuCatalog::default(), config.simulation.seed)
        .map_err(|error| CommandResult::failure("train", "simulator", error.to_string(), 3))?;
    let orders = simulator
        .simulate(config.simulation.num_days)
        .map_err(|error| CommandResult::failure("train", "simulator", error.to_string(), 3))?;
    Ok(orders.collect())
}

/// One order per line; blank lines are ignored.
fn read_corpus(path: &Path) -> Result<Vec<SimulatedOrder>, CommandResult> {
    let file = File::open(path).map_err(|error| {
        CommandResult::failure(
            "train",
            "io",
            format!("failed to open corpus `{}`: {error}", path.display()),
            4,
        )
    })?;

    let mut orders = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|error| {
            CommandResult::failure(
                "train",
                "io",
                format!("failed to read corpus `{}`: {error}", path.display()),
                4,
            )
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let order = serde_json::from_str::<SimulatedOrder>(&line).map_err(|error| {
            CommandResult::failure(
                "train",
                "corpus_parse",
                format!("corpus line {} is not a valid order: {error}", index + 1),
                3,
            )
        })?;
        orders.push(order);
    }
    Ok(orders)
}
