use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use menuwise_core::config::ConfigOverrides;
use menuwise_core::domain::discount::DiscountClass;
use menuwise_core::domain::menu::MenuCatalog;
use menuwise_core::simulator::PolicySimulator;
use menuwise_core::SimulatedOrder;
use serde_json::json;
use tracing::info;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub days: Option<u32>,
    pub seed: Option<u64>,
    pub out: PathBuf,
}

pub fn run(args: SimulateArgs) -> CommandResult {
    let overrides = ConfigOverrides {
        simulation_days: args.days,
        simulation_seed: args.seed,
        ..ConfigOverrides::default()
    };
    let config = match load_config("simulate", overrides) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let mut simulator = match PolicySimulator::new(MenuCatalog::default(), config.simulation.seed) {
        Ok(simulator) => simulator,
        Err(error) => return CommandResult::failure("simulate", "simulator", error.to_string(), 3),
    };

    let num_days = config.simulation.num_days;
    let orders = match simulator.simulate(num_days) {
        Ok(orders) => orders,
        Err(error) => return CommandResult::failure("simulate", "simulator", error.to_string(), 3),
    };
    let mut class_counts = [0_usize; DiscountClass::COUNT];
    let written = write_corpus(&args.out, orders, |order| {
        class_counts[order.discount_class().index()] += 1;
    });

    match written {
        Ok(total) => {
            info!(
                event_name = "cli.simulate.completed",
                correlation_id = "cli",
                orders = total,
                days = num_days,
                out = %args.out.display(),
                "simulated corpus written"
            );
            let distribution: serde_json::Map<_, _> = DiscountClass::ALL
                .into_iter()
                .map(|class| (class.as_str().to_string(), json!(class_counts[class.index()])))
                .collect();
            CommandResult::success_with_data(
                "simulate",
                format!("wrote {total} orders for {num_days} days to {}", args.out.display()),
                Some(json!({
                    "orders": total,
                    "days": num_days,
                    "seed": config.simulation.seed,
                    "class_distribution": distribution,
                })),
            )
        }
        Err(error) => CommandResult::failure(
            "simulate",
            "io",
            format!("failed to write `{}`: {error}", args.out.display()),
            4,
        ),
    }
}

fn write_corpus(
    path: &Path,
    orders: impl Iterator<Item = SimulatedOrder>,
    mut observe: impl FnMut(&SimulatedOrder),
) -> std::io::Result<usize> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    let mut total = 0;
    for order in orders {
        observe(&order);
        serde_json::to_writer(&mut writer, &order)?;
        writer.write_all(b"\n")?;
        total += 1;
    }
    writer.flush()?;
    Ok(total)
}
