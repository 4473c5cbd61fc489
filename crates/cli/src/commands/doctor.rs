use menuwise_core::artifacts::{ArtifactError, ArtifactStore};
use menuwise_core::config::{AppConfig, LoadOptions};
use menuwise_core::features::FeatureSchema;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let store = config.model.artifact_store();
            let present = check_artifact_presence(&store);
            let artifacts_found = present.status == CheckStatus::Pass;
            checks.push(present);
            if artifacts_found {
                checks.push(check_artifact_schema(&store));
            } else {
                checks.push(skipped("artifact_schema", "skipped because artifacts are missing"));
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("artifact_presence", "skipped because configuration did not load"));
            checks.push(skipped("artifact_schema", "skipped because configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, details: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: details.to_string() }
}

fn check_artifact_presence(store: &ArtifactStore) -> DoctorCheck {
    let missing: Vec<String> = [store.classifier_path(), store.feature_names_path()]
        .into_iter()
        .filter(|path| !path.exists())
        .map(|path| format!("`{}`", path.display()))
        .collect();

    if missing.is_empty() {
        DoctorCheck {
            name: "artifact_presence",
            status: CheckStatus::Pass,
            details: format!(
                "found `{}` and `{}`",
                store.classifier_path().display(),
                store.feature_names_path().display()
            ),
        }
    } else {
        DoctorCheck {
            name: "artifact_presence",
            status: CheckStatus::Fail,
            details: format!("missing {}; run `menuwise train` first", missing.join(" and ")),
        }
    }
}

fn check_artifact_schema(store: &ArtifactStore) -> DoctorCheck {
    match store.load() {
        Ok(model) => DoctorCheck {
            name: "artifact_schema",
            status: CheckStatus::Pass,
            details: format!(
                "model {} matches feature schema v{} ({} samples, test accuracy {:.3})",
                model.metadata.model_id,
                FeatureSchema::current().version,
                model.metadata.training_samples,
                model.metadata.test_accuracy
            ),
        },
        Err(error @ ArtifactError::FeatureSkew { .. }) => DoctorCheck {
            name: "artifact_schema",
            status: CheckStatus::Fail,
            details: format!("{error}; retrain to regenerate artifacts"),
        },
        Err(error) => DoctorCheck {
            name: "artifact_schema",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
