use funnelsight_agent::OpenAiCompatibleClient;
use funnelsight_core::config::{AppConfig, LoadOptions};
use funnelsight_db::{ping, DbPool};
use serde::Serialize;

use crate::bootstrap::connect_warehouse;

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

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self::new(name, CheckStatus::Skipped, format!("skipped because {reason}"))
    }
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
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
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
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_reasoning_client(&config));
            checks.extend(check_warehouse(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Fail,
                error.to_string(),
            ));
            for name in ["reasoning_client", "database_connectivity", "warehouse_table"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
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

/// Builds the client without sending a request.
fn check_reasoning_client(config: &AppConfig) -> DoctorCheck {
    match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => DoctorCheck::new(
            "reasoning_client",
            CheckStatus::Pass,
            format!(
                "{} model `{}` at `{}`",
                config.llm.provider.as_str(),
                config.llm.model,
                client.endpoint()
            ),
        ),
        Err(error) => DoctorCheck::new("reasoning_client", CheckStatus::Fail, error.to_string()),
    }
}

fn check_warehouse(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::new(
                    "database_connectivity",
                    CheckStatus::Fail,
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("warehouse_table", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_warehouse(config).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to warehouse: {error}"),
                    ),
                    DoctorCheck::skipped("warehouse_table", "the warehouse is unreachable"),
                ];
            }
        };

        let connectivity = match ping(&pool).await {
            Ok(()) => DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Pass,
                format!("connected using `{}`", config.warehouse.url),
            ),
            Err(error) => DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("connected but ping failed: {error}"),
            ),
        };
        let table = check_table(&pool, &config.warehouse.table).await;
        pool.close().await;
        vec![connectivity, table]
    })
}

async fn check_table(pool: &DbPool, table: &str) -> DoctorCheck {
    // `warehouse.table` is validated as a plain identifier by the config loader.
    let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await;
    match count {
        Ok(0) => DoctorCheck::new(
            "warehouse_table",
            CheckStatus::Fail,
            format!("`{table}` is empty; run `funnelsight seed` for demo data"),
        ),
        Ok(rows) => DoctorCheck::new(
            "warehouse_table",
            CheckStatus::Pass,
            format!("`{table}` holds {rows} rows"),
        ),
        Err(error) => DoctorCheck::new(
            "warehouse_table",
            CheckStatus::Fail,
            format!("`{table}` is not readable ({error}); run `funnelsight migrate`"),
        ),
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
