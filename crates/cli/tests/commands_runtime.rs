use std::env;
use std::sync::{Mutex, OnceLock};

use funnelsight_cli::commands::ask::{self, AskArgs};
use funnelsight_cli::commands::{config, doctor, graph, migrate, seed};
use serde_json::Value;

const ENV_KEYS: &[&str] = &[
    "FUNNELSIGHT_WAREHOUSE_URL",
    "FUNNELSIGHT_WAREHOUSE_MAX_CONNECTIONS",
    "FUNNELSIGHT_WAREHOUSE_TIMEOUT_SECS",
    "FUNNELSIGHT_WAREHOUSE_TABLE",
    "FUNNELSIGHT_WAREHOUSE_MAX_ROWS",
    "FUNNELSIGHT_LLM_PROVIDER",
    "FUNNELSIGHT_LLM_API_KEY",
    "FUNNELSIGHT_LLM_BASE_URL",
    "FUNNELSIGHT_LLM_MODEL",
    "FUNNELSIGHT_LLM_TIMEOUT_SECS",
    "FUNNELSIGHT_LLM_MAX_RETRIES",
    "FUNNELSIGHT_WORKFLOW_MAX_TOOL_ROUNDS",
    "FUNNELSIGHT_WORKFLOW_FALLBACK_WINDOW_DAYS",
    "FUNNELSIGHT_WORKFLOW_CHECKPOINT_BACKEND",
    "FUNNELSIGHT_LOGGING_LEVEL",
    "FUNNELSIGHT_LOGGING_FORMAT",
    "FUNNELSIGHT_LOG_LEVEL",
    "FUNNELSIGHT_LOG_FORMAT",
];

const MEMORY_WAREHOUSE: (&str, &str) = ("FUNNELSIGHT_WAREHOUSE_URL", "sqlite::memory:");

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[MEMORY_WAREHOUSE], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failures_with_exit_code_two() {
    with_env(&[("FUNNELSIGHT_WAREHOUSE_URL", "postgres://localhost/funnels")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_dataset_summary() {
    with_env(&[MEMORY_WAREHOUSE], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("from 2025-07-01 to 2025-08-31"));
        assert!(message.contains("CL"));
        assert!(message.contains("EC"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("funnels.db").display());

    with_env(&[("FUNNELSIGHT_WAREHOUSE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_message = parse_payload(&first.output)["message"].clone();
        assert_eq!(first_message, parse_payload(&second.output)["message"]);
    });
}

#[test]
fn doctor_reports_an_unmigrated_warehouse() {
    with_env(&[MEMORY_WAREHOUSE], || {
        let report: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(report["overall_status"], "fail");

        let checks = report["checks"].as_array().expect("checks");
        let status = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status("config_validation"), "pass");
        assert_eq!(status("reasoning_client"), "pass");
        assert_eq!(status("database_connectivity"), "pass");
        assert_eq!(status("warehouse_table"), "fail");
    });
}

#[test]
fn config_redacts_api_keys_and_names_env_sources() {
    with_env(
        &[
            MEMORY_WAREHOUSE,
            ("FUNNELSIGHT_LLM_PROVIDER", "openai"),
            ("FUNNELSIGHT_LLM_API_KEY", "sk-live-secret"),
        ],
        || {
            let output = config::run();
            assert!(output
                .contains("- llm.api_key = sk-*** (source: env (FUNNELSIGHT_LLM_API_KEY))"));
            assert!(output.contains("- llm.provider = openai (source: env"));
            assert!(output.contains("- warehouse.table = funnels_resumido (source: default)"));
            assert!(!output.contains("live-secret"));
        },
    );
}

#[test]
fn ask_rejects_unreadable_history_files() {
    with_env(&[MEMORY_WAREHOUSE], || {
        let result = ask::run(AskArgs {
            question: "traffic Chile".to_string(),
            history: Some("does-not-exist/history.json".into()),
            ..AskArgs::default()
        });
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["error_class"], "input_validation");
    });
}

#[test]
fn ask_reports_unreachable_reasoning_service_as_run_failure() {
    with_env(
        &[
            MEMORY_WAREHOUSE,
            ("FUNNELSIGHT_LLM_BASE_URL", "http://127.0.0.1:9"),
            ("FUNNELSIGHT_LLM_MAX_RETRIES", "0"),
            ("FUNNELSIGHT_LLM_TIMEOUT_SECS", "2"),
            ("FUNNELSIGHT_WORKFLOW_CHECKPOINT_BACKEND", "memory"),
        ],
        || {
            let result = ask::run(AskArgs {
                question: "conversion rate Chile".to_string(),
                thread: Some("cli-test".to_string()),
                json: true,
                ..AskArgs::default()
            });
            assert_eq!(result.exit_code, 1, "expected run failure exit code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["success"], false);
            assert_eq!(payload["metadata"]["thread_id"], "cli-test");
            let response = payload["response"].as_str().unwrap_or("");
            assert!(response.starts_with("Error: the reasoning service could not be reached"));
        },
    );
}

#[test]
fn graph_prints_mermaid() {
    assert!(graph::run().contains("Start -->|Begin| Interpreting"));
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let previous_values: Vec<(&str, Option<String>)> =
        ENV_KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in ENV_KEYS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
