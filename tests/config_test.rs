use std::sync::Mutex;
use std::time::Duration;

use jobrelay::config::Config;
use jobrelay::config::secrets::ExposeSecret;

// Tests in this file share the process environment.
static ENV: Mutex<()> = Mutex::new(());

const REQUIRED: [(&str, &str); 4] = [
    ("TASK_SERVICE_URL", "https://queue.example.net/v1/"),
    ("REPORTING_URL", "https://dashboard.example.net/api"),
    ("REPORTING_CLIENT_ID", "relay"),
    ("REPORTING_SECRET", "s3cret"),
];

const OPTIONAL: [&str; 12] = [
    "SCHEDULER_URL",
    "INSPECTOR_URL",
    "ROUTE_PREFIX",
    "RETRY_SCHEDULER_ID",
    "FLUSH_INTERVAL_MS",
    "FLUSH_TIMEOUT_SECS",
    "INSPECTION_TIMEOUT_SECS",
    "PROJECTS_FILE",
    "OTEL_ENDPOINT",
    "LOG_LEVEL",
    "LOG_JSON",
    "RUST_LOG",
];

fn reset_env() {
    unsafe {
        for (name, value) in REQUIRED {
            std::env::set_var(name, value);
        }
        for name in OPTIONAL {
            std::env::remove_var(name);
        }
    }
}

#[test]
fn config_from_env_applies_defaults() {
    let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
    reset_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.task_service_url, "https://queue.example.net/v1/");
    assert_eq!(config.scheduler_url, config.task_service_url);
    assert_eq!(config.reporting_secret.expose_secret(), "s3cret");
    assert_eq!(config.route_prefix, "treeherder");
    assert_eq!(config.retry_scheduler_id, "task-graph-scheduler");
    assert_eq!(config.flush_interval, Duration::from_secs(1));
    assert_eq!(config.flush_timeout, Duration::from_secs(30));
    assert_eq!(config.inspection_timeout, Duration::from_secs(10));
    assert!(config.projects_file.is_none());
    assert!(config.otel_endpoint.is_none());
    assert_eq!(config.log_level, "info");
    assert!(!config.log_json);

    let batch = config.batch_config();
    assert_eq!(batch.interval, config.flush_interval);
    let classifier = config.classifier_config();
    assert_eq!(classifier.inspection_timeout, Duration::from_secs(10));
}

#[test]
fn config_from_env_reads_overrides() {
    let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
    reset_env();
    unsafe {
        std::env::set_var("SCHEDULER_URL", "https://scheduler.example.net/v1");
        std::env::set_var("ROUTE_PREFIX", "tc-treeherder");
        std::env::set_var("FLUSH_INTERVAL_MS", "250");
        std::env::set_var("LOG_JSON", "true");
        std::env::set_var("OTEL_ENDPOINT", "");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.scheduler_url, "https://scheduler.example.net/v1");
    assert_eq!(config.route_prefix, "tc-treeherder");
    assert_eq!(config.flush_interval, Duration::from_millis(250));
    assert!(config.log_json);
    // empty counts as unset
    assert!(config.otel_endpoint.is_none());
}

#[test]
fn config_from_env_rejects_malformed_numbers() {
    let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
    reset_env();
    unsafe {
        std::env::set_var("FLUSH_TIMEOUT_SECS", "soon");
    }

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("FLUSH_TIMEOUT_SECS"));
}

#[test]
fn config_from_env_fails_without_required() {
    let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
    reset_env();
    unsafe {
        std::env::remove_var("REPORTING_SECRET");
    }

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("REPORTING_SECRET"));
}
