//! Doctor command - validate configuration and show status

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::args::DoctorArgs;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    accounts: CheckResult,
    x_read: CheckResult,
    bluesky: CheckResult,
    state: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        accounts: CheckResult::error("Not checked"),
        x_read: CheckResult::error("Not checked"),
        bluesky: CheckResult::error("Not checked"),
        state: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.accounts = check_accounts(config);
        report.x_read = check_env_credential(&config.x.bearer_token_env, "X bearer token");
        report.bluesky = check_bluesky(config);
        report.state = check_state(config).await;
    }

    let checks = [
        &report.config,
        &report.accounts,
        &report.x_read,
        &report.bluesky,
        &report.state,
    ];
    report.overall = if checks.iter().any(|c| c.is_error()) {
        "error".to_string()
    } else if checks.iter().any(|c| c.status == "warn") {
        "warn".to_string()
    } else {
        "ok".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

fn check_accounts(config: &AppConfig) -> CheckResult {
    if config.watch.accounts.is_empty() {
        return CheckResult::warn("No accounts configured, nothing will be forwarded");
    }
    if config.watch.max_posts_per_check == 0 {
        return CheckResult::error("max_posts_per_check must be greater than zero");
    }
    CheckResult::ok(format!(
        "{} account(s) configured",
        config.watch.accounts.len()
    ))
}

fn check_env_credential(env_var: &str, what: &str) -> CheckResult {
    if env_var.trim().is_empty() {
        return CheckResult::error(format!("No env var configured for {}", what));
    }
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => {
            CheckResult::ok(format!("{} present in {}", what, env_var))
        }
        _ => CheckResult::error(format!("{} missing: set {}", what, env_var)),
    }
}

fn check_bluesky(config: &AppConfig) -> CheckResult {
    if config.bluesky.identifier.trim().is_empty() {
        return CheckResult::error("Bluesky identifier is not configured");
    }
    check_env_credential(&config.bluesky.app_password_env, "Bluesky app password")
}

async fn check_state(config: &AppConfig) -> CheckResult {
    let path = &config.general.state_path;
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(_) => CheckResult::ok(format!("Bookmark file readable: {}", path.display())),
            Err(e) => CheckResult::warn(format!(
                "Bookmark file corrupt (will start empty): {}",
                e
            )),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::ok("No bookmark file yet, will be created on first forward")
        }
        Err(e) => CheckResult::warn(format!("Bookmark file unreadable: {}", e)),
    }
}

fn print_report(report: &DoctorReport) {
    let rows = [
        ("config", &report.config),
        ("accounts", &report.accounts),
        ("x_read", &report.x_read),
        ("bluesky", &report.bluesky),
        ("state", &report.state),
    ];

    for (name, check) in rows {
        println!("{:<10} [{}] {}", name, check.status, check.message);
    }
    println!();
    println!("overall: {}", report.overall);
}
