//! Run command - fetch, filter, and forward loop

use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use skybridge_adapters::{BlueskyPublisher, FileBookmarkStore, XPostSource};
use skybridge_domain::{
    AccountSummary,
    usecases::{PollConfig, PollLoop},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::args::RunArgs;
use crate::config::AppConfig;

/// Delay between accounts within a cycle, to avoid bursting the source API
const ACCOUNT_PACING: Duration = Duration::from_secs(1);

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    if config.watch.max_posts_per_check == 0 {
        bail!("max_posts_per_check must be greater than zero");
    }

    tracing::info!(
        once = args.once,
        dry_run = args.dry_run,
        accounts = config.watch.accounts.len(),
        state_path = %config.general.state_path.display(),
        "Starting skybridge run"
    );

    // Build dependencies
    let store = Arc::new(FileBookmarkStore::new(&config.general.state_path));

    let bearer_token = load_secret(&config.x.bearer_token_env, "X")?;
    let source = Arc::new(XPostSource::new(bearer_token));

    let publisher = Arc::new(build_publisher(&config, args.dry_run)?);
    if !args.dry_run {
        publisher
            .login()
            .await
            .context("Bluesky authentication failed")?;
    }

    let loop_config = PollConfig {
        accounts: config.watch.accounts.clone(),
        max_posts_per_check: config.watch.max_posts_per_check,
        ignore_patterns: config.watch.ignore_patterns.clone(),
        pacing_delay: ACCOUNT_PACING,
        dry_run: args.dry_run,
    };

    let mut poll_loop = PollLoop::load(source, publisher, store, loop_config).await;

    // Execute
    if args.once {
        tracing::info!("Running single poll cycle");
        let summaries = poll_loop.poll_once().await;
        log_cycle(&summaries);
    } else {
        // A zero-period interval would panic; clamp to one second
        let period = Duration::from_secs((config.watch.interval_minutes * 60).max(1));
        let mut ticker = interval(period);

        tracing::info!(
            interval_minutes = config.watch.interval_minutes,
            "Starting continuous polling"
        );

        // Set up graceful shutdown
        let shutdown = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            tracing::info!("Shutdown signal received");
        };

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summaries = poll_loop.poll_once().await;
                    log_cycle(&summaries);
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down gracefully");
                    break;
                }
            }
        }
    }

    tracing::info!("skybridge run completed");
    Ok(())
}

fn build_publisher(config: &AppConfig, dry_run: bool) -> Result<BlueskyPublisher> {
    if dry_run {
        // Never logs in or publishes; credentials are not required
        return Ok(BlueskyPublisher::with_base_url(
            config.bluesky.identifier.clone(),
            SecretString::new("".into()),
            config.bluesky.service_url.clone(),
            config.bluesky.max_chars,
        ));
    }

    if config.bluesky.identifier.trim().is_empty() {
        bail!("Bluesky identifier is not configured");
    }

    let password = load_secret(&config.bluesky.app_password_env, "Bluesky")?;

    Ok(BlueskyPublisher::with_base_url(
        config.bluesky.identifier.clone(),
        password,
        config.bluesky.service_url.clone(),
        config.bluesky.max_chars,
    ))
}

fn log_cycle(summaries: &[AccountSummary]) {
    let forwarded: usize = summaries.iter().map(|s| s.forwarded).sum();
    let excluded: usize = summaries.iter().map(|s| s.excluded).sum();
    let failed: usize = summaries.iter().map(|s| s.failed).sum();

    tracing::info!(
        accounts = summaries.len(),
        forwarded = forwarded,
        excluded = excluded,
        failed = failed,
        "Poll cycle complete"
    );
}

pub(crate) fn load_secret(env_var: &str, service: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No credential env var configured for {}", service);
    }

    let value = std::env::var(env_var)
        .with_context(|| format!("Missing credential env var {} for {}", env_var, service))?;

    if value.trim().is_empty() {
        bail!("Credential env var {} is empty for {}", env_var, service);
    }

    Ok(SecretString::new(value.into()))
}
