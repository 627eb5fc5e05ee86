use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use cron::Schedule;
use secrecy::SecretString;
use tracing::{error, info};

use grove_prompting::config::EngineConfig;
use grove_prompting::engine::SmartPromptingEngine;
use grove_prompting::llm::{create_provider, LlmBackend, LlmConfig, ProviderClient};
use grove_prompting::store::{LibSqlBackend, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; optional rolling file log next to stderr.
    let _log_guard = init_tracing();

    let db_path =
        std::env::var("GROVE_DB_PATH").unwrap_or_else(|_| "./data/grove-prompting.db".to_string());
    let sweep_cron =
        std::env::var("GROVE_SWEEP_CRON").unwrap_or_else(|_| "0 0 * * * *".to_string());

    let provider = build_provider()?;

    eprintln!("🌳 Grove Prompting v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", db_path);
    eprintln!(
        "   Provider: {}",
        provider.as_ref().map(|p| p.name()).unwrap_or("none (demo mode)")
    );
    eprintln!("   Sweep schedule: {}", sweep_cron);

    let store: Arc<dyn Store> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .with_context(|| format!("failed to open database at {db_path}"))?,
    );

    let engine = SmartPromptingEngine::new(store.clone(), provider, EngineConfig::default());

    let schedule = Schedule::from_str(&sweep_cron)
        .with_context(|| format!("invalid GROVE_SWEEP_CRON: {sweep_cron}"))?;

    loop {
        let next = schedule
            .upcoming(Utc)
            .next()
            .context("cron schedule has no upcoming fire time")?;
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!(next = %next, "Sleeping until next sweep");
        tokio::time::sleep(wait).await;

        run_sweeps(&engine, store.as_ref()).await;
    }
}

/// One round of periodic maintenance: expiry cleanup, milestone checks per
/// active branch, then the proactive scheduling sweep. Each step logs and
/// continues on failure.
async fn run_sweeps(engine: &SmartPromptingEngine, store: &dyn Store) {
    match engine.cleanup_expired_prompts().await {
        Ok(deleted) => info!(deleted, "Expiry sweep finished"),
        Err(e) => error!(error = %e, "Expiry sweep failed"),
    }

    match store.active_memberships().await {
        Ok(memberships) => {
            let branches: HashSet<String> =
                memberships.into_iter().map(|m| m.branch_id).collect();
            for branch_id in branches {
                match engine.check_for_milestones(&branch_id).await {
                    Ok(created) if !created.is_empty() => {
                        info!(branch = %branch_id, created = created.len(), "Milestone sweep");
                    }
                    Ok(_) => {}
                    Err(e) => error!(branch = %branch_id, error = %e, "Milestone sweep failed"),
                }
            }
        }
        Err(e) => error!(error = %e, "Membership listing failed"),
    }

    match engine.schedule_proactive_prompts().await {
        Ok(report) => info!(
            generated = report.generated,
            skipped_pending = report.skipped_pending,
            skipped_recent = report.skipped_recent,
            "Scheduling sweep finished"
        ),
        Err(e) => error!(error = %e, "Scheduling sweep failed"),
    }
}

/// Provider from environment: GROVE_PROVIDER=anthropic|openai, unset for
/// demo mode.
fn build_provider() -> anyhow::Result<Option<Arc<dyn ProviderClient>>> {
    let backend = match std::env::var("GROVE_PROVIDER").ok().as_deref() {
        Some("anthropic") => LlmBackend::Anthropic,
        Some("openai") => LlmBackend::OpenAi,
        Some(other) => anyhow::bail!("unknown GROVE_PROVIDER: {other}"),
        None => return Ok(None),
    };

    let (key_var, default_model) = match backend {
        LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
        LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o-mini"),
    };
    let api_key = std::env::var(key_var)
        .with_context(|| format!("{key_var} must be set for this provider"))?;
    let model = std::env::var("GROVE_MODEL").unwrap_or_else(|_| default_model.to_string());

    let provider = create_provider(&LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model,
        base_url: std::env::var("GROVE_PROVIDER_BASE_URL").ok(),
    })?;
    Ok(Some(provider))
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Ok(dir) = std::env::var("GROVE_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "grove-prompting.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
        None
    }
}
