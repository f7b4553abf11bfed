//! One function per CLI subcommand.
//!
//! The cron-style commands (`signup`, `schedule`, `lookup`, `check`,
//! `notify`) load the snapshot, run exactly one sweep, and write the
//! snapshot back, so separate processes compose through the store file. The
//! daemon keeps one store in memory, runs the sweeps on a single loop
//! (which is what makes concurrent same-sweep runs impossible in-process),
//! and shares it with the unsubscribe service behind a mutex.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::oneshot;
use tracing::{error, info};

use keywatch_core::adapters::memory::MemoryStore;
use keywatch_core::ports::outbound::SystemTimeSource;
use keywatch_core::service::{
    ChangeDetector, ExpirySweep, LookupExecutor, Notifier, Scheduler, SignupProcessor,
};

use crate::adapters::{DirectoryFetcher, MailgunMailer, SignalCliSource};
use crate::config::WatchConfig;
use crate::snapshot;

fn mailer(config: &WatchConfig) -> MailgunMailer {
    MailgunMailer::new(
        config.mailgun_url.clone(),
        config.email_domain.clone(),
        &config.mailgun_api_key,
        config.email_from.clone(),
    )
}

fn fetcher(config: &WatchConfig) -> Result<DirectoryFetcher> {
    DirectoryFetcher::from_credentials_file(config.directory_url.clone(), &config.credentials_file)
        .context("failed to load directory credentials")
}

fn lookup_executor(config: &WatchConfig) -> LookupExecutor<SystemTimeSource> {
    LookupExecutor::new(
        SystemTimeSource,
        config.phone_number.as_str(),
        config.lookup_ip.clone(),
    )
}

/// `keywatch init`: create an empty snapshot store.
pub fn init(config: &WatchConfig) -> Result<()> {
    snapshot::init(&config.store_path)?;
    Ok(())
}

/// `keywatch signup`: poll signal-cli once and register every message.
pub fn signup(config: &WatchConfig) -> Result<()> {
    let mut store = snapshot::load(&config.store_path)?;
    let processor = SignupProcessor::new(
        SystemTimeSource,
        config.lookup_frequency_minutes,
        config.unsubscribe_url.clone(),
    )?;
    let mut source = SignalCliSource::new(config.phone_number.clone());

    let outcomes = processor.run(&mut store, &mailer(config), &mut source)?;
    snapshot::save(&config.store_path, &store)?;
    info!(registered = outcomes.len(), "signup done");
    Ok(())
}

/// `keywatch schedule`: create one jittered task per active user.
pub fn schedule(config: &WatchConfig) -> Result<()> {
    let mut store = snapshot::load(&config.store_path)?;
    let scheduler = Scheduler::new(SystemTimeSource, config.lookup_frequency_minutes)?;

    let tasks = scheduler.run(&mut store)?;
    snapshot::save(&config.store_path, &store)?;
    info!(scheduled = tasks.len(), "schedule done");
    Ok(())
}

/// `keywatch lookup`: expire overdue tasks, then execute the due ones.
pub fn lookup(config: &WatchConfig) -> Result<()> {
    let mut store = snapshot::load(&config.store_path)?;
    let fetcher = fetcher(config)?;
    let expiry = ExpirySweep::new(SystemTimeSource);

    let keys = lookup_executor(config).run(&mut store, &fetcher, &expiry)?;
    snapshot::save(&config.store_path, &store)?;
    info!(fetched = keys.len(), "lookup done");
    Ok(())
}

/// `keywatch check`: compare every unchecked key against its baseline.
pub fn check(config: &WatchConfig) -> Result<()> {
    let mut store = snapshot::load(&config.store_path)?;

    let changes = ChangeDetector::new().run(&mut store)?;
    snapshot::save(&config.store_path, &store)?;
    info!(changes = changes.len(), "check done");
    Ok(())
}

/// `keywatch notify`: email subscribers about every new change.
pub fn notify(config: &WatchConfig) -> Result<()> {
    let mut store = snapshot::load(&config.store_path)?;

    let sent = Notifier::new(SystemTimeSource).run(&mut store, &mailer(config))?;
    snapshot::save(&config.store_path, &store)?;
    info!(sent = sent.len(), "notify done");
    Ok(())
}

/// `keywatch serve`: run only the unsubscribe web service until Ctrl-C.
pub async fn serve(config: &WatchConfig) -> Result<()> {
    let store = Arc::new(Mutex::new(snapshot::load(&config.store_path)?));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = tokio::spawn(keywatch_gateway::serve(
        Arc::clone(&store),
        config.port,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(());
    server.await??;

    save_shared(&config.store_path, &store)?;
    Ok(())
}

/// `keywatch run`: the long-lived daemon. Lookup, check, and notify sweeps
/// run every minute; scheduling every lookup-frequency interval; the
/// unsubscribe service serves throughout, sharing the store.
///
/// Any error surfacing from a sweep here is a data-state error (transport
/// failures are already skipped inside the sweeps), so the daemon halts for
/// operator intervention rather than looping over an integrity bug.
pub async fn run_daemon(config: &WatchConfig) -> Result<()> {
    let store = Arc::new(Mutex::new(snapshot::load(&config.store_path)?));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = tokio::spawn(keywatch_gateway::serve(
        Arc::clone(&store),
        config.port,
        shutdown_rx,
    ));

    let mut sweep_tick = tokio::time::interval(Duration::from_secs(60));
    let mut schedule_tick = tokio::time::interval(Duration::from_secs(
        u64::from(config.lookup_frequency_minutes) * 60,
    ));

    let result = loop {
        tokio::select! {
            _ = sweep_tick.tick() => {
                if let Err(err) = run_pipeline_sweeps(config, &store).await {
                    error!(%err, "pipeline sweep failed, halting daemon");
                    break Err(err);
                }
            }
            _ = schedule_tick.tick() => {
                if let Err(err) = run_schedule_sweep(config, &store).await {
                    error!(%err, "schedule sweep failed, halting daemon");
                    break Err(err);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                info!("shutdown requested");
                break Ok(());
            }
        }
    };

    let _ = shutdown_tx.send(());
    server.await??;
    save_shared(&config.store_path, &store)?;
    result
}

/// Runs the lookup, check, and notify sweeps back to back on the blocking
/// pool, then persists the snapshot.
async fn run_pipeline_sweeps(
    config: &WatchConfig,
    store: &Arc<Mutex<MemoryStore>>,
) -> Result<()> {
    let config = config.clone();
    let store = Arc::clone(store);

    tokio::task::spawn_blocking(move || -> Result<()> {
        let fetcher = fetcher(&config)?;
        let mailer = mailer(&config);
        let executor = lookup_executor(&config);
        let expiry = ExpirySweep::new(SystemTimeSource);

        let mut guard = store.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
        executor.run(&mut *guard, &fetcher, &expiry)?;
        ChangeDetector::new().run(&mut *guard)?;
        Notifier::new(SystemTimeSource).run(&mut *guard, &mailer)?;
        snapshot::save(&config.store_path, &guard)?;
        Ok(())
    })
    .await?
}

async fn run_schedule_sweep(config: &WatchConfig, store: &Arc<Mutex<MemoryStore>>) -> Result<()> {
    let config = config.clone();
    let store = Arc::clone(store);

    tokio::task::spawn_blocking(move || -> Result<()> {
        let scheduler = Scheduler::new(SystemTimeSource, config.lookup_frequency_minutes)?;
        let mut guard = store.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
        scheduler.run(&mut *guard)?;
        snapshot::save(&config.store_path, &guard)?;
        Ok(())
    })
    .await?
}

fn save_shared(path: &std::path::Path, store: &Arc<Mutex<MemoryStore>>) -> Result<()> {
    let guard = store.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
    snapshot::save(path, &guard)?;
    Ok(())
}
