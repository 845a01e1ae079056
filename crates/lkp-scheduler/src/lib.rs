// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cron-driven dataset scheduler.
//!
//! One dispatcher loop owns the trigger state: it loads dataset specs,
//! compiles their cron expressions, sleeps until the nearest fire, and
//! spawns one worker per fire. Workers serialize per dataset through an
//! owned mutex (a fire that finds the mutex held is skipped, not queued)
//! while distinct datasets run concurrently. Stopping the service cancels
//! all in-flight executions and waits out a bounded grace period.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Job building and execution.
pub mod runner;
/// Cron trigger computation.
pub mod trigger;

use chrono::{DateTime, Utc};
use cron::Schedule;
use lkp_config::load_datasets;
use lkp_core::{CancelToken, DatasetSpec};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub use runner::{DriverSourceResolver, FireOutcome, JobDeps, JobRunner, JobSummary, SourceResolver};
pub use trigger::{TriggerError, compile, next_fire};

/// Scheduler tunables from the host configuration.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Directory scanned for `dataset-*.json` files.
    pub datasets_dir: PathBuf,
    /// Poll interval for hot reload; `None` disables reloading.
    pub hot_reload_interval: Option<Duration>,
    /// How long shutdown waits for in-flight executions.
    pub shutdown_grace: Duration,
}

struct Entry {
    spec: Arc<DatasetSpec>,
    schedule: Schedule,
    next_fire: Option<DateTime<Utc>>,
    guard: Arc<tokio::sync::Mutex<()>>,
    fingerprint: u64,
}

fn fingerprint(spec: &DatasetSpec) -> u64 {
    let mut hasher = std::hash::DefaultHasher::new();
    serde_json::to_string(spec).unwrap_or_default().hash(&mut hasher);
    hasher.finish()
}

/// The dispatcher owning trigger state and worker spawning.
pub struct Scheduler {
    runner: Arc<JobRunner>,
    options: SchedulerOptions,
    entries: HashMap<String, Entry>,
    shutdown: CancelToken,
    workers: JoinSet<()>,
}

impl Scheduler {
    /// A scheduler over `deps`; call [`run`](Self::run) to start.
    #[must_use]
    pub fn new(deps: Arc<JobDeps>, options: SchedulerOptions) -> Self {
        Self {
            runner: Arc::new(JobRunner::new(deps)),
            options,
            entries: HashMap::new(),
            shutdown: CancelToken::new(),
            workers: JoinSet::new(),
        }
    }

    /// Token that stops the dispatcher and cancels in-flight executions.
    #[must_use]
    pub fn shutdown_token(&self) -> CancelToken {
        self.shutdown.clone()
    }

    /// Dataset ids with a registered trigger, sorted.
    #[must_use]
    pub fn registered(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Register (or re-register) a trigger for `spec`.
    ///
    /// Disabled specs never get a trigger. Re-registration replaces the
    /// previous schedule but keeps the exclusivity guard, so an active
    /// execution still blocks overlapping fires after a reload.
    pub fn register(&mut self, spec: DatasetSpec) -> Result<(), TriggerError> {
        if !spec.enabled {
            info!(
                target: "lakeport.scheduler",
                dataset_id = %spec.id,
                "dataset disabled; no trigger registered"
            );
            self.entries.remove(&spec.id);
            return Ok(());
        }

        let schedule = trigger::compile(&spec.cron)?;
        let now = Utc::now();
        let next = trigger::next_fire(&schedule, now);
        let print = fingerprint(&spec);
        let guard = self
            .entries
            .remove(&spec.id)
            .map_or_else(|| Arc::new(tokio::sync::Mutex::new(())), |old| old.guard);

        info!(
            target: "lakeport.scheduler",
            dataset_id = %spec.id,
            cron = %spec.cron,
            next_fire = %next.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".into()),
            "trigger registered"
        );
        self.entries.insert(
            spec.id.clone(),
            Entry {
                spec: Arc::new(spec),
                schedule,
                next_fire: next,
                guard,
                fingerprint: print,
            },
        );
        Ok(())
    }

    /// Unregister the trigger for `dataset_id`; an active execution is
    /// allowed to finish.
    pub fn unregister(&mut self, dataset_id: &str) {
        if self.entries.remove(dataset_id).is_some() {
            info!(
                target: "lakeport.scheduler",
                dataset_id,
                "trigger unregistered"
            );
        }
    }

    /// Load every spec from the datasets directory and register triggers.
    ///
    /// An unreadable directory yields an empty schedule rather than a
    /// startup failure.
    pub fn load_and_register(&mut self) {
        let specs = match load_datasets(&self.options.datasets_dir) {
            Ok(specs) => specs,
            Err(e) => {
                error!(
                    target: "lakeport.scheduler",
                    dir = %self.options.datasets_dir.display(),
                    error = %e,
                    "datasets directory could not be read; schedule is empty"
                );
                return;
            }
        };
        for spec in specs {
            let id = spec.id.clone();
            if let Err(e) = self.register(spec) {
                error!(
                    target: "lakeport.scheduler",
                    dataset_id = %id,
                    error = %e,
                    "trigger registration failed; dataset skipped"
                );
            }
        }
    }

    /// Re-scan the datasets directory and reconcile triggers: additions
    /// register, removals unregister, modifications reschedule.
    fn reload(&mut self) {
        let specs = match load_datasets(&self.options.datasets_dir) {
            Ok(specs) => specs,
            Err(e) => {
                warn!(
                    target: "lakeport.scheduler",
                    error = %e,
                    "hot reload scan failed; keeping the current schedule"
                );
                return;
            }
        };

        let mut seen: Vec<String> = Vec::with_capacity(specs.len());
        for spec in specs {
            seen.push(spec.id.clone());
            let changed = self
                .entries
                .get(&spec.id)
                .is_none_or(|entry| entry.fingerprint != fingerprint(&spec));
            let enabled = spec.enabled;
            if changed || !enabled {
                let id = spec.id.clone();
                if let Err(e) = self.register(spec) {
                    error!(
                        target: "lakeport.scheduler",
                        dataset_id = %id,
                        error = %e,
                        "reload registration failed; dataset skipped"
                    );
                }
            }
        }
        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !seen.contains(id))
            .cloned()
            .collect();
        for id in stale {
            self.unregister(&id);
        }
    }

    /// Fire every entry due at `now`; late fires run immediately.
    fn fire_due(&mut self, now: DateTime<Utc>) {
        for entry in self.entries.values_mut() {
            let Some(due) = entry.next_fire else { continue };
            if due > now {
                continue;
            }
            entry.next_fire = trigger::next_fire(&entry.schedule, now);

            let runner = Arc::clone(&self.runner);
            let spec = Arc::clone(&entry.spec);
            let guard = Arc::clone(&entry.guard);
            let shutdown = self.shutdown.clone();
            self.workers.spawn(async move {
                let _ = runner.fire(&spec, guard, &shutdown).await;
            });
        }
    }

    /// Duration until the nearest registered fire, bounded for loop
    /// responsiveness.
    fn sleep_until_next(&self, now: DateTime<Utc>) -> Duration {
        let nearest = self
            .entries
            .values()
            .filter_map(|e| e.next_fire)
            .min()
            .map_or(Duration::from_secs(1), |next| {
                (next - now).to_std().unwrap_or(Duration::ZERO)
            });
        nearest.min(Duration::from_secs(1)).max(Duration::from_millis(50))
    }

    /// Run the dispatcher until the shutdown token fires, then drain
    /// workers within the grace period.
    pub async fn run(mut self) {
        info!(
            target: "lakeport.scheduler",
            datasets = self.entries.len(),
            hot_reload = self.options.hot_reload_interval.is_some(),
            "scheduler started"
        );
        let mut last_reload = std::time::Instant::now();

        loop {
            let now = Utc::now();
            self.fire_due(now);

            if let Some(interval) = self.options.hot_reload_interval {
                if last_reload.elapsed() >= interval {
                    debug!(target: "lakeport.scheduler", "hot reload scan");
                    self.reload();
                    last_reload = std::time::Instant::now();
                }
            }

            // Reap finished workers without blocking the loop.
            while self.workers.try_join_next().is_some() {}

            let sleep = self.sleep_until_next(now);
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(sleep) => {}
            }
        }

        let grace = self.options.shutdown_grace;
        info!(
            target: "lakeport.scheduler",
            active = self.workers.len(),
            grace_secs = grace.as_secs(),
            "scheduler stopping; waiting for in-flight executions"
        );
        let drain = async {
            while self.workers.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(
                target: "lakeport.scheduler",
                "grace period elapsed with executions still active; abandoning them"
            );
        }
        info!(target: "lakeport.scheduler", "scheduler stopped");
    }
}
