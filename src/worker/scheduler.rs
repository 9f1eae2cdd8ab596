// src/worker/scheduler.rs
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::store::RunRecord;
use crate::worker::Worker;

/// One run on its own task, then the fixed pause. A failed run only shows up in
/// its record; a panicking one is recorded as an `error` run and the loop goes on.
async fn tick(worker: &Arc<Worker>, pause: Duration) -> RunRecord {
    let started_at = Utc::now();
    let task = {
        let worker = Arc::clone(worker);
        tokio::spawn(async move { worker.run_once().await })
    };
    let record = match task.await {
        Ok(record) => record,
        Err(e) => worker.record_aborted_run(started_at, &e.to_string()).await,
    };
    tokio::time::sleep(pause).await;
    record
}

/// Loop until the process is terminated, pausing `max(5s, poll interval)` between runs.
pub async fn run_forever(worker: Arc<Worker>) {
    let pause = worker.config().sleep_interval();
    tracing::info!(
        interval_seconds = pause.as_secs(),
        source_url = %worker.config().source_url,
        mirror_enabled = worker.config().mirror_enabled,
        "worker_start"
    );
    loop {
        tick(&worker, pause).await;
    }
}

/// Run exactly `runs` cycles with an explicit pause.
pub async fn run_cycles(worker: Arc<Worker>, pause: Duration, runs: usize) -> Vec<RunRecord> {
    let mut out = Vec::with_capacity(runs);
    for _ in 0..runs {
        out.push(tick(&worker, pause).await);
    }
    out
}

/// Spawn the endless loop on the runtime.
pub fn spawn_worker_loop(worker: Arc<Worker>) -> JoinHandle<()> {
    tokio::spawn(run_forever(worker))
}
