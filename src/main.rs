//! Realtime price worker, continuous entrypoint.
//! Scrapes the configured INSEE page forever at the configured interval.

use std::sync::Arc;

use realtime_price_worker::worker::scheduler::spawn_worker_loop;
use realtime_price_worker::logging::LogTarget;
use realtime_price_worker::{bootstrap, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = bootstrap(LogTarget::Stdout)?;
    let worker = Arc::new(Worker::from_config(cfg)?);

    // The loop only ends with the process; a join error means it panicked.
    spawn_worker_loop(worker).await?;
    Ok(())
}
