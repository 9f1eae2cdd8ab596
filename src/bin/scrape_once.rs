//! Single cycle: fetch, extract, persist, audit, exit.
//! Exits 0 whatever the run status; the status lives in the runs table and logs.
//! The run record is the only thing on stdout; logs go to stderr.

use realtime_price_worker::logging::LogTarget;
use realtime_price_worker::{bootstrap, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = bootstrap(LogTarget::Stderr)?;
    let worker = Worker::from_config(cfg)?;
    let record = worker.run_once().await;
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}
