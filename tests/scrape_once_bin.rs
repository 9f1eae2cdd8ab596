// tests/scrape_once_bin.rs
// Runs the single-cycle binary end to end against a local page.
use std::io::{Read, Write};
use std::net::TcpListener;
use std::process::Command;
use std::thread;

use realtime_price_worker::store::CanonicalStore;
use realtime_price_worker::{RunRecord, RunStatus};

const FULL_PAGE: &str = include_str!("fixtures/insee_page.html");

/// Serve `body` once on a fresh local port; returns the page URL.
fn serve_page_once(body: &'static str) -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/fr/statistiques/8669035", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = sock.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let resp = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(resp.as_bytes()).unwrap();
    });
    (url, handle)
}

#[test]
fn stdout_carries_only_the_run_record() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("canonical.db");
    let (url, server) = serve_page_once(FULL_PAGE);

    let out = Command::new(env!("CARGO_BIN_EXE_scrape-once"))
        .env_remove("WORKER_CONFIG_PATH")
        .env_remove("METRICS_ADDR")
        .env_remove("SQLITE_DB_PATH")
        .env("RUST_LOG", "info")
        .env("INSEE_SOURCE_URL", &url)
        .env("DB_PATH", db.display().to_string())
        .env("MIRROR_ENABLED", "false")
        .env("REALTIME_REQUEST_TIMEOUT_SECONDS", "5")
        .output()
        .expect("spawn scrape-once");
    server.join().unwrap();

    assert!(out.status.success(), "exit: {:?}", out.status);

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 1, "stdout: {stdout}");
    let record: RunRecord = serde_json::from_str(lines[0]).expect("run record json");
    assert_eq!(record.status, RunStatus::Ok);
    assert_eq!(record.source_url, url);
    assert_eq!(record.points_count, 6);

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("run_started"), "stderr: {stderr}");
    assert!(stderr.contains("run_done"), "stderr: {stderr}");

    let store = CanonicalStore::open(&db).unwrap();
    let runs = store.runs(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, record.run_id);
}
