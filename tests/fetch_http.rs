// tests/fetch_http.rs
// HttpFetcher against a throwaway local server.
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use realtime_price_worker::ingest::fetch::HttpFetcher;
use realtime_price_worker::{PageSource, WorkerError};

/// Accept one connection, capture the request head, answer with `response`.
async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/fr/statistiques/8669035", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let head = read_head(&mut sock).await;
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.shutdown().await.ok();
        head
    });
    (url, handle)
}

async fn read_head(sock: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

#[tokio::test]
async fn returns_body_and_sends_polite_headers() {
    let body = "<html><body><table><tr><td>2025-T2</td><td>1</td></tr></table></body></html>";
    let (url, server) = serve_once(http_response("200 OK", body)).await;

    let fetcher = HttpFetcher::new(url.clone(), Duration::from_secs(5)).unwrap();
    assert_eq!(fetcher.url(), url);

    let got = fetcher.fetch_page().await.expect("fetch ok");
    assert_eq!(got, body);

    let head = server.await.unwrap().to_lowercase();
    assert!(head.starts_with("get /fr/statistiques/8669035"), "{head}");
    assert!(head.contains("user-agent: realtime-price-worker/"), "{head}");
    assert!(head.contains("accept-language: fr-fr"), "{head}");
}

#[tokio::test]
async fn non_success_status_is_a_network_error() {
    let (url, _server) = serve_once(http_response("503 Service Unavailable", "")).await;
    let fetcher = HttpFetcher::new(url.clone(), Duration::from_secs(5)).unwrap();

    match fetcher.fetch_page().await {
        Err(WorkerError::Network { url: u, message }) => {
            assert_eq!(u, url);
            assert!(message.starts_with("status"), "{message}");
        }
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let _server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(sock);
    });

    let fetcher = HttpFetcher::new(url, Duration::from_millis(300)).unwrap();
    let err = fetcher.fetch_page().await.expect_err("should time out");
    let msg = err.to_string();
    assert!(msg.starts_with("NETWORK:"), "{msg}");
    assert!(msg.contains("timeout"), "{msg}");
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fetcher = HttpFetcher::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
    let err = fetcher.fetch_page().await.expect_err("should fail");
    assert!(matches!(err, WorkerError::Network { .. }), "{err}");
}
