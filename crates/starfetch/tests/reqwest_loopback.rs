//! The real reqwest transports against a loopback HTTP server.

#![cfg(feature = "reqwest")]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread::JoinHandle;
use std::time::Duration;

use starfetch::{FetchConfig, GitHubClient};

/// Serve one canned response per entry, returning the raw request texts.
fn serve(responses: Vec<(u16, Vec<(&'static str, String)>, String)>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let handle = std::thread::spawn(move || {
        let mut requests = Vec::new();
        for (status, headers, body) in responses {
            let (mut stream, _) = listener.accept().expect("accept");
            stream
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("set_read_timeout");

            let mut buf = Vec::new();
            let mut tmp = [0u8; 4096];
            loop {
                match stream.read(&mut tmp) {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.extend_from_slice(&tmp[..n]);
                        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        break;
                    }
                    Err(e) => panic!("read request: {e}"),
                }
            }
            requests.push(String::from_utf8_lossy(&buf).into_owned());

            let mut head = format!(
                "HTTP/1.1 {status} STATUS\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                body.len()
            );
            for (name, value) in headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            stream.write_all(head.as_bytes()).expect("write headers");
            stream.write_all(body.as_bytes()).expect("write body");
            stream.flush().ok();
        }
        requests
    });

    (addr, handle)
}

fn page_body() -> String {
    serde_json::json!([{
        "id": 1,
        "name": "Hello-World",
        "full_name": "octocat/Hello-World",
        "html_url": "https://github.com/octocat/Hello-World",
        "stargazers_count": 80
    }])
    .to_string()
}

fn config(addr: SocketAddr) -> FetchConfig {
    FetchConfig::new("octocat")
        .with_base_url(format!("http://{addr}"))
        .with_retry_delay(Duration::from_millis(1))
        .with_request_delay(Duration::ZERO)
        .with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn async_transport_fetches_and_records_rate_limits() {
    let (addr, server) = serve(vec![(
        200,
        vec![
            ("X-RateLimit-Limit", "60".to_string()),
            ("X-RateLimit-Remaining", "59".to_string()),
            ("X-RateLimit-Reset", "1700000000".to_string()),
        ],
        page_body(),
    )]);

    let client = GitHubClient::new(config(addr), Some("secret".to_string())).expect("client");
    let repos = client.fetch_all("octocat").await.expect("fetch");

    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].full_name, "octocat/Hello-World");
    assert_eq!(client.tracker().remaining(), 59);

    let requests = server.join().expect("server thread");
    let request = requests[0].to_lowercase();
    assert!(
        request.starts_with(
            "get /users/octocat/starred?per_page=100&page=1&sort=updated&direction=desc "
        ),
        "unexpected request: {request:?}"
    );
    assert!(request.contains("accept: application/vnd.github+json"));
    assert!(request.contains("authorization: bearer secret"));
    assert!(request.contains("user-agent: starfetch/"));
}

#[test]
fn blocking_transport_retries_server_errors() {
    let (addr, server) = serve(vec![
        (503, Vec::new(), String::new()),
        (200, Vec::new(), page_body()),
    ]);

    let client = GitHubClient::new_blocking(config(addr), None).expect("client");
    let repos = client.fetch_all_blocking("octocat").expect("fetch");
    assert_eq!(repos.len(), 1);

    let requests = server.join().expect("server thread");
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].to_lowercase().contains("authorization:"));
}

#[test]
fn blocking_transport_reports_connection_failures() {
    // Bind then drop to get a port with nothing listening.
    let addr = TcpListener::bind("127.0.0.1:0")
        .expect("bind")
        .local_addr()
        .expect("local addr");

    let client = GitHubClient::new_blocking(config(addr).with_max_retries(1), None).expect("client");
    let err = client
        .fetch_all_blocking("octocat")
        .expect_err("nothing listening");
    assert!(matches!(err, starfetch::FetchError::Transport { .. }));
}
