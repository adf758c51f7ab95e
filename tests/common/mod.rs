//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use quantum_gateway::{GatewayConfig, HttpServer, Shutdown};

/// Start the gateway on an ephemeral port. The returned `Shutdown` must be
/// kept alive for the duration of the test.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (_updates_tx, updates_rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config);
    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    // Wait for the server to start accepting.
    tokio::time::sleep(Duration::from_millis(200)).await;
    (addr, shutdown)
}

/// Start a backend that answers every request with a fixed 200 body.
#[allow(dead_code)]
pub async fn start_echo_backend(response_body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = read_full_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response_body.len(),
                    response_body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that answers each request by echoing its body back.
#[allow(dead_code)]
pub async fn start_body_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Some(request) = read_full_request(&mut socket).await else {
                    return;
                };
                let body_start = find_headers_end(&request).unwrap_or(request.len());
                let body = &request[body_start..];
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// One read's worth of request body bytes, with its arrival time.
#[derive(Debug, Clone)]
pub struct BodyArrival {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

/// What a recording backend saw for one request.
#[derive(Debug, Default)]
pub struct Recording {
    pub headers_done_at: Option<Instant>,
    pub arrivals: Vec<BodyArrival>,
}

impl Recording {
    pub fn body(&self) -> Vec<u8> {
        self.arrivals
            .iter()
            .flat_map(|a| a.bytes.iter().copied())
            .collect()
    }
}

/// Start a backend that records when request body bytes arrive, then
/// answers 200. One recording entry per accepted connection read.
pub async fn start_recording_backend() -> (SocketAddr, Arc<Mutex<Recording>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recording = Arc::new(Mutex::new(Recording::default()));
    let shared = recording.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let shared = shared.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let mut seen = Vec::new();
                let mut body_start = None;
                let mut content_length = 0usize;

                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    let now = Instant::now();
                    let previously_seen = seen.len();
                    seen.extend_from_slice(&buf[..n]);

                    if body_start.is_none() {
                        if let Some(end) = find_headers_end(&seen) {
                            body_start = Some(end);
                            content_length = parse_content_length(&seen[..end]).unwrap_or(0);
                            let mut rec = shared.lock().unwrap();
                            rec.headers_done_at = Some(now);
                            if seen.len() > end {
                                rec.arrivals.push(BodyArrival {
                                    at: now,
                                    bytes: seen[end..].to_vec(),
                                });
                            }
                        }
                    } else {
                        shared.lock().unwrap().arrivals.push(BodyArrival {
                            at: now,
                            bytes: seen[previously_seen..].to_vec(),
                        });
                    }

                    if let Some(start) = body_start {
                        if seen.len() - start >= content_length {
                            break;
                        }
                    }
                }

                let response = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, recording)
}

#[allow(dead_code)]
async fn read_full_request(socket: &mut tokio::net::TcpStream) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 16 * 1024];
    let mut seen = Vec::new();
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        seen.extend_from_slice(&buf[..n]);
        if let Some(end) = find_headers_end(&seen) {
            let need = parse_content_length(&seen[..end]).unwrap_or(0);
            if seen.len() - end >= need {
                return Some(seen);
            }
        }
    }
    None
}

fn find_headers_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn parse_content_length(headers: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(headers).ok()?;
    text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse().ok())?
    })
}
