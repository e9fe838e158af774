//! Scripted transport and a loopback HTTP server for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use super::{Request, Response, Transport};
use crate::error::{AppError, Result};

type Handler = Box<dyn Fn(&Request) -> Result<Response> + Send + Sync>;

/// Transport answering every request with a closure and recording it.
pub struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&Request) -> Result<Response> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// 200 response with the given body.
pub fn ok(body: impl Into<Vec<u8>>) -> Result<Response> {
    Ok(Response {
        status: 200,
        body: body.into(),
    })
}

/// Error shaped like a non-2xx response.
pub fn status(code: u16) -> Result<Response> {
    Err(AppError::transport(
        "mock",
        format!("unexpected status code: {code}"),
    ))
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let result = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        result
    }
}

/// A request received by [`serve`].
#[derive(Debug, Clone)]
pub struct Received {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Serve HTTP/1.1 on a loopback port, answering each request with `reply`.
///
/// Returns the base URL and the requests received so far.
pub async fn serve<F>(reply: F) -> (String, Arc<Mutex<Vec<Received>>>)
where
    F: Fn(&Received) -> (u16, Vec<u8>) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let reply = Arc::new(reply);
    let log = Arc::clone(&received);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let reply = Arc::clone(&reply);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let _ = answer(stream, reply.as_ref(), &log).await;
            });
        }
    });

    (format!("http://{addr}"), received)
}

async fn answer<F>(stream: TcpStream, reply: &F, log: &Mutex<Vec<Received>>) -> std::io::Result<()>
where
    F: Fn(&Received) -> (u16, Vec<u8>),
{
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await?;

    let request = Received { method, path, body };
    let (status, payload) = reply(&request);
    let is_head = request.method == "HEAD";
    log.lock().unwrap().push(request);

    let mut stream = reader.into_inner();
    let head = format!(
        "HTTP/1.1 {status} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    );
    stream.write_all(head.as_bytes()).await?;
    if !is_head {
        stream.write_all(&payload).await?;
    }
    stream.shutdown().await
}
