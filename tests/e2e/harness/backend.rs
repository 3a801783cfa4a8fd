//! Scripted chat-completions stub.
//!
//! A plain TCP listener speaking just enough HTTP/1.1 for the blocking
//! client: one request per connection, `Connection: close`. Responses are
//! consumed from a queue in push order; when the queue is empty the stub
//! answers `{}` (a response with no choices, i.e. "no suggestions").

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One scripted reply.
struct Reply {
    status: u16,
    body: String,
    delay: Option<Duration>,
}

pub struct ScriptedBackend {
    addr: String,
    queue: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<Value>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScriptedBackend {
    /// Binds an ephemeral port and starts serving.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub backend");
        let addr = listener.local_addr().expect("stub local addr").to_string();

        let queue: Arc<Mutex<VecDeque<Reply>>> = Arc::new(Mutex::new(VecDeque::new()));
        let requests: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));

        let q = queue.clone();
        let r = requests.clone();
        let run = running.clone();
        let handle = thread::spawn(move || {
            for stream in listener.incoming() {
                if !run.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                serve_one(stream, &q, &r);
            }
        });

        Self {
            addr,
            queue,
            requests,
            running,
            handle: Some(handle),
        }
    }

    /// Base URL to put into the project's backend config.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queues a 200 reply with the given JSON body.
    pub fn push_body(&self, body: impl Into<String>) {
        self.push(Reply {
            status: 200,
            body: body.into(),
            delay: None,
        });
    }

    /// Queues a non-success status reply.
    pub fn push_status(&self, status: u16, body: impl Into<String>) {
        self.push(Reply {
            status,
            body: body.into(),
            delay: None,
        });
    }

    /// Queues a 200 reply delivered after a delay.
    pub fn push_delayed(&self, body: impl Into<String>, delay: Duration) {
        self.push(Reply {
            status: 200,
            body: body.into(),
            delay: Some(delay),
        });
    }

    fn push(&self, reply: Reply) {
        self.queue.lock().unwrap().push_back(reply);
    }

    /// Every request body received so far, decoded as JSON.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Drop for ScriptedBackend {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Unblock the accept loop.
        let _ = TcpStream::connect(&self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve_one(stream: TcpStream, queue: &Mutex<VecDeque<Reply>>, requests: &Mutex<Vec<Value>>) {
    let mut reader = BufReader::new(stream);

    let mut content_length = 0usize;
    let mut line = String::new();
    // Request line + headers.
    loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
            .map(str::trim)
            .and_then(|v| v.parse::<usize>().ok())
        {
            content_length = value;
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 && reader.read_exact(&mut body).is_err() {
        return;
    }
    if let Ok(value) = serde_json::from_slice::<Value>(&body) {
        requests.lock().unwrap().push(value);
    }

    let reply = queue.lock().unwrap().pop_front().unwrap_or(Reply {
        status: 200,
        body: "{}".to_string(),
        delay: None,
    });
    if let Some(delay) = reply.delay {
        thread::sleep(delay);
    }

    let reason = if reply.status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reason,
        reply.body.len(),
        reply.body
    );
    let mut stream = reader.into_inner();
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

/// Response body carrying one tool call.
pub fn tool_call_body(name: &str, arguments: Value) -> String {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_0",
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": arguments.to_string()
                    }
                }]
            }
        }]
    })
    .to_string()
}

/// Response body carrying plain assistant content.
pub fn content_body(content: &str) -> String {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": content
            }
        }]
    })
    .to_string()
}
