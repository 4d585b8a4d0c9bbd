//! One-shot HTTP server for exercising `RestClient` against canned replies.
//! Each reply is served on its own connection, in order.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

/// A request as the server saw it: the head lowercased, plus the body.
#[derive(Debug, Clone)]
pub(crate) struct Received {
    pub(crate) head: String,
    pub(crate) body: String,
}

pub(crate) struct TestServer {
    url: String,
    received: Arc<Mutex<Vec<Received>>>,
    worker: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Serve exactly `replies.len()` requests, answering each with the next
    /// `(status, json body)` pair.
    pub(crate) fn serve(replies: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        let worker = thread::spawn(move || {
            for (status, body) in replies {
                let (mut stream, _) = listener.accept().unwrap();
                let request = read_request(&mut BufReader::new(stream.try_clone().unwrap()));
                log.lock().push(request);
                let reply = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason(status),
                    body.len(),
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });

        Self {
            url,
            received,
            worker: Some(worker),
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Wait until every reply has been served and return what was asked.
    pub(crate) fn finish(mut self) -> Vec<Received> {
        if let Some(worker) = self.worker.take() {
            worker.join().unwrap();
        }
        self.received.lock().clone()
    }
}

fn read_request(reader: &mut impl BufRead) -> Received {
    let mut head = String::new();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let lowered = line.to_ascii_lowercase();
        if let Some(value) = lowered.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap();
        }
        if line == "\r\n" || line.is_empty() {
            break;
        }
        head.push_str(&lowered);
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).unwrap();
    Received {
        head,
        body: String::from_utf8(body).unwrap(),
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        _ => "Status",
    }
}
