//! HTTP Adapter
//!
//! Minimal blocking HTTP/1.1 handling over `std::net` for the
//! `replybank-server` binary.
//!
//! Endpoints:
//! - GET  /                  - Welcome message
//! - GET  /health            - Liveness probe
//! - POST /generate-response - `{"query": "..."}` -> `QueryResponse`

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use serde_json::json;

use crate::engine::{EngineError, QueryRequest, ResponseEngine};

/// Welcome text for `GET /`
pub const WELCOME: &str = "Welcome to the Replybank Response Generation API!";

/// Largest accepted request body
const MAX_BODY: usize = 64 * 1024;

/// Response produced by [`route`]
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    fn json(status: u16, value: serde_json::Value) -> Self {
        HttpReply {
            status,
            body: value.to_string(),
        }
    }

    fn detail(status: u16, detail: impl Into<String>) -> Self {
        Self::json(status, json!({ "detail": detail.into() }))
    }
}

/// Dispatch a parsed request to the engine
pub fn route(engine: &ResponseEngine, method: &str, path: &str, body: &str) -> HttpReply {
    match (method, path) {
        ("GET", "/") => HttpReply::json(200, json!({ "message": WELCOME })),
        ("GET", "/health") => HttpReply::json(200, json!({ "status": "healthy" })),
        ("POST", "/generate-response") => generate_response(engine, body),
        (_, "/") | (_, "/health") | (_, "/generate-response") => {
            HttpReply::detail(405, "Method Not Allowed")
        }
        _ => HttpReply::detail(404, "Not Found"),
    }
}

fn generate_response(engine: &ResponseEngine, body: &str) -> HttpReply {
    let request: QueryRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => return HttpReply::detail(400, format!("Invalid request body: {}", e)),
    };

    match engine.respond(&request.query) {
        Ok(reply) => match serde_json::to_value(&reply) {
            Ok(value) => HttpReply::json(200, value),
            Err(e) => HttpReply::detail(500, format!("Error generating response: {}", e)),
        },
        Err(EngineError::EmptyQuery) => HttpReply::detail(400, "Query cannot be empty"),
        Err(e) => {
            log::error!("Error generating response: {}", e);
            HttpReply::detail(500, format!("Error generating response: {}", e))
        }
    }
}

/// Read one request from the stream, answer it and close
pub fn handle_connection(engine: &ResponseEngine, mut stream: TcpStream) {
    let mut reader = BufReader::new(&stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        send_reply(&mut stream, &HttpReply::detail(400, "Invalid request line"));
        return;
    }
    let method = parts[0].to_string();
    let path = parts[1].to_string();

    let mut content_length: usize = 0;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).is_err() {
            break;
        }
        let header = header.trim();
        if header.is_empty() {
            break;
        }
        if header.to_lowercase().starts_with("content-length:") {
            if let Some(len_str) = header.split(':').nth(1) {
                content_length = len_str.trim().parse().unwrap_or(0);
            }
        }
    }
    if content_length > MAX_BODY {
        send_reply(&mut stream, &HttpReply::detail(413, "Request body too large"));
        return;
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 && reader.read_exact(&mut body).is_err() {
        send_reply(&mut stream, &HttpReply::detail(400, "Truncated request body"));
        return;
    }
    let body = String::from_utf8_lossy(&body);

    let reply = route(engine, &method, &path, &body);
    log::info!("{} {} -> {}", method, path, reply.status);
    send_reply(&mut stream, &reply);
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}

fn send_reply(stream: &mut TcpStream, reply: &HttpReply) {
    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST\r\n\
         \r\n\
         {}",
        reply.status,
        status_text(reply.status),
        reply.body.len(),
        reply.body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplybankConfig;

    fn engine(dir: &tempfile::TempDir) -> ResponseEngine {
        let mut config = ReplybankConfig::default();
        config.engine.seed = Some(1);
        config.storage.data_file = dir.path().join("data.json");
        ResponseEngine::open(config).unwrap()
    }

    #[test]
    fn test_welcome_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(&dir);
        let reply = route(&e, "GET", "/", "");
        assert_eq!(reply.status, 200);
        assert!(reply.body.contains("Welcome"));
        assert_eq!(route(&e, "GET", "/health", "").status, 200);
    }

    #[test]
    fn test_generate_response() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(&dir);
        let reply = route(
            &e,
            "POST",
            "/generate-response",
            r#"{"query": "Where is my bus?"}"#,
        );
        assert_eq!(reply.status, 200);
        let value: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(value["query"], "Where is my bus?");
        assert_eq!(value["status"], "Success");
        assert!(!value["response"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(&dir);
        assert_eq!(
            route(&e, "POST", "/generate-response", r#"{"query": "  "}"#).status,
            400
        );
        assert_eq!(route(&e, "POST", "/generate-response", "nope").status, 400);
        assert_eq!(route(&e, "GET", "/generate-response", "").status, 405);
        assert_eq!(route(&e, "GET", "/missing", "").status, 404);
    }

    struct PanickingClusterer;

    impl crate::cluster::Clusterer for PanickingClusterer {
        fn fit(&mut self, _points: &[Vec<f32>], _k: usize) -> Vec<i32> {
            panic!("no centroids");
        }
    }

    #[test]
    fn test_handler_panic_returns_500() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ReplybankConfig::default();
        config.engine.seed = Some(1);
        config.engine.num_clusters = 1;
        config.engine.train_interval = 1;
        config.storage.data_file = dir.path().join("data.json");
        let e = ResponseEngine::open(config).unwrap();
        e.set_clusterer(Box::new(PanickingClusterer));

        let reply = route(
            &e,
            "POST",
            "/generate-response",
            r#"{"query": "Where is my bus?"}"#,
        );
        assert_eq!(reply.status, 500);
        assert!(reply.body.contains("Error generating response: no centroids"));
    }
}
