//! HTTP control surface.
//!
//! A small hand-rolled HTTP/1.1 server exposing manual capture, enrollment,
//! lock control, the auto-capture toggle, and the latest asynchronous
//! capture result. Handlers are deliberately unauthenticated; the server is
//! meant to sit on a trusted home network.

mod multipart;
mod page;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::embed::SharedEmbedder;
use crate::pipeline::{CaptureError, CaptureReport, DetectionPipeline};
use crate::serial::DoorLock;
use crate::store::FaceStore;
use crate::{AutoCaptureFlag, LatestCapture};

const MAX_HEADER_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8760".to_string(),
        }
    }
}

/// Shared handles the request handlers operate on.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<DetectionPipeline>,
    pub store: Arc<RwLock<FaceStore>>,
    pub embedder: SharedEmbedder,
    pub door: DoorLock,
    pub auto_capture: AutoCaptureFlag,
    pub latest: LatestCapture,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    ctx: ApiContext,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, ctx: ApiContext) -> Self {
        Self { cfg, ctx }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let ctx = self.ctx;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, ctx, shutdown_thread) {
                log::error!("control api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, ctx: ApiContext, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &ctx) {
                    log::warn!("control api request failed: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CapturePayload<'a> {
    result: &'a str,
    image: String,
}

#[derive(Serialize)]
struct LatestPayload {
    result: Option<String>,
    image: Option<String>,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct EnrollPayload {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct TogglePayload {
    enabled: bool,
}

#[derive(Serialize)]
struct MessagePayload {
    message: &'static str,
}

fn handle_connection(mut stream: TcpStream, ctx: &ApiContext) -> Result<()> {
    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            page::CONTROL_PAGE.as_bytes(),
        ),
        ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("GET", "/capture") => handle_capture(&mut stream, ctx),
        ("GET", "/latest_capture") => handle_latest(&mut stream, ctx),
        ("GET", "/toggle_auto") => {
            let enabled = ctx.auto_capture.toggle();
            log::info!("auto-capture {}", if enabled { "enabled" } else { "disabled" });
            write_json_payload(&mut stream, 200, &TogglePayload { enabled })
        }
        ("GET", "/unlock_door") => {
            ctx.door.unlock();
            write_json_payload(
                &mut stream,
                200,
                &MessagePayload {
                    message: "Door unlocked",
                },
            )
        }
        ("GET", "/lock_door") => {
            ctx.door.lock();
            write_json_payload(
                &mut stream,
                200,
                &MessagePayload {
                    message: "Door locked",
                },
            )
        }
        ("POST", "/add_face") => handle_add_face(&mut stream, ctx, &request),
        (
            _,
            "/" | "/health" | "/capture" | "/latest_capture" | "/toggle_auto" | "/unlock_door"
            | "/lock_door" | "/add_face",
        ) => write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#),
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn handle_capture(stream: &mut TcpStream, ctx: &ApiContext) -> Result<()> {
    match ctx.pipeline.run() {
        Ok(report) => write_capture_report(stream, &report),
        Err(err) => {
            log::warn!("manual capture failed: {}", err);
            let message = err.to_string();
            write_json_payload(stream, 500, &ErrorPayload { error: &message })
        }
    }
}

fn handle_latest(stream: &mut TcpStream, ctx: &ApiContext) -> Result<()> {
    match ctx.latest.snapshot() {
        Some(Ok(report)) => write_capture_report(stream, &report),
        Some(Err(err)) => {
            let message = err.to_string();
            write_json_payload(stream, 200, &ErrorPayload { error: &message })
        }
        None => write_json_payload(
            stream,
            200,
            &LatestPayload {
                result: None,
                image: None,
            },
        ),
    }
}

fn write_capture_report(stream: &mut TcpStream, report: &CaptureReport) -> Result<()> {
    let payload = CapturePayload {
        result: &report.result,
        image: BASE64_STANDARD.encode(&report.jpeg),
    };
    write_json_payload(stream, 200, &payload)
}

fn handle_add_face(stream: &mut TcpStream, ctx: &ApiContext, request: &HttpRequest) -> Result<()> {
    let boundary = request
        .headers
        .get("content-type")
        .and_then(|value| multipart::boundary(value));
    let Some(boundary) = boundary else {
        return write_json_payload(
            stream,
            400,
            &ErrorPayload {
                error: "expected multipart/form-data",
            },
        );
    };

    let parts = match multipart::parse(&request.body, &boundary) {
        Ok(parts) => parts,
        Err(err) => {
            log::warn!("malformed enrollment request: {err:#}");
            return write_json_payload(
                stream,
                400,
                &ErrorPayload {
                    error: "malformed multipart body",
                },
            );
        }
    };

    let name = parts
        .iter()
        .find(|part| part.name == "name")
        .and_then(|part| std::str::from_utf8(&part.data).ok())
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let image = parts
        .iter()
        .find(|part| part.name == "image")
        .map(|part| part.data.as_slice())
        .filter(|data| !data.is_empty());
    let (Some(name), Some(image)) = (name, image) else {
        return write_json_payload(
            stream,
            400,
            &ErrorPayload {
                error: "Name and image required",
            },
        );
    };

    let frame = match image::load_from_memory(image) {
        Ok(frame) => frame,
        Err(err) => {
            let message = CaptureError::DecodeFailed(err.to_string()).to_string();
            return write_json_payload(stream, 400, &ErrorPayload { error: &message });
        }
    };

    let embedding = {
        let mut embedder = ctx
            .embedder
            .lock()
            .map_err(|_| anyhow!("face embedder lock poisoned"))?;
        match embedder.embed(&frame) {
            Ok(Some(embedding)) => embedding,
            Ok(None) => {
                let message = CaptureError::NoFaceDetected.to_string();
                return write_json_payload(stream, 400, &ErrorPayload { error: &message });
            }
            Err(err) => {
                log::warn!("enrollment embedding failed: {err:#}");
                let message = CaptureError::NoFaceDetected.to_string();
                return write_json_payload(stream, 400, &ErrorPayload { error: &message });
            }
        }
    };

    let enrolled = {
        let mut store = ctx
            .store
            .write()
            .map_err(|_| anyhow!("face store lock poisoned"))?;
        store.enroll(name, embedding)
    };
    if let Err(err) = enrolled {
        log::error!("enrollment failed for '{}': {err:#}", name);
        let message = err.to_string();
        return write_json_payload(stream, 500, &ErrorPayload { error: &message });
    }

    log::info!("enrolled face for '{}'", name);
    write_json_payload(
        stream,
        200,
        &EnrollPayload {
            status: "success",
            message: format!("Added/Updated {name}."),
        },
    )
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();

    let header_end = loop {
        if let Some(pos) = multipart::find_subslice(&data, b"\r\n\r\n") {
            break pos + 4;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before headers completed"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let (method, raw_path, headers) = {
        let text = String::from_utf8_lossy(&data[..header_end]);
        let mut lines = text.split("\r\n");
        let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| anyhow!("missing method"))?
            .to_string();
        let raw_path = parts
            .next()
            .ok_or_else(|| anyhow!("missing path"))?
            .to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':') {
                headers.insert(k.trim().to_lowercase(), v.trim().to_string());
            }
        }
        (method, raw_path, headers)
    };

    let content_length: usize = headers
        .get("content-length")
        .map(|value| value.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length"))?
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(anyhow!("request body too large"));
    }

    while data.len() < header_end + content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before body completed"));
        }
        data.extend_from_slice(&buf[..n]);
    }
    let body = data[header_end..header_end + content_length].to_vec();

    let path = raw_path
        .split('?')
        .next()
        .unwrap_or(raw_path.as_str())
        .to_string();
    Ok(HttpRequest {
        method,
        path,
        headers,
        body,
    })
}

fn write_json_payload<T: Serialize>(stream: &mut TcpStream, status: u16, payload: &T) -> Result<()> {
    let body = serde_json::to_vec(payload)?;
    write_response(stream, status, "application/json", &body)
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}
