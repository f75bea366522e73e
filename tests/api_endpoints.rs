use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde_json::Value;
use tempfile::tempdir;

use doorwatch::api::{ApiConfig, ApiContext, ApiHandle, ApiServer};
use doorwatch::{
    AutoCaptureFlag, CaptureReport, DetectionPipeline, DoorLock, FaceStore, LatestCapture,
    MatchThresholds, Recognition, SharedEmbedder, StubAnimalDetector, StubFaceEmbedder,
    StubSnapshotSource, EMBEDDING_DIM,
};

fn jpeg_frame(shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(16, 16, image::Rgb([shade, shade, shade]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .expect("encode jpeg");
    buf.into_inner()
}

fn unit_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[axis] = 1.0;
    v
}

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

struct TestApi {
    _dir: tempfile::TempDir,
    handle: Option<ApiHandle>,
    store: Arc<RwLock<FaceStore>>,
    store_path: PathBuf,
    latest: LatestCapture,
    door_readback: std::fs::File,
}

impl TestApi {
    fn new(
        source: StubSnapshotSource,
        embedder: StubFaceEmbedder,
        enrolled: &[(&str, Vec<f32>)],
    ) -> Result<Self> {
        let dir = tempdir()?;
        let store_path = dir.path().join("known_faces.json");
        let mut store = FaceStore::load(&store_path)?;
        for (name, embedding) in enrolled {
            store.enroll(name, embedding.clone())?;
        }
        let store = Arc::new(RwLock::new(store));

        let door_file = tempfile::tempfile()?;
        let door_readback = door_file.try_clone()?;
        let door = DoorLock::new(door_file);

        let latest = LatestCapture::new();
        let embedder: SharedEmbedder = Arc::new(Mutex::new(embedder));
        let pipeline = Arc::new(DetectionPipeline::new(
            Box::new(source),
            Arc::new(Mutex::new(StubAnimalDetector::empty())),
            embedder.clone(),
            store.clone(),
            MatchThresholds::default(),
            320,
        ));

        let ctx = ApiContext {
            pipeline,
            store: store.clone(),
            embedder,
            door,
            auto_capture: AutoCaptureFlag::new(true),
            latest: latest.clone(),
        };
        let handle = ApiServer::new(
            ApiConfig {
                addr: "127.0.0.1:0".to_string(),
            },
            ctx,
        )
        .spawn()?;

        Ok(Self {
            _dir: dir,
            handle: Some(handle),
            store,
            store_path,
            latest,
            door_readback,
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn get(&self, path: &str) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes())?;
        read_response(&mut stream)
    }

    fn send_raw(&self, request: &[u8]) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        stream.write_all(request)?;
        read_response(&mut stream)
    }

    fn door_commands(&mut self) -> String {
        use std::io::Seek;
        let mut written = String::new();
        self.door_readback.rewind().expect("rewind door file");
        self.door_readback
            .read_to_string(&mut written)
            .expect("read door file");
        written
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn multipart_request(boundary: &str, name: Option<&str>, image: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(name) = name {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"face.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let mut request = format!(
        "POST /add_face HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; \
         boundary={boundary}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(&body);
    request
}

#[test]
fn health_endpoint_is_ok() -> Result<()> {
    let api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    let (headers, body) = api.get("/health")?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains(r#""status":"ok""#));
    Ok(())
}

#[test]
fn control_page_is_served_at_root() -> Result<()> {
    let api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    let (headers, body) = api.get("/")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("text/html"));
    assert!(body.contains("doorwatch"));
    Ok(())
}

#[test]
fn unknown_route_is_not_found() -> Result<()> {
    let api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    let (headers, body) = api.get("/nope")?;
    assert!(headers.contains("404 Not Found"));
    assert!(body.contains("not_found"));
    Ok(())
}

#[test]
fn wrong_method_is_rejected() -> Result<()> {
    let api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    let request = b"POST /capture HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n";
    let (headers, _body) = api.send_raw(request)?;
    assert!(headers.contains("405 Method Not Allowed"));
    Ok(())
}

#[test]
fn capture_returns_error_when_camera_unreachable() -> Result<()> {
    let api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    let (headers, body) = api.get("/capture")?;
    assert!(headers.contains("500 Internal Server Error"));
    let value: Value = serde_json::from_str(&body)?;
    assert!(value["error"]
        .as_str()
        .unwrap()
        .contains("failed to fetch frame"));
    Ok(())
}

#[test]
fn capture_returns_result_and_decodable_image() -> Result<()> {
    let api = TestApi::new(
        StubSnapshotSource::new(vec![Ok(jpeg_frame(90))]),
        StubFaceEmbedder::no_face(),
        &[],
    )?;

    let (headers, body) = api.get("/capture")?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["result"], "No human face detected.");

    let jpeg = BASE64_STANDARD.decode(value["image"].as_str().unwrap())?;
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    Ok(())
}

#[test]
fn capture_recognizes_enrolled_face() -> Result<()> {
    let v = unit_vector(2);
    let api = TestApi::new(
        StubSnapshotSource::new(vec![Ok(jpeg_frame(80))]),
        StubFaceEmbedder::with_embedding(v.clone()),
        &[("bob", v)],
    )?;

    let (headers, body) = api.get("/capture")?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["result"], "bob (100.0%)");
    Ok(())
}

#[test]
fn toggle_auto_flips_the_flag() -> Result<()> {
    let api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    let (_, body) = api.get("/toggle_auto")?;
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["enabled"], false);

    let (_, body) = api.get("/toggle_auto")?;
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["enabled"], true);
    Ok(())
}

#[test]
fn latest_capture_is_null_before_any_motion_cycle() -> Result<()> {
    let api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    let (headers, body) = api.get("/latest_capture")?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert!(value["result"].is_null());
    assert!(value["image"].is_null());
    Ok(())
}

#[test]
fn latest_capture_returns_stored_report() -> Result<()> {
    let api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    api.latest.store(Ok(CaptureReport {
        result: "bob (99.0%)".to_string(),
        jpeg: jpeg_frame(70),
        recognition: Recognition::Known {
            name: "bob".to_string(),
            confidence: 99.0,
        },
    }));

    let (headers, body) = api.get("/latest_capture")?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["result"], "bob (99.0%)");
    assert!(value["image"].as_str().is_some());
    Ok(())
}

#[test]
fn unlock_and_lock_send_serial_commands() -> Result<()> {
    let mut api = TestApi::new(StubSnapshotSource::unreachable(), StubFaceEmbedder::no_face(), &[])?;

    let (headers, body) = api.get("/unlock_door")?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains("Door unlocked"));

    let (_, body) = api.get("/lock_door")?;
    assert!(body.contains("Door locked"));

    assert_eq!(api.door_commands(), "SERVO_ON\nSERVO_LOCK\n");
    Ok(())
}

#[test]
fn add_face_enrolls_and_persists() -> Result<()> {
    let api = TestApi::new(
        StubSnapshotSource::unreachable(),
        StubFaceEmbedder::with_embedding(unit_vector(5)),
        &[],
    )?;

    let request = multipart_request("XBOUND", Some("bob"), Some(&jpeg_frame(60)));
    let (headers, body) = api.send_raw(&request)?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["status"], "success");
    assert!(value["message"].as_str().unwrap().contains("bob"));

    let store = api.store.read().unwrap();
    assert!(store.faces().contains_key("bob"));
    assert!(api.store_path.exists());
    Ok(())
}

#[test]
fn add_face_requires_name_and_image() -> Result<()> {
    let api = TestApi::new(
        StubSnapshotSource::unreachable(),
        StubFaceEmbedder::with_embedding(unit_vector(5)),
        &[],
    )?;

    let request = multipart_request("XBOUND", None, Some(&jpeg_frame(60)));
    let (headers, body) = api.send_raw(&request)?;
    assert!(headers.contains("400 Bad Request"));
    assert!(body.contains("Name and image required"));
    Ok(())
}

#[test]
fn add_face_without_face_is_rejected() -> Result<()> {
    let api = TestApi::new(
        StubSnapshotSource::unreachable(),
        StubFaceEmbedder::no_face(),
        &[],
    )?;

    let request = multipart_request("XBOUND", Some("bob"), Some(&jpeg_frame(60)));
    let (headers, body) = api.send_raw(&request)?;
    assert!(headers.contains("400 Bad Request"));
    assert!(body.contains("no face detected"));
    assert!(api.store.read().unwrap().is_empty());
    Ok(())
}
