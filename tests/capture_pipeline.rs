use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock};

use tempfile::tempdir;

use doorwatch::{
    AnimalDetection, AnimalKind, CaptureError, DetectionPipeline, FaceStore, MatchThresholds,
    Recognition, StubAnimalDetector, StubFaceEmbedder, StubSnapshotSource, EMBEDDING_DIM,
};

fn jpeg_frame(shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(32, 32, image::Rgb([shade, shade, shade]));
    let mut buf = Cursor::new(Vec::new());
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

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<RwLock<FaceStore>>,
}

impl Fixture {
    fn new(enrolled: &[(&str, Vec<f32>)]) -> Self {
        let dir = tempdir().expect("temp dir");
        let mut store = FaceStore::load(dir.path().join("known_faces.json")).expect("load store");
        for (name, embedding) in enrolled {
            store.enroll(name, embedding.clone()).expect("enroll");
        }
        Self {
            _dir: dir,
            store: Arc::new(RwLock::new(store)),
        }
    }

    fn pipeline(
        &self,
        source: StubSnapshotSource,
        detector: StubAnimalDetector,
        embedder: StubFaceEmbedder,
    ) -> DetectionPipeline {
        DetectionPipeline::new(
            Box::new(source),
            Arc::new(Mutex::new(detector)),
            Arc::new(Mutex::new(embedder)),
            self.store.clone(),
            MatchThresholds::default(),
            320,
        )
    }
}

#[test]
fn detected_animal_short_circuits_face_path() {
    let fixture = Fixture::new(&[]);
    let embedder = StubFaceEmbedder::with_embedding(unit_vector(0));
    let embed_calls = embedder.call_counter();

    let pipeline = fixture.pipeline(
        StubSnapshotSource::new(vec![Ok(jpeg_frame(10))]),
        StubAnimalDetector::with_detections(vec![
            AnimalDetection {
                kind: AnimalKind::Dog,
                confidence: 0.9,
            },
            AnimalDetection {
                kind: AnimalKind::Cat,
                confidence: 0.6,
            },
            AnimalDetection {
                kind: AnimalKind::Dog,
                confidence: 0.4,
            },
        ]),
        embedder,
    );

    let report = pipeline.run().expect("capture succeeds");
    assert_eq!(report.result, "Cat / Dog detected!");
    assert_eq!(
        report.recognition,
        Recognition::Animals(vec![AnimalKind::Cat, AnimalKind::Dog])
    );
    assert!(!report.jpeg.is_empty());
    assert_eq!(embed_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn frame_without_face_reports_normally() {
    let fixture = Fixture::new(&[]);
    let pipeline = fixture.pipeline(
        StubSnapshotSource::new(vec![Ok(jpeg_frame(20))]),
        StubAnimalDetector::empty(),
        StubFaceEmbedder::no_face(),
    );

    let report = pipeline.run().expect("capture succeeds");
    assert_eq!(report.result, "No human face detected.");
    assert_eq!(report.recognition, Recognition::NoFace);
}

#[test]
fn enrolled_face_matches_at_full_confidence() {
    let v = unit_vector(3);
    let fixture = Fixture::new(&[("bob", v.clone())]);
    let pipeline = fixture.pipeline(
        StubSnapshotSource::new(vec![Ok(jpeg_frame(30))]),
        StubAnimalDetector::empty(),
        StubFaceEmbedder::with_embedding(v),
    );

    let report = pipeline.run().expect("capture succeeds");
    assert_eq!(report.result, "bob (100.0%)");
    match report.recognition {
        Recognition::Known { name, confidence } => {
            assert_eq!(name, "bob");
            assert!((confidence - 100.0).abs() < 1e-3);
        }
        other => panic!("expected known recognition, got {other:?}"),
    }
}

#[test]
fn unknown_face_reports_intruder() {
    let fixture = Fixture::new(&[("bob", unit_vector(3))]);
    let pipeline = fixture.pipeline(
        StubSnapshotSource::new(vec![Ok(jpeg_frame(40))]),
        StubAnimalDetector::empty(),
        StubFaceEmbedder::with_embedding(unit_vector(7)),
    );

    let report = pipeline.run().expect("capture succeeds");
    assert_eq!(report.result, "Intruder detected!");
    assert_eq!(report.recognition, Recognition::Intruder);
}

#[test]
fn empty_store_reports_intruder() {
    let fixture = Fixture::new(&[]);
    let pipeline = fixture.pipeline(
        StubSnapshotSource::new(vec![Ok(jpeg_frame(50))]),
        StubAnimalDetector::empty(),
        StubFaceEmbedder::with_embedding(unit_vector(0)),
    );

    let report = pipeline.run().expect("capture succeeds");
    assert_eq!(report.recognition, Recognition::Intruder);
}

#[test]
fn unreachable_camera_is_a_fetch_failure() {
    let fixture = Fixture::new(&[]);
    let pipeline = fixture.pipeline(
        StubSnapshotSource::unreachable(),
        StubAnimalDetector::empty(),
        StubFaceEmbedder::no_face(),
    );

    match pipeline.run() {
        Err(CaptureError::FetchFailed(msg)) => assert!(msg.contains("unreachable")),
        other => panic!("expected fetch failure, got {other:?}"),
    }
}

#[test]
fn undecodable_frame_is_a_decode_failure() {
    let fixture = Fixture::new(&[]);
    let pipeline = fixture.pipeline(
        StubSnapshotSource::new(vec![Ok(b"definitely not a jpeg".to_vec())]),
        StubAnimalDetector::empty(),
        StubFaceEmbedder::no_face(),
    );

    assert!(matches!(pipeline.run(), Err(CaptureError::DecodeFailed(_))));
}
