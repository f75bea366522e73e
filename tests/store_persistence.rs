use std::collections::HashMap;

use tempfile::tempdir;

use doorwatch::{FaceStore, EMBEDDING_DIM};

fn unit_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[axis] = 1.0;
    v
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[test]
fn absent_file_loads_empty_store() {
    let dir = tempdir().expect("temp dir");
    let store = FaceStore::load(dir.path().join("known_faces.json")).expect("load");
    assert!(store.is_empty());
}

#[test]
fn legacy_wrapped_records_migrate_on_load() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("known_faces.json");

    let legacy = r#"{"alice": {"embedding": [1.0, 0.0, 0.5]}, "bob": [0.0, 1.0, 0.0]}"#;
    std::fs::write(&path, legacy).expect("write legacy store");

    let store = FaceStore::load(&path).expect("load");
    assert_eq!(store.faces()["alice"], vec![1.0, 0.0, 0.5]);
    assert_eq!(store.faces()["bob"], vec![0.0, 1.0, 0.0]);

    // The file is rewritten in the bare shape immediately after load.
    let healed = std::fs::read_to_string(&path).expect("read healed store");
    let parsed: HashMap<String, Vec<f32>> =
        serde_json::from_str(&healed).expect("healed store is bare vectors");
    assert_eq!(parsed["alice"], vec![1.0, 0.0, 0.5]);
    assert!(!healed.contains("embedding"));
}

#[test]
fn enroll_normalizes_and_persists() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("known_faces.json");

    let mut store = FaceStore::load(&path).expect("load");
    let mut scaled = unit_vector(0);
    scaled[0] = 7.5;
    store.enroll("carol", scaled).expect("enroll");

    assert!((norm(&store.faces()["carol"]) - 1.0).abs() < 1e-4);

    // Persisted synchronously: a fresh load sees the same vector.
    let reloaded = FaceStore::load(&path).expect("reload");
    assert_eq!(reloaded.faces()["carol"], store.faces()["carol"]);
}

#[test]
fn reenrollment_averages_then_normalizes() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("known_faces.json");

    let mut store = FaceStore::load(&path).expect("load");
    store.enroll("dave", unit_vector(0)).expect("first enroll");
    store.enroll("dave", unit_vector(1)).expect("second enroll");

    let merged = &store.faces()["dave"];
    let expected = 1.0 / 2.0f32.sqrt();
    assert!((merged[0] - expected).abs() < 1e-3);
    assert!((merged[1] - expected).abs() < 1e-3);
    assert!((norm(merged) - 1.0).abs() < 1e-4);
    assert_eq!(store.len(), 1);
}

#[test]
fn enroll_rejects_wrong_dimension() {
    let dir = tempdir().expect("temp dir");
    let mut store = FaceStore::load(dir.path().join("known_faces.json")).expect("load");

    let err = store.enroll("eve", vec![1.0, 2.0, 3.0]).unwrap_err();
    assert!(err.to_string().contains("dimensions"));
    assert!(store.is_empty());
}

#[test]
fn save_replaces_the_whole_file() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("known_faces.json");

    let mut store = FaceStore::load(&path).expect("load");
    store.enroll("frank", unit_vector(0)).expect("enroll frank");
    store.enroll("grace", unit_vector(1)).expect("enroll grace");

    let raw = std::fs::read_to_string(&path).expect("read store");
    let parsed: HashMap<String, Vec<f32>> = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(parsed.len(), 2);
    assert!(!path.with_extension("tmp").exists());
}
