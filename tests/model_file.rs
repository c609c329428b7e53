//! Speaker model files on disk.

use std::fs;
use voicectl::defaults::FEATURE_DIM;
use voicectl::model::file::HEADER;
use voicectl::{Model, ModelItem, SampleUtterance, VoicectlError};

fn model() -> Model {
    let frames = |len: usize, base: f32| -> Vec<[f32; FEATURE_DIM]> {
        (0..len).map(|i| [base + i as f32 * 0.25; FEATURE_DIM]).collect()
    };
    Model::new(vec![
        ModelItem::new("browser", "firefox &")
            .with_sample(SampleUtterance::new("b1", frames(12, 1.0)).with_waveform(vec![1, 0, 2, 0]))
            .with_sample(SampleUtterance::new("b2", frames(15, 1.5))),
        ModelItem::new("stop", "voicectl_off").with_sample(SampleUtterance::new("s1", frames(9, -2.0))),
    ])
}

#[test]
fn saved_model_loads_back_without_the_extension() {
    let dir = tempfile::tempdir().unwrap();
    model().save(&dir.path().join("words")).unwrap();
    assert!(dir.path().join("words.cvc").exists());
    assert!(!dir.path().join("words.cvc.tmp").exists());

    let loaded = Model::load(&dir.path().join("words"), true).unwrap();
    assert_eq!(loaded.items().len(), 2);
    assert_eq!(loaded.sample_count(), 3);
    assert_eq!(loaded.items()[0].label, "browser");
    assert_eq!(loaded.items()[1].command, "voicectl_off");
    assert_eq!(loaded.sample(1).id, "b2");
    assert_eq!(loaded.sample(1).frames, model().sample(1).frames);
    assert_eq!(loaded.sample(0).waveform.as_deref(), Some(&[1u8, 0, 2, 0][..]));
    assert_eq!(loaded.owner(2), 1);

    let lean = Model::load(&dir.path().join("words.cvc"), false).unwrap();
    assert!(lean.sample(0).waveform.is_none());
    assert_eq!(lean.sample(2).frames, model().sample(2).frames);
}

#[test]
fn corrupted_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("words.cvc");
    model().save(&path).unwrap();
    let bytes = fs::read(&path).unwrap();

    let mut bad_header = bytes.clone();
    bad_header[4] = b'X';
    fs::write(&path, &bad_header).unwrap();
    assert!(matches!(
        Model::load(&path, false),
        Err(VoicectlError::ModelFormat { .. })
    ));

    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
    assert!(matches!(
        Model::load(&path, true),
        Err(VoicectlError::ModelFormat { .. })
    ));

    // declared sample total one higher than the items hold
    let mut bad_total = bytes.clone();
    let at = 4 + HEADER.len();
    bad_total[at..at + 4].copy_from_slice(&4i32.to_le_bytes());
    fs::write(&path, &bad_total).unwrap();
    assert!(matches!(
        Model::load(&path, false),
        Err(VoicectlError::ModelFormat { .. })
    ));
}

#[test]
fn empty_model_round_trips_but_cannot_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.cvc");
    Model::default().save(&path).unwrap();

    let loaded = Model::load(&path, false).unwrap();
    assert_eq!(loaded.sample_count(), 0);
    assert!(matches!(loaded.validate(), Err(VoicectlError::EmptyModel)));
}
