//! Runner tests over an image-directory source with a detection sidecar.

use std::path::Path;
use std::sync::Arc;

use crowdwatch_media::{DetectionSidecar, GeometricDensity, ImageDirSource};
use crowdwatch_pipeline::{
    run_stream, JsonLinesSink, MemorySink, PipelineConfig, SessionModels, StreamSession,
    TelemetryEvent,
};
use image::{Rgb, RgbImage};

/// A dark frame with a bright square at `offset`.
fn write_frame(dir: &Path, index: usize, offset: u32) {
    let mut image = RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]));
    for y in 10..22 {
        for x in offset..offset + 12 {
            image.put_pixel(x, y, Rgb([240, 240, 240]));
        }
    }
    image.save(dir.join(format!("frame_{index:03}.png"))).unwrap();
}

fn write_sidecar(path: &Path) {
    let lines = [
        r#"{"frame":0,"detections":[{"track_id":1,"class_label":"person","bbox":[0,0,5,5]}]}"#,
        r#"{"frame":1,"detections":[{"track_id":1,"class_label":"person"},{"track_id":2,"class_label":"person"}]}"#,
        "this line is not json",
        r#"{"frame":3,"detections":[{"track_id":3,"class_label":"person"},{"track_id":7,"class_label":"bicycle"}]}"#,
    ];
    std::fs::write(path, lines.join("\n")).unwrap();
}

fn models() -> SessionModels {
    SessionModels::new(Arc::new(GeometricDensity::default()), None)
}

#[tokio::test]
async fn test_run_stream_over_image_directory() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    for i in 0..5 {
        write_frame(&frames, i, 4 + 6 * i as u32);
    }
    std::fs::write(frames.join("frame_005.png"), b"broken").unwrap();
    write_frame(&frames, 6, 40);

    let sidecar_path = dir.path().join("detections.jsonl");
    write_sidecar(&sidecar_path);

    let config = PipelineConfig::default();
    let mut session = StreamSession::new("cam-test", "frames", &config, &models());
    let mut source = ImageDirSource::open(&frames, 30.0).unwrap();
    let mut sidecar = DetectionSidecar::open(&sidecar_path).await.unwrap();
    let sink = MemorySink::new();
    let mut writer = sink.clone();

    let summary = run_stream(&mut session, &mut source, Some(&mut sidecar), &mut writer)
        .await
        .unwrap();

    let records = sink.frames();
    assert_eq!(records.len(), 6);
    assert_eq!(records[0].motion_energy, 0.0);
    assert!(records.iter().all(|r| r.motion_energy >= 0.0 && r.flux_of_count >= 0.0));

    let live: Vec<usize> = records.iter().map(|r| r.live_count).collect();
    assert_eq!(live, vec![1, 2, 0, 1, 0, 0]);
    let unique: Vec<usize> = records.iter().map(|r| r.unique_count).collect();
    assert_eq!(unique, vec![1, 2, 2, 3, 3, 3]);
    assert!(unique.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(summary.total_frames, 6);
    assert_eq!(summary.stats.decode_failures, 1);
    assert_eq!(summary.unique_instances.get("person"), Some(&3));
    assert_eq!(summary.unique_instances.get("bicycle"), Some(&1));
    assert_eq!(sidecar.malformed_lines(), 1);
    assert_eq!(sink.summary(), Some(summary));
}

#[tokio::test]
async fn test_json_lines_telemetry_file() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    for i in 0..3 {
        write_frame(&frames, i, 4 + 4 * i as u32);
    }

    let config = PipelineConfig::default();
    let mut session = StreamSession::new("cam-file", "frames", &config, &models());
    let mut source = ImageDirSource::open(&frames, 10.0).unwrap();
    let path = dir.path().join("out").join("cam-file.jsonl");
    let mut sink = JsonLinesSink::create(&path).await.unwrap();

    run_stream(&mut session, &mut source, None, &mut sink).await.unwrap();

    let events: Vec<TelemetryEvent> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], TelemetryEvent::Frame(ref f) if f.frame_index == 0));
    assert!(matches!(events[2], TelemetryEvent::Frame(ref f) if f.timestamp_ms == 200));
    match &events[3] {
        TelemetryEvent::Summary(summary) => {
            assert_eq!(summary.stream_id, "cam-file");
            assert_eq!(summary.total_frames, 3);
        }
        other => panic!("expected summary, got {other:?}"),
    }
}
