//! End-to-end renders on the host backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use epsilon::backend::{HostBackend, KernelArgs};
use epsilon::engine::{run, ProgressSink, RenderConfig, Renderer, Statistics};
use epsilon::kernel::Query;
use epsilon::objects::{Camera, DeviceParams, Geometry, Materials, PixelBuffer, Prng, Progress, Tristimulus};
use epsilon::scene::{example_box, write_geometry};
use epsilon::Error;

const PIXEL: usize = 16;

/// Add `(0.2, 0.3, 0.1)` with weight 1 to the pixel at `id`.
fn accumulate(args: &mut KernelArgs<'_>, id: usize) {
    let Some(pixels) = args.buffer_mut(0) else {
        return;
    };
    let texel = &mut pixels[id * PIXEL..(id + 1) * PIXEL];
    let mut value: [f32; 4] = bytemuck::pod_read_unaligned(texel);
    value[0] += 0.2;
    value[1] += 0.3;
    value[2] += 0.1;
    value[3] += 1.0;
    texel.copy_from_slice(bytemuck::bytes_of(&value));
}

fn write_scene(dir: &Path) {
    let mut geometry = Vec::new();
    write_geometry(&mut geometry, &example_box()).unwrap();
    std::fs::write(dir.join("geometry"), geometry).unwrap();
    std::fs::write(
        dir.join("camera.json"),
        r#"{"position": [0, 0, -14.9], "target": [0, 0, 0], "field_of_view": 45}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("materials.json"),
        r#"{"atmosphere": 0, "models": {"right": 3, "floor": 1, "left": 2}}"#,
    )
    .unwrap();
    std::fs::write(dir.join("kernel.src"), "// host kernel\n").unwrap();
}

fn config(dir: &Path, output: &str, passes: usize) -> RenderConfig {
    RenderConfig {
        width: 7,
        height: 5,
        passes,
        scene: dir.to_path_buf(),
        output: dir.join(output),
        kernel: dir.join("kernel.src"),
        ..Default::default()
    }
}

fn backend() -> Arc<HostBackend> {
    Arc::new(HostBackend::new().with_max_work_group(8).with_kernel("main", accumulate))
}

fn ppm_values(path: &PathBuf) -> (String, Vec<u32>) {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("P3"));
    let dims = lines.next().unwrap().to_string();
    let values = lines
        .flat_map(|l| l.split_whitespace())
        .map(|v| v.parse().unwrap())
        .collect();
    (dims, values)
}

#[test]
fn test_execute_reports_last_pass() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let config = config(dir.path(), "out.ppm", 3);
    let output = config.output.clone();

    let mut renderer = Renderer::new(config, backend()).unwrap();
    assert!(!renderer.execute().unwrap());
    assert!(!renderer.execute().unwrap());
    assert!(renderer.execute().unwrap());
    // Exhausted: no-op, still finished.
    assert!(renderer.execute().unwrap());
    assert_eq!(renderer.pass(), 3);
    assert!(!output.exists());

    renderer.finish().unwrap();

    let (dims, values) = ppm_values(&output);
    assert_eq!(dims, "7 5 255");
    assert_eq!(values.len(), 7 * 5 * 3);
    assert!(values.iter().all(|&v| v > 0 && v <= 255));
}

#[test]
fn test_dispatch_split_covers_every_pixel() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let backend = backend();

    let mut renderer = Renderer::new(config(dir.path(), "out.ppm", 2), backend.clone()).unwrap();
    while !renderer.execute().unwrap() {}

    // 35 pixels with groups of 8: 32 + 2 + 1, per pass.
    let ranges: Vec<(usize, usize, usize)> = backend
        .dispatches()
        .iter()
        .map(|r| (r.offset, r.global, r.local))
        .collect();
    let per_pass = vec![(0, 32, 8), (32, 2, 2), (34, 1, 1)];
    assert_eq!(ranges, [per_pass.clone(), per_pass].concat());
    renderer.finish().unwrap();
}

#[test]
fn test_slots_follow_registration_order() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let renderer = Renderer::new(config(dir.path(), "out.ppm", 1), backend()).unwrap();

    let bindings = renderer.bindings();
    let slots: Vec<u32> = bindings.iter().map(|b| b.slot).collect();
    assert_eq!(slots, (0..9).collect::<Vec<_>>());

    let owners: Vec<&str> = bindings.iter().map(|b| b.owner).collect();
    assert_eq!(
        owners,
        vec![
            PixelBuffer::NAME,
            DeviceParams::NAME,
            Tristimulus::NAME,
            Geometry::NAME,
            Geometry::NAME,
            Geometry::NAME,
            Materials::NAME,
            Camera::NAME,
            Prng::NAME,
        ]
    );
    assert_eq!(bindings[4].label, "nodes");
}

#[test]
fn test_updates_run_before_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());

    let seen: Arc<Mutex<Vec<(u32, u64)>>> = Arc::default();
    let record = Arc::clone(&seen);
    let backend = Arc::new(HostBackend::new().with_kernel("main", move |args, id| {
        if id == 0 {
            let params: [u32; 4] = args.read(1).unwrap();
            let seed: u64 = args.read(8).unwrap();
            record.lock().push((params[3], seed));
        }
    }));

    let config = RenderConfig {
        seed: 40,
        ..config(dir.path(), "out.ppm", 3)
    };
    let mut renderer = Renderer::new(config, backend).unwrap();
    while !renderer.execute().unwrap() {}
    renderer.finish().unwrap();

    assert_eq!(*seen.lock(), vec![(0, 40), (1, 41), (2, 42)]);
}

#[test]
fn test_statistics() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let config = RenderConfig {
        eta_warmup_secs: 0.0,
        ..config(dir.path(), "out.ppm", 4)
    };
    let mut renderer = Renderer::new(config, backend()).unwrap();

    let before = renderer.statistics();
    assert_eq!(before.progress, 0.0);
    assert_eq!(before.triangle_count, 8);

    renderer.execute().unwrap();
    let stats = renderer.statistics();
    assert_eq!(stats.progress, 0.25);
    assert!(stats.remaining_seconds.is_some());
    assert_eq!(
        renderer.query(Query::TriangleCount).and_then(|v| v.as_count()),
        Some(8)
    );
}

#[test]
fn test_estimate_indeterminate_during_warmup() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let config = RenderConfig {
        eta_warmup_secs: 3600.0,
        ..config(dir.path(), "out.ppm", 2)
    };
    let mut renderer = Renderer::new(config, backend()).unwrap();
    renderer.execute().unwrap();
    assert_eq!(renderer.statistics().remaining_seconds, None);
}

#[test]
fn test_elapsed_covers_completed_passes() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let pass_time = std::time::Duration::from_millis(150);
    let backend = Arc::new(HostBackend::new().with_kernel("main", move |_, id| {
        if id == 0 {
            std::thread::sleep(pass_time);
        }
    }));
    let config = RenderConfig {
        eta_warmup_secs: 0.0,
        ..config(dir.path(), "out.ppm", 2)
    };
    let mut renderer = Renderer::new(config, backend).unwrap();

    renderer.execute().unwrap();
    let first = renderer.statistics();
    assert_eq!(first.progress, 0.5);
    assert!(first.elapsed_seconds >= 0.15, "elapsed {}", first.elapsed_seconds);
    // One pass left at the same speed.
    assert!(first.remaining_seconds.unwrap() >= 0.15);

    renderer.execute().unwrap();
    let second = renderer.statistics();
    assert!(second.elapsed_seconds >= 0.3, "elapsed {}", second.elapsed_seconds);
    assert_eq!(second.remaining_seconds, Some(0.0));
    renderer.finish().unwrap();
}

#[derive(Default)]
struct RecordingSink {
    reports: Vec<Statistics>,
    failures: Vec<String>,
}

impl ProgressSink for RecordingSink {
    fn report(&mut self, stats: &Statistics) {
        self.reports.push(*stats);
    }

    fn failed(&mut self, error: &Error) {
        self.failures.push(error.to_string());
    }
}

#[test]
fn test_run_reports_every_pass() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let config = config(dir.path(), "out.hdr", 3);
    let output = config.output.clone();

    let renderer = Renderer::new(config, backend()).unwrap();
    let mut sink = RecordingSink::default();
    let stats = run(renderer, &mut sink).unwrap();

    assert_eq!(sink.reports.len(), 4);
    assert_eq!(sink.reports[0].progress, 0.0);
    assert_eq!(stats.progress, 1.0);
    assert!(sink.failures.is_empty());

    let bytes = std::fs::read(&output).unwrap();
    assert!(bytes.starts_with(b"#?RADIANCE"));
}

#[test]
fn test_device_failure_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let config = config(dir.path(), "out.ppm", 3);
    let output = config.output.clone();
    let backend = backend();

    let mut renderer = Renderer::new(config, backend.clone()).unwrap();
    renderer.execute().unwrap();
    backend.fail_next_finish("device lost");

    let mut sink = RecordingSink::default();
    let err = run(renderer, &mut sink).unwrap_err();
    assert!(matches!(err, Error::Dispatch { pass: 1, .. }));
    assert_eq!(sink.failures.len(), 1);
    assert!(sink.failures[0].contains("device lost"));
    // Only the snapshot taken before the failing pass was reported.
    assert_eq!(sink.reports.len(), 1);
    assert_eq!(sink.reports[0].progress, 1.0 / 3.0);

    assert!(!output.exists());
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn test_early_finish_is_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let config = config(dir.path(), "out.ppm", 5);
    let output = config.output.clone();
    let backend = backend();

    let mut renderer = Renderer::new(config, backend.clone()).unwrap();
    renderer.execute().unwrap();
    let err = renderer.finish().unwrap_err();
    assert!(matches!(err, Error::Incomplete { completed: 1, passes: 5 }));
    assert!(!output.exists());
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn test_missing_resource_aborts_initialization() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    std::fs::remove_file(dir.path().join("camera.json")).unwrap();
    let backend = backend();

    let err = Renderer::new(config(dir.path(), "out.ppm", 1), backend.clone())
        .err()
        .unwrap();
    assert!(matches!(err, Error::SceneResource { ref id, .. } if id == "camera.json"));
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn test_build_failure_surfaces_log() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    std::fs::write(dir.path().join("kernel.src"), "fn main() {}\n#error missing trace()\n").unwrap();

    let err = Renderer::new(config(dir.path(), "out.ppm", 1), backend())
        .err()
        .unwrap();
    match err {
        Error::Build { log } => assert!(log.contains("missing trace()")),
        other => panic!("expected build error, got {other}"),
    }
}

#[test]
fn test_unknown_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let config = RenderConfig {
        entry_point: "render".into(),
        ..config(dir.path(), "out.ppm", 1)
    };
    let err = Renderer::new(config, backend()).err().unwrap();
    assert!(matches!(err, Error::Kernel { ref entry, .. } if entry == "render"));
}

#[test]
fn test_progress_object_needs_no_slot() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let renderer = Renderer::new(config(dir.path(), "out.ppm", 1), backend()).unwrap();
    assert!(renderer.bindings().iter().all(|b| b.owner != Progress::NAME));
}
