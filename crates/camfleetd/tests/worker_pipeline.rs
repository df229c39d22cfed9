//! End-to-end test of the worker frame path: worker process stdout →
//! frame pump → snapshot callback → bounded sink → files on disk.

use std::time::Duration;

use camfleet_core::{CameraMac, SnapshotConfig, StreamEndpoint, WorkerConfig};
use camfleetd::snapshot::SnapshotWriter;
use camfleetd::supervisor::WorkerSupervisor;
use tokio::time::sleep;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[tokio::test]
async fn test_worker_frames_land_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");

    let snapshot_config = SnapshotConfig {
        enabled: true,
        every_n_frames: 1,
        directory: dir.path().to_path_buf(),
        queue_capacity: 16,
    };
    let writer = SnapshotWriter::spawn(&snapshot_config);

    // a fake stream puller: two minimal JPEG frames, then hold the pipe open
    let worker_config = WorkerConfig {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "printf '\\377\\330\\377\\331\\377\\330\\377\\331'; sleep 30".to_string(),
        ],
        stop_timeout_secs: 1,
    };
    let supervisor = WorkerSupervisor::new(worker_config, Some(writer.callback()));

    let mac = CameraMac::new("AA:BB:CC:DD:EE:01");
    let endpoint = StreamEndpoint::new("192.168.1.10", 554);
    let handle = supervisor.start(&mac, &endpoint).expect("spawn worker");

    let device_dir = dir.path().join("192.168.1.10");
    let start = tokio::time::Instant::now();
    while !(device_dir.join("1.jpg").exists() && device_dir.join("2.jpg").exists()) {
        assert!(
            start.elapsed() < WAIT_TIMEOUT,
            "snapshots never appeared in {}",
            device_dir.display()
        );
        sleep(POLL_INTERVAL).await;
    }

    let frame = std::fs::read(device_dir.join("1.jpg")).expect("snapshot file");
    assert_eq!(frame, vec![0xFF, 0xD8, 0xFF, 0xD9]);

    supervisor.stop(handle).await;
    writer.close().await;
}

#[tokio::test]
async fn test_sampling_skips_frames() {
    let dir = tempfile::tempdir().expect("tempdir");

    let snapshot_config = SnapshotConfig {
        enabled: true,
        every_n_frames: 2,
        directory: dir.path().to_path_buf(),
        queue_capacity: 16,
    };
    let writer = SnapshotWriter::spawn(&snapshot_config);

    // four frames: only sequence 2 and 4 should be kept
    let worker_config = WorkerConfig {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "printf '\\377\\330\\377\\331%.0s' 1 2 3 4; sleep 30".to_string(),
        ],
        stop_timeout_secs: 1,
    };
    let supervisor = WorkerSupervisor::new(worker_config, Some(writer.callback()));

    let mac = CameraMac::new("AA:BB:CC:DD:EE:02");
    let endpoint = StreamEndpoint::new("192.168.1.11", 554);
    let handle = supervisor.start(&mac, &endpoint).expect("spawn worker");

    let device_dir = dir.path().join("192.168.1.11");
    let start = tokio::time::Instant::now();
    while !device_dir.join("4.jpg").exists() {
        assert!(
            start.elapsed() < WAIT_TIMEOUT,
            "snapshot 4.jpg never appeared"
        );
        sleep(POLL_INTERVAL).await;
    }

    supervisor.stop(handle).await;
    writer.close().await;

    assert!(device_dir.join("2.jpg").exists());
    assert!(!device_dir.join("1.jpg").exists());
    assert!(!device_dir.join("3.jpg").exists());

    // nothing was dropped at this queue depth
    assert_eq!(writer.dropped(), 0);
}

#[tokio::test]
async fn test_stopped_worker_pump_ends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let writer = SnapshotWriter::spawn(&SnapshotConfig {
        enabled: true,
        every_n_frames: 1,
        directory: dir.path().to_path_buf(),
        queue_capacity: 16,
    });

    let worker_config = WorkerConfig {
        program: "sleep".to_string(),
        args: vec!["30".to_string()],
        stop_timeout_secs: 1,
    };
    let supervisor = WorkerSupervisor::new(worker_config, Some(writer.callback()));

    let mac = CameraMac::new("AA:BB:CC:DD:EE:03");
    let endpoint = StreamEndpoint::new("192.168.1.12", 554);
    let handle = supervisor.start(&mac, &endpoint).expect("spawn worker");
    let pid = handle.pid().expect("pid");

    // stop() must return even though the worker emitted nothing at all
    supervisor.stop(handle).await;
    assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());

    writer.close().await;
}
