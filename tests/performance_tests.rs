use assert_cmd::cargo_bin;
use std::process::Command;

mod common;

#[test]
fn test_large_file_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("large_requests.csv");
    common::generate_large_csv(&input, 20_000).expect("Failed to generate large CSV");

    let output = Command::new(cargo_bin!("raildispatch"))
        .arg(&input)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "Binary failed to process large file");

    let stdout = String::from_utf8_lossy(&output.stdout);
    // Header plus one row per unique correlation id.
    assert_eq!(stdout.lines().count(), 20_001);
}
