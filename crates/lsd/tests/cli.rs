#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Output};

fn lsd(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lsd"))
        .args(args)
        .env_remove("LSD_LOG")
        .env_remove("LSD_CONFIG")
        .output()
        .expect("lsd binary should run")
}

fn unique_temp_file(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "lsdcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

#[test]
fn encode_prints_wire_bytes() {
    let output = lsd(&["encode", "--format", "json", "--channel", "0", "--hex", "aabb"]);
    assert_eq!(output.status.code(), Some(0));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["hex"], "7e000200aabb407e");
    assert_eq!(lines[0]["frame_size"], 8);
    assert_eq!(lines[0]["kind"], "single");
}

#[test]
fn encode_rejects_invalid_channel() {
    let output = lsd(&["encode", "--channel", "4", "--data", "x"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decode_reads_hex_capture() {
    let output = lsd(&["decode", "--format", "json", "--hex", "7e000200aabb407e"]);
    assert_eq!(output.status.code(), Some(0));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["channel"], 0);
    assert_eq!(lines[0]["payload_size"], 2);
    assert_eq!(lines[0]["payload"], "0xaabb");
}

#[test]
fn decode_flags_corrupted_capture() {
    let output = lsd(&["decode", "--format", "json", "--hex", "7e000200aabb417e"]);
    assert_eq!(output.status.code(), Some(60));

    let lines = json_lines(&output);
    assert!(lines[0]["error"].as_str().unwrap_or_default().contains("checksum"));
}

#[test]
fn loopback_roundtrips_small_message() {
    let output = lsd(&["loopback", "--format", "json", "--channel", "2", "--data", "hello"]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = json_lines(&output);
    assert_eq!(lines[0]["channel"], 2);
    assert_eq!(lines[0]["payload"], "hello");
}

#[test]
fn loopback_segments_large_file() {
    let path = unique_temp_file("loopback");
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(&path, &data).expect("temp file should be writable");

    let output = lsd(&[
        "loopback",
        "--format",
        "json",
        "--file",
        path.to_str().expect("utf-8 temp path"),
        "--chunk",
        "3000",
    ]);
    let _ = std::fs::remove_file(&path);

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let lines = json_lines(&output);
    assert_eq!(lines[0]["payload_size"], 20_000);
}

#[test]
fn loopback_honors_config_file() {
    let path = unique_temp_file("config");
    std::fs::write(&path, r#"{ "recv_prio": 0, "max_message_len": 100 }"#)
        .expect("temp file should be writable");

    let big = "x".repeat(5_000);
    let output = lsd(&[
        "loopback",
        "--format",
        "json",
        "--config",
        path.to_str().expect("utf-8 temp path"),
        "--data",
        &big,
    ]);
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn send_to_missing_device_fails() {
    let output = lsd(&["send", "/nonexistent/lsd-tty", "--data", "x"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_prints_name() {
    let output = lsd(&["version"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("lsd "));
}
