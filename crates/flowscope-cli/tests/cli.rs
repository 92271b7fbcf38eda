use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use predicates::str::is_match;
use serde_json::Value;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("flowscope"))
}

/// Minimal legacy pcap: one IPv4/TCP SYN frame from 10.0.0.1:1234 to
/// 10.0.0.2:80, written byte by byte so tests carry no binary fixtures.
fn sample_capture_bytes() -> Vec<u8> {
    let mut tcp = Vec::new();
    tcp.extend_from_slice(&1234u16.to_be_bytes());
    tcp.extend_from_slice(&80u16.to_be_bytes());
    tcp.extend_from_slice(&100u32.to_be_bytes());
    tcp.extend_from_slice(&0u32.to_be_bytes());
    tcp.push(5 << 4);
    tcp.push(0x02); // SYN
    tcp.extend_from_slice(&1024u16.to_be_bytes());
    tcp.extend_from_slice(&[0, 0, 0, 0]); // checksum + urgent

    let mut ip = Vec::new();
    ip.push(0x45);
    ip.push(0);
    ip.extend_from_slice(&((20 + tcp.len()) as u16).to_be_bytes());
    ip.extend_from_slice(&[0, 0, 0, 0]);
    ip.push(64);
    ip.push(6);
    ip.extend_from_slice(&[0, 0]);
    ip.extend_from_slice(&[10, 0, 0, 1]);
    ip.extend_from_slice(&[10, 0, 0, 2]);

    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(&tcp);

    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // ts_sec
    out.extend_from_slice(&0u32.to_le_bytes()); // ts_usec
    out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    out.extend_from_slice(&frame);
    out
}

fn sample_capture(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("capture.pcap");
    std::fs::write(&path, sample_capture_bytes()).expect("write capture");
    path
}

#[test]
fn help_supports_analyse_and_analyze() {
    cmd().arg("analyse").arg("--help").assert().success();
    cmd().arg("analyze").arg("--help").assert().success();
}

#[test]
fn version_includes_commit() {
    cmd().arg("--version").assert().success().stdout(
        contains("commit")
            .and(contains("built"))
            .and(is_match(r"commit\s+\w+").expect("regex")),
    );
}

#[test]
fn missing_input_shows_error_and_hint() {
    let temp = TempDir::new().expect("tempdir");
    let missing = temp.path().join("missing.pcap");
    let report = temp.path().join("report.json");

    cmd()
        .arg("analyze")
        .arg(missing)
        .arg("-o")
        .arg(report)
        .assert()
        .failure()
        .stderr(contains("error:").and(contains("hint:")));
}

#[test]
fn unsupported_extension_is_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let input = temp.path().join("capture.txt");
    std::fs::write(&input, sample_capture_bytes()).expect("write capture");

    cmd()
        .arg("analyse")
        .arg(input)
        .arg("--stdout")
        .assert()
        .failure()
        .stderr(contains("unsupported input format"));
}

#[test]
fn stdout_outputs_report_json() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    let assert = cmd()
        .arg("analyze")
        .arg(input)
        .arg("--stdout")
        .arg("--quiet")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    let report: Value = serde_json::from_str(&stdout).expect("valid json");

    assert_eq!(report["summary"]["total_streams"], 1);
    assert_eq!(report["summary"]["issues_found"], 0);
    assert_eq!(report["streams"][0]["protocol"], "TCP");
    assert_eq!(report["streams"][0]["severity"], "normal");
    assert_eq!(report["streams"][0]["packets"][0]["flags"], "SYN");
}

#[test]
fn report_file_is_written() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);
    let report_path = temp.path().join("out").join("report.json");

    cmd()
        .arg("analyse")
        .arg(input)
        .arg("-o")
        .arg(&report_path)
        .assert()
        .success()
        .stderr(contains("OK: report written").and(contains("streams: 1")));

    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).expect("read report"))
            .expect("valid json");
    assert_eq!(report["report_version"], 1);
    assert_eq!(report["tool"]["name"], "flowscope");
}

#[test]
fn pretty_and_compact_conflict() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    cmd()
        .arg("analyse")
        .arg(input)
        .arg("--stdout")
        .arg("--pretty")
        .arg("--compact")
        .assert()
        .failure();
}

#[test]
fn info_prints_capture_metadata() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    cmd()
        .arg("info")
        .arg(input)
        .assert()
        .success()
        .stdout(contains("packets: 1").and(contains("format: pcap")));
}

#[test]
fn info_json_is_parseable() {
    let temp = TempDir::new().expect("tempdir");
    let input = sample_capture(&temp);

    let assert = cmd().arg("info").arg(input).arg("--json").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    let info: Value = serde_json::from_str(&stdout).expect("valid json");
    assert_eq!(info["packets"], 1);
    assert_eq!(info["capture_type"], "pcap");
}
