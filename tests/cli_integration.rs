#![cfg(feature = "cli")]

use std::process::Command;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_vcdelta").to_string()
}

fn sample_files(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let dict = dir.join("dict.bin");
    let target = dir.join("target.bin");
    let dict_bytes: Vec<u8> = (0..20_000u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
    let target_bytes = [&dict_bytes[3000..9000], b"--- patched ---".as_slice(), &dict_bytes[12_000..]].concat();
    std::fs::write(&dict, &dict_bytes).unwrap();
    std::fs::write(&target, &target_bytes).unwrap();
    (dict, target)
}

#[test]
fn cli_encode_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let (dict, target) = sample_files(dir.path());

    for flags in [&[][..], &["--interleaved"][..], &["--checksum", "--interleaved", "--chunk-size", "4K"][..]] {
        let delta = dir.path().join("delta.vcdiff");
        let output = dir.path().join("output.bin");

        let st = Command::new(bin())
            .arg("--force")
            .args(["encode", "--dictionary"])
            .arg(&dict)
            .args(flags)
            .arg(&target)
            .arg(&delta)
            .status()
            .unwrap();
        assert!(st.success(), "{flags:?}");

        let st = Command::new(bin())
            .arg("--force")
            .args(["decode", "--dictionary"])
            .arg(&dict)
            .arg(&delta)
            .arg(&output)
            .status()
            .unwrap();
        assert!(st.success(), "{flags:?}");
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&target).unwrap());
        assert!(std::fs::metadata(&delta).unwrap().len() < 1000);
    }
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let (dict, target) = sample_files(dir.path());
    let delta = dir.path().join("delta.vcdiff");
    std::fs::write(&delta, b"keep me").unwrap();

    let out = Command::new(bin())
        .args(["encode", "-d"])
        .arg(&dict)
        .arg(&target)
        .arg(&delta)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).starts_with("vcdelta: "));
    assert_eq!(std::fs::read(&delta).unwrap(), b"keep me");
}

#[test]
fn cli_decode_failure_exits_nonzero() {
    let dir = tempdir().unwrap();
    let (dict, _) = sample_files(dir.path());
    let delta = dir.path().join("bad.vcdiff");
    std::fs::write(&delta, b"\xD6\xC3\xC4\x00\x00\x7F").unwrap();

    let out = Command::new(bin())
        .args(["decode", "-d"])
        .arg(&dict)
        .arg(&delta)
        .arg(dir.path().join("out.bin"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("vcdelta: "));
}

#[test]
fn cli_json_stats() {
    let dir = tempdir().unwrap();
    let (dict, target) = sample_files(dir.path());
    let delta = dir.path().join("delta.vcdiff");

    let out = Command::new(bin())
        .args(["--json", "encode", "--checksum", "-d"])
        .arg(&dict)
        .arg(&target)
        .arg(&delta)
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(json["command"], "encode");
    assert_eq!(json["windows"], 1);
    assert_eq!(json["checksum"], true);
    assert_eq!(json["delta_size"], std::fs::metadata(&delta).unwrap().len());
}

#[test]
fn cli_headers_and_delta_print() {
    let dir = tempdir().unwrap();
    let (dict, target) = sample_files(dir.path());
    let delta = dir.path().join("delta.vcdiff");

    let st = Command::new(bin())
        .args(["encode", "--checksum", "-d"])
        .arg(&dict)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());

    let out = Command::new(bin()).arg("headers").arg(&delta).output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("VCDIFF version:               S"));
    assert!(text.contains("VCDIFF adler32 checksum:"));

    let out = Command::new(bin()).arg("delta").arg(&delta).output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("COPY"));
    assert!(text.contains("ADD"));
}

#[test]
fn cli_config_works() {
    let out = Command::new(bin()).arg("config").output().unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("DEFAULT_CHUNK_SIZE="));
}
