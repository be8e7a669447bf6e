use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;

type STDRESULT = Result<(), Box<dyn std::error::Error>>;

fn deobfuscate_fixture(base_name: &str) -> Result<String, Box<dyn std::error::Error>> {
    let in_path = Path::new("tests").join("fixtures").join([base_name, ".js"].concat());
    let temp_dir = tempfile::tempdir()?;
    let out_path = temp_dir.path().join([base_name, ".out.js"].concat());

    Command::cargo_bin("unpacker-js")?
        .arg("deobfuscate")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();

    Ok(std::fs::read_to_string(out_path)?)
}

#[test]
fn inlines_hex_array_resolver_and_boolean_cosmetics() -> STDRESULT {
    let out = deobfuscate_fixture("packed")?;

    // Hex numerals in the discovered constant array are normalized to decimal.
    assert!(!out.contains("0x68"));
    assert!(out.contains("104"));

    // The global resolver call is replaced by the bare, allow-listed identifier.
    assert!(out.contains("Date()"));

    // Bracketed access to a safe, non-reserved property name is dotted.
    assert!(out.contains("obj.length"));

    // The boolean-literal-gated conditional collapses to its taken branch.
    assert!(out.contains("\"on\""));
    assert!(!out.contains("\"off\""));

    Ok(())
}

#[test]
fn zero_discovery_input_still_round_trips() -> STDRESULT {
    let out = deobfuscate_fixture("plain")?;
    assert!(out.contains("function add"));
    assert!(out.contains("add(2, 3)"));
    Ok(())
}

#[test]
fn requires_input_and_output_arguments() {
    Command::cargo_bin("unpacker-js")
        .unwrap()
        .arg("deobfuscate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn fails_on_missing_input_file() {
    Command::cargo_bin("unpacker-js")
        .unwrap()
        .arg("deobfuscate")
        .arg("-i").arg("tests/fixtures/does_not_exist.js")
        .arg("-o").arg("tests/fixtures/does_not_exist.out.js")
        .assert()
        .failure();
}
