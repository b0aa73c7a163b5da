use assert_cmd::cargo::cargo_bin_cmd;
use std::path::Path;

fn write_config(dir: &Path, bridge: &str) -> std::path::PathBuf {
    let path = dir.join("touchreplay.toml");
    std::fs::write(
        &path,
        format!(
            "[device]\nbridge_program = {bridge:?}\n\n[recording]\nlog_path = \"events.txt\"\npoll_interval_ms = 10\n"
        ),
    )
    .expect("write config");
    path
}

/// Stand-in bridge: `sh shell <cmd> ...` runs the `shell` script in the
/// working directory, so no executable bit is needed.
#[cfg(unix)]
fn write_fake_bridge(dir: &Path, capture: &str) {
    std::fs::write(dir.join("capture.txt"), capture).expect("write capture");
    std::fs::write(
        dir.join("shell"),
        "case \"$1\" in\n  getevent) cat capture.txt ;;\n  input) echo \"$@\" >> taps.log ;;\n  *) exit 1 ;;\nesac\n",
    )
    .expect("write bridge");
}

#[test]
fn help_lists_flags() {
    let mut cmd = cargo_bin_cmd!("touchreplay");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("--mode"));
    assert!(stdout.contains("--device"));
    assert!(stdout.contains("--events"));
}

#[test]
fn invalid_menu_choice_prints_message_and_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("touchreplay");
    cmd.current_dir(temp.path()).write_stdin("3\n");
    let out = cmd.assert().code(2);
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("1. Record touch events"));
    assert!(stdout.contains("Invalid option"));
}

#[test]
fn missing_config_exits_nonzero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("touchreplay");
    cmd.current_dir(temp.path())
        .arg("--config")
        .arg("missing.toml")
        .arg("--mode")
        .arg("replay");
    cmd.assert().failure();
}

#[test]
fn replay_without_a_log_names_the_phase() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("touchreplay");
    cmd.current_dir(temp.path()).write_stdin("2\n");
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("replay failed: storage error"), "{stderr}");
}

#[cfg(unix)]
#[test]
fn record_then_replay_through_a_fake_bridge() {
    let temp = tempfile::tempdir().expect("tempdir");
    let capture = "\
/dev/input/event8: EV_ABS       ABS_MT_POSITION_X    00000064
/dev/input/event8: EV_ABS       ABS_MT_POSITION_Y    00000096
/dev/input/event8: EV_KEY       BTN_TOUCH            DOWN
/dev/input/event8: EV_SYN       SYN_REPORT           00000000
/dev/input/event8: EV_KEY       BTN_TOUCH            UP
/dev/input/event8: EV_ABS       ABS_MT_POSITION_X    000000c8
/dev/input/event8: EV_KEY       BTN_TOUCH            DOWN
/dev/input/event8: EV_KEY       BTN_TOUCH            UP
";
    write_fake_bridge(temp.path(), capture);
    let config = write_config(temp.path(), "sh");

    let mut record = cargo_bin_cmd!("touchreplay");
    record
        .current_dir(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("--mode")
        .arg("record");
    let out = record.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("Saved 8 lines (2 touches)"), "{stdout}");
    assert_eq!(
        std::fs::read_to_string(temp.path().join("events.txt")).expect("log"),
        capture
    );

    let mut replay = cargo_bin_cmd!("touchreplay");
    replay
        .current_dir(temp.path())
        .arg("--config")
        .arg(&config)
        .write_stdin("2\n");
    let out = replay.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("Tap at (100, 150)"), "{stdout}");
    assert!(stdout.contains("Tap at (200, 150)"), "{stdout}");
    assert_eq!(
        std::fs::read_to_string(temp.path().join("taps.log")).expect("taps"),
        "input tap 100 150\ninput tap 200 150\n"
    );
}

#[cfg(unix)]
#[test]
fn record_reports_a_partial_capture_when_the_bridge_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        temp.path().join("shell"),
        "printf 'EV_KEY BTN_TOUCH DOWN\\n'\necho 'error: device offline' >&2\nexit 1\n",
    )
    .expect("write bridge");
    let config = write_config(temp.path(), "sh");

    let mut record = cargo_bin_cmd!("touchreplay");
    record
        .current_dir(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("--mode")
        .arg("record");
    let out = record.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("recording is partial"), "{stdout}");
    assert!(stdout.contains("device offline"), "{stdout}");
    assert!(stdout.contains("Saved 1 lines (1 touches)"), "{stdout}");
}
