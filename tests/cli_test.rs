//! Integration tests for the scatterflash binary
//!
//! `check` and `doctor` run without a device. `flash` and `detect` run
//! against shell scripts standing in for `fastboot` and `adb`.

mod common;

use common::{TestProject, SAMPLE_CONFIG};

// ============================================
// scatterflash check
// ============================================

#[test]
fn test_check_valid_config() {
    let project = TestProject::new();
    project.write_images(&["boot", "vbmeta", "dtbo"]);
    project.write_config(SAMPLE_CONFIG);

    let output = project.run(&["check", "images", "-c", "flash.cfg"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Config for foo (6 steps, 3 images)"), "stdout: {stdout}");
    assert!(stdout.contains("boot_a, boot_b"));
    assert!(stdout.contains("Flash config is valid"));
}

#[test]
fn test_check_reports_missing_images() {
    let project = TestProject::new();
    project.write_images(&["boot"]);
    project.write_config(SAMPLE_CONFIG);

    let output = project.run(&["check", "images", "-c", "flash.cfg"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success());
    assert!(stdout.contains("skipped: vbmeta.img not found"));
    assert!(stderr.contains("2 flash step(s) will be skipped"));
}

#[test]
fn test_check_json_output() {
    let project = TestProject::new();
    project.write_images(&["boot", "vbmeta"]);
    project.write_config(SAMPLE_CONFIG);

    let output = project.run(&["--json", "check", "images", "-c", "flash.cfg"]);
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("check --json prints JSON");
    assert_eq!(json["status"], "success");
    assert_eq!(json["devices"][0], "foo");
    assert_eq!(json["missing_images"], 1);
    assert_eq!(json["steps"][1]["step"]["type"], "flash_partition");
    assert_eq!(json["steps"][1]["targets"][1], "boot_b");
}

#[test]
fn test_check_parse_error_fails() {
    let project = TestProject::new();
    project.write_images(&["boot"]);
    project.write_config("device:foo\nbootloader\nflash everything\n");

    let output = project.run(&["check", "images", "-c", "flash.cfg"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Line 3: unrecognized directive"), "stderr: {stderr}");
}

#[test]
fn test_check_requires_device_line() {
    let project = TestProject::new();
    project.write_images(&["boot"]);
    project.write_config("bootloader\n-boot\n");

    let output = project.run(&["check", "images", "-c", "flash.cfg"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no 'device:' line"));
}

#[test]
fn test_check_empty_image_dir_fails() {
    let project = TestProject::new();
    project.write_config(SAMPLE_CONFIG);

    let output = project.run(&["check", "images", "-c", "flash.cfg"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No .img images found"));
}

#[test]
fn test_invalid_settings_fail_commands() {
    let project = TestProject::new();
    project.write_images(&["boot"]);
    project.write_config(SAMPLE_CONFIG);
    project.write_settings("[watcher]\ninterval_secs = 0\n");

    let output = project.run(&["check", "images", "-c", "flash.cfg"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to load settings"), "stderr: {stderr}");
}

// ============================================
// scatterflash doctor / help
// ============================================

#[test]
fn test_doctor_reports_settings_issue() {
    let project = TestProject::new();
    project.write_settings("[unknown]\nkey = 1\n");

    let output = project.run(&["--json", "doctor"]);
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("doctor --json prints JSON");

    assert!(!output.status.success());
    assert_eq!(json["status"], "error");
    assert_eq!(json["config_issues"].as_array().map(Vec::len), Some(1));
}

#[test]
fn test_help_lists_commands() {
    let project = TestProject::new();
    let output = project.run(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for command in ["flash", "check", "detect", "reboot", "doctor"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_reboot_rejects_unknown_target() {
    let project = TestProject::new();
    let output = project.run(&["reboot", "download"]);
    assert!(!output.status.success());
}

// ============================================
// Against scripted platform tools
// ============================================

#[cfg(unix)]
mod scripted {
    use super::*;

    /// Install fake `fastboot` and `adb` scripts and point the settings at them
    ///
    /// fastboot appends every invocation to `fastboot.log`.
    fn install_tools(project: &TestProject, userspace: &str) {
        let log = project.path().join("fastboot.log");
        let fastboot = project.create_script(
            "bin/fastboot",
            &format!(
                r#"echo "$*" >> "{log}"
case "$*" in
  --version) echo "fastboot version 35.0.2-12147458" ;;
  devices) printf 'FAKE0001\tfastboot\n' ;;
  *"getvar product"*) echo "product: foo123" >&2 ;;
  *"getvar is-userspace"*) echo "is-userspace: {userspace}" >&2 ;;
  *) echo "OKAY" >&2 ;;
esac
"#,
                log = log.display()
            ),
        );
        let adb = project.create_script(
            "bin/adb",
            r#"case "$*" in
  --version) echo "Android Debug Bridge version 1.0.41" ;;
  *) echo "List of devices attached" ;;
esac
"#,
        );
        project.write_settings(&format!(
            "[tools]\nfastboot = \"{}\"\nadb = \"{}\"\n",
            fastboot.display(),
            adb.display()
        ));
    }

    #[test]
    fn test_detect_bootloader() {
        let project = TestProject::new();
        install_tools(&project, "no");

        let output = project.run(&["--json", "detect"]);
        let json: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("detect --json prints JSON");

        assert!(output.status.success());
        assert_eq!(json["mode"], "bootloader");
        assert_eq!(json["serial"], "FAKE0001");
    }

    #[test]
    fn test_detect_fastbootd() {
        let project = TestProject::new();
        install_tools(&project, "yes");

        let output = project.run(&["--json", "detect"]);
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["mode"], "fastbootd");
    }

    #[test]
    fn test_doctor_with_tools_passes() {
        let project = TestProject::new();
        install_tools(&project, "no");

        let output = project.run(&["doctor"]);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert!(output.status.success(), "stdout: {stdout}");
        assert!(stdout.contains("fastboot (v35.0.2-12147458)"));
        assert!(stdout.contains("All checks passed (2/2)"));
    }

    #[test]
    fn test_flash_runs_plan() {
        let project = TestProject::new();
        install_tools(&project, "no");
        project.write_images(&["boot", "vbmeta", "dtbo"]);
        project.write_config(SAMPLE_CONFIG);

        let images = project.images_dir();
        let images_arg = images.display().to_string();

        let output = project.run(&[
            "flash",
            &images_arg,
            "-c",
            "flash.cfg",
            "--yes",
            "--log-file",
            "flash.log",
        ]);
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert!(
            output.status.success(),
            "stdout: {stdout}\nstderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        assert!(stdout.contains("Flashed foo123 (6 steps)"));

        let calls = project.read_file("fastboot.log");
        assert!(calls.contains(&format!("flash boot_a {}", images.join("boot.img").display())));
        assert!(calls.contains(&format!("flash boot_b {}", images.join("boot.img").display())));
        assert!(calls.contains("--disable-verity --disable-verification flash vbmeta_a"));
        assert!(calls.contains("set_active a"));
        assert!(calls.lines().any(|l| l == "reboot"));

        let log = project.read_file("flash.log");
        assert!(log.contains("Device identity confirmed: foo123"));
        assert!(log.contains("[6/6] reboot to system"));
    }

    #[test]
    fn test_flash_refuses_wrong_device() {
        let project = TestProject::new();
        install_tools(&project, "no");
        project.write_images(&["boot"]);
        project.write_config("device:bar\nbootloader\n-boot\n");

        let output = project.run(&["flash", "images", "-c", "flash.cfg", "--yes"]);
        let stderr = String::from_utf8_lossy(&output.stderr);

        assert!(!output.status.success());
        assert!(stderr.contains("Device mismatch"), "stderr: {stderr}");
        let calls = project.read_file("fastboot.log");
        assert!(!calls.contains("flash boot"));
    }

    #[test]
    fn test_flash_requires_confirmation_when_not_interactive() {
        let project = TestProject::new();
        install_tools(&project, "no");
        project.write_images(&["boot"]);
        project.write_config("device:foo\n-boot\n");

        let output = project.run(&["flash", "images", "-c", "flash.cfg"]);

        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("Use --yes"));
        assert!(!project.read_file("fastboot.log").contains("flash boot"));
    }
}
