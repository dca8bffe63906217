//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test workspace context
///
/// Creates a temporary directory holding an image directory, flash configs
/// and an isolated settings directory, and runs the binary against them.
pub struct TestProject {
    /// Temporary directory for the test workspace
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test workspace in a temporary directory
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        project.create_dir("images");
        project.create_dir("settings");
        project
    }

    /// Get the path to the test workspace directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Image directory
    pub fn images_dir(&self) -> PathBuf {
        self.dir.path().join("images")
    }

    /// Settings directory passed through `SCATTERFLASH_CONFIG_DIR`
    pub fn settings_dir(&self) -> PathBuf {
        self.dir.path().join("settings")
    }

    /// Create a file in the test workspace
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test workspace
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Read a file from the test workspace
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write dummy `<name>.img` files into the image directory
    pub fn write_images(&self, names: &[&str]) {
        for name in names {
            self.create_file(&format!("images/{name}.img"), "image");
        }
    }

    /// Write `flash.cfg` and return its path
    pub fn write_config(&self, text: &str) -> PathBuf {
        self.create_file("flash.cfg", text);
        self.dir.path().join("flash.cfg")
    }

    /// Write `config.toml` into the settings directory
    pub fn write_settings(&self, toml: &str) {
        self.create_file("settings/config.toml", toml);
    }

    /// Install an executable shell script and return its path
    #[cfg(unix)]
    pub fn create_script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        self.create_file(name, &format!("#!/bin/sh\n{body}"));
        let path = self.dir.path().join(name);
        let mut perms = std::fs::metadata(&path)
            .expect("Failed to stat script")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("Failed to chmod script");
        path
    }

    /// Run scatterflash with `args` and the isolated settings directory
    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_scatterflash"));
        cmd.current_dir(self.path())
            .env("SCATTERFLASH_CONFIG_DIR", self.settings_dir())
            .env_remove("SCATTERFLASH_FASTBOOT")
            .env_remove("RUST_LOG");
        for arg in args {
            cmd.arg(arg);
        }
        cmd.output().expect("Failed to execute scatterflash")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Flash config used across tests
pub const SAMPLE_CONFIG: &str = "\
# test device
device:foo
bootloader
-boot_ab
-vbmeta_ab disable
-dtbo
set-a
system
";
