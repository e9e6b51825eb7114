#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// Host variables that would leak site settings into a test run.
const SCRUBBED_VARS: &[&str] = &[
    "PILOT_CONFIG",
    "PILOT_IMAGES_DICT",
    "PILOT_IMAGE_DEFAULT",
    "PILOT_IMAGE_DEFAULT6",
    "PILOT_IMAGE_DEFAULT7",
    "PILOT_BINDPATH",
    "PILOT_BINDPATH_DEFAULT",
    "PILOT_BIND_CHECKS",
    "PILOT_PLATFORMS",
    "PILOT_RESTRICTIONS",
    "PILOT_CONTAINER_ENV",
    "PILOT_RUNTIME_PATH",
    "PILOT_SHARED_ROOT",
    "PILOT_EXTRA_OPTS",
    "PILOT_GLOBAL_OPTS",
    "PILOT_ENV_PREFIX",
    "_CONDOR_JOB_AD",
    "_CONDOR_WRAPPER_ERROR_FILE",
    "NO_COLOR",
];

/// Stands in for apptainer: answers `--version`, otherwise drops the
/// runtime's own options and the image, then runs the workload directly.
const FAKE_RUNTIME: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo "apptainer version 1.2.5"
    exit 0
fi
while [ $# -gt 0 ]; do
    case "$1" in
        exec|run) shift ;;
        --home|--pwd|--bind) shift 2 ;;
        -*) shift ;;
        *) shift; break ;;
    esac
done
exec "$@"
"#;

pub fn pilot() -> Command {
    let mut cmd = cargo_bin_cmd!("pilot");
    for var in SCRUBBED_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// A throwaway site: a shared filesystem root holding two images and a
/// directory with a fake runtime in it.
pub struct Site {
    pub dir: TempDir,
    pub root: PathBuf,
    pub bin: PathBuf,
}

impl Site {
    pub fn new() -> Self {
        let dir = tempfile::Builder::new()
            .prefix("pilot-site")
            .tempdir()
            .expect("tempdir");
        let root = dir.path().join("cvmfs");
        let bin = dir.path().join("bin");
        fs::create_dir_all(root.join("img")).expect("image dir");
        fs::write(root.join("img/el7.sif"), b"").expect("el7 image");
        fs::write(root.join("img/el9.sif"), b"").expect("el9 image");
        write_fake_runtime(&bin);
        Self { dir, root, bin }
    }

    pub fn image(&self, name: &str) -> String {
        self.root.join("img").join(name).display().to_string()
    }

    pub fn images_dict(&self) -> String {
        format!(
            "rhel7:{},rhel9:{}",
            self.image("el7.sif"),
            self.image("el9.sif")
        )
    }

    /// `pilot` wired to this site through its environment variables.
    pub fn pilot(&self) -> Command {
        let mut cmd = pilot();
        cmd.current_dir(self.dir.path())
            .env("PILOT_IMAGES_DICT", self.images_dict())
            .env("PILOT_SHARED_ROOT", &self.root)
            .env("PILOT_RUNTIME_PATH", &self.bin)
            .env("PILOT_PLATFORMS", "rhel9,rhel7");
        cmd
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn write_fake_runtime(dir: &Path) -> PathBuf {
    fs::create_dir_all(dir).expect("runtime dir");
    let path = dir.join("apptainer");
    fs::write(&path, FAKE_RUNTIME).expect("write fake runtime");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }
    path
}

pub fn parse_json(assert: &Assert) -> Value {
    let output = assert.get_output();
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "invalid json: {err}\nstdout: {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

pub fn stdout(assert: &Assert) -> String {
    let output = assert.get_output();
    String::from_utf8_lossy(&output.stdout).into_owned()
}
