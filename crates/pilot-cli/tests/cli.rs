use std::fs;

mod common;

use common::{parse_json, pilot, stdout, Site};

#[test]
fn intersect_prints_the_common_platforms() {
    let assert = pilot()
        .args(["intersect", "any", "rhel7,rhel6"])
        .assert()
        .success();
    assert_eq!(stdout(&assert).trim(), "rhel7,rhel6");

    let assert = pilot()
        .args(["--json", "intersect", "rhel8,rhel7", "rhel7,rhel9"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["result"], "rhel7");
}

#[test]
fn disjoint_intersection_is_a_user_error() {
    let assert = pilot()
        .args(["--json", "intersect", "rhel6", "rhel9"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["reason"], "empty_intersection");
    assert!(payload["message"]
        .as_str()
        .unwrap()
        .starts_with("pilot intersect"));
}

#[test]
fn env_options_are_normalised() {
    let assert = pilot().args(["env-options", ""]).assert().success();
    assert_eq!(stdout(&assert).trim(), "clearpaths");

    let assert = pilot()
        .args(["--json", "env-options", "osgset,bogus"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    let options = payload["details"]["options"].to_string();
    assert!(options.contains("osgset"), "{options}");
    assert!(options.contains("condorset"), "{options}");
    assert_eq!(payload["details"]["clears_paths"], false);
}

#[test]
fn binds_prefer_overrides_and_drop_missing_paths() {
    let site = Site::new();
    let data = site.path("data");
    fs::create_dir_all(&data).unwrap();
    let missing = site.path("missing");
    let overrides = format!("{}:/data", data.display());
    let primary = format!("{}:/data:ro,{}", data.display(), missing.display());

    let assert = site
        .pilot()
        .args(["binds", "--checks", "e", "--override", &overrides])
        .args(["--primary", &primary, "--defaults", ""])
        .assert()
        .success();
    assert_eq!(stdout(&assert).trim(), overrides);
}

#[test]
fn image_comes_from_the_platform_map() {
    let site = Site::new();
    let assert = site
        .pilot()
        .args(["image", "--platforms", "rhel8,rhel7"])
        .assert()
        .success();
    assert_eq!(stdout(&assert).trim(), site.image("el7.sif"));

    let assert = site
        .pilot()
        .args(["--json", "image", "--platforms", "rhel6"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["reason"], "no_image_available");
}

#[test]
fn cvmfs_restriction_rejects_images_off_the_shared_root() {
    let site = Site::new();
    let outside = site.path("local.sif");
    fs::write(&outside, b"").unwrap();
    let map = format!("rhel7:{}", outside.display());
    let assert = site
        .pilot()
        .args(["--json", "image", "--map", &map, "--platforms", "any"])
        .args(["--restrictions", "cvmfs"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["reason"], "restriction_violation");
}

#[cfg(unix)]
#[test]
fn locate_uses_the_hint_directory() {
    let site = Site::new();
    let assert = site
        .pilot()
        .args(["--json", "locate", "--hint"])
        .arg(&site.bin)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(
        payload["details"]["path"],
        site.bin.join("apptainer").display().to_string()
    );
    assert_eq!(payload["details"]["version"], "apptainer version 1.2.5");
    assert_eq!(payload["details"]["strategy"], "hint");
}

#[cfg(unix)]
#[test]
fn probe_reports_a_privilege_mode() {
    let site = Site::new();
    let assert = site
        .pilot()
        .args(["probe", "--runtime"])
        .arg(site.bin.join("apptainer"))
        .args(["--image", &site.image("el7.sif")])
        .assert()
        .success();
    let mode = stdout(&assert);
    let modes = ["privileged", "fakeroot", "unprivileged"];
    assert!(modes.contains(&mode.trim()), "{mode}");
}

#[cfg(unix)]
#[test]
fn dry_run_prints_invocation_and_attributes() {
    let site = Site::new();
    let assert = site
        .pilot()
        .args(["launch", "--dry-run", "--", "/bin/echo", "hello world"])
        .assert()
        .success();
    let out = stdout(&assert);
    let mut lines = out.lines();
    let invocation = lines.next().unwrap();
    assert!(invocation.contains(" exec "), "{invocation}");
    assert!(invocation.contains(&site.image("el9.sif")), "{invocation}");
    assert!(
        invocation.ends_with("/bin/echo 'hello world'"),
        "{invocation}"
    );
    let attributes: Vec<&str> = lines.collect();
    assert!(attributes.contains(&"HAS_SINGULARITY = True"), "{out}");
    assert!(
        attributes
            .iter()
            .any(|line| line.starts_with("GWMS_SINGULARITY_IMAGE = ")),
        "{out}"
    );
}

#[cfg(unix)]
#[test]
fn required_os_narrows_the_platform() {
    let site = Site::new();
    let ad = site.path(".job.ad");
    fs::write(&ad, "REQUIRED_OS = \"rhel7\"\nOwner = \"alice\"\n").unwrap();
    let assert = site
        .pilot()
        .env("_CONDOR_JOB_AD", &ad)
        .args(["--json", "resolve", "--", "/bin/true"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["image"]["platform"], "rhel7");
    assert_eq!(
        payload["details"]["image"]["reference"],
        site.image("el7.sif")
    );

    fs::write(&ad, "REQUIRED_OS = \"rhel6\"\n").unwrap();
    let assert = site
        .pilot()
        .env("_CONDOR_JOB_AD", &ad)
        .args(["--json", "resolve", "--", "/bin/true"])
        .assert()
        .code(1);
    assert_eq!(
        parse_json(&assert)["details"]["reason"],
        "empty_intersection"
    );
}

#[cfg(unix)]
#[test]
fn subprocess_launch_propagates_the_workload_status() {
    let site = Site::new();
    let sink = site.path("wrapper.err");
    site.pilot()
        .env("_CONDOR_WRAPPER_ERROR_FILE", &sink)
        .args(["launch", "--mode", "subprocess", "--"])
        .args(["/bin/sh", "-c", "exit 7"])
        .assert()
        .code(7);
    let report = fs::read_to_string(&sink).unwrap();
    assert!(report.starts_with("pilot: "), "{report}");
}

#[cfg(unix)]
#[test]
fn exec_launch_hands_over_the_process() {
    let site = Site::new();
    site.pilot()
        .args(["launch", "--", "/bin/sh", "-c", "exit 5"])
        .assert()
        .code(5);
}

#[cfg(unix)]
#[test]
fn workload_sees_the_container_environment() {
    let site = Site::new();
    let script = "echo \"image=$SINGULARITYENV_PILOT_IMAGE\"; echo \"oldpath=$PILOT_OLDENV_PATH\"";
    let assert = site
        .pilot()
        .env("PATH", "/usr/bin:/bin")
        .args(["launch", "--mode", "subprocess", "--"])
        .args(["/bin/sh", "-c", script])
        .assert()
        .success();
    let out = stdout(&assert);
    assert!(
        out.contains(&format!("image={}", site.image("el9.sif"))),
        "{out}"
    );
    assert!(out.contains("oldpath=/usr/bin:/bin"), "{out}");
}

#[cfg(unix)]
#[test]
fn missing_runtime_is_reported_with_attempts() {
    let site = Site::new();
    if fs::metadata("/cvmfs/oasis.opensciencegrid.org").is_ok() {
        return;
    }
    let empty = site.path("empty");
    fs::create_dir_all(&empty).unwrap();
    let assert = site
        .pilot()
        .env("PILOT_RUNTIME_PATH", &empty)
        .env("PATH", &empty)
        .args(["--json", "resolve"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["reason"], "runtime_not_found");
}

#[test]
fn unknown_config_keys_are_rejected() {
    let site = Site::new();
    let config = site.path("pilot.toml");
    fs::write(&config, "platfroms = \"rhel7\"\n").unwrap();
    let assert = site
        .pilot()
        .arg("--config")
        .arg(&config)
        .args(["--json", "env-options", "clear"])
        .assert()
        .code(1);
    assert_eq!(parse_json(&assert)["details"]["reason"], "config");
}

#[test]
fn config_file_supplies_site_defaults() {
    let site = Site::new();
    let config = site.path("pilot.toml");
    let images = format!("images = \"rhel7:{}\"\n", site.image("el7.sif"));
    fs::write(&config, images).unwrap();
    let assert = pilot()
        .env("PILOT_SHARED_ROOT", &site.root)
        .arg("--config")
        .arg(&config)
        .args(["image", "--platforms", "any"])
        .assert()
        .success();
    assert_eq!(stdout(&assert).trim(), site.image("el7.sif"));
}
