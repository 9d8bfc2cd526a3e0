use assert_cmd::Command;

fn libris() -> Command {
    let mut cmd = Command::cargo_bin("libris").unwrap();
    cmd.env("LIBRIS_CONFIG_DIR", concat!(env!("CARGO_MANIFEST_DIR"), "/../../config"))
        .env_remove("LIBRIS_ENV")
        .env_remove("LIBRIS_DATABASE__URL");
    cmd
}

#[test]
fn settings_prints_resolved_configuration() {
    let output = libris()
        .arg("settings")
        .env("LIBRIS_PAGINATION__MAX_LIMIT", "50")
        .output()
        .unwrap();
    assert!(output.status.success());

    let settings: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(settings["environment"], "local");
    assert_eq!(settings["pagination"]["default_limit"], 10);
    assert_eq!(settings["pagination"]["max_limit"], 50);
    assert_eq!(settings["server"]["api_prefix"], "/api/v1");
}

#[test]
fn unknown_environment_fails_fast() {
    libris()
        .arg("settings")
        .env("LIBRIS_ENV", "qa")
        .assert()
        .failure();
}

#[test]
fn settings_masks_database_password() {
    let output = libris()
        .arg("settings")
        .env("LIBRIS_DATABASE__URL", "postgres://libris:hunter2@db:5432/libris")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains("hunter2"));
    let settings: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        settings["database"]["url"],
        "postgres://libris:***@db:5432/libris"
    );
    assert_eq!(settings["database"]["max_connections"], 10);
}

#[test]
fn production_requires_a_database() {
    libris()
        .arg("settings")
        .env("LIBRIS_ENV", "production")
        .assert()
        .failure();
}
