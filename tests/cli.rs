use assert_cmd::prelude::*;
use chrono::Utc;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

use factrack::auth::UserSnapshot;
use factrack::client::JwtToken;
use factrack::client::models::UserProfile;
use factrack::config::Config;
use factrack::permission::PermissionSet;
use factrack::session::{SecurityLevel, SecuritySession};

fn user() -> UserProfile {
    UserProfile {
        id: "u-1".to_string(),
        username: "QL01".to_string(),
        full_name: Some("Tran Thi B".to_string()),
        role: Some("line_leader".to_string()),
        department_id: None,
        factory_id: None,
    }
}

/// Config of a user signed in moments ago
fn signed_in_config(permissions: &[&str]) -> Config {
    let snapshot = UserSnapshot {
        user: user(),
        permissions: PermissionSet::from_codes(permissions.iter().copied()),
    };

    let mut config = Config {
        jwt: Some(JwtToken {
            token: "opaque-token".to_string(),
            expires_at: None,
        }),
        user: Some(snapshot.encode().expect("encode snapshot")),
        session: Some(SecuritySession {
            last_activity_at: Utc::now(),
            security_level: SecurityLevel::Medium,
            is_authenticated: true,
        }),
        ..Default::default()
    };
    config.preferences.guard_settle_ms = 0;
    config
}

fn write_config(dir: &Path, config: &Config) -> PathBuf {
    let path = dir.join("config.yaml");
    config.save_to(&path).expect("failed to write config");
    path
}

fn factrack(config_path: &Path) -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("factrack"));
    command
        .arg("--config")
        .arg(config_path)
        .env_remove("FACTRACK_CONFIG")
        .env_remove("FACTRACK_FORMAT")
        .env_remove("FACTRACK_API_HOST")
        .env_remove("FACTRACK_PASSWORD");
    command
}

#[test]
fn status_uses_custom_config_path() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &signed_in_config(&["department.view"]));

    let assert = factrack(&config_path).arg("status").assert().success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("Signed in as QL01"));
    assert!(stdout.contains("1 permissions granted"));
    assert!(stdout.contains(&config_path.to_string_lossy().to_string()));

    Ok(())
}

#[test]
fn status_without_config_reports_signed_out() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("missing.yaml");

    factrack(&config_path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"))
        .stdout(predicate::str::contains("not created yet"));

    Ok(())
}

#[test]
fn session_level_is_persisted() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("config.yaml");

    factrack(&config_path)
        .args(["session", "level", "strict"])
        .assert()
        .success()
        .stdout(predicate::str::contains("strict"));

    let config = Config::load_from(&config_path)?;
    assert_eq!(config.preferences.security_level, SecurityLevel::Strict);
    assert_eq!(
        config.session.map(|s| s.security_level),
        Some(SecurityLevel::Strict)
    );

    Ok(())
}

#[test]
fn check_granted_offline() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &signed_in_config(&["department.view"]));

    factrack(&config_path)
        .args(["check", "--permission", "department.view"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Granted"));

    Ok(())
}

#[test]
fn check_first_criterion_decides() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(
        temp.path(),
        &signed_in_config(&["department.view", "page:reports"]),
    );

    factrack(&config_path)
        .args([
            "check",
            "--permission",
            "department.delete",
            "--page",
            "reports",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Access denied"));

    Ok(())
}

#[test]
fn check_json_output() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &signed_in_config(&["line.view"]));

    let assert = factrack(&config_path)
        .args(["--format", "json", "check", "--any-of", "line.view,team.view"])
        .assert()
        .success();

    let parsed: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(parsed["data"]["granted"], true);
    assert_eq!(parsed["data"]["criterion"], "any_of");

    Ok(())
}

#[test]
fn check_requires_sign_in() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("config.yaml");

    factrack(&config_path)
        .args(["check", "--permission", "line.view"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not signed in"));

    Ok(())
}

#[test]
fn completion_bash_mentions_binary() {
    let temp = tempdir().expect("tempdir");
    factrack(&temp.path().join("config.yaml"))
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("factrack"));
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn login_persists_token_and_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _login = server
        .mock("POST", "/api/auth/login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true, "data": {"token": "fresh-token"}}"#)
        .create();
    let _me = server
        .mock("GET", "/api/auth/me")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"success": true, "data": {
                "user": {"id": "u-1", "username": "QL01"},
                "permissions": [{"code": "line.view"}, {"code": "line.delete", "granted": false}]
            }}"#,
        )
        .create();

    let temp = tempdir()?;
    let config_path = temp.path().join("config.yaml");

    factrack(&config_path)
        .args(["--api-host", &server.url(), "login", "-u", "QL01", "--password", "secret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed in as QL01"));

    let config = Config::load_from(&config_path)?;
    assert_eq!(
        config.jwt.as_ref().map(|t| t.token.as_str()),
        Some("fresh-token")
    );
    assert_eq!(config.api_host.as_deref(), Some(server.url().as_str()));
    let snapshot = config.user_snapshot()?.expect("snapshot stored");
    assert!(snapshot.permissions.has_permission("line.view"));
    assert!(!snapshot.permissions.has_permission("line.delete"));
    assert!(config.session.is_some_and(|s| s.is_authenticated));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn timed_out_session_signs_out_before_command() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let logout = server
        .mock("POST", "/api/auth/logout")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true}"#)
        .create();

    let mut config = signed_in_config(&["line.view"]);
    config.api_host = Some(server.url());
    config.session = Some(SecuritySession {
        last_activity_at: Utc::now() - chrono::Duration::minutes(16),
        security_level: SecurityLevel::Strict,
        is_authenticated: true,
    });

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &config);

    factrack(&config_path)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("inactivity"))
        .stderr(predicate::str::contains("Not signed in"));

    logout.assert();
    let config = Config::load_from(&config_path)?;
    assert!(config.jwt.is_none());
    assert!(config.user.is_none());
    assert!(config.session.is_none());

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn line_list_renders_table() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _lines = server
        .mock("GET", "/api/lines")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"success": true, "data": [
                {"id": "l-1", "code": "L01", "name": "Line 1", "factoryId": "f-1", "capacity": 120}
            ]}"#,
        )
        .create();

    let mut config = signed_in_config(&["line.view"]);
    config.api_host = Some(server.url());
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &config);

    factrack(&config_path)
        .args(["--format", "table", "line", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("L01"))
        .stdout(predicate::str::contains("factory f-1, 120 pcs/shift"));

    Ok(())
}

#[test]
fn line_delete_denied_without_permission() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &signed_in_config(&["line.view"]));

    factrack(&config_path)
        .args(["line", "delete", "l-1", "--yes"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Access denied"));

    Ok(())
}
