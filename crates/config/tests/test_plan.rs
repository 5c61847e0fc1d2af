//! Test plan for the `huddle-config` crate.
//!
//! These tests exercise the configuration loader across default handling,
//! file discovery, environment overrides, and validation behaviour.

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;

use huddle_config::{load, AppConfig, AuthConfig, HttpConfig, RealtimeConfig};

const ENV_VARS_TO_RESET: &[&str] = &[
    "HUDDLE_CONFIG",
    "HUDDLE__AUTH__JWT_SECRET",
    "HUDDLE__AUTH__ACCESS_TOKEN_TTL_SECONDS",
    "HUDDLE__AUTH__REFRESH_TOKEN_TTL_SECONDS",
    "HUDDLE__DATABASE__MAX_CONNECTIONS",
    "HUDDLE__DATABASE__URL",
    "HUDDLE__HTTP__ADDRESS",
    "HUDDLE__HTTP__PORT",
    "HUDDLE__REALTIME__OUTBOUND_BUFFER",
    "HUDDLE__REALTIME__MAX_MESSAGE_LENGTH",
];

struct TestContext {
    vars: Vec<(String, Option<String>)>,
    original_dir: Option<PathBuf>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            vars: Vec::new(),
            original_dir: None,
        }
    }

    fn reset_environment(&mut self) {
        for key in ENV_VARS_TO_RESET {
            self.remove_var(key);
        }
    }

    fn set_var(&mut self, key: &str, value: impl AsRef<str>) {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value.as_ref());
        self.vars.push((key.to_string(), previous));
    }

    fn remove_var(&mut self, key: &str) {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        self.vars.push((key.to_string(), previous));
    }

    fn set_current_dir(&mut self, dir: &Path) {
        if self.original_dir.is_none() {
            self.original_dir =
                Some(std::env::current_dir().expect("failed to capture current directory"));
        }
        std::env::set_current_dir(dir).expect("failed to set current directory");
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if let Some(original) = self.original_dir.take() {
            let _ = std::env::set_current_dir(original);
        }

        while let Some((key, value)) = self.vars.pop() {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }
    }
}

fn write_config_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create config directories");
    }
    fs::write(path, contents).expect("failed to write config file");
}

fn isolated() -> (TempDir, TestContext) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());
    (temp_dir, ctx)
}

#[test]
#[serial]
fn load_uses_default_values_when_no_files_found() {
    let (_temp_dir, _ctx) = isolated();

    let config = load().expect("configuration load should succeed without files");
    let defaults = AppConfig::default();

    assert_eq!(config.http.address, defaults.http.address);
    assert_eq!(config.http.port, defaults.http.port);
    assert_eq!(config.database.url, defaults.database.url);
    assert_eq!(
        config.database.max_connections,
        defaults.database.max_connections
    );
    assert_eq!(
        config.auth.access_token_ttl_seconds,
        defaults.auth.access_token_ttl_seconds
    );
    assert!(config.auth.uses_development_secret());
    assert_eq!(
        config.realtime.outbound_buffer,
        defaults.realtime.outbound_buffer
    );
}

#[test]
#[serial]
fn load_picks_first_available_file_in_search_order() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "huddle.toml",
        r#"
        [http]
        port = 4242
        "#,
    );
    write_config_file(
        temp_dir.path(),
        "config/huddle.toml",
        r#"
        [http]
        port = 5151
        "#,
    );

    let config = load().expect("configuration load should pick the first file");
    assert_eq!(config.http.port, 4242);
}

#[test]
#[serial]
fn load_merges_partial_file_with_defaults() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "huddle.toml",
        r#"
        [database]
        max_connections = 50

        [realtime]
        max_message_length = 280
        "#,
    );

    let config = load().expect("configuration load should succeed");
    let defaults = AppConfig::default();

    assert_eq!(config.http.port, defaults.http.port);
    assert_eq!(config.database.max_connections, 50);
    assert_eq!(config.database.url, defaults.database.url);
    assert_eq!(config.realtime.max_message_length, 280);
    assert_eq!(
        config.realtime.outbound_buffer,
        defaults.realtime.outbound_buffer
    );
}

#[test]
#[serial]
fn load_reads_explicit_config_path() {
    let (temp_dir, mut ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "elsewhere/custom.toml",
        r#"
        [auth]
        jwt_secret = "from-explicit-file"
        access_token_ttl_seconds = 60
        "#,
    );
    ctx.set_var(
        "HUDDLE_CONFIG",
        temp_dir
            .path()
            .join("elsewhere/custom.toml")
            .to_string_lossy(),
    );

    let config = load().expect("configuration load should read HUDDLE_CONFIG");
    assert_eq!(config.auth.jwt_secret, "from-explicit-file");
    assert_eq!(config.auth.access_token_ttl_seconds, 60);
    assert!(!config.auth.uses_development_secret());
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    let (temp_dir, mut ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "huddle.toml",
        r#"
        [http]
        port = 3030
        "#,
    );

    ctx.set_var("HUDDLE__HTTP__PORT", "8080");
    ctx.set_var("HUDDLE__DATABASE__URL", "sqlite://override.db");

    let config = load().expect("configuration load should honour env overrides");
    assert_eq!(config.http.port, 8080);
    assert_eq!(config.database.url, "sqlite://override.db");
}

#[test]
#[serial]
fn load_rejects_zero_outbound_buffer() {
    let (_temp_dir, mut ctx) = isolated();

    ctx.set_var("HUDDLE__REALTIME__OUTBOUND_BUFFER", "0");

    let error = load().expect_err("a zero-sized outbound queue is not usable");
    assert!(error.to_string().contains("outbound_buffer"));
}

#[test]
#[serial]
fn load_errors_on_invalid_toml_contents() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "huddle.toml",
        r#"
        [http]
        port = "not-a-number
        "#,
    );

    let error = load().expect_err("invalid TOML should cause load to fail");
    let message = error.to_string();
    assert!(
        message.contains("invalid configuration") || message.contains("unable to build configuration"),
        "unexpected error message: {message}"
    );
}

#[test]
fn auth_config_defaults_use_development_secret() {
    let defaults = AuthConfig::default();
    assert!(defaults.uses_development_secret());
    assert!(defaults.access_token_ttl_seconds < defaults.refresh_token_ttl_seconds);
}

#[test]
fn realtime_config_defaults_are_bounded() {
    let defaults = RealtimeConfig::default();
    assert_eq!(defaults.outbound_buffer, 256);
    assert_eq!(defaults.max_message_length, 4096);
}

#[test]
fn http_config_defaults_match_expected_host_and_port() {
    let defaults = HttpConfig::default();
    assert_eq!(defaults.address, "127.0.0.1");
    assert_eq!(defaults.port, 7070);
}
