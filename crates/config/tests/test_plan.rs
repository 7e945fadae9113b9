//! Test plan for the `parley-config` crate.
//!
//! These tests exercise the configuration loader across default handling,
//! file discovery, environment overrides, and validation behaviour.

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;

use parley_config::{
    load, AppConfig, EnrichmentFailurePolicy, HttpConfig, OverflowPolicy, PipelineConfig,
    PushConfig, RealtimeConfig,
};

const ENV_VARS_TO_RESET: &[&str] = &[
    "OPENROUTER_API_KEY",
    "PARLEY_CONFIG",
    "PARLEY__DATABASE__MAX_CONNECTIONS",
    "PARLEY__DATABASE__URL",
    "PARLEY__ENRICHMENT__FAILURE_POLICY",
    "PARLEY__ENRICHMENT__MODEL",
    "PARLEY__ENRICHMENT__OPENROUTER__API_KEY",
    "PARLEY__ENRICHMENT__TOKEN_CEILING",
    "PARLEY__HTTP__ADDRESS",
    "PARLEY__HTTP__PORT",
    "PARLEY__PIPELINE__ACTION__CAPACITY",
    "PARLEY__PUSH__ACCESS_TOKEN",
    "PARLEY__PUSH__PROJECT_ID",
    "PARLEY__REALTIME__REQUIRE_AUTHENTICATION",
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
    assert!(config.realtime.require_authentication);
    assert_eq!(config.pipeline.message, defaults.pipeline.message);
    assert_eq!(config.pipeline.action, defaults.pipeline.action);
    assert_eq!(config.enrichment.model, defaults.enrichment.model);
    assert_eq!(config.enrichment.failure_policy, EnrichmentFailurePolicy::Drop);
    assert!(config.enrichment.openrouter.api_key.is_none());
    assert!(!config.push.is_enabled());
}

#[test]
#[serial]
fn load_picks_first_available_file_in_search_order() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "parley.toml",
        r#"
        [http]
        port = 4242
        "#,
    );
    write_config_file(
        temp_dir.path(),
        "config/parley.toml",
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
        "parley.toml",
        r#"
        [http]
        port = 8181

        [pipeline.notification]
        capacity = 8
        overflow = "drop_oldest"

        [enrichment]
        token_ceiling = 500
        failure_policy = "deliver_original"
        "#,
    );

    let config = load().expect("configuration load should succeed");
    let defaults = AppConfig::default();

    assert_eq!(config.http.port, 8181);
    assert_eq!(config.http.address, defaults.http.address);
    assert_eq!(config.database.url, defaults.database.url);
    assert_eq!(config.pipeline.notification.capacity, 8);
    assert_eq!(
        config.pipeline.notification.overflow,
        OverflowPolicy::DropOldest
    );
    assert_eq!(config.pipeline.message, defaults.pipeline.message);
    assert_eq!(config.enrichment.token_ceiling, 500);
    assert_eq!(
        config.enrichment.failure_policy,
        EnrichmentFailurePolicy::DeliverOriginal
    );
    assert_eq!(config.enrichment.model, defaults.enrichment.model);
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    let (temp_dir, mut ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "parley.toml",
        r#"
        [http]
        port = 3030
        "#,
    );

    ctx.set_var("PARLEY__HTTP__PORT", "9090");
    ctx.set_var("PARLEY__REALTIME__REQUIRE_AUTHENTICATION", "false");
    ctx.set_var("PARLEY__PUSH__PROJECT_ID", "parley-test");
    ctx.set_var("PARLEY__PUSH__ACCESS_TOKEN", "ya29.token");

    let config = load().expect("configuration load should honour env overrides");
    assert_eq!(config.http.port, 9090);
    assert!(!config.realtime.require_authentication);
    assert!(config.push.is_enabled());
    assert_eq!(config.push.project_id.as_deref(), Some("parley-test"));
}

#[test]
#[serial]
fn load_reads_config_path_from_environment() {
    let (temp_dir, mut ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "elsewhere/custom.toml",
        r#"
        [database]
        url = "sqlite://custom.db"
        "#,
    );
    ctx.set_var(
        "PARLEY_CONFIG",
        temp_dir.path().join("elsewhere/custom.toml").display().to_string(),
    );

    let config = load().expect("configuration load should use PARLEY_CONFIG");
    assert_eq!(config.database.url, "sqlite://custom.db");
}

#[test]
#[serial]
fn load_falls_back_to_openrouter_api_key_variable() {
    let (_temp_dir, mut ctx) = isolated();

    ctx.set_var("OPENROUTER_API_KEY", "sk-from-env");

    let config = load().expect("configuration load should read OPENROUTER_API_KEY");
    assert_eq!(
        config.enrichment.openrouter.api_key.as_deref(),
        Some("sk-from-env")
    );
}

#[test]
#[serial]
fn load_prefers_prefixed_api_key_over_fallback() {
    let (_temp_dir, mut ctx) = isolated();

    ctx.set_var("OPENROUTER_API_KEY", "sk-fallback");
    ctx.set_var("PARLEY__ENRICHMENT__OPENROUTER__API_KEY", "sk-prefixed");

    let config = load().expect("configuration load should read the prefixed key");
    assert_eq!(
        config.enrichment.openrouter.api_key.as_deref(),
        Some("sk-prefixed")
    );
}

#[test]
#[serial]
fn load_errors_on_invalid_toml_contents() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "parley.toml",
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
#[serial]
fn load_rejects_unknown_overflow_policy() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "parley.toml",
        r#"
        [pipeline.message]
        capacity = 4
        overflow = "drop_newest"
        "#,
    );

    let error = load().expect_err("unknown overflow policy should fail");
    assert!(error.to_string().contains("invalid configuration"));
}

#[test]
fn http_config_defaults_match_expected_host_and_port() {
    let defaults = HttpConfig::default();
    assert_eq!(defaults.address, "127.0.0.1");
    assert_eq!(defaults.port, 8080);
}

#[test]
fn realtime_config_defaults_require_authentication() {
    let defaults = RealtimeConfig::default();
    assert!(defaults.require_authentication);
    assert_eq!(defaults.handshake_timeout_seconds, 10);
    assert_eq!(defaults.outbound_buffer, 256);
}

#[test]
fn pipeline_defaults_make_actions_lossy() {
    let defaults = PipelineConfig::default();
    assert_eq!(defaults.action.overflow, OverflowPolicy::DropOldest);
    assert_eq!(defaults.persistence.overflow, OverflowPolicy::Block);
    assert_eq!(defaults.notification.capacity, 256);
}

#[test]
fn push_config_requires_project_and_token() {
    let mut push = PushConfig::default();
    assert!(!push.is_enabled());
    push.project_id = Some("project".into());
    assert!(!push.is_enabled());
    push.access_token = Some("token".into());
    assert!(push.is_enabled());
}
