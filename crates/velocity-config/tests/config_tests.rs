// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the configuration system.

use std::io::Write;

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use velocity_config::diagnostic::ConfigError;
use velocity_config::model::VelocityConfig;
use velocity_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_path, load_config_from_str,
};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[engine]
log_level = "debug"
validate_patched_source = false
retire_single_use_rules = false

[diagnostics]
warn_on_miss = false
history_limit = 128

[plugins.MessageLogger]
enabled = true
settings = { ignoreBots = true, logEdits = "all" }
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.engine.log_level, "debug");
    assert!(!config.engine.validate_patched_source);
    assert!(!config.engine.retire_single_use_rules);
    assert!(!config.diagnostics.warn_on_miss);
    assert_eq!(config.diagnostics.history_limit, 128);

    let logger = config.plugin("MessageLogger").unwrap();
    assert_eq!(logger.enabled, Some(true));
    assert_eq!(logger.settings["logEdits"].as_str(), Some("all"));
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config, VelocityConfig::default());
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let err = load_config_from_str("[engien]\nlog_level = \"info\"\n").unwrap_err();
    assert!(err.to_string().contains("engien"), "got: {err}");
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = "[diagnostics]\nhistroy_limit = 10\n";
    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            valid_keys,
            ..
        } => {
            assert_eq!(key, "histroy_limit");
            assert_eq!(suggestion.as_deref(), Some("history_limit"));
            assert!(valid_keys.contains("warn_on_miss"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[diagnostics]\nhistory_limit = \"lots\"\n").unwrap_err();
    assert!(matches!(&errors[0], ConfigError::InvalidType { key, .. } if key.contains("history_limit")));
}

#[test]
fn validation_runs_after_loading() {
    let errors = load_and_validate_str("[diagnostics]\nhistory_limit = 0\n").unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("history_limit"))));
}

#[test]
fn later_layers_override_earlier_ones() {
    let config: VelocityConfig = Figment::new()
        .merge(Serialized::defaults(VelocityConfig::default()))
        .merge(Toml::string("[engine]\nlog_level = \"warn\"\n"))
        .merge(("engine.log_level", "trace"))
        .extract()
        .unwrap();
    assert_eq!(config.engine.log_level, "trace");
    assert!(config.engine.validate_patched_source);
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\nretire_single_use_rules = false").unwrap();

    let config = load_config_from_path(file.path()).unwrap();
    assert!(!config.engine.retire_single_use_rules);
    assert!(load_and_validate_path(file.path()).is_ok());
}

#[test]
fn missing_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from_path(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.diagnostics.history_limit, 4096);
}

#[test]
#[tracing_test::traced_test]
fn skipped_layers_are_logged() {
    let dir = tempfile::tempdir().unwrap();
    load_config_from_path(&dir.path().join("absent.toml")).unwrap();
    assert!(logs_contain("config file not found, skipping"));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\nlog_level = \"debug\"").unwrap();
    load_config_from_path(file.path()).unwrap();
    assert!(logs_contain("merging config file"));
}

#[test]
fn file_errors_carry_suggestions() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\nlog_levl = \"info\"").unwrap();

    let errors = load_and_validate_path(file.path()).unwrap_err();
    match &errors[0] {
        ConfigError::UnknownKey { suggestion, .. } => {
            assert_eq!(suggestion.as_deref(), Some("log_level"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn errors_render_as_diagnostics() {
    use miette::Diagnostic;

    let errors = load_and_validate_str("[engine]\nlog_level = \"chatty\"\n").unwrap_err();
    let code = errors[0].code().map(|c| c.to_string());
    assert_eq!(code.as_deref(), Some("velocity::config::validation"));
}
