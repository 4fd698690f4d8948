#[cfg(test)]
mod tests {
    use relay_config::ConfigLoader;
    use relay_config::schema::*;
    use std::collections::HashMap;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen, "127.0.0.1:3000");
        assert!(!config.cors);
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_dispatch_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.retry_delay_ms, 500);
    }

    #[test]
    fn test_bridge_config_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.system_id, "mephisto");
        assert_eq!(config.server_id, "mephisto_server");
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[server]
listen = "0.0.0.0:8080"

[bridge]
request_timeout_secs = 5
"#;
        let config: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.bridge.request_timeout_secs, 5);
        // Defaults should fill in
        assert_eq!(config.bridge.system_id, "mephisto");
        assert_eq!(config.dispatch.tick_interval_ms, 50);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = RelayConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: RelayConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.server.listen, config.server.listen);
        assert_eq!(restored.dispatch.retry_delay_ms, config.dispatch.retry_delay_ms);
    }

    // ── Validation ─────────────────────────────────────────────

    #[test]
    fn test_default_config_is_valid() {
        let warnings = RelayConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_zero_tick_interval_is_error() {
        let mut config = RelayConfig::default();
        config.dispatch.tick_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("dispatch.tick_interval_ms"));
    }

    #[test]
    fn test_equal_identities_is_error() {
        let mut config = RelayConfig::default();
        config.bridge.server_id = config.bridge.system_id.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_listen_is_error() {
        let mut config = RelayConfig::default();
        config.server.listen = "localhost".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("server.listen"));
    }

    #[test]
    fn test_disabled_timeout_is_warning() {
        let mut config = RelayConfig::default();
        config.bridge.request_timeout_secs = 0;
        let warnings = config.validate().unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| w.field == "bridge.request_timeout_secs"
                    && w.severity == WarningSeverity::Warning)
        );
    }

    // ── Loader ─────────────────────────────────────────────────

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[dispatch]
tick_interval_ms = 20

[logging]
format = "json"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(file.path())).unwrap();
        let config = loader.get();
        assert_eq!(config.dispatch.tick_interval_ms, 20);
        assert_eq!(config.logging.format, "json");
        assert_eq!(loader.path(), file.path());
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nlisten = ").unwrap();
        assert!(ConfigLoader::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(loader.get().dispatch.retry_delay_ms, 500);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RELAY_LISTEN", "0.0.0.0:9000"),
            ("RELAY_LOG_LEVEL", "debug"),
            ("RELAY_REQUEST_TIMEOUT_SECS", "7"),
            ("RELAY_TICK_INTERVAL_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = ConfigLoader::apply_env_overrides(RelayConfig::default(), |k| {
            env.get(k).map(|v| v.to_string())
        });
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.bridge.request_timeout_secs, 7);
        // Unparseable values are ignored
        assert_eq!(config.dispatch.tick_interval_ms, 50);
    }
}
