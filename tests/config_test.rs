use ovpn_usage::config::{Config, DEFAULT_STATUS_FILE};
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        // Test logging defaults
        assert_eq!(config.logging.level, "ERROR");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.output, "console");

        // Test monitor defaults
        assert_eq!(config.monitor.status_file, PathBuf::from(DEFAULT_STATUS_FILE));
        assert_eq!(config.monitor.interval_secs, 1.0);
        assert_eq!(config.monitor.persist_interval_secs, 5);

        // Test display defaults
        assert!(config.display.color);
        assert!(!config.display.ascii);
    }

    #[test]
    fn test_env_variable_override() {
        env::set_var("OVPN_USAGE_INTERVAL", "2.5");
        env::set_var("OVPN_USAGE_PERSIST_INTERVAL", "30");
        env::set_var("OVPN_USAGE_STATE_PATH", "/var/lib/ovpn-usage/state.json");

        let mut config = Config::default();
        config
            .apply_env_overrides()
            .expect("Failed to apply env overrides");

        assert_eq!(config.monitor.interval_secs, 2.5);
        assert_eq!(config.monitor.persist_interval_secs, 30);
        assert_eq!(
            config.monitor.state_path,
            PathBuf::from("/var/lib/ovpn-usage/state.json")
        );

        // Unparseable numbers are rejected rather than ignored
        env::set_var("OVPN_USAGE_PERSIST_INTERVAL", "soon");
        let mut config = Config::default();
        assert!(config.apply_env_overrides().is_err());

        // Cleanup
        env::remove_var("OVPN_USAGE_INTERVAL");
        env::remove_var("OVPN_USAGE_PERSIST_INTERVAL");
        env::remove_var("OVPN_USAGE_STATE_PATH");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ovpn-usage.toml");
        fs::write(&path, "[monitor]\ninterval_secs = 0.5\n\n[display]\nascii = true\n").unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.monitor.interval_secs, 0.5);
        assert!(loaded.display.ascii);
        assert_eq!(loaded.monitor.persist_interval_secs, 5);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
