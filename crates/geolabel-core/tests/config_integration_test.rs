//! Integration tests for layered configuration
//!
//! These tests verify that configuration loading follows the correct precedence:
//! CLI arguments > Environment variables > Config file > Defaults

use geolabel_core::config::{CliConfigOverrides, ConfigSource, LayeredConfig};
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn clear_env() {
    for key in [
        "GEOLABEL_DATA_DIR",
        "GEOLABEL_TILE_SIZE",
        "GEOLABEL_RESOLUTION_M",
        "GEOLABEL_OVERLAP",
        "GEOLABEL_BANDS",
        "GEOLABEL_CLOUD_COVER_MAX",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "tile_size = 512\nresolution_m = 20.0").unwrap();

    env::set_var("GEOLABEL_TILE_SIZE", "128");

    let config = LayeredConfig::with_defaults()
        .load_from_file(file.path())
        .unwrap()
        .load_from_env();

    assert_eq!(config.tile_size.value, 128);
    assert_eq!(config.tile_size.source, ConfigSource::Environment);
    assert_eq!(config.resolution_m.value, 20.0);
    assert_eq!(config.resolution_m.source, ConfigSource::File);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_value_is_ignored() {
    clear_env();
    env::set_var("GEOLABEL_OVERLAP", "half");
    env::set_var("GEOLABEL_CLOUD_COVER_MAX", "300");

    let config = LayeredConfig::with_defaults().load_from_env();

    assert_eq!(config.overlap.value, 0.5);
    assert_eq!(config.overlap.source, ConfigSource::Default);
    assert_eq!(config.cloud_cover_max.source, ConfigSource::Default);

    clear_env();
}

#[test]
#[serial]
fn test_bands_from_env() {
    clear_env();
    env::set_var("GEOLABEL_BANDS", "B4, B3 ,B2,");

    let config = LayeredConfig::with_defaults().load_from_env();
    assert_eq!(config.bands.value, vec!["B4", "B3", "B2"]);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var("GEOLABEL_DATA_DIR", "/tmp/from-env");

    let mut config = LayeredConfig::with_defaults().load_from_env();
    config.update_from_cli(CliConfigOverrides {
        data_dir: Some("/tmp/from-cli".into()),
        ..Default::default()
    });

    assert_eq!(config.data_dir.value.to_str(), Some("/tmp/from-cli"));
    assert_eq!(config.data_dir.source, ConfigSource::Cli);

    clear_env();
}

#[test]
#[serial]
fn test_load_with_missing_file_uses_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let config = LayeredConfig::load(Some(&dir.path().join("geolabel.toml"))).unwrap();

    assert_eq!(config.tile_size.source, ConfigSource::Default);
    assert!(config.validate().is_ok());
}
