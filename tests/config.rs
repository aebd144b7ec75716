use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use ncbi_query::config::{Config, ConfigLoader, Endpoint, QueryOverrides};
use ncbi_query::error::QueryError;

#[test]
fn command_line_wins_over_file() {
    let config = Config {
        organism: Some("Munna minuta".to_string()),
        marker: Some("16S".to_string()),
        page_size: Some(50),
        api_key: Some("file-key".to_string()),
        ..Config::default()
    };
    let overrides = QueryOverrides {
        organism: Some("Idotea  pelagica".to_string()),
        marker: None,
        page_size: Some(10),
        api_key: Some("cli-key".to_string()),
    };

    let resolved = ConfigLoader::resolve_config(config, overrides)
        .unwrap()
        .unwrap();
    assert_eq!(resolved.query.organism.as_str(), "Idotea pelagica");
    assert_eq!(resolved.query.marker.as_str(), "16S");
    assert_eq!(resolved.query.page_size.get(), 10);
    assert_eq!(resolved.query.api_key.as_deref(), Some("cli-key"));
}

#[test]
fn no_organism_means_usage() {
    let resolved =
        ConfigLoader::resolve_config(Config::default(), QueryOverrides::default()).unwrap();
    assert!(resolved.is_none());
}

#[test]
fn multi_word_marker_falls_back_to_coi() {
    let overrides = QueryOverrides {
        organism: Some("Idotea".to_string()),
        marker: Some("cyt b".to_string()),
        ..QueryOverrides::default()
    };
    let resolved = ConfigLoader::resolve_config(Config::default(), overrides)
        .unwrap()
        .unwrap();
    assert_eq!(resolved.query.marker.as_str(), "COI");
}

#[test]
fn zero_page_size_is_rejected() {
    let overrides = QueryOverrides {
        organism: Some("Idotea".to_string()),
        page_size: Some(0),
        ..QueryOverrides::default()
    };
    let err = ConfigLoader::resolve_config(Config::default(), overrides).unwrap_err();
    assert_matches!(err, QueryError::InvalidPageSize(0));
}

#[test]
fn blank_api_key_is_dropped() {
    let overrides = QueryOverrides {
        organism: Some("Idotea".to_string()),
        api_key: Some("  ".to_string()),
        ..QueryOverrides::default()
    };
    let resolved = ConfigLoader::resolve_config(Config::default(), overrides)
        .unwrap()
        .unwrap();
    assert_eq!(resolved.query.api_key, None);
}

#[test]
fn load_file_with_endpoint_overrides() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ncbi-query.json");
    fs::write(
        &path,
        r#"{
            "organism": "Idotea balthica",
            "page_size": 100,
            "endpoint": { "scheme": "http", "host": "127.0.0.1:8080", "timeout_secs": 5 }
        }"#,
    )
    .unwrap();

    let config = ConfigLoader::load(path.to_str()).unwrap();
    let resolved = ConfigLoader::resolve_config(config, QueryOverrides::default())
        .unwrap()
        .unwrap();

    assert_eq!(resolved.query.organism.as_str(), "Idotea balthica");
    assert_eq!(resolved.query.page_size.get(), 100);
    assert_eq!(resolved.endpoint.scheme, "http");
    assert_eq!(resolved.endpoint.host, "127.0.0.1:8080");
    assert_eq!(resolved.endpoint.search_path, Endpoint::default().search_path);
    assert_eq!(resolved.endpoint.timeout, Duration::from_secs(5));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::load(path.to_str()).unwrap_err();
    assert_matches!(err, QueryError::ConfigRead(_));
}

#[test]
fn invalid_json_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ organism: ").unwrap();
    let err = ConfigLoader::load(path.to_str()).unwrap_err();
    assert_matches!(err, QueryError::ConfigParse(_));
}
