use ckg::config::*;
use tempfile::TempDir;

#[test]
fn test_default_config_has_c_family_and_python_patterns() {
    let config = EngineConfig::default();
    assert!(config.include.iter().any(|p| p == "**/*.c"));
    assert!(config.include.iter().any(|p| p == "**/*.hpp"));
    assert!(config.include.iter().any(|p| p == "**/*.py"));
    assert!(config.exclude.iter().any(|p| p == "build/**"));
    assert!(config.track_calls);
}

#[test]
fn test_save_and_load_config() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        parse_timeout_ms: 250,
        sweep_buckets: 4,
        track_calls: false,
        ..EngineConfig::default()
    };
    save_config(dir.path(), &config).unwrap();
    let loaded = load_config(dir.path()).unwrap();
    assert_eq!(config, loaded);
}

#[test]
fn test_load_missing_config_returns_default() {
    let dir = TempDir::new().unwrap();
    let loaded = load_config(dir.path()).unwrap();
    assert_eq!(loaded.root_dir, dir.path().to_string_lossy());
    assert_eq!(loaded.include, EngineConfig::default().include);
}

#[test]
fn test_partial_config_fills_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(get_ckg_dir(dir.path())).unwrap();
    std::fs::write(get_config_path(dir.path()), r#"{ "max_parallel_parses": 2 }"#).unwrap();

    let loaded = load_config(dir.path()).unwrap();
    assert_eq!(loaded.max_parallel_parses, 2);
    assert_eq!(loaded.parse_timeout_ms, EngineConfig::default().parse_timeout_ms);
    assert_eq!(loaded.database, "ckg.db");
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(get_ckg_dir(dir.path())).unwrap();
    std::fs::write(get_config_path(dir.path()), "{ not json").unwrap();

    let err = load_config(dir.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
fn test_should_include_file() {
    let config = EngineConfig::default();
    assert!(should_include_file("src/main.c", &config));
    assert!(should_include_file("include/shape.hpp", &config));
    assert!(should_include_file("tools/gen.py", &config));
    assert!(!should_include_file("build/generated.c", &config));
    assert!(!should_include_file("pkg/__pycache__/mod.py", &config));
    assert!(!should_include_file("README.md", &config));
}

#[test]
fn test_parallelism_and_buckets_never_zero() {
    let config = EngineConfig {
        max_parallel_parses: 0,
        sweep_buckets: 0,
        ..EngineConfig::default()
    };
    assert_eq!(config.parallelism(), 1);
    assert_eq!(config.buckets(), 1);
}

#[test]
fn test_database_path_lives_in_ckg_dir() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::default();
    let path = get_database_path(dir.path(), &config);
    assert_eq!(path, dir.path().join(".ckg").join("ckg.db"));
}
