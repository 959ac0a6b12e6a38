use super::*;
use tempfile::TempDir;

#[test]
fn defaults_when_no_config_file() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let config = Config::load(temp_dir.path()).expect("can load defaults");

    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.server.port, 5001);
    assert_eq!(config.jobs.workers, 2);
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn save_and_reload_roundtrip() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("can load defaults");
    config.ollama.host = "embedding-host".to_string();
    config.ollama.embedding_dimension = 384;
    config.jobs.workers = 4;

    config.save().expect("can save config");

    let reloaded = Config::load(temp_dir.path()).expect("can reload config");
    assert_eq!(reloaded.ollama.host, "embedding-host");
    assert_eq!(reloaded.ollama.embedding_dimension, 384);
    assert_eq!(reloaded.jobs.workers, 4);
}

#[test]
fn rejects_invalid_protocol() {
    let mut config = OllamaConfig::default();
    assert!(config.set_protocol("ftp".to_string()).is_err());
    config.protocol = "ftp".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));
}

#[test]
fn rejects_empty_model_names() {
    let mut config = OllamaConfig::default();
    assert!(config.set_embedding_model("  ".to_string()).is_err());
    assert!(config.set_completion_model(String::new()).is_err());
}

#[test]
fn rejects_out_of_range_dimension() {
    let mut config = OllamaConfig::default();
    assert!(config.set_embedding_dimension(32).is_err());
    assert!(config.set_embedding_dimension(8192).is_err());
    assert!(config.set_embedding_dimension(768).is_ok());
}

#[test]
fn rejects_zero_workers() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("can load defaults");
    config.jobs.workers = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidWorkerCount(0))
    ));
}

#[test]
fn rejects_zero_completion_timeout() {
    let mut config = OllamaConfig::default();
    config.completion_timeout_seconds = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidCompletionTimeout(0))
    ));
}

#[test]
fn ollama_url_formatting() {
    let config = OllamaConfig::default();
    let url = config.ollama_url().expect("default URL is valid");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn storage_paths_under_base_dir() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let config = Config::load(temp_dir.path()).expect("can load defaults");

    assert_eq!(config.database_path(), temp_dir.path().join("messages.db"));
    assert_eq!(
        config.vector_database_path(),
        temp_dir.path().join("vectors")
    );
}
