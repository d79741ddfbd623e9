use super::expand_tilde;
use super::types::Config;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn expand_paths(config: &mut Config) {
    for path in config.partitions.values_mut() {
        *path = expand_tilde(path);
    }
    config.recovery.path = expand_tilde(&config.recovery.path);
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.partitions.is_empty() {
        errors.push("at least one partition must be configured".to_string());
    }

    for (partition_id, path) in &config.partitions {
        if partition_id.is_empty() {
            errors.push("partition ids must be non-empty".to_string());
        }
        if path.as_os_str().is_empty() {
            errors.push(format!("partition '{partition_id}' has an empty path"));
        }
    }

    if config.corrupt_marker.is_empty() {
        errors.push("corrupt_marker must be non-empty".to_string());
    }

    if config.pipeline.batch_size == 0 {
        errors.push("pipeline.batch_size must be at least 1".to_string());
    }

    if config.recovery.path.as_os_str().is_empty() {
        errors.push("recovery.path must be set".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
