//! Layered config loading: defaults < system file < env < workspace file < override.

use crate::env::apply_env_overrides;
use crate::types::Config;
use std::path::Path;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A config file existed but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A config file existed but was not valid TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// The merged configuration could not be deserialized into [`Config`].
    #[error("failed to materialize merged config: {0}")]
    Materialize(String),
}

/// Load configuration by merging, in increasing priority:
/// 1. built-in defaults
/// 2. `system_config_path`, if it exists
/// 3. `MERIDIAN_*` environment variables
/// 4. `workspace_config_path`, if it exists
/// 5. `runtime_override`, a caller-supplied partial TOML document
pub fn load_layered(
    system_config_path: Option<&Path>,
    workspace_config_path: Option<&Path>,
    runtime_override: Option<&str>,
) -> Result<Config, ConfigError> {
    let mut merged = toml::Value::try_from(crate::default_config())
        .map_err(|e| ConfigError::Materialize(e.to_string()))?;

    if let Some(path) = system_config_path {
        if let Some(layer) = read_toml_layer(path)? {
            merge_toml(&mut merged, layer);
        }
    }

    // Materialize, apply env, re-serialize so the env layer sits between
    // system and workspace config as the ordering requires.
    let mut cfg: Config = merged
        .clone()
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Materialize(e.to_string()))?;
    apply_env_overrides(&mut cfg);
    merged = toml::Value::try_from(&cfg).map_err(|e| ConfigError::Materialize(e.to_string()))?;

    if let Some(path) = workspace_config_path {
        if let Some(layer) = read_toml_layer(path)? {
            merge_toml(&mut merged, layer);
        }
    }

    if let Some(raw) = runtime_override {
        let layer: toml::Value = raw
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: "<runtime override>".to_string(),
                source: e,
            })?;
        merge_toml(&mut merged, layer);
    }

    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Materialize(e.to_string()))
}

fn read_toml_layer(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let value = contents.parse().map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Recursively merge `overlay` onto `base`, in place. Tables merge key by
/// key; any other value (including arrays) is replaced wholesale.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (k, v) in overlay_table {
                match base_table.get_mut(&k) {
                    Some(existing) => merge_toml(existing, v),
                    None => {
                        base_table.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn later_layers_override_earlier_ones() {
        let mut workspace_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(workspace_file, "gateway_bind = \"0.0.0.0:1234\"").unwrap();

        let cfg = load_layered(None, Some(workspace_file.path()), None).unwrap();
        assert_eq!(cfg.gateway_bind, "0.0.0.0:1234");
        // Untouched fields keep their built-in default.
        assert_eq!(cfg.default_model, crate::default_config().default_model);
    }

    #[test]
    fn runtime_override_wins_over_everything() {
        let mut workspace_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(workspace_file, "gateway_bind = \"0.0.0.0:1234\"").unwrap();

        let cfg = load_layered(
            None,
            Some(workspace_file.path()),
            Some("gateway_bind = \"0.0.0.0:9999\""),
        )
        .unwrap();
        assert_eq!(cfg.gateway_bind, "0.0.0.0:9999");
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let cfg = load_layered(
            Some(Path::new("/does/not/exist.toml")),
            Some(Path::new("/also/missing.toml")),
            None,
        )
        .unwrap();
        assert_eq!(cfg.gateway_bind, crate::default_config().gateway_bind);
    }
}
