//! Configuration loading: file + environment deep merge into an immutable snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::models::Config;

/// Prefix of environment variables that override configuration.
pub const ENV_PREFIX: &str = "MCP_";

/// Separates nested keys inside an environment variable name.
pub const ENV_PATH_SEPARATOR: &str = "__";

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Holds the active configuration snapshot.
///
/// Readers get an `Arc<Config>`; updates build and validate a complete new snapshot
/// before swapping the reference, so a reader never sees a partial update.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Load from `path` merged with the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, std::env::vars())
    }

    /// Load from `path` merged with the given environment variables.
    pub fn load_with_env(
        path: impl AsRef<Path>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let file_value = read_config_file(&path)?;
        let env_value = env_overrides(vars);
        let merged = merge_deep(file_value, env_value);
        let config = Config::from_value(merged)?;

        info!(
            path = %path.display(),
            provider = %config.providers.primary,
            collection = %config.qdrant.collection_name,
            "configuration loaded"
        );

        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Wrap an already-built configuration.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Merge `partial` onto the current snapshot and commit it only if the whole
    /// result validates. On error the previous snapshot stays active.
    pub fn update(&self, partial: Value) -> Result<Arc<Config>, ConfigError> {
        self.try_update(partial, |_, _| Ok::<_, ConfigError>(()))
            .map(|(next, ())| next)
    }

    /// Like [`ConfigStore::update`], but `build` also has to succeed before the candidate
    /// is committed. It receives the current and the validated candidate snapshot. The
    /// write lock is held throughout, so no other update can commit in between.
    pub fn try_update<T, E>(
        &self,
        partial: Value,
        build: impl FnOnce(&Config, &Config) -> Result<T, E>,
    ) -> Result<(Arc<Config>, T), E>
    where
        E: From<ConfigError>,
    {
        if !partial.is_object() {
            let err = ConfigError::Validation("updates must be a JSON object".to_string());
            return Err(err.into());
        }

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let merged = merge_deep(guard.to_value(), partial);
        let next = Arc::new(Config::from_value(merged)?);
        let built = build(&guard, &next)?;
        *guard = Arc::clone(&next);

        debug!("configuration snapshot replaced");
        Ok((next, built))
    }

    /// Apply `partial` like [`ConfigStore::update`] and also merge it into the config file.
    ///
    /// Only the file's own contents plus `partial` are written, so values that came from
    /// the environment are never persisted.
    pub fn persist(&self, partial: Value) -> Result<Arc<Config>, ConfigError> {
        let on_disk = merge_deep(read_config_file(&self.path)?, partial.clone());
        let (next, ()) = self.try_update(partial, |_, _| {
            write_config_file(&self.path, &strip_nulls(on_disk))
        })?;

        info!(path = %self.path.display(), "configuration saved");
        Ok(next)
    }

    /// Dotted-path lookup, e.g. `providers.primary`. Missing paths yield `None`.
    pub fn get(&self, path: &str) -> Option<Value> {
        resolve_path(&self.snapshot().to_value(), path).cloned()
    }
}

fn read_config_file(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Value::Object(Map::new()));
    }

    let content = std::fs::read_to_string(path)?;
    let parse_err = |message: String| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let value: Value = match extension.as_str() {
        "json" => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        _ => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
    };

    // An empty YAML document parses as null
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        _ => Err(parse_err("top level must be a table/object".to_string())),
    }
}

fn write_config_file(path: &Path, value: &Value) -> Result<(), ConfigError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let content = match extension.as_str() {
        "json" => serde_json::to_string_pretty(value)?,
        "yaml" | "yml" => serde_yaml::to_string(value)?,
        _ => toml::to_string_pretty(value)?,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// TOML has no null; an explicit null means "unset" anyway.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Build the override tree from `MCP_`-prefixed variables.
pub fn env_overrides(vars: impl IntoIterator<Item = (String, String)>) -> Value {
    let mut root = Map::new();

    for (key, raw) in vars {
        let Some(path) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if path.is_empty() || raw.is_empty() {
            continue;
        }

        let segments: Vec<&str> = path.split(ENV_PATH_SEPARATOR).collect();
        set_nested(&mut root, &segments, coerce_env_value(&raw));
    }

    Value::Object(root)
}

/// JSON if it parses, then booleans, then numbers, else the raw string.
pub fn coerce_env_value(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }

    match raw.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(n) = raw.trim().parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(n)
    {
        return Value::Number(number);
    }

    Value::String(raw.to_string())
}

fn set_nested(root: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }

    current.insert(last.to_string(), value);
}

/// Objects merge key by key; every other value in `overlay` replaces `base`.
pub fn merge_deep(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_deep(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load_with_env(dir.path().join("none.toml"), env(&[])).unwrap();
        assert_eq!(*store.snapshot(), Config::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "providers:\n  primary: voyage\nsearch:\n  topK: 7\n").unwrap();

        let store =
            ConfigStore::load_with_env(&path, env(&[("MCP_providers__primary", "mistral")]))
                .unwrap();
        let config = store.snapshot();
        assert_eq!(config.providers.primary, ProviderKind::Mistral);
        assert_eq!(config.search.top_k, 7);
    }

    #[test]
    fn test_toml_and_json_files() {
        let dir = TempDir::new().unwrap();
        let toml_path = dir.path().join("config.toml");
        std::fs::write(&toml_path, "[qdrant]\ncollectionName = \"docs\"\n").unwrap();
        let store = ConfigStore::load_with_env(&toml_path, env(&[])).unwrap();
        assert_eq!(store.snapshot().qdrant.collection_name, "docs");

        let json_path = dir.path().join("config.json");
        std::fs::write(&json_path, r#"{"logging": {"rotateDays": 7}}"#).unwrap();
        let store = ConfigStore::load_with_env(&json_path, env(&[])).unwrap();
        assert_eq!(store.snapshot().logging.rotate_days, 7);
    }

    #[test]
    fn test_unparsable_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = ConfigStore::load_with_env(&path, env(&[]));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_invalid_merged_document_fails() {
        let dir = TempDir::new().unwrap();
        let result = ConfigStore::load_with_env(
            dir.path().join("none.toml"),
            env(&[("MCP_search__scoreThreshold", "3")]),
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_coerce_env_value() {
        assert_eq!(coerce_env_value("true"), json!(true));
        assert_eq!(coerce_env_value("TRUE"), json!(true));
        assert_eq!(coerce_env_value("False"), json!(false));
        assert_eq!(coerce_env_value("42"), json!(42));
        assert_eq!(coerce_env_value("0.5"), json!(0.5));
        assert_eq!(coerce_env_value("1e3"), json!(1000.0));
        assert_eq!(coerce_env_value("[\"a\",\"b\"]"), json!(["a", "b"]));
        assert_eq!(coerce_env_value("mistral"), json!("mistral"));
    }

    #[test]
    fn test_env_overrides_nesting() {
        let value = env_overrides(env(&[
            ("MCP_qdrant__url", "http://qdrant:6334"),
            ("MCP_qdrant__apiKey", "secret"),
            ("OTHER_VAR", "ignored"),
            ("MCP_", "ignored"),
        ]));
        assert_eq!(
            value,
            json!({"qdrant": {"url": "http://qdrant:6334", "apiKey": "secret"}})
        );
    }

    #[test]
    fn test_merge_deep() {
        let merged = merge_deep(
            json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"}),
            json!({"a": {"c": [3], "e": true}, "d": {"nested": 1}}),
        );
        assert_eq!(
            merged,
            json!({"a": {"b": 1, "c": [3], "e": true}, "d": {"nested": 1}})
        );
    }

    #[test]
    fn test_update_round_trip() {
        let store = ConfigStore::from_config(Config::default()).unwrap();
        let before = store.snapshot().to_value();

        store
            .update(json!({"search": {"topK": 9}, "providers": {"primary": "mistral"}}))
            .unwrap();

        assert_eq!(store.get("search.topK"), Some(json!(9)));
        assert_eq!(store.get("providers.primary"), Some(json!("mistral")));

        let after = store.snapshot().to_value();
        assert_eq!(after["search"]["scoreThreshold"], before["search"]["scoreThreshold"]);
        assert_eq!(after["qdrant"], before["qdrant"]);
        assert_eq!(after["logging"], before["logging"]);
        assert_eq!(
            after["providers"]["voyage"],
            before["providers"]["voyage"]
        );
    }

    #[test]
    fn test_failed_update_keeps_previous_snapshot() {
        let store = ConfigStore::from_config(Config::default()).unwrap();
        let before = store.snapshot();

        let result = store.update(json!({"search": {"topK": 3, "scoreThreshold": 2.0}}));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.get("search.topK"), Some(json!(5)));
    }

    #[test]
    fn test_update_rejects_non_object() {
        let store = ConfigStore::from_config(Config::default()).unwrap();
        assert!(store.update(json!([1, 2])).is_err());
    }

    #[test]
    fn test_try_update_commits_only_when_build_succeeds() {
        let store = ConfigStore::from_config(Config::default()).unwrap();

        let failed: Result<(_, ()), ConfigError> =
            store.try_update(json!({"search": {"topK": 9}}), |_, _| {
                Err(ConfigError::Validation("index unreachable".into()))
            });
        assert!(failed.is_err());
        assert_eq!(store.snapshot().search.top_k, 5);

        let (next, seen) = store
            .try_update(json!({"search": {"topK": 9}}), |current, candidate| {
                assert_eq!(current.search.top_k, 5);
                Ok::<_, ConfigError>(candidate.search.top_k)
            })
            .unwrap();
        assert_eq!(seen, 9);
        assert_eq!(next.search.top_k, 9);
        assert_eq!(store.snapshot().search.top_k, 9);
    }

    #[test]
    fn test_persist_writes_only_file_and_update() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\ntopK = 7\n").unwrap();

        let store = ConfigStore::load_with_env(
            &path,
            env(&[("MCP_providers__voyage__apiKey", "secret")]),
        )
        .unwrap();
        store
            .persist(json!({"search": {"scoreThreshold": 0.5}, "qdrant": {"apiKey": null}}))
            .unwrap();

        assert_eq!(store.get("search.scoreThreshold"), Some(json!(0.5)));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("topK = 7"));
        assert!(written.contains("scoreThreshold = 0.5"));
        assert!(!written.contains("secret"));

        let reloaded = ConfigStore::load_with_env(&path, env(&[])).unwrap();
        assert_eq!(reloaded.snapshot().search.top_k, 7);
    }

    #[test]
    fn test_persist_rejects_invalid_without_writing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::load_with_env(&path, env(&[])).unwrap();

        assert!(store.persist(json!({"search": {"topK": 0}})).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_get_missing_path() {
        let store = ConfigStore::from_config(Config::default()).unwrap();
        assert_eq!(store.get("search.nope"), None);
        assert_eq!(store.get("qdrant.apiKey"), None);
        assert!(store.get("filters.payload").is_some());
    }
}
