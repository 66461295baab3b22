//! Configuration normalization with priority ordering.
//!
//! Priority order (lowest to highest):
//! 1. Legacy environment variables - `{handlerId}_{setting}`
//! 2. Environment variables - `AgentApplication__UserAuthorization__handlers__{handlerId}__settings__{setting}`
//! 3. Constructor options - values passed to [`ConfigLoader::with_handler`]
//!
//! Handler ids are discovered from constructor options and from the current
//! environment scheme. The legacy scheme only fills in settings for handlers
//! already discovered; it cannot introduce new handlers.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{AuthorizationOptions, ConfigError, HandlerSettings};

/// Prefix of the current environment-variable scheme.
pub const ENV_PREFIX: &str = "AgentApplication__UserAuthorization__handlers__";

const SETTINGS_SEGMENT: &str = "settings";
const TYPE_KEY: &str = "type";

/// Priority levels for configuration sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    LegacyEnvironment = 10,
    Environment = 20,
    Options = 30,
}

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    String,
    Integer,
    Bool,
    List,
}

/// A setting that may be supplied through the environment.
struct SettingKey {
    /// Path inside the handler's settings object.
    path: &'static [&'static str],
    /// Names accepted in the current scheme (after `settings__`).
    names: &'static [&'static str],
    /// Suffix accepted in the legacy scheme (after `{handlerId}_`).
    legacy: &'static str,
    kind: ValueKind,
}

const SETTING_KEYS: &[SettingKey] = &[
    SettingKey {
        path: &["connectionName"],
        names: &["azureBotOAuthConnectionName", "connectionName"],
        legacy: "connectionName",
        kind: ValueKind::String,
    },
    SettingKey {
        path: &["title"],
        names: &["title"],
        legacy: "connectionTitle",
        kind: ValueKind::String,
    },
    SettingKey {
        path: &["text"],
        names: &["text"],
        legacy: "connectionText",
        kind: ValueKind::String,
    },
    SettingKey {
        path: &["maxAttempts"],
        names: &["invalidSignInRetryMax", "maxAttempts"],
        legacy: "maxAttempts",
        kind: ValueKind::Integer,
    },
    SettingKey {
        path: &["enableSso"],
        names: &["enableSso"],
        legacy: "enableSso",
        kind: ValueKind::Bool,
    },
    SettingKey {
        path: &["oboConnectionName"],
        names: &["oboConnectionName"],
        legacy: "oboConnectionName",
        kind: ValueKind::String,
    },
    SettingKey {
        path: &["oboScopes"],
        names: &["oboScopes"],
        legacy: "oboScopes",
        kind: ValueKind::List,
    },
    SettingKey {
        path: &["scopes"],
        names: &["scopes"],
        legacy: "scopes",
        kind: ValueKind::List,
    },
    SettingKey {
        path: &["altBlueprintConnectionName"],
        names: &["altBlueprintConnectionName"],
        legacy: "altBlueprintConnectionName",
        kind: ValueKind::String,
    },
    SettingKey {
        path: &["signInTimeout"],
        names: &["signInTimeout"],
        legacy: "signInTimeout",
        kind: ValueKind::String,
    },
    SettingKey {
        path: &["messages", "invalidCode"],
        names: &["invalidSignInRetryMessage", "messages__invalidCode"],
        legacy: "messages_invalidCode",
        kind: ValueKind::String,
    },
    SettingKey {
        path: &["messages", "invalidCodeFormat"],
        names: &["invalidSignInRetryMessageFormat", "messages__invalidCodeFormat"],
        legacy: "messages_invalidCodeFormat",
        kind: ValueKind::String,
    },
    SettingKey {
        path: &["messages", "maxAttemptsExceeded"],
        names: &["invalidSignInRetryMaxExceededMessage", "messages__maxAttemptsExceeded"],
        legacy: "messages_maxAttemptsExceeded",
        kind: ValueKind::String,
    },
];

fn find_setting(name: &str) -> Option<&'static SettingKey> {
    SETTING_KEYS
        .iter()
        .find(|key| key.names.iter().any(|n| n.eq_ignore_ascii_case(name)))
}

fn find_legacy_setting(suffix: &str) -> Option<&'static SettingKey> {
    SETTING_KEYS
        .iter()
        .find(|key| key.legacy.eq_ignore_ascii_case(suffix))
}

/// Converts a raw environment string to the JSON shape the setting expects.
///
/// Values that do not parse are kept as strings so deserialization reports
/// them against the handler.
fn coerce(kind: ValueKind, raw: &str) -> Value {
    let raw = raw.trim();
    match kind {
        ValueKind::String => Value::String(raw.to_string()),
        ValueKind::Integer => raw
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        ValueKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        ValueKind::List => Value::Array(
            raw.split([',', ' '])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
    }
}

fn set_path(target: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [first, rest @ ..] => {
            let entry = target
                .entry((*first).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// Deep-merges `overlay` into `base`; overlay values win.
fn merge_objects(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_objects(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

type HandlerLayer = BTreeMap<String, Map<String, Value>>;

/// Builds [`AuthorizationOptions`] from constructor options and environment
/// variables.
///
/// # Example
///
/// ```ignore
/// use turnauth_auth::config::ConfigLoader;
///
/// let options = ConfigLoader::new()
///     .with_handler("graph", serde_json::json!({"title": "Sign in to Graph"}))
///     .with_process_env()
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    options: HandlerLayer,
    env: Vec<(String, String)>,
}

impl ConfigLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds constructor options for a handler.
    ///
    /// `settings` is a (possibly partial) settings object in the same shape
    /// as [`HandlerSettings`]; non-object values are ignored.
    #[must_use]
    pub fn with_handler(mut self, id: impl Into<String>, settings: Value) -> Self {
        let layer = self.options.entry(id.into()).or_default();
        if let Value::Object(map) = settings {
            merge_objects(layer, &map);
        }
        self
    }

    /// Adds environment variables.
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Adds the variables of the current process environment.
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_env_vars(std::env::vars())
    }

    /// Settings from the current scheme, keyed by handler id.
    fn current_env_layer(&self) -> HandlerLayer {
        let mut layer = HandlerLayer::new();

        for (name, raw) in &self.env {
            let Some(prefix) = name.get(..ENV_PREFIX.len()) else {
                continue;
            };
            if !prefix.eq_ignore_ascii_case(ENV_PREFIX) {
                continue;
            }

            let rest = &name[ENV_PREFIX.len()..];
            let Some((id, tail)) = rest.split_once("__") else {
                continue;
            };
            if id.is_empty() {
                continue;
            }

            if tail.eq_ignore_ascii_case(TYPE_KEY) {
                layer
                    .entry(id.to_string())
                    .or_default()
                    .insert(TYPE_KEY.to_string(), Value::String(raw.trim().to_string()));
                continue;
            }

            let Some((segment, setting)) = tail.split_once("__") else {
                tracing::debug!(variable = %name, "Ignoring unrecognized authorization variable");
                continue;
            };
            if !segment.eq_ignore_ascii_case(SETTINGS_SEGMENT) {
                tracing::debug!(variable = %name, "Ignoring unrecognized authorization variable");
                continue;
            }

            match find_setting(setting) {
                Some(key) => set_path(
                    layer.entry(id.to_string()).or_default(),
                    key.path,
                    coerce(key.kind, raw),
                ),
                None => {
                    tracing::debug!(variable = %name, "Ignoring unknown authorization setting");
                }
            }
        }

        layer
    }

    /// Settings from the legacy scheme for the given handler ids.
    fn legacy_env_layer<'a>(&self, ids: impl Iterator<Item = &'a String>) -> HandlerLayer {
        let mut layer = HandlerLayer::new();

        for id in ids {
            let prefix = format!("{id}_");
            for (name, raw) in &self.env {
                let Some(suffix) = name.strip_prefix(&prefix) else {
                    continue;
                };

                if suffix.eq_ignore_ascii_case(TYPE_KEY) {
                    layer
                        .entry(id.clone())
                        .or_default()
                        .insert(TYPE_KEY.to_string(), Value::String(raw.trim().to_string()));
                } else if let Some(key) = find_legacy_setting(suffix) {
                    tracing::debug!(
                        handler_id = %id,
                        variable = %name,
                        "Using deprecated authorization variable"
                    );
                    set_path(
                        layer.entry(id.clone()).or_default(),
                        key.path,
                        coerce(key.kind, raw),
                    );
                }
            }
        }

        layer
    }

    /// Merges every source and produces validated options.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownHandlerType` for an unrecognized `type`,
    /// `ConfigError::Parse` when merged settings do not deserialize, and any
    /// error from [`AuthorizationOptions::validate`].
    pub fn load(self) -> Result<AuthorizationOptions, ConfigError> {
        let current = self.current_env_layer();

        let mut ids: Vec<String> = self.options.keys().cloned().collect();
        for id in current.keys() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        let legacy = self.legacy_env_layer(ids.iter());

        let mut layers = [
            (Priority::LegacyEnvironment, &legacy),
            (Priority::Environment, &current),
            (Priority::Options, &self.options),
        ];
        layers.sort_by_key(|(priority, _)| *priority);

        let mut handlers = BTreeMap::new();
        for id in ids {
            let mut merged = Map::new();
            for (_, layer) in &layers {
                if let Some(settings) = layer.get(&id) {
                    merge_objects(&mut merged, settings);
                }
            }

            let handler_type = match merged.get(TYPE_KEY) {
                None => HandlerSettings::DEFAULT_TYPE.to_string(),
                Some(Value::String(t)) => t.to_ascii_lowercase(),
                Some(other) => other.to_string(),
            };
            if !HandlerSettings::TYPES.contains(&handler_type.as_str()) {
                return Err(ConfigError::UnknownHandlerType {
                    handler_id: id,
                    handler_type,
                });
            }
            merged.insert(TYPE_KEY.to_string(), Value::String(handler_type));

            let settings: HandlerSettings = serde_json::from_value(Value::Object(merged))
                .map_err(|e| ConfigError::Parse {
                    handler_id: id.clone(),
                    message: e.to_string(),
                })?;
            handlers.insert(id, settings);
        }

        let options = AuthorizationOptions { handlers };
        options.validate()?;
        tracing::debug!(
            handlers = options.handlers.len(),
            "Authorization configuration normalized"
        );
        Ok(options)
    }
}
