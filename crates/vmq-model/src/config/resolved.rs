use std::{collections::BTreeMap, path::Path};

use tracing::{debug, warn};

use super::{defaults::Defaults, value::ConfigValue};

/// Configuration after overlaying a file source onto the defaults table.
///
/// Loaded once at startup and immutable thereafter.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    values: BTreeMap<String, BTreeMap<String, ConfigValue>>,
    fully_loaded: bool,
}

impl ResolvedConfig {
    /// Resolve `defaults` against an optional file text.
    ///
    /// For every `(section, key)` in the defaults table, a corresponding
    /// entry in `source` (if any) replaces the default after numeric
    /// coercion. Keys and sections not present in the defaults table are
    /// ignored. This never fails: `source = None`, unparsable text, or any
    /// key falling back to its default yields `fully_loaded() == false`.
    pub fn resolve(defaults: &Defaults, source: Option<&str>) -> Self {
        let mut fully_loaded = source.is_some();

        let parsed: Option<toml::Table> = match source {
            Some(text) => match toml::from_str(text) {
                Ok(table) => Some(table),
                Err(e) => {
                    warn!(error = %e, "cannot parse configuration source, using defaults");
                    fully_loaded = false;
                    None
                }
            },
            None => None,
        };

        let mut values: BTreeMap<String, BTreeMap<String, ConfigValue>> = BTreeMap::new();
        for (section, entries) in defaults.iter() {
            let mut resolved: BTreeMap<String, ConfigValue> = BTreeMap::new();
            for (key, default) in entries {
                let from_file = parsed
                    .as_ref()
                    .and_then(|t| t.get(section))
                    .and_then(|s| s.as_table())
                    .and_then(|s| s.get(*key))
                    .map(coerce);

                match from_file {
                    Some(value) => {
                        debug!(section, key, %value, "configuration value from file");
                        resolved.insert(key.to_string(), value);
                    }
                    None => {
                        debug!(section, key, value = %default, "configuration value from default");
                        resolved.insert(key.to_string(), default.clone());
                        fully_loaded = false;
                    }
                }
            }
            values.insert(section.to_string(), resolved);
        }

        Self {
            values,
            fully_loaded,
        }
    }

    /// Resolve against a file on disk. A missing or unreadable file is not
    /// an error; the result is fully defaulted and flagged accordingly.
    pub fn load(defaults: &Defaults, path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::resolve(defaults, Some(&text)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read configuration file");
                Self::resolve(defaults, None)
            }
        }
    }

    /// Whether every known key was read from the file source, with no
    /// fallback to a default.
    pub fn fully_loaded(&self) -> bool {
        self.fully_loaded
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&ConfigValue> {
        self.values.get(section)?.get(key)
    }

    /// Numeric value of a key, `None` when the key is unknown or resolved
    /// to a non-numeric string.
    pub fn get_f64(&self, section: &str, key: &str) -> Option<f64> {
        self.get(section, key)?.as_f64()
    }

    /// Like [`get_f64`](Self::get_f64) truncated to an integer; negative
    /// values clamp to zero.
    pub fn get_u64(&self, section: &str, key: &str) -> Option<u64> {
        self.get_f64(section, key).map(|n| {
            if n.is_sign_negative() { 0 } else { n as u64 }
        })
    }

    pub fn get_str(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key)?.as_str()
    }
}

/// Coerce a raw TOML value: numbers stay numbers, numeric strings become
/// numbers, everything else is kept as its textual form.
fn coerce(raw: &toml::Value) -> ConfigValue {
    match raw {
        toml::Value::Integer(i) => ConfigValue::Number(*i as f64),
        toml::Value::Float(f) => ConfigValue::Number(*f),
        toml::Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => ConfigValue::Number(n),
            Err(_) => ConfigValue::Text(s.clone()),
        },
        toml::Value::Boolean(b) => ConfigValue::Text(b.to_string()),
        other => ConfigValue::Text(other.to_string()),
    }
}
