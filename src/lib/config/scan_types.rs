use std::collections::HashMap;

use serde::Deserialize;

use super::ConfigError;

/// Launch policy for one scan type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTypePolicy {
    pub default_count: usize,
    #[serde(default)]
    pub queue_url: Option<String>,
}

/// Scan type name to launch policy, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct ScanTypeRegistry {
    policies: HashMap<String, ScanTypePolicy>,
}

const BUILTIN: [(&str, usize); 5] = [
    ("shodan", 5),
    ("dnstwist", 30),
    ("hibp", 20),
    ("intelx", 10),
    ("cybersixgill", 10),
];

impl ScanTypeRegistry {
    /// Built-in scan types, each reading its queue from `<NAME>_QUEUE_URL`.
    pub fn builtin() -> Self {
        Self::builtin_with(|name| std::env::var(name).ok())
    }

    pub fn builtin_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let policies = BUILTIN
            .iter()
            .map(|(name, default_count)| {
                let env_name = format!("{}_QUEUE_URL", name.to_uppercase());
                let policy = ScanTypePolicy {
                    default_count: *default_count,
                    queue_url: lookup(&env_name).filter(|u| !u.is_empty()),
                };
                (name.to_string(), policy)
            })
            .collect();
        Self { policies }
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let policies: HashMap<String, ScanTypePolicy> = serde_json::from_str(raw)?;
        Ok(Self { policies })
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn get(&self, scan_type: &str) -> Option<&ScanTypePolicy> {
        self.policies.get(scan_type)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
