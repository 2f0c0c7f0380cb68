use serde::Deserialize;
use std::collections::BTreeMap;

/// Shard count used when neither an override nor a default is configured (unsharded).
pub const DEFAULT_SHARDS: u32 = 1;

/// Resolve the shard count for `name`.
///
/// Returns the override for `name` if one exists, otherwise `default`, otherwise
/// [DEFAULT_SHARDS].
pub fn resolve_shard_count(
    name: &str,
    overrides: &BTreeMap<String, u32>,
    default: Option<u32>,
) -> u32 {
    overrides
        .get(name)
        .copied()
        .or(default)
        .unwrap_or(DEFAULT_SHARDS)
}

/// Shard counts for a [Client](crate::Client).
///
/// ```yaml
/// shards:
///   visits: 16
///   signups: 2
/// default_shards: 4
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shard count for specific counter names.
    pub shards: BTreeMap<String, u32>,

    /// Shard count for names without an entry in `shards`.
    pub default_shards: Option<u32>,
}

impl Config {
    /// Set the shard count of `name`.
    pub fn with_shards(mut self, name: impl Into<String>, shards: u32) -> Self {
        self.shards.insert(name.into(), shards);
        self
    }

    /// Set the shard count used for names without an override.
    pub fn with_default_shards(mut self, shards: u32) -> Self {
        self.default_shards = Some(shards);
        self
    }

    /// Shard count to use for `name`.
    pub fn shards_for(&self, name: &str) -> u32 {
        resolve_shard_count(name, &self.shards, self.default_shards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("friends", 2; "override wins over default")]
    #[test_case("random", 4; "default applies without override")]
    fn test_resolve(name: &str, expected: u32) {
        let config = Config::default()
            .with_shards("friends", 2)
            .with_default_shards(4);
        assert_eq!(config.shards_for(name), expected);
    }

    #[test]
    fn test_unconfigured_is_unsharded() {
        let config = Config::default();
        assert_eq!(config.shards_for("beans"), DEFAULT_SHARDS);
        assert_eq!(DEFAULT_SHARDS, 1);
    }

    #[test]
    fn test_override_without_default() {
        let config = Config::default().with_shards("highTraffic", 16);
        assert_eq!(config.shards_for("highTraffic"), 16);
        assert_eq!(config.shards_for("lowTraffic"), 1);
    }

    #[test]
    fn test_free_function() {
        let mut overrides = BTreeMap::new();
        overrides.insert("a".to_string(), 3);
        assert_eq!(resolve_shard_count("a", &overrides, Some(7)), 3);
        assert_eq!(resolve_shard_count("b", &overrides, Some(7)), 7);
        assert_eq!(resolve_shard_count("b", &overrides, None), 1);
    }

    #[test]
    fn test_yaml() {
        let config: Config = serde_yaml::from_str(
            "shards:\n  visits: 16\n  signups: 2\ndefault_shards: 4\n",
        )
        .unwrap();
        assert_eq!(config.shards_for("visits"), 16);
        assert_eq!(config.shards_for("signups"), 2);
        assert_eq!(config.shards_for("other"), 4);

        // Every field is optional
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }
}
