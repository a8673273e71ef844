use anyhow::{Context, Result};

pub const DEFAULT_MAX_MESSAGES_PER_INBOX: u64 = 30;
pub const DEFAULT_MAX_BODY_CHARS: usize = 20_000;
pub const DEFAULT_QUOTA_EXEMPT_ROLE: &str = "superadmin";

/// Installation-wide engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Most mailbox entries (reminders included) a non-exempt user may hold.
    pub max_messages_per_inbox: u64,
    pub max_body_chars: usize,
    /// Roles whose holders bypass the inbox quota.
    pub quota_exempt_roles: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_messages_per_inbox: DEFAULT_MAX_MESSAGES_PER_INBOX,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
            quota_exempt_roles: vec![DEFAULT_QUOTA_EXEMPT_ROLE.to_string()],
        }
    }
}

impl EngineConfig {
    /// Read `POSTBOX_*` variables, loading `.env` first if present.
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("POSTBOX_MAX_MESSAGES_PER_INBOX") {
            config.max_messages_per_inbox = raw
                .trim()
                .parse()
                .with_context(|| format!("POSTBOX_MAX_MESSAGES_PER_INBOX: invalid value '{}'", raw))?;
        }
        if let Some(raw) = lookup("POSTBOX_MAX_BODY_CHARS") {
            config.max_body_chars = raw
                .trim()
                .parse()
                .with_context(|| format!("POSTBOX_MAX_BODY_CHARS: invalid value '{}'", raw))?;
        }
        if let Some(raw) = lookup("POSTBOX_QUOTA_EXEMPT_ROLES") {
            config.quota_exempt_roles = raw
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("POSTBOX_MAX_MESSAGES_PER_INBOX", " 5 "),
            ("POSTBOX_MAX_BODY_CHARS", "100"),
            ("POSTBOX_QUOTA_EXEMPT_ROLES", "superadmin, moderator,,"),
        ]))
        .unwrap();

        assert_eq!(config.max_messages_per_inbox, 5);
        assert_eq!(config.max_body_chars, 100);
        assert_eq!(config.quota_exempt_roles, vec!["superadmin", "moderator"]);
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let result = EngineConfig::from_lookup(lookup_from(&[("POSTBOX_MAX_MESSAGES_PER_INBOX", "lots")]));
        assert!(result.is_err());
    }
}
