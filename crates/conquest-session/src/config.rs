use std::time::Duration;

/// Limits applied to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Largest number of members a lobby accepts.
    pub max_members: usize,
    /// Fewest members needed to start a game.
    pub min_members: usize,
    /// A session untouched for this long is removed, whatever its phase.
    pub expiry: Duration,
}

impl SessionConfig {
    /// How long an idle session survives by default.
    pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_members: 6,
            min_members: 2,
            expiry: Self::DEFAULT_EXPIRY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default_values() {
        let config = SessionConfig::default();
        assert_eq!(config.max_members, 6);
        assert_eq!(config.min_members, 2);
        assert_eq!(config.expiry, Duration::from_secs(86_400));
    }
}
