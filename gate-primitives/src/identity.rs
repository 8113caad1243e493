//! Identity attached to evaluation requests.

use serde::{Deserialize, Serialize};

/// Role assigned when no roles are configured.
pub const DEFAULT_ROLE: &str = "agent";

/// Identity on whose behalf an action is evaluated.
///
/// Roles are kept in insertion order, deduplicated, and never empty.
/// Deserialized identities are normalized the same way as [`Identity::new`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawIdentity")]
pub struct Identity {
    name: String,
    roles: Vec<String>,
}

#[derive(Deserialize)]
struct RawIdentity {
    name: String,
    #[serde(default)]
    roles: Vec<String>,
}

impl From<RawIdentity> for Identity {
    fn from(raw: RawIdentity) -> Self {
        Self::new(raw.name, raw.roles)
    }
}

impl Identity {
    /// Creates an identity, falling back to the [`DEFAULT_ROLE`] when `roles`
    /// yields nothing usable.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for role in roles {
            let role = role.into();
            let role = role.trim();
            if !role.is_empty() && !normalized.iter().any(|existing| existing == role) {
                normalized.push(role.to_owned());
            }
        }
        if normalized.is_empty() {
            normalized.push(DEFAULT_ROLE.to_owned());
        }

        Self {
            name: name.into(),
            roles: normalized,
        }
    }

    /// Creates an identity holding only the default role.
    #[must_use]
    pub fn with_default_role(name: impl Into<String>) -> Self {
        Self::new(name, [DEFAULT_ROLE])
    }

    /// Parses a comma separated role list such as `"agent, reviewer"`.
    #[must_use]
    pub fn parse_roles(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Returns the identity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordered role list.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}
