//! Strongly typed client configuration.

use std::env;
use std::fmt::{self, Display, Formatter};
use std::num::{NonZeroU32, NonZeroUsize};
use std::str::FromStr;
use std::time::Duration;

use gate_primitives::{AgentId, Identity};
use tracing::warn;

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

/// Environment variables consulted by [`GateConfig::from_env`].
pub mod env_keys {
    /// Decision service base address.
    pub const SERVER_ADDR: &str = "POLICY_GATE_SERVER_ADDR";
    /// Bearer token sent with every request.
    pub const API_KEY: &str = "POLICY_GATE_API_KEY";
    /// Identity name attached to evaluations.
    pub const IDENTITY_NAME: &str = "POLICY_GATE_IDENTITY_NAME";
    /// Comma separated identity roles.
    pub const IDENTITY_ROLES: &str = "POLICY_GATE_IDENTITY_ROLES";
    /// Agent process identifier recorded on audit events.
    pub const AGENT_ID: &str = "POLICY_GATE_AGENT_ID";
    /// Protocol tag attached to evaluations.
    pub const PROTOCOL: &str = "POLICY_GATE_PROTOCOL";
    /// Framework hint attached to evaluations.
    pub const FRAMEWORK: &str = "POLICY_GATE_FRAMEWORK";
    /// `open` or `closed`.
    pub const FAIL_MODE: &str = "POLICY_GATE_FAIL_MODE";
    /// Per-request timeout.
    pub const TIMEOUT: &str = "POLICY_GATE_TIMEOUT";
    /// Decision cache time-to-live.
    pub const CACHE_TTL: &str = "POLICY_GATE_CACHE_TTL";
    /// Decision cache capacity.
    pub const CACHE_MAX_SIZE: &str = "POLICY_GATE_CACHE_MAX_SIZE";
    /// Delay before each approval status poll.
    pub const APPROVAL_INTERVAL: &str = "POLICY_GATE_APPROVAL_INTERVAL";
    /// Maximum number of approval status polls.
    pub const APPROVAL_MAX_ATTEMPTS: &str = "POLICY_GATE_APPROVAL_MAX_ATTEMPTS";
}

const DEFAULT_SERVER_ADDR: &str = "http://127.0.0.1:8080";
const DEFAULT_IDENTITY_NAME: &str = "sdk-client";
const DEFAULT_PROTOCOL: &str = "sdk";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_MAX_SIZE: usize = 1000;
const DEFAULT_APPROVAL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_APPROVAL_MAX_ATTEMPTS: u32 = 30;

/// Behaviour when the decision service cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FailMode {
    /// Allow the action, record an audit event, and warn.
    #[default]
    Open,
    /// Block the action and surface an unreachable-server error.
    Closed,
}

impl FailMode {
    /// Returns the configuration spelling of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl Display for FailMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(ConfigError::InvalidFailMode(s.to_owned())),
        }
    }
}

/// Complete configuration of a policy decision client.
#[derive(Clone, Debug)]
pub struct GateConfig {
    server_addr: String,
    api_key: Option<String>,
    identity: Identity,
    agent_id: AgentId,
    protocol: String,
    framework: Option<String>,
    fail_mode: FailMode,
    timeout: Duration,
    cache_ttl: Duration,
    cache_max_size: NonZeroUsize,
    approval_interval: Duration,
    approval_max_attempts: NonZeroU32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_owned(),
            api_key: None,
            identity: Identity::with_default_role(DEFAULT_IDENTITY_NAME),
            agent_id: AgentId::random(),
            protocol: DEFAULT_PROTOCOL.to_owned(),
            framework: None,
            fail_mode: FailMode::Open,
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_size: NonZeroUsize::new(DEFAULT_CACHE_MAX_SIZE).expect("non-zero"),
            approval_interval: DEFAULT_APPROVAL_INTERVAL,
            approval_max_attempts: NonZeroU32::new(DEFAULT_APPROVAL_MAX_ATTEMPTS)
                .expect("non-zero"),
        }
    }
}

impl GateConfig {
    /// Creates a configuration targeting `server_addr` with all other settings
    /// at their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidServerAddr`] if the address is not an
    /// absolute http(s) URL.
    pub fn new(server_addr: impl AsRef<str>) -> ConfigResult<Self> {
        Self::default().with_server_addr(server_addr)
    }

    /// Loads the configuration from `POLICY_GATE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary key lookup.
    ///
    /// Missing or blank values keep their defaults. Malformed values are logged
    /// and ignored so a bad environment never prevents a client from starting.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(addr) = get(env_keys::SERVER_ADDR) {
            match sanitize_server_addr(&addr) {
                Ok(addr) => cfg.server_addr = addr,
                Err(err) => warn!(key = env_keys::SERVER_ADDR, error = %err, "ignoring setting"),
            }
        }

        cfg.api_key = get(env_keys::API_KEY).map(|key| key.trim().to_owned());

        let name = get(env_keys::IDENTITY_NAME).unwrap_or_else(|| DEFAULT_IDENTITY_NAME.into());
        let roles = get(env_keys::IDENTITY_ROLES)
            .map(|raw| Identity::parse_roles(&raw))
            .unwrap_or_default();
        cfg.identity = Identity::new(name.trim(), roles);

        if let Some(raw) = get(env_keys::AGENT_ID) {
            match raw.parse() {
                Ok(agent_id) => cfg.agent_id = agent_id,
                Err(err) => warn!(key = env_keys::AGENT_ID, error = %err, "ignoring setting"),
            }
        }

        if let Some(protocol) = get(env_keys::PROTOCOL) {
            cfg.protocol = protocol.trim().to_owned();
        }
        cfg.framework = get(env_keys::FRAMEWORK).map(|framework| framework.trim().to_owned());

        if let Some(raw) = get(env_keys::FAIL_MODE) {
            match raw.parse() {
                Ok(mode) => cfg.fail_mode = mode,
                Err(err) => warn!(key = env_keys::FAIL_MODE, error = %err, "ignoring setting"),
            }
        }

        match lookup_duration(&get, env_keys::TIMEOUT) {
            Some(value) if value.is_zero() => {
                warn!(key = env_keys::TIMEOUT, "ignoring zero timeout");
            }
            Some(value) => cfg.timeout = value,
            None => {}
        }
        if let Some(value) = lookup_duration(&get, env_keys::CACHE_TTL) {
            cfg.cache_ttl = value;
        }
        if let Some(value) = lookup_duration(&get, env_keys::APPROVAL_INTERVAL) {
            cfg.approval_interval = value;
        }

        if let Some(raw) = get(env_keys::CACHE_MAX_SIZE) {
            match raw.trim().parse::<NonZeroUsize>() {
                Ok(size) => cfg.cache_max_size = size,
                Err(err) => warn!(key = env_keys::CACHE_MAX_SIZE, error = %err, "ignoring setting"),
            }
        }
        if let Some(raw) = get(env_keys::APPROVAL_MAX_ATTEMPTS) {
            match raw.trim().parse::<NonZeroU32>() {
                Ok(attempts) => cfg.approval_max_attempts = attempts,
                Err(err) => {
                    warn!(key = env_keys::APPROVAL_MAX_ATTEMPTS, error = %err, "ignoring setting");
                }
            }
        }

        cfg
    }

    /// Overrides the decision service address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidServerAddr`] if the address is not an
    /// absolute http(s) URL.
    pub fn with_server_addr(mut self, server_addr: impl AsRef<str>) -> ConfigResult<Self> {
        self.server_addr = sanitize_server_addr(server_addr.as_ref())?;
        Ok(self)
    }

    /// Supplies the bearer token used for authentication.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the default identity attached to evaluations.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the agent identifier recorded on audit events.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: AgentId) -> Self {
        self.agent_id = agent_id;
        self
    }

    /// Sets the protocol tag attached to evaluations.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Sets the framework hint attached to evaluations.
    #[must_use]
    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    /// Sets the behaviour when the decision service is unreachable.
    #[must_use]
    pub fn with_fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.fail_mode = fail_mode;
        self
    }

    /// Sets the per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> ConfigResult<Self> {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                reason: "must be greater than zero",
            });
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Sets how long cached allow decisions stay valid.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the maximum number of cached decisions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `max_size` is zero.
    pub fn with_cache_max_size(mut self, max_size: usize) -> ConfigResult<Self> {
        self.cache_max_size = NonZeroUsize::new(max_size).ok_or(ConfigError::InvalidValue {
            field: "cache_max_size",
            reason: "must be greater than zero",
        })?;
        Ok(self)
    }

    /// Sets the approval polling cadence and attempt budget.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `max_attempts` is zero.
    pub fn with_approval_polling(
        mut self,
        interval: Duration,
        max_attempts: u32,
    ) -> ConfigResult<Self> {
        self.approval_max_attempts =
            NonZeroU32::new(max_attempts).ok_or(ConfigError::InvalidValue {
                field: "approval_max_attempts",
                reason: "must be greater than zero",
            })?;
        self.approval_interval = interval;
        Ok(self)
    }

    /// Returns the decision service address without a trailing slash.
    #[must_use]
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    /// Returns the configured bearer token.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Returns the default identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the agent identifier.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Returns the protocol tag.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Returns the framework hint.
    #[must_use]
    pub fn framework(&self) -> Option<&str> {
        self.framework.as_deref()
    }

    /// Returns the fail mode.
    #[must_use]
    pub const fn fail_mode(&self) -> FailMode {
        self.fail_mode
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the cache time-to-live.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Returns the cache capacity.
    #[must_use]
    pub const fn cache_max_size(&self) -> NonZeroUsize {
        self.cache_max_size
    }

    /// Returns the delay before each approval poll.
    #[must_use]
    pub const fn approval_interval(&self) -> Duration {
        self.approval_interval
    }

    /// Returns the approval poll budget.
    #[must_use]
    pub const fn approval_max_attempts(&self) -> NonZeroU32 {
        self.approval_max_attempts
    }
}

fn lookup_duration<G>(get: &G, key: &'static str) -> Option<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    let parsed = parse_duration(&raw);
    if parsed.is_none() {
        warn!(key, value = %raw, "ignoring unparseable duration");
    }
    parsed
}

fn sanitize_server_addr(input: &str) -> ConfigResult<String> {
    let trimmed = input.trim();
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return Err(ConfigError::InvalidServerAddr {
            addr: input.to_owned(),
            reason: "must start with http:// or https://",
        });
    };
    if scheme != "http" && scheme != "https" {
        return Err(ConfigError::InvalidServerAddr {
            addr: input.to_owned(),
            reason: "must start with http:// or https://",
        });
    }
    if rest.trim_end_matches('/').is_empty() {
        return Err(ConfigError::InvalidServerAddr {
            addr: input.to_owned(),
            reason: "missing host",
        });
    }
    Ok(trimmed.trim_end_matches('/').to_owned())
}
