//! Action descriptors submitted to the decision service.

use std::fmt::{self, Display, Formatter, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Category of an action intercepted at a call site.
///
/// The set is open: unknown categories round-trip through [`ActionType::Other`].
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActionType {
    /// Launching an external process.
    CommandExec,
    /// Opening a file on the local filesystem.
    FileAccess,
    /// Issuing an outbound HTTP request.
    HttpRequest,
    /// Invoking an agent tool.
    ToolCall,
    /// Any other category understood by the decision service.
    Other(String),
}

impl ActionType {
    /// Returns the wire name of the action type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CommandExec => "command_exec",
            Self::FileAccess => "file_access",
            Self::HttpRequest => "http_request",
            Self::ToolCall => "tool_call",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Ok(match s {
            "" => return Err(Error::invalid_action("action type cannot be empty")),
            "command_exec" => Self::CommandExec,
            "file_access" => Self::FileAccess,
            "http_request" => Self::HttpRequest,
            "tool_call" => Self::ToolCall,
            other => Self::Other(other.to_owned()),
        })
    }
}

impl TryFrom<String> for ActionType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        match value {
            ActionType::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

/// Network target of an action. Present only for network actions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Full URL of the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Host name of the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// URL scheme (e.g. `https`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// URL path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Destination port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Normalized representation of a proposed action.
///
/// Constructed per call and never mutated once handed to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    action_type: ActionType,
    action_name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination: Option<Destination>,
}

impl ActionDescriptor {
    /// Creates a descriptor without arguments or destination.
    #[must_use]
    pub fn new(action_type: ActionType, action_name: impl Into<String>) -> Self {
        Self {
            action_type,
            action_name: action_name.into(),
            arguments: Map::new(),
            destination: None,
        }
    }

    /// Adds a single argument and returns the updated descriptor.
    #[must_use]
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Extends the descriptor with several arguments.
    #[must_use]
    pub fn with_arguments<I, K>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in arguments {
            self.arguments.insert(key.into(), value);
        }
        self
    }

    /// Attaches a network destination.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Returns the action category.
    #[must_use]
    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// Returns the free-form action name (command, HTTP method, operation).
    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Returns the action arguments.
    #[must_use]
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Returns the destination, if any.
    #[must_use]
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Returns a concise label used in log lines.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} `{}`", self.action_type, self.action_name)
    }

    /// Derives the cache fingerprint of this action.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::derive(self)
    }
}

/// Deterministic fingerprint of `(action_type, action_name, arguments)`.
///
/// Argument maps are rendered with object keys sorted at every nesting level,
/// so insertion order never influences the key. The destination is not part of
/// the fingerprint.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    const SEPARATOR: char = '\u{1f}';

    /// Derives the key for the supplied descriptor.
    #[must_use]
    pub fn derive(action: &ActionDescriptor) -> Self {
        let mut key = String::new();
        key.push_str(action.action_type.as_str());
        key.push(Self::SEPARATOR);
        key.push_str(&action.action_name);
        key.push(Self::SEPARATOR);
        if !action.arguments.is_empty() {
            write_canonical_object(&action.arguments, &mut key);
        }
        Self(key)
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (index, (key, value)) in entries.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_canonical_string(key, out);
        out.push(':');
        write_canonical_value(value, out);
    }
    out.push('}');
}

fn write_canonical_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical_value(item, out);
            }
            out.push(']');
        }
        Value::String(text) => write_canonical_string(text, out),
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

fn write_canonical_string(text: &str, out: &mut String) {
    // serde_json renders strings with escaping identical for equal inputs.
    let _ = write!(out, "{}", Value::from(text));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_type_round_trips_unknown_names() {
        let parsed: ActionType = "db_query".parse().unwrap();
        assert_eq!(parsed, ActionType::Other("db_query".into()));
        assert_eq!(String::from(parsed), "db_query");

        let known: ActionType = serde_json::from_value(json!("command_exec")).unwrap();
        assert_eq!(known, ActionType::CommandExec);
        assert!("  ".parse::<ActionType>().is_err());
    }

    #[test]
    fn cache_key_ignores_argument_order() {
        let a = ActionDescriptor::new(ActionType::CommandExec, "ls")
            .with_argument("path", "/tmp")
            .with_argument("flags", json!(["-l", "-a"]))
            .with_argument("env", json!({"B": "2", "A": "1"}));
        let b = ActionDescriptor::new(ActionType::CommandExec, "ls")
            .with_argument("env", json!({"A": "1", "B": "2"}))
            .with_argument("flags", json!(["-l", "-a"]))
            .with_argument("path", "/tmp");

        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_distinguishes_type_name_and_arguments() {
        let base = ActionDescriptor::new(ActionType::CommandExec, "ls").with_argument("path", "/");
        let other_name =
            ActionDescriptor::new(ActionType::CommandExec, "cat").with_argument("path", "/");
        let other_type =
            ActionDescriptor::new(ActionType::FileAccess, "ls").with_argument("path", "/");
        let other_args =
            ActionDescriptor::new(ActionType::CommandExec, "ls").with_argument("path", "/etc");
        let array_order = ActionDescriptor::new(ActionType::CommandExec, "ls")
            .with_argument("path", json!(["b", "a"]));
        let array_order_swapped = ActionDescriptor::new(ActionType::CommandExec, "ls")
            .with_argument("path", json!(["a", "b"]));

        assert_ne!(base.cache_key(), other_name.cache_key());
        assert_ne!(base.cache_key(), other_type.cache_key());
        assert_ne!(base.cache_key(), other_args.cache_key());
        assert_ne!(array_order.cache_key(), array_order_swapped.cache_key());
    }

    #[test]
    fn destination_does_not_affect_cache_key() {
        let plain = ActionDescriptor::new(ActionType::HttpRequest, "GET");
        let with_dest = plain.clone().with_destination(Destination {
            domain: Some("example.com".into()),
            ..Destination::default()
        });
        assert_eq!(plain.cache_key(), with_dest.cache_key());
    }

    #[test]
    fn serialization_omits_empty_fields() {
        let action = ActionDescriptor::new(ActionType::FileAccess, "open");
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(
            value,
            json!({"action_type": "file_access", "action_name": "open"})
        );
    }
}
