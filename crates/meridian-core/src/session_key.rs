//! Canonical session key syntax (spec §6) and parsing.
//!
//! ```text
//! agent:{agent_id}:main
//! agent:{agent_id}:group:{channel}:{group_id}
//! agent:{agent_id}:dm:{channel}:{partner_id}
//! agent:{agent_id}:topic:{channel}:{group_id}:{topic_id}
//! agent:{agent_id}:subagent:{subagent_id}
//! ```
//!
//! All identifier segments are URL-safe tokens; colons inside a segment must
//! be escaped by the transport before it reaches this parser.

use crate::ids::AgentId;
use crate::types::SessionType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed, canonical session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey {
    agent_id: AgentId,
    session_type: SessionType,
    channel: Option<String>,
    group_id: Option<String>,
    topic_id: Option<String>,
    partner_id: Option<String>,
    subagent_id: Option<String>,
}

/// Errors parsing a session key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionKeyError {
    /// The key did not start with the `agent:` prefix or had too few segments.
    #[error("malformed session key: {0}")]
    Malformed(String),
    /// An unrecognized session-type segment was present.
    #[error("unknown session type segment: {0}")]
    UnknownType(String),
}

impl SessionKey {
    /// Build the key for a main session.
    #[must_use]
    pub fn main(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            session_type: SessionType::Main,
            channel: None,
            group_id: None,
            topic_id: None,
            partner_id: None,
            subagent_id: None,
        }
    }

    /// Build the key for a group session.
    #[must_use]
    pub fn group(agent_id: AgentId, channel: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            session_type: SessionType::Group,
            channel: Some(channel.into()),
            group_id: Some(group_id.into()),
            topic_id: None,
            partner_id: None,
            subagent_id: None,
        }
    }

    /// Build the key for a direct-message session.
    #[must_use]
    pub fn dm(agent_id: AgentId, channel: impl Into<String>, partner_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            session_type: SessionType::Dm,
            channel: Some(channel.into()),
            group_id: None,
            topic_id: None,
            partner_id: Some(partner_id.into()),
            subagent_id: None,
        }
    }

    /// Build the key for a topic session (threaded sub-conversation of a group).
    #[must_use]
    pub fn topic(
        agent_id: AgentId,
        channel: impl Into<String>,
        group_id: impl Into<String>,
        topic_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            session_type: SessionType::Topic,
            channel: Some(channel.into()),
            group_id: Some(group_id.into()),
            topic_id: Some(topic_id.into()),
            partner_id: None,
            subagent_id: None,
        }
    }

    /// Build the key for a subagent session.
    #[must_use]
    pub fn subagent(agent_id: AgentId, subagent_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            session_type: SessionType::Subagent,
            channel: None,
            group_id: None,
            topic_id: None,
            partner_id: None,
            subagent_id: Some(subagent_id.into()),
        }
    }

    /// The agent this session belongs to.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// The inferred session type.
    #[must_use]
    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    /// The originating channel, if this key names one (group/dm/topic).
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Parse a canonical session key string.
    pub fn parse(s: &str) -> Result<Self, SessionKeyError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 3 || parts[0] != "agent" {
            return Err(SessionKeyError::Malformed(s.to_string()));
        }
        let agent_id = AgentId::new(parts[1]);
        match parts[2] {
            "main" if parts.len() == 3 => Ok(Self::main(agent_id)),
            "group" if parts.len() == 5 => Ok(Self::group(agent_id, parts[3], parts[4])),
            "dm" if parts.len() == 5 => Ok(Self::dm(agent_id, parts[3], parts[4])),
            "topic" if parts.len() == 6 => Ok(Self::topic(agent_id, parts[3], parts[4], parts[5])),
            "subagent" if parts.len() == 4 => Ok(Self::subagent(agent_id, parts[3])),
            other => Err(SessionKeyError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.session_type {
            SessionType::Main => write!(f, "agent:{}:main", self.agent_id),
            SessionType::Group => write!(
                f,
                "agent:{}:group:{}:{}",
                self.agent_id,
                self.channel.as_deref().unwrap_or_default(),
                self.group_id.as_deref().unwrap_or_default()
            ),
            SessionType::Dm => write!(
                f,
                "agent:{}:dm:{}:{}",
                self.agent_id,
                self.channel.as_deref().unwrap_or_default(),
                self.partner_id.as_deref().unwrap_or_default()
            ),
            SessionType::Topic => write!(
                f,
                "agent:{}:topic:{}:{}:{}",
                self.agent_id,
                self.channel.as_deref().unwrap_or_default(),
                self.group_id.as_deref().unwrap_or_default(),
                self.topic_id.as_deref().unwrap_or_default()
            ),
            SessionType::Subagent => write!(
                f,
                "agent:{}:subagent:{}",
                self.agent_id,
                self.subagent_id.as_deref().unwrap_or_default()
            ),
        }
    }
}

impl TryFrom<String> for SessionKey {
    type Error = SessionKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let keys = vec![
            SessionKey::main(AgentId::new("a1")),
            SessionKey::group(AgentId::new("a1"), "telegram", "g1"),
            SessionKey::dm(AgentId::new("a1"), "telegram", "u1"),
            SessionKey::topic(AgentId::new("a1"), "slack", "g1", "t1"),
            SessionKey::subagent(AgentId::new("a1"), "sub1"),
        ];
        for key in keys {
            let s = key.to_string();
            let parsed = SessionKey::parse(&s).unwrap();
            assert_eq!(key, parsed);
        }
    }

    #[test]
    fn infers_session_type_from_key_structure() {
        let key = SessionKey::parse("agent:a1:group:discord:g9").unwrap();
        assert_eq!(key.session_type(), SessionType::Group);
        assert_eq!(key.channel(), Some("discord"));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(SessionKey::parse("agent:a1").is_err());
        assert!(SessionKey::parse("not-agent:a1:main").is_err());
        assert!(SessionKey::parse("agent:a1:bogus").is_err());
    }
}
