//! Error and enum types shared by the literal and schema decoders

/// Failure to decode an embedded literal into a nested value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },
}

/// Failure to map a nested value onto a typed record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' has unexpected type, expected {expected}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationType {
    /// A one-to-one conversation.
    OneToOne,
    /// A group conversation.
    Group,
    Unknown(u64),
}

impl From<u64> for ConversationType {
    fn from(code: u64) -> Self {
        match code {
            1 => ConversationType::OneToOne,
            2 => ConversationType::Group,
            other => ConversationType::Unknown(other),
        }
    }
}

/// Kind of a chat message segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    Text,
    LineBreak,
    Link,
    Unknown(u64),
}

impl From<u64> for SegmentType {
    fn from(code: u64) -> Self {
        match code {
            0 => SegmentType::Text,
            1 => SegmentType::LineBreak,
            2 => SegmentType::Link,
            other => SegmentType::Unknown(other),
        }
    }
}

impl SegmentType {
    /// Wire code for this segment type.
    pub fn code(&self) -> u64 {
        match self {
            SegmentType::Text => 0,
            SegmentType::LineBreak => 1,
            SegmentType::Link => 2,
            SegmentType::Unknown(code) => *code,
        }
    }
}

/// Whether participants joined or left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChangeType {
    Join,
    Leave,
    Unknown(u64),
}

impl From<u64> for MembershipChangeType {
    fn from(code: u64) -> Self {
        match code {
            1 => MembershipChangeType::Join,
            2 => MembershipChangeType::Leave,
            other => MembershipChangeType::Unknown(other),
        }
    }
}

/// Typing state carried by a typing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    /// Started typing.
    Typing,
    /// Stopped typing with text entered.
    Paused,
    /// Stopped typing with no text entered.
    Stopped,
    Unknown(u64),
}

impl From<u64> for TypingState {
    fn from(code: u64) -> Self {
        match code {
            1 => TypingState::Typing,
            2 => TypingState::Paused,
            3 => TypingState::Stopped,
            other => TypingState::Unknown(other),
        }
    }
}
