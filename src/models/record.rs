//! Training records produced by the engine.
//!
//! K_i: Every record carries the sample prompt as a single user message.

use super::{ForgeError, Result, SampleId};
use serde::{Deserialize, Serialize};

/// Message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Ordered list of chat messages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Conversation holding a single user prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
        }
    }

    /// Flatten the conversation to plain text, one message per paragraph.
    pub fn plaintext(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Supervised fine-tuning record: prompt plus the single best completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SftRecord {
    pub sample_id: SampleId,
    pub completion_id: u64,
    pub prompt: Conversation,
    pub completion: String,
    pub rating: u8,
    #[serde(default)]
    pub is_truncated: bool,
}

/// DPO preference pair (chosen vs rejected for the same prompt).
///
/// K_i: Chosen has a strictly higher rating than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpoPair {
    pub sample_id: SampleId,
    pub prompt: Conversation,

    pub chosen_id: u64,
    pub chosen: String,
    pub chosen_rating: u8,

    pub rejected_id: u64,
    pub rejected: String,
    pub rejected_rating: u8,
}

/// KTO binary-labeled example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KtoExample {
    pub sample_id: SampleId,
    pub completion_id: u64,
    pub prompt: Conversation,
    pub completion: String,
    pub rating: u8,
    /// `true` for good, `false` for bad
    pub label: bool,
}

/// Records produced by one export, all of one training type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "records", rename_all = "lowercase")]
pub enum TrainingRecords {
    Sft(Vec<SftRecord>),
    Dpo(Vec<DpoPair>),
    Kto(Vec<KtoExample>),
}

impl TrainingRecords {
    pub fn len(&self) -> usize {
        match self {
            Self::Sft(r) => r.len(),
            Self::Dpo(r) => r.len(),
            Self::Kto(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move every record of `other` onto the end of `self`.
    ///
    /// K_i: One export produces a single record shape.
    pub fn append(&mut self, other: TrainingRecords) -> Result<()> {
        match (self, other) {
            (Self::Sft(a), Self::Sft(b)) => a.extend(b),
            (Self::Dpo(a), Self::Dpo(b)) => a.extend(b),
            (Self::Kto(a), Self::Kto(b)) => a.extend(b),
            _ => {
                return Err(ForgeError::Internal(
                    "cannot mix training record types in one export".to_string(),
                ))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kto(sample_id: SampleId, label: bool) -> KtoExample {
        KtoExample {
            sample_id,
            completion_id: sample_id * 10,
            prompt: Conversation::from_prompt("p"),
            completion: "c".to_string(),
            rating: if label { 9 } else { 2 },
            label,
        }
    }

    #[test]
    fn test_append_same_type() {
        let mut records = TrainingRecords::Kto(vec![kto(1, true)]);
        records
            .append(TrainingRecords::Kto(vec![kto(2, false), kto(3, true)]))
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_append_mixed_types_is_internal_error() {
        let mut records = TrainingRecords::Kto(vec![kto(1, true)]);
        let err = records.append(TrainingRecords::Sft(Vec::new())).unwrap_err();
        assert!(matches!(err, ForgeError::Internal(_)));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_plaintext_joins_paragraphs() {
        let conversation = Conversation {
            messages: vec![Message::user("first"), Message::assistant("second")],
        };
        assert_eq!(conversation.plaintext(), "first\n\nsecond");
    }
}
