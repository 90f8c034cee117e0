//! Operation schemas
//!
//! Plain data describing each operation's inputs, result and failure kinds.
//! Dispatch reads the required flags; `protocol::docs` renders the rest.

use super::error::ErrorKind;
use serde::Serialize;

/// Example values shared across operations
pub mod examples {
    pub const ACCOUNT: &str = "+12024561414";
    pub const GROUP_ID: &str = "8c6b1c6ddd4cb0c4a1b0e5a9a9e0f1b2c3d4e5f60718293a4b5c6d7e8f901234";
    pub const UUID: &str = "aeed01f0-a234-478e-8cf7-261c283151e7";
    pub const ADDRESS: &str = r#"{"uuid":"aeed01f0-a234-478e-8cf7-261c283151e7","number":"+13215551234"}"#;
    pub const SAFETY_NUMBER: &str = "05236 79201 48315 72990 03188 56102 33871 20034 61192 72006 11843 90257";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    StringList,
    Address,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<&'static str>,
}

impl FieldSchema {
    pub fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            example: None,
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn example(mut self, example: &'static str) -> Self {
        self.example = Some(example);
        self
    }

    /// The `account` field every operation takes.
    pub fn account() -> Self {
        Self::required("account", FieldKind::String, "The account to interact with")
            .example(examples::ACCOUNT)
    }

    pub fn group_id() -> Self {
        Self::required("group_id", FieldKind::String, "Hex group id")
            .example(examples::GROUP_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: Vec<FieldSchema>,
    /// Name of the result type
    pub result: &'static str,
    pub errors: Vec<ErrorKind>,
}

impl OperationSchema {
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn declares(&self, kind: ErrorKind) -> bool {
        // Dispatch itself can always reject input.
        kind == ErrorKind::ValidationError || self.errors.contains(&kind)
    }
}
