//! Strongly typed identifiers for workflows and tasks.
//!
//! Wrapping plain strings keeps workflow ids and task ids from being
//! accidentally swapped at call sites, the same role `TaskId`/`AgentId`
//! newtypes play elsewhere in this codebase.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(WorkflowId);
string_id!(TaskId);
string_id!(AgentId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(WorkflowId::generate(), WorkflowId::generate());
    }

    #[test]
    fn display_matches_inner_string() {
        let id = TaskId::new("task-1");
        assert_eq!(id.to_string(), "task-1");
        assert_eq!(id.as_str(), "task-1");
    }
}
