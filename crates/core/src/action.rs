use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Abstract mutation a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[serde(alias = "insert")]
    Create,
    Update,
    Delete,
    Upsert,
}

/// Remote store call an action is carried out with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorePrimitive {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Update, Action::Delete, Action::Upsert];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Upsert => "upsert",
        }
    }

    /// Whether every payload item must carry its key before dispatch.
    pub fn requires_key(&self, batch: bool) -> bool {
        match self {
            Self::Create => false,
            Self::Update | Self::Delete => true,
            Self::Upsert => batch,
        }
    }

    /// Single-item translation: every action maps to its namesake.
    pub fn single_primitive(&self) -> StorePrimitive {
        match self {
            Self::Create => StorePrimitive::Insert,
            Self::Update => StorePrimitive::Update,
            Self::Delete => StorePrimitive::Delete,
            Self::Upsert => StorePrimitive::Upsert,
        }
    }

    /// Batch translation. The store has no bulk update-by-match primitive, so a
    /// batch update goes out as an upsert conflict-matched on the key columns.
    pub fn batch_primitive(&self) -> StorePrimitive {
        match self {
            Self::Create => StorePrimitive::Insert,
            Self::Update => StorePrimitive::Upsert,
            Self::Delete => StorePrimitive::Delete,
            Self::Upsert => StorePrimitive::Upsert,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" | "insert" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "upsert" => Ok(Self::Upsert),
            other => Err(CoreError::UnsupportedAction(other.to_string())),
        }
    }
}

impl StorePrimitive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Upsert => "upsert",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_update_translates_to_upsert() {
        assert_eq!(Action::Update.batch_primitive(), StorePrimitive::Upsert);
        assert_eq!(Action::Update.single_primitive(), StorePrimitive::Update);
    }

    #[test]
    fn tables_agree_outside_update() {
        for action in Action::ALL {
            if action != Action::Update {
                assert_eq!(action.single_primitive(), action.batch_primitive());
            }
        }
    }

    #[test]
    fn parses_known_tags_and_rejects_others() {
        assert_eq!("insert".parse::<Action>().unwrap(), Action::Create);
        assert_eq!("upsert".parse::<Action>().unwrap(), Action::Upsert);
        assert_eq!(
            "merge".parse::<Action>().unwrap_err(),
            CoreError::UnsupportedAction("merge".into())
        );
    }

    #[test]
    fn upsert_needs_key_only_in_batches() {
        assert!(!Action::Upsert.requires_key(false));
        assert!(Action::Upsert.requires_key(true));
        assert!(!Action::Create.requires_key(true));
    }
}
