//! State diff entities produced by the diff builder.

use serde::{Deserialize, Serialize};
use shared_types::{Block, Hash};
use std::collections::BTreeMap;

/// A changed storage slot of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDiff {
    /// Hashed storage key (trie leaf key).
    pub leaf_key: Hash,
    /// Encoded slot value after the block.
    pub value: Vec<u8>,
}

/// A changed account, keyed by its hashed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDiff {
    /// Hashed address (trie leaf key).
    pub leaf_key: Hash,
    /// Encoded account after the block (empty for deleted accounts).
    pub value: Vec<u8>,
    /// Changed storage slots.
    pub storage: Vec<StorageDiff>,
}

/// Account-level changes between a parent and a current state root.
///
/// Accounts are held in `BTreeMap`s keyed by leaf key so account order is
/// independent of the order in which the builder discovered the changes.
/// Storage slots keep builder order here; encoders sort them by leaf key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateDiff {
    pub block_number: u64,
    pub block_hash: Hash,
    pub created_accounts: BTreeMap<Hash, AccountDiff>,
    pub deleted_accounts: BTreeMap<Hash, AccountDiff>,
    pub updated_accounts: BTreeMap<Hash, AccountDiff>,
}

impl StateDiff {
    /// The canonical empty diff for a block: identity only, no account deltas.
    pub fn empty_for(block: &Block) -> Self {
        Self {
            block_number: block.number(),
            block_hash: block.hash(),
            ..Self::default()
        }
    }

}
