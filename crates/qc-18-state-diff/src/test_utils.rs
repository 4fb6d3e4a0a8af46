//! Test doubles and fixtures shared by unit and integration tests.

use crate::domain::{AccountDiff, StateDiff, StorageDiff};
use crate::ports::{BuilderError, StateDiffBuilder};
use parking_lot::Mutex;
use shared_types::{Block, BlockHeader, Hash};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Builder returning scripted results per block hash.
///
/// Blocks without a script get the canonical empty diff. Every call is
/// counted, which is how tests observe the zero-work guarantee.
#[derive(Default)]
pub struct ScriptedBuilder {
    scripts: Mutex<HashMap<Hash, Result<StateDiff, BuilderError>>>,
    calls: AtomicUsize,
}

impl ScriptedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_diff(&self, diff: StateDiff) {
        self.scripts.lock().insert(diff.block_hash, Ok(diff));
    }

    pub fn script_failure(&self, block_hash: Hash, error: BuilderError) {
        self.scripts.lock().insert(block_hash, Err(error));
    }

    /// Number of `build_state_diff` invocations so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StateDiffBuilder for ScriptedBuilder {
    fn build_state_diff(
        &self,
        _parent_root: Hash,
        _current_root: Hash,
        block_number: u64,
        block_hash: Hash,
    ) -> Result<StateDiff, BuilderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.lock().get(&block_hash) {
            Some(result) => result.clone(),
            None => Ok(StateDiff {
                block_number,
                block_hash,
                ..StateDiff::default()
            }),
        }
    }
}

/// A block at `height` whose state root is derived from the height.
pub fn make_block(height: u64, parent_hash: Hash) -> Block {
    let mut state_root = [0u8; 32];
    state_root[24..].copy_from_slice(&height.to_be_bytes());
    Block::new(
        BlockHeader {
            version: 1,
            height,
            parent_hash,
            state_root,
            timestamp: 1_700_000_000 + height * 12,
            ..BlockHeader::default()
        },
        vec![],
    )
}

/// A diff for `block` touching one account with one storage slot.
pub fn make_diff(block: &Block, account: u8) -> StateDiff {
    let mut diff = StateDiff::empty_for(block);
    diff.updated_accounts.insert(
        [account; 32],
        AccountDiff {
            leaf_key: [account; 32],
            value: vec![account; 4],
            storage: vec![StorageDiff {
                leaf_key: [account.wrapping_add(1); 32],
                value: vec![account],
            }],
        },
    );
    diff
}
