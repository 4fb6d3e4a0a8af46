//! The unit delivered to subscribers.

use serde::{Deserialize, Serialize};

/// Encoded state diff, optionally accompanied by the encoded block and receipts.
///
/// `block_rlp` and `receipts_rlp` are either both set or both absent; which
/// one is decided once by the `stream_block` configuration flag.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Payload {
    pub state_diff_rlp: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_rlp: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipts_rlp: Option<Vec<u8>>,
}

impl Payload {
    pub fn new(state_diff_rlp: Vec<u8>) -> Self {
        Self {
            state_diff_rlp,
            block_rlp: None,
            receipts_rlp: None,
        }
    }

    /// Attach the encoded block and receipts.
    pub fn with_block(mut self, block_rlp: Vec<u8>, receipts_rlp: Vec<u8>) -> Self {
        self.block_rlp = Some(block_rlp);
        self.receipts_rlp = Some(receipts_rlp);
        self
    }
}
