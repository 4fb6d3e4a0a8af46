//! RLP implementation of the payload encoder.
//!
//! Layouts (all lists):
//!
//! ```text
//! StateDiff   = [number, hash, [Account...created], [Account...deleted], [Account...updated]]
//! Account     = [leaf_key, value, [[slot_key, slot_value]...]]
//! Block       = [Header, [Tx...]]
//! Header      = [version, height, parent, merkle, receipts, state, timestamp, proposer, difficulty, nonce]
//! Tx          = [from, to | "", value, nonce, gas_price, gas_limit, data, signature]
//! Receipt     = [tx_hash, success, cumulative_gas, [[address, [topic...], data]...]]
//! ```
//!
//! Accounts follow leaf-key order, storage slots are sorted by leaf key,
//! and integers use minimal big-endian encoding, so the output is fully
//! determined by the diff's content.

use crate::domain::{AccountDiff, StateDiff, StorageDiff};
use crate::ports::{EncodingError, PayloadEncoder};
use rlp::{DecoderError, Rlp, RlpStream};
use shared_types::{Block, BlockHeader, Hash, SignedTransaction, TransactionReceipt, U256};
use std::collections::BTreeMap;

/// Deterministic RLP encoder with an optional per-item size limit
#[derive(Debug, Clone, Default)]
pub struct RlpPayloadEncoder {
    max_item_size: Option<usize>,
}

impl RlpPayloadEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any single encoded item larger than `limit` bytes
    pub fn with_max_item_size(limit: usize) -> Self {
        Self {
            max_item_size: Some(limit),
        }
    }

    fn check_size(&self, what: &'static str, bytes: Vec<u8>) -> Result<Vec<u8>, EncodingError> {
        match self.max_item_size {
            Some(limit) if bytes.len() > limit => Err(EncodingError::TooLarge {
                what,
                size: bytes.len(),
                limit,
            }),
            _ => Ok(bytes),
        }
    }
}

impl PayloadEncoder for RlpPayloadEncoder {
    fn encode_state_diff(&self, diff: &StateDiff) -> Result<Vec<u8>, EncodingError> {
        let mut s = RlpStream::new();
        append_state_diff(&mut s, diff);
        self.check_size("state diff", s.out().to_vec())
    }

    fn encode_block(&self, block: &Block) -> Result<Vec<u8>, EncodingError> {
        let mut s = RlpStream::new_list(2);
        append_header(&mut s, block.header());
        s.begin_list(block.transactions().len());
        for tx in block.transactions() {
            append_transaction(&mut s, tx);
        }
        self.check_size("block", s.out().to_vec())
    }

    fn encode_receipts(&self, receipts: &[TransactionReceipt]) -> Result<Vec<u8>, EncodingError> {
        let mut s = RlpStream::new_list(receipts.len());
        for receipt in receipts {
            append_receipt(&mut s, receipt);
        }
        self.check_size("receipts", s.out().to_vec())
    }
}

// =============================================================================
// ENCODING HELPERS
// =============================================================================

fn append_bytes(s: &mut RlpStream, bytes: &[u8]) {
    s.append(&bytes.to_vec());
}

/// Minimal big-endian; zero encodes as the empty string.
fn append_u256(s: &mut RlpStream, value: &U256) {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let start = buf.iter().position(|&b| b != 0).unwrap_or(buf.len());
    append_bytes(s, &buf[start..]);
}

fn append_state_diff(s: &mut RlpStream, diff: &StateDiff) {
    s.begin_list(5);
    s.append(&diff.block_number);
    append_bytes(s, &diff.block_hash);
    for accounts in [
        &diff.created_accounts,
        &diff.deleted_accounts,
        &diff.updated_accounts,
    ] {
        s.begin_list(accounts.len());
        for account in accounts.values() {
            append_account(s, account);
        }
    }
}

fn append_account(s: &mut RlpStream, account: &AccountDiff) {
    s.begin_list(3);
    append_bytes(s, &account.leaf_key);
    append_bytes(s, &account.value);
    let mut slots: Vec<&StorageDiff> = account.storage.iter().collect();
    slots.sort_by(|a, b| a.leaf_key.cmp(&b.leaf_key));
    s.begin_list(slots.len());
    for slot in slots {
        s.begin_list(2);
        append_bytes(s, &slot.leaf_key);
        append_bytes(s, &slot.value);
    }
}

fn append_header(s: &mut RlpStream, header: &BlockHeader) {
    s.begin_list(10);
    s.append(&header.version);
    s.append(&header.height);
    append_bytes(s, &header.parent_hash);
    append_bytes(s, &header.merkle_root);
    append_bytes(s, &header.receipts_root);
    append_bytes(s, &header.state_root);
    s.append(&header.timestamp);
    append_bytes(s, &header.proposer);
    append_u256(s, &header.difficulty);
    s.append(&header.nonce);
}

fn append_transaction(s: &mut RlpStream, tx: &SignedTransaction) {
    s.begin_list(8);
    append_bytes(s, &tx.from);
    match &tx.to {
        Some(to) => append_bytes(s, to),
        None => append_bytes(s, &[]),
    }
    append_u256(s, &tx.value);
    s.append(&tx.nonce);
    append_u256(s, &tx.gas_price);
    s.append(&tx.gas_limit);
    append_bytes(s, &tx.data);
    append_bytes(s, &tx.signature);
}

fn append_receipt(s: &mut RlpStream, receipt: &TransactionReceipt) {
    s.begin_list(4);
    append_bytes(s, &receipt.tx_hash);
    s.append(&u8::from(receipt.success));
    s.append(&receipt.cumulative_gas_used);
    s.begin_list(receipt.logs.len());
    for log in &receipt.logs {
        s.begin_list(3);
        append_bytes(s, &log.address);
        s.begin_list(log.topics.len());
        for topic in &log.topics {
            append_bytes(s, topic);
        }
        append_bytes(s, &log.data);
    }
}

// =============================================================================
// DECODING (consumer side)
// =============================================================================

/// Decode a state diff produced by [`RlpPayloadEncoder`].
pub fn decode_state_diff(bytes: &[u8]) -> Result<StateDiff, EncodingError> {
    decode_state_diff_inner(&Rlp::new(bytes)).map_err(|e| EncodingError::Failed {
        what: "state diff",
        reason: e.to_string(),
    })
}

fn decode_state_diff_inner(rlp: &Rlp<'_>) -> Result<StateDiff, DecoderError> {
    if rlp.item_count()? != 5 {
        return Err(DecoderError::RlpIncorrectListLen);
    }
    Ok(StateDiff {
        block_number: rlp.val_at(0)?,
        block_hash: decode_hash(&rlp.at(1)?)?,
        created_accounts: decode_accounts(&rlp.at(2)?)?,
        deleted_accounts: decode_accounts(&rlp.at(3)?)?,
        updated_accounts: decode_accounts(&rlp.at(4)?)?,
    })
}

fn decode_hash(rlp: &Rlp<'_>) -> Result<Hash, DecoderError> {
    let data = rlp.data()?;
    data.try_into()
        .map_err(|_| DecoderError::Custom("expected a 32-byte hash"))
}

fn decode_accounts(rlp: &Rlp<'_>) -> Result<BTreeMap<Hash, AccountDiff>, DecoderError> {
    let mut accounts = BTreeMap::new();
    for item in rlp.iter() {
        let leaf_key = decode_hash(&item.at(0)?)?;
        let mut storage = Vec::new();
        for slot in item.at(2)?.iter() {
            storage.push(StorageDiff {
                leaf_key: decode_hash(&slot.at(0)?)?,
                value: slot.at(1)?.data()?.to_vec(),
            });
        }
        accounts.insert(
            leaf_key,
            AccountDiff {
                leaf_key,
                value: item.at(1)?.data()?.to_vec(),
                storage,
            },
        );
    }
    Ok(accounts)
}
