//! Blake2b hashing for blocks and chain identifiers.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use trustchain_types::{BlockHash, ChainId, PublicKey};

type Blake2b256 = Blake2b<U32>;

const BLOCK_DOMAIN: &[u8] = b"trustchain/block";
const CHAIN_ID_DOMAIN: &[u8] = b"trustchain/chain-id";

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Hash a serialized operation to produce its `BlockHash`.
pub fn hash_block(operation_bytes: &[u8]) -> BlockHash {
    BlockHash::new(blake2b_256_multi(&[BLOCK_DOMAIN, operation_bytes]))
}

/// The chain owned by an attesting root device.
pub fn chain_id_for_root(root: &PublicKey) -> ChainId {
    ChainId::new(blake2b_256_multi(&[CHAIN_ID_DOMAIN, root.as_bytes()]))
}
