//! Preimage injection
//!
//! Calls longer than the inline bound are scheduled by hash. Their preimage is
//! written straight into the `Preimage` pallet and marked as requested so the
//! scheduler can fetch it.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde_json::json;

use crate::chain::Bytes;
use crate::fork::StorageBatch;

type Blake2b256 = Blake2b<U32>;

pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

pub fn preimage_hash(call: &Bytes) -> Bytes {
    Bytes::new(blake2_256(call.as_slice()).to_vec())
}

/// Add the preimage of `call` to `batch` and return its hash.
pub fn note_preimage(batch: &mut StorageBatch, call: &Bytes) -> Bytes {
    let hash = preimage_hash(call);
    let len = call.len() as u32;
    batch.set_entry(
        "Preimage",
        "PreimageFor",
        vec![json!([hash.to_hex(), len])],
        json!(call.to_hex()),
    );
    batch.set_entry(
        "Preimage",
        "RequestStatusFor",
        vec![json!(hash.to_hex())],
        json!({"requested": {"maybeTicket": null, "count": 1, "maybeLen": len}}),
    );
    hash
}
