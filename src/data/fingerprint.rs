//! Content identity for cleaned datasets.
//!
//! Each row is hashed on its own and the per-row hashes are summed, so the
//! result depends on the multiset of rows and not on their order. SHA-256
//! keeps the value stable across processes and platforms.
//!
//! Row encoding: user id, item id, then the rating's IEEE-754 bits (LE).
//! A numeric id is `0x00` + i64 LE; a text id is `0x01` + byte length
//! (u64 LE) + UTF-8 bytes.

use sha2::{Digest, Sha256};

use crate::common::ids::Fingerprint;

use super::domain::{Dataset, EntityId, RatingRecord};

/// Fingerprint of a cleaned dataset.
pub fn fingerprint(dataset: &Dataset) -> Fingerprint {
    let sum = dataset
        .records()
        .iter()
        .fold(0u64, |acc, r| acc.wrapping_add(row_hash(r)));
    Fingerprint(sum)
}

fn row_hash(record: &RatingRecord) -> u64 {
    // -0.0 and 0.0 are the same rating
    let rating = if record.rating == 0.0 { 0.0 } else { record.rating };

    let mut hasher = Sha256::new();
    hash_id(&mut hasher, &record.user);
    hash_id(&mut hasher, &record.item);
    hasher.update(rating.to_bits().to_le_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

fn hash_id(hasher: &mut Sha256, id: &EntityId) {
    match id {
        EntityId::Num(n) => {
            hasher.update([0x00u8]);
            hasher.update(n.to_le_bytes());
        }
        EntityId::Text(s) => {
            hasher.update([0x01u8]);
            hasher.update((s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
    }
}
