//! Key encoding utilities for `RocksDB`.
//!
//! Primary keys are the raw 16 bytes of the record's identifier. Per-user
//! index keys are `owner (16 bytes) || ulid (16 bytes)`; since ULIDs are
//! time-ordered, a prefix scan yields a user's records oldest first.

use batpoints_core::{ContentId, UserId};

/// Length of a per-user index key.
pub const INDEX_KEY_LEN: usize = 32;

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a content key from a content ID.
#[must_use]
pub fn content_key(content_id: &ContentId) -> Vec<u8> {
    content_id.as_bytes().to_vec()
}

/// Create a primary key from ULID bytes (journal entry, tip, conversion).
#[must_use]
pub fn record_key(ulid_bytes: [u8; 16]) -> Vec<u8> {
    ulid_bytes.to_vec()
}

/// Create a per-user index key.
#[must_use]
pub fn user_index_key(user_id: &UserId, ulid_bytes: [u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(INDEX_KEY_LEN);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&ulid_bytes);
    key
}

/// Create a prefix for iterating all index entries of a user.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the ULID bytes from a per-user index key.
///
/// Returns `None` if the key is not an index key.
#[must_use]
pub fn ulid_from_index_key(key: &[u8]) -> Option<[u8; 16]> {
    if key.len() != INDEX_KEY_LEN {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..INDEX_KEY_LEN]);
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batpoints_core::ConversionId;

    #[test]
    fn primary_keys_are_sixteen_bytes() {
        assert_eq!(account_key(&UserId::generate()).len(), 16);
        assert_eq!(content_key(&ContentId::generate()).len(), 16);
        assert_eq!(record_key(ConversionId::generate().to_bytes()).len(), 16);
    }

    #[test]
    fn index_key_layout() {
        let user_id = UserId::generate();
        let conv_id = ConversionId::generate();
        let key = user_index_key(&user_id, conv_id.to_bytes());

        assert_eq!(key.len(), INDEX_KEY_LEN);
        assert!(key.starts_with(&user_prefix(&user_id)));
        assert_eq!(
            ulid_from_index_key(&key).map(ConversionId::from_bytes),
            Some(conv_id)
        );
    }

    #[test]
    fn short_keys_are_not_index_keys() {
        assert_eq!(ulid_from_index_key(&[0u8; 16]), None);
    }
}
