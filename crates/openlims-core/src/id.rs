//! Entity ID generation.

/// Generates a fresh UUID-v4 entity ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
