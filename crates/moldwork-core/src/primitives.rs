//! # Primitives
//!
//! Hardcoded runtime constants for the Moldwork core.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Magic bytes for the Moldwork binary format header.
///
/// - File Header = Magic Bytes ("MOLD") + Version (u8) + Payload kind (u8).
pub const MAGIC_BYTES: &[u8; 4] = b"MOLD";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum length of a plugin type tag.
pub const MAX_TYPE_TAG_LENGTH: usize = 32;

/// Maximum length of a plugin description.
pub const MAX_DESCRIPTION_LENGTH: usize = 512;

/// Maximum length of an element name.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum nesting depth of sections.
///
/// Bounds the recursion of canonical conversion, verification and migration.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Maximum size of a serialized mold or config payload (64 MB).
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"MOLD");
    }

    #[test]
    fn limits_are_sane() {
        assert!(MAX_TYPE_TAG_LENGTH < MAX_DESCRIPTION_LENGTH);
        assert!(MAX_NESTING_DEPTH > 1);
    }
}
