/// Decode error taxonomy for the LRAW capture format.
///
/// Every fatal variant carries enough context (byte offset, record index)
/// to reproduce and debug a corrupt capture without the original device.

/// Failure modes when decoding a capture file.
///
/// All variants are fatal for the file being decoded: a capture is either
/// decoded in full or not at all, never partially exposed.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The 4-byte signature at the start of the file did not match.
    #[error("invalid magic: expected \"LRAW\", found {found:02x?}")]
    InvalidMagic {
        /// The four bytes actually present at offset 0.
        found: [u8; 4],
    },

    /// A read requested more bytes than remain in the stream.
    #[error("truncated stream at byte {offset}: needed {needed} bytes, {remaining} remain")]
    TruncatedStream {
        /// Byte offset at which the failing read started.
        offset: usize,
        /// Number of bytes the read required.
        needed: usize,
        /// Number of bytes left in the stream.
        remaining: usize,
    },

    /// A declared count or size exceeds the sanity ceiling.
    ///
    /// Guards against corrupt headers driving multi-gigabyte allocations;
    /// the check runs before any allocation is attempted.
    #[error("implausible {what} in record {index}: {value} exceeds limit {limit}")]
    ImplausibleCount {
        /// Which field was out of range (e.g. "vertex count").
        what: &'static str,
        /// Index of the record that declared it.
        index: usize,
        /// The declared value.
        value: u64,
        /// The configured ceiling.
        limit: u64,
    },

    /// The header declares feature flags this codec does not support.
    #[error("unsupported capture flags: {flags:#06x}")]
    UnsupportedFlags {
        /// The offending flag bits.
        flags: u16,
    },
}

impl DecodeError {
    /// Convenience constructor for [`DecodeError::ImplausibleCount`].
    pub fn implausible(what: &'static str, index: usize, value: u64, limit: u64) -> Self {
        DecodeError::ImplausibleCount {
            what,
            index,
            value,
            limit,
        }
    }
}

/// Result alias using the codec [`DecodeError`].
pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_display_carries_offset() {
        let err = DecodeError::TruncatedStream {
            offset: 32,
            needed: 64,
            remaining: 10,
        };
        assert_eq!(
            err.to_string(),
            "truncated stream at byte 32: needed 64 bytes, 10 remain"
        );
    }

    #[test]
    fn implausible_display_names_field() {
        let err = DecodeError::implausible("vertex count", 3, 1 << 40, 8_388_608);
        assert!(err.to_string().contains("vertex count"));
        assert!(err.to_string().contains("record 3"));
    }

    #[test]
    fn invalid_magic_display() {
        let err = DecodeError::InvalidMagic {
            found: *b"LAS\0",
        };
        assert!(err.to_string().starts_with("invalid magic"));
    }
}
