//! Transport obfuscation layer.
//!
//! Every payload is shifted by one modulo 256 before it is written and shifted
//! back after it is read. The shift sits *on top of* TLS and adds no secrecy:
//! it exists only so this relay stays wire-compatible with peers that apply the
//! same shift. Both ends must agree on the transform; a peer that disables it
//! can only talk to peers that disable it too.
//!
//! ```rust
//! use relay_core::{decode, encode};
//!
//! let wire = encode(b"\xffhi");
//! assert_eq!(wire, vec![0x00, b'i', b'j']);
//! assert_eq!(decode(&wire), b"\xffhi");
//! ```

/// Which reversible transform a connection applies to its payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireTransform {
    /// Add one (mod 256) on encode, subtract one on decode.
    #[default]
    Shift,
    /// Leave bytes untouched.
    Passthrough,
}

impl WireTransform {
    /// Builds the transform from an on/off switch as found in config files and
    /// CLI flags.
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            WireTransform::Shift
        } else {
            WireTransform::Passthrough
        }
    }

    /// Returns `true` when payload bytes are actually modified.
    pub fn is_enabled(self) -> bool {
        matches!(self, WireTransform::Shift)
    }

    /// Returns the wire form of `payload`.
    pub fn encode(self, payload: &[u8]) -> Vec<u8> {
        let mut out = payload.to_vec();
        self.encode_in_place(&mut out);
        out
    }

    /// Returns the plain form of `wire`.
    pub fn decode(self, wire: &[u8]) -> Vec<u8> {
        let mut out = wire.to_vec();
        self.decode_in_place(&mut out);
        out
    }

    /// Encodes `buf` without allocating.
    pub fn encode_in_place(self, buf: &mut [u8]) {
        if let WireTransform::Shift = self {
            for byte in buf.iter_mut() {
                *byte = byte.wrapping_add(1);
            }
        }
    }

    /// Decodes `buf` without allocating.
    pub fn decode_in_place(self, buf: &mut [u8]) {
        if let WireTransform::Shift = self {
            for byte in buf.iter_mut() {
                *byte = byte.wrapping_sub(1);
            }
        }
    }
}

/// Encodes `payload` with the default [`WireTransform::Shift`].
pub fn encode(payload: &[u8]) -> Vec<u8> {
    WireTransform::Shift.encode(payload)
}

/// Decodes `wire` with the default [`WireTransform::Shift`].
pub fn decode(wire: &[u8]) -> Vec<u8> {
    WireTransform::Shift.decode(wire)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_adds_one_to_each_byte() {
        assert_eq!(encode(b"abc"), b"bcd".to_vec());
    }

    #[test]
    fn test_encode_wraps_0xff_to_zero() {
        assert_eq!(encode(&[0xFF]), vec![0x00]);
    }

    #[test]
    fn test_decode_wraps_zero_to_0xff() {
        assert_eq!(decode(&[0x00]), vec![0xFF]);
    }

    #[test]
    fn test_roundtrip_every_byte_value() {
        // Arrange: all 256 byte values, which covers both wrap boundaries
        let all: Vec<u8> = (0..=255u8).collect();

        // Act
        let restored = decode(&encode(&all));

        // Assert
        assert_eq!(restored, all);
    }

    #[test]
    fn test_empty_payload_stays_empty() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[]).is_empty());
    }

    #[test]
    fn test_passthrough_leaves_bytes_untouched() {
        let t = WireTransform::Passthrough;
        assert_eq!(t.encode(b"\x00\xffz"), b"\x00\xffz".to_vec());
        assert_eq!(t.decode(b"\x00\xffz"), b"\x00\xffz".to_vec());
    }

    #[test]
    fn test_in_place_matches_owned_form() {
        let mut buf = b"hello \xff".to_vec();
        WireTransform::Shift.encode_in_place(&mut buf);
        assert_eq!(buf, encode(b"hello \xff"));
        WireTransform::Shift.decode_in_place(&mut buf);
        assert_eq!(buf, b"hello \xff".to_vec());
    }

    #[test]
    fn test_from_enabled_selects_variant() {
        assert_eq!(WireTransform::from_enabled(true), WireTransform::Shift);
        assert_eq!(WireTransform::from_enabled(false), WireTransform::Passthrough);
        assert!(WireTransform::default().is_enabled());
        assert!(!WireTransform::Passthrough.is_enabled());
    }
}
