//! Byte-level classifier for NTLM wire messages.
//!
//! Providers use this to recognize an NTLM message hiding under a
//! `Negotiate` banner and to validate the type 1 → type 3 handshake
//! sequence. Pure and stateless.

/// Fixed 8-byte signature opening every NTLM message.
pub const NTLM_SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

/// Byte offset of the little-endian message-type field.
const MESSAGE_TYPE_OFFSET: usize = 8;

/// The three NTLM handshake messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtlmMessageType {
    /// Type 1, client → server.
    Negotiate,
    /// Type 2, server → client.
    Challenge,
    /// Type 3, client → server.
    Authenticate,
}

/// True iff the buffer is at least 8 bytes and starts with `NTLMSSP\0`.
#[must_use]
pub fn is_ntlm_message(buf: &[u8]) -> bool {
    buf.len() >= NTLM_SIGNATURE.len() && buf[..NTLM_SIGNATURE.len()] == NTLM_SIGNATURE[..]
}

/// Message type of a valid NTLM message; `None` for anything that is not an
/// NTLM message or carries an unknown type value.
#[must_use]
pub fn message_type(buf: &[u8]) -> Option<NtlmMessageType> {
    if !is_ntlm_message(buf) || buf.len() < MESSAGE_TYPE_OFFSET + 4 {
        return None;
    }
    let raw = u32::from_le_bytes([
        buf[MESSAGE_TYPE_OFFSET],
        buf[MESSAGE_TYPE_OFFSET + 1],
        buf[MESSAGE_TYPE_OFFSET + 2],
        buf[MESSAGE_TYPE_OFFSET + 3],
    ]);
    match raw {
        1 => Some(NtlmMessageType::Negotiate),
        2 => Some(NtlmMessageType::Challenge),
        3 => Some(NtlmMessageType::Authenticate),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_alone_is_a_message() {
        let signature = [0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00];
        assert!(is_ntlm_message(&signature));
    }

    #[test]
    fn short_buffer_is_not_a_message() {
        let short = [0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50];
        assert!(!is_ntlm_message(&short));
        assert!(!is_ntlm_message(&[]));
    }

    #[test]
    fn trailing_bytes_do_not_matter() {
        let long = [0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00, 0x00];
        assert!(is_ntlm_message(&long));
    }

    #[test]
    fn wrong_signature_is_not_a_message() {
        let bad = [0x00u8; 9];
        assert!(!is_ntlm_message(&bad));
    }

    #[test]
    fn classifies_type_1() {
        let type1 = [
            0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x02,
            0x00, 0x00,
        ];
        assert_eq!(message_type(&type1), Some(NtlmMessageType::Negotiate));
    }

    #[test]
    fn classifies_type_2() {
        let type2 = [
            0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x00, 0x01, 0x23, 0x45, 0x67,
        ];
        assert_eq!(message_type(&type2), Some(NtlmMessageType::Challenge));
    }

    #[test]
    fn classifies_type_3() {
        let type3 = [
            0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x00, 0x01, 0x23, 0x45, 0x67,
        ];
        assert_eq!(message_type(&type3), Some(NtlmMessageType::Authenticate));
    }

    #[test]
    fn unknown_type_value_is_none() {
        let type9 = [
            0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00, 0x09, 0x00, 0x00, 0x00,
        ];
        assert_eq!(message_type(&type9), None);
    }

    #[test]
    fn signature_without_type_field_is_none() {
        let signature = [0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00];
        assert_eq!(message_type(&signature), None);
    }
}
