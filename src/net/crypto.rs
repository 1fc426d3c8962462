//! Key exchange seam
//!
//! The login handshake carries a block encrypted with the server's public
//! key. Decrypting it is delegated to a `KeyExchange` implementation so the
//! session logic never depends on a particular cipher.

/// Symmetric session key as four 32-bit words
pub type SessionKey = [u32; 4];

/// Decrypts the asymmetric key-exchange block in place
pub trait KeyExchange: Send + Sync {
    /// Returns false if the block could not be decrypted
    fn decrypt(&self, block: &mut [u8]) -> bool;
}

/// Accepts blocks that are already plaintext.
///
/// A correctly decrypted block always starts with a zero byte, so that is
/// the only check made. Meant for local servers and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextKeyExchange;

impl KeyExchange for PlaintextKeyExchange {
    fn decrypt(&self, block: &mut [u8]) -> bool {
        block.first() == Some(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_requires_leading_zero() {
        let exchange = PlaintextKeyExchange;
        assert!(exchange.decrypt(&mut [0, 1, 2, 3]));
        assert!(!exchange.decrypt(&mut [7, 1, 2, 3]));
        assert!(!exchange.decrypt(&mut []));
    }
}
