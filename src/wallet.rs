//! Wallet & signing: secp256k1 key generation, signing, and address
//! derivation.

use std::fs;
use std::io;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;

use crate::hash::address_from;

/// A single generated key pair plus its derived address.
#[derive(Clone)]
pub struct KeyPair {
    pub sk: SigningKey,
    pub pk: VerifyingKey,
    pub addr: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("pk", &hex::encode(self.pk.to_encoded_point(true).as_bytes()))
            .field("addr", &self.addr)
            .finish()
    }
}

/// A wallet is a sequence of key pairs. The last key generated is the
/// wallet's "current" signing identity.
#[derive(Debug, Default)]
pub struct Wallet {
    pub keys: Vec<KeyPair>,
}

impl Wallet {
    pub fn new() -> Self {
        Self { keys: vec![] }
    }

    pub fn empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Generate a new secp256k1 key pair and derive its address.
    pub fn generate_key(&mut self) -> &KeyPair {
        let sk = SigningKey::random(&mut OsRng);
        let pk = VerifyingKey::from(&sk);
        let pk_bytes = pk.to_encoded_point(true).as_bytes().to_vec();
        let addr = address_from(&pk_bytes);

        self.keys.push(KeyPair { sk, pk, addr });
        self.keys.last().unwrap()
    }

    pub fn addr(&self) -> Option<&str> {
        self.keys.last().map(|k| k.addr.as_str())
    }

    pub fn current(&self) -> Option<&KeyPair> {
        self.keys.last()
    }

    /// Sign a message with the wallet's current key.
    pub fn sign(&self, message: &[u8]) -> Option<Vec<u8>> {
        let key = self.keys.last()?;
        let sig: Signature = key.sk.sign(message);
        Some(sig.to_der().as_bytes().to_vec())
    }

    /// Find the key pair owning `addr`, if any.
    pub fn key_for_addr(&self, addr: &str) -> Option<&KeyPair> {
        self.keys.iter().find(|k| k.addr == addr)
    }

    /// Persist every secret key as newline-delimited hex, one key per line.
    pub fn save_keys(&self, path: &str) -> io::Result<()> {
        let body = self
            .keys
            .iter()
            .map(|k| hex::encode(k.sk.to_bytes()))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(path, body)
    }

    /// Reload keys previously written by [`Wallet::save_keys`].
    pub fn load_keys(&mut self, path: &str) -> io::Result<()> {
        let body = fs::read_to_string(path)?;
        for line in body.lines().filter(|l| !l.is_empty()) {
            let bytes = hex::decode(line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let sk = SigningKey::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let pk = VerifyingKey::from(&sk);
            let pk_bytes = pk.to_encoded_point(true).as_bytes().to_vec();
            let addr = address_from(&pk_bytes);
            self.keys.push(KeyPair { sk, pk, addr });
        }
        Ok(())
    }
}

/// Verify a DER-encoded ECDSA signature against a raw SEC1 public key and a
/// message. Used by the script VM's `OP_CHECKSIG`/`OP_CHECKMULSIG`.
pub fn verify(pubkey_bytes: &[u8], message: &[u8], sig_bytes: &[u8]) -> bool {
    let pk = match VerifyingKey::from_sec1_bytes(pubkey_bytes) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let sig = match Signature::from_der(sig_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    pk.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_key_derives_consistent_address() {
        let mut w = Wallet::new();
        let key = w.generate_key().clone();
        let pk_bytes = key.pk.to_encoded_point(true).as_bytes().to_vec();
        assert_eq!(address_from(&pk_bytes), key.addr);
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let mut w = Wallet::new();
        w.generate_key();
        let msg = b"spend this utxo";
        let sig = w.sign(msg).unwrap();
        let pk_bytes = w
            .current()
            .unwrap()
            .pk
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        assert!(verify(&pk_bytes, msg, &sig));
        assert!(!verify(&pk_bytes, b"different message", &sig));
    }

    #[test]
    fn save_and_load_keys_round_trip() {
        let mut w = Wallet::new();
        w.generate_key();
        w.generate_key();
        let path = std::env::temp_dir().join(format!("wallet-test-{}.txt", std::process::id()));
        let path = path.to_str().unwrap();
        w.save_keys(path).unwrap();

        let mut w2 = Wallet::new();
        w2.load_keys(path).unwrap();
        assert_eq!(w2.keys.len(), 2);
        assert_eq!(w2.keys[0].addr, w.keys[0].addr);
        assert_eq!(w2.keys[1].addr, w.keys[1].addr);
        let _ = std::fs::remove_file(path);
    }
}
