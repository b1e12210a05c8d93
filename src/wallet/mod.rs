use std::fmt;

use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};

/// A secp256k1 keypair. The address is the hex of the compressed public key.
#[derive(Clone)]
pub struct Account {
    secret: SecretKey,
    public: PublicKey,
}

impl Account {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut OsRng);
        Self { secret, public }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, &'static str> {
        let bytes = hex::decode(secret_hex.trim()).map_err(|_| "invalid secret key hex")?;
        let secret = SecretKey::from_slice(&bytes).map_err(|_| "invalid secret key bytes")?;
        let public = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret);
        Ok(Self { secret, public })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    pub fn address(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Hex DER ECDSA signature over a 32-byte digest.
    pub fn sign(&self, msg32: [u8; 32]) -> String {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest(msg32);
        hex::encode(secp.sign_ecdsa(&msg, &self.secret).serialize_der())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Derive address (hex of compressed pubkey) from a given hex pubkey.
/// Returns normalized hex (lowercase) if valid.
pub fn pubkey_to_address_hex(pubkey_hex: &str) -> Result<String, &'static str> {
    let bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&bytes).map_err(|_| "invalid pubkey bytes")?;
    Ok(hex::encode(pk.serialize()))
}

/// Verify a signature (hex DER) against the given pubkey (hex, compressed) and message hash (32 bytes).
pub fn verify_signature_hex(
    pubkey_hex: &str,
    sig_hex: &str,
    msg32: [u8; 32],
) -> Result<bool, &'static str> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| "invalid signature hex")?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| "invalid DER signature")?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| "invalid pubkey bytes")?;

    let msg = Message::from_digest(msg32);
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_roundtrip_keeps_address() {
        let account = Account::generate();
        let restored = Account::from_secret_hex(&account.secret_hex()).unwrap();
        assert_eq!(account.address(), restored.address());
        assert_eq!(account.address().len(), 66);
        assert_eq!(
            pubkey_to_address_hex(&account.address()).unwrap(),
            account.address()
        );
    }

    #[test]
    fn sign_and_verify() {
        let account = Account::generate();
        let digest = [7u8; 32];
        let sig = account.sign(digest);
        assert!(verify_signature_hex(&account.address(), &sig, digest).unwrap());
        assert!(!verify_signature_hex(&account.address(), &sig, [8u8; 32]).unwrap());

        let other = Account::generate();
        assert!(!verify_signature_hex(&other.address(), &sig, digest).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Account::from_secret_hex("zz").is_err());
        assert!(Account::from_secret_hex("00").is_err());
        assert!(verify_signature_hex("02", "30", [0u8; 32]).is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let account = Account::generate();
        let printed = format!("{account:?}");
        assert!(printed.contains(&account.address()));
        assert!(!printed.contains(&account.secret_hex()));
    }
}
