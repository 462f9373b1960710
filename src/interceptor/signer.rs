use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Produces the `x-client-transaction-id` header for a replayed call.
pub trait TransactionSigner: Send + Sync {
    fn transaction_id(&self, method: &str, path: &str) -> String;
}

/// Path as the signer sees it: the `/i/api` prefix is not part of it.
pub fn signing_path(path: &str) -> &str {
    path.strip_prefix("/i/api").unwrap_or(path)
}

/// Keyed SHA-256 over method, path and a per-call timestamp and nonce.
pub struct Sha256Signer {
    key: [u8; 32],
}

impl Sha256Signer {
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn sign(&self, method: &str, path: &str, timestamp: i64, nonce: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b"!");
        hasher.update(path.as_bytes());
        hasher.update(b"!");
        hasher.update(timestamp.to_be_bytes());
        hasher.update(nonce);
        let digest = hasher.finalize();

        let mut token = Vec::with_capacity(nonce.len() + 8 + 16);
        token.extend_from_slice(nonce);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&digest[..16]);
        STANDARD_NO_PAD.encode(token)
    }
}

impl Default for Sha256Signer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSigner for Sha256Signer {
    fn transaction_id(&self, method: &str, path: &str) -> String {
        let mut nonce = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut nonce);
        let timestamp = chrono::Utc::now().timestamp();
        self.sign(method, path, timestamp, &nonce)
    }
}
