//! Key material and signing.
//!
//! Derives a secp256k1 key from a BIP-39 mnemonic along a BIP-44 path,
//! computes the bech32 account address (`ripemd160(sha256(pubkey))`) and
//! signs canonical sign-doc bytes. Loaded once at startup and shared
//! read-only by every cycle.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bech32::{ToBase32, Variant};
use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use k256::ecdsa::{signature::Signer, Signature, SigningKey};
use ripemd::Ripemd160;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// A signing key with its derived address.
pub struct Wallet {
    signing_key: SigningKey,
    /// 33-byte compressed SEC1 public key.
    public_key: Vec<u8>,
    address: String,
}

impl Wallet {
    /// Derive the wallet from `mnemonic` along `hd_path`
    /// (e.g. `m/44'/118'/0'/0/0`), encoding the address with `prefix`.
    pub fn from_mnemonic(mnemonic: &SecretString, hd_path: &str, prefix: &str) -> Result<Self> {
        // 12, 15, 18, 21 and 24 word phrases are all accepted.
        let mnemonic =
            Mnemonic::parse_in_normalized(Language::English, mnemonic.expose_secret().trim())
                .context("invalid mnemonic")?;
        let path: DerivationPath = hd_path
            .parse()
            .with_context(|| format!("invalid HD path: {hd_path}"))?;
        let seed = mnemonic.to_seed("");
        let xprv = XPrv::derive_from_path(seed, &path)
            .context("failed to derive key from mnemonic")?;

        Self::from_signing_key(xprv.private_key().clone(), prefix)
    }

    pub fn from_signing_key(signing_key: SigningKey, prefix: &str) -> Result<Self> {
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        let address = derive_address(&public_key, prefix)?;
        debug!(address = %address, "wallet loaded");

        Ok(Self {
            signing_key,
            public_key,
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn public_key_base64(&self) -> String {
        BASE64.encode(&self.public_key)
    }

    /// Sign `message` (SHA-256 prehashed) and return the 64-byte `r || s`
    /// signature with a low S value.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let sig: Signature = self.signing_key.sign(message);
        let sig = sig.normalize_s().unwrap_or(sig);
        let mut out = [0u8; 64];
        out.copy_from_slice(&sig.to_bytes());
        out
    }

    pub fn sign_base64(&self, message: &[u8]) -> String {
        BASE64.encode(self.sign(message))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Bech32 account address for a compressed secp256k1 public key.
pub fn derive_address(public_key: &[u8], prefix: &str) -> Result<String> {
    let hash = Ripemd160::digest(Sha256::digest(public_key));
    bech32::encode(prefix, hash.to_base32(), Variant::Bech32)
        .with_context(|| format!("invalid bech32 prefix: {prefix}"))
}
