use crate::eots;
use crate::foundation::encoding::parse_hex_32bytes;
use crate::foundation::{
    BabylonPublicKey, BtcPublicKey, ChainId, EotsSignature, Hash32, KeyName, ProviderError,
    PubRandValue, Result,
};
use crate::infrastructure::signer::EotsManager;
use async_trait::async_trait;
use k256::elliptic_curve::ops::{MulByGenerator, Reduce};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ProjectivePoint, Scalar, U256};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const KEY_FILE: &str = "eots-keys.json";

const TAG_BTC_KEY: &[u8] = b"fpd/key/btc";
const TAG_BABYLON_KEY: &[u8] = b"fpd/key/babylon";
const TAG_RANDOMNESS: &[u8] = b"fpd/randomness";
const TAG_POP_NONCE: &[u8] = b"fpd/pop-nonce";

fn derive_scalar(tag: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    for part in parts {
        hasher.update(part);
    }
    <Scalar as Reduce<U256>>::reduce_bytes(&hasher.finalize())
}

#[derive(Clone)]
struct KeyEntry {
    key_name: KeyName,
    seed: Hash32,
    btc_sk: Scalar,
    babylon_sk: Scalar,
    babylon_pk: BabylonPublicKey,
}

#[derive(Deserialize, Serialize)]
struct StoredKey {
    key_name: String,
    seed_hex: String,
}

/// File-backed EOTS key store with fully deterministic randomness
/// derivation. `(seed, chain_id, height)` always regenerates the same pair,
/// which is what makes re-signing after a restart consistent with the
/// earlier on-chain commitment.
pub struct LocalEotsManager {
    keys: Mutex<HashMap<BtcPublicKey, KeyEntry>>,
    key_file: Option<PathBuf>,
}

impl LocalEotsManager {
    pub fn new_in_memory() -> Self {
        Self { keys: Mutex::new(HashMap::new()), key_file: None }
    }

    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)?;
        let key_file = dir.join(KEY_FILE);
        let mut keys = HashMap::new();
        if key_file.exists() {
            let bytes = fs::read(&key_file)?;
            let stored: Vec<StoredKey> = serde_json::from_slice(&bytes)?;
            for entry in stored {
                let seed = parse_hex_32bytes(&entry.seed_hex)?;
                let (btc_pk, key) = Self::derive_entry(KeyName::from(entry.key_name), seed)?;
                keys.insert(btc_pk, key);
            }
            info!(count = keys.len(), path = %key_file.display(), "loaded eots keys");
        }
        Ok(Self { keys: Mutex::new(keys), key_file: Some(key_file) })
    }

    fn derive_entry(key_name: KeyName, seed: Hash32) -> Result<(BtcPublicKey, KeyEntry)> {
        let btc_sk = eots::even_y(derive_scalar(TAG_BTC_KEY, &[&seed]));
        let babylon_sk = derive_scalar(TAG_BABYLON_KEY, &[&seed]);

        let btc_pk_bytes = eots::point_x_bytes(&ProjectivePoint::mul_by_generator(&btc_sk))?;
        let babylon_point = ProjectivePoint::mul_by_generator(&babylon_sk).to_encoded_point(true);
        let babylon_pk_bytes: [u8; 33] = babylon_point
            .as_bytes()
            .try_into()
            .map_err(|_| ProviderError::crypto("derive key", "unexpected compressed point length"))?;

        let entry = KeyEntry {
            key_name,
            seed,
            btc_sk,
            babylon_sk,
            babylon_pk: BabylonPublicKey::new(babylon_pk_bytes),
        };
        Ok((BtcPublicKey::new(btc_pk_bytes), entry))
    }

    fn lock_keys(&self) -> Result<MutexGuard<'_, HashMap<BtcPublicKey, KeyEntry>>> {
        self.keys.lock().map_err(|_| ProviderError::crypto("key store", "lock poisoned"))
    }

    fn entry(&self, btc_pk: &BtcPublicKey) -> Result<KeyEntry> {
        self.lock_keys()?
            .get(btc_pk)
            .cloned()
            .ok_or_else(|| ProviderError::KeyNotFound(btc_pk.to_string()))
    }

    fn persist(&self, keys: &HashMap<BtcPublicKey, KeyEntry>) -> Result<()> {
        let Some(path) = &self.key_file else {
            return Ok(());
        };
        let stored: Vec<StoredKey> = keys
            .values()
            .map(|entry| StoredKey {
                key_name: entry.key_name.to_string(),
                seed_hex: hex::encode(entry.seed),
            })
            .collect();
        fs::write(path, serde_json::to_vec_pretty(&stored)?)?;
        Ok(())
    }

    fn sec_rand_for(entry: &KeyEntry, chain_id: &ChainId, height: u64) -> Scalar {
        eots::even_y(derive_scalar(
            TAG_RANDOMNESS,
            &[&entry.seed, chain_id.as_str().as_bytes(), &height.to_be_bytes()],
        ))
    }

    /// Plain Schnorr signature (64 bytes, `R_x || s`) with a message-bound
    /// deterministic nonce. Used for proof-of-possession and commit signing,
    /// where the nonce is never reused across messages.
    fn schnorr_sign(sk: &Scalar, msg: &[u8]) -> Result<Vec<u8>> {
        let msg_hash: Hash32 = Sha256::digest(msg).into();
        let sk_bytes = eots::scalar_to_bytes(sk);
        let nonce = eots::even_y(derive_scalar(TAG_POP_NONCE, &[&sk_bytes, &msg_hash]));
        let secret = eots::SecretKey::from_bytes(&sk_bytes)?;
        let s = secret.sign(&nonce, &msg_hash)?;
        let r_bytes = eots::point_x_bytes(&ProjectivePoint::mul_by_generator(&nonce))?;
        let mut signature = Vec::with_capacity(64);
        signature.extend_from_slice(&r_bytes);
        signature.extend_from_slice(&eots::scalar_to_bytes(&s));
        Ok(signature)
    }
}

#[async_trait]
impl EotsManager for LocalEotsManager {
    async fn create_key(
        &self,
        key_name: &KeyName,
        _hd_path: &str,
        _passphrase: &str,
    ) -> Result<(BabylonPublicKey, BtcPublicKey)> {
        let mut keys = self.lock_keys()?;
        if keys.values().any(|entry| entry.key_name == *key_name) {
            return Err(ProviderError::AlreadyExists(key_name.to_string()));
        }
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let (btc_pk, entry) = Self::derive_entry(key_name.clone(), seed)?;
        let babylon_pk = entry.babylon_pk;
        keys.insert(btc_pk, entry);
        self.persist(&keys)?;
        info!(key_name = %key_name, btc_pk = %btc_pk, "created eots key");
        Ok((babylon_pk, btc_pk))
    }

    async fn sign_babylon(&self, btc_pk: &BtcPublicKey, msg: &[u8]) -> Result<Vec<u8>> {
        let entry = self.entry(btc_pk)?;
        Self::schnorr_sign(&entry.babylon_sk, msg)
    }

    async fn sign_btc(&self, btc_pk: &BtcPublicKey, msg: &[u8]) -> Result<Vec<u8>> {
        let entry = self.entry(btc_pk)?;
        Self::schnorr_sign(&entry.btc_sk, msg)
    }

    async fn create_randomness_pair_list(
        &self,
        btc_pk: &BtcPublicKey,
        chain_id: &ChainId,
        start_height: u64,
        num: u32,
    ) -> Result<Vec<PubRandValue>> {
        let entry = self.entry(btc_pk)?;
        let mut out = Vec::with_capacity(num as usize);
        for offset in 0..num as u64 {
            let sec_rand = Self::sec_rand_for(&entry, chain_id, start_height + offset);
            let pub_rand = eots::point_x_bytes(&ProjectivePoint::mul_by_generator(&sec_rand))?;
            out.push(PubRandValue::new(pub_rand));
        }
        Ok(out)
    }

    async fn sign_eots(
        &self,
        btc_pk: &BtcPublicKey,
        chain_id: &ChainId,
        height: u64,
        msg_hash: &Hash32,
    ) -> Result<EotsSignature> {
        let entry = self.entry(btc_pk)?;
        let sec_rand = Self::sec_rand_for(&entry, chain_id, height);
        let secret = eots::SecretKey::from_bytes(&eots::scalar_to_bytes(&entry.btc_sk))?;
        let signature = secret.sign(&sec_rand, msg_hash)?;
        Ok(EotsSignature::new(eots::scalar_to_bytes(&signature)))
    }

    async fn key_record(&self, btc_pk: &BtcPublicKey, _passphrase: &str) -> Result<Vec<u8>> {
        let entry = self.entry(btc_pk)?;
        Ok(eots::scalar_to_bytes(&entry.btc_sk).to_vec())
    }

    async fn local_key_matches(&self, btc_pk: &BtcPublicKey, candidate_sk: &[u8]) -> Result<bool> {
        let entry = self.entry(btc_pk)?;
        let candidate_bytes: Hash32 = candidate_sk
            .try_into()
            .map_err(|_| ProviderError::crypto("key comparison", "expected 32-byte secret key"))?;
        let candidate = eots::sec_rand_from_bytes(&candidate_bytes)?;
        Ok(candidate == entry.btc_sk || candidate == -entry.btc_sk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::randomness::finality_sig_message;
    use crate::foundation::BlockHash;

    fn key_name() -> KeyName {
        KeyName::from("test-key")
    }

    fn chain_id() -> ChainId {
        ChainId::from("chain-test")
    }

    #[tokio::test]
    async fn randomness_pairs_are_deterministic_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let (btc_pk, before) = {
            let manager = LocalEotsManager::open(dir.path()).unwrap();
            let (_, btc_pk) = manager.create_key(&key_name(), "", "").await.unwrap();
            let rands = manager.create_randomness_pair_list(&btc_pk, &chain_id(), 1, 10).await.unwrap();
            (btc_pk, rands)
        };

        let manager = LocalEotsManager::open(dir.path()).unwrap();
        let after = manager.create_randomness_pair_list(&btc_pk, &chain_id(), 1, 10).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn eots_signatures_verify_against_derived_pub_rand() {
        let manager = LocalEotsManager::new_in_memory();
        let (_, btc_pk) = manager.create_key(&key_name(), "", "").await.unwrap();

        let height = 42u64;
        let msg = finality_sig_message(height, &BlockHash::new([7u8; 32]));
        let pub_rand = manager
            .create_randomness_pair_list(&btc_pk, &chain_id(), height, 1)
            .await
            .unwrap()[0];
        let signature = manager.sign_eots(&btc_pk, &chain_id(), height, &msg).await.unwrap();

        let pk = eots::PublicKey::from_bytes(btc_pk.as_bytes()).unwrap();
        let pub_rand_point = eots::pub_rand_from_bytes(pub_rand.as_bytes()).unwrap();
        let sig = eots::sig_from_bytes(signature.as_bytes()).unwrap();
        assert!(pk.verify(&pub_rand_point, &msg, &sig).unwrap());
    }

    #[tokio::test]
    async fn distinct_heights_use_distinct_randomness() {
        let manager = LocalEotsManager::new_in_memory();
        let (_, btc_pk) = manager.create_key(&key_name(), "", "").await.unwrap();
        let rands = manager.create_randomness_pair_list(&btc_pk, &chain_id(), 1, 50).await.unwrap();
        for (i, a) in rands.iter().enumerate() {
            for b in rands.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[tokio::test]
    async fn duplicate_key_name_is_rejected() {
        let manager = LocalEotsManager::new_in_memory();
        manager.create_key(&key_name(), "", "").await.unwrap();
        let err = manager.create_key(&key_name(), "", "").await.unwrap_err();
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn key_matches_itself_and_its_negation() {
        let manager = LocalEotsManager::new_in_memory();
        let (_, btc_pk) = manager.create_key(&key_name(), "", "").await.unwrap();
        let sk = manager.key_record(&btc_pk, "").await.unwrap();
        assert!(manager.local_key_matches(&btc_pk, &sk).await.unwrap());

        let sk_bytes: Hash32 = sk.as_slice().try_into().unwrap();
        let negated = -eots::sec_rand_from_bytes(&sk_bytes).unwrap();
        let negated_bytes = eots::scalar_to_bytes(&negated);
        assert!(manager.local_key_matches(&btc_pk, &negated_bytes).await.unwrap());

        assert!(!manager.local_key_matches(&btc_pk, &[5u8; 32]).await.unwrap());
    }
}
