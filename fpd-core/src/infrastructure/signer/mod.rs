pub mod local;

pub use local::LocalEotsManager;

use crate::foundation::{BabylonPublicKey, BtcPublicKey, ChainId, EotsSignature, Hash32, KeyName, PubRandValue, Result};
use async_trait::async_trait;

/// The EOTS key store. It owns the BTC secret keys; secret material never
/// crosses this boundary except through [`EotsManager::key_record`].
///
/// Randomness pairs are a pure function of `(btc_pk, chain_id, height)` over
/// the manager's durable seed, so a restart regenerates the exact pair that
/// was committed earlier.
#[async_trait]
pub trait EotsManager: Send + Sync {
    /// Generate a new key pair under `key_name`.
    async fn create_key(
        &self,
        key_name: &KeyName,
        hd_path: &str,
        passphrase: &str,
    ) -> Result<(BabylonPublicKey, BtcPublicKey)>;

    /// Sign `msg` with the Babylon key bound to `btc_pk` (proof of possession).
    async fn sign_babylon(&self, btc_pk: &BtcPublicKey, msg: &[u8]) -> Result<Vec<u8>>;

    /// Sign `msg` with the BTC key (proof of possession, randomness commits).
    async fn sign_btc(&self, btc_pk: &BtcPublicKey, msg: &[u8]) -> Result<Vec<u8>>;

    /// Derive the public halves of `num` randomness pairs starting at
    /// `start_height`.
    async fn create_randomness_pair_list(
        &self,
        btc_pk: &BtcPublicKey,
        chain_id: &ChainId,
        start_height: u64,
        num: u32,
    ) -> Result<Vec<PubRandValue>>;

    /// EOTS-sign `msg_hash` with the secret randomness committed for
    /// `(chain_id, height)`.
    async fn sign_eots(
        &self,
        btc_pk: &BtcPublicKey,
        chain_id: &ChainId,
        height: u64,
        msg_hash: &Hash32,
    ) -> Result<EotsSignature>;

    /// Export the BTC secret key bytes, for the operator-facing conflicting
    /// vote response.
    async fn key_record(&self, btc_pk: &BtcPublicKey, passphrase: &str) -> Result<Vec<u8>>;

    /// Whether `candidate_sk` equals the local BTC secret up to secp256k1
    /// sign (`candidate == local || candidate == -local`).
    async fn local_key_matches(&self, btc_pk: &BtcPublicKey, candidate_sk: &[u8]) -> Result<bool>;
}
