pub mod encoding;
pub mod error;
pub mod types;

pub use error::{ErrorCode, ProviderError, Result};
pub use types::{
    BabylonPublicKey, BlockHash, BtcPublicKey, ChainId, EotsSignature, Hash32, KeyName,
    PubRandValue, TxResponse,
};
