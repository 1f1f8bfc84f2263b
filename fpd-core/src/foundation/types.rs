use crate::foundation::encoding::{parse_hex_32bytes, parse_hex_33bytes};
use crate::foundation::error::ProviderError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

pub type Hash32 = [u8; 32];

macro_rules! define_id_type {
    (string $name:ident) => {
        #[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };

    (bytes32 $name:ident) => {
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
        pub struct $name(Hash32);

        impl $name {
            pub const fn new(value: Hash32) -> Self {
                Self(value)
            }

            pub fn as_bytes(&self) -> &Hash32 {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl FromStr for $name {
            type Err = ProviderError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(parse_hex_32bytes(s)?))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_string())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    let bytes = Hash32::deserialize(deserializer)?;
                    Ok(Self(bytes))
                }
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<Hash32> for $name {
            fn from(value: Hash32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Hash32 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_id_type!(string ChainId);
define_id_type!(string KeyName);
define_id_type!(bytes32 BlockHash);
define_id_type!(bytes32 BtcPublicKey);
define_id_type!(bytes32 PubRandValue);
define_id_type!(bytes32 EotsSignature);

/// Compressed secp256k1 public key on the Babylon side (33 bytes).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BabylonPublicKey([u8; 33]);

impl BabylonPublicKey {
    pub const fn new(value: [u8; 33]) -> Self {
        Self(value)
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

impl Default for BabylonPublicKey {
    fn default() -> Self {
        Self([0u8; 33])
    }
}

impl fmt::Display for BabylonPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for BabylonPublicKey {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(parse_hex_33bytes(s)?))
    }
}

impl Serialize for BabylonPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for BabylonPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(deserializer)?;
            let array: [u8; 33] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| serde::de::Error::custom("expected 33-byte public key"))?;
            Ok(Self(array))
        }
    }
}

/// Response of a transaction submission through the chain client.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct TxResponse {
    pub tx_hash: String,
}

impl TxResponse {
    pub fn new(tx_hash: impl Into<String>) -> Self {
        Self { tx_hash: tx_hash.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_pk_from_str_accepts_prefixed_and_unprefixed() {
        let hex_prefixed = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let pk1: BtcPublicKey = hex_prefixed.parse().expect("btc pk parse");
        assert_eq!(pk1.to_string(), "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef");

        let hex_unprefixed = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let pk2: BtcPublicKey = hex_unprefixed.parse().expect("btc pk parse");
        assert_eq!(pk1, pk2);

        assert!("not-hex".parse::<BtcPublicKey>().is_err());
        assert!("0xabcd".parse::<BtcPublicKey>().is_err());
    }

    #[test]
    fn block_hash_serde_json_is_hex_string() {
        let hash = BlockHash::new([0xAB; 32]);
        let json = serde_json::to_string(&hash).expect("serialize json");
        assert_eq!(json, format!("\"{}\"", hash));
        let decoded: BlockHash = serde_json::from_str(&json).expect("deserialize json");
        assert_eq!(decoded, hash);
    }

    #[test]
    fn btc_pk_bincode_is_stable_fixed_width() {
        let pk = BtcPublicKey::new([0xCD; 32]);
        let bytes = bincode::serialize(&pk).expect("serialize bincode");
        assert_eq!(bytes.len(), 32);
    }

    #[test]
    fn babylon_pk_round_trips() {
        let pk = BabylonPublicKey::new([0x02; 33]);
        let json = serde_json::to_string(&pk).expect("serialize json");
        let decoded: BabylonPublicKey = serde_json::from_str(&json).expect("deserialize json");
        assert_eq!(decoded, pk);
    }
}
