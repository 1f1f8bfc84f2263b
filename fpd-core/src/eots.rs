//! Extractable one-time signatures over secp256k1.
//!
//! An EOTS signature is the `s` part of a BIP-340 Schnorr signature whose
//! nonce is a pre-committed randomness value. Signing two different messages
//! with the same randomness leaks the secret key via [`extract`].

use crate::foundation::{Hash32, ProviderError, Result};

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{
    elliptic_curve::{
        ops::{MulByGenerator, Reduce},
        point::DecompressPoint,
        subtle::Choice,
        PrimeField,
    },
    AffinePoint, ProjectivePoint, Scalar, U256,
};
use sha2::{Digest, Sha256};
use std::ops::Mul;

const CHALLENGE_TAG: &[u8] = b"BIP0340/challenge";

fn tagged_hash(tag: &[u8]) -> Sha256 {
    let tag_hash = Sha256::digest(tag);
    let mut digest = Sha256::new();
    digest.update(tag_hash);
    digest.update(tag_hash);
    digest
}

/// Secret randomness: a scalar on the secp256k1 curve.
pub type SecRand = Scalar;

/// Public randomness: the even-y point `sec_rand * G`, carried around as its
/// x coordinate.
pub type PubRand = ProjectivePoint;

/// The signature scalar `s = sec_rand + challenge * secret_key`.
pub type Signature = Scalar;

pub fn sec_rand_from_bytes(bytes: &Hash32) -> Result<SecRand> {
    Scalar::from_repr_vartime((*bytes).into())
        .ok_or_else(|| ProviderError::crypto("parse sec_rand", "not a canonical scalar"))
}

pub fn pub_rand_from_bytes(x_bytes: &Hash32) -> Result<PubRand> {
    let x = k256::FieldBytes::from(*x_bytes);
    let point = AffinePoint::decompress(&x, Choice::from(0));
    if point.is_some().into() {
        Ok(ProjectivePoint::from(point.unwrap()))
    } else {
        Err(ProviderError::crypto("parse pub_rand", "x coordinate is not on the curve"))
    }
}

pub fn sig_from_bytes(bytes: &Hash32) -> Result<Signature> {
    Scalar::from_repr_vartime((*bytes).into())
        .ok_or_else(|| ProviderError::crypto("parse signature", "not a canonical scalar"))
}

pub fn scalar_to_bytes(scalar: &Scalar) -> Hash32 {
    scalar.to_repr().into()
}

/// The x coordinate of a curve point, i.e. its 32-byte wire form.
pub fn point_x_bytes(point: &ProjectivePoint) -> Result<Hash32> {
    let encoded = point.to_encoded_point(false);
    let x = encoded.x().ok_or_else(|| ProviderError::crypto("encode point", "point at infinity"))?;
    x.as_slice()
        .try_into()
        .map_err(|_| ProviderError::crypto("encode point", "unexpected x coordinate length"))
}

/// Negate the scalar if its public point has an odd y coordinate, so that the
/// x-only wire form decompresses back to the point actually used.
pub fn even_y(scalar: Scalar) -> Scalar {
    let encoded = ProjectivePoint::mul_by_generator(&scalar).to_encoded_point(false);
    match encoded.y() {
        Some(y) if y.last().map(|byte| byte & 1 == 1).unwrap_or(false) => -scalar,
        _ => scalar,
    }
}

fn challenge(r_bytes: &Hash32, p_bytes: &Hash32, msg_hash: &Hash32) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(
        &tagged_hash(CHALLENGE_TAG)
            .chain_update(r_bytes)
            .chain_update(p_bytes)
            .chain_update(msg_hash)
            .finalize(),
    )
}

/// A BTC secret key held as a secp256k1 scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKey {
    inner: k256::SecretKey,
}

impl SecretKey {
    pub fn from_bytes(bytes: &Hash32) -> Result<Self> {
        let scalar = Scalar::from_repr_vartime((*bytes).into())
            .ok_or_else(|| ProviderError::crypto("parse secret key", "not a canonical scalar"))?;
        Ok(Self { inner: k256::SecretKey::new(scalar.into()) })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = crate::foundation::encoding::parse_hex_32bytes(hex_str)?;
        Self::from_bytes(&bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey { inner: self.inner.public_key() }
    }

    /// Produce the signature scalar for `msg_hash` with the given secret
    /// randomness.
    pub fn sign(&self, sec_rand: &SecRand, msg_hash: &Hash32) -> Result<Signature> {
        let x = self.inner.to_nonzero_scalar();
        let p = ProjectivePoint::mul_by_generator(&x);
        let p_bytes = point_x_bytes(&p)?;
        let r_point = ProjectivePoint::mul_by_generator(sec_rand);
        let r_bytes = point_x_bytes(&r_point)?;
        let c = challenge(&r_bytes, &p_bytes, msg_hash);
        Ok(*sec_rand + c * *x)
    }

    pub fn to_bytes(&self) -> Hash32 {
        self.inner.to_bytes().into()
    }
}

/// A BTC public key, the x-only (even-y) point on the curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: k256::PublicKey,
}

impl PublicKey {
    pub fn from_bytes(x_bytes: &Hash32) -> Result<Self> {
        let x = k256::FieldBytes::from(*x_bytes);
        let point = AffinePoint::decompress(&x, Choice::from(0));
        if point.is_some().into() {
            let inner = k256::PublicKey::from_affine(point.unwrap())
                .map_err(|err| ProviderError::crypto("parse public key", err.to_string()))?;
            Ok(Self { inner })
        } else {
            Err(ProviderError::crypto("parse public key", "x coordinate is not on the curve"))
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = crate::foundation::encoding::parse_hex_32bytes(hex_str)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Hash32> {
        point_x_bytes(&self.inner.to_projective())
    }

    /// Verify a signature against a public randomness point and message hash.
    pub fn verify(&self, pub_rand: &PubRand, msg_hash: &Hash32, sig: &Signature) -> Result<bool> {
        let p = self.inner.to_projective();
        let p_bytes = point_x_bytes(&p)?;
        let r_bytes = point_x_bytes(pub_rand)?;
        let c = challenge(&r_bytes, &p_bytes, msg_hash);
        let recovered_r = ProjectivePoint::mul_by_generator(sig) - p.mul(c);
        Ok(recovered_r.eq(pub_rand))
    }
}

/// Recover the secret key from two signatures over different messages that
/// reused the same public randomness.
pub fn extract(
    pk: &PublicKey,
    pub_rand: &PubRand,
    msg1: &Hash32,
    sig1: &Signature,
    msg2: &Hash32,
    sig2: &Signature,
) -> Result<SecretKey> {
    let p = pk.inner.to_projective();
    let p_bytes = point_x_bytes(&p)?;
    let r_bytes = point_x_bytes(pub_rand)?;

    let e1 = challenge(&r_bytes, &p_bytes, msg1);
    let e2 = challenge(&r_bytes, &p_bytes, msg2);
    let e_delta = e1 - e2;

    let inverted_e_delta = Option::<Scalar>::from(e_delta.invert())
        .ok_or_else(|| ProviderError::crypto("extract", "identical challenges, nothing to extract"))?;
    let sk = (*sig1 - *sig2) * inverted_e_delta;
    Ok(SecretKey { inner: k256::SecretKey::new(sk.into()) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret_key(byte: u8) -> SecretKey {
        let scalar = even_y(
            Scalar::from_repr_vartime([byte; 32].into()).expect("scalar"),
        );
        SecretKey::from_bytes(&scalar_to_bytes(&scalar)).expect("secret key")
    }

    fn test_rand(byte: u8) -> (SecRand, PubRand) {
        let scalar = even_y(
            Scalar::from_repr_vartime([byte; 32].into()).expect("scalar"),
        );
        (scalar, ProjectivePoint::mul_by_generator(&scalar))
    }

    #[test]
    fn sign_then_verify() {
        let sk = test_secret_key(0x11);
        let pk = sk.public_key();
        let (sec_rand, pub_rand) = test_rand(0x22);
        let msg_hash = [1u8; 32];
        let sig = sk.sign(&sec_rand, &msg_hash).unwrap();
        assert!(pk.verify(&pub_rand, &msg_hash, &sig).unwrap());
        assert!(!pk.verify(&pub_rand, &[2u8; 32], &sig).unwrap());
    }

    #[test]
    fn pub_rand_round_trips_through_x_bytes() {
        let (_, pub_rand) = test_rand(0x33);
        let x_bytes = point_x_bytes(&pub_rand).unwrap();
        let parsed = pub_rand_from_bytes(&x_bytes).unwrap();
        assert_eq!(parsed, pub_rand);
    }

    #[test]
    fn reusing_randomness_extracts_the_key() {
        let sk = test_secret_key(0x11);
        let pk = sk.public_key();
        let (sec_rand, pub_rand) = test_rand(0x22);
        let msg1 = [1u8; 32];
        let msg2 = [2u8; 32];
        let sig1 = sk.sign(&sec_rand, &msg1).unwrap();
        let sig2 = sk.sign(&sec_rand, &msg2).unwrap();

        let extracted = extract(&pk, &pub_rand, &msg1, &sig1, &msg2, &sig2).unwrap();
        assert_eq!(
            extracted.public_key().to_bytes().unwrap(),
            pk.to_bytes().unwrap(),
        );
    }

    #[test]
    fn extract_rejects_identical_messages() {
        let sk = test_secret_key(0x11);
        let pk = sk.public_key();
        let (sec_rand, pub_rand) = test_rand(0x22);
        let msg = [1u8; 32];
        let sig = sk.sign(&sec_rand, &msg).unwrap();
        assert!(extract(&pk, &pub_rand, &msg, &sig, &msg, &sig).is_err());
    }

    #[test]
    fn deterministic_signature_for_same_inputs() {
        let sk = test_secret_key(0x44);
        let (sec_rand, _) = test_rand(0x55);
        let msg = [9u8; 32];
        let sig1 = sk.sign(&sec_rand, &msg).unwrap();
        let sig2 = sk.sign(&sec_rand, &msg).unwrap();
        assert_eq!(scalar_to_bytes(&sig1), scalar_to_bytes(&sig2));
    }
}
