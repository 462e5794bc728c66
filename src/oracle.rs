use anyhow::{bail, Result};
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::OutPoint;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Byte offset of the attested outpoint inside a serialized attestation.
pub const OUTPOINT_OFFSET: usize = 0;
/// Consensus-encoded outpoint width: 32-byte txid plus 4-byte vout.
pub const OUTPOINT_LEN: usize = 36;
/// Byte offset of the attested token amount, immediately after the
/// outpoint.
pub const TOKEN_AMOUNT_OFFSET: usize = OUTPOINT_OFFSET + OUTPOINT_LEN;
/// Width of the token amount field, a little-endian u64.
pub const TOKEN_AMOUNT_LEN: usize = 8;

/// Number of chained SHA256 blocks the message digest expands to before it
/// is interpreted as an integer. 12 blocks make 3072 bits, comfortably
/// wider than any production modulus.
const DIGEST_BLOCKS: usize = 12;

/// A statement about one token UTXO, signed by the oracle.
///
/// The byte layout is a wire contract between the oracle and the loan
/// covenant: the outpoint and the token amount sit at fixed offsets and the
/// covenant reads them from the raw bytes, never through this struct.
/// Fields after the amount are informational and may grow without breaking
/// the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// The token UTXO the oracle observed.
    pub outpoint: OutPoint,
    /// Token units held by that UTXO.
    pub token_amount: u64,
    /// UNIX timestamp of the observation.
    pub timestamp: u64,
}

impl Attestation {
    /// Serialize to the fixed wire layout: outpoint, token amount,
    /// timestamp.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = serialize(&self.outpoint);
        bytes.extend_from_slice(&self.token_amount.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());

        bytes
    }
}

/// Verification side of the oracle's signature scheme.
///
/// Implementations must be deterministic and side-effect-free; the loan
/// covenant calls this once per evaluation and treats a `false` as a
/// terminal rejection.
pub trait VerifyAttestation {
    fn verify(&self, message: &[u8], signature: &Signature, key: &PublicKey) -> bool;
}

/// Oracle public key: the modulus `n = p * q` of a quadratic-residue
/// signature scheme. A signature is a square root of the (padded) message
/// digest modulo `n`, which only the holder of the factors can compute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    n: BigUint,
}

impl PublicKey {
    pub fn new(n: BigUint) -> Self {
        Self { n }
    }

    /// Little-endian bytes of the modulus, as embedded in locking
    /// conditions.
    pub fn to_bytes_le(&self) -> Vec<u8> {
        self.n.to_bytes_le()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Square root of the padded message digest, modulo the oracle modulus.
    pub s: BigUint,
    /// Padding counter appended to the message before hashing, chosen by
    /// the signer so the digest has a root at all.
    pub padding: u64,
}

/// The oracle's signing key: two primes, both congruent to 3 mod 4 so that
/// square roots come out of a single modular exponentiation.
///
/// Generating the primes is the oracle operator's concern and out of scope
/// here; the covenant side only ever sees the modulus.
#[derive(Debug, Clone)]
pub struct KeyPair {
    p: BigUint,
    q: BigUint,
}

impl KeyPair {
    pub fn new(p: BigUint, q: BigUint) -> Result<Self> {
        let three = BigUint::from(3u32);
        if &p % 4u32 != three || &q % 4u32 != three {
            bail!("both primes must be congruent to 3 mod 4");
        }

        Ok(Self { p, q })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(&self.p * &self.q)
    }

    /// Sign a message by finding a padding under which the digest is a
    /// quadratic residue modulo both primes, then taking its square root.
    ///
    /// The padding search terminates quickly: each counter value is a
    /// residue modulo both primes with probability roughly 1/4.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let n = &self.p * &self.q;
        let one = BigUint::from(1u32);

        let euler_p = (self.p.clone() - 1u32) >> 1u32;
        let euler_q = (self.q.clone() - 1u32) >> 1u32;
        let root_p = (self.p.clone() + 1u32) >> 2u32;
        let root_q = (self.q.clone() + 1u32) >> 2u32;

        let mut padding = 0u64;
        loop {
            let h = digest_to_int(message, padding) % &n;
            let hp = &h % &self.p;
            let hq = &h % &self.q;

            if hp.modpow(&euler_p, &self.p) == one && hq.modpow(&euler_q, &self.q) == one {
                let rp = hp.modpow(&root_p, &self.p);
                let rq = hq.modpow(&root_q, &self.q);

                return Signature {
                    s: crt_combine(&rp, &self.p, &rq, &self.q),
                    padding,
                };
            }

            padding += 1;
        }
    }
}

/// The shipped verifier for the quadratic-residue scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct RabinVerifier;

impl VerifyAttestation for RabinVerifier {
    fn verify(&self, message: &[u8], signature: &Signature, key: &PublicKey) -> bool {
        if signature.s >= key.n {
            return false;
        }

        let h = digest_to_int(message, signature.padding) % &key.n;
        let two = BigUint::from(2u32);

        signature.s.modpow(&two, &key.n) == h
    }
}

/// Expand `message || LE64(padding)` into a wide integer by chaining SHA256
/// blocks and reading the result little-endian.
fn digest_to_int(message: &[u8], padding: u64) -> BigUint {
    let mut engine = sha256::Hash::engine();
    engine.input(message);
    engine.input(&padding.to_le_bytes());
    let mut block = sha256::Hash::from_engine(engine);

    let mut bytes = block.to_byte_array().to_vec();
    for _ in 1..DIGEST_BLOCKS {
        block = sha256::Hash::hash(&block.to_byte_array());
        bytes.extend_from_slice(&block.to_byte_array());
    }

    BigUint::from_bytes_le(&bytes)
}

/// Recombine square roots modulo `p` and `q` into a root modulo `p * q`.
fn crt_combine(rp: &BigUint, p: &BigUint, rq: &BigUint, q: &BigUint) -> BigUint {
    // p is prime, so Fermat gives the inverse of p modulo q
    let p_inv = p.modpow(&(q.clone() - 2u32), q);

    let diff = ((rq + q) - (rp % q)) % q;
    let t = (diff * p_inv) % q;

    rp + p * t
}
