use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Amount, OutPoint, PublicKey, ScriptBuf, Txid};
use mooring::{Change, TxContext};
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};

/// The digest the ledger commits over a transaction's outputs: double
/// SHA256 of the serialized outputs concatenated in order. Computed here
/// from scratch so the covenant's own digest code is checked against an
/// independent implementation.
pub fn ledger_outputs_digest(outputs: &[Vec<u8>]) -> sha256d::Hash {
    sha256d::Hash::hash(&outputs.concat())
}

/// Context for a proposed spend, as the ledger would hand it to the
/// covenant.
pub fn propose_spend(outputs: &[Vec<u8>], prevouts: Vec<OutPoint>, lock_time: u64) -> TxContext {
    TxContext {
        outputs_digest: ledger_outputs_digest(outputs),
        prevouts,
        lock_time,
    }
}

pub fn change_to_fresh_key<R>(rng: &mut R, value: Amount) -> Change
where
    R: RngCore + CryptoRng,
{
    let (_sk, pk) = make_keypair(rng);

    Change::new(ScriptBuf::new_p2pkh(&pk.pubkey_hash()), value)
}

pub fn random_outpoint<R: RngCore>(rng: &mut R) -> OutPoint {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);

    OutPoint {
        txid: Txid::from_byte_array(bytes),
        vout: rng.next_u32() % 4,
    }
}

/// Compiled predicate bytecode would come out of the contract toolchain at
/// deployment; any fixed bytes exercise the covenant the same way.
pub fn dummy_template() -> ScriptBuf {
    ScriptBuf::from_bytes(vec![0x75, 0x51])
}

pub fn oracle_keypair() -> mooring::oracle::KeyPair {
    // Mersenne primes 2^107 - 1 and 2^127 - 1, both 3 mod 4
    let p = (BigUint::from(1u32) << 107u32) - 1u32;
    let q = (BigUint::from(1u32) << 127u32) - 1u32;

    mooring::oracle::KeyPair::new(p, q).expect("valid signing primes")
}

pub fn make_keypair<R>(rng: &mut R) -> (SecretKey, PublicKey)
where
    R: RngCore + CryptoRng,
{
    let secp = Secp256k1::new();
    let sk = SecretKey::new(rng);
    let pk = PublicKey::new(sk.public_key(&secp));

    (sk, pk)
}
