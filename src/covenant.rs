use crate::context::{Change, TxContext};
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash, HashEngine};
use bitcoin::opcodes::all::{OP_EQUAL, OP_HASH256};
use bitcoin::script::Builder;
use bitcoin::{Amount, Script, ScriptBuf, TxOut};

/// Serialize an output paying `value` to the covenant's own locking
/// condition.
///
/// `lock_script` must be derived from the state *after* the transition has
/// been applied, so the committed bytes carry the successor state. Building
/// it from the pre-transition state commits the spender to stale state and
/// the spend will never verify against an honestly constructed transaction.
pub fn state_output(lock_script: &Script, value: Amount) -> Vec<u8> {
    address_output(lock_script, value)
}

/// Serialize a plain payment of `value` to `script_pubkey`, using the
/// ledger's consensus encoding: 8-byte little-endian satoshi value followed
/// by the length-prefixed script.
pub fn address_output(script_pubkey: &Script, value: Amount) -> Vec<u8> {
    serialize(&TxOut {
        value,
        script_pubkey: script_pubkey.to_owned(),
    })
}

/// Serialize the output returning leftover funds to the spender.
pub fn change_output(change: &Change) -> Vec<u8> {
    address_output(&change.script_pubkey, change.value)
}

/// Wrap a redeem script into the covenant's script-hash locking condition:
/// `OP_HASH256 <hash256(redeem)> OP_EQUAL`.
///
/// Covenants build their redeem script as the state fields pushed in a fixed
/// order followed by the compiled predicate template, so the persisted state
/// is a parameter of the locking condition and any observer can re-derive
/// the lock from the same state.
pub fn covenant_lock(redeem_script: &Script) -> ScriptBuf {
    let script_hash = sha256d::Hash::hash(redeem_script.as_bytes());

    Builder::new()
        .push_opcode(OP_HASH256)
        .push_slice(script_hash.to_byte_array())
        .push_opcode(OP_EQUAL)
        .into_script()
}

/// Digest the ledger computes over a transaction's outputs: double-SHA256
/// of the serialized outputs concatenated in order.
pub fn outputs_digest(outputs: &[Vec<u8>]) -> sha256d::Hash {
    let mut engine = sha256d::Hash::engine();
    for output in outputs {
        engine.input(output);
    }

    sha256d::Hash::from_engine(engine)
}

/// Verify that the spending transaction commits to exactly `expected`, in
/// order.
///
/// This is the sole mechanism by which a covenant constrains the spender's
/// transaction shape. Order matters: permuting two otherwise correct
/// outputs produces a different digest and the spend is rejected.
pub fn verify_outputs(expected: &[Vec<u8>], ctx: &TxContext) -> Result<(), CommitmentMismatch> {
    let expected = outputs_digest(expected);

    if expected != ctx.outputs_digest {
        log::debug!(
            "output commitment mismatch: expected {}, committed {}",
            expected,
            ctx.outputs_digest
        );
        return Err(CommitmentMismatch {
            expected,
            committed: ctx.outputs_digest,
        });
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transaction commits to output digest {committed}, expected {expected}")]
pub struct CommitmentMismatch {
    pub expected: sha256d::Hash,
    pub committed: sha256d::Hash,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::sha256d;

    fn dummy_outputs() -> Vec<Vec<u8>> {
        let script = Builder::new().push_int(1).into_script();
        vec![
            address_output(&script, Amount::from_sat(1_000)),
            address_output(&script, Amount::from_sat(2_000)),
        ]
    }

    #[test]
    fn digest_is_hash_of_ordered_concatenation() {
        let outputs = dummy_outputs();

        let concatenated = outputs.concat();
        let expected = sha256d::Hash::hash(&concatenated);

        assert_eq!(outputs_digest(&outputs), expected);
    }

    #[test]
    fn verify_accepts_matching_commitment() {
        let outputs = dummy_outputs();
        let ctx = TxContext {
            outputs_digest: outputs_digest(&outputs),
            prevouts: vec![],
            lock_time: 0,
        };

        verify_outputs(&outputs, &ctx).unwrap();
    }

    #[test]
    fn verify_rejects_permuted_outputs() {
        let outputs = dummy_outputs();
        let ctx = TxContext {
            outputs_digest: outputs_digest(&outputs),
            prevouts: vec![],
            lock_time: 0,
        };

        let permuted = vec![outputs[1].clone(), outputs[0].clone()];
        verify_outputs(&permuted, &ctx).expect_err("could verify permuted outputs");
    }

    #[test]
    fn verify_rejects_single_byte_difference() {
        let outputs = dummy_outputs();
        let ctx = TxContext {
            outputs_digest: outputs_digest(&outputs),
            prevouts: vec![],
            lock_time: 0,
        };

        let mut tampered = outputs;
        tampered[0][0] ^= 0x01;
        verify_outputs(&tampered, &ctx).expect_err("could verify tampered outputs");
    }

    #[test]
    fn covenant_lock_is_script_hash_pattern() {
        let redeem = Builder::new().push_int(42).into_script();
        let lock = covenant_lock(&redeem);

        let bytes = lock.as_bytes();
        // OP_HASH256, a 32-byte push and OP_EQUAL
        assert_eq!(bytes.len(), 35);
        assert_eq!(bytes[0], OP_HASH256.to_u8());
        assert_eq!(bytes[1], 32);
        assert_eq!(bytes[34], OP_EQUAL.to_u8());
        assert_eq!(
            &bytes[2..34],
            sha256d::Hash::hash(redeem.as_bytes()).to_byte_array()
        );
    }
}
