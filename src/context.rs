use bitcoin::hashes::sha256d;
use bitcoin::{Amount, OutPoint, ScriptBuf};
use serde::{Deserialize, Serialize};

/// Read-only view of the spending transaction, supplied by the ledger for a
/// single covenant evaluation.
///
/// A covenant trusts nothing about the proposed transaction except the
/// digest committed over its outputs, the previous-output references its
/// inputs spend and the time-lock it declares. Everything else is
/// reconstructed locally and checked against `outputs_digest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    /// Double-SHA256 over the concatenation of the transaction's serialized
    /// outputs, in order.
    pub outputs_digest: sha256d::Hash,
    /// Previous-output references of the transaction's inputs, in input
    /// order.
    pub prevouts: Vec<OutPoint>,
    /// The earliest ledger time at which the transaction declares itself
    /// valid.
    pub lock_time: u64,
}

/// Leftover funds returned to the spender.
///
/// The amount is input-total minus the explicitly specified outputs and the
/// fee. It is computed by the wallet constructing the transaction, never by
/// the covenant; the covenant only commits to whatever the spender declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub script_pubkey: ScriptBuf,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
}

impl Change {
    pub fn new(script_pubkey: ScriptBuf, value: Amount) -> Self {
        Self {
            script_pubkey,
            value,
        }
    }
}
