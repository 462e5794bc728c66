use crate::chain::Chain;
use crate::context::{Change, TxContext};
use crate::covenant::{self, CommitmentMismatch};
use crate::oracle::{self, VerifyAttestation};
use crate::token::{self, TokenId};
use anyhow::{anyhow, Result};
use bitcoin::consensus::encode::serialize;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{Address, Amount, PublicKey, ScriptBuf};
use serde::{Deserialize, Serialize};


/// Input index of the token UTXO being spent alongside the covenant in a
/// repayment. The oracle's attestation must name exactly this input.
const TOKEN_INPUT_INDEX: usize = 1;

/// Covenant holding an offered loan: `token_amount` units of `token_id`
/// against `collateral` satoshis.
///
/// The loan has two phases and `taken` is the discriminator. An offered
/// covenant is spent by `borrow`, which hands the principal to the borrower
/// and re-emits the covenant with `taken` set; a taken covenant is spent by
/// `repay`, which returns the principal to the lender, releases the
/// collateral and ends the UTXO chain. Everything except `taken` is fixed
/// at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanCovenant {
    lender_pk: PublicKey,
    borrower_pk: PublicKey,
    token_id: TokenId,
    token_amount: u64,
    /// Simple interest in whole percent. Advisory: no transition enforces
    /// it, see [`LoanCovenant::repayment_due`].
    interest_rate: u64,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    collateral: Amount,
    /// Advisory settlement deadline, committed but not enforced by any
    /// transition.
    deadline: u64,
    taken: bool,
    oracle_key: oracle::PublicKey,
    template: ScriptBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum LoanError {
    #[error("loan has already been taken")]
    LoanAlreadyTaken,
    #[error("loan has not been taken")]
    LoanNotTaken,
    #[error("oracle signature does not verify")]
    OracleSigInvalid,
    #[error("attestation is not bound to the token input of this transaction")]
    OracleBindingMismatch,
    #[error("attested token amount does not match the loan principal")]
    OracleAmountMismatch,
    #[error(transparent)]
    Commitment(#[from] CommitmentMismatch),
}

impl LoanCovenant {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lender_pk: PublicKey,
        borrower_pk: PublicKey,
        token_id: TokenId,
        token_amount: u64,
        interest_rate: u64,
        collateral: Amount,
        deadline: u64,
        oracle_key: oracle::PublicKey,
        template: ScriptBuf,
    ) -> Self {
        Self {
            lender_pk,
            borrower_pk,
            token_id,
            token_amount,
            interest_rate,
            collateral,
            deadline,
            taken: false,
            oracle_key,
            template,
        }
    }

    pub fn taken(&self) -> bool {
        self.taken
    }

    pub fn token_amount(&self) -> u64 {
        self.token_amount
    }

    pub fn collateral(&self) -> Amount {
        self.collateral
    }

    pub fn borrower_address(&self, chain: Chain) -> Address {
        Address::p2pkh(self.borrower_pk.pubkey_hash(), bitcoin::Network::from(chain))
    }

    pub fn lender_address(&self, chain: Chain) -> Address {
        Address::p2pkh(self.lender_pk.pubkey_hash(), bitcoin::Network::from(chain))
    }

    fn borrower_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2pkh(&self.borrower_pk.pubkey_hash())
    }

    fn lender_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2pkh(&self.lender_pk.pubkey_hash())
    }

    /// The locking condition a state output carrying this snapshot pays to.
    pub fn lock_script(&self) -> ScriptBuf {
        covenant::covenant_lock(&self.state_script())
    }

    /// Redeem script: state fields pushed in fixed order, followed by the
    /// predicate template.
    fn state_script(&self) -> ScriptBuf {
        let oracle_modulus = PushBytesBuf::try_from(self.oracle_key.to_bytes_le())
            .expect("oracle modulus fits in a script push");

        let pushes = Builder::new()
            .push_slice(self.lender_pk.inner.serialize())
            .push_slice(self.borrower_pk.inner.serialize())
            .push_slice(self.token_id.as_bytes())
            .push_int(self.token_amount as i64)
            .push_int(self.interest_rate as i64)
            .push_int(self.collateral.to_sat() as i64)
            .push_int(self.deadline as i64)
            .push_int(self.taken as i64)
            .push_slice(oracle_modulus)
            .into_script();

        let mut script = pushes.into_bytes();
        script.extend_from_slice(self.template.as_bytes());

        ScriptBuf::from_bytes(script)
    }

    /// The successor snapshot drawing the loan produces.
    ///
    /// Wallets use this to derive the state output's locking condition
    /// before proposing the spend; [`LoanCovenant::borrow`] rebuilds the
    /// same snapshot when it verifies the proposal.
    pub fn with_taken(&self) -> Self {
        LoanCovenant {
            taken: true,
            ..self.clone()
        }
    }

    /// Hand the principal to the borrower and mark the loan taken.
    ///
    /// The spending transaction must commit to exactly: the token transfer
    /// of the principal to the borrower, the successor state output
    /// carrying the collateral, and the change output, in that order.
    pub fn borrow(&self, change: &Change, ctx: &TxContext) -> Result<LoanCovenant, LoanError> {
        if self.taken {
            return Err(LoanError::LoanAlreadyTaken);
        }

        let next = self.with_taken();

        let expected = [
            token::transfer_output(
                &self.borrower_script(),
                &self.token_id,
                self.token_amount,
                token::DUST,
            ),
            covenant::state_output(&next.lock_script(), self.collateral),
            covenant::change_output(change),
        ];
        covenant::verify_outputs(&expected, ctx)?;

        log::debug!(
            "borrow of {} token units against {} accepted",
            self.token_amount,
            self.collateral
        );

        Ok(next)
    }

    /// Return the principal to the lender and release the collateral to the
    /// borrower, closing the loan.
    ///
    /// `message` is the oracle's raw attestation bytes. Beyond the
    /// signature itself, two facts are read from fixed offsets inside the
    /// message and checked bit-exact: the attested outpoint must equal the
    /// transaction's second previous-output reference, which ties the
    /// attestation to the token UTXO actually spent here and makes a stale
    /// attestation useless against any other spend; and the attested token
    /// amount must equal the loan principal.
    pub fn repay<V>(
        &self,
        message: &[u8],
        signature: &oracle::Signature,
        verifier: &V,
        change: &Change,
        ctx: &TxContext,
    ) -> Result<(), LoanError>
    where
        V: VerifyAttestation + ?Sized,
    {
        if !self.taken {
            return Err(LoanError::LoanNotTaken);
        }

        if !verifier.verify(message, signature, &self.oracle_key) {
            return Err(LoanError::OracleSigInvalid);
        }

        let attested_outpoint = message
            .get(oracle::OUTPOINT_OFFSET..oracle::OUTPOINT_OFFSET + oracle::OUTPOINT_LEN)
            .ok_or(LoanError::OracleBindingMismatch)?;
        let token_input = ctx
            .prevouts
            .get(TOKEN_INPUT_INDEX)
            .ok_or(LoanError::OracleBindingMismatch)?;
        if serialize(token_input) != attested_outpoint {
            return Err(LoanError::OracleBindingMismatch);
        }

        let attested_amount = message
            .get(
                oracle::TOKEN_AMOUNT_OFFSET
                    ..oracle::TOKEN_AMOUNT_OFFSET + oracle::TOKEN_AMOUNT_LEN,
            )
            .ok_or(LoanError::OracleAmountMismatch)?;
        let attested_amount =
            u64::from_le_bytes(attested_amount.try_into().expect("fixed-width slice"));
        if attested_amount != self.token_amount {
            return Err(LoanError::OracleAmountMismatch);
        }

        let expected = [
            token::transfer_output(
                &self.lender_script(),
                &self.token_id,
                self.token_amount,
                token::DUST,
            ),
            covenant::address_output(&self.borrower_script(), self.collateral),
            covenant::change_output(change),
        ];
        covenant::verify_outputs(&expected, ctx)?;

        log::debug!(
            "repayment of {} token units accepted, collateral released",
            self.token_amount
        );

        Ok(())
    }

    /// Principal plus simple interest, in token units.
    ///
    /// Advisory only: `repay` settles against the principal, and how the
    /// interest changes hands is between lender and borrower. This is what
    /// a cooperative settlement owes in total.
    pub fn repayment_due(&self) -> Result<u64> {
        use rust_decimal::prelude::ToPrimitive;
        use rust_decimal::Decimal;

        let principal = Decimal::from(self.token_amount);
        let rate = Decimal::from(self.interest_rate)
            .checked_div(Decimal::from(100u64))
            .ok_or_else(|| anyhow!("division overflow"))?;

        let due = principal + principal * rate;
        due.to_u64()
            .ok_or_else(|| anyhow!("amount due cannot be represented as u64"))
    }
}
