use crate::chain::Chain;
use crate::context::{Change, TxContext};
use crate::covenant::{self, CommitmentMismatch};
use bitcoin::script::Builder;
use bitcoin::{Address, Amount, PublicKey, ScriptBuf};
use serde::{Deserialize, Serialize};


/// One deposit slot. A zero stake means the slot is unoccupied; the slot is
/// never deleted, only reset to zero stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staker {
    pub pk: PublicKey,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub staked: Amount,
    pub unlock_time: u64,
}

impl Staker {
    /// The script a withdrawal pays out to.
    pub fn payout_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2pkh(&self.pk.pubkey_hash())
    }

    pub fn payout_address(&self, chain: Chain) -> Address {
        Address::p2pkh(self.pk.pubkey_hash(), bitcoin::Network::from(chain))
    }
}

/// Covenant holding one staker's deposit behind a time-lock.
///
/// `shell_pk` and `target_pk` are configuration keys fixed when the
/// covenant is created; only the staker slot and the reserve change across
/// spends. Each accepted operation is a spend of the covenant's current
/// UTXO: `deposit` replaces it with a successor carrying the updated state,
/// `withdraw` closes the slot for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingCovenant {
    staker: Staker,
    shell_pk: PublicKey,
    target_pk: PublicKey,
    /// Counterparty reserve in shell-token units. Deposits draw it down,
    /// withdrawals restore it. Whether it may go negative is the
    /// counterparty's problem, not this covenant's: no sign check here.
    shell_token_reserve: i64,
    template: ScriptBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum StakingError {
    #[error("staking slot is already occupied")]
    AlreadyStaked,
    #[error("transaction declares lock time {declared}, unlock time is {required}")]
    TimeLockNotReached { declared: u64, required: u64 },
    #[error("withdrawal of {requested} does not match staked amount {staked}")]
    AmountMismatch { requested: Amount, staked: Amount },
    #[error(transparent)]
    Commitment(#[from] CommitmentMismatch),
}

impl StakingCovenant {
    /// A fresh covenant with an empty slot.
    ///
    /// `template` is the compiled spending-predicate bytecode produced at
    /// deployment; it is opaque here and only ever concatenated into the
    /// locking condition.
    pub fn new(
        shell_pk: PublicKey,
        target_pk: PublicKey,
        shell_token_reserve: i64,
        template: ScriptBuf,
    ) -> Self {
        Self {
            staker: Staker {
                pk: shell_pk,
                staked: Amount::ZERO,
                unlock_time: 0,
            },
            shell_pk,
            target_pk,
            shell_token_reserve,
            template,
        }
    }

    pub fn staker(&self) -> &Staker {
        &self.staker
    }

    pub fn shell_token_reserve(&self) -> i64 {
        self.shell_token_reserve
    }

    /// The locking condition a state output carrying this snapshot pays to.
    pub fn lock_script(&self) -> ScriptBuf {
        covenant::covenant_lock(&self.state_script())
    }

    /// Redeem script: state fields pushed in fixed order, followed by the
    /// predicate template.
    fn state_script(&self) -> ScriptBuf {
        let pushes = Builder::new()
            .push_slice(self.shell_pk.inner.serialize())
            .push_slice(self.target_pk.inner.serialize())
            .push_int(self.shell_token_reserve)
            .push_slice(self.staker.pk.inner.serialize())
            .push_int(self.staker.staked.to_sat() as i64)
            .push_int(self.staker.unlock_time as i64)
            .into_script();

        let mut script = pushes.into_bytes();
        script.extend_from_slice(self.template.as_bytes());

        ScriptBuf::from_bytes(script)
    }

    /// The successor snapshot a deposit produces.
    ///
    /// Wallets use this to derive the state output's locking condition
    /// before proposing the spend; [`StakingCovenant::deposit`] rebuilds
    /// the same snapshot when it verifies the proposal.
    pub fn with_deposit(&self, user: PublicKey, fund_in: Amount, unlock_time: u64) -> Self {
        StakingCovenant {
            staker: Staker {
                pk: user,
                staked: fund_in,
                unlock_time,
            },
            shell_token_reserve: self.shell_token_reserve - fund_in.to_sat() as i64,
            ..self.clone()
        }
    }

    /// Fill the empty slot with `fund_in` satoshis locked until
    /// `unlock_time`.
    ///
    /// `unlock_time` is taken as supplied; whether it is sensible only
    /// matters once the staker tries to withdraw. The spending transaction
    /// must commit to exactly the successor state output carrying `fund_in`
    /// followed by the change output.
    pub fn deposit(
        &self,
        user: PublicKey,
        fund_in: Amount,
        unlock_time: u64,
        change: &Change,
        ctx: &TxContext,
    ) -> Result<StakingCovenant, StakingError> {
        if self.staker.staked != Amount::ZERO {
            return Err(StakingError::AlreadyStaked);
        }

        let next = self.with_deposit(user, fund_in, unlock_time);

        let expected = [
            covenant::state_output(&next.lock_script(), fund_in),
            covenant::change_output(change),
        ];
        covenant::verify_outputs(&expected, ctx)?;

        log::debug!(
            "deposit of {} accepted, reserve now {}",
            fund_in,
            next.shell_token_reserve
        );

        Ok(next)
    }

    /// Pay the full stake back to the staker and close the slot.
    ///
    /// The time-lock is checked before the amount. The transaction only has
    /// to declare a lock at least as late as the slot's unlock time; the
    /// ledger's own lock-time rule keeps it out of blocks before then.
    /// Partial withdrawals are not a thing: `fund_out` must equal the stake
    /// exactly.
    ///
    /// No state output is rebuilt, so the covenant's UTXO chain ends with
    /// this spend. The returned snapshot carries the restored reserve and
    /// the zeroed slot for caller-side bookkeeping.
    pub fn withdraw(
        &self,
        fund_out: Amount,
        change: &Change,
        ctx: &TxContext,
    ) -> Result<StakingCovenant, StakingError> {
        if ctx.lock_time < self.staker.unlock_time {
            return Err(StakingError::TimeLockNotReached {
                declared: ctx.lock_time,
                required: self.staker.unlock_time,
            });
        }
        if fund_out != self.staker.staked {
            return Err(StakingError::AmountMismatch {
                requested: fund_out,
                staked: self.staker.staked,
            });
        }

        let expected = [
            covenant::address_output(&self.staker.payout_script(), fund_out),
            covenant::change_output(change),
        ];
        covenant::verify_outputs(&expected, ctx)?;

        log::debug!("withdrawal of {} accepted, slot closed", fund_out);

        let mut settled = self.clone();
        settled.staker.staked = Amount::ZERO;
        settled.shell_token_reserve += fund_out.to_sat() as i64;

        Ok(settled)
    }
}
