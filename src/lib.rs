pub mod chain;
pub mod context;
pub mod covenant;
pub mod loan;
pub mod oracle;
pub mod staking;
pub mod token;

pub use chain::{Chain, WrongChain};
pub use context::{Change, TxContext};
pub use covenant::CommitmentMismatch;
pub use loan::{LoanCovenant, LoanError};
pub use staking::{Staker, StakingCovenant, StakingError};
pub use token::TokenId;
