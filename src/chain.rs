use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Chain {
    Mainnet,
    Testnet,
    Regtest,
}

impl From<Chain> for Network {
    fn from(from: Chain) -> Self {
        match from {
            Chain::Mainnet => Network::Bitcoin,
            Chain::Testnet => Network::Testnet,
            Chain::Regtest => Network::Regtest,
        }
    }
}

impl FromStr for Chain {
    type Err = WrongChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowercase = s.to_ascii_lowercase();
        match lowercase.as_str() {
            "mainnet" => Ok(Chain::Mainnet),
            "testnet" => Ok(Chain::Testnet),
            "regtest" => Ok(Chain::Regtest),
            _ => Err(WrongChain(lowercase)),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Chain::Mainnet => "mainnet",
            Chain::Testnet => "testnet",
            Chain::Regtest => "regtest",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported chain: {0}")]
pub struct WrongChain(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_chains() {
        assert_eq!("mainnet".parse::<Chain>().unwrap(), Chain::Mainnet);
        assert_eq!("Testnet".parse::<Chain>().unwrap(), Chain::Testnet);
        assert_eq!("REGTEST".parse::<Chain>().unwrap(), Chain::Regtest);

        "liquid".parse::<Chain>().expect_err("could parse unknown chain");
    }
}
