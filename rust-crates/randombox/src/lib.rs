//! Typed client for the RandomBox loot box contract.
//!
//! The contract holds, per box id, a pool of candidate NFTs and a single
//! randomly selected result. [`BoxGateway`] wraps one deployed instance and
//! exposes the read calls plus the `open` write call.

use std::fmt;

use alloy::{
    primitives::{Address, B256, U256},
    providers::{PendingTransactionError, Provider},
};
use thiserror::Error;

pub mod bindings {
    use alloy::sol;

    sol! {
        #[sol(rpc)]
        contract RandomBox {
            struct Token {
                address tokenContract;
                uint256 tokenId;
            }

            constructor(
                address vrfCoordinator,
                address linkToken,
                uint256 fee,
                bytes32 keyHash
            );

            function ownerOf(uint256 boxId) external view returns (address owner);
            function getStatus(uint256 boxId) external view returns (uint8 status);
            function getTokens(uint256 boxId) external view returns (Token[] memory tokens);
            function getResult(uint256 boxId) external view returns (Token memory result);
            function open(uint256 boxId) external;
        }
    }
}

/// Minimal identifier for an NFT, without metadata.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NftReference {
    pub token_contract: Address,
    pub token_id: U256,
}

impl From<bindings::RandomBox::Token> for NftReference {
    fn from(token: bindings::RandomBox::Token) -> Self {
        NftReference {
            token_contract: token.tokenContract,
            token_id: token.tokenId,
        }
    }
}

impl fmt::Display for NftReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.token_contract, self.token_id)
    }
}

/// Lifecycle of a box as reported by `getStatus`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoxStatus {
    Unlocked,
    ReadyToOpen,
    Opening,
    AlreadyOpened,
    Unknown,
}

impl From<u8> for BoxStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => BoxStatus::Unlocked,
            1 => BoxStatus::ReadyToOpen,
            2 => BoxStatus::Opening,
            3 => BoxStatus::AlreadyOpened,
            _ => BoxStatus::Unknown,
        }
    }
}

impl fmt::Display for BoxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoxStatus::Unlocked => "Unlocked",
            BoxStatus::ReadyToOpen => "Ready to Open",
            BoxStatus::Opening => "Opening",
            BoxStatus::AlreadyOpened => "Already Opened",
            BoxStatus::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// On-chain state of one box, refetched whenever a box view is opened and
/// never cached across boxes.
#[derive(Clone, Debug)]
pub struct BoxDetails {
    pub owner: Address,
    pub tokens: Vec<NftReference>,
    pub status: BoxStatus,
    pub result: NftReference,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("transaction confirmation failed: {0}")]
    Confirmation(#[from] PendingTransactionError),
}

/// Wrapper around a single deployed RandomBox instance.
#[derive(Clone)]
pub struct BoxGateway<P: Provider> {
    instance: bindings::RandomBox::RandomBoxInstance<P>,
}

impl<P: Provider> BoxGateway<P> {
    pub fn new(address: Address, provider: P) -> Self {
        Self {
            instance: bindings::RandomBox::new(address, provider),
        }
    }

    pub fn address(&self) -> Address {
        *self.instance.address()
    }

    pub async fn owner_of(&self, box_id: U256) -> Result<Address, GatewayError> {
        Ok(self.instance.ownerOf(box_id).call().await?)
    }

    pub async fn status(&self, box_id: U256) -> Result<BoxStatus, GatewayError> {
        let code = self.instance.getStatus(box_id).call().await?;
        Ok(BoxStatus::from(code))
    }

    pub async fn tokens(&self, box_id: U256) -> Result<Vec<NftReference>, GatewayError> {
        let tokens = self.instance.getTokens(box_id).call().await?;
        Ok(tokens.into_iter().map(NftReference::from).collect())
    }

    pub async fn result(&self, box_id: U256) -> Result<NftReference, GatewayError> {
        let token = self.instance.getResult(box_id).call().await?;
        Ok(NftReference::from(token))
    }

    /// Fetches the full projection for one box. The calls are awaited
    /// serially in a fixed order: tokens, status, owner, result.
    pub async fn details(&self, box_id: U256) -> Result<BoxDetails, GatewayError> {
        let tokens = self.tokens(box_id).await?;
        let status = self.status(box_id).await?;
        let owner = self.owner_of(box_id).await?;
        let result = self.result(box_id).await?;
        Ok(BoxDetails {
            owner,
            tokens,
            status,
            result,
        })
    }

    /// Submits the open transaction and awaits one confirmation.
    pub async fn open(&self, box_id: U256) -> Result<B256, GatewayError> {
        let pending = self.instance.open(box_id).send().await?;
        Ok(pending.watch().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_display_names() {
        let cases = [
            (0u8, "Unlocked"),
            (1, "Ready to Open"),
            (2, "Opening"),
            (3, "Already Opened"),
        ];
        for (code, expected) in cases {
            assert_eq!(BoxStatus::from(code).to_string(), expected);
        }
    }

    #[test]
    fn out_of_range_status_codes_are_unknown() {
        for code in [4u8, 7, 255] {
            assert_eq!(BoxStatus::from(code), BoxStatus::Unknown);
            assert_eq!(BoxStatus::from(code).to_string(), "Unknown");
        }
    }

    #[test]
    fn reference_key_is_contract_slash_id() {
        let reference = NftReference {
            token_contract: Address::ZERO,
            token_id: U256::from(7u64),
        };
        let rendered = reference.to_string();
        assert!(rendered.ends_with("/7"));
        assert!(rendered.starts_with("0x"));
    }
}
