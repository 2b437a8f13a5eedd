use crate::types::{
    BetInfo,
    Epoch,
    Position,
    Price,
    Round,
    Wei,
};
use alloy::primitives::{
    Address,
    TxHash,
};
use color_eyre::eyre::Result;
use std::future::Future;

/// Read surface of the prediction contract and its price oracle.
pub trait PredictionSource: Send + Sync {
    fn current_epoch(&self) -> impl Future<Output = Result<Epoch>> + Send;

    fn min_bet_amount(&self) -> impl Future<Output = Result<Wei>> + Send;

    fn paused(&self) -> impl Future<Output = Result<bool>> + Send;

    fn oracle(&self) -> impl Future<Output = Result<Address>> + Send;

    /// Answer of the oracle's latest round.
    fn latest_price(&self, oracle: Address) -> impl Future<Output = Result<Price>> + Send;

    /// `Ok(None)` when the contract has no data for `epoch`.
    fn round(&self, epoch: Epoch) -> impl Future<Output = Result<Option<Round>>> + Send;

    fn user_rounds_length(&self, user: Address) -> impl Future<Output = Result<u64>> + Send;

    fn user_rounds(
        &self,
        user: Address,
        cursor: u64,
        size: u64,
    ) -> impl Future<Output = Result<Vec<(Epoch, BetInfo)>>> + Send;
}

/// Write surface; implementations return only after the transaction is
/// confirmed on chain.
pub trait BetSubmitter: Send + Sync {
    /// Account that signs the bets.
    fn bettor(&self) -> Option<Address>;

    fn place_bet(
        &self,
        position: Position,
        epoch: Epoch,
        amount: Wei,
    ) -> impl Future<Output = Result<TxHash>> + Send;
}
