use crate::{
    source::PredictionSource,
    types::{
        BetInfo,
        BetResult,
        Epoch,
        Position,
        Price,
        Round,
        UserBet,
    },
};
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use futures::future::try_join_all;
use std::cmp::Ordering;
use tracing::warn;

/// Outcome of a bet once its round's prices are known. Equal prices have no
/// winner and stay pending.
pub fn bet_result(position: Position, lock_price: Price, close_price: Price) -> BetResult {
    match (close_price.cmp(&lock_price), position) {
        (Ordering::Equal, _) => BetResult::Pending,
        (Ordering::Greater, Position::Bull) | (Ordering::Less, Position::Bear) => {
            BetResult::Win
        }
        (Ordering::Greater, Position::Bear) | (Ordering::Less, Position::Bull) => {
            BetResult::Lose
        }
    }
}

/// Settled result of a bet, `Pending` until the oracle has been called for
/// the round.
pub fn classify_bet(position: Position, round: Option<&Round>) -> BetResult {
    match round {
        Some(round) if round.oracle_called => {
            bet_result(position, round.lock_price, round.close_price)
        }
        _ => BetResult::Pending,
    }
}

/// Every recorded bet of `user`, each classified against its round.
pub async fn fetch_user_bets<S: PredictionSource>(
    source: &S,
    user: Address,
) -> Result<Vec<UserBet>> {
    let length = source
        .user_rounds_length(user)
        .await
        .wrap_err("getUserRoundsLength failed")?;
    if length == 0 {
        return Ok(Vec::new());
    }
    let entries = source
        .user_rounds(user, 0, length)
        .await
        .wrap_err("getUserRounds failed")?;
    let lookups: Vec<_> = entries
        .into_iter()
        .map(|(epoch, info)| classify_entry(source, epoch, info))
        .collect();
    try_join_all(lookups).await
}

async fn classify_entry<S: PredictionSource>(
    source: &S,
    epoch: Epoch,
    info: BetInfo,
) -> Result<UserBet> {
    let round = source
        .round(epoch)
        .await
        .wrap_err_with(|| format!("fetching round {epoch} for bet history failed"))?;
    Ok(UserBet {
        epoch,
        position: info.position,
        amount: info.amount,
        claimed: info.claimed,
        result: classify_bet(info.position, round.as_ref()),
    })
}

/// Last known bet history of the connected account.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BetHistory {
    bets: Vec<UserBet>,
    loading: bool,
}

impl BetHistory {
    pub fn bets(&self) -> &[UserBet] {
        &self.bets
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn begin(&mut self) {
        self.loading = true;
    }

    /// Applies a finished fetch. A failed fetch keeps the previous list and
    /// hands the error back.
    pub fn finish(&mut self, outcome: Result<Vec<UserBet>>) -> Result<()> {
        self.loading = false;
        match outcome {
            Ok(bets) => {
                self.bets = bets;
                Ok(())
            }
            Err(err) => {
                warn!(?err, "failed to fetch user rounds");
                Err(err)
            }
        }
    }

    pub fn clear(&mut self) {
        self.bets.clear();
        self.loading = false;
    }
}

/// Refreshes `history` for `user`; without a connected account it settles on
/// an empty list. On error the list is left untouched.
pub async fn refresh_bet_history<S: PredictionSource>(
    source: &S,
    user: Option<Address>,
    history: &mut BetHistory,
) -> Result<()> {
    let Some(user) = user else {
        history.clear();
        return Ok(());
    };
    history.begin();
    let outcome = fetch_user_bets(source, user).await;
    history.finish(outcome)
}
