use crate::{
    source::PredictionSource,
    types::{
        Epoch,
        GameState,
        Price,
        Round,
        RoundWindow,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use futures::future::join_all;
use tracing::warn;

const ROUNDS_BEHIND: u64 = 2;
const ROUNDS_AHEAD: u64 = 1;

/// Game state plus the round window read in the same refresh cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameSnapshot {
    pub state: GameState,
    pub rounds: RoundWindow,
}

/// Epochs `current - 2 ..= current + 1`, without anything below 1.
pub fn window_epochs(current: Epoch) -> Vec<Epoch> {
    let first = current.saturating_sub(ROUNDS_BEHIND).max(1);
    let last = current.saturating_add(ROUNDS_AHEAD);
    (first..=last).collect()
}

/// Fetches every round of the window concurrently. A failed round is logged
/// and stored as `None`; it never fails the batch.
pub async fn fetch_round_window<S: PredictionSource>(
    source: &S,
    current: Epoch,
) -> RoundWindow {
    let epochs = window_epochs(current);
    let requests: Vec<_> = epochs.iter().map(|epoch| fetch_round(source, *epoch)).collect();
    let fetched = join_all(requests).await;
    epochs.into_iter().zip(fetched).collect()
}

async fn fetch_round<S: PredictionSource>(source: &S, epoch: Epoch) -> Option<Round> {
    match source.round(epoch).await {
        Ok(round) => round,
        Err(err) => {
            warn!(epoch, ?err, "no data for round");
            None
        }
    }
}

async fn fetch_price<S: PredictionSource>(source: &S) -> Result<Price> {
    let oracle = source.oracle().await.wrap_err("oracle address lookup failed")?;
    source
        .latest_price(oracle)
        .await
        .wrap_err_with(|| format!("latestRoundData on oracle {oracle} failed"))
}

/// Full game-state refresh. Only the epoch/min-bet/paused batch can fail it;
/// an oracle failure keeps `last_price`.
pub async fn fetch_game_snapshot<S: PredictionSource>(
    source: &S,
    last_price: Option<Price>,
) -> Result<GameSnapshot> {
    let (current_epoch, min_bet_amount, paused) = futures::try_join!(
        source.current_epoch(),
        source.min_bet_amount(),
        source.paused()
    )
    .wrap_err("fetching game state failed")?;

    let rounds = async {
        if current_epoch == 0 {
            RoundWindow::new()
        } else {
            fetch_round_window(source, current_epoch).await
        }
    };
    let (price, rounds) = futures::join!(fetch_price(source), rounds);
    let current_price = match price {
        Ok(price) => Some(price),
        Err(err) => {
            warn!(?err, "failed to fetch oracle price");
            last_price
        }
    };

    Ok(GameSnapshot {
        state: GameState {
            current_epoch: Some(current_epoch),
            min_bet_amount: Some(min_bet_amount),
            paused,
            current_price,
        },
        rounds,
    })
}
