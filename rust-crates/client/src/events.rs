use crate::{
    round_status::RoundView,
    types::{
        Epoch,
        GameState,
        Position,
        UserBet,
        Wei,
    },
};
use serde::Serialize;

/// Everything the presentation layer is told about.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    Connected {
        account: Option<String>,
    },
    ConnectionFailed {
        reason: String,
    },
    GameStateUpdated {
        epoch: Option<Epoch>,
        price: String,
        min_bet: String,
        paused: bool,
    },
    RoundsUpdated {
        rounds: Vec<RoundView>,
    },
    BetHistoryLoading {
        loading: bool,
    },
    BetHistoryUpdated {
        bets: Vec<UserBet>,
    },
    Countdown {
        epoch: Option<Epoch>,
        time_left: String,
        is_expired: bool,
    },
    BetPlaced {
        epoch: Epoch,
        position: Position,
        amount: Wei,
        tx_hash: String,
    },
    BetFailed {
        position: Position,
        amount: Wei,
        reason: String,
    },
    RefreshFailed {
        what: &'static str,
        reason: String,
    },
}

impl AppEvent {
    pub fn game_state(state: &GameState) -> Self {
        AppEvent::GameStateUpdated {
            epoch: state.current_epoch,
            price: state.price_label(),
            min_bet: state.min_bet_label(),
            paused: state.paused,
        }
    }
}
