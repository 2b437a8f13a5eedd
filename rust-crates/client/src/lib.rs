pub mod bets;
pub mod chain;
pub mod clock;
pub mod config;
pub mod controller;
pub mod countdown;
pub mod events;
pub mod poller;
pub mod round_status;
pub mod rounds;
pub mod source;
pub mod types;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use controller::AppController;
pub use events::AppEvent;
pub use source::{
    BetSubmitter,
    PredictionSource,
};
