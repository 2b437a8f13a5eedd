use alloy::primitives::utils::{
    ParseUnits,
    Unit,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use prediction_abi::PRICE_DECIMALS;
use serde::{
    Serialize,
    Serializer,
};
use std::{
    collections::BTreeMap,
    fmt,
};

pub type Epoch = u64;
pub type UnixSeconds = u64;

/// Rounds of one refresh keyed by epoch; `None` marks a missing or failed round.
pub type RoundWindow = BTreeMap<Epoch, Option<Round>>;

pub const WEI_DECIMALS: u32 = 18;

/// Native token amount in wei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    /// Parses a decimal ether amount. Signs and digits below one wei are
    /// rejected rather than truncated.
    pub fn parse_ether(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "." {
            return Err(eyre!("empty amount"));
        }
        if raw.starts_with(['-', '+']) {
            return Err(eyre!("invalid amount {raw:?}"));
        }
        if let Some((_, fraction)) = raw.split_once('.') {
            if fraction.len() > WEI_DECIMALS as usize {
                return Err(eyre!(
                    "amount {raw:?} has more than {WEI_DECIMALS} fractional digits"
                ));
            }
        }
        let wei = match ParseUnits::parse_units(raw, Unit::ETHER)
            .map_err(|err| eyre!("invalid amount {raw:?}: {err}"))?
        {
            ParseUnits::U256(wei) => wei,
            ParseUnits::I256(_) => return Err(eyre!("invalid amount {raw:?}")),
        };
        u128::try_from(wei)
            .map(Wei)
            .map_err(|_| eyre!("amount {raw:?} is too large"))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_units(self.0, WEI_DECIMALS))
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Oracle price with [`PRICE_DECIMALS`] decimals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(pub i128);

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = format_units(self.0.unsigned_abs(), PRICE_DECIMALS);
        if self.0 < 0 {
            write!(f, "-{magnitude}")
        } else {
            f.write_str(&magnitude)
        }
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Renders a fixed-point integer as `int.frac`, trimming trailing zeros of the
/// fraction but keeping at least one digit.
pub fn format_units(value: u128, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let integer = value / scale;
    let fraction = value % scale;
    let digits = format!("{:0width$}", fraction, width = decimals as usize);
    let trimmed = digits.trim_end_matches('0');
    let fraction = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{integer}.{fraction}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Position {
    Bull,
    Bear,
}

impl Position {
    pub fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            prediction_abi::POSITION_BULL => Ok(Position::Bull),
            prediction_abi::POSITION_BEAR => Ok(Position::Bear),
            other => Err(eyre!("unknown bet position {other}")),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Bull => f.write_str("Bull"),
            Position::Bear => f.write_str("Bear"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Round {
    pub epoch: Epoch,
    pub start_timestamp: UnixSeconds,
    pub lock_timestamp: UnixSeconds,
    pub close_timestamp: UnixSeconds,
    pub lock_price: Price,
    pub close_price: Price,
    pub total_amount: Wei,
    pub bull_amount: Wei,
    pub bear_amount: Wei,
    pub oracle_called: bool,
}

impl Round {
    /// Gross payout per unit staked on `position`, `None` while that side is empty.
    pub fn payout_multiplier(&self, position: Position) -> Option<f64> {
        let side = match position {
            Position::Bull => self.bull_amount,
            Position::Bear => self.bear_amount,
        };
        if side == Wei::ZERO {
            return None;
        }
        Some(self.total_amount.0 as f64 / side.0 as f64)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Future,
    Open,
    Locked,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BetResult {
    Win,
    Lose,
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetInfo {
    pub position: Position,
    pub amount: Wei,
    pub claimed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserBet {
    pub epoch: Epoch,
    pub position: Position,
    pub amount: Wei,
    pub claimed: bool,
    pub result: BetResult,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameState {
    pub current_epoch: Option<Epoch>,
    pub min_bet_amount: Option<Wei>,
    pub paused: bool,
    pub current_price: Option<Price>,
}

impl GameState {
    pub fn price_label(&self) -> String {
        self.current_price
            .map(|price| price.to_string())
            .unwrap_or_else(|| "0".to_string())
    }

    pub fn min_bet_label(&self) -> String {
        self.min_bet_amount
            .map(|amount| amount.to_string())
            .unwrap_or_else(|| "0".to_string())
    }
}
