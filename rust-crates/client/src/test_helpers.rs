use crate::{
    source::{
        BetSubmitter,
        PredictionSource,
    },
    types::{
        BetInfo,
        Epoch,
        Position,
        Price,
        Round,
        UnixSeconds,
        Wei,
    },
};
use alloy::primitives::{
    Address,
    TxHash,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

pub const FAKE_ORACLE: Address = Address::repeat_byte(0x0a);

/// Round locking at `lock`, five minutes long on each side.
pub fn sample_round(epoch: Epoch, lock: UnixSeconds) -> Round {
    Round {
        epoch,
        start_timestamp: lock.saturating_sub(300),
        lock_timestamp: lock,
        close_timestamp: lock + 300,
        lock_price: Price(0),
        close_price: Price(0),
        total_amount: Wei(3_000),
        bull_amount: Wei(2_000),
        bear_amount: Wei(1_000),
        oracle_called: false,
    }
}

#[derive(Debug, Default)]
struct FakeState {
    epoch: Epoch,
    min_bet: Wei,
    paused: bool,
    price: Price,
    rounds: HashMap<Epoch, Round>,
    failing_rounds: HashSet<Epoch>,
    user_bets: HashMap<Address, Vec<(Epoch, BetInfo)>>,
    unreachable: bool,
    oracle_failing: bool,
    user_rounds_failing: bool,
    rejecting_bets: bool,
    bettor: Option<Address>,
    requested_rounds: Vec<Epoch>,
    state_reads: usize,
    user_round_reads: usize,
    placed_bets: Vec<(Position, Epoch, Wei)>,
}

/// In-memory contract shared between a test and the code under test.
#[derive(Clone, Debug, Default)]
pub struct FakePredictionSource {
    state: Arc<Mutex<FakeState>>,
}

impl FakePredictionSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_epoch(self, epoch: Epoch) -> Self {
        self.set_epoch(epoch);
        self
    }

    pub fn with_min_bet(self, min_bet: Wei) -> Self {
        self.lock().min_bet = min_bet;
        self
    }

    pub fn with_paused(self, paused: bool) -> Self {
        self.lock().paused = paused;
        self
    }

    pub fn with_price(self, price: Price) -> Self {
        self.lock().price = price;
        self
    }

    pub fn with_round(self, round: Round) -> Self {
        self.lock().rounds.insert(round.epoch, round);
        self
    }

    pub fn with_user_bet(self, user: Address, epoch: Epoch, info: BetInfo) -> Self {
        self.lock()
            .user_bets
            .entry(user)
            .or_default()
            .push((epoch, info));
        self
    }

    pub fn with_bettor(self, bettor: Address) -> Self {
        self.lock().bettor = Some(bettor);
        self
    }

    pub fn failing_round(self, epoch: Epoch) -> Self {
        self.lock().failing_rounds.insert(epoch);
        self
    }

    pub fn failing_oracle(self) -> Self {
        self.lock().oracle_failing = true;
        self
    }

    pub fn unreachable(self) -> Self {
        self.set_unreachable(true);
        self
    }

    pub fn rejecting_bets(self) -> Self {
        self.lock().rejecting_bets = true;
        self
    }

    pub fn set_epoch(&self, epoch: Epoch) {
        self.lock().epoch = epoch;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn set_user_rounds_failing(&self, failing: bool) {
        self.lock().user_rounds_failing = failing;
    }

    pub fn requested_rounds(&self) -> Vec<Epoch> {
        self.lock().requested_rounds.clone()
    }

    /// Number of `currentEpoch` reads, one per game-state refresh.
    pub fn state_reads(&self) -> usize {
        self.lock().state_reads
    }

    /// Number of `getUserRoundsLength` reads, one per bet-history refresh.
    pub fn user_round_reads(&self) -> usize {
        self.lock().user_round_reads
    }

    pub fn placed_bets(&self) -> Vec<(Position, Epoch, Wei)> {
        self.lock().placed_bets.clone()
    }

    fn reachable(state: &FakeState) -> Result<()> {
        if state.unreachable {
            Err(eyre!("connection refused"))
        } else {
            Ok(())
        }
    }
}

impl PredictionSource for FakePredictionSource {
    async fn current_epoch(&self) -> Result<Epoch> {
        let mut state = self.lock();
        state.state_reads += 1;
        Self::reachable(&state)?;
        Ok(state.epoch)
    }

    async fn min_bet_amount(&self) -> Result<Wei> {
        let state = self.lock();
        Self::reachable(&state)?;
        Ok(state.min_bet)
    }

    async fn paused(&self) -> Result<bool> {
        let state = self.lock();
        Self::reachable(&state)?;
        Ok(state.paused)
    }

    async fn oracle(&self) -> Result<Address> {
        let state = self.lock();
        Self::reachable(&state)?;
        Ok(FAKE_ORACLE)
    }

    async fn latest_price(&self, oracle: Address) -> Result<Price> {
        let state = self.lock();
        Self::reachable(&state)?;
        if state.oracle_failing || oracle != FAKE_ORACLE {
            return Err(eyre!("oracle call reverted"));
        }
        Ok(state.price)
    }

    async fn round(&self, epoch: Epoch) -> Result<Option<Round>> {
        let mut state = self.lock();
        state.requested_rounds.push(epoch);
        Self::reachable(&state)?;
        if state.failing_rounds.contains(&epoch) {
            return Err(eyre!("rounds({epoch}) reverted"));
        }
        Ok(state.rounds.get(&epoch).cloned())
    }

    async fn user_rounds_length(&self, user: Address) -> Result<u64> {
        let mut state = self.lock();
        state.user_round_reads += 1;
        Self::reachable(&state)?;
        if state.user_rounds_failing {
            return Err(eyre!("getUserRoundsLength reverted"));
        }
        let length = state.user_bets.get(&user).map(Vec::len).unwrap_or_default();
        Ok(length as u64)
    }

    async fn user_rounds(
        &self,
        user: Address,
        cursor: u64,
        size: u64,
    ) -> Result<Vec<(Epoch, BetInfo)>> {
        let state = self.lock();
        Self::reachable(&state)?;
        if state.user_rounds_failing {
            return Err(eyre!("getUserRounds reverted"));
        }
        let bets = state.user_bets.get(&user).cloned().unwrap_or_default();
        Ok(bets
            .into_iter()
            .skip(cursor as usize)
            .take(size as usize)
            .collect())
    }
}

impl BetSubmitter for FakePredictionSource {
    fn bettor(&self) -> Option<Address> {
        self.lock().bettor
    }

    async fn place_bet(
        &self,
        position: Position,
        epoch: Epoch,
        amount: Wei,
    ) -> Result<TxHash> {
        let mut state = self.lock();
        Self::reachable(&state)?;
        if state.rejecting_bets {
            return Err(eyre!("user rejected transaction"));
        }
        state.placed_bets.push((position, epoch, amount));
        if let Some(bettor) = state.bettor {
            state.user_bets.entry(bettor).or_default().push((
                epoch,
                BetInfo {
                    position,
                    amount,
                    claimed: false,
                },
            ));
        }
        Ok(TxHash::repeat_byte(state.placed_bets.len() as u8))
    }
}
