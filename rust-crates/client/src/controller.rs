use crate::{
    clock::Clock,
    countdown::CountdownTimer,
    events::AppEvent,
    poller::{
        POLL_INTERVAL,
        Poller,
        PollerCommand,
        PredictionSnapshot,
    },
    source::{
        BetSubmitter,
        PredictionSource,
    },
    types::{
        Epoch,
        GameState,
        Position,
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
    WrapErr,
    eyre,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    error,
    info,
    warn,
};

pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

enum ControllerState {
    Idle,
    Active {
        account: Option<Address>,
        poller: Poller,
        countdown: JoinHandle<()>,
    },
}

/// Application root: owns the injected chain client, the poller and the
/// countdown task, and submits bets.
pub struct AppController<S> {
    source: Arc<S>,
    events: mpsc::UnboundedSender<AppEvent>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    state: ControllerState,
}

impl<S> AppController<S>
where
    S: PredictionSource + BetSubmitter + 'static,
{
    pub fn new(
        source: Arc<S>,
        events: mpsc::UnboundedSender<AppEvent>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            events,
            clock,
            poll_interval: POLL_INTERVAL,
            state: ControllerState::Idle,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.state, ControllerState::Active { .. })
    }

    pub fn account(&self) -> Option<Address> {
        match &self.state {
            ControllerState::Active { account, .. } => *account,
            ControllerState::Idle => None,
        }
    }

    /// Probes the contract and starts polling. On failure nothing is started
    /// and a `connection_failed` event is emitted.
    pub async fn connect(&mut self, account: Option<Address>) -> Result<()> {
        if self.is_polling() {
            self.shutdown().await?;
        }
        if let Err(err) = self.source.paused().await {
            error!(?err, "failed to connect to the prediction contract");
            self.emit(AppEvent::ConnectionFailed {
                reason: format!("{err:#}"),
            });
            return Err(err.wrap_err("prediction contract unreachable"));
        }

        info!(?account, "connected to the prediction contract");
        self.emit(AppEvent::Connected {
            account: account.map(|address| address.to_string()),
        });

        let poller = Poller::spawn(
            self.source.clone(),
            account,
            self.poll_interval,
            self.events.clone(),
            self.clock.clone(),
        );
        let countdown = tokio::spawn(countdown_worker(
            poller.subscribe(),
            poller.commands(),
            self.events.clone(),
            self.clock.clone(),
        ));
        self.state = ControllerState::Active {
            account,
            poller,
            countdown,
        };
        Ok(())
    }

    pub fn snapshot(&self) -> PredictionSnapshot {
        match &self.state {
            ControllerState::Active { poller, .. } => poller.snapshot(),
            ControllerState::Idle => PredictionSnapshot::default(),
        }
    }

    pub fn game_state(&self) -> GameState {
        self.snapshot().game.state
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<PredictionSnapshot>> {
        match &self.state {
            ControllerState::Active { poller, .. } => Some(poller.subscribe()),
            ControllerState::Idle => None,
        }
    }

    pub fn refresh_now(&self) {
        if let ControllerState::Active { poller, .. } = &self.state {
            poller.refresh_now();
        }
    }

    /// Places a bet on the current epoch. Success and failure are both
    /// reported as events; errors are also returned.
    pub async fn place_bet(&self, position: Position, amount: Wei) -> Result<TxHash> {
        match self.submit_bet(position, amount).await {
            Ok((epoch, tx_hash)) => {
                info!(%position, epoch, %amount, %tx_hash, "bet placed");
                self.emit(AppEvent::BetPlaced {
                    epoch,
                    position,
                    amount,
                    tx_hash: tx_hash.to_string(),
                });
                self.refresh_now();
                Ok(tx_hash)
            }
            Err(err) => {
                error!(?err, %position, %amount, "failed to place bet");
                self.emit(AppEvent::BetFailed {
                    position,
                    amount,
                    reason: format!("{err:#}"),
                });
                Err(err)
            }
        }
    }

    async fn submit_bet(&self, position: Position, amount: Wei) -> Result<(Epoch, TxHash)> {
        if self.source.bettor().is_none() {
            return Err(eyre!("Wallet not connected"));
        }
        if amount == Wei::ZERO {
            return Err(eyre!("Bet amount must be greater than zero"));
        }
        let state = self.game_state();
        if state.paused {
            return Err(eyre!("Betting is paused"));
        }
        if let Some(min_bet) = state.min_bet_amount {
            if amount < min_bet {
                return Err(eyre!("Bet amount {amount} is below the minimum bet {min_bet}"));
            }
        }

        let epoch = self
            .source
            .current_epoch()
            .await
            .wrap_err("reading the current epoch failed")?;
        let tx_hash = self
            .source
            .place_bet(position, epoch, amount)
            .await
            .wrap_err_with(|| format!("bet{position} on epoch {epoch} failed"))?;
        Ok((epoch, tx_hash))
    }

    /// Stops polling and the countdown, returning to idle.
    pub async fn shutdown(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, ControllerState::Idle);
        if let ControllerState::Active {
            poller, countdown, ..
        } = state
        {
            poller.stop().await?;
            countdown.await.wrap_err("countdown task panicked")?;
            info!("controller stopped");
        }
        Ok(())
    }

    fn emit(&self, event: AppEvent) {
        let _ = self.events.send(event);
    }
}

fn lock_target(snapshot: &PredictionSnapshot) -> (Option<Epoch>, Option<UnixSeconds>) {
    let epoch = snapshot.game.state.current_epoch;
    let target = epoch
        .and_then(|epoch| snapshot.game.rounds.get(&epoch))
        .and_then(Option::as_ref)
        .map(|round| round.lock_timestamp);
    (epoch, target)
}

/// Counts down to the current round's lock and asks the poller for a fresh
/// cycle when it expires. Exits once the poller is gone.
async fn countdown_worker(
    mut snapshots: watch::Receiver<PredictionSnapshot>,
    commands: mpsc::UnboundedSender<PollerCommand>,
    events: mpsc::UnboundedSender<AppEvent>,
    clock: Arc<dyn Clock>,
) {
    let (mut epoch, target) = lock_target(&snapshots.borrow_and_update());
    let mut timer = CountdownTimer::new(target, clock.now());
    let mut ticker = time::interval(COUNTDOWN_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let (next_epoch, target) = lock_target(&snapshots.borrow_and_update());
                if next_epoch != epoch || target != timer.target() {
                    epoch = next_epoch;
                    timer.rearm(target, clock.now());
                }
            }
            _ = ticker.tick() => {
                let countdown = timer
                    .tick(clock.now(), || {
                        info!(?epoch, "round locked; requesting refresh");
                        if commands.send(PollerCommand::RefreshNow).is_err() {
                            warn!("poller gone before countdown refresh");
                        }
                    })
                    .clone();
                let _ = events.send(AppEvent::Countdown {
                    epoch,
                    time_left: countdown.time_left,
                    is_expired: countdown.is_expired,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        FakePredictionSource,
        sample_round,
    };
    use std::sync::atomic::{
        AtomicU64,
        Ordering,
    };

    fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn controller(
        source: &FakePredictionSource,
        clock: Arc<dyn Clock>,
    ) -> (
        AppController<FakePredictionSource>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let (events, rx) = mpsc::unbounded_channel();
        (AppController::new(Arc::new(source.clone()), events, clock), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn connect__unreachable_node_stays_idle() {
        // given
        let source = FakePredictionSource::new().unreachable();
        let (mut controller, mut rx) = controller(&source, Arc::new(|| 1_000u64));

        // when
        let result = controller.connect(None).await;
        time::sleep(Duration::from_secs(30)).await;

        // then
        assert!(result.is_err());
        assert!(!controller.is_polling());
        assert_eq!(source.state_reads(), 0);
        assert_eq!(controller.game_state(), GameState::default());
        let events = drain(&mut rx);
        assert!(matches!(events.as_slice(), [AppEvent::ConnectionFailed { .. }]));
    }

    #[tokio::test(start_paused = true)]
    async fn connect__starts_polling_and_countdown() {
        // given
        let source = FakePredictionSource::new()
            .with_epoch(5)
            .with_round(sample_round(5, 1_090));
        let (mut controller, mut rx) = controller(&source, Arc::new(|| 1_000u64));

        // when
        controller.connect(None).await.unwrap();
        time::sleep(Duration::from_millis(1_500)).await;

        // then
        assert!(controller.is_polling());
        assert_eq!(controller.game_state().current_epoch, Some(5));
        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(AppEvent::Connected { account: None })));
        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::Countdown { epoch: Some(5), time_left, is_expired: false } if time_left == "1m 30s"
        )));
        controller.shutdown().await.unwrap();
        assert!(!controller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown__expiry_requests_one_extra_refresh() {
        // given
        let now = Arc::new(AtomicU64::new(1_000));
        let clock_now = now.clone();
        let clock: Arc<dyn Clock> = Arc::new(move || clock_now.load(Ordering::SeqCst));
        let source = FakePredictionSource::new()
            .with_epoch(5)
            .with_round(sample_round(5, 1_003));
        let (mut controller, _rx) = controller(&source, clock);
        controller.connect(None).await.unwrap();
        time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(source.state_reads(), 1);

        // when
        now.store(1_004, Ordering::SeqCst);
        time::sleep(Duration::from_secs(3)).await;

        // then
        assert_eq!(source.state_reads(), 2);
        controller.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn place_bet__without_wallet_is_rejected() {
        // given
        let source = FakePredictionSource::new().with_epoch(5);
        let (mut controller, mut rx) = controller(&source, Arc::new(|| 1_000u64));
        controller.connect(None).await.unwrap();
        drain(&mut rx);

        // when
        let result = controller.place_bet(Position::Bull, Wei(10)).await;

        // then
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Wallet not connected");
        assert!(source.placed_bets().is_empty());
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, AppEvent::BetFailed { .. })));
        controller.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn place_bet__uses_the_current_epoch_and_refreshes() {
        // given
        let bettor = Address::repeat_byte(9);
        let source = FakePredictionSource::new()
            .with_epoch(5)
            .with_min_bet(Wei(10))
            .with_bettor(bettor);
        let (mut controller, mut rx) = controller(&source, Arc::new(|| 1_000u64));
        controller.connect(Some(bettor)).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        source.set_epoch(6);

        // when
        let tx_hash = controller.place_bet(Position::Bear, Wei(25)).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;

        // then
        assert_eq!(tx_hash, TxHash::repeat_byte(1));
        assert_eq!(source.placed_bets(), vec![(Position::Bear, 6, Wei(25))]);
        assert_eq!(source.user_round_reads(), 2);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, AppEvent::BetPlaced { epoch: 6, .. })));
        controller.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn place_bet__below_minimum_never_sends() {
        // given
        let bettor = Address::repeat_byte(9);
        let source = FakePredictionSource::new()
            .with_epoch(5)
            .with_min_bet(Wei(100))
            .with_bettor(bettor);
        let (mut controller, _rx) = controller(&source, Arc::new(|| 1_000u64));
        controller.connect(Some(bettor)).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;

        // when
        let result = controller.place_bet(Position::Bull, Wei(99)).await;

        // then
        assert!(result.is_err());
        assert!(source.placed_bets().is_empty());
        controller.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn place_bet__rejected_transaction_leaves_state_untouched() {
        // given
        let bettor = Address::repeat_byte(9);
        let source = FakePredictionSource::new()
            .with_epoch(5)
            .with_bettor(bettor)
            .rejecting_bets();
        let (mut controller, mut rx) = controller(&source, Arc::new(|| 1_000u64));
        controller.connect(Some(bettor)).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        let before = controller.snapshot();
        drain(&mut rx);

        // when
        let result = controller.place_bet(Position::Bull, Wei(10)).await;
        time::sleep(Duration::from_millis(10)).await;

        // then
        assert!(result.is_err());
        assert_eq!(controller.snapshot(), before);
        let events = drain(&mut rx);
        assert!(matches!(events.as_slice(), [AppEvent::BetFailed { position: Position::Bull, .. }]));
        controller.shutdown().await.unwrap();
    }
}
