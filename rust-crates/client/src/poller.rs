use crate::{
    bets::{
        BetHistory,
        refresh_bet_history,
    },
    clock::Clock,
    events::AppEvent,
    round_status::round_views,
    rounds::{
        GameSnapshot,
        fetch_game_snapshot,
    },
    source::PredictionSource,
};
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
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
    info,
    warn,
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// State republished after every refresh cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredictionSnapshot {
    pub game: GameSnapshot,
    pub bets: BetHistory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerCommand {
    RefreshNow,
    Shutdown,
}

/// Handle to a running poll worker.
pub struct Poller {
    commands: mpsc::UnboundedSender<PollerCommand>,
    snapshots: watch::Receiver<PredictionSnapshot>,
    handle: JoinHandle<()>,
}

impl Poller {
    pub fn spawn<S>(
        source: Arc<S>,
        account: Option<Address>,
        interval: Duration,
        events: mpsc::UnboundedSender<AppEvent>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: PredictionSource + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(PredictionSnapshot::default());
        let worker = PollWorker {
            source,
            account,
            events,
            clock,
            snapshots: snapshot_tx,
            current: PredictionSnapshot::default(),
        };
        let handle = tokio::spawn(worker.run(interval, command_rx));
        Self {
            commands,
            snapshots,
            handle,
        }
    }

    pub fn commands(&self) -> mpsc::UnboundedSender<PollerCommand> {
        self.commands.clone()
    }

    pub fn refresh_now(&self) {
        if self.commands.send(PollerCommand::RefreshNow).is_err() {
            warn!("poller already stopped; refresh request dropped");
        }
    }

    pub fn snapshot(&self) -> PredictionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PredictionSnapshot> {
        self.snapshots.clone()
    }

    /// Stops the ticker and waits for the cycle in flight, if any, to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.commands.send(PollerCommand::Shutdown);
        self.handle.await.wrap_err("poll worker panicked")
    }
}

struct PollWorker<S> {
    source: Arc<S>,
    account: Option<Address>,
    events: mpsc::UnboundedSender<AppEvent>,
    clock: Arc<dyn Clock>,
    snapshots: watch::Sender<PredictionSnapshot>,
    current: PredictionSnapshot,
}

impl<S: PredictionSource> PollWorker<S> {
    async fn run(
        mut self,
        interval: Duration,
        mut commands: mpsc::UnboundedReceiver<PollerCommand>,
    ) {
        info!(?interval, account = ?self.account, "poller started");
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_cycle().await,
                cmd = commands.recv() => match cmd {
                    Some(PollerCommand::RefreshNow) => self.refresh_cycle().await,
                    Some(PollerCommand::Shutdown) | None => break,
                },
            }
        }
        info!("poller stopped");
    }

    /// Game state and bet history refresh concurrently; neither failure
    /// affects the other.
    async fn refresh_cycle(&mut self) {
        if self.account.is_some() {
            self.emit(AppEvent::BetHistoryLoading { loading: true });
        }
        let source = &*self.source;
        let last_price = self.current.game.state.current_price;

        let (game, bets) = tokio::join!(
            fetch_game_snapshot(source, last_price),
            refresh_bet_history(source, self.account, &mut self.current.bets),
        );

        match game {
            Ok(game) => {
                let now = self.clock.now();
                let epoch = game.state.current_epoch.unwrap_or_default();
                self.emit(AppEvent::game_state(&game.state));
                self.emit(AppEvent::RoundsUpdated {
                    rounds: round_views(&game.rounds, epoch, now),
                });
                self.current.game = game;
            }
            Err(err) => {
                warn!(?err, "error fetching game state");
                self.emit(AppEvent::RefreshFailed {
                    what: "game_state",
                    reason: format!("{err:#}"),
                });
            }
        }

        if self.account.is_some() {
            self.emit(AppEvent::BetHistoryLoading { loading: false });
        }
        match bets {
            Ok(()) => self.emit(AppEvent::BetHistoryUpdated {
                bets: self.current.bets.bets().to_vec(),
            }),
            Err(err) => self.emit(AppEvent::RefreshFailed {
                what: "bet_history",
                reason: format!("{err:#}"),
            }),
        }

        self.snapshots.send_replace(self.current.clone());
    }

    fn emit(&self, event: AppEvent) {
        // A closed receiver only means nobody is listening any more.
        let _ = self.events.send(event);
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

    fn fixed_clock(now: u64) -> Arc<dyn Clock> {
        Arc::new(move || now)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn spawn__first_cycle_runs_immediately() {
        // given
        let source = FakePredictionSource::new()
            .with_epoch(10)
            .with_round(sample_round(10, 1_300));
        let (events, mut rx) = mpsc::unbounded_channel();

        // when
        let poller = Poller::spawn(
            Arc::new(source.clone()),
            None,
            POLL_INTERVAL,
            events,
            fixed_clock(1_000),
        );
        time::sleep(Duration::from_millis(10)).await;

        // then
        assert_eq!(source.state_reads(), 1);
        assert_eq!(poller.snapshot().game.state.current_epoch, Some(10));
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, AppEvent::RoundsUpdated { rounds } if rounds.len() == 4)));
        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spawn__refreshes_on_the_interval() {
        // given
        let source = FakePredictionSource::new().with_epoch(10);
        let (events, _rx) = mpsc::unbounded_channel();
        let poller = Poller::spawn(
            Arc::new(source.clone()),
            None,
            POLL_INTERVAL,
            events,
            fixed_clock(1_000),
        );

        // when
        time::sleep(Duration::from_secs(31)).await;

        // then
        assert_eq!(source.state_reads(), 3);
        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spawn__failures_do_not_stop_future_ticks() {
        // given
        let source = FakePredictionSource::new().with_epoch(10).unreachable();
        let (events, mut rx) = mpsc::unbounded_channel();
        let poller = Poller::spawn(
            Arc::new(source.clone()),
            None,
            POLL_INTERVAL,
            events,
            fixed_clock(1_000),
        );
        time::sleep(Duration::from_secs(16)).await;
        assert_eq!(poller.snapshot().game.state.current_epoch, None);

        // when
        source.set_unreachable(false);
        time::sleep(Duration::from_secs(15)).await;

        // then
        assert_eq!(source.state_reads(), 3);
        assert_eq!(poller.snapshot().game.state.current_epoch, Some(10));
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, AppEvent::RefreshFailed { what: "game_state", .. })));
        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_cycle__bet_failure_does_not_block_game_state() {
        // given
        let user = Address::repeat_byte(3);
        let source = FakePredictionSource::new().with_epoch(4);
        source.set_user_rounds_failing(true);
        let (events, mut rx) = mpsc::unbounded_channel();

        // when
        let poller = Poller::spawn(
            Arc::new(source.clone()),
            Some(user),
            POLL_INTERVAL,
            events,
            fixed_clock(1_000),
        );
        time::sleep(Duration::from_millis(10)).await;

        // then
        let snapshot = poller.snapshot();
        assert_eq!(snapshot.game.state.current_epoch, Some(4));
        assert!(!snapshot.bets.is_loading());
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::RefreshFailed { what: "bet_history", reason }
                if reason.contains("getUserRoundsLength reverted")
        )));
        assert!(events.iter().any(|e| matches!(e, AppEvent::GameStateUpdated { epoch: Some(4), .. })));
        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_now__runs_an_extra_cycle() {
        // given
        let source = FakePredictionSource::new().with_epoch(10);
        let (events, _rx) = mpsc::unbounded_channel();
        let poller = Poller::spawn(
            Arc::new(source.clone()),
            None,
            POLL_INTERVAL,
            events,
            fixed_clock(1_000),
        );
        time::sleep(Duration::from_millis(10)).await;

        // when
        poller.refresh_now();
        time::sleep(Duration::from_millis(10)).await;

        // then
        assert_eq!(source.state_reads(), 2);
        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop__ends_polling() {
        // given
        let source = FakePredictionSource::new().with_epoch(10);
        let (events, _rx) = mpsc::unbounded_channel();
        let poller = Poller::spawn(
            Arc::new(source.clone()),
            None,
            POLL_INTERVAL,
            events,
            fixed_clock(1_000),
        );
        time::sleep(Duration::from_millis(10)).await;

        // when
        poller.stop().await.unwrap();
        time::sleep(Duration::from_secs(60)).await;

        // then
        assert_eq!(source.state_reads(), 1);
    }
}
