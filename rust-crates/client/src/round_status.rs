use crate::types::{
    Epoch,
    Position,
    Round,
    RoundStatus,
    RoundWindow,
    UnixSeconds,
};
use serde::Serialize;

/// Lifecycle stage of `round_epoch` at `now`. Boundary instants resolve to the
/// later stage.
pub fn classify(
    round: Option<&Round>,
    current_epoch: Epoch,
    round_epoch: Epoch,
    now: UnixSeconds,
) -> RoundStatus {
    let Some(round) = round else {
        return RoundStatus::Future;
    };
    if round_epoch > current_epoch {
        RoundStatus::Future
    } else if now >= round.close_timestamp {
        RoundStatus::Closed
    } else if now >= round.lock_timestamp {
        RoundStatus::Locked
    } else {
        RoundStatus::Open
    }
}

/// One card of the round carousel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoundView {
    pub epoch: Epoch,
    pub status: RoundStatus,
    pub round: Option<Round>,
    pub bull_payout: Option<f64>,
    pub bear_payout: Option<f64>,
}

pub fn round_views(
    window: &RoundWindow,
    current_epoch: Epoch,
    now: UnixSeconds,
) -> Vec<RoundView> {
    window
        .iter()
        .map(|(epoch, round)| RoundView {
            epoch: *epoch,
            status: classify(round.as_ref(), current_epoch, *epoch, now),
            round: round.clone(),
            bull_payout: round
                .as_ref()
                .and_then(|r| r.payout_multiplier(Position::Bull)),
            bear_payout: round
                .as_ref()
                .and_then(|r| r.payout_multiplier(Position::Bear)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::types::{
        Price,
        Wei,
    };
    use proptest::prelude::*;

    fn round(epoch: Epoch, lock: UnixSeconds, close: UnixSeconds) -> Round {
        Round {
            epoch,
            start_timestamp: lock.saturating_sub(300),
            lock_timestamp: lock,
            close_timestamp: close,
            lock_price: Price::default(),
            close_price: Price::default(),
            total_amount: Wei::ZERO,
            bull_amount: Wei::ZERO,
            bear_amount: Wei::ZERO,
            oracle_called: false,
        }
    }

    #[test]
    fn classify__missing_round_is_future() {
        assert_eq!(classify(None, 10, 9, 0), RoundStatus::Future);
    }

    #[test]
    fn classify__walks_through_the_lifecycle() {
        let r = round(10, 1_300, 1_600);

        assert_eq!(classify(Some(&r), 10, 10, 1_000), RoundStatus::Open);
        assert_eq!(classify(Some(&r), 10, 10, 1_450), RoundStatus::Locked);
        assert_eq!(classify(Some(&r), 10, 10, 1_700), RoundStatus::Closed);
    }

    #[test]
    fn classify__boundaries_resolve_to_the_later_stage() {
        let r = round(10, 1_300, 1_600);

        assert_eq!(classify(Some(&r), 10, 10, 1_300), RoundStatus::Locked);
        assert_eq!(classify(Some(&r), 10, 10, 1_600), RoundStatus::Closed);
    }

    #[test]
    fn round_views__orders_cards_by_epoch() {
        // given
        let mut window = RoundWindow::new();
        window.insert(11, None);
        window.insert(9, Some(round(9, 700, 1_000)));
        window.insert(10, Some(round(10, 1_300, 1_600)));

        // when
        let views = round_views(&window, 10, 1_100);

        // then
        let summary: Vec<_> = views.iter().map(|v| (v.epoch, v.status)).collect();
        assert_eq!(
            summary,
            vec![
                (9, RoundStatus::Closed),
                (10, RoundStatus::Open),
                (11, RoundStatus::Future),
            ]
        );
    }

    proptest! {
        #[test]
        fn classify__later_epochs_are_future_regardless_of_time(
            current in 1u64..1_000,
            ahead in 1u64..10,
            lock in 0u64..10_000,
            span in 0u64..10_000,
            now in 0u64..40_000,
        ) {
            let r = round(current + ahead, lock, lock + span);
            prop_assert_eq!(classify(Some(&r), current, current + ahead, now), RoundStatus::Future);
        }

        #[test]
        fn classify__between_lock_and_close_is_locked(
            epoch in 1u64..1_000,
            lock in 0u64..10_000,
            span in 1u64..10_000,
            offset in 0u64..10_000,
        ) {
            let now = lock + offset % span;
            let r = round(epoch, lock, lock + span);
            prop_assert_eq!(classify(Some(&r), epoch, epoch, now), RoundStatus::Locked);
        }
    }
}
