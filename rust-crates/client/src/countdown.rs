use crate::types::UnixSeconds;
use serde::Serialize;

pub const ROUND_ENDED: &str = "Round Ended";
const NO_TIME_LEFT: &str = "0s";

/// Label used once the target has passed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpiredLabel {
    #[default]
    RoundEnded,
    Compact,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub time_left: String,
    pub is_expired: bool,
}

impl Countdown {
    fn expired(label: &str) -> Self {
        Self {
            time_left: label.to_string(),
            is_expired: true,
        }
    }
}

pub fn time_left(target: Option<UnixSeconds>, now: UnixSeconds) -> Countdown {
    time_left_with(target, now, ExpiredLabel::RoundEnded)
}

pub fn time_left_with(
    target: Option<UnixSeconds>,
    now: UnixSeconds,
    label: ExpiredLabel,
) -> Countdown {
    let Some(target) = target else {
        return Countdown::expired(NO_TIME_LEFT);
    };
    if target <= now {
        return match label {
            ExpiredLabel::RoundEnded => Countdown::expired(ROUND_ENDED),
            ExpiredLabel::Compact => Countdown::expired(NO_TIME_LEFT),
        };
    }
    let diff = target - now;
    let minutes = diff / 60;
    let seconds = diff % 60;
    let time_left = if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    };
    Countdown {
        time_left,
        is_expired: false,
    }
}

/// Countdown that remembers its last state so expiry is reported once per
/// transition.
#[derive(Clone, Debug)]
pub struct CountdownTimer {
    target: Option<UnixSeconds>,
    label: ExpiredLabel,
    current: Countdown,
}

impl CountdownTimer {
    pub fn new(target: Option<UnixSeconds>, now: UnixSeconds) -> Self {
        Self::with_label(target, now, ExpiredLabel::default())
    }

    pub fn with_label(
        target: Option<UnixSeconds>,
        now: UnixSeconds,
        label: ExpiredLabel,
    ) -> Self {
        Self {
            target,
            label,
            current: time_left_with(target, now, label),
        }
    }

    pub fn target(&self) -> Option<UnixSeconds> {
        self.target
    }

    pub fn current(&self) -> &Countdown {
        &self.current
    }

    /// Re-arms the timer; the new initial state never counts as a transition.
    pub fn rearm(&mut self, target: Option<UnixSeconds>, now: UnixSeconds) {
        self.target = target;
        self.current = time_left_with(target, now, self.label);
    }

    /// Recomputes the countdown and calls `on_expire` if it just expired.
    pub fn tick(&mut self, now: UnixSeconds, on_expire: impl FnOnce()) -> &Countdown {
        let next = time_left_with(self.target, now, self.label);
        let just_expired = self.target.is_some() && !self.current.is_expired && next.is_expired;
        self.current = next;
        if just_expired {
            on_expire();
        }
        &self.current
    }
}
