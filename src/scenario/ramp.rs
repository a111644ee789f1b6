use std::time::Duration;

/// Milli-pecker units per pecker; ramps compute in integers and round at the edge.
const MILLI: u64 = 1_000;

/// Default phases for a ramp that leaves them unset.
pub const DEFAULT_PECKERS: u64 = 1;
pub const DEFAULT_RAMP_UP: Duration = Duration::from_secs(30);
pub const DEFAULT_LOAD_DURATION: Duration = Duration::from_secs(120);
pub const DEFAULT_RAMP_DOWN: Duration = Duration::from_secs(10);

/// One trapezoidal concurrency segment: delay, linear ramp-up, plateau, linear ramp-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ramp {
    initial_delay: Duration,
    target_milli: u64,
    ramp_up: Duration,
    load_duration: Duration,
    ramp_down: Duration,
}

/// A passive worker's `[start, stop)` window, relative to engine start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Duration,
    pub stop: Duration,
}

impl Default for Ramp {
    fn default() -> Self {
        Self::new(
            Duration::ZERO,
            DEFAULT_PECKERS,
            DEFAULT_RAMP_UP,
            DEFAULT_LOAD_DURATION,
            DEFAULT_RAMP_DOWN,
        )
    }
}

impl Ramp {
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        peckers: u64,
        ramp_up: Duration,
        load_duration: Duration,
        ramp_down: Duration,
    ) -> Self {
        Self {
            initial_delay,
            target_milli: peckers.saturating_mul(MILLI),
            ramp_up,
            load_duration,
            ramp_down,
        }
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.initial_delay
            .saturating_add(self.ramp_up)
            .saturating_add(self.load_duration)
            .saturating_add(self.ramp_down)
    }

    /// Plateau concurrency, rounded to whole peckers.
    #[must_use]
    pub const fn target(&self) -> u64 {
        round_half_even(self.target_milli)
    }

    /// Planned concurrency at `elapsed`, in milli-peckers before rounding.
    #[must_use]
    pub fn planned_milli_at(&self, elapsed: Duration) -> u64 {
        let t = millis(elapsed);
        let delay = millis(self.initial_delay);
        let up = millis(self.ramp_up);
        let load = millis(self.load_duration);
        let down = millis(self.ramp_down);
        let up_end = delay.saturating_add(up);
        let load_end = up_end.saturating_add(load);
        let down_end = load_end.saturating_add(down);

        if t < delay || t >= down_end {
            0
        } else if t < up_end {
            scale(self.target_milli, t.saturating_sub(delay), up)
        } else if t < load_end {
            self.target_milli
        } else {
            let dropped = scale(self.target_milli, t.saturating_sub(load_end), down);
            self.target_milli.saturating_sub(dropped)
        }
    }

    /// Planned concurrency at `elapsed`, rounded half-to-even.
    #[must_use]
    pub fn planned_at(&self, elapsed: Duration) -> u64 {
        round_half_even(self.planned_milli_at(elapsed))
    }

    /// Replaces the plateau concurrency; phase durations are untouched.
    pub(crate) fn set_target(&mut self, peckers: u64) {
        self.target_milli = peckers.saturating_mul(MILLI);
    }

    /// Start/stop windows for passive scheduling, one per planned pecker.
    ///
    /// Pecker `i` of `n` starts once the ramp-up reaches `i + 1` peckers and
    /// stops once the ramp-down drops below it, so the oldest stops first.
    #[must_use]
    pub fn windows(&self) -> Vec<Window> {
        let count = self.target();
        let up_start = self.initial_delay;
        let down_start = self
            .initial_delay
            .saturating_add(self.ramp_up)
            .saturating_add(self.load_duration);
        (1..=count)
            .map(|rank| Window {
                start: up_start.saturating_add(fraction(self.ramp_up, rank, count)),
                stop: down_start.saturating_add(fraction(self.ramp_down, rank, count)),
            })
            .collect()
    }

    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    #[must_use]
    pub const fn ramp_up(&self) -> Duration {
        self.ramp_up
    }

    #[must_use]
    pub const fn load_duration(&self) -> Duration {
        self.load_duration
    }

    #[must_use]
    pub const fn ramp_down(&self) -> Duration {
        self.ramp_down
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `value * part / whole` without overflow; a zero-length phase is a step.
fn scale(value: u64, part: u64, whole: u64) -> u64 {
    if whole == 0 {
        return value;
    }
    let scaled = u128::from(value)
        .saturating_mul(u128::from(part))
        .checked_div(u128::from(whole))
        .unwrap_or(0);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

fn fraction(phase: Duration, rank: u64, count: u64) -> Duration {
    Duration::from_millis(scale(millis(phase), rank, count))
}

pub(crate) const fn round_half_even(milli: u64) -> u64 {
    let whole = milli / MILLI;
    let rest = milli % MILLI;
    let half = MILLI / 2;
    if rest > half || (rest == half && whole % 2 == 1) {
        whole.saturating_add(1)
    } else {
        whole
    }
}
