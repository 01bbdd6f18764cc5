use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// Unified event type consumed by the panel loop
#[derive(Clone, Debug)]
pub enum PaceEvent {
    Key(KeyEvent),
    /// Terminal gained (true) or lost (false) focus
    Focus(bool),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, focus, resize)
pub trait PaceEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<PaceEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<PaceEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let ev = match event::read() {
                Ok(CtEvent::Key(key)) => PaceEvent::Key(key),
                Ok(CtEvent::FocusGained) => PaceEvent::Focus(true),
                Ok(CtEvent::FocusLost) => PaceEvent::Focus(false),
                Ok(CtEvent::Resize(_, _)) => PaceEvent::Resize,
                Ok(_) => continue,
                Err(_) => break,
            };
            if tx.send(ev).is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PaceEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<PaceEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<PaceEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<PaceEvent>) -> Self {
        Self { rx }
    }
}

impl PaceEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<PaceEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the panel one event/tick at a time
///
/// Ticks are due once per interval even while events keep arriving, so a fast
/// typist cannot starve the tracker.
pub struct Runner<E: PaceEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    next_tick: Instant,
}

impl<E: PaceEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        let next_tick = Instant::now() + ticker.interval();
        Self {
            event_source,
            ticker,
            next_tick,
        }
    }

    /// Blocks until the next event or the next tick, whichever comes first
    pub fn step(&mut self) -> PaceEvent {
        let now = Instant::now();
        if now >= self.next_tick {
            self.next_tick = now + self.ticker.interval();
            return PaceEvent::Tick;
        }
        match self.event_source.recv_timeout(self.next_tick - now) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.next_tick = Instant::now() + self.ticker.interval();
                PaceEvent::Tick
            }
        }
    }
}
