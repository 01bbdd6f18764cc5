use std::sync::{mpsc, Arc};
use std::time::Duration;

use clickpace::{
    runtime::{FixedTicker, PaceEvent, Runner, TestEventSource},
    store::keys,
    App, KeyValueStore, Locale, ManualClock, MemoryStore, Tracker, TrackerPolicy,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{backend::TestBackend, Terminal};

const T0: u64 = 1_700_000_000_000;

fn key(code: KeyCode) -> PaceEvent {
    PaceEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
}

// Headless panel flow using the internal runtime without a TTY
#[test]
fn headless_panel_counts_undoes_and_quits() {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new(store.clone(), clock.clone(), TrackerPolicy::default());
    let mut app = App::new(tracker, Locale::English);

    let (tx, rx) = mpsc::channel();
    let es = TestEventSource::new(rx);
    let ticker = FixedTicker::new(Duration::from_millis(5));
    let mut runner = Runner::new(es, ticker);

    for ev in [
        key(KeyCode::Char(' ')),
        key(KeyCode::Enter),
        key(KeyCode::Char('a')),
        key(KeyCode::Char('5')),
        key(KeyCode::Char('6')),
        key(KeyCode::Char('x')),
        key(KeyCode::Char('q')),
    ] {
        tx.send(ev).unwrap();
    }

    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();

    for _ in 0..200u32 {
        if app.handle_event(runner.step()) {
            terminal.draw(|f| f.render_widget(&app, f.area())).unwrap();
        }
        if app.should_quit() {
            break;
        }
    }
    app.shutdown();

    assert!(app.should_quit(), "q should end the loop");
    assert_eq!(app.snapshot.total_count, 2);
    assert_eq!(store.get(keys::TOTAL_COUNT).unwrap().as_deref(), Some("2"));

    let content: String = terminal
        .backend()
        .buffer()
        .content
        .iter()
        .map(|c| c.symbol())
        .collect();
    assert!(content.contains("total 2"));
}

#[test]
fn headless_focus_loss_pauses_accounting() {
    let clock = Arc::new(ManualClock::new(T0));
    let tracker = Tracker::new(
        Arc::new(MemoryStore::new()),
        clock.clone(),
        TrackerPolicy::default(),
    );
    let mut app = App::new(tracker, Locale::English);

    app.handle_event(key(KeyCode::Char(' ')));
    clock.advance(1_000);
    app.handle_event(PaceEvent::Tick);
    assert_eq!(app.snapshot.active_time_ms, 1_000);

    app.handle_event(PaceEvent::Focus(false));
    for _ in 0..3 {
        clock.advance(1_000);
        app.handle_event(PaceEvent::Tick);
    }
    assert!(app.snapshot.paused);
    assert_eq!(app.snapshot.active_time_ms, 1_000);
    assert_eq!(app.snapshot.elapsed_session_ms, 4_000);
}

#[test]
fn headless_ticks_flow_through_runner() {
    let clock = Arc::new(ManualClock::new(T0));
    let tracker = Tracker::new(
        Arc::new(MemoryStore::new()),
        clock.clone(),
        TrackerPolicy::default(),
    );
    let mut app = App::new(tracker, Locale::English);
    app.handle_event(key(KeyCode::Char(' ')));

    let (_tx, rx) = mpsc::channel();
    let mut runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(2)),
    );

    let mut ticks = 0;
    for _ in 0..5u32 {
        clock.advance(1_000);
        if let PaceEvent::Tick = runner.step() {
            app.handle_event(PaceEvent::Tick);
            ticks += 1;
        }
    }
    assert_eq!(ticks, 5);
    assert_eq!(app.snapshot.active_time_ms, 5_000);
}
