use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::format::Locale;
use crate::runtime::PaceEvent;
use crate::tasks::{jump_target, Jump, TaskBoard, TaskEntry};
use crate::tracker::{Snapshot, TickOutcome, Tracker};

/// What a key press asks the panel to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Record,
    /// Count the selected task, at most once until the selection changes
    RecordOnce,
    Undo,
    Reset,
    Jump(Jump),
    FinishTask,
    ClearTasks,
    Quit,
    Ignore,
}

impl Action {
    pub fn from_key(key: &KeyEvent) -> Self {
        if key.kind == KeyEventKind::Release {
            return Action::Ignore;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Action::Quit,
                _ => Action::Ignore,
            };
        }
        match key.code {
            KeyCode::Char(' ') | KeyCode::Enter => Action::Record,
            KeyCode::Char(c) if c.is_ascii_digit() || c == '-' || c == '=' => Action::RecordOnce,
            KeyCode::Char('a') | KeyCode::Left | KeyCode::Backspace => Action::Undo,
            KeyCode::Char('r') => Action::Reset,
            KeyCode::Char('w') | KeyCode::Up => Action::Jump(Jump::Offset(1)),
            KeyCode::Char('s') | KeyCode::Down => Action::Jump(Jump::Offset(-1)),
            KeyCode::Home => Action::Jump(Jump::First),
            KeyCode::End => Action::Jump(Jump::Last),
            KeyCode::Char('f') => Action::FinishTask,
            KeyCode::Char('R') => Action::ClearTasks,
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            _ => Action::Ignore,
        }
    }
}

/// Panel state: the tracker, the task list view and the last rendered snapshot
pub struct App<C: Clock = SystemClock> {
    pub tracker: Tracker<C>,
    pub locale: Locale,
    pub snapshot: Snapshot,
    board: Option<Arc<dyn TaskBoard>>,
    tasks: Vec<TaskEntry>,
    /// href of the task the user is on
    selected: Option<String>,
    quit: bool,
}

impl<C: Clock> App<C> {
    pub fn new(mut tracker: Tracker<C>, locale: Locale) -> Self {
        let snapshot = tracker.snapshot();
        Self {
            tracker,
            locale,
            snapshot,
            board: None,
            tasks: Vec::new(),
            selected: None,
            quit: false,
        }
    }

    /// Show and navigate the tasks of `board`.
    pub fn with_board(mut self, board: Arc<dyn TaskBoard>) -> Self {
        self.tasks = board.tasks();
        self.board = Some(board);
        self
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn tasks(&self) -> &[TaskEntry] {
        &self.tasks
    }

    pub fn selected(&self) -> Option<&TaskEntry> {
        let href = self.selected.as_deref()?;
        self.tasks.iter().find(|t| t.href == href)
    }

    /// Apply one runtime event. Returns true when the panel should redraw.
    pub fn handle_event(&mut self, event: PaceEvent) -> bool {
        match event {
            PaceEvent::Tick => {
                self.on_tick();
                true
            }
            PaceEvent::Resize => true,
            PaceEvent::Focus(visible) => {
                debug!(visible, "focus changed");
                self.tracker.set_visible(visible);
                false
            }
            PaceEvent::Key(key) => self.handle_key(&key),
        }
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> bool {
        match Action::from_key(key) {
            Action::Record => self.tracker.record_event(),
            Action::RecordOnce => {
                if !self.tracker.record_event_once() {
                    debug!("selected task already counted");
                }
            }
            Action::Undo => self.tracker.undo_last_event(),
            Action::Reset => self.tracker.reset_all(),
            Action::Jump(jump) => {
                if !self.jump(jump) {
                    return false;
                }
            }
            Action::FinishTask => self.finish_selected(),
            Action::ClearTasks => {
                if let Some(board) = &self.board {
                    board.clear();
                }
                self.tasks.clear();
                self.selected = None;
            }
            Action::Quit => {
                self.quit = true;
                return false;
            }
            Action::Ignore => return false,
        }
        self.snapshot = self.tracker.snapshot();
        true
    }

    /// Move the selection. Landing on a task is activity and re-arms the
    /// once-per-task counter.
    fn jump(&mut self, jump: Jump) -> bool {
        let current = self.selected.as_deref().unwrap_or_default();
        let Some(target) = jump_target(&self.tasks, current, jump) else {
            return false;
        };
        let href = target.href.clone();
        self.tracker.observe_target(&href);
        self.tracker.register_activity();
        self.selected = Some(href);
        true
    }

    fn finish_selected(&mut self) {
        let Some(board) = self.board.clone() else {
            return;
        };
        let Some(task_id) = self.selected().and_then(|t| t.task_id()).map(str::to_string) else {
            return;
        };
        if board.finish(&task_id) {
            info!(task_id, "task finished from the panel");
        }
        self.tasks = board.tasks();
        self.jump(Jump::First);
    }

    pub fn on_tick(&mut self) {
        let now = self.tracker.clock().now_ms();
        if self.tracker.tick(now) == TickOutcome::IdleReset {
            debug!("panel saw idle reset");
        }
        self.snapshot = self.tracker.snapshot_at(now);
        if let Some(board) = &self.board {
            self.tasks = board.tasks();
        }
    }

    /// Persist outstanding state; call before exiting.
    pub fn shutdown(&mut self) {
        self.tracker.flush();
    }
}
