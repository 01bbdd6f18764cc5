use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use clickpace::{
    app::App,
    app_dirs::AppDirs,
    clock::{Millis, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    format::Locale,
    runtime::{CrosstermEventSource, FixedTicker, Runner},
    store::{KeyValueStore, SqliteStore},
    tasks::{HttpListingSource, TaskListCache},
    tracker::Tracker,
};
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs,
    io::{self, stdin},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// annotation tempo panel with rolling rates, streaks and a cached task list
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    /// path to the JSON config file
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// path to the SQLite state database
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// language for duration labels
    #[clap(short = 'l', long, value_enum, global = true)]
    locale: Option<Locale>,

    /// tracker tick interval in milliseconds
    #[clap(long, global = true)]
    tick_ms: Option<Millis>,

    /// base URL of the annotation host
    #[clap(long, global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// open the live tempo panel (default)
    Panel,
    /// print the current snapshot as JSON
    Stats,
    /// clear all tracker state
    Reset,
    /// refresh and print the task list
    Tasks {
        /// ignore the cache TTL
        #[clap(long, conflicts_with = "cached")]
        force: bool,
        /// print the stored list without touching the network
        #[clap(long)]
        cached: bool,
    },
    /// mark a task as finished
    Finish {
        /// numeric task id, or the task's /v2/task/<id>/queue/continue/ path
        id: String,
    },
}

impl Cli {
    /// Load the config file and apply command-line overrides
    fn resolve_config(&self) -> Config {
        let store = match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        };
        let mut cfg = store.load();
        if let Some(locale) = self.locale {
            cfg.locale = locale;
        }
        if let Some(tick_ms) = self.tick_ms {
            cfg.tick_interval_ms = tick_ms.max(1);
        }
        if let Some(base_url) = &self.base_url {
            cfg.tasks.base_url = base_url.clone();
        }
        cfg
    }

    fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .or_else(AppDirs::db_path)
            .unwrap_or_else(|| PathBuf::from("clickpace.db"))
    }
}

fn init_logging(to_file: bool) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_env("CLICKPACE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("clickpace=info"));

    match AppDirs::log_path().filter(|_| to_file) {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or(Command::Panel);
    init_logging(command == Command::Panel)?;

    let cfg = cli.resolve_config();
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(cli.db_path())?);

    match command {
        Command::Panel => run_panel(&cfg, store),
        Command::Stats => {
            let mut tracker = Tracker::load(store, SystemClock, cfg.tracker.clone());
            let snapshot = tracker.snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Command::Reset => {
            let mut tracker = Tracker::load(store, SystemClock, cfg.tracker.clone());
            tracker.reset_all();
            println!("tracker state cleared");
            Ok(())
        }
        Command::Tasks { force, cached } => run_tasks(&cfg, store, force, cached),
        Command::Finish { id } => {
            let cache = task_cache(&cfg, store)?;
            let newly_finished = if id.starts_with('/') {
                cache.mark_finished_from_path(&id)
            } else {
                cache.mark_finished(&id)
            };
            if newly_finished {
                println!("task {id} marked finished");
            } else {
                println!("task {id} was already finished");
            }
            Ok(())
        }
    }
}

fn task_cache(
    cfg: &Config,
    store: Arc<dyn KeyValueStore>,
) -> Result<TaskListCache<HttpListingSource>, Box<dyn Error>> {
    let source = HttpListingSource::new(&cfg.tasks)?;
    Ok(TaskListCache::new(
        source,
        store,
        Arc::new(SystemClock),
        cfg.tasks.clone(),
    ))
}

fn runtime() -> io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

fn run_tasks(
    cfg: &Config,
    store: Arc<dyn KeyValueStore>,
    force: bool,
    cached: bool,
) -> Result<(), Box<dyn Error>> {
    let cache = task_cache(cfg, store)?;
    let list = if cached {
        cache.get_cached_list()
    } else {
        runtime()?.block_on(cache.refresh(force))
    };
    for task in &list {
        println!("{}\t{}", task.href, task.title);
    }
    info!(tasks = list.len(), "task list printed");
    Ok(())
}

fn run_panel(cfg: &Config, store: Arc<dyn KeyValueStore>) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    // task upkeep runs on the tokio runtime while the panel owns this thread
    let runtime = runtime()?;
    let cache = Arc::new(task_cache(cfg, store.clone())?);
    {
        let _guard = runtime.enter();
        cache.spawn_sync_listener();
        cache.spawn_background(Duration::from_millis(cfg.tasks.background_every_ms.max(1)));
    }

    let tracker = Tracker::load(store, SystemClock, cfg.tracker.clone());
    let mut app = App::new(tracker, cfg.locale).with_board(cache);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, cfg.tick_interval_ms);
    app.shutdown();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    runtime.shutdown_background();

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    tick_interval_ms: Millis,
) -> Result<(), Box<dyn Error>> {
    let ticker = FixedTicker::new(Duration::from_millis(tick_interval_ms.max(1)));
    let mut runner = Runner::new(CrosstermEventSource::new(), ticker);
    info!("panel started");

    terminal.draw(|f| f.render_widget(&*app, f.area()))?;
    while !app.should_quit() {
        if app.handle_event(runner.step()) {
            terminal.draw(|f| f.render_widget(&*app, f.area()))?;
        }
    }

    info!("panel closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_panel() {
        let cli = Cli::parse_from(["clickpace"]);
        assert_eq!(cli.command, None);
        assert_eq!(cli.locale, None);
        assert_eq!(cli.tick_ms, None);
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::parse_from(["clickpace", "tasks", "--force"]);
        assert_eq!(
            cli.command,
            Some(Command::Tasks {
                force: true,
                cached: false
            })
        );

        let cli = Cli::parse_from(["clickpace", "tasks", "--cached"]);
        assert_eq!(
            cli.command,
            Some(Command::Tasks {
                force: false,
                cached: true
            })
        );
        assert!(Cli::try_parse_from(["clickpace", "tasks", "--force", "--cached"]).is_err());

        let cli = Cli::parse_from(["clickpace", "finish", "42"]);
        assert_eq!(
            cli.command,
            Some(Command::Finish {
                id: "42".to_string()
            })
        );

        let cli = Cli::parse_from(["clickpace", "stats"]);
        assert_eq!(cli.command, Some(Command::Stats));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "clickpace",
            "stats",
            "--locale",
            "russian",
            "--db",
            "/tmp/x.db",
        ]);
        assert_eq!(cli.locale, Some(Locale::Russian));
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file_cfg = Config::default();
        file_cfg.tick_interval_ms = 250;
        file_cfg.tasks.base_url = "https://from-file.example".into();
        FileConfigStore::with_path(&path).save(&file_cfg).unwrap();

        let cli = Cli::parse_from([
            "clickpace",
            "--config",
            path.to_str().unwrap(),
            "--base-url",
            "https://from-flag.example",
        ]);
        let cfg = cli.resolve_config();
        assert_eq!(cfg.tick_interval_ms, 250);
        assert_eq!(cfg.tasks.base_url, "https://from-flag.example");
        assert_eq!(cfg.locale, Locale::English);
    }

    #[test]
    fn test_tick_ms_zero_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "clickpace",
            "--config",
            dir.path().join("none.json").to_str().unwrap(),
            "--tick-ms",
            "0",
        ]);
        assert_eq!(cli.resolve_config().tick_interval_ms, 1);
    }

    #[test]
    fn test_explicit_db_path_wins() {
        let cli = Cli::parse_from(["clickpace", "--db", "/tmp/state.db"]);
        assert_eq!(cli.db_path(), PathBuf::from("/tmp/state.db"));
    }

    #[test]
    fn test_cli_verifies() {
        Cli::command().debug_assert();
    }
}
