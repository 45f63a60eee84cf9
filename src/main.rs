use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
    tty::IsTty,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nback::{
    config::{ConfigStore, FileConfigStore},
    driver,
    game::{GameEvent, GameSession},
    highscore::{HighScoreStore, MemoryHighScoreStore, SqliteHighScoreStore},
    presenter::ConsolePresenter,
    runtime::CrosstermInputSource,
    ConfigUpdate, Density, GameConfig, Judgement, Modality, SeededRandom,
};

/// n-back working memory trainer
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "An n-back working memory trainer: press space when the current stimulus matches the one shown N steps earlier."
)]
pub struct Cli {
    /// how many steps back a match refers to
    #[clap(short = 'n', long)]
    n_back: Option<usize>,

    /// number of stimuli per game
    #[clap(short = 'e', long)]
    events: Option<usize>,

    /// milliseconds each stimulus stays up
    #[clap(short = 'i', long)]
    interval_ms: Option<u64>,

    /// stimulus channel(s)
    #[clap(short = 'm', long, value_enum)]
    modality: Option<Modality>,

    /// target fraction of planted matches (0.0 - 1.0)
    #[clap(long)]
    match_ratio: Option<f64>,

    /// strict: non-planted stimuli never match by accident; loose: they may
    #[clap(long, value_enum)]
    density: Option<Density>,

    /// subtract a point for every match left undeclared
    #[clap(long)]
    penalize_misses: bool,

    /// seed the stimulus generator for a reproducible game
    #[clap(long)]
    seed: Option<u64>,

    /// persist the effective settings as the new defaults
    #[clap(long)]
    save_config: bool,

    /// path of the score database
    #[clap(long)]
    db: Option<PathBuf>,

    /// play without reading or writing the score database
    #[clap(long)]
    no_save: bool,

    /// print the stored high score and exit
    #[clap(long)]
    high_score: bool,

    /// print the most recent N sessions and exit
    #[clap(long, value_name = "N")]
    history: Option<usize>,
}

impl Cli {
    /// Convert CLI arguments to a configuration update over the stored settings
    fn to_config_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            n_back: self.n_back,
            event_count: self.events,
            interval_ms: self.interval_ms,
            modality: self.modality,
            match_ratio: self.match_ratio,
            density: self.density,
            penalize_misses: self.penalize_misses.then_some(true),
            ..ConfigUpdate::default()
        }
    }

    fn resolve_config(&self, store: &impl ConfigStore) -> Result<GameConfig, Box<dyn Error>> {
        let config = store.load().merged(&self.to_config_update());
        config.validate()?;
        if self.save_config {
            store.save(&config)?;
            info!("Saved settings as defaults");
        }
        Ok(config)
    }

    fn random(&self) -> SeededRandom {
        self.seed
            .map(SeededRandom::from_seed)
            .unwrap_or_default()
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nback=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let cli = Cli::parse();

    if cli.high_score || cli.history.is_some() {
        let store = open_store(&cli)?;
        print_scores(&cli, &store)?;
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config = cli.resolve_config(&FileConfigStore::new())?;

    if cli.no_save {
        play(&cli, config, MemoryHighScoreStore::new())
    } else {
        let store = match open_store(&cli) {
            Ok(store) => store,
            Err(e) => {
                warn!("Score database unavailable, scores will not be kept: {}", e);
                return play(&cli, config, MemoryHighScoreStore::new());
            }
        };
        play(&cli, config, store)
    }
}

fn open_store(cli: &Cli) -> nback::Result<SqliteHighScoreStore> {
    match &cli.db {
        Some(path) => SqliteHighScoreStore::open(path),
        None => SqliteHighScoreStore::new(),
    }
}

fn print_scores(cli: &Cli, store: &SqliteHighScoreStore) -> Result<(), Box<dyn Error>> {
    if cli.high_score {
        println!("high score: {}", store.read()?);
    }
    if let Some(limit) = cli.history {
        for record in store.recent_sessions(limit)? {
            println!(
                "{}  {}-back {:<11} score {:>3}  correct {:>3}  wrong {:>3}  missed {:>3}  {}/{}{}",
                record.finished_at.format("%Y-%m-%d %H:%M"),
                record.n_back,
                record.modality.to_string(),
                record.score,
                record.correct,
                record.incorrect,
                record.misses,
                record.events_presented,
                record.event_count,
                if record.cancelled { "  (stopped)" } else { "" },
            );
        }
    }
    Ok(())
}

fn play<S: HighScoreStore>(cli: &Cli, config: GameConfig, store: S) -> Result<(), Box<dyn Error>> {
    let presenter = ConsolePresenter::stdout(config.grid_size);
    let mut game = GameSession::new(config.clone(), presenter, store, cli.random())?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, Clear(ClearType::All))?;
    write!(
        stdout,
        "{}-back, {} mode, {} stimuli. High score: {}\r\nspace: match   esc: stop\r\n",
        config.n_back,
        config.modality,
        config.event_count,
        game.high_score()
    )?;
    stdout.flush()?;

    let input = CrosstermInputSource::new();
    let result = driver::play(&mut game, &input, |event| match event {
        GameEvent::Judged {
            judgement, score, ..
        } => {
            let mark = match judgement {
                Judgement::Correct => "correct",
                Judgement::Incorrect => "wrong",
                Judgement::AlreadyJudged => return,
            };
            let _ = write!(io::stdout(), "{} (score {})\r\n", mark, score);
            let _ = io::stdout().flush();
        }
        _ => {}
    });

    disable_raw_mode()?;

    if let Some(summary) = result? {
        println!();
        println!(
            "score {}  correct {}  wrong {}  missed {}",
            summary.score, summary.correct, summary.incorrect, summary.misses
        );
        if summary.new_high_score {
            println!("new high score!");
        } else {
            println!("high score {}", summary.high_score);
        }
    }

    Ok(())
}
