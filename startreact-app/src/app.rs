use crate::cue::ConsoleCue;
use crate::sources::{ReplaySource, SimulatedSubject};
use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use rand::SeedableRng;
use rand::rngs::StdRng;
use startreact_experiment::{
    QueuedSink, SessionConfig, SessionDir, SessionHandle, SignalSource, SubjectMetadata, TaskKind,
    load_config, save_config, start_session, summarize,
};
use startreact_timing::{HighPrecisionTimer, ManualClock, Timer};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(clap::Parser, Debug)]
#[command(version, about = "Runs one StartReact session", long_about = None)]
pub struct Cli {
    /// Subject identifier stored with the session
    #[arg(long)]
    subject: String,
    #[arg(long, default_value = "ankle")]
    joint: String,
    /// Subject's maximum range of motion, in degrees
    #[arg(long, default_value_t = 90.0)]
    max_rom: f64,
    /// Set when stimulation is applied during the session
    #[arg(long)]
    stim: bool,
    #[arg(long, value_enum, default_value_t = Task::Rest)]
    task: Task,

    /// Path to a JSON session config. Defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    /// Writes the effective config here before the session starts
    #[arg(long)]
    save_config: Option<PathBuf>,
    /// Overrides the config's trials per cue
    #[arg(long)]
    trials_per_cue: Option<usize>,
    /// Overrides the config's hold time
    #[arg(long)]
    hold_ms: Option<u64>,

    /// Seed for the trial order. Random when omitted
    #[arg(long)]
    seed: Option<u64>,
    /// Directory under which the session directory is created
    #[arg(long, default_value = "data")]
    output: PathBuf,

    /// Replays the configured channel from a CSV recording.
    /// A simulated subject is used when omitted
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Share of cues the simulated subject ignores
    #[arg(long, default_value_t = 0.1)]
    miss_rate: f64,
    /// Ticks on the wall clock and reads operator commands from stdin.
    /// Otherwise the session runs on a synthetic clock as fast as possible
    #[arg(long)]
    realtime: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Task {
    Rest,
    Active,
}

impl From<Task> for TaskKind {
    fn from(task: Task) -> Self {
        match task {
            Task::Rest => TaskKind::Rest,
            Task::Active => TaskKind::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Abort,
    MoveTarget(f64, f64),
    Status,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    match words.next()? {
        "q" | "abort" => Some(Command::Abort),
        "s" | "status" => Some(Command::Status),
        "t" | "target" => {
            let min = words.next()?.parse().ok()?;
            let max = words.next()?.parse().ok()?;
            Some(Command::MoveTarget(min, max))
        }
        _ => None,
    }
}

pub struct App {
    cli: Cli,
    config: SessionConfig,
    subject: SubjectMetadata,
    seed: u64,
}

impl App {
    pub fn new(cli: Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => load_config(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => SessionConfig::default(),
        };
        if let Some(n) = cli.trials_per_cue {
            config.trial.trials_per_cue = n;
        }
        if let Some(ms) = cli.hold_ms {
            config.trial.hold_ms = ms;
        }
        config.validate().context("Invalid session config")?;

        let subject = SubjectMetadata {
            subject_id: cli.subject.clone(),
            joint: cli.joint.clone(),
            max_rom: cli.max_rom,
            stim: cli.stim,
            task: cli.task.into(),
        };
        subject.validate().context("Invalid subject metadata")?;

        if let Some(path) = &cli.save_config {
            save_config(&config, path)?;
            info!("Saved config to {}", path.display());
        }

        let seed = cli.seed.unwrap_or_else(rand::random);
        Ok(Self {
            cli,
            config,
            subject,
            seed,
        })
    }

    pub fn run(self) -> Result<()> {
        info!(
            "StartReact on {} ({}), seed {}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            self.seed
        );
        if self.cli.realtime {
            self.run_with(HighPrecisionTimer::new())
        } else {
            self.run_with(ManualClock::new())
        }
    }

    fn run_with<T>(&self, timer: T) -> Result<()>
    where
        T: Timer<Timestamp = u64> + 'static,
    {
        let dir = SessionDir::create(&self.cli.output, self.subject.task)
            .context("Failed to create session directory")?;
        info!("Recording to {}", dir.path().display());
        let sink = QueuedSink::spawn(dir.open_sink()?);

        let cue = ConsoleCue::new(timer.clone(), self.config.cue.clone());
        let (source, cue) = match &self.cli.replay {
            Some(path) => {
                let replay =
                    ReplaySource::from_csv(path, &self.config.trial.channel, timer.clone())?;
                info!("Replaying {} samples from {}", replay.remaining(), path.display());
                (Box::new(replay) as Box<dyn SignalSource>, cue)
            }
            None => {
                let (tx, rx) = unbounded();
                let subject = SimulatedSubject::new(
                    timer.clone(),
                    rx,
                    &self.config.trial,
                    self.seed.wrapping_add(1),
                    self.cli.miss_rate,
                );
                (Box::new(subject) as Box<dyn SignalSource>, cue.with_watcher(tx))
            }
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        let (mut seq, handle) = start_session(
            self.config.clone(),
            self.subject.clone(),
            timer,
            &mut rng,
            source,
            cue,
            sink,
        )
        .context("Failed to start session")?;

        let display = if self.cli.realtime {
            spawn_operator_console(handle.clone())?;
            Some(spawn_display(handle.clone())?)
        } else {
            None
        };

        let interval = Duration::from_millis(self.config.tick_interval_ms);
        let outcome = seq.run_until_complete(interval);

        if let Some(display) = display {
            if display.join().is_err() {
                warn!("Display thread panicked");
            }
        }

        let results = seq.results();
        match dir.write_results(&results) {
            Ok(path) => info!("Trial results written to {}", path.display()),
            Err(e) => error!("Failed to write trial results: {e}"),
        }
        outcome.context("Session aborted")?;

        for line in summarize(&results).to_string().lines() {
            info!("{line}");
        }
        let stats = seq.timer.tick_stats();
        info!(
            "{} ticks at {:.1} Hz, mean {:.3} ms, jitter {:.3} ms, max {:.3} ms",
            stats.ticks,
            stats.effective_hz,
            stats.average_tick_ns / 1e6,
            stats.jitter_ns / 1e6,
            stats.max_tick_ns / 1e6
        );
        Ok(())
    }
}

/// Reads operator commands from stdin for as long as the process runs.
fn spawn_operator_console(handle: SessionHandle) -> Result<()> {
    info!("Commands: q (abort), t <min> <max> (move target), s (status)");
    std::thread::Builder::new()
        .name("operator-console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(Command::Abort) => handle.abort(),
                    Some(Command::MoveTarget(min, max)) => {
                        if let Err(e) = handle.move_target(min, max) {
                            warn!("{e}");
                        }
                    }
                    Some(Command::Status) => {
                        let s = handle.current_state();
                        info!(
                            "{}: {}/{} trials done, target [{}, {}]",
                            s.state,
                            s.completed(),
                            s.total_trials,
                            s.target.0,
                            s.target.1
                        );
                    }
                    None => warn!("Unknown command {line:?}"),
                }
            }
        })
        .context("Failed to start operator console")?;
    Ok(())
}

/// Shows the subject prompt whenever it changes, until the session ends.
fn spawn_display(handle: SessionHandle) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("display".into())
        .spawn(move || {
            let mut shown = "";
            loop {
                let status = handle.current_state();
                let prompt = status.state.prompt();
                if prompt != shown {
                    info!(target: "startreact::display", "{prompt}");
                    shown = prompt;
                }
                if let Some(reason) = &status.fatal {
                    error!("Session ended early: {reason}");
                }
                if status.state.is_terminal() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        })
        .context("Failed to start display thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn operator_commands_parse() {
        assert_eq!(parse_command("q"), Some(Command::Abort));
        assert_eq!(parse_command("  status "), Some(Command::Status));
        assert_eq!(
            parse_command("t 5 12.5"),
            Some(Command::MoveTarget(5.0, 12.5))
        );
        assert_eq!(parse_command("t 5"), None);
        assert_eq!(parse_command("jump"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn cli_overrides_config_defaults() {
        let cli = Cli::parse_from([
            "startreact",
            "--subject",
            "S002",
            "--task",
            "active",
            "--trials-per-cue",
            "4",
            "--hold-ms",
            "500",
            "--seed",
            "9",
        ]);
        let app = App::new(cli).unwrap();
        assert_eq!(app.config.trial.trials_per_cue, 4);
        assert_eq!(app.config.trial.hold_ms, 500);
        assert_eq!(app.subject.task, TaskKind::Active);
        assert_eq!(app.seed, 9);
    }

    #[test]
    fn simulated_session_writes_a_complete_record() {
        let out = std::env::temp_dir().join(format!(
            "startreact_app_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let cli = Cli::parse_from([
            "startreact",
            "--subject",
            "S003",
            "--trials-per-cue",
            "2",
            "--miss-rate",
            "0",
            "--seed",
            "3",
            "--output",
            out.to_str().unwrap(),
        ]);
        App::new(cli).unwrap().run().unwrap();

        let dirs: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(dirs.len(), 1);
        for file in ["meta.json", "events.jsonl", "trial_results.json"] {
            assert!(dirs[0].join(file).is_file(), "{file}");
        }
        let results: Vec<startreact_core::TrialResult> = serde_json::from_str(
            &std::fs::read_to_string(dirs[0].join("trial_results.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(results.len(), 6);
        assert!(
            results
                .iter()
                .all(|r| r.outcome == startreact_core::TrialOutcome::Success)
        );

        let _ = std::fs::remove_dir_all(&out);
    }
}
