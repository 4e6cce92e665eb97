//! FFaudiocue - headless track extraction
//!
//! Reads a job file describing one CUE-sheet image, extracts every track
//! with FFmpeg and moves the results into the configured destination.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::LevelFilter;

use ffaudiocue::conversion::{
    ConflictPolicy, CountPhase, Job, JobEvent, JobFailure, JobHandle, JobOutcome, JobReport,
    JobSequencer, ReconcileOutcome,
};
use ffaudiocue::core::{AppSettings, BinaryLocation, detect_binary, verify_executable};
use ffaudiocue::job_file::JobFile;
use ffaudiocue::logging;

const EXIT_FAILED: u8 = 1;
const EXIT_RECONCILE: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// How often the event loop checks for Ctrl-C while no event arrives
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnConflict {
    /// Prompt once on the terminal
    Ask,
    Overwrite,
    Skip,
    Cancel,
}

#[derive(Debug, Parser)]
#[command(name = "ffaudiocue", version, about = "Extract CUE-sheet tracks with FFmpeg")]
struct Cli {
    /// Job description (JSON)
    job: PathBuf,

    /// Destination directory (overrides settings)
    #[arg(short, long)]
    destination: Option<PathBuf>,

    /// Encoder log file (default: ffmpeg.log in the log directory)
    #[arg(long)]
    log: Option<PathBuf>,

    /// What to do when outputs already exist at the destination
    #[arg(long, value_enum, default_value_t = OnConflict::Ask)]
    on_conflict: OnConflict,

    /// Empty the encoder log before starting
    #[arg(long)]
    fresh_log: bool,

    /// Offer to delete the CUE sheet and audio image after a successful run
    #[arg(long)]
    remove_source: bool,

    /// Show debug output on the terminal
    #[arg(short, long)]
    verbose: bool,
}

/// One progress bar per track, replaced when the next track starts
struct TrackProgress {
    bar: Option<ProgressBar>,
    visible: bool,
}

impl TrackProgress {
    fn new(visible: bool) -> Self {
        Self { bar: None, visible }
    }

    fn start(&mut self, message: String) {
        self.finish(false);

        let bar = if self.visible {
            let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_length(100);
        bar.set_message(message);
        self.bar = Some(bar);
    }

    fn update(&self, percent: u8) {
        if let Some(bar) = &self.bar {
            bar.set_position(u64::from(percent));
        }
    }

    /// Close the current bar; a failed track leaves it where it stopped
    fn finish(&mut self, success: bool) {
        if let Some(bar) = self.bar.take() {
            if success {
                bar.finish();
            } else {
                bar.abandon();
            }
        }
    }

    fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(ProgressBar::position)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn read_answer() -> Option<String> {
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(answer),
    }
}

/// Ask on stderr/stdin; anything unrecognised cancels
fn ask_on_terminal(conflicts: &[PathBuf]) -> ConflictPolicy {
    eprintln!("{} file(s) already exist at the destination:", conflicts.len());
    for path in conflicts {
        eprintln!("  {}", path.display());
    }
    eprint!("[o]verwrite all, [s]kip existing, [c]ancel? ");
    let _ = io::stderr().flush();

    match read_answer().map(|a| a.trim().to_ascii_lowercase()).as_deref() {
        Some("o" | "overwrite") => ConflictPolicy::OverwriteAll,
        Some("s" | "skip") => ConflictPolicy::SkipConflicting,
        _ => ConflictPolicy::Cancel,
    }
}

fn confirm_removal(files: &[&Path]) -> bool {
    eprintln!("Do you really want to delete the following source files?");
    for path in files {
        eprintln!("  {}", path.display());
    }
    eprint!("[y/N] ");
    let _ = io::stderr().flush();
    read_answer().is_some_and(|a| is_yes(&a))
}

/// First Ctrl-C cancels the job; a second one exits immediately
fn install_interrupt_handler() -> Result<Arc<AtomicBool>, String> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    })
    .map_err(|e| format!("failed to install Ctrl-C handler: {}", e))?;
    Ok(interrupted)
}

/// Render events until the worker is done, cancelling once `interrupted` is set
fn watch(handle: JobHandle, interrupted: &AtomicBool, progress: &mut TrackProgress) -> JobReport {
    let mut cancel_sent = false;
    loop {
        if !cancel_sent && interrupted.load(Ordering::SeqCst) {
            cancel_sent = true;
            log::info!("Interrupted, stopping the encoder...");
            handle.cancel();
        }

        let event = match handle.events().recv_timeout(INTERRUPT_POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            JobEvent::Count(count) => match count.phase {
                CountPhase::Start => progress.start(count.message.unwrap_or_default()),
                CountPhase::Error => progress.finish(false),
            },
            JobEvent::Progress(event) => progress.update(event.percent),
            JobEvent::TrackFinished { exit_status, .. } => progress.finish(exit_status == 0),
            JobEvent::Completed(JobOutcome::Aborted) => log::info!("Extraction interrupted"),
            JobEvent::Completed(_) | JobEvent::ReconcileFailed(_) => {}
            JobEvent::Reconciled(ReconcileOutcome::Moved { moved, skipped }) => {
                for path in &skipped {
                    log::warn!("Kept existing {}", path.display());
                }
                log::info!("{} track(s) saved", moved.len());
            }
            JobEvent::Reconciled(ReconcileOutcome::Cancelled) => {
                log::info!("Nothing moved; existing files kept");
            }
        }
    }
    progress.finish(false);
    handle.join()
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    let mut settings = AppSettings::load();
    if let Some(destination) = cli.destination {
        settings.destination = destination;
        settings.same_destination = false;
    }

    match detect_binary(&settings.ffmpeg_cmd.to_string_lossy(), None) {
        BinaryLocation::NotInstalled => {
            verify_executable(&settings.ffmpeg_cmd)?;
        }
        location => log::debug!("Using encoder {:?}", location),
    }

    let job_file = JobFile::load(&cli.job).map_err(|e| e.to_string())?;
    let commands = job_file.commands(&settings).map_err(|e| e.to_string())?;
    let destination = job_file.destination(&settings);

    let log_path = cli
        .log
        .or_else(|| logging::ffmpeg_log_path(settings.log_dir.as_deref()))
        .ok_or("could not determine log directory")?;
    if cli.fresh_log {
        logging::clear_log_file(&log_path)
            .map_err(|e| format!("failed to clear {}: {}", log_path.display(), e))?;
    }
    log::info!("Encoder log: {}", log_path.display());
    log::info!("Destination: {}", destination.display());

    let job = match cli.on_conflict {
        OnConflict::Ask => Job::new(commands, &destination, &log_path, ask_on_terminal),
        OnConflict::Overwrite => Job::new(commands, &destination, &log_path, ConflictPolicy::OverwriteAll),
        OnConflict::Skip => Job::new(commands, &destination, &log_path, ConflictPolicy::SkipConflicting),
        OnConflict::Cancel => Job::new(commands, &destination, &log_path, ConflictPolicy::Cancel),
    };

    let interrupted = install_interrupt_handler()?;
    let sequencer = match &settings.scratch_root {
        Some(root) => JobSequencer::new(root),
        None => JobSequencer::in_temp_dir(),
    };
    let handle = sequencer.submit(job).map_err(|e| e.to_string())?;
    let report = watch(handle, &interrupted, &mut TrackProgress::new(true));

    let code = match report.outcome {
        JobOutcome::Succeeded => match report.reconcile {
            Some(Err(_)) => EXIT_RECONCILE,
            Some(Ok(ReconcileOutcome::Cancelled)) => EXIT_INTERRUPTED,
            _ => {
                if cli.remove_source && confirm_removal(&job_file.source_files()) {
                    // Tracks are already in place; a failed delete does not fail the run
                    if let Err(e) = job_file.remove_source_files() {
                        log::error!("{}", e);
                    }
                }
                0
            }
        },
        JobOutcome::Aborted => EXIT_INTERRUPTED,
        JobOutcome::Failed(JobFailure::Encode { track_index, exit_status }) => {
            log::error!(
                "Track {} failed with exit status {}; see {}",
                track_index + 1,
                exit_status,
                log_path.display()
            );
            EXIT_FAILED
        }
        JobOutcome::Failed(_) => EXIT_FAILED,
    };
    Ok(ExitCode::from(code))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::init_logging(level);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::parse_from([
            "ffaudiocue",
            "job.json",
            "--destination",
            "/music",
            "--on-conflict",
            "skip",
            "--fresh-log",
            "--remove-source",
        ]);
        assert_eq!(cli.job, PathBuf::from("job.json"));
        assert_eq!(cli.destination, Some(PathBuf::from("/music")));
        assert_eq!(cli.on_conflict, OnConflict::Skip);
        assert!(cli.fresh_log);
        assert!(cli.remove_source);
        assert!(cli.log.is_none());
    }

    #[test]
    fn test_conflict_default_is_ask() {
        let cli = Cli::parse_from(["ffaudiocue", "job.json"]);
        assert_eq!(cli.on_conflict, OnConflict::Ask);
        assert!(!cli.verbose);
        assert!(!cli.remove_source);
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_track_progress() {
        let mut progress = TrackProgress::new(false);
        assert_eq!(progress.position(), None);

        progress.start("Track 1/2: Intro".to_string());
        progress.update(40);
        assert_eq!(progress.position(), Some(40));

        progress.start("Track 2/2: Outro".to_string());
        assert_eq!(progress.position(), Some(0));
        progress.finish(true);
        assert_eq!(progress.position(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_cancels_and_cleans_up() {
        use ffaudiocue::conversion::TrackCommand;
        use std::time::Instant;

        let temp_dir = TempDir::new().unwrap();
        let marker = temp_dir.path().join("second_track_started");
        let commands = vec![
            TrackCommand::new("sh", ["-c", "echo out_time_us=1000000; sleep 30"]).duration_secs(60.0),
            TrackCommand::new("sh".to_string(), vec!["-c".to_string(), format!("touch '{}'", marker.display())]),
        ];
        let sequencer = JobSequencer::new(temp_dir.path().join("scratch"));
        let handle = sequencer
            .submit(Job::new(
                commands,
                temp_dir.path().join("dest"),
                temp_dir.path().join("ffmpeg.log"),
                ConflictPolicy::OverwriteAll,
            ))
            .unwrap();
        let workspace = handle.workspace_path().to_path_buf();

        // As if Ctrl-C arrived while the first track runs
        let interrupted = AtomicBool::new(true);
        let began = Instant::now();
        let report = watch(handle, &interrupted, &mut TrackProgress::new(false));

        assert_eq!(report.outcome, JobOutcome::Aborted);
        assert!(began.elapsed() < Duration::from_secs(20));
        assert!(!workspace.exists());
        assert!(!marker.exists());
        assert!(!sequencer.is_busy());
    }

    #[cfg(unix)]
    #[test]
    fn test_watch_without_interrupt_runs_to_completion() {
        use ffaudiocue::conversion::TrackCommand;

        let temp_dir = TempDir::new().unwrap();
        let commands = vec![
            TrackCommand::new("sh", ["-c", "echo out_time_us=1000000; printf x > a.wav"]).duration_secs(2.0),
        ];
        let sequencer = JobSequencer::new(temp_dir.path().join("scratch"));
        let handle = sequencer
            .submit(Job::new(
                commands,
                temp_dir.path().join("dest"),
                temp_dir.path().join("ffmpeg.log"),
                ConflictPolicy::OverwriteAll,
            ))
            .unwrap();

        let report = watch(handle, &AtomicBool::new(false), &mut TrackProgress::new(false));
        assert_eq!(report.outcome, JobOutcome::Succeeded);
        assert!(temp_dir.path().join("dest").join("a.wav").is_file());
    }
}
