//! Progress reporting for import runs.
//!
//! The importer only talks to [`ProgressReporter`]; how progress is shown is up to the
//! implementation.

use std::sync::Arc;

/// Status of a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    /// Merging, resolving terms and writing the post itself
    Writing,
    AttachingMeta,
    AttachingImages { current: usize, total: usize },
    Done,
    Failed(String),
}

/// Phase of the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportPhase {
    LoadingConfig,
    LoadingRecords,
    Importing,
    Completed,
    Failed(String),
}

pub trait ProgressReporter: Send + Sync {
    fn set_phase(&self, phase: ImportPhase);

    /// Register entries to track (call before importing starts).
    fn register_entries(&self, entries: Vec<String>);

    fn update_entry(&self, entry: &str, status: EntryStatus);

    fn log_info(&self, message: &str);

    fn log_warn(&self, message: &str);

    fn log_error(&self, message: &str);

    fn finish(&self);
}

pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn set_phase(&self, _phase: ImportPhase) {}
    fn register_entries(&self, _entries: Vec<String>) {}
    fn update_entry(&self, _entry: &str, _status: EntryStatus) {}
    fn log_info(&self, _message: &str) {}
    fn log_warn(&self, _message: &str) {}
    fn log_error(&self, _message: &str) {}
    fn finish(&self) {}
}

#[derive(Debug, Default)]
struct Stats {
    total_entries: usize,
    imported_entries: usize,
    failed_entries: usize,
    warnings: usize,
    errors: usize,
    start_time: Option<std::time::Instant>,
}

impl Stats {
    fn started() -> Self {
        Self {
            start_time: Some(std::time::Instant::now()),
            ..Default::default()
        }
    }

    fn record(&mut self, status: &EntryStatus) {
        match status {
            EntryStatus::Done => self.imported_entries += 1,
            EntryStatus::Failed(_) => self.failed_entries += 1,
            _ => {}
        }
    }

    fn print_summary(&self) {
        let duration = self.start_time.map(|t| t.elapsed()).unwrap_or_default();
        eprintln!();
        eprintln!("Summary");
        eprintln!("   Records:  {} total", self.total_entries);
        eprintln!("   Imported: {}", self.imported_entries);
        if self.failed_entries > 0 {
            eprintln!("   Failed:   {}", self.failed_entries);
        }
        if self.warnings > 0 {
            eprintln!("   Warnings: {}", self.warnings);
        }
        if self.errors > 0 {
            eprintln!("   Errors:   {}", self.errors);
        }
        eprintln!("   Duration: {:.2}s", duration.as_secs_f64());
    }
}

fn phase_message(phase: &ImportPhase) -> String {
    match phase {
        ImportPhase::LoadingConfig => "Loading configuration...".to_owned(),
        ImportPhase::LoadingRecords => "Loading records...".to_owned(),
        ImportPhase::Importing => "Importing records...".to_owned(),
        ImportPhase::Completed => "Completed!".to_owned(),
        ImportPhase::Failed(e) => format!("Failed: {e}"),
    }
}

/// Plain line output for non-TTY stderr.
pub struct SimpleReporter {
    stats: std::sync::Mutex<Stats>,
}

impl SimpleReporter {
    pub fn new() -> Self {
        Self {
            stats: std::sync::Mutex::new(Stats::started()),
        }
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SimpleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SimpleReporter {
    fn set_phase(&self, phase: ImportPhase) {
        eprintln!("{}", phase_message(&phase));
    }

    fn register_entries(&self, entries: Vec<String>) {
        self.stats().total_entries = entries.len();
        eprintln!("   Found {} records", entries.len());
    }

    fn update_entry(&self, entry: &str, status: EntryStatus) {
        self.stats().record(&status);
        match status {
            EntryStatus::Done => eprintln!("   ok {entry}"),
            EntryStatus::Failed(ref e) => eprintln!("   failed {entry}: {e}"),
            _ => {}
        }
    }

    fn log_info(&self, message: &str) {
        eprintln!("info: {message}");
    }

    fn log_warn(&self, message: &str) {
        self.stats().warnings += 1;
        eprintln!("warning: {message}");
    }

    fn log_error(&self, message: &str) {
        self.stats().errors += 1;
        eprintln!("error: {message}");
    }

    fn finish(&self) {
        self.stats().print_summary();
    }
}

/// Progress bars for an interactive terminal.
pub struct FancyReporter {
    multi: indicatif::MultiProgress,
    phase_bar: indicatif::ProgressBar,
    main_progress: std::sync::Mutex<Option<indicatif::ProgressBar>>,
    current: std::sync::Mutex<Option<indicatif::ProgressBar>>,
    stats: std::sync::Mutex<Stats>,
}

impl FancyReporter {
    pub fn new() -> Self {
        let multi = indicatif::MultiProgress::new();
        let phase_bar = multi.add(indicatif::ProgressBar::new_spinner());
        if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            phase_bar.set_style(style);
        }
        phase_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            phase_bar,
            main_progress: std::sync::Mutex::new(None),
            current: std::sync::Mutex::new(None),
            stats: std::sync::Mutex::new(Stats::started()),
        }
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn status_detail(status: &EntryStatus) -> String {
        match status {
            EntryStatus::Pending => "pending".to_owned(),
            EntryStatus::Writing => "writing".to_owned(),
            EntryStatus::AttachingMeta => "meta".to_owned(),
            EntryStatus::AttachingImages { current, total } => {
                format!("images ({current}/{total})")
            }
            EntryStatus::Done => "done".to_owned(),
            EntryStatus::Failed(e) => e.clone(),
        }
    }
}

impl Default for FancyReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for FancyReporter {
    fn set_phase(&self, phase: ImportPhase) {
        let msg = phase_message(&phase);
        if matches!(phase, ImportPhase::Completed | ImportPhase::Failed(_)) {
            self.phase_bar.finish_with_message(msg);
        } else {
            self.phase_bar.set_message(msg);
        }
    }

    fn register_entries(&self, entries: Vec<String>) {
        let total = entries.len();
        self.stats().total_entries = total;

        let main_pb = self.multi.add(indicatif::ProgressBar::new(total as u64));
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("   {bar:40.cyan/blue} {pos}/{len} records")
        {
            main_pb.set_style(style.progress_chars("█▓▒░  "));
        }
        if let Ok(mut slot) = self.main_progress.lock() {
            *slot = Some(main_pb);
        }
    }

    fn update_entry(&self, entry: &str, status: EntryStatus) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };

        // Records are imported one at a time, so a single spinner is enough.
        if matches!(status, EntryStatus::Done | EntryStatus::Failed(_)) {
            if let Some(pb) = current.take() {
                pb.finish_and_clear();
            }
            if let Ok(main) = self.main_progress.lock() {
                if let Some(main_pb) = main.as_ref() {
                    main_pb.inc(1);
                }
            }
            if let EntryStatus::Failed(ref e) = status {
                self.multi.println(format!("failed {entry}: {e}")).ok();
            }
            self.stats().record(&status);
            return;
        }

        let message = format!("{entry}: {}", Self::status_detail(&status));
        match current.as_ref() {
            Some(pb) => pb.set_message(message),
            None => {
                let pb = self.multi.add(indicatif::ProgressBar::new_spinner());
                if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("   {msg}") {
                    pb.set_style(style);
                }
                pb.set_message(message);
                pb.enable_steady_tick(std::time::Duration::from_millis(100));
                *current = Some(pb);
            }
        }
    }

    fn log_info(&self, message: &str) {
        self.multi.println(format!("info: {message}")).ok();
    }

    fn log_warn(&self, message: &str) {
        self.stats().warnings += 1;
        self.multi.println(format!("warning: {message}")).ok();
    }

    fn log_error(&self, message: &str) {
        self.stats().errors += 1;
        self.multi.println(format!("error: {message}")).ok();
    }

    fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(pb) = current.take() {
                pb.finish_and_clear();
            }
        }
        if let Ok(main) = self.main_progress.lock() {
            if let Some(main_pb) = main.as_ref() {
                main_pb.finish_and_clear();
            }
        }
        self.phase_bar.finish_and_clear();
        self.stats().print_summary();
    }
}

/// Picks a reporter based on whether stderr is a terminal.
pub fn create_reporter() -> Arc<dyn ProgressReporter> {
    if console::Term::stderr().is_term() {
        Arc::new(FancyReporter::new())
    } else {
        Arc::new(SimpleReporter::new())
    }
}
