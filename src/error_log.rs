//! Accumulated non-fatal failures of an import run.
//!
//! The importer never clears the log; the caller reads it once the run is over.

use tracing::warn;

use crate::progress::ProgressReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// A record could not be written at all.
    Post,
    PostMeta,
    PostImage,
    CoverImage,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Post => write!(f, "Post"),
            Self::PostMeta => write!(f, "Post Meta"),
            Self::PostImage => write!(f, "Post Image"),
            Self::CoverImage => write!(f, "Cover Image"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub label: Label,
    pub message: String,
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label, self.message)
    }
}

#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Vec<Entry>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: Label, message: impl Into<String>) {
        let message = message.into();
        warn!(%label, detail = %message, "import error");
        self.entries.push(Entry { label, message });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn with_label(&self, label: Label) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(move |entry| entry.label == label)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Forwards every entry to `reporter`. Records that were not written at all are
    /// errors, everything else a warning.
    pub fn report_to(&self, reporter: &dyn ProgressReporter) {
        for entry in &self.entries {
            match entry.label {
                Label::Post => reporter.log_error(&entry.to_string()),
                _ => reporter.log_warn(&entry.to_string()),
            }
        }
    }
}

impl<'a> IntoIterator for &'a ErrorLog {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Append a formatted message to an [`ErrorLog`].
#[macro_export]
macro_rules! log_error {
    ($log:expr, $label:expr, $($arg:tt)*) => {
        $log.push($label, format!($($arg)*))
    };
}
