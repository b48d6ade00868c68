//! Error reporting and audit logging.
//!
//! Failures anywhere in a workflow funnel into a [`Report`] sink instead of
//! propagating to the invoking command. The production sink appends to the
//! bot's log file and mirrors through `tracing`; tests substitute recording
//! fakes.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

const BOT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[async_trait]
pub trait Report: Send + Sync {
    /// Records a failure with its kind tag. Never fails outward.
    async fn report(&self, kind: &str, detail: &str);

    /// Appends an audit line, e.g. who alerted whom in which ticket.
    async fn log_message(&self, message: &str);
}

/// File-backed reporter writing to the configured log file.
pub struct FileReporter {
    log_file: PathBuf,
}

impl FileReporter {
    pub fn new(log_file: impl Into<PathBuf>) -> Self {
        Self { log_file: log_file.into() }
    }

    async fn append(&self, line: &str) {
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_file)
                .await?;
            file.write_all(line.as_bytes()).await
        }
        .await;
        if let Err(err) = result {
            error!(path = %self.log_file.display(), error = %err, "failed to write log file");
        }
    }

    fn timestamp() -> String {
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string()
    }
}

#[async_trait]
impl Report for FileReporter {
    async fn report(&self, kind: &str, detail: &str) {
        error!(kind = kind, "{detail}");
        let line = format!(
            "[{}] [Bot v{BOT_VERSION}] [Type: {kind}]\n\n{detail}\n\n",
            Self::timestamp()
        );
        self.append(&line).await;
    }

    async fn log_message(&self, message: &str) {
        info!("{message}");
        let line =
            format!("[{}] [Bot v{BOT_VERSION}] [LOG] {message}\n\n", Self::timestamp());
        self.append(&line).await;
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every report and audit line for assertions.
    #[derive(Default)]
    pub struct RecordingReporter {
        pub reports: Mutex<Vec<(String, String)>>,
        pub audit: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Report for RecordingReporter {
        async fn report(&self, kind: &str, detail: &str) {
            self.reports.lock().unwrap().push((kind.to_string(), detail.to_string()));
        }

        async fn log_message(&self, message: &str) {
            self.audit.lock().unwrap().push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_and_audit_lines_append_to_the_log_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs.txt");
        let reporter = FileReporter::new(&path);

        reporter.report("ERROR", "failed to DM user#1").await;
        reporter.log_message("staff#1 sent an alert to user#1 in the ticket #t-1").await;

        let contents = std::fs::read_to_string(&path).expect("log file");
        assert!(contents.contains("[Type: ERROR]"));
        assert!(contents.contains("failed to DM user#1"));
        assert!(contents.contains("[LOG] staff#1 sent an alert to user#1 in the ticket #t-1"));
    }

    #[tokio::test]
    async fn unwritable_log_file_is_swallowed() {
        let reporter = FileReporter::new("/nonexistent-dir/logs.txt");
        // Must not panic or propagate.
        reporter.report("ERROR", "detail").await;
    }
}
