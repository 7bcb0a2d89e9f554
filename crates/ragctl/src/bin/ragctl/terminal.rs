//! Terminal front end: prompts and progress output

use std::io::IsTerminal;

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};

use ragctl::pipeline::PlannedFile;
use ragctl::{FailureDecision, FileResult, FileStatus, Operator, PipelineRun};

/// Operator backed by the controlling terminal
///
/// Without a terminal on stdin/stdout it never blocks: failures stop the run
/// and retry confirmations are declined.
pub struct TerminalOperator {
    term: Term,
    attended: bool,
    progress: Option<ProgressBar>,
}

impl TerminalOperator {
    pub fn new() -> Self {
        let term = Term::stdout();
        let attended = console::user_attended() && std::io::stdin().is_terminal();
        Self {
            term,
            attended,
            progress: None,
        }
    }

    /// Clear the progress bar once the run is over
    pub fn finish(&mut self) {
        if let Some(progress) = self.progress.take() {
            progress.finish_and_clear();
        }
    }

    fn progress(&mut self, total: usize) -> &ProgressBar {
        let term = &self.term;
        self.progress.get_or_insert_with(|| {
            if !term.is_term() {
                return ProgressBar::hidden();
            }
            let progress = ProgressBar::new(total as u64);
            progress.set_style(
                ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            progress
        })
    }

    /// Print above the progress bar, or plainly when there is none
    fn say(&self, line: String) {
        match &self.progress {
            Some(progress) => progress.suspend(|| println!("{}", line)),
            None => println!("{}", line),
        }
    }

    fn ask(&self, prompt: &str) -> Option<String> {
        let read = || -> std::io::Result<String> {
            self.term.write_str(prompt)?;
            self.term.read_line()
        };
        let answer = match &self.progress {
            Some(progress) => progress.suspend(read),
            None => read(),
        };
        match answer {
            Ok(answer) => Some(answer.trim().to_ascii_lowercase()),
            Err(e) => {
                tracing::warn!("Failed to read answer from terminal: {}", e);
                None
            }
        }
    }
}

impl Default for TerminalOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for TerminalOperator {
    fn decide_after_failure(&mut self, failed: &FileResult, position: usize, total: usize) -> FailureDecision {
        if !self.attended {
            self.say(format!(
                "{} no terminal attached; stopping after failure of {}",
                style("!").yellow(),
                failed.filename
            ));
            return FailureDecision::Stop;
        }

        let remaining = total.saturating_sub(position);
        loop {
            let prompt = format!(
                "{} remaining. [c]ontinue, [s]top, s[k]ip remaining? ",
                remaining
            );
            match self.ask(&prompt).as_deref() {
                Some("c") | Some("continue") => return FailureDecision::Continue,
                Some("s") | Some("stop") | None => return FailureDecision::Stop,
                Some("k") | Some("skip") => return FailureDecision::SkipRest,
                Some(other) => self.say(format!("Unrecognized answer '{}'", other)),
            }
        }
    }

    fn confirm_retry(&mut self, _source: &PipelineRun, candidates: &[FileResult]) -> bool {
        if !self.attended {
            self.say(format!(
                "{} no terminal attached; pass --yes to retry without confirmation",
                style("!").yellow()
            ));
            return false;
        }
        let prompt = format!("Retry {} file(s)? [y/N] ", candidates.len());
        matches!(self.ask(&prompt).as_deref(), Some("y") | Some("yes"))
    }

    fn file_started(&mut self, file: &PlannedFile, _position: usize, total: usize) {
        self.progress(total).set_message(file.filename.clone());
        self.say(format!("Processing: {}", file.filename));
    }

    fn file_finished(&mut self, result: &FileResult, _position: usize, total: usize) {
        let line = match result.status {
            FileStatus::Success => format!(
                "  {} {} ({} chunks, {:.2}s)",
                style("✓").green(),
                result.filename,
                result.chunks_created,
                result.duration
            ),
            FileStatus::Failed => format!(
                "  {} {}: {}",
                style("✗").red(),
                result.filename,
                result.error.as_deref().unwrap_or("unknown error")
            ),
            FileStatus::Skipped | FileStatus::Aborted => format!(
                "  {} {} {}: {}",
                style("-").yellow(),
                result.filename,
                result.status,
                result.reason.as_deref().unwrap_or("")
            ),
        };
        self.say(line);
        self.progress(total).inc(1);
    }

    fn retry_resolved(&mut self, source: &PipelineRun, candidates: &[FileResult]) {
        println!(
            "Found {} file(s) to retry from run {}",
            candidates.len(),
            style(&source.run_id).bold()
        );
        for file in candidates {
            let detail = file
                .error
                .as_deref()
                .or(file.reason.as_deref())
                .unwrap_or("");
            println!("  - {} [{}] {}", file.filename, file.status, detail);
        }
    }
}
