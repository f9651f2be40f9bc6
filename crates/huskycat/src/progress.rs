//! Live per-tool progress panel.
//!
//! Worker threads report transitions through [`ProgressDisplay::update_tool`];
//! a background tick repaints at 10 Hz. Off a TTY the display degrades to
//! one plain line per transition and never emits cursor control. Teardown is
//! guaranteed: `stop` is idempotent and `Drop` calls it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Repaints per second for the TTY panel.
pub const REFRESH_RATE_HZ: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl ToolState {
    fn glyph(&self) -> &'static str {
        match self {
            ToolState::Pending => "·",
            ToolState::Running => "▶",
            ToolState::Success => "✓",
            ToolState::Failed => "✗",
            ToolState::Skipped => "-",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ToolState::Pending => "pending",
            ToolState::Running => "running",
            ToolState::Success => "success",
            ToolState::Failed => "failed",
            ToolState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolState::Success | ToolState::Failed | ToolState::Skipped)
    }
}

#[derive(Debug, Clone)]
struct ToolRow {
    state: ToolState,
    started: Option<Instant>,
    duration: Option<Duration>,
    errors: usize,
    warnings: usize,
    files_processed: usize,
}

impl ToolRow {
    fn new() -> Self {
        Self {
            state: ToolState::Pending,
            started: None,
            duration: None,
            errors: 0,
            warnings: 0,
            files_processed: 0,
        }
    }

    fn render(&self, name: &str) -> String {
        let mut line = format!("{} {:<16} {}", self.state.glyph(), name, self.state.label());
        if self.errors > 0 || self.warnings > 0 {
            line.push_str(&format!(" ({} errors, {} warnings)", self.errors, self.warnings));
        }
        if self.files_processed > 0 {
            line.push_str(&format!(" [{} files]", self.files_processed));
        }
        if let Some(duration) = self.duration {
            line.push_str(&format!(" {:.1}s", duration.as_secs_f64()));
        }
        line
    }
}

struct Panel {
    multi: MultiProgress,
    bars: BTreeMap<String, ProgressBar>,
}

pub struct ProgressDisplay {
    rows: Arc<Mutex<BTreeMap<String, ToolRow>>>,
    panel: Option<Panel>,
    is_tty: bool,
    stop_flag: Arc<AtomicBool>,
    refresh: Option<thread::JoinHandle<()>>,
    stopped: bool,
}

impl ProgressDisplay {
    /// TTY state is probed once here and cached.
    pub fn new() -> Self {
        Self::with_tty(atty::is(atty::Stream::Stdout))
    }

    /// Force the line-based fallback; used off-TTY and in tests.
    pub fn silent() -> Self {
        Self::with_tty(false)
    }

    fn with_tty(is_tty: bool) -> Self {
        Self {
            rows: Arc::new(Mutex::new(BTreeMap::new())),
            panel: None,
            is_tty,
            stop_flag: Arc::new(AtomicBool::new(false)),
            refresh: None,
            stopped: false,
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Allocate one row per tool and start the refresh tick.
    pub fn start(&mut self, tool_names: &[String]) {
        {
            let mut rows = self.rows.lock().expect("rows lock");
            for name in tool_names {
                rows.insert(name.clone(), ToolRow::new());
            }
        }

        if !self.is_tty {
            return;
        }

        let multi = MultiProgress::new();
        let style = ProgressStyle::default_spinner()
            .template("{msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let mut bars = BTreeMap::new();
        for name in tool_names {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(style.clone());
            bar.set_message(ToolRow::new().render(name));
            bars.insert(name.clone(), bar);
        }

        let rows = Arc::clone(&self.rows);
        let stop_flag = Arc::clone(&self.stop_flag);
        let tick_bars: Vec<(String, ProgressBar)> =
            bars.iter().map(|(n, b)| (n.clone(), b.clone())).collect();

        self.refresh = Some(thread::spawn(move || {
            let tick = Duration::from_millis(1000 / REFRESH_RATE_HZ);
            while !stop_flag.load(Ordering::SeqCst) {
                {
                    let rows = rows.lock().expect("rows lock");
                    for (name, bar) in &tick_bars {
                        if let Some(row) = rows.get(name) {
                            bar.set_message(row.render(name));
                        }
                    }
                }
                thread::sleep(tick);
            }
        }));

        self.panel = Some(Panel { multi, bars });
    }

    /// Thread-safe status update from worker threads.
    pub fn update_tool(
        &self,
        name: &str,
        state: ToolState,
        errors: Option<usize>,
        warnings: Option<usize>,
        files_processed: Option<usize>,
    ) {
        let rendered = {
            let mut rows = self.rows.lock().expect("rows lock");
            let row = rows.entry(name.to_string()).or_insert_with(ToolRow::new);

            // Transitions are monotone: a terminal state never regresses.
            if row.state.is_terminal() && !state.is_terminal() {
                return;
            }

            match state {
                ToolState::Running if row.started.is_none() => row.started = Some(Instant::now()),
                s if s.is_terminal() => {
                    row.duration = row.started.map(|t| t.elapsed());
                }
                _ => {}
            }
            row.state = state;
            if let Some(errors) = errors {
                row.errors = errors;
            }
            if let Some(warnings) = warnings {
                row.warnings = warnings;
            }
            if let Some(files) = files_processed {
                row.files_processed = files;
            }
            row.render(name)
        };

        if !self.is_tty {
            // One plain line per transition, no cursor control.
            eprintln!("{rendered}");
        }
    }

    pub fn snapshot(&self, name: &str) -> Option<(ToolState, usize, usize)> {
        let rows = self.rows.lock().expect("rows lock");
        rows.get(name).map(|row| (row.state, row.errors, row.warnings))
    }

    /// Mandatory teardown: stops the refresh thread, finishes the bars, and
    /// restores the terminal. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.refresh.take() {
            let _ = handle.join();
        }

        if let Some(panel) = self.panel.take() {
            let rows = self.rows.lock().expect("rows lock");
            for (name, bar) in &panel.bars {
                if let Some(row) = rows.get(name) {
                    bar.finish_with_message(row.render(name));
                } else {
                    bar.finish();
                }
            }
            let _ = panel.multi.clear();
        }
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_track_state_and_counts() {
        let mut display = ProgressDisplay::silent();
        display.start(&["black".to_string(), "ruff".to_string()]);

        display.update_tool("black", ToolState::Running, None, None, None);
        display.update_tool("black", ToolState::Success, Some(0), Some(2), Some(3));

        let (state, errors, warnings) = display.snapshot("black").expect("row");
        assert_eq!(state, ToolState::Success);
        assert_eq!(errors, 0);
        assert_eq!(warnings, 2);

        let (state, _, _) = display.snapshot("ruff").expect("row");
        assert_eq!(state, ToolState::Pending);
        display.stop();
    }

    #[test]
    fn terminal_states_never_regress() {
        let mut display = ProgressDisplay::silent();
        display.start(&["mypy".to_string()]);

        display.update_tool("mypy", ToolState::Failed, Some(4), None, None);
        display.update_tool("mypy", ToolState::Running, None, None, None);

        let (state, errors, _) = display.snapshot("mypy").expect("row");
        assert_eq!(state, ToolState::Failed);
        assert_eq!(errors, 4);
        display.stop();
    }

    #[test]
    fn updates_from_worker_threads_serialize() {
        let mut display = ProgressDisplay::silent();
        let names: Vec<String> = (0..4).map(|i| format!("t{i}")).collect();
        display.start(&names);

        let display = Arc::new(display);
        let mut handles = Vec::new();
        for name in &names {
            let display = Arc::clone(&display);
            let name = name.clone();
            handles.push(thread::spawn(move || {
                display.update_tool(&name, ToolState::Running, None, None, None);
                display.update_tool(&name, ToolState::Success, Some(0), Some(0), Some(1));
            }));
        }
        for handle in handles {
            handle.join().expect("join");
        }

        for name in &names {
            let (state, _, _) = display.snapshot(name).expect("row");
            assert_eq!(state, ToolState::Success);
        }
    }

    #[test]
    fn stop_is_idempotent_and_drop_safe() {
        let mut display = ProgressDisplay::silent();
        display.start(&["black".to_string()]);
        display.stop();
        display.stop();
        // Drop after stop must not panic.
        drop(display);
    }

    #[test]
    fn rendering_includes_counts_and_files() {
        let mut row = ToolRow::new();
        row.state = ToolState::Failed;
        row.errors = 2;
        row.warnings = 1;
        row.files_processed = 5;
        let line = row.render("ruff");
        assert!(line.contains("ruff"));
        assert!(line.contains("failed"));
        assert!(line.contains("2 errors"));
        assert!(line.contains("5 files"));
    }
}
