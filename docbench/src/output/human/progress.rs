use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use docbench_core::runner::{ProgressUpdate, Tick};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Outcome markers kept on the spinner line.
const TICK_WINDOW: usize = 40;

pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        Self {
            inner: Mutex::new(Inner {
                multi,
                bars: HashMap::new(),
            }),
        }
    }

    pub(crate) fn update(&self, u: &ProgressUpdate) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let bar = inner.get_or_create_bar(&u.operation);
        bar.push_tick(u.tick);
        bar.pb.set_message(format!(
            "{} completed={} ok={} errors={}",
            bar.ticks, u.counts.completed, u.counts.successes, u.counts.failures
        ));

        if let Some(n) = u.milestone {
            bar.pb.println(format!("[{}] completed {n} operations", u.operation));
        }
    }

    /// Prints a line above the progress bars (or plainly when none are active).
    pub(crate) fn println(&self, line: String) {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.bars.is_empty() {
            eprintln!("{line}");
        } else {
            let _ = inner.multi.println(line);
        }
    }

    pub(crate) fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for (_, b) in inner.bars.drain() {
            b.pb.finish_and_clear();
        }

        let _ = inner.multi.clear();
    }
}

struct Inner {
    multi: MultiProgress,
    bars: HashMap<String, OperationBar>,
}

impl Inner {
    fn get_or_create_bar(&mut self, operation: &str) -> &mut OperationBar {
        let multi = &self.multi;
        self.bars
            .entry(operation.to_string())
            .or_insert_with(|| {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(spinner_style());
                pb.set_prefix(operation.to_string());
                pb.enable_steady_tick(Duration::from_millis(120));
                OperationBar {
                    pb,
                    ticks: String::with_capacity(TICK_WINDOW),
                }
            })
    }
}

struct OperationBar {
    pb: ProgressBar,
    ticks: String,
}

impl OperationBar {
    fn push_tick(&mut self, tick: Tick) {
        if self.ticks.len() >= TICK_WINDOW {
            self.ticks.remove(0);
        }
        self.ticks.push(tick.symbol());
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
