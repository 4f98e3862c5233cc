use indicatif::{ProgressBar, ProgressStyle};

/// Receives one tick per item taken off the queue
pub trait Progress: Send + Sync {
    fn tick(&self);
    fn finish(&self) {}
}

const PB_STYLE: &str =
    "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({per_sec}, {eta})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

/// Terminal progress bar
pub struct ProgressTracker {
    pub pb: ProgressBar,
}

impl ProgressTracker {
    pub fn new(len: u64) -> Self {
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template(PB_STYLE) {
            pb.set_style(style.tick_chars(TICK).progress_chars(PB_CHARS));
        }
        Self { pb }
    }
}

impl Progress for ProgressTracker {
    fn tick(&self) {
        self.pb.inc(1);
    }

    fn finish(&self) {
        self.pb.finish();
    }
}

/// Discards ticks
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn tick(&self) {}
}
