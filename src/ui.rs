use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::pipeline::{Progress, ProgressStage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    /// Progress display for one analysis job. Finishes on drop.
    pub fn job(&self, video_id: &str) -> JobProgress {
        let bar = if self.use_pretty() {
            let bar = ProgressBar::new(100);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} [{bar:30}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_message(format!("video {video_id}"));
            Some(bar)
        } else {
            eprintln!("==> analysing video {}", video_id);
            None
        };
        JobProgress {
            video_id: video_id.to_string(),
            start: Instant::now(),
            bar,
            last_stage: None,
        }
    }
}

pub struct JobProgress {
    video_id: String,
    start: Instant,
    bar: Option<ProgressBar>,
    last_stage: Option<ProgressStage>,
}

impl JobProgress {
    pub fn update(&mut self, progress: &Progress) {
        match &self.bar {
            Some(bar) => {
                bar.set_position(progress.percent as u64);
                bar.set_message(format!("{:?}: {}", progress.stage, progress.detail));
            }
            None if self.last_stage != Some(progress.stage) => {
                eprintln!("    {:>3}% {}", progress.percent, progress.detail);
            }
            None => {}
        }
        self.last_stage = Some(progress.stage);
    }
}

impl Drop for JobProgress {
    fn drop(&mut self) {
        let finished = self.last_stage == Some(ProgressStage::Done);
        let mark = if finished { "✔" } else { "✘" };
        let message = format!(
            "{} video {} ({})",
            mark,
            self.video_id,
            format_duration(self.start.elapsed())
        );
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
