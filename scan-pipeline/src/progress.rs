/// Progress sink collaborator.
///
/// Progress reporting is fire-and-forget: a slow or failing sink must never
/// block or abort processing. Sinks are invoked at stage boundaries and at
/// a bounded frequency inside long loops.
use indicatif::{ProgressBar, ProgressStyle};

/// Receiver for pipeline progress reports.
pub trait ProgressSink: Send + Sync {
    /// Report progress as a fraction in [0, 1] with a stage name and an
    /// optional human-readable message.
    fn report(&self, fraction: f32, stage: &str, message: Option<&str>);
}

/// Sink that discards all reports.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _fraction: f32, _stage: &str, _message: Option<&str>) {}
}

/// Sink wrapping an arbitrary callback.
pub struct CallbackSink {
    callback: Box<dyn Fn(f32, &str, Option<&str>) + Send + Sync>,
}

impl CallbackSink {
    /// Create a sink from the given callback.
    pub fn new(callback: impl Fn(f32, &str, Option<&str>) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl ProgressSink for CallbackSink {
    fn report(&self, fraction: f32, stage: &str, message: Option<&str>) {
        (self.callback)(fraction, stage, message);
    }
}

impl std::fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

/// Terminal progress bar sink for the CLI.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    /// Create a progress bar spanning the whole run.
    pub fn new() -> Self {
        let bar = ProgressBar::new(1000);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {percent}% {msg}")
                .expect("static template is valid")
                .progress_chars("▉▊▋▌▍▎▏ "),
        );
        Self { bar }
    }

    /// Finish the bar with a closing message.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn report(&self, fraction: f32, stage: &str, message: Option<&str>) {
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * 1000.0) as u64);
        match message {
            Some(msg) => self.bar.set_message(format!("{stage}: {msg}")),
            None => self.bar.set_message(stage.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn callback_sink_forwards_reports() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            CallbackSink::new(move |fraction, stage, _| {
                seen.lock().unwrap().push((fraction, stage.to_string()));
            })
        };
        sink.report(0.25, "fusing", None);
        sink.report(1.0, "done", Some("finished"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (0.25, "fusing".to_string()));
    }

    #[test]
    fn null_sink_accepts_anything() {
        NullSink.report(-1.0, "", Some("ignored"));
        NullSink.report(2.0, "stage", None);
    }
}
