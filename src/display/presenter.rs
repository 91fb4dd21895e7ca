//! Status screen rendering.
//!
//! The presenter is a write-only sink for the door core: it formats the
//! latest reading, the connectivity flags and the last accepted command into
//! text lines and hands them to a [`DisplaySink`]. Nothing flows back.

use crate::sensors::DistanceSample;
use log::debug;

/// Display backend accepting pre-rendered text lines.
///
/// Implementations are best-effort and swallow their own failures.
pub trait DisplaySink {
    fn show(&mut self, lines: &[String]);
}

/// Everything shown on the status screen.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSnapshot<'a> {
    pub sample: Option<DistanceSample>,
    pub link_up: bool,
    pub session_up: bool,
    pub last_command: Option<&'a str>,
}

pub struct StatusPresenter<D: DisplaySink> {
    sink: D,
    title: String,
}

impl<D: DisplaySink> StatusPresenter<D> {
    /// `title` heads the screen; the device shows its telemetry topic there.
    pub fn new(sink: D, title: impl Into<String>) -> Self {
        Self {
            sink,
            title: title.into(),
        }
    }

    pub fn present(&mut self, status: &StatusSnapshot<'_>) {
        let lines = self.render(status);
        self.sink.show(&lines);
    }

    pub fn render(&self, status: &StatusSnapshot<'_>) -> Vec<String> {
        let distance = match status.sample {
            Some(sample) => format!("{} mm", sample.distance_mm),
            None => "--- mm".to_string(),
        };

        vec![
            self.title.clone(),
            distance,
            format!("Wifi: {}", u8::from(status.link_up)),
            format!("MQTT: {}", u8::from(status.session_up)),
            format!("Cmd: {}", status.last_command.unwrap_or("-")),
        ]
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }
}

/// Display sink that writes frames to the log.
///
/// Identical consecutive frames are not repeated.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last_frame: Vec<String>,
}

impl DisplaySink for LogDisplay {
    fn show(&mut self, lines: &[String]) {
        if self.last_frame == lines {
            return;
        }
        debug!("[Display] {}", lines.join(" | "));
        self.last_frame = lines.to_vec();
    }
}
