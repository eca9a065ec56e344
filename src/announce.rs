//! Spoken output for agent answers
//!
//! Speech is a nice-to-have. When no speech program is installed the
//! announcer does nothing, and it never reports an error to the caller.

use crate::util::command_on_path;
use std::process::{Command, Stdio};

/// Programs tried in order; each takes the text as its last argument.
const SPEECH_PROGRAMS: &[&str] = &["espeak-ng", "espeak", "say"];

pub trait Announcer {
    fn announce(&self, text: &str);
}

/// Announcer for headless runs and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Announcer for Silent {
    fn announce(&self, _text: &str) {}
}

#[derive(Debug, Clone, Default)]
pub struct SpeechAnnouncer {
    program: Option<&'static str>,
}

impl SpeechAnnouncer {
    /// Pick the first speech program on `PATH`, if any.
    pub fn detect() -> Self {
        let program = SPEECH_PROGRAMS.iter().copied().find(|p| command_on_path(p));
        match program {
            Some(p) => tracing::debug!("speech output via {}", p),
            None => tracing::debug!("no speech program found; announcements are silent"),
        }
        Self { program }
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }
}

impl Announcer for SpeechAnnouncer {
    fn announce(&self, text: &str) {
        let Some(program) = self.program else {
            return;
        };
        let spoken = speakable(text);
        if spoken.is_empty() {
            return;
        }
        let status = Command::new(program)
            .arg(&spoken)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(err) = status {
            tracing::debug!("speech output failed: {}", err);
        }
    }
}

/// Drop status glyphs so the synthesizer doesn't read them out.
fn speakable(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || c.is_ascii_punctuation() || *c == '°')
        .collect::<String>()
        .trim()
        .to_string()
}
