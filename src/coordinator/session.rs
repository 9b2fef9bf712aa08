//! Recording session state
//!
//! The session is plain data mutated only by the coordinator. Every
//! transition is checked here so the guard table lives in one place.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{CoordinatorError, StatusSnapshot};
use crate::capture::CaptureOptions;

/// Source of wall-clock time, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Recording,
    Paused,
}

/// The single authoritative recording session
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    status: SessionStatus,
    start_time: Option<DateTime<Utc>>,
    /// Time spent in completed pauses
    paused_total: Duration,
    /// Start of the pause in progress, if any
    paused_at: Option<DateTime<Utc>>,
    options: Option<CaptureOptions>,
    /// Bumped on every start so late rollbacks can tell sessions apart
    generation: u64,
    /// The start command went out to the capture surface
    capture_started: bool,
}

/// Timing of a session that was stopped, captured at the moment of stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSession {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub paused_secs: u64,
    pub duration_secs: u64,
    pub options: CaptureOptions,
}

impl RecordingSession {
    #[cfg(test)]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[cfg(test)]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.status != SessionStatus::Idle
    }

    /// The session started as `generation` is still the live one
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.is_active()
    }

    /// Whether the capture surface was told to start this session
    pub fn capture_started(&self) -> bool {
        self.capture_started
    }

    /// Record that the start command is going out. Returns false when the
    /// session was stopped or replaced while the surface was being prepared.
    pub fn mark_capture_started(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.capture_started = true;
        true
    }

    /// Accept a start request. Returns the generation of the new session.
    pub fn begin(
        &mut self,
        options: CaptureOptions,
        now: DateTime<Utc>,
    ) -> Result<u64, CoordinatorError> {
        if !options.has_source() {
            return Err(CoordinatorError::InvalidOptions);
        }
        if self.is_active() {
            return Err(CoordinatorError::AlreadyRecording);
        }

        let generation = self.generation.wrapping_add(1);
        *self = RecordingSession {
            status: SessionStatus::Recording,
            start_time: Some(now),
            paused_total: Duration::zero(),
            paused_at: None,
            options: Some(options),
            generation,
            capture_started: false,
        };
        Ok(generation)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<u64, CoordinatorError> {
        match self.status {
            SessionStatus::Idle => Err(CoordinatorError::NoActiveRecording),
            SessionStatus::Paused => Err(CoordinatorError::AlreadyPaused),
            SessionStatus::Recording => {
                self.status = SessionStatus::Paused;
                self.paused_at = Some(now);
                Ok(self.generation)
            }
        }
    }

    /// Accept a resume. Returns the generation and the length of the pause
    /// that just ended, so a failed resume can be undone.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(u64, Duration), CoordinatorError> {
        match self.status {
            SessionStatus::Idle => Err(CoordinatorError::NoActiveRecording),
            SessionStatus::Recording => Err(CoordinatorError::NotPaused),
            SessionStatus::Paused => {
                let segment = self
                    .paused_at
                    .map(|at| non_negative(now - at))
                    .unwrap_or_else(Duration::zero);
                self.paused_total = self.paused_total + segment;
                self.paused_at = None;
                self.status = SessionStatus::Recording;
                Ok((self.generation, segment))
            }
        }
    }

    /// Undo an accepted pause whose capture command failed
    pub fn undo_pause(&mut self, generation: u64) {
        if self.generation == generation && self.status == SessionStatus::Paused {
            self.status = SessionStatus::Recording;
            self.paused_at = None;
        }
    }

    /// Undo an accepted resume whose capture command failed
    pub fn undo_resume(&mut self, generation: u64, segment: Duration, paused_at: DateTime<Utc>) {
        if self.generation == generation && self.status == SessionStatus::Recording {
            self.status = SessionStatus::Paused;
            self.paused_total = non_negative(self.paused_total - segment);
            self.paused_at = Some(paused_at);
        }
    }

    /// Stop the session, returning its final timing. The session is reset.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<FinishedSession, CoordinatorError> {
        let start_time = match (self.status, self.start_time) {
            (SessionStatus::Idle, _) | (_, None) => {
                return Err(CoordinatorError::NoActiveRecording)
            }
            (_, Some(start_time)) => start_time,
        };

        let paused = self.paused_duration(now);
        let finished = FinishedSession {
            start_time,
            end_time: now,
            paused_secs: paused.num_seconds().max(0) as u64,
            duration_secs: self.elapsed_secs(now),
            options: self.options.clone().unwrap_or_default(),
        };

        self.reset();
        Ok(finished)
    }

    /// Return to idle, keeping the generation counter
    pub fn reset(&mut self) {
        let generation = self.generation;
        *self = RecordingSession {
            generation,
            ..RecordingSession::default()
        };
    }

    /// Roll back a start that could not reach the capture surface.
    /// Returns false when the session has moved on since.
    pub fn rollback(&mut self, generation: u64) -> bool {
        if self.is_current(generation) {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Total paused time, including a pause still in progress
    fn paused_duration(&self, now: DateTime<Utc>) -> Duration {
        let current = self
            .paused_at
            .map(|at| non_negative(now - at))
            .unwrap_or_else(Duration::zero);
        self.paused_total + current
    }

    /// Effective recorded seconds: wall-clock time minus paused time
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        let Some(start) = self.start_time else {
            return 0;
        };
        let effective = non_negative(now - start) - self.paused_duration(now);
        effective.num_seconds().max(0) as u64
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> StatusSnapshot {
        StatusSnapshot {
            is_recording: self.is_active(),
            is_paused: self.status == SessionStatus::Paused,
            start_time: self.start_time,
            duration: self.elapsed_secs(now),
        }
    }

    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        self.paused_at
    }
}

fn non_negative(d: Duration) -> Duration {
    if d < Duration::zero() {
        Duration::zero()
    } else {
        d
    }
}
