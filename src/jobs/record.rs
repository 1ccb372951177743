//! Job records - mutable state of one execution
//!
//! A JobRecord accumulates the program's output while it runs and freezes
//! once it reaches `Completed`. Observers never see the record itself, only
//! a `JobSnapshot` copied out of it.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::JobId;

/// Externally visible status of a job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Process is still alive
    Running,
    /// Process exited or was killed at the time limit
    Completed,
}

/// Lifecycle state of a job record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed {
        exit_code: i32,
        /// Set when the supervisor killed the process at the wall-clock limit
        timed_out: bool,
    },
}

impl JobState {
    /// Check if this state represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::Running => JobStatus::Running,
            Self::Completed { .. } => JobStatus::Completed,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Running => None,
            Self::Completed { exit_code, .. } => Some(*exit_code),
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, Self::Completed { timed_out: true, .. })
    }
}

/// Server-side state of one execution
#[derive(Debug)]
pub struct JobRecord {
    id: JobId,
    output: Vec<u8>,
    state: JobState,
    started_at: DateTime<Utc>,
    started: Instant,
    finished: Option<Instant>,
    truncated: bool,
    max_output_bytes: usize,
}

impl JobRecord {
    /// Create a running record that keeps at most `max_output_bytes` of output
    pub fn new(id: JobId, max_output_bytes: usize) -> Self {
        Self {
            id,
            output: Vec::new(),
            state: JobState::Running,
            started_at: Utc::now(),
            started: Instant::now(),
            finished: None,
            truncated: false,
            max_output_bytes,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Append a chunk of output, returning how many bytes were kept.
    ///
    /// Terminal records are frozen and keep nothing. Bytes past the output
    /// cap are dropped and the record is flagged as truncated.
    pub fn append(&mut self, chunk: &[u8]) -> usize {
        if self.is_terminal() {
            return 0;
        }
        let room = self.max_output_bytes.saturating_sub(self.output.len());
        let kept = chunk.len().min(room);
        self.output.extend_from_slice(&chunk[..kept]);
        if kept < chunk.len() {
            self.truncated = true;
        }
        kept
    }

    /// Transition `Running -> Completed`. Returns false if already terminal.
    pub fn complete(&mut self, exit_code: i32, timed_out: bool) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Completed { exit_code, timed_out };
        self.finished = Some(Instant::now());
        true
    }

    /// Time since start, frozen at completion
    pub fn elapsed(&self) -> Duration {
        match self.finished {
            Some(finished) => finished.duration_since(self.started),
            None => self.started.elapsed(),
        }
    }

    /// Output bytes safe to render now.
    ///
    /// While running, a character split across reads is held back until its
    /// remaining bytes arrive, so each snapshot's text is a prefix of the next.
    fn renderable_output(&self) -> &[u8] {
        if self.is_terminal() {
            &self.output
        } else {
            &self.output[..complete_prefix_len(&self.output)]
        }
    }

    /// Copy the current state out for an observer
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.state.status(),
            output: String::from_utf8_lossy(self.renderable_output()).into_owned(),
            exit_code: self.state.exit_code(),
            elapsed_ms: self.elapsed().as_millis() as u64,
            timed_out: self.state.timed_out(),
            truncated: self.truncated,
            started_at: self.started_at,
        }
    }
}

/// Length of `bytes` without a trailing, not yet complete UTF-8 sequence
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let tail = bytes.len().saturating_sub(3);
    for start in (tail..bytes.len()).rev() {
        let byte = bytes[start];
        if byte & 0xC0 == 0x80 {
            // continuation byte, keep looking for the lead
            continue;
        }
        let needed = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => 1,
        };
        return if bytes.len() - start < needed { start } else { bytes.len() };
    }
    bytes.len()
}

/// Point-in-time copy of a job record, as served to pollers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub output: String,
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub truncated: bool,
    pub started_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
