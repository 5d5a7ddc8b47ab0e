// src/arena/mod.rs
//! Medical arena: a doctor/resident debate streamed from the inference service
//! and collected into a transcript.

pub mod client;
pub mod consumer;
pub mod decode;
pub mod frame;

use serde::{Deserialize, Serialize};

pub use client::{DebateClient, DebateRequest};
pub use consumer::{DebateOutcome, StreamConsumer, Termination};

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// Leads the diagnosis.
    Doctor,
    /// Challenges the doctor.
    Resident,
    /// The case being discussed.
    Patient,
}

impl SpeakerRole {
    pub const ALL: [SpeakerRole; 3] = [
        SpeakerRole::Doctor,
        SpeakerRole::Resident,
        SpeakerRole::Patient,
    ];

    /// Parse the role string sent by the debate service (case-insensitive).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doctor" => Some(SpeakerRole::Doctor),
            "resident" => Some(SpeakerRole::Resident),
            "patient" => Some(SpeakerRole::Patient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Doctor => "doctor",
            SpeakerRole::Resident => "resident",
            SpeakerRole::Patient => "patient",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateTurn {
    pub role: SpeakerRole,
    pub name: String,
    pub content: String,
}

/// Turns of one debate session in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<DebateTurn>,
}

/// Three-column view of a transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleColumns {
    pub doctor: Vec<DebateTurn>,
    pub resident: Vec<DebateTurn>,
    pub patient: Vec<DebateTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: DebateTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[DebateTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop all turns, e.g. when a new session starts on the same transcript.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Turns spoken by `role`, in transcript order.
    pub fn by_role(&self, role: SpeakerRole) -> impl Iterator<Item = &DebateTurn> + '_ {
        self.turns.iter().filter(move |t| t.role == role)
    }

    pub fn partition(&self) -> RoleColumns {
        let column = |role| self.by_role(role).cloned().collect::<Vec<_>>();
        RoleColumns {
            doctor: column(SpeakerRole::Doctor),
            resident: column(SpeakerRole::Resident),
            patient: column(SpeakerRole::Patient),
        }
    }

    pub fn into_turns(self) -> Vec<DebateTurn> {
        self.turns
    }
}
