//! Options and diagnostics for structural comparison of DCPs
//!
//! Comparison functions take a note sink, `&mut dyn FnMut(NoteType, String)`,
//! and call it once per mismatch as they go. Nothing is buffered: callers that
//! want a report collect the notes themselves, e.g. with [`NoteCollector`].

use std::fmt;

/// Severity of a comparison note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoteType {
    /// Informational; does not affect the comparison result
    Warning,
    /// A mismatch; the comparison result is false
    Error,
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteType::Warning => write!(f, "WARNING"),
            NoteType::Error => write!(f, "ERROR"),
        }
    }
}

/// One emitted diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    pub severity: NoteType,
    pub message: String,
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// The sink every `equals` reports through
pub type NoteHandler<'a> = &'a mut dyn FnMut(NoteType, String);

/// Named tolerances; each one downgrades exactly one mismatch category
/// from ERROR to WARNING
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EqualityOptions {
    /// CPL annotation texts may differ
    pub cpl_names_can_differ: bool,
    /// Essence file names may differ
    pub mxf_names_can_differ: bool,
    /// Essence file digests may differ
    pub digests_can_differ: bool,
    /// Encryption key ids may differ
    pub key_ids_can_differ: bool,
}

impl EqualityOptions {
    /// Parses options from JSON; missing fields keep their defaults
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|e| crate::Error::Options(e.to_string()))
    }
}

/// Reports a difference that `tolerated` may downgrade; returns whether it
/// still counts as a mismatch.
pub(crate) fn report(tolerated: bool, note: NoteHandler<'_>, message: String) -> bool {
    if tolerated {
        note(NoteType::Warning, message);
        false
    } else {
        note(NoteType::Error, message);
        true
    }
}

/// Convenience sink that keeps every note
#[derive(Debug, Default, Clone)]
pub struct NoteCollector {
    pub notes: Vec<Note>,
}

impl NoteCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A closure suitable for passing as a note sink
    pub fn sink(&mut self) -> impl FnMut(NoteType, String) + '_ {
        move |severity, message| self.notes.push(Note { severity, message })
    }

    pub fn errors(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.severity == NoteType::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.severity == NoteType::Warning)
    }
}
