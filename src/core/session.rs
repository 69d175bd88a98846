//! Per-image session records and generation fencing.
//!
//! [`SessionState`] is the only place accepted results live. Everything that
//! wants to change what a session shows goes through [`SessionState::submit`],
//! which compares the incoming generation with the accepted one so a slow,
//! older encoder run can never replace the output of a newer one.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::core::savings::{savings, Savings};
use crate::core::types::{CompressionResult, Generation, SessionId};
use crate::utils::FormatId;

/// One open image and its accepted result per format.
#[derive(Debug)]
pub struct ImageSession {
    id: SessionId,
    original_path: PathBuf,
    /// File fed to the encoders; the backup once a save replaced the original
    source_path: PathBuf,
    original_size: u64,
    accepted: HashMap<FormatId, CompressionResult>,
    /// Highest generation issued per format, accepted or not
    issued: HashMap<FormatId, Generation>,
}

impl ImageSession {
    fn new(id: SessionId, original_path: PathBuf, original_size: u64) -> Self {
        Self {
            id,
            source_path: original_path.clone(),
            original_path,
            original_size,
            accepted: HashMap::new(),
            issued: HashMap::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    /// What the encoders read. Differs from [`Self::original_path`] after a
    /// save wrote a same-extension output over the original.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Size captured when the session was opened; never changes afterwards.
    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    /// The last accepted result for `format`. Never a pending request.
    pub fn accepted(&self, format: FormatId) -> Option<&CompressionResult> {
        self.accepted.get(&format)
    }

    pub fn accepted_generation(&self, format: FormatId) -> Generation {
        self.accepted
            .get(&format)
            .map(|r| r.generation)
            .unwrap_or_default()
    }

    /// Whether a request newer than the accepted result has been issued.
    pub fn is_pending(&self, format: FormatId) -> bool {
        self.issued
            .get(&format)
            .is_some_and(|g| *g > self.accepted_generation(format))
    }

    pub fn savings(&self, format: FormatId) -> Option<Savings> {
        self.accepted(format)
            .and_then(|r| r.artifact_size())
            .and_then(|size| savings(self.original_size, size))
    }

    fn into_results(self) -> Vec<CompressionResult> {
        self.accepted.into_values().collect()
    }
}

/// What [`SessionState::submit`] did with a result.
#[derive(Debug)]
pub enum Submission {
    /// The result is now authoritative; `superseded` is the one it replaced.
    Accepted { superseded: Option<CompressionResult> },
    /// An equal or newer generation was already accepted.
    Stale(CompressionResult),
    /// The session was closed while the request was in flight.
    UnknownSession(CompressionResult),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The result whose artifact nobody owns any more, if any.
    pub fn into_orphan(self) -> Option<CompressionResult> {
        match self {
            Self::Accepted { superseded } => superseded,
            Self::Stale(result) | Self::UnknownSession(result) => Some(result),
        }
    }
}

/// All open sessions.
#[derive(Debug, Default)]
pub struct SessionState {
    sessions: BTreeMap<SessionId, ImageSession>,
    next_id: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, original_path: PathBuf, original_size: u64) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        debug!("Session {} opened for {} ({} bytes)", id, original_path.display(), original_size);
        self.sessions.insert(id, ImageSession::new(id, original_path, original_size));
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&ImageSession> {
        self.sessions.get(&id)
    }

    /// Records that `generation` was issued for the pair. Returns false when
    /// the session no longer exists.
    pub fn mark_issued(&mut self, id: SessionId, format: FormatId, generation: Generation) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        let issued = session.issued.entry(format).or_default();
        *issued = (*issued).max(generation);
        true
    }

    /// Offers a finished result to the session.
    ///
    /// The result becomes authoritative iff its generation is at least the
    /// accepted one. Otherwise it is handed back so the caller can delete its
    /// artifact.
    pub fn submit(&mut self, id: SessionId, result: CompressionResult) -> Submission {
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!("Result {} for closed session {} dropped", result.generation, id);
            return Submission::UnknownSession(result);
        };

        let format = result.format;
        let current = session.accepted_generation(format);
        if result.generation < current {
            debug!(
                "Session {} {}: stale {} rejected (accepted {})",
                id, format, result.generation, current
            );
            return Submission::Stale(result);
        }

        debug!("Session {} {}: {} accepted", id, format, result.generation);
        let issued = session.issued.entry(format).or_default();
        *issued = (*issued).max(result.generation);
        let superseded = session.accepted.insert(format, result);
        Submission::Accepted { superseded }
    }

    /// Points the encoders at `source` from now on. Returns false when the
    /// session no longer exists.
    pub fn redirect_source(&mut self, id: SessionId, source: PathBuf) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        debug!("Session {} now reads {}", id, source.display());
        session.source_path = source;
        true
    }

    /// Removes the session, returning its accepted results for cleanup.
    pub fn close(&mut self, id: SessionId) -> Option<Vec<CompressionResult>> {
        self.sessions.remove(&id).map(ImageSession::into_results)
    }

    /// Removes every session, returning all accepted results.
    pub fn drain(&mut self) -> Vec<CompressionResult> {
        std::mem::take(&mut self.sessions)
            .into_values()
            .flat_map(ImageSession::into_results)
            .collect()
    }

    pub fn snapshot(&self, id: SessionId) -> Option<SessionSnapshot> {
        let session = self.sessions.get(&id)?;
        let formats = FormatId::ALL
            .iter()
            .map(|&format| FormatSnapshot {
                format,
                result: session.accepted(format).cloned(),
                savings: session.savings(format),
                pending: session.is_pending(format),
            })
            .collect();
        Some(SessionSnapshot {
            id,
            original_path: session.original_path.clone(),
            original_size: session.original_size,
            formats,
        })
    }
}

/// Read-only view of a session for a display layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub original_path: PathBuf,
    pub original_size: u64,
    pub formats: Vec<FormatSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatSnapshot {
    pub format: FormatId,
    pub result: Option<CompressionResult>,
    pub savings: Option<Savings>,
    /// A newer request is in flight or waiting for its timer
    pub pending: bool,
}

impl SessionSnapshot {
    pub fn format(&self, format: FormatId) -> Option<&FormatSnapshot> {
        self.formats.iter().find(|f| f.format == format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Artifact, CjpegParams, EncoderParameters};

    fn jpeg_result(generation: u64, size: u64) -> CompressionResult {
        CompressionResult::succeeded(
            EncoderParameters::Jpeg(CjpegParams { quality: 80 }),
            Generation(generation),
            Artifact { path: PathBuf::from(format!("/tmp/g{generation}.jpg")), size },
        )
    }

    #[test]
    fn newer_generation_wins_regardless_of_completion_order() {
        let mut state = SessionState::new();
        let id = state.open(PathBuf::from("/img/photo.png"), 1000);

        // g2 completes first, then the slower g1
        assert!(state.submit(id, jpeg_result(2, 400)).is_accepted());
        let late = state.submit(id, jpeg_result(1, 900));
        assert!(matches!(late, Submission::Stale(ref r) if r.generation == Generation(1)));

        let accepted = state.get(id).unwrap().accepted(FormatId::Jpeg).unwrap();
        assert_eq!(accepted.generation, Generation(2));
        assert_eq!(accepted.artifact_size(), Some(400));
    }

    #[test]
    fn in_order_completion_supersedes_previous() {
        let mut state = SessionState::new();
        let id = state.open(PathBuf::from("/img/photo.png"), 1000);

        assert!(state.submit(id, jpeg_result(1, 900)).is_accepted());
        match state.submit(id, jpeg_result(2, 400)) {
            Submission::Accepted { superseded: Some(old) } => {
                assert_eq!(old.generation, Generation(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failures_advance_the_fence() {
        let mut state = SessionState::new();
        let id = state.open(PathBuf::from("/img/photo.png"), 1000);
        let failed = CompressionResult::failed(
            EncoderParameters::Jpeg(CjpegParams { quality: 80 }),
            Generation(3),
            "exit status 1",
        );
        assert!(state.submit(id, failed).is_accepted());
        assert!(!state.submit(id, jpeg_result(2, 100)).is_accepted());
        assert_eq!(state.get(id).unwrap().savings(FormatId::Jpeg), None);
    }

    #[test]
    fn pending_tracks_issued_generations() {
        let mut state = SessionState::new();
        let id = state.open(PathBuf::from("/img/photo.png"), 1000);
        assert!(!state.get(id).unwrap().is_pending(FormatId::Jpeg));

        assert!(state.mark_issued(id, FormatId::Jpeg, Generation(1)));
        assert!(state.get(id).unwrap().is_pending(FormatId::Jpeg));
        // reads never see the pending request
        assert!(state.get(id).unwrap().accepted(FormatId::Jpeg).is_none());

        state.submit(id, jpeg_result(1, 500));
        let session = state.get(id).unwrap();
        assert!(!session.is_pending(FormatId::Jpeg));
        assert_eq!(session.savings(FormatId::Jpeg).unwrap().percent(), 50.0);
    }

    #[test]
    fn results_for_closed_sessions_are_returned() {
        let mut state = SessionState::new();
        let id = state.open(PathBuf::from("/img/photo.png"), 1000);
        state.submit(id, jpeg_result(1, 500));

        let closed = state.close(id).unwrap();
        assert_eq!(closed.len(), 1);
        assert!(!state.mark_issued(id, FormatId::Jpeg, Generation(2)));
        let orphan = state.submit(id, jpeg_result(2, 300)).into_orphan().unwrap();
        assert_eq!(orphan.generation, Generation(2));
    }

    #[test]
    fn redirected_source_keeps_the_original_path() {
        let mut state = SessionState::new();
        let id = state.open(PathBuf::from("/img/photo.jpg"), 1000);
        assert_eq!(state.get(id).unwrap().source_path(), Path::new("/img/photo.jpg"));

        assert!(state.redirect_source(id, PathBuf::from("/img/photo.original.jpg")));
        let session = state.get(id).unwrap();
        assert_eq!(session.source_path(), Path::new("/img/photo.original.jpg"));
        assert_eq!(session.original_path(), Path::new("/img/photo.jpg"));
        assert_eq!(session.original_size(), 1000);

        state.close(id);
        assert!(!state.redirect_source(id, PathBuf::from("/elsewhere.jpg")));
    }

    #[test]
    fn snapshot_lists_every_format() {
        let mut state = SessionState::new();
        let id = state.open(PathBuf::from("/img/photo.png"), 1000);
        state.submit(id, jpeg_result(1, 1200));
        let snapshot = state.snapshot(id).unwrap();
        assert_eq!(snapshot.formats.len(), 3);
        let jpeg = snapshot.format(FormatId::Jpeg).unwrap();
        assert!(jpeg.savings.unwrap().warning);
        assert!(snapshot.format(FormatId::Png).unwrap().result.is_none());
    }
}
