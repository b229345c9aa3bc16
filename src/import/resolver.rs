// Path resolution against the destination catalog
// Priority match: exact path first, basename suffix only when the exact match misses.

use serde::Serialize;

use crate::config::TieBreak;
use crate::constants::PATH_SEPARATORS;
use crate::db::schema::{RecordCandidate, RecordId};
use crate::db::DestinationStore;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResolutionOutcome {
    Resolved(RecordId),
    Unresolved(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Suffix,
}

/// Outcome of one lookup plus how it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub outcome: ResolutionOutcome,
    /// Set for resolved paths.
    pub method: Option<MatchMethod>,
    /// Number of suffix candidates considered (0 when the exact match hit).
    pub candidates: usize,
}

impl Resolution {
    fn resolved(id: RecordId, method: MatchMethod, candidates: usize) -> Self {
        Self { outcome: ResolutionOutcome::Resolved(id), method: Some(method), candidates }
    }

    fn unresolved(path: &str, candidates: usize) -> Self {
        Self { outcome: ResolutionOutcome::Unresolved(path.to_string()), method: None, candidates }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        match self.outcome {
            ResolutionOutcome::Resolved(id) => Some(id),
            ResolutionOutcome::Unresolved(_) => None,
        }
    }

    /// More than one suffix candidate shared the basename.
    pub fn is_ambiguous(&self) -> bool {
        self.candidates > 1
    }
}

pub struct PathResolver<'s, S: DestinationStore + ?Sized> {
    store: &'s S,
    tie_break: TieBreak,
}

impl<'s, S: DestinationStore + ?Sized> PathResolver<'s, S> {
    pub fn new(store: &'s S, tie_break: TieBreak) -> Self {
        Self { store, tie_break }
    }

    pub fn resolve(&self, path: &str) -> Result<Resolution> {
        if path.is_empty() {
            return Ok(Resolution::unresolved(path, 0));
        }

        if let Some(id) = self.store.find_record_by_exact_path(path)? {
            return Ok(Resolution::resolved(id, MatchMethod::Exact, 0));
        }

        let basename = match final_segment(path) {
            Some(b) => b,
            None => return Ok(Resolution::unresolved(path, 0)),
        };

        let candidates = self.store.find_records_by_basename(basename)?;
        match pick_candidate(&candidates, self.tie_break) {
            Some(id) => Ok(Resolution::resolved(id, MatchMethod::Suffix, candidates.len())),
            None => Ok(Resolution::unresolved(path, candidates.len())),
        }
    }
}

/// Last path segment, treating both `/` and `\` as separators. None for a trailing separator.
pub fn final_segment(path: &str) -> Option<&str> {
    path.rsplit(PATH_SEPARATORS).next().filter(|s| !s.is_empty())
}

fn pick_candidate(candidates: &[RecordCandidate], tie_break: TieBreak) -> Option<RecordId> {
    if candidates.len() <= 1 {
        return candidates.first().map(|c| c.id);
    }

    match tie_break {
        TieBreak::LowestId => candidates.iter().map(|c| c.id).min(),
        TieBreak::ShortestPath => candidates
            .iter()
            .min_by_key(|c| (c.path.len(), c.id))
            .map(|c| c.id),
        TieBreak::MostRecent => candidates
            .iter()
            .min_by(|a, b| {
                // Later mtime first; None sorts after any timestamp.
                match (&a.mtime, &b.mtime) {
                    (Some(x), Some(y)) => y.cmp(x),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then(a.id.cmp(&b.id))
            })
            .map(|c| c.id),
        TieBreak::Reject => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::db::schema::insert_media_item;
    use crate::db::{AccessMode, SqliteDestination};
    use rusqlite::Connection;
    use std::path::PathBuf;

    fn destination(items: &[(&str, Option<&str>)]) -> SqliteDestination {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        for (path, mtime) in items {
            insert_media_item(&conn, path, *mtime).unwrap();
        }
        SqliteDestination::from_connection(conn, AccessMode::ReadWrite, PathBuf::from(":memory:")).unwrap()
    }

    fn candidate(id: RecordId, path: &str, mtime: Option<&str>) -> RecordCandidate {
        RecordCandidate { id, path: path.to_string(), mtime: mtime.map(str::to_string) }
    }

    #[test]
    fn test_final_segment() {
        assert_eq!(final_segment("/src/movies/a.mkv"), Some("a.mkv"));
        assert_eq!(final_segment("C:\\Media\\Show\\ep01.mkv"), Some("ep01.mkv"));
        assert_eq!(final_segment("a.mkv"), Some("a.mkv"));
        assert_eq!(final_segment("/src/movies/"), None);
        assert_eq!(final_segment(""), None);
    }

    #[test]
    fn test_suffix_match_is_plain_string_suffix() {
        // The filename fallback favors recall: any path ending in the basename qualifies.
        let mut dest = destination(&[("/library/show/xep01.mkv", None)]);
        let session = dest.begin().unwrap();
        let resolver = PathResolver::new(&session, TieBreak::LowestId);

        let resolution = resolver.resolve("/mnt/ep01.mkv").unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Resolved(1));
        assert_eq!(resolution.method, Some(MatchMethod::Suffix));
    }

    #[test]
    fn test_suffix_match_is_case_sensitive() {
        let mut dest = destination(&[("/library/show/EP01.MKV", None)]);
        let session = dest.begin().unwrap();
        let resolver = PathResolver::new(&session, TieBreak::LowestId);

        let resolution = resolver.resolve("/mnt/ep01.mkv").unwrap();
        assert_eq!(resolution.record_id(), None);
        assert_eq!(resolution.candidates, 0);
    }

    #[test]
    fn test_exact_match_wins_over_suffix() {
        // Suffix candidate has the lower id, so any suffix-first bug would pick it.
        let mut dest = destination(&[
            ("/library/movies/a.mkv", None),
            ("/src/movies/a.mkv", None),
        ]);
        let session = dest.begin().unwrap();
        let resolver = PathResolver::new(&session, TieBreak::LowestId);

        let resolution = resolver.resolve("/src/movies/a.mkv").unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Resolved(2));
        assert_eq!(resolution.method, Some(MatchMethod::Exact));
    }

    #[test]
    fn test_suffix_match_across_mount_points() {
        let mut dest = destination(&[("/library/show/ep01.mkv", None)]);
        let session = dest.begin().unwrap();
        let resolver = PathResolver::new(&session, TieBreak::LowestId);

        let resolution = resolver.resolve("/mnt/nfs/show/ep01.mkv").unwrap();
        assert_eq!(resolution.record_id(), Some(1));
        assert_eq!(resolution.method, Some(MatchMethod::Suffix));
        assert!(!resolution.is_ambiguous());
    }

    #[test]
    fn test_miss_is_unresolved_with_original_path() {
        let mut dest = destination(&[("/library/show/ep01.mkv", None)]);
        let session = dest.begin().unwrap();
        let resolver = PathResolver::new(&session, TieBreak::LowestId);

        let resolution = resolver.resolve("/src/movies/missing.mkv").unwrap();
        assert_eq!(
            resolution.outcome,
            ResolutionOutcome::Unresolved("/src/movies/missing.mkv".to_string())
        );
        assert_eq!(resolution.method, None);
    }

    #[test]
    fn test_trailing_separator_never_suffix_matches_everything() {
        let mut dest = destination(&[("/library/show/ep01.mkv", None)]);
        let session = dest.begin().unwrap();
        let resolver = PathResolver::new(&session, TieBreak::LowestId);

        assert_eq!(resolver.resolve("/src/show/").unwrap().record_id(), None);
        assert_eq!(resolver.resolve("").unwrap().record_id(), None);
    }

    #[test]
    fn test_ambiguous_suffix_uses_policy() {
        let mut dest = destination(&[
            ("/library/a/long/dir/ep01.mkv", Some("2024-01-01T00:00:00Z")),
            ("/lib/ep01.mkv", None),
            ("/library/b/ep01.mkv", Some("2025-06-01T00:00:00Z")),
        ]);
        let session = dest.begin().unwrap();

        let by = |policy| {
            PathResolver::new(&session, policy).resolve("/mnt/ep01.mkv").unwrap()
        };

        assert_eq!(by(TieBreak::LowestId).record_id(), Some(1));
        assert_eq!(by(TieBreak::ShortestPath).record_id(), Some(2));
        assert_eq!(by(TieBreak::MostRecent).record_id(), Some(3));

        let rejected = by(TieBreak::Reject);
        assert_eq!(rejected.record_id(), None);
        assert_eq!(rejected.candidates, 3);
        assert!(rejected.is_ambiguous());
    }

    #[test]
    fn test_pick_is_deterministic_on_ties() {
        let candidates = vec![
            candidate(7, "/x/a.mkv", None),
            candidate(3, "/y/a.mkv", None),
        ];
        assert_eq!(pick_candidate(&candidates, TieBreak::ShortestPath), Some(3));
        assert_eq!(pick_candidate(&candidates, TieBreak::MostRecent), Some(3));
        assert_eq!(pick_candidate(&candidates[..1], TieBreak::Reject), Some(7));
        assert_eq!(pick_candidate(&[], TieBreak::LowestId), None);
    }
}
