// Import report
// Counters plus the literal unresolved and ambiguous paths, for operators and for JSON consumers.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::config::{RunMode, TieBreak};
use crate::constants::SUMMARY_RULE_WIDTH;
use crate::db::schema::RecordId;

/// Where an unresolved or ambiguous path came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathOrigin {
    Collection { label: String },
    Favorite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedPath {
    pub path: String,
    pub origin: PathOrigin,
}

/// A suffix match that had more than one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousPath {
    pub path: String,
    pub origin: PathOrigin,
    pub candidates: usize,
    /// None when the tie-break policy rejected the match.
    pub chosen: Option<RecordId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub mode: RunMode,
    pub tie_break: TieBreak,
    pub started_at: String,
    pub finished_at: String,

    pub groups_skipped: usize,
    pub labels_upserted: usize,
    pub labels_created: usize,

    pub member_paths: usize,
    pub memberships_created: usize,
    pub memberships_existing: usize,

    pub favorite_paths: usize,
    pub favorites_created: usize,
    pub favorites_existing: usize,

    pub resolved_exact: usize,
    pub resolved_suffix: usize,

    pub ambiguous: Vec<AmbiguousPath>,
    pub unresolved: Vec<UnresolvedPath>,
}

impl ImportReport {
    pub fn resolved_count(&self) -> usize {
        self.resolved_exact + self.resolved_suffix
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }

    pub fn unresolved_members(&self) -> usize {
        self.unresolved
            .iter()
            .filter(|u| matches!(u.origin, PathOrigin::Collection { .. }))
            .count()
    }

    pub fn unresolved_favorites(&self) -> usize {
        self.unresolved.len() - self.unresolved_members()
    }

    /// Human-readable summary for terminal output.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let heading = match self.mode {
            RunMode::Commit => "Import complete:",
            RunMode::Preview => "[DRY RUN] Import preview (no changes made):",
        };
        let verb = if self.mode.is_preview() { "would be " } else { "" };

        let _ = writeln!(out, "{}", heading);
        let _ = writeln!(out, "  Labels upserted:      {}", self.labels_upserted);
        let _ = writeln!(out, "  Labels {}created:  {}", verb, self.labels_created);
        let _ = writeln!(
            out,
            "  Memberships {}created: {} ({} already present)",
            verb, self.memberships_created, self.memberships_existing
        );
        let _ = writeln!(
            out,
            "  Favorites {}created:   {} ({} already present)",
            verb, self.favorites_created, self.favorites_existing
        );
        let _ = writeln!(
            out,
            "  Resolved:             {} ({} exact, {} by filename)",
            self.resolved_count(),
            self.resolved_exact,
            self.resolved_suffix
        );
        let _ = writeln!(out, "  Not found:            {}", self.unresolved_count());
        if self.groups_skipped > 0 {
            let _ = writeln!(out, "  Collections skipped:  {} (no name)", self.groups_skipped);
        }

        if !self.ambiguous.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Ambiguous filename matches (tie-break: {}):", self.tie_break);
            let _ = writeln!(out, "{}", "-".repeat(SUMMARY_RULE_WIDTH));
            for a in &self.ambiguous {
                let chosen = a
                    .chosen
                    .map(|id| format!("record {}", id))
                    .unwrap_or_else(|| "rejected".to_string());
                let _ = writeln!(
                    out,
                    "  {} [{}] {} candidates -> {}",
                    a.path,
                    describe_origin(&a.origin),
                    a.candidates,
                    chosen
                );
            }
        }

        if !self.unresolved.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Not found in destination:");
            let _ = writeln!(out, "{}", "-".repeat(SUMMARY_RULE_WIDTH));
            for u in &self.unresolved {
                let _ = writeln!(out, "  {} [{}]", u.path, describe_origin(&u.origin));
            }
        }

        out
    }
}

fn describe_origin(origin: &PathOrigin) -> String {
    match origin {
        PathOrigin::Collection { label } => format!("collection '{}'", label),
        PathOrigin::Favorite => "favorite".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> ImportReport {
        ImportReport {
            mode: RunMode::Preview,
            labels_upserted: 1,
            labels_created: 1,
            member_paths: 2,
            memberships_created: 1,
            favorite_paths: 1,
            resolved_exact: 1,
            unresolved: vec![
                UnresolvedPath {
                    path: "/src/movies/missing.mkv".to_string(),
                    origin: PathOrigin::Collection { label: "Trilogy".to_string() },
                },
                UnresolvedPath {
                    path: "/src/fav.mkv".to_string(),
                    origin: PathOrigin::Favorite,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_lists_every_unresolved_path() {
        let summary = sample_report().render_summary();
        assert!(summary.starts_with("[DRY RUN]"));
        assert!(summary.contains("/src/movies/missing.mkv [collection 'Trilogy']"));
        assert!(summary.contains("/src/fav.mkv [favorite]"));
        assert!(summary.contains("Not found:            2"));
    }

    #[test]
    fn test_unresolved_split_by_origin() {
        let report = sample_report();
        assert_eq!(report.unresolved_members(), 1);
        assert_eq!(report.unresolved_favorites(), 1);
    }

    #[test]
    fn test_json_shape_is_structured() {
        let value = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(value["mode"], "preview");
        assert_eq!(value["unresolved"][0]["origin"]["kind"], "collection");
        assert_eq!(value["unresolved"][0]["origin"]["label"], "Trilogy");
        assert_eq!(value["unresolved"][1]["origin"]["kind"], "favorite");
    }
}
