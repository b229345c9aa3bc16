// Reconciliation engine
// Upserts labels, tags members and marks favorites through a DestinationStore,
// folding every resolution miss into the report. One engine value per run.

use std::collections::HashSet;

use crate::config::{EngineOptions, RunMode};
use crate::db::schema::{LabelId, RecordId};
use crate::db::DestinationStore;
use crate::error::{ImportError, Result};
use crate::import::report::{AmbiguousPath, ImportReport, PathOrigin, UnresolvedPath};
use crate::import::resolver::{MatchMethod, PathResolver, ResolutionOutcome};
use crate::source::{ImportGroup, SourceSnapshot};

/// A label as seen by the current run. `Pending` only occurs in preview, for
/// names that do not exist in the destination yet; it holds the collation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LabelRef {
    Stored(LabelId),
    Pending(String),
}

pub struct ImportEngine<'s, S: DestinationStore + ?Sized> {
    store: &'s S,
    resolver: PathResolver<'s, S>,
    options: EngineOptions,
    report: ImportReport,
    // Preview bookkeeping: what this run would already have written.
    // Labels are keyed the way the destination's unique index compares them.
    pending_labels: HashSet<String>,
    planned_memberships: HashSet<(LabelRef, RecordId)>,
    planned_favorites: HashSet<RecordId>,
}

impl<'s, S: DestinationStore + ?Sized> ImportEngine<'s, S> {
    pub fn new(store: &'s S, options: EngineOptions) -> Self {
        let report = ImportReport {
            mode: options.mode,
            tie_break: options.tie_break,
            started_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        };

        Self {
            store,
            resolver: PathResolver::new(store, options.tie_break),
            options,
            report,
            pending_labels: HashSet::new(),
            planned_memberships: HashSet::new(),
            planned_favorites: HashSet::new(),
        }
    }

    /// Process the whole snapshot. Any error is fatal for the run; the caller
    /// must not commit the destination transaction in that case.
    pub fn run(mut self, snapshot: &SourceSnapshot) -> Result<ImportReport> {
        if !self.store.user_exists(self.options.user_id)? {
            return Err(ImportError::UserNotFound(self.options.user_id));
        }

        for group in &snapshot.groups {
            self.import_group(group)?;
        }

        for path in &snapshot.favorites {
            self.import_favorite(path)?;
        }

        self.report.finished_at = chrono::Utc::now().to_rfc3339();

        log::info!(
            "{} finished: {} labels, {} new memberships, {} new favorites, {} not found",
            if self.options.mode.is_preview() { "Preview" } else { "Import" },
            self.report.labels_upserted,
            self.report.memberships_created,
            self.report.favorites_created,
            self.report.unresolved_count()
        );

        Ok(self.report)
    }

    fn import_group(&mut self, group: &ImportGroup) -> Result<()> {
        if group.label.trim().is_empty() {
            log::warn!("Skipping collection with empty name ({} members)", group.members.len());
            self.report.groups_skipped += 1;
            return Ok(());
        }

        let label = self.upsert_label(&group.label)?;
        self.report.labels_upserted += 1;
        log::debug!("Collection '{}': {} members", group.label, group.members.len());

        let origin = PathOrigin::Collection { label: group.label.clone() };
        for path in &group.members {
            self.report.member_paths += 1;

            let record = match self.resolve(path, &origin)? {
                Some(id) => id,
                None => continue,
            };

            if self.add_membership(&label, record)? {
                self.report.memberships_created += 1;
            } else {
                self.report.memberships_existing += 1;
            }
        }

        Ok(())
    }

    fn import_favorite(&mut self, path: &str) -> Result<()> {
        self.report.favorite_paths += 1;

        let record = match self.resolve(path, &PathOrigin::Favorite)? {
            Some(id) => id,
            None => return Ok(()),
        };

        if self.add_favorite(record)? {
            self.report.favorites_created += 1;
        } else {
            self.report.favorites_existing += 1;
        }

        Ok(())
    }

    fn resolve(&mut self, path: &str, origin: &PathOrigin) -> Result<Option<RecordId>> {
        let resolution = self.resolver.resolve(path)?;

        if resolution.is_ambiguous() {
            log::info!(
                "Ambiguous filename match for {}: {} candidates, tie-break {}",
                path,
                resolution.candidates,
                self.options.tie_break
            );
            self.report.ambiguous.push(AmbiguousPath {
                path: path.to_string(),
                origin: origin.clone(),
                candidates: resolution.candidates,
                chosen: resolution.record_id(),
            });
        }

        match resolution.method {
            Some(MatchMethod::Exact) => self.report.resolved_exact += 1,
            Some(MatchMethod::Suffix) => self.report.resolved_suffix += 1,
            None => {}
        }

        match resolution.outcome {
            ResolutionOutcome::Resolved(id) => Ok(Some(id)),
            ResolutionOutcome::Unresolved(original) => {
                log::warn!("Not found in destination: {}", original);
                self.report.unresolved.push(UnresolvedPath { path: original, origin: origin.clone() });
                Ok(None)
            }
        }
    }

    fn upsert_label(&mut self, name: &str) -> Result<LabelRef> {
        match self.options.mode {
            RunMode::Commit => {
                let upsert = self.store.upsert_label(name)?;
                if upsert.created {
                    self.report.labels_created += 1;
                }
                Ok(LabelRef::Stored(upsert.id))
            }
            RunMode::Preview => match self.store.find_label(name)? {
                Some(id) => Ok(LabelRef::Stored(id)),
                None => {
                    let key = self.store.label_collation().key(name);
                    if self.pending_labels.insert(key.clone()) {
                        self.report.labels_created += 1;
                    }
                    Ok(LabelRef::Pending(key))
                }
            },
        }
    }

    /// True when the membership is (or would be) new.
    fn add_membership(&mut self, label: &LabelRef, record: RecordId) -> Result<bool> {
        match (self.options.mode, label) {
            (RunMode::Commit, LabelRef::Stored(id)) => self.store.add_membership(*id, record),
            (RunMode::Commit, LabelRef::Pending(name)) => Err(ImportError::Other(format!(
                "label '{}' was not written before tagging",
                name
            ))),
            (RunMode::Preview, _) => {
                if !self.planned_memberships.insert((label.clone(), record)) {
                    return Ok(false);
                }
                match label {
                    LabelRef::Stored(id) => Ok(!self.store.membership_exists(*id, record)?),
                    LabelRef::Pending(_) => Ok(true),
                }
            }
        }
    }

    /// True when the favorite is (or would be) new.
    fn add_favorite(&mut self, record: RecordId) -> Result<bool> {
        let user = self.options.user_id;
        match self.options.mode {
            RunMode::Commit => self.store.add_favorite(user, record),
            RunMode::Preview => {
                if !self.planned_favorites.insert(record) {
                    return Ok(false);
                }
                Ok(!self.store.favorite_exists(user, record)?)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
