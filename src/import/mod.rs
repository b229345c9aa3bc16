// Import pipeline module
// Source snapshot -> destination session -> engine -> commit (or rollback for preview).

pub mod engine;
pub mod report;
pub mod resolver;

use std::path::Path;

use crate::config::{DestinationTarget, EngineOptions, ImportConfig, TieBreak};
use crate::db::{AccessMode, DestinationTransaction, PostgresDestination, SqliteDestination};
use crate::error::Result;
use crate::source::{JellyfinLibrary, SourceCatalog, SourceSnapshot};

pub use engine::ImportEngine;
pub use report::{AmbiguousPath, ImportReport, PathOrigin, UnresolvedPath};
pub use resolver::{MatchMethod, PathResolver, Resolution, ResolutionOutcome};

/// Run a full import (or preview) as configured.
pub fn run_import(config: &ImportConfig) -> Result<ImportReport> {
    let snapshot = read_source(&config.jellyfin_db, config.jellyfin_user.as_deref())?;
    import_snapshot(&config.destination, &snapshot, config.engine)
}

/// Read collections and favorites from a Jellyfin library in one pass.
pub fn read_source(jellyfin_db: &Path, jellyfin_user: Option<&str>) -> Result<SourceSnapshot> {
    log::info!("Reading Jellyfin library {}", jellyfin_db.display());
    let library = JellyfinLibrary::open(jellyfin_db)?;
    let snapshot = library.snapshot(jellyfin_user)?;

    log::info!(
        "Found {} collections ({} member paths) and {} favorites",
        snapshot.groups.len(),
        snapshot.member_count(),
        snapshot.favorites.len()
    );
    Ok(snapshot)
}

/// Open the destination for the run's mode and import the snapshot into it.
pub fn import_snapshot(
    target: &DestinationTarget,
    snapshot: &SourceSnapshot,
    options: EngineOptions,
) -> Result<ImportReport> {
    let access = if options.mode.is_preview() {
        AccessMode::ReadOnly
    } else {
        AccessMode::ReadWrite
    };

    match target {
        DestinationTarget::Sqlite(path) => {
            let mut destination = SqliteDestination::open(path, access)?;
            log::info!("Opened destination catalog {} ({:?})", target, destination.access());
            let report = import_into(&mut destination, snapshot, options)?;
            Ok(report)
        }
        DestinationTarget::Postgres(url) => {
            let mut destination = PostgresDestination::connect(url, access)?;
            log::info!("Connected to {} ({:?})", target, destination.access());
            let report = run_session(destination.begin()?, snapshot, options)?;
            Ok(report)
        }
    }
}

/// Import into an open SQLite catalog inside a single transaction.
pub fn import_into(
    destination: &mut SqliteDestination,
    snapshot: &SourceSnapshot,
    options: EngineOptions,
) -> Result<ImportReport> {
    let session = destination.begin()?;
    run_session(session, snapshot, options)
}

/// Run the engine over one session.
/// Preview never commits; a failed run is rolled back when the session drops.
pub fn run_session<T: DestinationTransaction>(
    session: T,
    snapshot: &SourceSnapshot,
    options: EngineOptions,
) -> Result<ImportReport> {
    let report = ImportEngine::new(&session, options).run(snapshot)?;

    if options.mode.is_preview() {
        session.rollback()?;
    } else {
        session.commit()?;
    }

    Ok(report)
}

/// Resolve a single path against a destination catalog without writing anything.
pub fn resolve_path(target: &DestinationTarget, path: &str, tie_break: TieBreak) -> Result<Resolution> {
    match target {
        DestinationTarget::Sqlite(db_path) => {
            let mut destination = SqliteDestination::open(db_path, AccessMode::ReadOnly)?;
            let resolution = resolve_in(destination.begin()?, path, tie_break)?;
            Ok(resolution)
        }
        DestinationTarget::Postgres(url) => {
            let mut destination = PostgresDestination::connect(url, AccessMode::ReadOnly)?;
            let resolution = resolve_in(destination.begin()?, path, tie_break)?;
            Ok(resolution)
        }
    }
}

fn resolve_in<T: DestinationTransaction>(session: T, path: &str, tie_break: TieBreak) -> Result<Resolution> {
    let resolution = PathResolver::new(&session, tie_break).resolve(path)?;
    session.rollback()?;
    Ok(resolution)
}
