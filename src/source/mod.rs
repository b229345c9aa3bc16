// Source catalog module
// Read-only extraction of collections and favorites from the library being migrated.

pub mod jellyfin;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use jellyfin::JellyfinLibrary;

/// A named collection and the paths of its members, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportGroup {
    pub label: String,
    pub members: Vec<String>,
}

impl ImportGroup {
    pub fn new(label: impl Into<String>, members: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            label: label.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything one run consumes, read in a single pass before the destination is touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub groups: Vec<ImportGroup>,
    pub favorites: Vec<String>,
}

impl SourceSnapshot {
    pub fn member_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }
}

pub trait SourceCatalog {
    fn list_groups(&self) -> Result<Vec<ImportGroup>>;

    /// Favorite paths, optionally restricted to one source user.
    fn list_favorites(&self, user: Option<&str>) -> Result<Vec<String>>;

    fn snapshot(&self, user: Option<&str>) -> Result<SourceSnapshot> {
        Ok(SourceSnapshot {
            groups: self.list_groups()?,
            favorites: self.list_favorites(user)?,
        })
    }
}
