// MediaHub Import Constants
// Defaults shared by the source reader, the destination stores and the CLI.

// Jellyfin library.db
pub const JELLYFIN_COLLECTION_TYPE_PATTERN: &str = "%BoxSet%";

// Destination catalog
pub const DEFAULT_USER_ID: i64 = 1;
pub const DEFAULT_TIE_BREAK: &str = "lowest-id";
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

// Paths
pub const PATH_SEPARATORS: [char; 2] = ['/', '\\'];
pub const LIKE_ESCAPE: char = '\\';

// Report rendering
pub const SUMMARY_RULE_WIDTH: usize = 60;
