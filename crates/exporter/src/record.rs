//! Provider-agnostic view of one storage box.

use chrono::DateTime;
use chrono::Utc;

/// Identifier returned by discovery, used to schedule a detail fetch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub struct ResourceRef(pub u64);

/// Feature switches reported for a storage box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessFlags {
    pub samba: bool,
    pub ssh: bool,
    pub webdav: bool,
    pub zfs: bool,
    pub reachable_externally: bool,
}

/// One decoded storage box. Sizes are in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: u64,
    pub name: String,
    /// product or plan name
    pub kind: String,
    pub status: String,
    pub location: String,
    /// hostname users connect to
    pub server: String,
    /// system the box lives on
    pub host: String,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub used_data_bytes: u64,
    pub used_snapshot_bytes: u64,
    pub access: AccessFlags,
    pub created: Option<DateTime<Utc>>,
    pub paid_until: Option<DateTime<Utc>>,
}
