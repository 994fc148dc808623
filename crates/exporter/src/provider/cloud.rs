//! Hetzner API storage boxes, discovered through a paginated listing.

use chrono::DateTime;
use chrono::Utc;
use http_retry::HttpRequest;
use serde::Deserialize;

use super::join_url;
use super::DecodeError;
use super::Page;
use super::PaginatedApi;
use crate::record::AccessFlags;
use crate::record::ResourceRecord;

pub const DEFAULT_BASE_URL: &str = "https://api.hetzner.com/v1";
pub const PER_PAGE: u64 = 50;

#[derive(Debug, Clone)]
pub struct CloudApi {
    base_url: String,
    token: String,
}

impl CloudApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

impl PaginatedApi for CloudApi {
    fn page_request(&self, page: u64) -> HttpRequest {
        let url = join_url(
            &self.base_url,
            &format!("storage_boxes?per_page={PER_PAGE}&page={page}"),
        );
        HttpRequest::get(url).bearer_auth(&self.token)
    }

    fn decode_page(&self, body: &[u8]) -> Result<Page, DecodeError> {
        let listing: Listing = serde_json::from_slice(body)?;
        let pagination = listing.meta.pagination;
        Ok(Page {
            last_page: pagination.last_page.unwrap_or(pagination.page),
            records: listing.storage_boxes.into_iter().map(Into::into).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    storage_boxes: Vec<StorageBox>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default = "first_page")]
    page: u64,
    #[serde(default)]
    last_page: Option<u64>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: first_page(),
            last_page: None,
        }
    }
}

fn first_page() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
struct StorageBox {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    storage_box_type: StorageBoxType,
    #[serde(default)]
    location: Location,
    #[serde(default)]
    access_settings: AccessSettings,
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    stats: Stats,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageBoxType {
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct AccessSettings {
    #[serde(default)]
    reachable_externally: bool,
    #[serde(default)]
    samba_enabled: bool,
    #[serde(default)]
    ssh_enabled: bool,
    #[serde(default)]
    webdav_enabled: bool,
    #[serde(default)]
    zfs_enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Stats {
    #[serde(default)]
    size: u64,
    #[serde(default)]
    size_data: u64,
    #[serde(default)]
    size_snapshots: u64,
}

impl From<StorageBox> for ResourceRecord {
    fn from(storage_box: StorageBox) -> Self {
        Self {
            id: storage_box.id,
            name: storage_box.name,
            kind: storage_box.storage_box_type.name,
            status: storage_box.status,
            location: storage_box.location.name,
            server: storage_box.server.unwrap_or_default(),
            host: storage_box.system.unwrap_or_default(),
            capacity_bytes: storage_box.storage_box_type.size,
            used_bytes: storage_box.stats.size,
            used_data_bytes: storage_box.stats.size_data,
            used_snapshot_bytes: storage_box.stats.size_snapshots,
            access: AccessFlags {
                samba: storage_box.access_settings.samba_enabled,
                ssh: storage_box.access_settings.ssh_enabled,
                webdav: storage_box.access_settings.webdav_enabled,
                zfs: storage_box.access_settings.zfs_enabled,
                reachable_externally: storage_box.access_settings.reachable_externally,
            },
            created: storage_box.created,
            paid_until: None,
        }
    }
}
