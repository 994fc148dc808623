//! Robot webservice storage boxes: one list call, then one detail call per box.

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use http_retry::HttpRequest;
use serde::Deserialize;

use super::join_url;
use super::DecodeError;
use super::ListDetailApi;
use crate::record::AccessFlags;
use crate::record::ResourceRecord;
use crate::record::ResourceRef;

pub const DEFAULT_BASE_URL: &str = "https://robot-ws.your-server.de";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RobotApi {
    base_url: String,
    user: String,
    password: String,
}

impl RobotApi {
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            user: user.into(),
            password: password.into(),
        }
    }
}

impl ListDetailApi for RobotApi {
    fn list_request(&self) -> HttpRequest {
        HttpRequest::get(join_url(&self.base_url, "storagebox"))
            .basic_auth(&self.user, &self.password)
    }

    fn decode_list(&self, body: &[u8]) -> Result<Vec<ResourceRef>, DecodeError> {
        let entries: Vec<Envelope<Summary>> = serde_json::from_slice(body)?;
        Ok(entries
            .into_iter()
            .map(|entry| ResourceRef(entry.storagebox.id))
            .collect())
    }

    fn detail_request(&self, resource: ResourceRef) -> HttpRequest {
        HttpRequest::get(join_url(&self.base_url, &format!("storagebox/{resource}")))
            .basic_auth(&self.user, &self.password)
    }

    fn decode_detail(&self, body: &[u8]) -> Result<ResourceRecord, DecodeError> {
        let detail: Envelope<Detail> = serde_json::from_slice(body)?;
        detail.storagebox.try_into()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    storagebox: T,
}

#[derive(Debug, Deserialize)]
struct Summary {
    id: u64,
}

/// Disk figures are reported in MiB.
#[derive(Debug, Deserialize)]
struct Detail {
    id: u64,
    #[serde(default)]
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    product: String,
    #[serde(default)]
    cancelled: bool,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    location: String,
    #[serde(default)]
    paid_until: Option<String>,
    #[serde(default)]
    disk_quota: u64,
    #[serde(default)]
    disk_usage: u64,
    #[serde(default)]
    disk_usage_data: u64,
    #[serde(default)]
    disk_usage_snapshots: u64,
    #[serde(default)]
    webdav: bool,
    #[serde(default)]
    samba: bool,
    #[serde(default)]
    ssh: bool,
    #[serde(default)]
    external_reachability: bool,
    #[serde(default)]
    zfs: bool,
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    host_system: Option<String>,
}

impl Detail {
    fn status(&self) -> &'static str {
        if self.cancelled {
            "cancelled"
        } else if self.locked {
            "locked"
        } else {
            "active"
        }
    }
}

impl TryFrom<Detail> for ResourceRecord {
    type Error = DecodeError;

    fn try_from(detail: Detail) -> Result<Self, Self::Error> {
        let paid_until = detail
            .paid_until
            .as_deref()
            .filter(|date| !date.is_empty())
            .map(parse_date)
            .transpose()?;

        Ok(Self {
            id: detail.id,
            status: detail.status().to_string(),
            name: detail
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or(detail.login),
            kind: detail.product,
            location: detail.location,
            server: detail.server.unwrap_or_default(),
            host: detail.host_system.unwrap_or_default(),
            capacity_bytes: detail.disk_quota.saturating_mul(MIB),
            used_bytes: detail.disk_usage.saturating_mul(MIB),
            used_data_bytes: detail.disk_usage_data.saturating_mul(MIB),
            used_snapshot_bytes: detail.disk_usage_snapshots.saturating_mul(MIB),
            access: AccessFlags {
                samba: detail.samba,
                ssh: detail.ssh,
                webdav: detail.webdav,
                zfs: detail.zfs,
                reachable_externally: detail.external_reachability,
            },
            created: None,
            paid_until,
        })
    }
}

fn parse_date(date: &str) -> Result<DateTime<Utc>, DecodeError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| DecodeError::Field {
            field: "paid_until",
            value: date.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    const DETAIL: &str = r#"{
        "storagebox": {
            "id": 123456,
            "login": "u12345",
            "name": "Backup Server 1",
            "product": "BX60",
            "cancelled": false,
            "locked": false,
            "location": "FSN1",
            "linked_server": 123456,
            "paid_until": "2015-10-23",
            "disk_quota": 10240000,
            "disk_usage": 900,
            "disk_usage_data": 500,
            "disk_usage_snapshots": 400,
            "webdav": true,
            "samba": true,
            "ssh": true,
            "external_reachability": true,
            "zfs": false,
            "server": "u12345.your-storagebox.de",
            "host_system": "FSN1-BX355"
        }
    }"#;

    fn api() -> RobotApi {
        RobotApi::new("http://robot.test/", "user", "pass")
    }

    #[test]
    fn requests_use_basic_auth() {
        let list = api().list_request();
        let detail = api().detail_request(ResourceRef(7));

        assert_eq!(list.url, "http://robot.test/storagebox");
        assert_eq!(detail.url, "http://robot.test/storagebox/7");
        assert_eq!(detail.header_value("Authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn decodes_list_into_refs() {
        let refs = api()
            .decode_list(br#"[{"storagebox": {"id": 1, "login": "u1"}}, {"storagebox": {"id": 2}}]"#)
            .expect("decode");

        assert_eq!(refs, vec![ResourceRef(1), ResourceRef(2)]);
    }

    #[test]
    fn decodes_detail_with_sizes_in_bytes() {
        let record = api().decode_detail(DETAIL.as_bytes()).expect("decode");

        assert_eq!(record.id, 123_456);
        assert_eq!(record.name, "Backup Server 1");
        assert_eq!(record.kind, "BX60");
        assert_eq!(record.status, "active");
        assert_eq!(record.capacity_bytes, 10_240_000 * MIB);
        assert_eq!(record.used_bytes, 900 * MIB);
        assert_eq!(record.used_data_bytes, 500 * MIB);
        assert_eq!(record.used_snapshot_bytes, 400 * MIB);
        assert_eq!(record.host, "FSN1-BX355");
        assert!(record.access.webdav && !record.access.zfs);
        assert_eq!(record.paid_until.map(|d| d.timestamp()), Some(1_445_558_400));
    }

    #[test]
    fn unnamed_box_falls_back_to_login() {
        let json = DETAIL
            .replace("\"Backup Server 1\"", "null")
            .replace("\"cancelled\": false", "\"cancelled\": true");
        let record = api().decode_detail(json.as_bytes()).expect("decode");

        assert_eq!(record.name, "u12345");
        assert_eq!(record.status, "cancelled");
    }

    #[test]
    fn bad_paid_until_is_rejected() {
        let json = DETAIL.replace("2015-10-23", "next tuesday");
        let err = api().decode_detail(json.as_bytes()).expect_err("should fail");

        assert!(matches!(err, DecodeError::Field {
            field: "paid_until",
            ..
        }));
    }
}
