//! Translation between domain [`Device`]s and the table-per-subtype rows.
//!
//! A device is written as one `device` row plus exactly one row in the
//! variant table selected by its [`DeviceKind`]. It is read back from a
//! single left-joined row in which the columns of the other two variant
//! tables are NULL.

use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, SqliteConnection};

use devicehub_domain::device::{Device, DeviceKind};
use devicehub_domain::error::DataIntegrityError;
use devicehub_domain::id::DeviceId;
use devicehub_domain::version::RowVersion;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Base table left-joined with every variant table. Expands to a string literal.
macro_rules! select_joined {
    () => {
        r"
    SELECT d.id, d.name, d.is_enabled, d.row_version,
           pc.device_id AS pc_device_id, pc.operating_system,
           sw.battery_level,
           e.ip_address, e.network_name
    FROM device d
    LEFT JOIN personal_computer pc ON d.id = pc.device_id
    LEFT JOIN smartwatch sw ON d.id = sw.device_id
    LEFT JOIN embedded e ON d.id = e.device_id
"
    };
}

pub(crate) const SELECT_ALL: &str = select_joined!();
pub(crate) const SELECT_BY_ID: &str = concat!(select_joined!(), "    WHERE d.id = ?\n");

const SELECT_ROW_VERSION: &str = "SELECT row_version FROM device WHERE id = ?";

const INSERT_DEVICE: &str = "INSERT INTO device (id, name, is_enabled) VALUES (?, ?, ?)";
const UPDATE_DEVICE: &str =
    "UPDATE device SET name = ?, is_enabled = ? WHERE id = ? AND row_version = ?";

const INSERT_PERSONAL_COMPUTER: &str =
    "INSERT INTO personal_computer (device_id, operating_system) VALUES (?, ?)";
const INSERT_SMARTWATCH: &str =
    "INSERT INTO smartwatch (device_id, battery_level) VALUES (?, ?)";
const INSERT_EMBEDDED: &str =
    "INSERT INTO embedded (device_id, ip_address, network_name) VALUES (?, ?, ?)";

const UPDATE_PERSONAL_COMPUTER: &str =
    "UPDATE personal_computer SET operating_system = ? WHERE device_id = ?";
const UPDATE_SMARTWATCH: &str = "UPDATE smartwatch SET battery_level = ? WHERE device_id = ?";
const UPDATE_EMBEDDED: &str =
    "UPDATE embedded SET ip_address = ?, network_name = ? WHERE device_id = ?";

/// Variant rows first, base row last, so no variant row outlives its base.
pub(crate) const DELETE_BY_ID: [&str; 4] = [
    "DELETE FROM embedded WHERE device_id = ?",
    "DELETE FROM personal_computer WHERE device_id = ?",
    "DELETE FROM smartwatch WHERE device_id = ?",
    "DELETE FROM device WHERE id = ?",
];

/// Columns of the `device` table written by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BaseRow<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub is_enabled: bool,
}

impl<'a> BaseRow<'a> {
    pub fn insert(self) -> SqliteQuery<'a> {
        sqlx::query(INSERT_DEVICE)
            .bind(self.id)
            .bind(self.name)
            .bind(self.is_enabled)
    }

    /// Conditional update: matches only while the stored version equals `expected`.
    pub fn update(self, expected: &'a RowVersion) -> SqliteQuery<'a> {
        sqlx::query(UPDATE_DEVICE)
            .bind(self.name)
            .bind(self.is_enabled)
            .bind(self.id)
            .bind(expected.as_bytes())
    }
}

/// Columns of the one variant table a device lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VariantRow<'a> {
    PersonalComputer {
        operating_system: Option<&'a str>,
    },
    Smartwatch {
        battery_level: i64,
    },
    Embedded {
        ip_address: &'a str,
        network_name: &'a str,
    },
}

impl<'a> VariantRow<'a> {
    pub fn insert(self, device_id: &'a str) -> SqliteQuery<'a> {
        match self {
            Self::PersonalComputer { operating_system } => sqlx::query(INSERT_PERSONAL_COMPUTER)
                .bind(device_id)
                .bind(operating_system),
            Self::Smartwatch { battery_level } => sqlx::query(INSERT_SMARTWATCH)
                .bind(device_id)
                .bind(battery_level),
            Self::Embedded {
                ip_address,
                network_name,
            } => sqlx::query(INSERT_EMBEDDED)
                .bind(device_id)
                .bind(ip_address)
                .bind(network_name),
        }
    }

    pub fn update(self, device_id: &'a str) -> SqliteQuery<'a> {
        match self {
            Self::PersonalComputer { operating_system } => sqlx::query(UPDATE_PERSONAL_COMPUTER)
                .bind(operating_system)
                .bind(device_id),
            Self::Smartwatch { battery_level } => sqlx::query(UPDATE_SMARTWATCH)
                .bind(battery_level)
                .bind(device_id),
            Self::Embedded {
                ip_address,
                network_name,
            } => sqlx::query(UPDATE_EMBEDDED)
                .bind(ip_address)
                .bind(network_name)
                .bind(device_id),
        }
    }
}

/// Split a device into its base-row and variant-row writes.
pub(crate) fn to_rows(device: &Device) -> (BaseRow<'_>, VariantRow<'_>) {
    let base = BaseRow {
        id: device.id.as_str(),
        name: &device.name,
        is_enabled: device.is_enabled,
    };
    let variant = match &device.kind {
        DeviceKind::PersonalComputer { operating_system } => VariantRow::PersonalComputer {
            operating_system: operating_system.as_deref(),
        },
        DeviceKind::Smartwatch { battery_level } => VariantRow::Smartwatch {
            battery_level: i64::from(*battery_level),
        },
        DeviceKind::Embedded {
            ip_address,
            network_name,
        } => VariantRow::Embedded {
            ip_address: ip_address.as_str(),
            network_name: network_name.as_str(),
        },
    };
    (base, variant)
}

/// One row of the base table left-joined with all three variant tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JoinedRow {
    pub id: String,
    pub name: String,
    pub is_enabled: bool,
    pub row_version: Vec<u8>,
    pub pc_device_id: Option<String>,
    pub operating_system: Option<String>,
    pub battery_level: Option<i64>,
    pub ip_address: Option<String>,
    pub network_name: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for JoinedRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            is_enabled: row.try_get("is_enabled")?,
            row_version: row.try_get("row_version")?,
            pc_device_id: row.try_get("pc_device_id")?,
            operating_system: row.try_get("operating_system")?,
            battery_level: row.try_get("battery_level")?,
            ip_address: row.try_get("ip_address")?,
            network_name: row.try_get("network_name")?,
        })
    }
}

/// Rebuild a domain device from a joined row.
///
/// The variant is decided by column presence, in this order: personal
/// computer, smartwatch, embedded. A personal computer is recognised by its
/// OS column or, when the OS is NULL, by its variant key.
///
/// # Errors
///
/// Returns [`DataIntegrityError::UnknownVariant`] when no variant table holds
/// a row for the device, or [`DataIntegrityError::MalformedColumn`] when the
/// embedded row lacks its network name.
pub(crate) fn device_from_row(row: JoinedRow) -> Result<Device, DataIntegrityError> {
    let kind = if row.operating_system.is_some() || row.pc_device_id.is_some() {
        DeviceKind::PersonalComputer {
            operating_system: row.operating_system,
        }
    } else if let Some(battery_level) = row.battery_level {
        DeviceKind::smartwatch(battery_level)
    } else if let Some(ip_address) = row.ip_address {
        let network_name = row
            .network_name
            .ok_or_else(|| DataIntegrityError::MalformedColumn {
                id: row.id.clone(),
                column: "network_name",
                reason: "NULL".to_string(),
            })?;
        DeviceKind::Embedded {
            ip_address,
            network_name,
        }
    } else {
        return Err(DataIntegrityError::UnknownVariant { id: row.id });
    };

    Ok(Device {
        id: DeviceId::new(row.id),
        name: row.name,
        is_enabled: row.is_enabled,
        row_version: Some(RowVersion::from_bytes(row.row_version)),
        kind,
    })
}

/// Read the current row version of `id` on the given connection.
pub(crate) async fn read_row_version(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<RowVersion>, sqlx::Error> {
    let row: Option<(Vec<u8>,)> = sqlx::query_as(SELECT_ROW_VERSION)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|(bytes,)| RowVersion::from_bytes(bytes)))
}

/// Fetch the joined row of `id` on the given connection.
pub(crate) async fn fetch_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<JoinedRow>, sqlx::Error> {
    sqlx::query_as(SELECT_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(id: &str) -> JoinedRow {
        JoinedRow {
            id: id.to_string(),
            name: "Device".to_string(),
            is_enabled: true,
            row_version: vec![1, 2, 3, 4],
            pc_device_id: None,
            operating_system: None,
            battery_level: None,
            ip_address: None,
            network_name: None,
        }
    }

    #[test]
    fn should_share_joined_select_between_list_and_lookup() {
        assert!(SELECT_BY_ID.starts_with(SELECT_ALL));
        assert!(SELECT_BY_ID.trim_end().ends_with("WHERE d.id = ?"));
    }

    #[test]
    fn should_select_variant_row_matching_device_kind() {
        let device = Device::builder()
            .id("SW-1")
            .name("Watch")
            .kind(DeviceKind::smartwatch(42))
            .build()
            .unwrap();

        let (base, variant) = to_rows(&device);

        assert_eq!(
            base,
            BaseRow {
                id: "SW-1",
                name: "Watch",
                is_enabled: false,
            }
        );
        assert_eq!(variant, VariantRow::Smartwatch { battery_level: 42 });
    }

    #[test]
    fn should_map_pc_row_with_null_operating_system() {
        let mut row = joined("P-1");
        row.pc_device_id = Some("P-1".into());

        let device = device_from_row(row).unwrap();

        assert_eq!(
            device.kind,
            DeviceKind::PersonalComputer {
                operating_system: None
            }
        );
        assert_eq!(device.row_version, Some(RowVersion::from_bytes(vec![1, 2, 3, 4])));
    }

    #[test]
    fn should_prefer_operating_system_over_other_variant_columns() {
        let mut row = joined("P-1");
        row.operating_system = Some("Linux".into());
        row.battery_level = Some(50);
        row.ip_address = Some("10.0.0.1".into());
        row.network_name = Some("lan0".into());

        let device = device_from_row(row).unwrap();

        assert_eq!(
            device.kind,
            DeviceKind::PersonalComputer {
                operating_system: Some("Linux".into())
            }
        );
    }

    #[test]
    fn should_prefer_battery_over_ip_address() {
        let mut row = joined("SW-1");
        row.battery_level = Some(80);
        row.ip_address = Some("10.0.0.1".into());
        row.network_name = Some("lan0".into());

        let device = device_from_row(row).unwrap();
        assert_eq!(device.kind, DeviceKind::Smartwatch { battery_level: 80 });
    }

    #[test]
    fn should_map_embedded_row() {
        let mut row = joined("ED-1");
        row.ip_address = Some("10.0.0.5".into());
        row.network_name = Some("lan0".into());

        let device = device_from_row(row).unwrap();
        assert_eq!(
            device.kind,
            DeviceKind::Embedded {
                ip_address: "10.0.0.5".into(),
                network_name: "lan0".into(),
            }
        );
    }

    #[test]
    fn should_report_unknown_variant_when_no_variant_columns_present() {
        let result = device_from_row(joined("P-9"));
        assert_eq!(
            result,
            Err(DataIntegrityError::UnknownVariant { id: "P-9".into() })
        );
    }
}
