//! Device: a network-attached thing in the inventory.
//!
//! Every device shares a base shape (id, name, enabled flag, row version)
//! and carries exactly one [`DeviceKind`]. The kind is chosen at creation
//! and never changes afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceHubError, PreconditionError, ValidationError};
use crate::id::DeviceId;
use crate::validation;
use crate::version::RowVersion;

/// Discriminator tag for the closed set of device variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    PersonalComputer,
    Smartwatch,
    Embedded,
}

impl DeviceType {
    pub const ALL: [Self; 3] = [Self::PersonalComputer, Self::Smartwatch, Self::Embedded];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersonalComputer => "PersonalComputer",
            Self::Smartwatch => "Smartwatch",
            Self::Embedded => "Embedded",
        }
    }

    /// Token every id of this type must contain.
    #[must_use]
    pub fn id_marker(self) -> &'static str {
        match self {
            Self::PersonalComputer => "P-",
            Self::Smartwatch => "SW-",
            Self::Embedded => "ED-",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownDeviceType(s.to_string()))
    }
}

/// Variant-specific state of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DeviceKind {
    PersonalComputer {
        operating_system: Option<String>,
    },
    Smartwatch {
        battery_level: u8,
    },
    Embedded {
        ip_address: String,
        network_name: String,
    },
}

impl DeviceKind {
    /// Smartwatch kind with the battery level clamped to `0..=100`.
    #[must_use]
    pub fn smartwatch(battery_level: i64) -> Self {
        let battery_level = u8::try_from(battery_level.clamp(0, 100)).unwrap_or_default();
        Self::Smartwatch { battery_level }
    }

    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::PersonalComputer { .. } => DeviceType::PersonalComputer,
            Self::Smartwatch { .. } => DeviceType::Smartwatch,
            Self::Embedded { .. } => DeviceType::Embedded,
        }
    }
}

/// A device in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub is_enabled: bool,
    /// Assigned by the store; `None` until the device has been persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_version: Option<RowVersion>,
    #[serde(flatten)]
    pub kind: DeviceKind,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.kind.device_type()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceHubError::Validation`] when:
    /// - `name` is empty or longer than 100 characters
    /// - `id` lacks the marker of its device type
    /// - an embedded device has a malformed IP address or an empty network name
    pub fn validate(&self) -> Result<(), DeviceHubError> {
        validation::check_name(&self.name)?;
        validation::check_id(&self.id, self.device_type())?;
        if let DeviceKind::Embedded {
            ip_address,
            network_name,
        } = &self.kind
        {
            validation::check_ip_address(ip_address)?;
            validation::check_network_name(network_name)?;
        }
        Ok(())
    }

    /// Power the device on.
    ///
    /// Power state is not tracked, so success changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceHubError::Precondition`] for a personal computer that
    /// has no operating system installed.
    pub fn turn_on(&self) -> Result<(), DeviceHubError> {
        match &self.kind {
            DeviceKind::PersonalComputer {
                operating_system: None,
            } => Err(PreconditionError::OperatingSystemNotInstalled.into()),
            DeviceKind::PersonalComputer { .. }
            | DeviceKind::Smartwatch { .. }
            | DeviceKind::Embedded { .. } => Ok(()),
        }
    }

    /// Copy the mutable fields of `update` into `self`.
    ///
    /// The id and row version are left alone. On error `self` is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TypeChanged`] when `update` is a different
    /// variant.
    pub fn apply_update(&mut self, update: &Device) -> Result<(), DeviceHubError> {
        let kind = match (&self.kind, &update.kind) {
            (DeviceKind::PersonalComputer { .. }, DeviceKind::PersonalComputer { .. })
            | (DeviceKind::Smartwatch { .. }, DeviceKind::Smartwatch { .. })
            | (DeviceKind::Embedded { .. }, DeviceKind::Embedded { .. }) => update.kind.clone(),
            (stored, requested) => {
                return Err(ValidationError::TypeChanged {
                    stored: stored.device_type(),
                    requested: requested.device_type(),
                }
                .into());
            }
        };

        self.name.clone_from(&update.name);
        self.is_enabled = update.is_enabled;
        self.kind = kind;
        Ok(())
    }

    /// Attach the version token read back from the store.
    #[must_use]
    pub fn with_row_version(mut self, row_version: RowVersion) -> Self {
        self.row_version = Some(row_version);
        self
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_enabled {
            "enabled"
        } else {
            "disabled"
        };
        match &self.kind {
            DeviceKind::PersonalComputer { operating_system } => {
                write!(f, "PC {} ({}) is {status} and ", self.name, self.id)?;
                match operating_system {
                    Some(os) => write!(f, "has {os}"),
                    None => f.write_str("has no operating system"),
                }
            }
            DeviceKind::Smartwatch { battery_level } => write!(
                f,
                "Smartwatch {} ({}) is {status} with {battery_level}% battery",
                self.name, self.id
            ),
            DeviceKind::Embedded {
                ip_address,
                network_name,
            } => write!(
                f,
                "Embedded device {} ({}) is {status} at {ip_address} on {network_name}",
                self.name, self.id
            ),
        }
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    name: Option<String>,
    is_enabled: bool,
    row_version: Option<RowVersion>,
    kind: Option<DeviceKind>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<DeviceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, is_enabled: bool) -> Self {
        self.is_enabled = is_enabled;
        self
    }

    #[must_use]
    pub fn row_version(mut self, row_version: RowVersion) -> Self {
        self.row_version = Some(row_version);
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: DeviceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceHubError::Validation`] if `id`, `name` or the kind is
    /// missing, or if any invariant checked by [`Device::validate`] fails.
    pub fn build(self) -> Result<Device, DeviceHubError> {
        let device = Device {
            id: self.id.ok_or(ValidationError::MissingField("id"))?,
            name: self.name.ok_or(ValidationError::MissingField("name"))?,
            is_enabled: self.is_enabled,
            row_version: self.row_version,
            kind: self.kind.ok_or(ValidationError::MissingField("deviceType"))?,
        };
        device.validate()?;
        Ok(device)
    }
}
