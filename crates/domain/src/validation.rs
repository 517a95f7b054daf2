//! Input-shape rules applied before a device is constructed or persisted.
//!
//! [`DeviceInput`] is the untyped request shape shared by create and edit.
//! The `validate_*` functions check it before [`build_device`] turns it into
//! a typed [`Device`].

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::device::{Device, DeviceKind, DeviceType};
use crate::error::{DeviceHubError, ValidationError};
use crate::id::DeviceId;
use crate::version::RowVersion;

/// Longest accepted device name, in characters.
pub const NAME_MAX_LEN: usize = 100;

/// Request body for creating or editing a device.
///
/// Every field is optional at this level so that missing fields surface as
/// [`ValidationError::MissingField`] instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInput {
    pub id: Option<String>,
    #[serde(rename = "type", alias = "deviceType")]
    pub device_type: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub is_enabled: bool,
    pub operating_system: Option<String>,
    pub battery_level: Option<i64>,
    pub ip_address: Option<String>,
    pub network_name: Option<String>,
    pub row_version: Option<String>,
}

/// Check the fields required to create a device.
///
/// Returns the id and the parsed device type on success.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the first offending field.
pub fn validate_create(input: &DeviceInput) -> Result<(DeviceId, DeviceType), ValidationError> {
    let id = input
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingField("id"))?;
    let device_type = input
        .device_type
        .as_deref()
        .filter(|tag| !tag.is_empty())
        .ok_or(ValidationError::MissingField("deviceType"))?
        .parse::<DeviceType>()?;
    let name = input
        .name
        .as_deref()
        .ok_or(ValidationError::MissingField("name"))?;
    check_name(name)?;
    if device_type == DeviceType::Embedded {
        check_embedded_fields(input)?;
    }
    Ok((DeviceId::new(id), device_type))
}

/// Check the fields required to edit a device.
///
/// The stored device type is not known here; variant fields are checked
/// again when the replacement device is built.
///
/// # Errors
///
/// Returns [`ValidationError::MissingRowVersion`] when the token is absent or
/// empty, [`ValidationError::InvalidRowVersion`] when it cannot be decoded,
/// or a field error for the name or a supplied device type.
pub fn validate_edit(input: &DeviceInput) -> Result<RowVersion, ValidationError> {
    let token = input
        .row_version
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or(ValidationError::MissingRowVersion)?;
    let row_version = token
        .parse::<RowVersion>()
        .map_err(|_| ValidationError::InvalidRowVersion)?;
    if row_version.is_empty() {
        return Err(ValidationError::MissingRowVersion);
    }

    let name = input
        .name
        .as_deref()
        .ok_or(ValidationError::MissingField("name"))?;
    check_name(name)?;
    if let Some(tag) = input.device_type.as_deref() {
        let device_type = tag.parse::<DeviceType>()?;
        if device_type == DeviceType::Embedded {
            check_embedded_fields(input)?;
        }
    }
    Ok(row_version)
}

/// Construct the typed device described by `input`.
///
/// Smartwatch battery defaults to 0 when absent.
///
/// # Errors
///
/// Returns [`DeviceHubError::Validation`] when a required variant field is
/// missing or any invariant of [`Device::validate`] fails.
pub fn build_device(
    id: DeviceId,
    device_type: DeviceType,
    input: &DeviceInput,
) -> Result<Device, DeviceHubError> {
    let kind = match device_type {
        DeviceType::PersonalComputer => DeviceKind::PersonalComputer {
            operating_system: input.operating_system.clone(),
        },
        DeviceType::Smartwatch => DeviceKind::smartwatch(input.battery_level.unwrap_or(0)),
        DeviceType::Embedded => DeviceKind::Embedded {
            ip_address: required_trimmed(input.ip_address.as_deref(), "ipAddress")?,
            network_name: required_trimmed(input.network_name.as_deref(), "networkName")?,
        },
    };

    let mut builder = Device::builder()
        .id(id)
        .enabled(input.is_enabled)
        .kind(kind);
    if let Some(name) = &input.name {
        builder = builder.name(name.clone());
    }
    builder.build()
}

fn required_trimmed(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .ok_or(ValidationError::MissingField(field))
}

fn check_embedded_fields(input: &DeviceInput) -> Result<(), ValidationError> {
    let ip_address = input
        .ip_address
        .as_deref()
        .ok_or(ValidationError::MissingField("ipAddress"))?;
    check_ip_address(ip_address.trim())?;
    let network_name = input
        .network_name
        .as_deref()
        .ok_or(ValidationError::MissingField("networkName"))?;
    check_network_name(network_name.trim())
}

/// `name` must be non-empty and at most [`NAME_MAX_LEN`] characters.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyName`] or [`ValidationError::NameTooLong`].
pub fn check_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let actual = name.chars().count();
    if actual > NAME_MAX_LEN {
        return Err(ValidationError::NameTooLong {
            max: NAME_MAX_LEN,
            actual,
        });
    }
    Ok(())
}

/// The id must contain the marker of its device type.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidId`].
pub fn check_id(id: &DeviceId, device_type: DeviceType) -> Result<(), ValidationError> {
    let marker = device_type.id_marker();
    if id.as_str().contains(marker) {
        Ok(())
    } else {
        Err(ValidationError::InvalidId {
            id: id.to_string(),
            device_type,
            marker,
        })
    }
}

/// Dotted-quad IPv4: four decimal octets in `0..=255`, no leading zeros.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIpAddress`].
pub fn check_ip_address(ip_address: &str) -> Result<(), ValidationError> {
    ip_address
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidIpAddress(ip_address.to_string()))
}

/// # Errors
///
/// Returns [`ValidationError::EmptyNetworkName`].
pub fn check_network_name(network_name: &str) -> Result<(), ValidationError> {
    if network_name.trim().is_empty() {
        return Err(ValidationError::EmptyNetworkName);
    }
    Ok(())
}
