//! Storage port: repository trait for device persistence.

use std::future::Future;

use devicehub_domain::device::Device;
use devicehub_domain::error::DeviceHubError;
use devicehub_domain::id::DeviceId;

/// Repository for persisting and querying [`Device`]s.
///
/// Every mutating operation is a single transaction: either all of its
/// table writes are committed or none are.
pub trait DeviceRepository {
    /// Persist a new device and return it with its store-assigned row version.
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, DeviceHubError>> + Send;

    /// Get a device by id. Absence is `Ok(None)`, not an error.
    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, DeviceHubError>> + Send;

    /// Get all devices, in no particular order.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, DeviceHubError>> + Send;

    /// Replace the mutable fields of a stored device.
    ///
    /// `device.row_version` must match the stored version, otherwise the
    /// call fails with [`DeviceHubError::Conflict`] and nothing is written.
    /// Returns the device carrying its fresh row version.
    fn edit(&self, device: Device) -> impl Future<Output = Result<Device, DeviceHubError>> + Send;

    /// Delete a device and its variant row. Removing a missing id is a no-op.
    fn remove(&self, id: DeviceId) -> impl Future<Output = Result<(), DeviceHubError>> + Send;
}
