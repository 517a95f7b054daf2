//! Device service: use-cases for managing devices.

use devicehub_domain::device::{Device, DeviceType};
use devicehub_domain::error::{
    ConcurrencyConflictError, DeviceHubError, NotFoundError, ValidationError,
};
use devicehub_domain::id::DeviceId;
use devicehub_domain::validation::{self, DeviceInput};

use crate::ports::DeviceRepository;

/// Application service for device CRUD operations.
pub struct DeviceService<R> {
    repo: R,
}

impl<R: DeviceRepository> DeviceService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Validate `input`, build the matching variant, and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceHubError::Validation`] if the input is malformed, or
    /// an error propagated from the repository.
    #[tracing::instrument(skip(self, input), fields(device_id = input.id.as_deref().unwrap_or_default()))]
    pub async fn create_device(&self, input: DeviceInput) -> Result<Device, DeviceHubError> {
        let (id, device_type) = validation::validate_create(&input)?;
        let device = validation::build_device(id, device_type, &input)?;
        self.repo.create(device).await
    }

    /// Look up a device by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceHubError::NotFound`] when no device with `id` exists,
    /// or an error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_device(&self, id: DeviceId) -> Result<Device, DeviceHubError> {
        self.find_device(id.clone()).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Device",
                id: id.into_inner(),
            }
            .into()
        })
    }

    /// Look up a device by id, keeping absence as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error propagated from the repository.
    pub async fn find_device(&self, id: DeviceId) -> Result<Option<Device>, DeviceHubError> {
        self.repo.get_by_id(id).await
    }

    /// List all devices.
    ///
    /// # Errors
    ///
    /// Returns an error propagated from the repository.
    pub async fn list_devices(&self) -> Result<Vec<Device>, DeviceHubError> {
        self.repo.get_all().await
    }

    /// Replace the mutable fields of the device `id` with those in `input`.
    ///
    /// The supplied row version is compared with the stored one before the
    /// repository is asked to write anything.
    ///
    /// # Errors
    ///
    /// - [`DeviceHubError::Validation`] for malformed input, a missing row
    ///   version, a body id that differs from `id`, or a changed device type
    /// - [`DeviceHubError::NotFound`] when the device does not exist
    /// - [`DeviceHubError::Conflict`] when the row version is stale
    /// - any error propagated from the repository
    #[tracing::instrument(skip(self, input))]
    pub async fn edit_device(
        &self,
        id: DeviceId,
        input: DeviceInput,
    ) -> Result<Device, DeviceHubError> {
        let row_version = validation::validate_edit(&input)?;
        if let Some(body_id) = input.id.as_deref()
            && body_id != id.as_str()
        {
            return Err(ValidationError::IdMismatch {
                path: id.into_inner(),
                body: body_id.to_string(),
            }
            .into());
        }

        let mut device = self.get_device(id.clone()).await?;
        if device.row_version.as_ref() != Some(&row_version) {
            tracing::warn!(device_id = %id, "rejecting edit with stale row version");
            return Err(ConcurrencyConflictError {
                id: id.into_inner(),
                expected: row_version,
                actual: device.row_version,
            }
            .into());
        }

        let stored = device.device_type();
        if let Some(tag) = input.device_type.as_deref() {
            let requested = tag.parse::<DeviceType>()?;
            if requested != stored {
                return Err(ValidationError::TypeChanged { stored, requested }.into());
            }
        }

        let update = validation::build_device(id, stored, &input)?;
        device.apply_update(&update)?;
        self.repo.edit(device).await
    }

    /// Delete a device by id. Missing ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn remove_device(&self, id: DeviceId) -> Result<(), DeviceHubError> {
        self.repo.remove(id).await
    }

    /// Run the domain power-on rule against the stored device.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceHubError::NotFound`] when the device does not exist,
    /// or [`DeviceHubError::Precondition`] when it cannot be turned on.
    #[tracing::instrument(skip(self))]
    pub async fn turn_on_device(&self, id: DeviceId) -> Result<(), DeviceHubError> {
        self.get_device(id).await?.turn_on()
    }
}
