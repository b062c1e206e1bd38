use crate::model::DeviceInfo;

/// Asks the user which attached device to use
pub trait DeviceSelector: Send + Sync {
    /// Id of the chosen device, or `None` if the user backed out
    fn select_device(&self, devices: &[DeviceInfo]) -> Option<String>;
}

/// Always picks the first listed device
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstDeviceSelector;

impl DeviceSelector for FirstDeviceSelector {
    fn select_device(&self, devices: &[DeviceInfo]) -> Option<String> {
        devices.first().map(|device| device.device_id.clone())
    }
}
