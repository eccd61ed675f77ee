use std::{
    fmt,
    io::{Read, Write},
    sync::RwLock,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serialport::{SerialPortType, UsbPortInfo};

use crate::error::ConnectionError;

/// Both boards run firmware fixed at this rate.
pub const BAUD_RATE: u32 = 9600;

/// Short enough that a reader thread notices cancellation promptly.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Opaque identification of the device behind a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub port_name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceInfo {
    pub fn named(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            vendor_id: None,
            product_id: None,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |value: Option<u16>| value.map(|v| v.to_string()).unwrap_or_default();
        write!(
            f,
            "Serial Port {} {} ({})",
            id(self.vendor_id),
            id(self.product_id),
            self.port_name
        )
    }
}

/// Which physical port a session should claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "kind", content = "name")]
pub enum PortSelector {
    /// First USB serial port found.
    #[default]
    FirstUsb,
    Named(String),
}

impl PortSelector {
    /// `usb` (any case) picks the first USB port; anything else names a port.
    pub fn from_arg(arg: &str) -> Self {
        let arg = arg.trim();
        if arg.eq_ignore_ascii_case("usb") {
            PortSelector::FirstUsb
        } else {
            PortSelector::Named(arg.to_string())
        }
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::FirstUsb => f.write_str("first USB port"),
            PortSelector::Named(name) => f.write_str(name),
        }
    }
}

/// Closes the underlying port. Callers join the reader thread and close the
/// writer first, so this drops the last open handle.
pub trait PortControl: Send {
    fn close(self: Box<Self>) -> std::io::Result<()>;
}

/// An opened port split into independent read and write handles.
pub struct OpenedPort {
    pub info: DeviceInfo,
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub control: Box<dyn PortControl>,
}

/// Platform capability that grants access to a physical port.
///
/// `request_port` blocks; callers run it off the async executor.
pub trait PortProvider: Send + Sync {
    fn request_port(&self, baud_rate: u32) -> Result<OpenedPort, ConnectionError>;
}

/// Enumerate serial ports visible to the platform.
pub fn list_ports() -> Result<Vec<DeviceInfo>, ConnectionError> {
    let ports = serialport::available_ports()
        .map_err(|err| ConnectionError::Unsupported(err.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(UsbPortInfo { vid, pid, .. }) => DeviceInfo {
                port_name: port.port_name,
                vendor_id: Some(vid),
                product_id: Some(pid),
            },
            _ => DeviceInfo::named(port.port_name),
        })
        .collect())
}

/// Opens real hardware through the `serialport` crate.
pub struct HardwarePortProvider {
    selector: RwLock<PortSelector>,
}

impl HardwarePortProvider {
    pub fn new(selector: PortSelector) -> Self {
        Self {
            selector: RwLock::new(selector),
        }
    }

    pub fn selector(&self) -> PortSelector {
        self.selector
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Takes effect on the next connect.
    pub fn set_selector(&self, selector: PortSelector) {
        *self
            .selector
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = selector;
    }

    fn select(&self) -> Result<DeviceInfo, ConnectionError> {
        let ports = list_ports()?;

        let found = match self.selector() {
            PortSelector::Named(name) => ports
                .into_iter()
                .find(|port| port.port_name == name)
                // Ports that do not enumerate (e.g. pseudo terminals) may still open.
                .or_else(|| Some(DeviceInfo::named(name))),
            PortSelector::FirstUsb => ports.into_iter().find(|port| port.vendor_id.is_some()),
        };

        found.ok_or_else(|| {
            ConnectionError::PermissionDenied("no USB serial device available".to_string())
        })
    }
}

impl PortProvider for HardwarePortProvider {
    fn request_port(&self, baud_rate: u32) -> Result<OpenedPort, ConnectionError> {
        let info = self.select()?;

        let open_error = |err: serialport::Error| ConnectionError::Open {
            port: info.port_name.clone(),
            message: err.to_string(),
        };

        let port = serialport::new(&info.port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(open_error)?;

        let reader = port.try_clone().map_err(open_error)?;
        let writer = port.try_clone().map_err(open_error)?;

        Ok(OpenedPort {
            info,
            reader: Box::new(reader),
            writer: Box::new(writer),
            control: Box::new(HardwarePortControl { port }),
        })
    }
}

struct HardwarePortControl {
    port: Box<dyn serialport::SerialPort>,
}

impl PortControl for HardwarePortControl {
    fn close(self: Box<Self>) -> std::io::Result<()> {
        // Reader and writer clones are gone by now; this frees the OS handle.
        drop(self.port);
        Ok(())
    }
}
