//! UART backend built on the `serialport` crate.

use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::info;

use crate::channel::{Channel, ChannelConfig};
use crate::error::{Result, TransportError};

/// A serial port visible to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
}

/// Open `path` as 8N1 without flow control and start a channel over it.
pub fn open_serial(path: &str, baud_rate: u32, config: ChannelConfig) -> Result<Channel> {
    let port = serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.poll_interval.max(Duration::from_millis(1)))
        .open()
        .map_err(|e| TransportError::Open {
            path: path.to_string(),
            source: e.into(),
        })?;

    info!(path, baud_rate, "serial port opened");
    Channel::with_config(port, config)
}

/// List the serial ports the host knows about.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|e| TransportError::Io {
        location: "available_ports",
        source: e.into(),
    })?;

    Ok(ports
        .into_iter()
        .map(|p| PortInfo {
            kind: match p.port_type {
                serialport::SerialPortType::UsbPort(_) => "usb",
                serialport::SerialPortType::PciPort => "pci",
                serialport::SerialPortType::BluetoothPort => "bluetooth",
                serialport::SerialPortType::Unknown => "unknown",
            }
            .to_string(),
            name: p.port_name,
        })
        .collect())
}
