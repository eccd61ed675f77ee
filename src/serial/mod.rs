pub mod decode;
pub mod handles;
pub mod port;
pub mod session;
pub mod state;

#[cfg(test)]
pub mod mock;

pub use port::{list_ports, DeviceInfo, HardwarePortProvider, PortProvider, PortSelector, BAUD_RATE};
pub use session::{NoopObserver, SerialSession, SessionObserver};
pub use state::{ConnectionStatus, SessionState};
