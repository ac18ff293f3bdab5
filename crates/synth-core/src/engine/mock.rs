//! Backend en memoria: acusa todo con `OK:` y guarda el tráfico.

use super::backend::{BackendKind, BackendSettings, DeviceBackend, DeviceCommand, TransportError};

#[derive(Debug, Default)]
pub struct MockBackend {
    settings: BackendSettings,
    connected: bool,
    sent: Vec<String>,
}

impl MockBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings,
               connected: false,
               sent: Vec::new() }
    }

    /// Líneas enviadas, en orden.
    pub fn sent(&self) -> &[String] { &self.sent }
}

impl DeviceBackend for MockBackend {
    fn kind(&self) -> BackendKind { BackendKind::Mock }

    fn settings(&self) -> &BackendSettings { &self.settings }

    fn connect(&mut self) -> bool {
        self.connected = true;
        true
    }

    fn disconnect(&mut self) -> bool {
        self.connected = false;
        true
    }

    fn is_connected(&self) -> bool { self.connected }

    fn send(&mut self, command: &DeviceCommand) -> Result<String, TransportError> {
        let line = command.wire(&self.settings.device_ids);
        self.sent.push(line.clone());
        Ok(format!("OK:{line}"))
    }
}
