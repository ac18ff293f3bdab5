//! Backend TCP para el controlador Opta.
//!
//! Protocolo de líneas: un comando terminado en `\n` por envío y una línea de
//! respuesta por comando. El backend no reintenta ni interpreta la
//! respuesta; eso lo hace el motor. Al desconectar se para la bomba y se
//! cierra el solenoide.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use log::{debug, info, warn};

use synth_core::engine::{BackendKind, BackendSettings, DeviceBackend, DeviceCommand, TransportError};

use crate::config::OptaConfig;
use crate::error::HardwareError;

struct Connection {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

pub struct OptaBackend {
    config: OptaConfig,
    settings: BackendSettings,
    connection: Option<Connection>,
}

impl std::fmt::Debug for OptaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptaBackend")
         .field("address", &self.config.address())
         .field("connected", &self.connection.is_some())
         .finish()
    }
}

impl OptaBackend {
    pub fn new(config: OptaConfig) -> Self {
        let settings = config.backend_settings();
        Self { config,
               settings,
               connection: None }
    }

    pub fn config(&self) -> &OptaConfig { &self.config }

    /// Conecta devolviendo el motivo del fallo.
    pub fn try_connect(&mut self) -> Result<(), HardwareError> {
        if self.connection.is_some() {
            return Ok(());
        }
        let address = self.config.address();
        let connect_err = |source| HardwareError::Connect { address: address.clone(),
                                                            source };
        let target = address.to_socket_addrs()
                            .map_err(connect_err)?
                            .next()
                            .ok_or_else(|| connect_err(std::io::Error::new(ErrorKind::NotFound, "address did not resolve")))?;
        let stream = TcpStream::connect_timeout(&target, self.config.timeout).map_err(connect_err)?;
        stream.set_read_timeout(Some(self.config.timeout))?;
        stream.set_write_timeout(Some(self.config.timeout))?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        self.connection = Some(Connection { writer: stream,
                                            reader });
        info!("connected to Opta controller at {address}");
        if !self.config.warmup.is_zero() {
            debug!("warmup {}ms", self.config.warmup.as_millis());
            std::thread::sleep(self.config.warmup);
        }
        Ok(())
    }

    /// Consulta `STATUS` y devuelve la línea cruda.
    pub fn status(&mut self) -> Result<String, HardwareError> {
        if self.connection.is_none() {
            return Err(HardwareError::NotConnected);
        }
        Ok(self.send(&DeviceCommand::Status)?)
    }

    fn exchange(&mut self, line: &str) -> std::io::Result<String> {
        let connection = self.connection
                             .as_mut()
                             .ok_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "not connected"))?;
        connection.writer.write_all(line.as_bytes())?;
        connection.writer.write_all(b"\n")?;
        connection.writer.flush()?;
        let mut response = String::new();
        if connection.reader.read_line(&mut response)? == 0 {
            return Err(std::io::Error::new(ErrorKind::UnexpectedEof, "connection closed by controller"));
        }
        Ok(response.trim().to_string())
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.writer.shutdown(Shutdown::Both);
            info!("disconnected from {}", self.config.address());
        }
    }
}

impl DeviceBackend for OptaBackend {
    fn kind(&self) -> BackendKind { BackendKind::Hardware }

    fn settings(&self) -> &BackendSettings { &self.settings }

    fn connect(&mut self) -> bool {
        match self.try_connect() {
            Ok(()) => true,
            Err(e) => {
                warn!("{e}");
                false
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        if self.connection.is_none() {
            return true;
        }
        for command in [DeviceCommand::PumpStop, DeviceCommand::SolenoidOff] {
            if let Err(e) = self.send(&command) {
                warn!("safe-state {} failed: {e}", command.wire(&self.settings.device_ids));
            }
        }
        self.close();
        true
    }

    fn is_connected(&self) -> bool { self.connection.is_some() }

    fn send(&mut self, command: &DeviceCommand) -> Result<String, TransportError> {
        let line = command.wire(&self.settings.device_ids);
        match self.exchange(&line) {
            Ok(response) => {
                debug!("{line} -> {response}");
                Ok(response)
            }
            Err(e) => {
                // Un timeout deja la conexión usable; el resto la invalida.
                if !matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::NotConnected) {
                    warn!("{line}: {e}; dropping connection");
                    self.close();
                }
                Err(TransportError(format!("{line}: {e}")))
            }
        }
    }
}

impl Drop for OptaBackend {
    fn drop(&mut self) { self.disconnect(); }
}
