//! OBD-II Client for ELM327 Adapters
//!
//! Provides async serial communication with OBD-II adapters.

use crate::error::ObdError;
use crate::mode;
use crate::pid::{ParameterId, PidResponse};
use crate::source::ParameterSource;
use crate::support::{SupportedPids, SUPPORT_RANGES};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Default timeout for OBD commands
const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Adapter setup: reset, echo off, linefeeds off, spaces off, automatic protocol
const INIT_SEQUENCE: [&str; 5] = ["ATZ", "ATE0", "ATL0", "ATS0", "ATSP0"];

/// Late answers to earlier requests skipped before a reply is given up on
const MAX_STALE_REPLIES: usize = 2;

/// OBD-II client for communicating with ELM327-compatible adapters
pub struct ObdClient {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    device: String,
    /// Serial baud rate
    baud_rate: u32,
    /// Command timeout
    timeout: Duration,
    /// Open serial stream, if any
    port: Option<SerialStream>,
    /// Whether the client is connected
    connected: bool,
    /// Mock mode for testing (uses simulated responses)
    mock_mode: bool,
    /// An exchange was cut short; its reply may still be in the input buffer
    resync: bool,
}

impl ObdClient {
    /// Create a new OBD client
    ///
    /// # Arguments
    /// * `device` - Serial port device path
    /// * `baud_rate` - Baud rate for serial communication
    pub async fn new(device: &str, baud_rate: u32) -> Result<Self, ObdError> {
        info!("Creating OBD client for device: {}", device);

        Ok(Self {
            device: device.to_string(),
            baud_rate,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            port: None,
            connected: false,
            mock_mode: false,
            resync: false,
        })
    }

    /// Create a mock OBD client for testing (no hardware required)
    pub fn mock() -> Self {
        info!("Creating mock OBD client");
        Self {
            device: "mock".to_string(),
            baud_rate: 0,
            timeout: Duration::from_millis(100),
            port: None,
            connected: true,
            mock_mode: true,
            resync: false,
        }
    }

    /// Open the serial port and initialize the ELM327 adapter
    pub async fn initialize(&mut self) -> Result<(), ObdError> {
        if self.mock_mode {
            debug!("Mock mode: skipping initialization");
            self.connected = true;
            return Ok(());
        }

        info!("Initializing OBD adapter on {}", self.device);

        let port = tokio_serial::new(&self.device, self.baud_rate)
            .timeout(self.timeout)
            .open_native_async()?;
        self.port = Some(port);
        self.resync = false;

        for command in INIT_SEQUENCE {
            let reply = self.send_command(command, None).await?;
            debug!("{} -> {:?}", command, reply);
        }

        // A Mode 01 PID 00 request proves the ECU is reachable, not only the adapter
        let reply = self.send_command("0100", Some("4100")).await?;
        if !normalize(&reply).contains("4100") {
            self.port = None;
            return Err(ObdError::VehicleNotConnected);
        }

        self.connected = true;
        info!("OBD adapter initialized successfully");
        Ok(())
    }

    /// Query a parameter and return the decoded response
    pub async fn query(&mut self, parameter: ParameterId) -> Result<PidResponse, ObdError> {
        if !self.connected {
            return Err(ObdError::AdapterNotResponding);
        }

        let timestamp_ms = now_ms();

        if self.mock_mode {
            return self.generate_mock_response(parameter, timestamp_ms);
        }

        let Some(pid) = parameter.pid() else {
            let value = self.read_voltage().await?;
            return Ok(PidResponse {
                parameter,
                timestamp_ms,
                value,
                raw_bytes: Vec::new(),
            });
        };

        debug!("Querying PID {:02X} ({})", pid, parameter);
        let bytes = self.query_mode01(parameter.name(), pid).await?;
        PidResponse::decode(parameter, bytes, timestamp_ms)
    }

    async fn query_mode01(&mut self, label: &'static str, pid: u8) -> Result<Vec<u8>, ObdError> {
        let header = mode01_header(pid);
        let reply = self
            .send_command(&format!("{:02X}{:02X}", mode::CURRENT_DATA, pid), Some(&header))
            .await?;
        parse_mode01_reply(label, pid, &reply)
    }

    /// Ask the ECU which Mode 01 PIDs it supports (PIDs 00, 20, 40).
    ///
    /// Ranges are followed only while the previous bitmap advertises the
    /// next one. The mock client supports the whole catalogue.
    pub async fn supported_pids(&mut self) -> Result<SupportedPids, ObdError> {
        if self.mock_mode {
            return Ok(SupportedPids::all_catalogue());
        }
        if !self.connected {
            return Err(ObdError::AdapterNotResponding);
        }

        let mut support = SupportedPids::new();
        for base in SUPPORT_RANGES {
            let bytes = self.query_mode01("PIDS_SUPPORTED", base).await?;
            support.add_bitmap(base, &bytes)?;
            if !support.has_next_range(base) {
                break;
            }
        }
        info!("ECU reports {} supported PIDs", support.len());
        Ok(support)
    }

    /// Catalogue parameters the ECU can answer
    pub async fn supported_parameters(&mut self) -> Result<Vec<ParameterId>, ObdError> {
        Ok(self.supported_pids().await?.parameters())
    }

    /// Set command timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Set the command timeout a quarter below `bound`, so an exchange that
    /// times out is cleaned up here before a caller bounded by `bound` gives up
    pub fn set_timeout_within(&mut self, bound: Duration) {
        self.timeout = bound.mul_f64(0.75);
    }

    /// Check if client is connected
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Disconnect from the OBD adapter
    pub async fn disconnect(&mut self) {
        if self.connected {
            info!("Disconnecting OBD client");
            self.connected = false;
        }
        self.port = None;
        self.resync = false;
    }

    async fn read_voltage(&mut self) -> Result<f64, ObdError> {
        let reply = self.send_command("ATRV", None).await?;
        let text = normalize(&reply);
        text.trim_end_matches('V')
            .parse::<f64>()
            .map_err(|_| ObdError::InvalidResponse(format!("ATRV reply {:?}", reply)))
    }

    /// Write one command and collect the reply up to the `>` prompt.
    ///
    /// With `expect` set, Mode 01 replies for other PIDs (late answers to
    /// earlier commands) are skipped.
    async fn send_command(&mut self, command: &str, expect: Option<&str>) -> Result<String, ObdError> {
        let timeout = self.timeout;
        let port = self.port.as_mut().ok_or(ObdError::AdapterNotResponding)?;

        if self.resync {
            debug!("Discarding buffered input before {}", command);
            if let Err(e) = port.clear(ClearBuffer::Input) {
                warn!("Failed to clear serial input on {}: {}", self.device, e);
            }
        }
        // Stays set if this future is dropped mid-exchange
        self.resync = true;

        let exchange = async {
            port.write_all(format!("{}\r", command).as_bytes()).await?;
            read_reply(port, expect).await
        };

        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ObdError::Timeout(timeout.as_millis() as u64)),
        };

        match result {
            Ok(reply) => {
                self.resync = false;
                Ok(reply)
            }
            Err(e) => {
                if matches!(e, ObdError::SerialError(_) | ObdError::AdapterNotResponding) {
                    warn!("Serial link to {} lost: {}", self.device, e);
                    self.connected = false;
                    self.port = None;
                }
                Err(e)
            }
        }
    }

    /// Generate a mock response for testing
    fn generate_mock_response(
        &self,
        parameter: ParameterId,
        timestamp_ms: u64,
    ) -> Result<PidResponse, ObdError> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        // Use the second and parameter to generate pseudo-random but deterministic values
        let mut hasher = DefaultHasher::new();
        (timestamp_ms / 1000).hash(&mut hasher);
        parameter.hash(&mut hasher);
        let hash = hasher.finish();

        let raw_bytes = match parameter {
            // RPM: 800-3500 RPM range
            ParameterId::Rpm => {
                let rpm = 800 + (hash % 2700) as u16;
                let encoded = rpm * 4;
                vec![(encoded >> 8) as u8, (encoded & 0xFF) as u8]
            }
            // Speed: 0-120 km/h
            ParameterId::Speed => vec![(hash % 120) as u8],
            // Temperatures: 70-105°C coolant, 15-50°C intake (stored as value + 40)
            ParameterId::CoolantTemp => vec![(110 + (hash % 35)) as u8],
            ParameterId::IntakeTemp => vec![(55 + (hash % 35)) as u8],
            // MAF: 2-40 g/s
            ParameterId::Maf => {
                let maf = 200 + (hash % 3800) as u16;
                vec![(maf >> 8) as u8, (maf & 0xFF) as u8]
            }
            ParameterId::AbsoluteLoad => {
                let load = 50 + (hash % 150) as u16;
                vec![(load >> 8) as u8, (load & 0xFF) as u8]
            }
            // Fuel trims: -10% to +10%
            ParameterId::ShortFuelTrim1 | ParameterId::LongFuelTrim1 => {
                vec![(115 + (hash % 26)) as u8]
            }
            // O2 voltage: 0.1-0.9V
            ParameterId::O2B1S1 | ParameterId::O2B1S2 => vec![(20 + (hash % 160)) as u8, 0xFF],
            // MAP: 30-100 kPa
            ParameterId::IntakePressure => vec![(30 + (hash % 70)) as u8],
            // Percentages: 20-80%
            ParameterId::ThrottlePos
            | ParameterId::RelativeThrottlePos
            | ParameterId::EngineLoad
            | ParameterId::AcceleratorPosD
            | ParameterId::FuelLevel => vec![(51 + (hash % 153)) as u8],
            ParameterId::ElmVoltage => {
                return Ok(PidResponse {
                    parameter,
                    timestamp_ms,
                    value: 13.8 + (hash % 10) as f64 / 10.0,
                    raw_bytes: Vec::new(),
                });
            }
        };

        PidResponse::decode(parameter, raw_bytes, timestamp_ms)
    }
}

impl ParameterSource for ObdClient {
    async fn read(&mut self, parameter: ParameterId) -> Result<f64, ObdError> {
        self.query(parameter).await.map(|response| response.value)
    }

    async fn reconnect(&mut self) -> Result<(), ObdError> {
        info!("Reconnecting OBD client on {}", self.device);
        self.disconnect().await;
        self.initialize().await
    }
}

async fn read_until_prompt<R: AsyncRead + Unpin>(port: &mut R) -> Result<Vec<u8>, ObdError> {
    let mut reply = Vec::with_capacity(64);
    let mut buf = [0u8; 64];
    loop {
        let n = port.read(&mut buf).await?;
        if n == 0 {
            return Err(ObdError::AdapterNotResponding);
        }
        reply.extend_from_slice(&buf[..n]);
        if let Some(prompt) = reply.iter().position(|&b| b == b'>') {
            reply.truncate(prompt);
            return Ok(reply);
        }
    }
}

/// Read one reply, skipping late Mode 01 answers that do not carry `expect`
async fn read_reply<R: AsyncRead + Unpin>(
    port: &mut R,
    expect: Option<&str>,
) -> Result<String, ObdError> {
    let mut skipped = 0;
    loop {
        let raw = read_until_prompt(port).await?;
        let reply = String::from_utf8_lossy(&raw).trim().to_string();
        match expect {
            Some(header) if is_other_mode01_reply(&reply, header) => {
                if skipped == MAX_STALE_REPLIES {
                    return Err(ObdError::InvalidResponse(format!(
                        "expected {} but kept reading {:?}",
                        header, reply
                    )));
                }
                debug!("Skipping late reply {:?} (waiting for {})", reply, header);
                skipped += 1;
            }
            _ => return Ok(reply),
        }
    }
}

/// Upper-case and strip whitespace and the `SEARCHING...` banner
fn normalize(reply: &str) -> String {
    reply
        .to_ascii_uppercase()
        .replace("SEARCHING...", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Reply lines, upper-cased with whitespace removed
fn reply_lines(reply: &str) -> impl Iterator<Item = String> + '_ {
    reply
        .split(|c| c == '\r' || c == '\n')
        .map(|l| {
            l.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_uppercase()
                .replace("SEARCHING...", "")
        })
        .filter(|l| !l.is_empty())
}

fn mode01_header(pid: u8) -> String {
    format!("{:02X}{:02X}", mode::CURRENT_DATA + 0x40, pid)
}

/// A positive Mode 01 answer that belongs to a different PID
fn is_other_mode01_reply(reply: &str, header: &str) -> bool {
    let positive = format!("{:02X}", mode::CURRENT_DATA + 0x40);
    let mut lines = reply_lines(reply).peekable();
    lines.peek().is_some()
        && lines.all(|l| l.starts_with(&positive) && !l.starts_with(header))
}

/// Extract the data bytes of a Mode 01 reply (`41 <pid> <data...>`)
fn parse_mode01_reply(label: &'static str, pid: u8, reply: &str) -> Result<Vec<u8>, ObdError> {
    // Line noise decodes to U+FFFD; nothing past here may slice inside it
    if !reply.is_ascii() {
        return Err(ObdError::InvalidResponse(format!(
            "{}: non-ASCII bytes in {:?}",
            label, reply
        )));
    }

    let upper = reply.to_ascii_uppercase();
    if upper.contains("NO DATA") || upper.contains("NODATA") {
        return Err(ObdError::NoData(label));
    }
    if upper.contains("UNABLE TO CONNECT") || upper.contains("BUS INIT") {
        return Err(ObdError::VehicleNotConnected);
    }

    let header = mode01_header(pid);
    let line = reply_lines(reply)
        .find(|l| l.starts_with(&header))
        .ok_or_else(|| ObdError::InvalidResponse(format!("{}: {:?}", label, reply)))?;

    let data = &line.as_bytes()[header.len()..];
    if data.len() % 2 != 0 {
        return Err(ObdError::InvalidResponse(format!("odd hex length in {:?}", line)));
    }
    data.chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| ObdError::InvalidResponse(format!("bad hex in {:?}", line)))
        })
        .collect()
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
