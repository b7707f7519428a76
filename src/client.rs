//! Asynchronous request/response engine for a single Daly BMS.
//!
//! # Example
//!
//! ```no_run
//! use dalylink::tokio_serial_async::SerialTransport;
//! use dalylink::{ClientConfig, DalyClient, Error};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0")?;
//!     let mut bms = DalyClient::new(transport, ClientConfig::default());
//!
//!     let soc = bms.get_soc().await?;
//!     println!("SOC: {:?}", soc);
//!
//!     // The cell count is requested from the BMS on first use and cached
//!     let cell_voltages = bms.get_cell_voltages().await?;
//!     println!("Cell Voltages: {:?}", cell_voltages);
//!
//!     Ok(())
//! }
//! ```

use crate::error::{Error, IncompleteFrames};
use crate::protocol::*;
use crate::transport::Transport;
use std::time::Duration;

/// Number of bytes discarded from the transport after a failed exchange.
///
/// Garbage beyond this bound leaves the link out of sync until the next failure.
pub const RESYNC_OVERREAD: usize = 100;

/// Settings of a [`DalyClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address the BMS answers with (byte 1 of every response)
    pub device_address: u8,
    /// Requester channel put into byte 1 of every request
    pub connection: ConnectionClass,
    /// How long to wait for a complete response
    pub timeout: Duration,
    /// How long to wait for stray bytes after a failed exchange
    pub resync_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_address: 0x01,
            connection: ConnectionClass::Host,
            timeout: Duration::from_secs(1),
            resync_timeout: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    pub fn with_device_address(mut self, address: u8) -> Self {
        self.device_address = address;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionClass) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_resync_timeout(mut self, timeout: Duration) -> Self {
        self.resync_timeout = timeout;
        self
    }
}

/// Cell and temperature sensor count learned from a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCounts {
    pub cells: u8,
    pub temperature_sensors: u8,
}

impl From<&StatusInformation> for DeviceCounts {
    fn from(status: &StatusInformation) -> Self {
        Self {
            cells: status.cells,
            temperature_sensors: status.temperature_sensors,
        }
    }
}

/// Talks to one BMS over a [`Transport`].
///
/// The link is half duplex and frames carry no correlation id, so only one
/// request may be in flight. Every operation takes `&mut self`; to share a client
/// between tasks put it behind a single owner such as a `tokio::sync::Mutex`.
///
/// Nothing is retried. A failed call leaves the client usable, the caller decides
/// whether to repeat it.
///
/// The configured [`timeout`](ClientConfig::timeout) applies to every exchange, including
/// the status request issued implicitly by the count-dependent calls.
#[derive(Debug)]
pub struct DalyClient<T> {
    transport: T,
    config: ClientConfig,
    device_counts: Option<DeviceCounts>,
}

impl<T: Transport> DalyClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            device_counts: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sets how long a call waits for the complete response.
    pub fn set_timeout(&mut self, timeout: Duration) {
        log::trace!("set timeout to {timeout:?}");
        self.config.timeout = timeout;
    }

    pub fn set_resync_timeout(&mut self, timeout: Duration) {
        log::trace!("set resync timeout to {timeout:?}");
        self.config.resync_timeout = timeout;
    }

    /// Counts cached from the last successful [`get_status`](Self::get_status).
    ///
    /// Once known they are trusted until [`forget_device_counts`](Self::forget_device_counts)
    /// is called, even if the BMS is reconfigured.
    pub fn device_counts(&self) -> Option<DeviceCounts> {
        self.device_counts
    }

    /// Drops the cached counts, the next call needing them requests a fresh status.
    pub fn forget_device_counts(&mut self) {
        log::debug!("forget cached device counts");
        self.device_counts = None;
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Returns the cached counts, requesting the status first if they are unknown.
    pub async fn ensure_device_counts(&mut self) -> Result<DeviceCounts, Error> {
        if let Some(counts) = self.device_counts {
            return Ok(counts);
        }
        log::debug!("device counts unknown, requesting status");
        let status = self.get_status().await?;
        Ok(DeviceCounts::from(&status))
    }

    /// Runs one exchange and decodes the validated payloads.
    ///
    /// Any failure once the request went out, including a rejected payload,
    /// drains the transport before the error is returned.
    async fn transact<R>(
        &mut self,
        command: Command,
        decode: impl FnOnce(&[Payload]) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let pending = PendingCommand::new(&command, self.config.timeout);
        let request = encode_request(self.config.connection, pending.code);

        log::trace!("write bytes: {request:02X?}");
        let written = self.transport.write(&request).await?;
        if written != request.len() {
            log::warn!(
                "Request not fully transmitted - expected={} written={}",
                request.len(),
                written
            );
            return Err(self
                .resync(Error::TransmitFailed {
                    expected: request.len(),
                    written,
                })
                .await);
        }

        let result = self
            .receive_frames(&pending)
            .await
            .and_then(|payloads| decode(&payloads));
        match result {
            Ok(response) => Ok(response),
            Err(err) => Err(self.resync(err).await),
        }
    }

    async fn receive_frames(&mut self, pending: &PendingCommand) -> Result<Vec<Payload>, Error> {
        let reply_size = pending.reply_size();
        log::trace!("read {reply_size} bytes");
        let rx_buffer = self
            .transport
            .read_exact(reply_size, pending.timeout)
            .await?;
        log::trace!("receive_bytes: {rx_buffer:02X?}");

        let mut payloads = Vec::with_capacity(pending.frames);
        for n_frame in 0..pending.frames {
            let end = (n_frame + 1) * FRAME_LENGTH;
            let Some(part) = rx_buffer.get(end - FRAME_LENGTH..end) else {
                log::warn!(
                    "Frame #{} ends at {} but only {} bytes were read",
                    n_frame + 1,
                    end,
                    rx_buffer.len()
                );
                return Err(Error::InvalidResponseLength {
                    expected: reply_size,
                    received: rx_buffer.len(),
                });
            };
            let frame = Frame::decode_authenticated(part, self.config.device_address)?;
            if frame.code() != pending.code {
                log::warn!(
                    "Frame answers command {:02X?}, expected {:02X?}",
                    frame.code().byte(),
                    pending.code.byte()
                );
                return Err(IncompleteFrames::CommandMismatch {
                    expected: pending.code.byte(),
                    received: frame.code().byte(),
                }
                .into());
            }
            payloads.push(frame.into_payload());
        }
        Ok(payloads)
    }

    /// Consumes stray bytes of a broken exchange and hands back `err`.
    async fn resync(&mut self, err: Error) -> Error {
        log::debug!("exchange failed ({err}), discarding up to {RESYNC_OVERREAD} bytes");
        match self
            .transport
            .read_exact(RESYNC_OVERREAD, self.config.resync_timeout)
            .await
        {
            Ok(discarded) => log::trace!("discarded {} bytes: {discarded:02X?}", discarded.len()),
            Err(drain_err) => log::trace!("resync read ended: {drain_err}"),
        }
        err
    }

    /// Retrieves the total voltage, current and State of Charge (SOC).
    pub async fn get_soc(&mut self) -> Result<StateOfCharge, Error> {
        log::trace!("get SOC");
        self.transact(Command::StateOfCharge, |payloads| {
            Ok(StateOfCharge::decode(single(payloads)?))
        })
        .await
    }

    /// Retrieves the highest and lowest cell voltage and the cells they were measured at.
    pub async fn get_cell_voltage_limits(&mut self) -> Result<CellVoltageLimits, Error> {
        log::trace!("get cell voltage limits");
        self.transact(Command::CellVoltageLimits, |payloads| {
            Ok(CellVoltageLimits::decode(single(payloads)?))
        })
        .await
    }

    /// Retrieves the highest and lowest temperature and the sensors they were measured at.
    pub async fn get_cell_temperature_limits(&mut self) -> Result<CellTemperatureLimits, Error> {
        log::trace!("get cell temperature limits");
        self.transact(Command::CellTemperatureLimits, |payloads| {
            Ok(CellTemperatureLimits::decode(single(payloads)?))
        })
        .await
    }

    pub async fn get_mosfet_status(&mut self) -> Result<MosfetStatus, Error> {
        log::trace!("get mosfet status");
        self.transact(Command::MosfetStatus, |payloads| {
            MosfetStatus::decode(single(payloads)?)
        })
        .await
    }

    /// Retrieves the general status, including cell and temperature sensor count.
    ///
    /// On success the counts are cached for [`get_cell_voltages`](Self::get_cell_voltages),
    /// [`get_cell_temperatures`](Self::get_cell_temperatures) and
    /// [`get_balancing_status`](Self::get_balancing_status).
    pub async fn get_status(&mut self) -> Result<StatusInformation, Error> {
        log::trace!("get status");
        let status = self
            .transact(Command::Status, |payloads| {
                Ok(StatusInformation::decode(single(payloads)?))
            })
            .await?;
        let counts = DeviceCounts::from(&status);
        log::debug!("cache device counts {counts:?}");
        self.device_counts = Some(counts);
        Ok(status)
    }

    /// Retrieves the voltage of every cell in V, in ascending cell order.
    ///
    /// Requests the status first if the cell count is not cached yet.
    pub async fn get_cell_voltages(&mut self) -> Result<Vec<f32>, Error> {
        log::trace!("get cell voltages");
        let cells = self.ensure_device_counts().await?.cells;
        if cells == 0 {
            return Ok(Vec::new());
        }
        let command = Command::CellVoltages { cells };
        self.transact(command, |payloads| {
            CellVoltages::decode(&reassemble(payloads, command.frame_count())?, cells)
        })
        .await
    }

    /// Retrieves the temperature of every sensor in °C, in ascending sensor order.
    ///
    /// Requests the status first if the sensor count is not cached yet.
    pub async fn get_cell_temperatures(&mut self) -> Result<Vec<i16>, Error> {
        log::trace!("get cell temperatures");
        let sensors = self.ensure_device_counts().await?.temperature_sensors;
        if sensors == 0 {
            return Ok(Vec::new());
        }
        let command = Command::Temperatures { sensors };
        self.transact(command, |payloads| {
            CellTemperatures::decode(&reassemble(payloads, command.frame_count())?, sensors)
        })
        .await
    }

    /// Retrieves the balancing state of every cell, `true` while balancing.
    ///
    /// Requests the status first if the cell count is not cached yet.
    pub async fn get_balancing_status(&mut self) -> Result<Vec<bool>, Error> {
        log::trace!("get balancing status");
        let cells = self.ensure_device_counts().await?.cells;
        self.transact(Command::BalanceStates, |payloads| {
            CellBalanceStates::decode(single(payloads)?, cells)
        })
        .await
    }

    /// Retrieves the active failure flags and the raw fault code.
    pub async fn get_failures(&mut self) -> Result<FailureStatus, Error> {
        log::trace!("get failures");
        self.transact(Command::Failures, |payloads| {
            Ok(FailureStatus::decode(single(payloads)?))
        })
        .await
    }
}

/// Payload of a single frame response.
fn single(payloads: &[Payload]) -> Result<&Payload, Error> {
    payloads.first().ok_or(Error::InvalidResponseLength {
        expected: FRAME_LENGTH,
        received: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HeaderField;
    use crate::transport::mock::MockTransport;

    const BMS: u8 = 0x01;

    fn reply(code: CommandCode, payload: Payload) -> [u8; FRAME_LENGTH] {
        Frame::new(BMS, code, payload).encode()
    }

    fn status_reply(cells: u8, sensors: u8) -> [u8; FRAME_LENGTH] {
        reply(CommandCode::Status, [cells, sensors, 1, 0, 0, 0, 5, 0])
    }

    fn client(transport: MockTransport) -> DalyClient<MockTransport> {
        DalyClient::new(transport, ClientConfig::default())
    }

    #[tokio::test]
    async fn soc_exchange() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(
            CommandCode::StateOfCharge,
            [0x01, 0x90, 0x01, 0x90, 0x75, 0x30, 0x03, 0xe8],
        ));
        let mut bms = client(transport);

        let soc = bms.get_soc().await.unwrap();
        assert_eq!(soc.total_voltage, 40.0);
        assert_eq!(soc.current, 0.0);
        assert_eq!(soc.soc_percent, 100.0);

        let transport = bms.into_inner();
        assert_eq!(
            transport.written,
            vec![encode_request(ConnectionClass::Host, CommandCode::StateOfCharge).to_vec()]
        );
    }

    #[tokio::test]
    async fn boxed_transport() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(CommandCode::Failures, [0, 0, 0, 0, 0, 0x01, 0, 3]));
        let transport: Box<dyn Transport> = Box::new(transport);
        let mut bms = DalyClient::new(transport, ClientConfig::default());

        let status = bms.get_failures().await.unwrap();
        assert!(status.failures.contains(FailureFlag::AfeCollectChipErr));
        assert_eq!(status.fault_code, 3);
    }

    #[tokio::test]
    async fn connection_class_in_request() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(CommandCode::Failures, [0; 8]));
        let config = ClientConfig::default().with_connection(ConnectionClass::Bluetooth);
        let mut bms = DalyClient::new(transport, config);

        let failures = bms.get_failures().await.unwrap();
        assert!(failures.failures.is_empty());
        assert_eq!(bms.into_inner().written[0][1], 0x80);
    }

    #[tokio::test]
    async fn status_is_cached() {
        let mut transport = MockTransport::new();
        transport.queue(&status_reply(4, 1));
        transport.queue(&reply(
            CommandCode::CellVoltages,
            [1, 0x0c, 0xe4, 0x0c, 0xe5, 0x0c, 0xe6, 0],
        ));
        transport.queue(&reply(CommandCode::CellVoltages, [2, 0x0c, 0xe7, 0, 0, 0, 0, 0]));
        let mut bms = client(transport);

        assert_eq!(bms.device_counts(), None);
        let status = bms.get_status().await.unwrap();
        assert_eq!(status.cells, 4);
        assert!(status.charger_connected);
        assert_eq!(
            bms.device_counts(),
            Some(DeviceCounts {
                cells: 4,
                temperature_sensors: 1
            })
        );

        let voltages = bms.get_cell_voltages().await.unwrap();
        assert_eq!(voltages, vec![3.3, 3.301, 3.302, 3.303]);

        let codes = bms.into_inner().requested_codes();
        assert_eq!(codes, vec![0x94, 0x95]);
    }

    #[tokio::test]
    async fn implicit_status_request() {
        let mut transport = MockTransport::new();
        transport.queue(&status_reply(4, 8));
        // sequence ids out of order
        transport.queue(&reply(CommandCode::Temperatures, [2, 41, 0, 0, 0, 0, 0, 0]));
        transport.queue(&reply(
            CommandCode::Temperatures,
            [1, 65, 64, 63, 62, 61, 60, 59],
        ));
        transport.queue(&reply(CommandCode::BalanceStates, [0x05, 0, 0, 0, 0, 0, 0, 0]));
        let mut bms = client(transport);

        let temperatures = bms.get_cell_temperatures().await.unwrap();
        assert_eq!(temperatures, vec![25, 24, 23, 22, 21, 20, 19, 1]);

        let balancing = bms.get_balancing_status().await.unwrap();
        assert_eq!(balancing, vec![true, false, true, false]);

        let codes = bms.into_inner().requested_codes();
        assert_eq!(codes, vec![0x94, 0x96, 0x97]);
    }

    #[tokio::test]
    async fn forget_device_counts_refreshes_status() {
        let mut transport = MockTransport::new();
        transport.queue(&status_reply(3, 1));
        transport.queue(&status_reply(2, 1));
        let mut bms = client(transport);

        assert_eq!(bms.ensure_device_counts().await.unwrap().cells, 3);
        assert_eq!(bms.ensure_device_counts().await.unwrap().cells, 3);
        bms.forget_device_counts();
        assert_eq!(bms.ensure_device_counts().await.unwrap().cells, 2);
        assert_eq!(bms.into_inner().requested_codes(), vec![0x94, 0x94]);
    }

    #[tokio::test]
    async fn no_cells_no_request() {
        let mut transport = MockTransport::new();
        transport.queue(&status_reply(0, 0));
        let mut bms = client(transport);

        assert!(bms.get_cell_voltages().await.unwrap().is_empty());
        assert!(bms.get_cell_temperatures().await.unwrap().is_empty());
        assert_eq!(bms.into_inner().requested_codes(), vec![0x94]);
    }

    #[tokio::test]
    async fn transmit_failed() {
        let mut transport = MockTransport::new();
        transport.short_write = Some(5);
        transport.queue(&[0xaa; 20]);
        let mut bms = client(transport);

        assert!(matches!(
            bms.get_soc().await,
            Err(Error::TransmitFailed {
                expected: 13,
                written: 5
            })
        ));
        // stray bytes were drained
        assert!(bms.into_inner().rx.is_empty());
    }

    #[tokio::test]
    async fn timeout_is_passed_through() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(CommandCode::StateOfCharge, [0; 8])[..7]);
        let mut bms = client(transport);

        let err = bms.get_soc().await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn corrupted_reply_is_drained() {
        let mut transport = MockTransport::new();
        let mut frame = reply(CommandCode::StateOfCharge, [0; 8]);
        frame[12] ^= 0xff;
        transport.queue(&frame);
        transport.queue(&[0x55; 30]);
        let mut bms = client(transport);

        assert!(matches!(
            bms.get_soc().await,
            Err(Error::ChecksumMismatch { .. })
        ));
        assert!(bms.into_inner().rx.is_empty());
    }

    #[tokio::test]
    async fn drain_is_bounded() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(CommandCode::Status, [0; 8]));
        transport.queue(&[0x55; 150]);
        let mut bms = client(transport);

        assert!(matches!(
            bms.get_soc().await,
            Err(Error::IncompleteFrames(IncompleteFrames::CommandMismatch {
                expected: 0x90,
                received: 0x94
            }))
        ));
        assert_eq!(bms.into_inner().rx.len(), 50);
    }

    #[tokio::test]
    async fn truncated_multi_frame_reply() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(
            CommandCode::CellVoltages,
            [1, 0x0c, 0xe4, 0x0c, 0xe5, 0x0c, 0xe6, 0],
        ));
        transport.queue(&[0xa5, BMS, 0x95, 0x08, 2, 0x0c, 0xe7]);
        transport.queue(&[0x55; 10]);
        transport.short_read = Some(20);
        let mut bms = client(transport);
        bms.device_counts = Some(DeviceCounts {
            cells: 6,
            temperature_sensors: 1,
        });

        assert!(matches!(
            bms.get_cell_voltages().await,
            Err(Error::InvalidResponseLength {
                expected: 26,
                received: 20
            })
        ));
        // remainder was drained
        assert!(bms.into_inner().rx.is_empty());
    }

    #[tokio::test]
    async fn foreign_device_is_rejected() {
        let mut transport = MockTransport::new();
        transport.queue(&Frame::new(0x02, CommandCode::StateOfCharge, [0; 8]).encode());
        let mut bms = client(transport);

        assert!(matches!(
            bms.get_soc().await,
            Err(Error::HeaderMismatch(HeaderField::DeviceAddress {
                expected: BMS,
                received: 0x02
            }))
        ));
    }

    #[tokio::test]
    async fn missing_sequence_id() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(CommandCode::CellVoltages, [1, 0, 0, 0, 0, 0, 0, 0]));
        transport.queue(&reply(CommandCode::CellVoltages, [1, 0, 0, 0, 0, 0, 0, 0]));
        transport.queue(&[0x55; 3]);
        let mut bms = client(transport);
        bms.device_counts = Some(DeviceCounts {
            cells: 6,
            temperature_sensors: 1,
        });

        assert!(matches!(
            bms.get_cell_voltages().await,
            Err(Error::IncompleteFrames(IncompleteFrames::SequenceGap { .. }))
        ));
        let transport = bms.into_inner();
        assert_eq!(transport.requested_codes(), vec![0x95]);
        assert!(transport.rx.is_empty());
    }

    #[tokio::test]
    async fn invalid_mosfet_mode() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(CommandCode::MosfetStatus, [7, 0, 0, 0, 0, 0, 0, 0]));
        transport.queue(&[0x55; 13]);
        let mut bms = client(transport);

        assert!(matches!(
            bms.get_mosfet_status().await,
            Err(Error::InvalidEnumValue { value: 7, .. })
        ));
        assert!(bms.into_inner().rx.is_empty());
    }

    #[tokio::test]
    async fn failed_status_keeps_cache_empty() {
        let mut transport = MockTransport::new();
        let mut frame = status_reply(4, 1);
        frame[0] = 0x00;
        frame[12] = checksum(&frame[..12]);
        transport.queue(&frame);
        let mut bms = client(transport);

        assert!(matches!(
            bms.get_cell_voltages().await,
            Err(Error::HeaderMismatch(HeaderField::StartByte(0x00)))
        ));
        assert_eq!(bms.device_counts(), None);
    }

    #[tokio::test]
    async fn limits() {
        let mut transport = MockTransport::new();
        transport.queue(&reply(
            CommandCode::CellVoltageLimits,
            [0x0d, 0x05, 3, 0x0c, 0xf8, 11, 0, 0],
        ));
        transport.queue(&reply(
            CommandCode::CellTemperatureLimits,
            [0x41, 1, 0x23, 2, 0, 0, 0, 0],
        ));
        let mut bms = client(transport);

        let voltage = bms.get_cell_voltage_limits().await.unwrap();
        assert_eq!(voltage.highest_voltage, 3.333);
        assert_eq!(voltage.lowest_cell, 11);
        let temperature = bms.get_cell_temperature_limits().await.unwrap();
        assert_eq!(temperature.highest_temperature, 25);
        assert_eq!(temperature.lowest_temperature, -5);
    }
}
