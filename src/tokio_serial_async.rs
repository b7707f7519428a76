//! Serial port [`Transport`] for Tokio applications, based on `tokio-serial`.
//!
//! # Example
//!
//! ```no_run
//! use dalylink::tokio_serial_async::SerialTransport;
//! use dalylink::{ClientConfig, DalyClient, Error};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let mut transport = SerialTransport::open("/dev/ttyUSB0")?;
//!     transport.set_delay(Duration::from_millis(15));
//!
//!     let config = ClientConfig::default().with_timeout(Duration::from_millis(500));
//!     let mut bms = DalyClient::new(transport, config);
//!     println!("Status: {:?}", bms.get_status().await?);
//!     Ok(())
//! }
//! ```

use crate::transport::Transport;
use crate::Error;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt};

// https://minimalmodbus.readthedocs.io/en/stable/serialcommunication.html#timing-of-the-serial-communications
// minimum delay 4ms by baud rate 9600
pub const MINIMUM_DELAY: Duration = Duration::from_millis(4);

/// Upper bound for a single call that clears stale input before a request.
const CLEAR_TIMEOUT: Duration = Duration::from_millis(100);

/// Reads spent at most on clearing stale input before a request is sent anyway.
const MAX_CLEAR_READS: usize = 16;

/// A serial link to the BMS (9600 baud, 8N1, no flow control).
#[derive(Debug)]
pub struct SerialTransport {
    serial: tokio_serial::SerialStream,
    last_execution: Instant,
    delay: Duration, // Delay between commands
    io_timeout: Duration,
}

impl SerialTransport {
    /// Opens the serial port device (e.g. `/dev/ttyUSB0` on Linux, `COM3` on Windows).
    pub fn open(port: &str) -> Result<Self, Error> {
        log::debug!("open serial port {port}");
        Ok(Self {
            serial: tokio_serial::new(port, 9600)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()?,
            last_execution: Instant::now(),
            delay: MINIMUM_DELAY,
            io_timeout: Duration::from_secs(1),
        })
    }

    /// Sets how long writing a request may take before it fails with `TimedOut`.
    pub fn set_timeout(&mut self, timeout: Duration) {
        log::trace!("set write timeout to {timeout:?}");
        self.io_timeout = timeout;
    }

    /// Sets the minimum delay between two requests.
    ///
    /// Values below [`MINIMUM_DELAY`] are raised to it.
    pub fn set_delay(&mut self, delay: Duration) {
        if delay < MINIMUM_DELAY {
            log::warn!("delay {delay:?} lower minimum {MINIMUM_DELAY:?}, use minimum");
            self.delay = MINIMUM_DELAY;
        } else {
            self.delay = delay;
        }
        log::trace!("set delay to {:?}", self.delay);
    }

    async fn await_delay(&self) {
        let last_exec_diff = Instant::now().duration_since(self.last_execution);
        if let Some(time_until_delay_reached) = self.delay.checked_sub(last_exec_diff) {
            tokio::time::sleep(time_until_delay_reached).await;
        }
    }

}

/// Discards input that arrived after the previous exchange, e.g. a late answer
/// to a request that already timed out.
///
/// A peer that keeps sending is given up on after [`MAX_CLEAR_READS`] reads.
async fn clear_input<R: AsyncRead + Unpin>(
    reader: &mut R,
    mut pending: impl FnMut(&R) -> std::io::Result<u32>,
) -> std::io::Result<()> {
    let mut buf = [0; 64];
    for _ in 0..MAX_CLEAR_READS {
        let count = pending(&*reader)?;
        if count == 0 {
            return Ok(());
        }
        log::trace!("got {count} pending bytes");
        let received = tokio::time::timeout(CLEAR_TIMEOUT, reader.read(&mut buf))
            .await
            .map_err(timed_out)??;
        log::trace!("{received} pending bytes consumed");
    }
    log::warn!("input still pending after {MAX_CLEAR_READS} reads, sending request anyway");
    Ok(())
}

async fn write_within<W: AsyncWrite + Unpin>(
    writer: &mut W,
    buffer: &[u8],
    timeout: Duration,
) -> std::io::Result<usize> {
    tokio::time::timeout(timeout, writer.write(buffer))
        .await
        .map_err(timed_out)?
}

fn timed_out(elapsed: tokio::time::error::Elapsed) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, elapsed)
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        clear_input(&mut self.serial, |serial| Ok(serial.bytes_to_read()?)).await?;
        self.await_delay().await;

        let written = write_within(&mut self.serial, buffer, self.io_timeout).await?;
        self.last_execution = Instant::now();
        Ok(written)
    }

    async fn read_exact(&mut self, count: usize, timeout: Duration) -> std::io::Result<Vec<u8>> {
        let mut rx_buffer = vec![0; count];
        let mut received = 0;
        let read = tokio::time::timeout(timeout, async {
            while received < count {
                match self.serial.read(&mut rx_buffer[received..]).await? {
                    0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
                    n => received += n,
                }
            }
            Ok::<_, std::io::Error>(())
        })
        .await;
        self.last_execution = Instant::now();

        match read {
            Ok(Ok(())) => Ok(rx_buffer),
            Ok(Err(err)) => Err(err),
            Err(elapsed) => {
                log::trace!("read timed out after {received} of {count} bytes");
                Err(timed_out(elapsed))
            }
        }
    }
}
