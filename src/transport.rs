//! The I/O seam between the protocol engine and the physical link.

use async_trait::async_trait;
use std::time::Duration;

/// Byte transport used by [`DalyClient`](crate::DalyClient).
///
/// The engine only ever needs these two primitives. Timeouts and short reads
/// are reported as `std::io::Error`s and handed to the caller unchanged.
#[async_trait]
pub trait Transport: Send {
    /// Writes `buffer` and returns how many bytes went out.
    async fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize>;

    /// Waits until exactly `count` bytes were read or `timeout` elapsed.
    ///
    /// Bytes received before a timeout are consumed.
    async fn read_exact(&mut self, count: usize, timeout: Duration) -> std::io::Result<Vec<u8>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        (**self).write(buffer).await
    }

    async fn read_exact(&mut self, count: usize, timeout: Duration) -> std::io::Result<Vec<u8>> {
        (**self).read_exact(count, timeout).await
    }
}
