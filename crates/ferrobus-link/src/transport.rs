//! The transport descriptor: per-kind configuration, an optional open
//! channel, and the receive/send/flush operations the engines consume.
//!
//! The classic portable-stack shape for this is a vtable of open / close /
//! read / write / flush function pointers; here the closed set of transport
//! kinds is a tagged variant instead, with per-variant configuration and
//! channel state.

use std::io;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
#[cfg(feature = "serial")]
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::trace;

use crate::framing::{drain_pending, read_frame, Timeouts};
use crate::{LinkError, ProtocolKind};

/// Serial line settings for an RTU transport.
///
/// RS-485 driver-enable switching is the serial driver's concern; the stack
/// only ever sees a byte stream.
#[cfg(feature = "serial")]
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub device: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
}

#[cfg(feature = "serial")]
impl SerialConfig {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    #[cfg(feature = "serial")]
    Serial,
    Tcp,
    /// An externally connected socket handed to the stack.
    Adopted,
    /// An in-process byte pipe, for simulators and tests.
    Loopback,
}

#[derive(Debug)]
enum Config {
    #[cfg(feature = "serial")]
    Serial(SerialConfig),
    Tcp(TcpConfig),
    Adopted,
    Loopback,
}

#[derive(Debug)]
enum Channel {
    #[cfg(feature = "serial")]
    Serial(SerialStream),
    Tcp(TcpStream),
    Mem(DuplexStream),
}

impl Channel {
    async fn read_frame(&mut self, buf: &mut [u8], timeouts: Timeouts) -> io::Result<usize> {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(stream) => read_frame(stream, buf, timeouts).await,
            Self::Tcp(stream) => read_frame(stream, buf, timeouts).await,
            Self::Mem(stream) => read_frame(stream, buf, timeouts).await,
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(stream) => {
                stream.write_all(data).await?;
                stream.flush().await
            }
            Self::Tcp(stream) => {
                stream.write_all(data).await?;
                stream.flush().await
            }
            Self::Mem(stream) => {
                stream.write_all(data).await?;
                stream.flush().await
            }
        }
    }

    async fn drain_pending(&mut self) -> io::Result<usize> {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(stream) => drain_pending(stream).await,
            Self::Tcp(stream) => drain_pending(stream).await,
            Self::Mem(stream) => drain_pending(stream).await,
        }
    }
}

/// One communication channel to a bus or a peer.
///
/// The channel is present exactly while the transport is open. `open` is
/// lazy and idempotent; the engines call it before every exchange. Any I/O
/// failure closes the channel so the next call starts from a clean reopen.
#[derive(Debug)]
pub struct Transport {
    config: Config,
    timeouts: Timeouts,
    channel: Option<Channel>,
}

impl Transport {
    /// A serial (RTU) transport; opens the device on first use.
    #[cfg(feature = "serial")]
    pub fn serial(config: SerialConfig) -> Self {
        Self {
            config: Config::Serial(config),
            timeouts: Timeouts::default(),
            channel: None,
        }
    }

    /// A TCP client transport; connects on first use.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            config: Config::Tcp(TcpConfig {
                host: host.into(),
                port,
            }),
            timeouts: Timeouts::default(),
            channel: None,
        }
    }

    /// Adopts an already connected socket, e.g. one accepted by a listener.
    pub fn adopted(stream: TcpStream) -> Self {
        Self {
            config: Config::Adopted,
            timeouts: Timeouts::default(),
            channel: Some(Channel::Tcp(stream)),
        }
    }

    /// An in-process transport pair: the transport plus the peer end of the
    /// pipe. Used by simulators and the test suites.
    pub fn loopback() -> (Self, DuplexStream) {
        let (near, far) = tokio::io::duplex(512);
        let transport = Self {
            config: Config::Loopback,
            timeouts: Timeouts::default(),
            channel: Some(Channel::Mem(near)),
        };
        (transport, far)
    }

    pub fn kind(&self) -> TransportKind {
        match self.config {
            #[cfg(feature = "serial")]
            Config::Serial(_) => TransportKind::Serial,
            Config::Tcp(_) => TransportKind::Tcp,
            Config::Adopted => TransportKind::Adopted,
            Config::Loopback => TransportKind::Loopback,
        }
    }

    /// The frame wrapper a fresh instance on this transport speaks.
    pub fn default_protocol(&self) -> ProtocolKind {
        match self.config {
            #[cfg(feature = "serial")]
            Config::Serial(_) => ProtocolKind::Rtu,
            Config::Tcp(_) | Config::Adopted => ProtocolKind::Tcp,
            Config::Loopback => ProtocolKind::Rtu,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Opens the channel if it is not already open.
    ///
    /// Adopted and loopback transports have no open step: their channel is
    /// installed at construction, and `open` succeeds without doing anything
    /// even after the channel has been torn down.
    pub async fn open(&mut self) -> Result<(), LinkError> {
        if self.channel.is_some() {
            return Ok(());
        }

        match &self.config {
            #[cfg(feature = "serial")]
            Config::Serial(config) => {
                let stream = tokio_serial::new(&config.device, config.baud_rate)
                    .parity(config.parity)
                    .data_bits(config.data_bits)
                    .stop_bits(config.stop_bits)
                    .open_native_async()
                    .map_err(|err| {
                        LinkError::Io(io::Error::other(format!(
                            "failed to open serial device '{}': {err}",
                            config.device
                        )))
                    })?;
                self.channel = Some(Channel::Serial(stream));
            }
            Config::Tcp(config) => {
                let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
                self.channel = Some(Channel::Tcp(stream));
            }
            Config::Adopted | Config::Loopback => {}
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.channel = None;
    }

    /// Writes one frame. I/O failures close the channel.
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let channel = self.channel.as_mut().ok_or(LinkError::NotOpen)?;
        match channel.write_all(frame).await {
            Ok(()) => {
                #[cfg(feature = "raw-frames")]
                trace!(frame = %HexFrame(frame), "tx");
                Ok(())
            }
            Err(err) => {
                self.channel = None;
                Err(LinkError::Io(err))
            }
        }
    }

    /// Receives one idle-gap-delimited frame; 0 means no response arrived
    /// within the response timeout. I/O failures and peer close drop the
    /// channel.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let timeouts = self.timeouts;
        let channel = self.channel.as_mut().ok_or(LinkError::NotOpen)?;
        match channel.read_frame(buf, timeouts).await {
            Ok(n) => {
                #[cfg(feature = "raw-frames")]
                if n > 0 {
                    trace!(frame = %HexFrame(&buf[..n]), "rx");
                }
                Ok(n)
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                self.channel = None;
                Err(LinkError::ConnectionClosed)
            }
            Err(err) => {
                self.channel = None;
                Err(LinkError::Io(err))
            }
        }
    }

    /// Drops stale received bytes before a new request goes out.
    pub async fn flush_input(&mut self) -> Result<(), LinkError> {
        let channel = self.channel.as_mut().ok_or(LinkError::NotOpen)?;
        match channel.drain_pending().await {
            Ok(n) => {
                if n > 0 {
                    trace!(drained = n, "discarded stale input");
                }
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                self.channel = None;
                Err(LinkError::ConnectionClosed)
            }
            Err(err) => {
                self.channel = None;
                Err(LinkError::Io(err))
            }
        }
    }
}

#[cfg(feature = "raw-frames")]
struct HexFrame<'a>(&'a [u8]);

#[cfg(feature = "raw-frames")]
impl std::fmt::Display for HexFrame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Transport;
    use crate::{LinkError, ProtocolKind};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test(start_paused = true)]
    async fn loopback_sends_and_receives() {
        let (mut transport, mut far) = Transport::loopback();
        assert!(transport.is_open());
        assert_eq!(transport.default_protocol(), ProtocolKind::Rtu);

        transport.send(&[0x01, 0x02, 0x03]).await.unwrap();
        let mut buf = [0u8; 3];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x01, 0x02, 0x03]);

        far.write_all(&[0xAA, 0xBB]).await.unwrap();
        let mut frame = [0u8; 16];
        let n = transport.receive(&mut frame).await.unwrap();
        assert_eq!(&frame[..n], &[0xAA, 0xBB]);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_close_drops_the_channel() {
        let (mut transport, far) = Transport::loopback();
        drop(far);

        let mut frame = [0u8; 16];
        let err = transport.receive(&mut frame).await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectionClosed));
        assert!(!transport.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn adopted_open_is_a_no_op_even_after_close() {
        let (mut transport, _far) = Transport::loopback();
        transport.close();
        assert!(!transport.is_open());

        transport.open().await.unwrap();
        assert!(!transport.is_open());

        let err = transport.send(&[0x01]).await.unwrap_err();
        assert!(matches!(err, LinkError::NotOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_discards_only_pending_bytes() {
        let (mut transport, mut far) = Transport::loopback();
        far.write_all(&[1, 2, 3, 4]).await.unwrap();

        transport.flush_input().await.unwrap();

        far.write_all(&[0x55]).await.unwrap();
        let mut frame = [0u8; 16];
        let n = transport.receive(&mut frame).await.unwrap();
        assert_eq!(&frame[..n], &[0x55]);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_times_out_with_zero() {
        let (mut transport, _far) = Transport::loopback();
        let mut frame = [0u8; 16];
        assert_eq!(transport.receive(&mut frame).await.unwrap(), 0);
        assert!(transport.is_open());
    }
}
