use std::io::{self, Read, Write};
use std::time::Duration;

/// A raw duplex byte link a [`Channel`](crate::Channel) can run over.
///
/// The channel needs two handles to the same link: one is moved to the
/// receive pump and polled with a short read timeout, the other is moved to
/// the transmit worker.
pub trait Port: Read + Write + Send + 'static {
    /// Open a second handle to the same underlying link.
    fn try_clone_port(&self) -> io::Result<Box<dyn Port>>;

    /// Bound how long a single `read` may block so the pump can notice
    /// shutdown and barrier requests.
    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Human-readable name for logs.
    fn describe(&self) -> String;
}

impl Port for Box<dyn Port> {
    fn try_clone_port(&self) -> io::Result<Box<dyn Port>> {
        self.as_ref().try_clone_port()
    }

    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.as_mut().set_poll_timeout(timeout)
    }

    fn describe(&self) -> String {
        self.as_ref().describe()
    }
}

#[cfg(unix)]
impl Port for std::os::unix::net::UnixStream {
    fn try_clone_port(&self) -> io::Result<Box<dyn Port>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }

    fn describe(&self) -> String {
        "unix-stream".to_string()
    }
}

#[cfg(feature = "serial")]
impl Port for Box<dyn serialport::SerialPort> {
    fn try_clone_port(&self) -> io::Result<Box<dyn Port>> {
        let clone = serialport::SerialPort::try_clone(self.as_ref())?;
        Ok(Box::new(clone))
    }

    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        serialport::SerialPort::set_timeout(self.as_mut(), timeout).map_err(io::Error::from)
    }

    fn describe(&self) -> String {
        self.name().unwrap_or_else(|| "serial".to_string())
    }
}

/// Read errors that only mean "nothing arrived within the poll timeout".
pub(crate) fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
