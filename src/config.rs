use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::ConfigError;

pub const MIN_WINDOW_SIZE: u16 = 8;
pub const MAX_WINDOW_SIZE: u16 = 256;
pub const DEFAULT_WINDOW_SIZE: u16 = 32;
pub const DEFAULT_PORT: u16 = 100;
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_REPLY_SIZE: usize = 100;

/// Number of sequence-number slots tracked by the loss detector.
///
/// Always a multiple of 8 in `[MIN_WINDOW_SIZE, MAX_WINDOW_SIZE]`; the only
/// way to obtain one is through [`TryFrom<u16>`] or [`Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSize(u16);

impl WindowSize {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        WindowSize(DEFAULT_WINDOW_SIZE)
    }
}

impl TryFrom<u16> for WindowSize {
    type Error = ConfigError;

    fn try_from(size: u16) -> Result<Self, Self::Error> {
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&size) {
            return Err(ConfigError::WindowOutOfRange(size));
        }
        if size % 8 != 0 {
            return Err(ConfigError::WindowNotMultipleOf8(size));
        }
        Ok(WindowSize(size))
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the endpoint needs before it starts listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listening socket binds to.
    pub local: IpAddr,
    pub port: u16,
    pub window_size: WindowSize,
    /// How long after a read batch the reply goes out.
    pub reply_delay: Duration,
    /// Size of the zero-filled reply payload.
    pub reply_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            local: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            window_size: WindowSize::default(),
            reply_delay: DEFAULT_REPLY_DELAY,
            reply_size: DEFAULT_REPLY_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(local: IpAddr, port: u16, window_size: u16) -> Result<Self, ConfigError> {
        Ok(Self {
            local,
            port,
            window_size: WindowSize::try_from(window_size)?,
            ..Self::default()
        })
    }

    /// Builds a config from positional arguments: `[address] [port] [window]`.
    /// Missing trailing arguments keep their defaults.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        if let Some(addr) = args.next() {
            let addr = addr.as_ref();
            config.local = addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(addr.to_owned()))?;
        }
        if let Some(port) = args.next() {
            let port = port.as_ref();
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.to_owned()))?;
        }
        if let Some(window) = args.next() {
            let window = window.as_ref();
            let size: u16 = window
                .parse()
                .map_err(|_| ConfigError::InvalidWindow(window.to_owned()))?;
            config.window_size = WindowSize::try_from(size)?;
        }
        Ok(config)
    }

    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub fn with_reply_size(mut self, size: usize) -> Self {
        self.reply_size = size;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.local, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_size_validation() {
        for bad in [0, 7, 12, 264, 300] {
            assert!(WindowSize::try_from(bad).is_err(), "{bad} should be rejected");
        }
        for good in [8, 32, 256] {
            assert_eq!(WindowSize::try_from(good).map(WindowSize::get), Ok(good));
        }
    }

    #[test]
    fn window_errors_name_the_violation() {
        assert_eq!(WindowSize::try_from(7), Err(ConfigError::WindowOutOfRange(7)));
        assert_eq!(WindowSize::try_from(300), Err(ConfigError::WindowOutOfRange(300)));
        assert_eq!(WindowSize::try_from(20), Err(ConfigError::WindowNotMultipleOf8(20)));
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 100);
        assert_eq!(config.window_size.get(), 32);
        assert_eq!(config.reply_delay, Duration::from_millis(100));
        assert_eq!(config.reply_size, 100);
    }

    #[test]
    fn builders_override_reply() {
        let config = ServerConfig::default()
            .with_reply_delay(Duration::from_secs(1))
            .with_reply_size(8);
        assert_eq!(config.reply_delay, Duration::from_secs(1));
        assert_eq!(config.reply_size, 8);
    }

    #[test]
    fn from_args_parses_positionals() {
        let config = ServerConfig::from_args(["127.0.0.1", "9000", "64"]).unwrap();
        assert_eq!(config.socket_addr(), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.window_size.get(), 64);

        let partial = ServerConfig::from_args(["::1"]).unwrap();
        assert_eq!(partial.port, DEFAULT_PORT);
    }

    #[test]
    fn from_args_rejects_garbage() {
        assert!(matches!(
            ServerConfig::from_args(["localhost"]),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            ServerConfig::from_args(["0.0.0.0", "70000"]),
            Err(ConfigError::InvalidPort(_))
        ));
        assert_eq!(
            ServerConfig::from_args(["0.0.0.0", "80", "7"]),
            Err(ConfigError::WindowOutOfRange(7))
        );
    }
}
