use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::store::DEFAULT_SHARDS;

const PORT: u16 = 6379;

/// Server settings. Every flag can also be given through the environment.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "tinykv", version, about)]
pub struct Config {
    /// The address to listen on
    #[arg(long, env = "TINYKV_BIND", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// The port to listen on
    #[arg(short, long, env = "TINYKV_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Require clients to issue AUTH <password> before any other command
    #[arg(long, env = "TINYKV_REQUIREPASS")]
    pub requirepass: Option<String>,

    /// Number of independently locked keyspace shards, rounded up to a power of two
    #[arg(long, env = "TINYKV_SHARDS", default_value_t = DEFAULT_SHARDS)]
    pub shards: usize,

    /// Largest request frame accepted, in bytes
    #[arg(long, env = "TINYKV_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: PORT,
            requirepass: None,
            shards: DEFAULT_SHARDS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["tinykv"]).unwrap();

        assert_eq!(config.port, 6379);
        assert_eq!(config.shards, 16);
        assert_eq!(config.requirepass, None);
        assert_eq!(config.addr(), "127.0.0.1:6379".parse().unwrap());
    }

    #[test]
    fn flags() {
        let config = Config::try_parse_from([
            "tinykv",
            "--bind",
            "0.0.0.0",
            "-p",
            "6380",
            "--requirepass",
            "123456",
            "--shards",
            "64",
            "--max-frame-size",
            "1024",
        ])
        .unwrap();

        assert_eq!(config.addr(), "0.0.0.0:6380".parse().unwrap());
        assert_eq!(config.requirepass.as_deref(), Some("123456"));
        assert_eq!(config.shards, 64);
        assert_eq!(config.max_frame_size, 1024);
    }

    #[test]
    fn invalid_port() {
        assert!(Config::try_parse_from(["tinykv", "--port", "70000"]).is_err());
    }
}
