use std::net::Ipv4Addr;
use log::LevelFilter;
use tokio::fs;
use toml::Value;
use crate::error::ConfigError;
use crate::system::Result;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NetworkMode {
    Broadcast,
    Multicast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub web_port: u16,
    pub enable_aoim: bool,
    pub aoim_pdu_types: Vec<u8>,
    pub enable_native_dis: bool,
    pub network_mode: NetworkMode,
    pub dis_port: u16,
    pub multicast_address: Ipv4Addr,
    pub broadcast_addresses: Vec<Ipv4Addr>,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn new() -> Self {
        Config {
            web_port: 8282,
            enable_aoim: false,
            aoim_pdu_types: vec![1],
            enable_native_dis: true,
            network_mode: NetworkMode::Broadcast,
            dis_port: 3000,
            multicast_address: Ipv4Addr::new(239, 1, 2, 3),
            broadcast_addresses: vec![],
            log_level: LevelFilter::Info,
        }
    }

    /// Applies every key present in `text` over the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let value: Value = text.parse()?;
        let mut config = Config::new();
        if let Some(v) = value.get("web_port") {
            config.web_port = get_port("web_port", v)?;
        }
        if let Some(v) = value.get("enable_aoim") {
            config.enable_aoim = get_bool("enable_aoim", v)?;
        }
        if let Some(v) = value.get("aoim_pdu_types") {
            config.aoim_pdu_types = get_array("aoim_pdu_types", v)?
                .iter()
                .map(|e| get_pdu_type(e))
                .collect::<Result<Vec<u8>>>()?;
        }
        if let Some(v) = value.get("enable_native_dis") {
            config.enable_native_dis = get_bool("enable_native_dis", v)?;
        }
        if let Some(v) = value.get("network_mode") {
            config.network_mode = match get_str("network_mode", v)?.to_lowercase().as_str() {
                "broadcast" => NetworkMode::Broadcast,
                "multicast" => NetworkMode::Multicast,
                other => {
                    return Err(ConfigError::new("network_mode",
                                                format!("expected broadcast or multicast, got {}", other)).into());
                }
            };
        }
        if let Some(v) = value.get("dis_port") {
            config.dis_port = get_port("dis_port", v)?;
        }
        if let Some(v) = value.get("multicast_address") {
            config.multicast_address = get_ipv4("multicast_address", v)?;
        }
        if let Some(v) = value.get("broadcast_addresses") {
            config.broadcast_addresses = get_array("broadcast_addresses", v)?
                .iter()
                .map(|e| get_ipv4("broadcast_addresses", e))
                .collect::<Result<Vec<Ipv4Addr>>>()?;
        }
        if let Some(v) = value.get("log_level") {
            config.log_level = get_str("log_level", v)?.parse()
                .map_err(|_| ConfigError::new("log_level", "expected off, error, warn, info, debug or trace"))?;
        }
        Ok(config)
    }

    /// Multicast group to join, if running in multicast mode.
    pub fn get_multicast_group(&self) -> Option<Ipv4Addr> {
        match self.network_mode {
            NetworkMode::Multicast => Some(self.multicast_address),
            NetworkMode::Broadcast => None,
        }
    }
}

pub async fn init_from_toml(path: &str) -> Result<Config> {
    match fs::read_to_string(path).await {
        Ok(text) => Config::from_toml_str(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::new()),
        Err(e) => Err(e.into()),
    }
}

fn get_bool(key: &str, value: &Value) -> Result<bool> {
    value.as_bool()
        .ok_or_else(|| ConfigError::new(key, "expected true or false").into())
}

fn get_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str()
        .ok_or_else(|| ConfigError::new(key, "expected a string").into())
}

fn get_array<'a>(key: &str, value: &'a Value) -> Result<&'a Vec<Value>> {
    value.as_array()
        .ok_or_else(|| ConfigError::new(key, "expected an array").into())
}

fn get_port(key: &str, value: &Value) -> Result<u16> {
    let port = value.as_integer()
        .ok_or_else(|| ConfigError::new(key, "expected an integer"))?;
    if port < 1 || port > u16::MAX as i64 {
        return Err(ConfigError::new(key, format!("port {} out of range", port)).into());
    }
    Ok(port as u16)
}

fn get_pdu_type(value: &Value) -> Result<u8> {
    let pdu_type = value.as_integer()
        .ok_or_else(|| ConfigError::new("aoim_pdu_types", "expected integers"))?;
    if pdu_type < 0 || pdu_type > u8::MAX as i64 {
        return Err(ConfigError::new("aoim_pdu_types", format!("pdu type {} out of range", pdu_type)).into());
    }
    Ok(pdu_type as u8)
}

fn get_ipv4(key: &str, value: &Value) -> Result<Ipv4Addr> {
    get_str(key, value)?.parse()
        .map_err(|_| ConfigError::new(key, "expected an IPv4 address").into())
}
