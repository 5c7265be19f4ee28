use std::net::{IpAddr, Ipv4Addr};

/// Protocol label both sides must agree on before a session starts
pub const PROTOCOL_ID: &str = "/snapshot/1.0.0";

const NODE_PORT: &str = "NODE_PORT";

const DEFAULT_PORT: u16 = 0;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(NODE_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const NODE_ADDR: &str = "NODE_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub fn get_addr() -> IpAddr {
    let addr_from_env = std::env::var(NODE_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

/// Listen address derived from the environment (`NODE_ADDR`, `NODE_PORT`)
pub fn get_listen_addr() -> String {
    match get_addr() {
        IpAddr::V4(ip) => format!("{ip}:{}", get_port()),
        IpAddr::V6(ip) => format!("[{ip}]:{}", get_port()),
    }
}
