#[macro_use]
extern crate log;

use std::sync::Arc;
use simple_logger::SimpleLogger;
use crate::config::init_from_toml;
use crate::manager::{ConnectionManager, setup_distribute_task};
use crate::native::{DisNative, setup_native_recv_task};
use crate::socket::create_dis_socket;
use crate::system::Result;
use crate::web::WebSocketServer;

mod aoim;
mod buffer;
mod config;
mod cursor;
mod endpoint;
mod error;
mod manager;
mod native;
mod pdu;
mod socket;
mod statistics;
mod system;
mod web;
mod websocket;

const DEFAULT_CONFIG_FILE: &str = "gateway.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = init_from_toml(&path).await?;
    SimpleLogger::new().with_level(config.log_level).init()?;
    info!("config: {:?}", config);

    let (manager, receiver) = ConnectionManager::new();
    let manager = Arc::new(manager);
    setup_distribute_task(manager.clone(), receiver);

    let native = if config.enable_native_dis {
        let socket = create_dis_socket(config.dis_port, config.get_multicast_group())?;
        let native = Arc::new(DisNative::from(socket, &config));
        info!("native DIS on port {} ({:?}), gateway id {}",
              config.dis_port, config.network_mode, native.get_gateway_id());
        manager.add_connection(native.clone());
        setup_native_recv_task(native.clone(), manager.clone());
        Some(native)
    } else {
        None
    };

    let server = WebSocketServer::bind(&config, manager.clone()).await?;
    info!("websocket server listening on {}", server.local_addr()?);
    tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    manager.log_statistics();
    if let Some(native) = native {
        info!("{} entities seen on the native network", native.entity_count());
    }
    Ok(())
}
