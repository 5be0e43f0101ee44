use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use tokio::net::UdpSocket;
use crate::buffer::{DestinationBuffer, PacketBuffer};
use crate::config::Config;
use crate::endpoint::{Endpoint, EndpointId};
use crate::manager::ConnectionManager;
use crate::pdu::{self, EntityId, PduHeader};
use crate::statistics::ConnectionStatistics;
use crate::system::{Result, next_endpoint_id};

/// Reads and writes DIS on the local network, in broadcast or multicast mode.
pub struct DisNative {
    id: EndpointId,
    socket: UdpSocket,
    port: u16,
    multicast_group: Option<Ipv4Addr>,
    broadcast_addresses: Vec<Ipv4Addr>,
    // Stamped into the padding of every PDU we send so we can recognise and
    // drop our own traffic when it comes back in.
    gateway_id: u16,
    entities: DashMap<EntityId, u64>,
    statistics: ConnectionStatistics,
}

impl DisNative {
    pub fn from(socket: UdpSocket, config: &Config) -> Self {
        let mut broadcast_addresses = config.broadcast_addresses.clone();
        if broadcast_addresses.is_empty() {
            warn!("no broadcast_addresses configured, falling back to {}", Ipv4Addr::BROADCAST);
            broadcast_addresses.push(Ipv4Addr::BROADCAST);
        }
        DisNative {
            id: next_endpoint_id(),
            socket,
            port: config.dis_port,
            multicast_group: config.get_multicast_group(),
            broadcast_addresses,
            gateway_id: rand::thread_rng().gen_range(1..=254),
            entities: DashMap::new(),
            statistics: ConnectionStatistics::new(),
        }
    }

    pub fn get_gateway_id(&self) -> u16 {
        self.gateway_id
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub async fn recv(&self, manager: &ConnectionManager) -> Result<bool> {
        let mut buffer = PacketBuffer::new();
        let (len, src) = self.socket.recv_from(buffer.as_mut_slice()).await?;
        self.handle_datagram(buffer.trimmed(len), src, manager)
    }

    /// Queues one received datagram for distribution. Returns false when it
    /// was dropped, either because it is not DIS or because we sent it.
    fn handle_datagram(&self, data: DestinationBuffer, src: SocketAddr, manager: &ConnectionManager) -> Result<bool> {
        let header = match PduHeader::parse(&data) {
            Some(header) => header,
            None => {
                debug!("dropping {} byte datagram from {}, not a DIS pdu", data.len(), src);
                return Ok(false);
            }
        };
        if header.padding == self.gateway_id {
            return Ok(false);
        }
        if let Some(entity) = pdu::entity_id(&data) {
            let mut updates = self.entities.entry(entity).or_insert(0);
            if *updates == 0 {
                info!("new entity {:?} in exercise {} from {}", entity, header.exercise_id, src);
            }
            *updates += 1;
        }
        debug!("{} pdu ({} bytes) from {}", pdu::type_name(header.pdu_type), header.length, src);
        let len = data.len();
        manager.enqueue_binary(data, Some(self.id))?;
        self.statistics.message_received(len);
        Ok(true)
    }

    fn destinations(&self) -> Vec<SocketAddr> {
        match self.multicast_group {
            Some(group) => vec![SocketAddr::from((group, self.port))],
            None => self.broadcast_addresses
                .iter()
                .map(|a| SocketAddr::from((*a, self.port)))
                .collect(),
        }
    }
}

#[async_trait]
impl Endpoint for DisNative {
    fn id(&self) -> EndpointId {
        self.id
    }

    async fn send_binary(&self, data: &[u8]) -> Result<()> {
        let data = match pdu::with_padding(data, self.gateway_id) {
            Some(data) => data,
            None => {
                debug!("not sending {} bytes to the native network, not a DIS pdu", data.len());
                return Ok(());
            }
        };
        for destination in self.destinations() {
            self.socket.send_to(data.as_slice(), destination).await?;
            self.statistics.message_sent(data.len());
        }
        Ok(())
    }

    async fn send_text(&self, _: &str) -> Result<()> {
        Ok(())
    }

    fn statistics(&self) -> &ConnectionStatistics {
        &self.statistics
    }
}

pub fn setup_native_recv_task(native: Arc<DisNative>, manager: Arc<ConnectionManager>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = native.recv(&manager).await {
                error!("native DIS receive failed: {:?}", e)
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};
    use tokio::time::{timeout, Duration};
    use crate::buffer::convert_slice;
    use crate::config::{Config, NetworkMode};
    use crate::endpoint::Endpoint;
    use crate::manager::ConnectionManager;
    use crate::native::DisNative;
    use crate::pdu::{ENTITY_STATE, FIRE};
    use crate::pdu::tests::get_test_pdu;
    use crate::socket::create_dis_socket;

    fn get_test_native() -> DisNative {
        let socket = create_dis_socket(0, None).unwrap();
        let mut config = Config::new();
        config.dis_port = socket.local_addr().unwrap().port();
        config.broadcast_addresses = vec![Ipv4Addr::LOCALHOST];
        DisNative::from(socket, &config)
    }

    fn get_src() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 3000))
    }

    #[tokio::test]
    async fn should_enqueue_with_sender_when_handle_datagram_given_foreign_pdu() {
        let native = get_test_native();
        let (manager, mut receiver) = ConnectionManager::new();
        let pdu = get_test_pdu(FIRE, 0);

        let result = native.handle_datagram(convert_slice(&pdu), get_src(), &manager).unwrap();

        assert!(result);
        let message = receiver.try_recv().unwrap();
        assert_eq!(pdu.as_slice(), message.data.as_slice());
        assert_eq!(Some(native.id()), message.sender);
        assert_eq!(1, native.statistics().get_messages_received())
    }

    #[tokio::test]
    async fn should_drop_when_handle_datagram_given_own_gateway_id() {
        let native = get_test_native();
        let (manager, mut receiver) = ConnectionManager::new();
        let pdu = get_test_pdu(FIRE, native.get_gateway_id());

        let result = native.handle_datagram(convert_slice(&pdu), get_src(), &manager).unwrap();

        assert!(!result);
        assert!(receiver.try_recv().is_err())
    }

    #[tokio::test]
    async fn should_drop_when_handle_datagram_given_non_dis_bytes() {
        let native = get_test_native();
        let (manager, mut receiver) = ConnectionManager::new();

        let result = native.handle_datagram(convert_slice(b"hello"), get_src(), &manager).unwrap();

        assert!(!result);
        assert!(receiver.try_recv().is_err())
    }

    #[tokio::test]
    async fn should_count_entity_once_when_handle_datagram_given_repeated_entity_state() {
        let native = get_test_native();
        let (manager, _receiver) = ConnectionManager::new();
        let pdu = get_test_pdu(ENTITY_STATE, 0);

        native.handle_datagram(convert_slice(&pdu), get_src(), &manager).unwrap();
        native.handle_datagram(convert_slice(&pdu), get_src(), &manager).unwrap();

        assert_eq!(1, native.entity_count())
    }

    #[tokio::test]
    async fn should_drop_own_echo_when_send_binary_given_loopback_broadcast() {
        let native = get_test_native();
        let (manager, mut receiver) = ConnectionManager::new();

        native.send_binary(&get_test_pdu(ENTITY_STATE, 0)).await.unwrap();
        let result = timeout(Duration::from_secs(5), native.recv(&manager)).await.unwrap().unwrap();

        assert!(!result);
        assert_eq!(1, native.statistics().get_messages_sent());
        assert!(receiver.try_recv().is_err())
    }

    #[tokio::test]
    async fn should_send_to_group_only_when_destinations_given_multicast_mode() {
        let socket = create_dis_socket(0, None).unwrap();
        let mut config = Config::new();
        config.network_mode = NetworkMode::Multicast;
        config.broadcast_addresses = vec![Ipv4Addr::new(10, 0, 0, 255)];
        let native = DisNative::from(socket, &config);

        let result = native.destinations();

        assert_eq!(vec![SocketAddr::from((Ipv4Addr::new(239, 1, 2, 3), 3000))], result)
    }

    #[tokio::test]
    async fn should_send_to_every_address_when_destinations_given_broadcast_list() {
        let socket = create_dis_socket(0, None).unwrap();
        let mut config = Config::new();
        config.broadcast_addresses = vec![Ipv4Addr::new(10, 0, 0, 255), Ipv4Addr::new(192, 168, 1, 255)];
        let native = DisNative::from(socket, &config);

        let result = native.destinations();

        let expected = vec![SocketAddr::from((Ipv4Addr::new(10, 0, 0, 255), 3000)),
                            SocketAddr::from((Ipv4Addr::new(192, 168, 1, 255), 3000))];
        assert_eq!(expected, result)
    }

    #[tokio::test]
    async fn should_fall_back_to_limited_broadcast_when_destinations_given_empty_broadcast_list() {
        let socket = create_dis_socket(0, None).unwrap();
        let mut config = Config::new();
        config.broadcast_addresses = vec![];
        let native = DisNative::from(socket, &config);

        let result = native.destinations();

        assert_eq!(vec![SocketAddr::from((Ipv4Addr::BROADCAST, 3000))], result)
    }

    #[tokio::test]
    async fn should_not_send_when_send_binary_given_non_dis_bytes() {
        let native = get_test_native();

        native.send_binary(&[1, 2, 3]).await.unwrap();

        assert_eq!(0, native.statistics().get_messages_sent())
    }
}
