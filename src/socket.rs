use std::net::{Ipv4Addr, SocketAddr};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use crate::system::Result;

/// Opens the DIS socket on the wildcard address. SO_REUSEADDR lets it share
/// the port with other DIS applications on this host, and broadcast is always
/// enabled. Joins `multicast_group` when one is given.
pub fn create_dis_socket(port: u16, multicast_group: Option<Ipv4Addr>) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&address.into())?;
    if let Some(group) = multicast_group {
        if group.is_multicast() {
            socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
            info!("joined multicast group {}", group);
        } else {
            warn!("{} is not a multicast address, not joining", group);
        }
    }
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use crate::socket::create_dis_socket;

    #[tokio::test]
    async fn should_bind_wildcard_with_broadcast_when_create_dis_socket_given_no_group() {
        let socket = create_dis_socket(0, None).unwrap();

        let address = socket.local_addr().unwrap();

        assert!(address.ip().is_unspecified());
        assert_ne!(0, address.port());
        assert!(socket.broadcast().unwrap())
    }

    #[tokio::test]
    async fn should_skip_join_when_create_dis_socket_given_unicast_group() {
        let result = create_dis_socket(0, Some(Ipv4Addr::new(10, 0, 0, 1)));

        assert!(result.is_ok())
    }
}
