use std::sync::{Arc, Mutex};
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use crate::buffer::DestinationBuffer;
use crate::endpoint::{Endpoint, EndpointId};
use crate::statistics::LatencySummary;
use crate::system::Result;

pub struct BinaryMessage {
    pub data: DestinationBuffer,
    pub sender: Option<EndpointId>,
}

/// Registry of every connected endpoint and the single place messages are
/// repeated from. Binary messages go through a FIFO queue so the receiving
/// side returns immediately while a distributor task fans them out.
pub struct ConnectionManager {
    connections: DashMap<EndpointId, Arc<dyn Endpoint>>,
    queue: UnboundedSender<BinaryMessage>,
    distribution_latency: Mutex<LatencySummary>,
}

impl ConnectionManager {
    pub fn new() -> (Self, UnboundedReceiver<BinaryMessage>) {
        let (queue, receiver) = mpsc::unbounded_channel();
        let manager = ConnectionManager {
            connections: DashMap::new(),
            queue,
            distribution_latency: Mutex::new(LatencySummary::new()),
        };
        (manager, receiver)
    }

    pub fn add_connection(&self, connection: Arc<dyn Endpoint>) {
        self.connections.insert(connection.id(), connection);
    }

    pub fn remove_connection(&self, id: EndpointId) {
        self.connections.remove(&id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn enqueue_binary(&self, data: DestinationBuffer, sender: Option<EndpointId>) -> Result<()> {
        self.queue
            .send(BinaryMessage { data, sender })
            .map_err(|_| "distribution queue is closed")?;
        Ok(())
    }

    fn targets(&self, sender: Option<EndpointId>) -> Vec<Arc<dyn Endpoint>> {
        self.connections
            .iter()
            .filter(|e| sender != Some(*e.key()))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Sends `data` to every endpoint except `sender`. Returns how many
    /// endpoints accepted it.
    pub async fn repeat_binary(&self, data: &[u8], sender: Option<EndpointId>) -> usize {
        let targets = self.targets(sender);
        let results = join_all(targets.iter().map(|t| timed_send_binary(t.as_ref(), data))).await;
        count_delivered(&targets, results)
    }

    pub async fn repeat_text(&self, message: &str, sender: Option<EndpointId>) -> usize {
        let targets = self.targets(sender);
        let results = join_all(targets.iter().map(|t| t.send_text(message))).await;
        count_delivered(&targets, results)
    }

    /// Messages dropped across all connections because a peer fell behind.
    pub fn total_dropped(&self) -> u64 {
        self.connections
            .iter()
            .map(|e| e.value().statistics().get_messages_dropped())
            .sum()
    }

    pub fn get_distribution_latency(&self) -> LatencySummary {
        *self.distribution_latency.lock().unwrap()
    }

    pub fn log_statistics(&self) {
        info!("{} connections open, {} messages dropped", self.connection_count(), self.total_dropped());
        for e in self.connections.iter() {
            let statistics = e.value().statistics();
            info!("connection {}: sent {} messages ({} bytes), received {} messages ({} bytes), dropped {}, up since {}",
                  e.key(),
                  statistics.get_messages_sent(),
                  statistics.get_bytes_sent(),
                  statistics.get_messages_received(),
                  statistics.get_bytes_received(),
                  statistics.get_messages_dropped(),
                  statistics.get_creation_time());
            let latency = statistics.get_latency();
            if let Some(mean) = latency.mean() {
                info!("connection {}: send latency mean {:.3} ms, min {:.3} ms, max {:.3} ms",
                      e.key(), mean, latency.min, latency.max);
            }
        }
        let latency = self.get_distribution_latency();
        if let Some(mean) = latency.mean() {
            info!("distributed {} messages, mean {:.3} ms, max {:.3} ms", latency.count, mean, latency.max);
        }
    }
}

async fn timed_send_binary(target: &dyn Endpoint, data: &[u8]) -> Result<()> {
    let start = Instant::now();
    let result = target.send_binary(data).await;
    target.statistics().latency_observation(start.elapsed().as_secs_f64() * 1000.0);
    result
}

fn count_delivered(targets: &[Arc<dyn Endpoint>], results: Vec<Result<()>>) -> usize {
    let mut delivered = 0;
    for (target, result) in targets.iter().zip(results) {
        match result {
            Ok(()) => delivered += 1,
            Err(e) => error!("send to connection {} failed: {}", target.id(), e),
        }
    }
    delivered
}

pub fn setup_distribute_task(manager: Arc<ConnectionManager>, mut receiver: UnboundedReceiver<BinaryMessage>) {
    //从队列里按顺序取出消息, 转发给其他连接
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let start = Instant::now();
            manager.repeat_binary(&message.data, message.sender).await;
            let elapsed = start.elapsed().as_secs_f64() * 1000.0;
            manager.distribution_latency.lock().unwrap().accept(elapsed);
        }
        debug!("distribution queue closed");
    });
}

#[cfg(test)]
pub mod tests {
    use std::sync::{Arc, Mutex};
    use async_trait::async_trait;
    use tokio::time::{timeout, Duration, sleep};
    use crate::buffer::convert_slice;
    use crate::endpoint::{Endpoint, EndpointId};
    use crate::manager::{ConnectionManager, setup_distribute_task};
    use crate::statistics::ConnectionStatistics;
    use crate::system::{Result, next_endpoint_id};

    pub struct RecordingEndpoint {
        id: EndpointId,
        fail: bool,
        pub binary: Mutex<Vec<Vec<u8>>>,
        pub text: Mutex<Vec<String>>,
        statistics: ConnectionStatistics,
    }

    impl RecordingEndpoint {
        pub fn new(fail: bool) -> Arc<Self> {
            Arc::new(RecordingEndpoint {
                id: next_endpoint_id(),
                fail,
                binary: Mutex::new(Vec::new()),
                text: Mutex::new(Vec::new()),
                statistics: ConnectionStatistics::new(),
            })
        }

        pub fn get_binary(&self) -> Vec<Vec<u8>> {
            self.binary.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Endpoint for RecordingEndpoint {
        fn id(&self) -> EndpointId {
            self.id
        }

        async fn send_binary(&self, data: &[u8]) -> Result<()> {
            if self.fail {
                return Err("endpoint is broken".into());
            }
            self.binary.lock().unwrap().push(data.to_vec());
            self.statistics.message_sent(data.len());
            Ok(())
        }

        async fn send_text(&self, message: &str) -> Result<()> {
            if self.fail {
                return Err("endpoint is broken".into());
            }
            self.text.lock().unwrap().push(message.to_string());
            Ok(())
        }

        fn statistics(&self) -> &ConnectionStatistics {
            &self.statistics
        }
    }

    #[tokio::test]
    async fn should_skip_sender_when_call_repeat_binary_given_three_connections() {
        let (manager, _receiver) = ConnectionManager::new();
        let a = RecordingEndpoint::new(false);
        let b = RecordingEndpoint::new(false);
        let c = RecordingEndpoint::new(false);
        manager.add_connection(a.clone());
        manager.add_connection(b.clone());
        manager.add_connection(c.clone());

        let result = manager.repeat_binary(&[1, 2, 3], Some(a.id)).await;

        assert_eq!(2, result);
        assert!(a.get_binary().is_empty());
        assert_eq!(vec![vec![1u8, 2, 3]], b.get_binary());
        assert_eq!(vec![vec![1u8, 2, 3]], c.get_binary())
    }

    #[tokio::test]
    async fn should_record_send_latency_per_target_when_call_repeat_binary_given_two_connections() {
        let (manager, _receiver) = ConnectionManager::new();
        let a = RecordingEndpoint::new(false);
        let b = RecordingEndpoint::new(true);
        manager.add_connection(a.clone());
        manager.add_connection(b.clone());

        manager.repeat_binary(&[1], None).await;
        manager.repeat_binary(&[2], None).await;

        assert_eq!(2, a.statistics().get_latency().count);
        assert_eq!(2, b.statistics().get_latency().count);
        assert!(a.statistics().get_latency().min >= 0.0)
    }

    #[tokio::test]
    async fn should_send_to_all_when_call_repeat_binary_given_no_sender() {
        let (manager, _receiver) = ConnectionManager::new();
        let a = RecordingEndpoint::new(false);
        let b = RecordingEndpoint::new(false);
        manager.add_connection(a.clone());
        manager.add_connection(b.clone());

        let result = manager.repeat_binary(&[9], None).await;

        assert_eq!(2, result);
        assert_eq!(1, a.get_binary().len());
        assert_eq!(1, b.get_binary().len())
    }

    #[tokio::test]
    async fn should_still_deliver_to_others_when_call_repeat_binary_given_broken_connection() {
        let (manager, _receiver) = ConnectionManager::new();
        let broken = RecordingEndpoint::new(true);
        let healthy = RecordingEndpoint::new(false);
        manager.add_connection(broken.clone());
        manager.add_connection(healthy.clone());

        let result = manager.repeat_binary(&[4, 5], None).await;

        assert_eq!(1, result);
        assert_eq!(vec![vec![4u8, 5]], healthy.get_binary())
    }

    #[tokio::test]
    async fn should_skip_sender_when_call_repeat_text_given_two_connections() {
        let (manager, _receiver) = ConnectionManager::new();
        let a = RecordingEndpoint::new(false);
        let b = RecordingEndpoint::new(false);
        manager.add_connection(a.clone());
        manager.add_connection(b.clone());

        manager.repeat_text("{\"pduType\":1}", Some(b.id)).await;

        assert_eq!(vec!["{\"pduType\":1}".to_string()], *a.text.lock().unwrap());
        assert!(b.text.lock().unwrap().is_empty())
    }

    #[tokio::test]
    async fn should_not_send_when_call_repeat_binary_given_removed_connection() {
        let (manager, _receiver) = ConnectionManager::new();
        let a = RecordingEndpoint::new(false);
        manager.add_connection(a.clone());

        manager.remove_connection(a.id);
        let result = manager.repeat_binary(&[1], None).await;

        assert_eq!(0, result);
        assert_eq!(0, manager.connection_count())
    }

    #[tokio::test]
    async fn should_distribute_in_fifo_order_when_enqueue_binary_given_running_distributor() {
        let (manager, receiver) = ConnectionManager::new();
        let manager = Arc::new(manager);
        let sender = RecordingEndpoint::new(false);
        let listener = RecordingEndpoint::new(false);
        manager.add_connection(sender.clone());
        manager.add_connection(listener.clone());
        setup_distribute_task(manager.clone(), receiver);

        for i in 0..10u8 {
            manager.enqueue_binary(convert_slice(&[i]), Some(sender.id)).unwrap();
        }

        timeout(Duration::from_secs(5), async {
            while manager.get_distribution_latency().count < 10 {
                sleep(Duration::from_millis(5)).await;
            }
        }).await.unwrap();
        let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
        assert_eq!(expected, listener.get_binary());
        assert!(sender.get_binary().is_empty());
        assert_eq!(10, manager.get_distribution_latency().count)
    }

    #[test]
    fn should_return_error_when_enqueue_binary_given_closed_queue() {
        let (manager, receiver) = ConnectionManager::new();
        drop(receiver);

        let result = manager.enqueue_binary(convert_slice(&[1u8]), None);

        assert!(result.is_err())
    }
}
