//! Listener hub integration tests

use async_trait::async_trait;
use sessiond::{
    config::SessionConfig, ListenerHub, Metrics, Session, SessionFactory, SessionHandle,
    ShutdownCoordinator, TcpSessionFactory,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

fn create_hub() -> ListenerHub {
    let config = SessionConfig::default();
    ListenerHub::new(
        Arc::new(TcpSessionFactory::new(&config)),
        Arc::new(Metrics::new().unwrap()),
        &config,
    )
}

/// Session whose close takes a fixed, bounded time
#[derive(Debug)]
struct SlowCloseSession {
    id: String,
    stream: tokio::sync::Mutex<Option<TcpStream>>,
    closed: AtomicBool,
    close_delay: Duration,
    closed_total: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for SlowCloseSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!("slow {}", self.id)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        sleep(self.close_delay).await;
        self.stream.lock().await.take();
        self.closed_total.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct SlowCloseFactory {
    close_delay: Duration,
    closed_total: Arc<AtomicUsize>,
}

#[async_trait]
impl SessionFactory for SlowCloseFactory {
    async fn create(&self, stream: TcpStream, peer: SocketAddr) -> sessiond::Result<SessionHandle> {
        Ok(Arc::new(SlowCloseSession {
            id: peer.to_string(),
            stream: tokio::sync::Mutex::new(Some(stream)),
            closed: AtomicBool::new(false),
            close_delay: self.close_delay,
            closed_total: Arc::clone(&self.closed_total),
        }))
    }
}

async fn wait_for_online(hub: &ListenerHub, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while hub.online_sessions().await != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("hub never reached the expected session count");
}

#[tokio::test]
async fn test_sessions_are_tracked_per_listener() {
    let hub = create_hub();
    let first = hub.start_listener("127.0.0.1", 0).await.unwrap();
    let second = hub.start_listener("127.0.0.1", 0).await.unwrap();
    assert_ne!(first.id(), second.id());

    let _a = TcpStream::connect(first.local_addr().await.unwrap()).await.unwrap();
    let _b = TcpStream::connect(first.local_addr().await.unwrap()).await.unwrap();
    let _c = TcpStream::connect(second.local_addr().await.unwrap()).await.unwrap();
    wait_for_online(&hub, 3).await;

    assert_eq!(first.session_count().await, 2);
    assert_eq!(second.session_count().await, 1);

    let all = hub.all_sessions().await;
    assert_eq!(all.len(), 3);
    for (registry, session) in &all {
        let (owner, found) = hub.find_session(session.id()).await.unwrap();
        assert_eq!(owner.id(), registry.id());
        assert_eq!(found.id(), session.id());
    }

    let description = hub.describe().await;
    assert!(description.contains(&format!("[{}] {}", first.id(), first.oneline_desc().await)));
    assert!(description.contains(&format!("[{}] {}", second.id(), second.oneline_desc().await)));
    assert_eq!(description.lines().count(), 5);

    assert_eq!(hub.shutdown(Duration::from_secs(5)).await, 3);
    assert!(hub.listeners().await.is_empty());
}

#[tokio::test]
async fn test_remove_session_by_id_closes_connection() {
    let hub = create_hub();
    let registry = hub.start_listener("127.0.0.1", 0).await.unwrap();

    let mut client = TcpStream::connect(registry.local_addr().await.unwrap()).await.unwrap();
    wait_for_online(&hub, 1).await;

    let (_, session) = hub.all_sessions().await.pop().unwrap();
    assert!(hub.remove_session(session.id()).await);
    assert!(!hub.remove_session(session.id()).await);
    assert_eq!(hub.online_sessions().await, 0);

    let mut buf = [0u8; 8];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf)).await.unwrap().unwrap_or(0);
    assert_eq!(n, 0);

    hub.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_stopped_listener_refuses_new_connections() {
    let hub = create_hub();
    let registry = hub.start_listener("127.0.0.1", 0).await.unwrap();
    let addr = registry.local_addr().await.unwrap();

    assert_eq!(hub.stop_listener(registry.id()).await.unwrap(), 0);
    assert!(hub.find_listener(registry.id()).await.is_none());
    assert!(hub.stop_listener(registry.id()).await.is_err());

    // The socket was dropped with the accept loop
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_closes_slow_sessions_on_every_listener() {
    let closed_total = Arc::new(AtomicUsize::new(0));
    let config = SessionConfig::default();
    let hub = ListenerHub::new(
        Arc::new(SlowCloseFactory {
            close_delay: Duration::from_millis(1500),
            closed_total: Arc::clone(&closed_total),
        }),
        Arc::new(Metrics::new().unwrap()),
        &config,
    );

    let mut registries = Vec::new();
    let mut clients = Vec::new();
    for _ in 0..3 {
        let registry = hub.start_listener("127.0.0.1", 0).await.unwrap();
        clients.push(TcpStream::connect(registry.local_addr().await.unwrap()).await.unwrap());
        registries.push(registry);
    }
    wait_for_online(&hub, 3).await;

    let started = Instant::now();
    let coordinator = ShutdownCoordinator::new(Duration::from_secs(2));
    assert_eq!(coordinator.shutdown_hub(&hub).await, 3);

    // Listeners are stopped side by side, not one after another
    assert!(started.elapsed() < Duration::from_millis(4000));
    assert_eq!(closed_total.load(Ordering::SeqCst), 3);
    assert!(hub.listeners().await.is_empty());
    for registry in &registries {
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(registry.state().await, sessiond::registry::RegistryState::Stopped);
    }
}
