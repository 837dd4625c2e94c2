//! End-to-end scenario tests exercising the public library surface: a
//! linear pipeline's startup/shutdown ordering, multicast fan-out over
//! real TCP sockets, cycle rejection through the config loader, and
//! health-driven auto-restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use conduit::launcher::{InstanceRef, Launcher};
use conduit::load_topology_from_str;
use conduit::router::StreamRouter;
use conduit::router::backpressure::BackpressurePolicy;
use conduit::router::packet::StreamPacket;
use conduit::router::protocol::ConsumerEndpoint;
use conduit::supervisor::PhaseState;
use conduit::topology::{HealthSpec, Hyperedge, Phase, PhaseKind, Protocol, Stream, Topology};
use conduit::{Orchestrator, OrchestratorOptions};

fn host_phase(name: &str, inputs: &[&str], outputs: &[&str]) -> Phase {
    Phase {
        name: name.to_string(),
        kind: PhaseKind::HostProcess { command: vec![name.to_string()] },
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        replicas: 1,
        health: HealthSpec::default(),
        dependencies: HashMap::new(),
    }
}

fn tcp_stream(name: &str, port: u16) -> Stream {
    Stream {
        name: name.to_string(),
        protocol: Protocol::Tcp,
        port,
        buffer_size: 128,
        schema: None,
    }
}

fn edge(name: &str, source: &str, targets: &[&str], streams: &[&str]) -> Hyperedge {
    Hyperedge {
        name: name.to_string(),
        source: source.to_string(),
        targets: targets.iter().map(|s| s.to_string()).collect(),
        streams: streams.iter().map(|s| s.to_string()).collect(),
        multicast: true,
    }
}

fn fast_options() -> OrchestratorOptions {
    OrchestratorOptions {
        startup_stagger: Duration::from_millis(5),
        dependency_wait_timeout: Duration::from_millis(500),
        graceful_stop_timeout: Duration::from_millis(50),
        health_check_interval: Duration::from_secs(30),
        ..OrchestratorOptions::default()
    }
}

/// A launcher that never actually spawns a process: it just records
/// spawn/terminate events and lets the test script its liveness directly.
#[derive(Default)]
struct MockLauncher {
    events: Mutex<Vec<String>>,
    alive: Mutex<HashMap<InstanceRef, bool>>,
    spawn_count: AtomicU32,
}

impl MockLauncher {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn set_alive(&self, instance: &InstanceRef, alive: bool) {
        self.alive.lock().unwrap().insert(instance.clone(), alive);
    }

    fn spawn_count(&self) -> u32 {
        self.spawn_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn spawn(
        &self,
        phase: &Phase,
        replica_id: u32,
        _env: HashMap<String, String>,
    ) -> Result<InstanceRef, conduit::OrchestratorError> {
        let instance = InstanceRef::new(phase.name.clone(), replica_id);
        self.events.lock().unwrap().push(format!("spawn:{}", phase.name));
        self.alive.lock().unwrap().insert(instance.clone(), true);
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        Ok(instance)
    }

    async fn is_alive(&self, instance: &InstanceRef) -> bool {
        *self.alive.lock().unwrap().get(instance).unwrap_or(&false)
    }

    async fn terminate(
        &self,
        instance: &InstanceRef,
        _graceful_timeout: Duration,
    ) -> Result<(), conduit::OrchestratorError> {
        self.events.lock().unwrap().push(format!("terminate:{}", instance.phase_name));
        self.alive.lock().unwrap().insert(instance.clone(), false);
        Ok(())
    }

    async fn log_receiver(&self, _instance: &InstanceRef) -> Option<flume::Receiver<String>> {
        None
    }
}

/// Scenario 1 + 6: linear three-stage start-up reaches ACTIVE in
/// dependency order, and graceful shutdown tears down in reverse order.
#[tokio::test]
async fn linear_three_stage_startup_and_shutdown_order() {
    let phases = vec![
        host_phase("a", &[], &["s1"]),
        host_phase("b", &["s1"], &["s2"]),
        host_phase("c", &["s2"], &[]),
    ];
    let streams = vec![tcp_stream("s1", 19301), tcp_stream("s2", 19302)];
    let edges = vec![edge("e1", "a", &["b"], &["s1"]), edge("e2", "b", &["c"], &["s2"])];
    let topology = Topology::build(phases, streams, edges).unwrap();

    let launcher = Arc::new(MockLauncher::default());
    let orchestrator = Orchestrator::new(topology, launcher.clone(), fast_options(), vec![]);

    orchestrator.start_pipeline().await.unwrap();

    let status = orchestrator.status().await;
    assert!(status.running);
    for phase in &status.phases {
        assert_eq!(phase.state, PhaseState::Active, "{} should be ACTIVE", phase.name);
    }
    let s1 = status.streams.iter().find(|s| s.name == "s1").unwrap();
    assert_eq!(s1.producer.as_deref(), Some("a"));
    assert_eq!(s1.consumers, vec!["b".to_string()]);

    orchestrator.stop_pipeline().await.unwrap();

    let events = launcher.events();
    let term_a = events.iter().position(|e| e == "terminate:a").unwrap();
    let term_b = events.iter().position(|e| e == "terminate:b").unwrap();
    let term_c = events.iter().position(|e| e == "terminate:c").unwrap();
    assert!(term_c < term_b, "c must stop before b");
    assert!(term_b < term_a, "b must stop before a");

    let status = orchestrator.status().await;
    assert!(!status.running);
    for phase in &status.phases {
        assert_eq!(phase.state, PhaseState::Stopped);
    }
}

/// Scenario 2: one producer, three consumers; each observes every packet,
/// in order, and the router's own counters agree.
#[tokio::test]
async fn fan_out_multicast_delivers_to_every_consumer_in_order() {
    const INGRESS_PORT: u16 = 19311;
    const CONSUMER_PORTS: [u16; 3] = [19312, 19313, 19314];
    const PACKET_COUNT: u64 = 1000;

    let stream = tcp_stream("s1", INGRESS_PORT);
    let router = Arc::new(StreamRouter::new(stream, Duration::from_secs(1)));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let router_task = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.run(shutdown_rx).await })
    };

    let mut consumer_listeners = Vec::new();
    for port in CONSUMER_PORTS {
        consumer_listeners.push(TcpListener::bind(("127.0.0.1", port)).await.unwrap());
    }

    for (i, port) in CONSUMER_PORTS.iter().enumerate() {
        router
            .register_consumer(
                format!("consumer-{i}"),
                ConsumerEndpoint { protocol: Protocol::Tcp, host: "127.0.0.1".to_string(), port: *port },
                BackpressurePolicy::Block,
                Duration::from_secs(2),
                Duration::from_millis(50),
            )
            .await;
    }

    let mut consumer_tasks = Vec::new();
    for listener in consumer_listeners {
        consumer_tasks.push(tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut sequences = Vec::with_capacity(PACKET_COUNT as usize);
            for _ in 0..PACKET_COUNT {
                let mut header = [0u8; 20];
                conn.read_exact(&mut header).await.unwrap();
                let metadata_len = u32::from_be_bytes(header[16..20].try_into().unwrap()) as usize;
                let mut metadata = vec![0u8; metadata_len];
                conn.read_exact(&mut metadata).await.unwrap();
                let mut payload = vec![0u8; 4];
                conn.read_exact(&mut payload).await.unwrap();

                let mut frame = Vec::with_capacity(header.len() + metadata.len() + payload.len());
                frame.extend_from_slice(&header);
                frame.extend_from_slice(&metadata);
                frame.extend_from_slice(&payload);
                let packet = StreamPacket::decode(Bytes::from(frame), "s1").unwrap();
                sequences.push(packet.sequence);
            }
            sequences
        }));
    }

    // Give the router's egress sessions time to dial the consumer listeners.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut producer = TcpStream::connect(("127.0.0.1", INGRESS_PORT)).await.unwrap();
    for i in 0..PACKET_COUNT {
        let packet = StreamPacket::new(0.0, HashMap::new(), Bytes::copy_from_slice(&(i as u32).to_be_bytes()));
        producer.write_all(&packet.encode().unwrap()).await.unwrap();
        // One write per packet, matching the ingress's one-packet-per-read
        // framing (spec §4.3); yield so the router drains each frame
        // before the next lands on the wire.
        tokio::task::yield_now().await;
    }

    let expected: Vec<u64> = (0..PACKET_COUNT).collect();
    for task in consumer_tasks {
        let sequences = task.await.unwrap();
        assert_eq!(sequences, expected);
    }

    let snapshot = router.metrics_snapshot().await;
    assert_eq!(snapshot.packets_routed, PACKET_COUNT * CONSUMER_PORTS.len() as u64);

    let _ = shutdown_tx.send(true);
    router_task.abort();
}

/// Scenario 4: a two-phase cycle is rejected at load time.
#[tokio::test]
async fn cycle_between_phases_is_rejected_at_load() {
    const CYCLIC: &str = r#"
        [[phases]]
        name = "a"
        inputs = ["s2"]
        outputs = ["s1"]
        [phases.kind]
        kind = "host_process"
        command = ["a-bin"]

        [[phases]]
        name = "b"
        inputs = ["s1"]
        outputs = ["s2"]
        [phases.kind]
        kind = "host_process"
        command = ["b-bin"]

        [[streams]]
        name = "s1"
        protocol = "tcp"
        port = 19320

        [[streams]]
        name = "s2"
        protocol = "tcp"
        port = 19321

        [[hyperedges]]
        name = "e1"
        source = "a"
        targets = ["b"]
        streams = ["s1"]

        [[hyperedges]]
        name = "e2"
        source = "b"
        targets = ["a"]
        streams = ["s2"]
    "#;

    let err = load_topology_from_str(CYCLIC).unwrap_err();
    assert!(err.to_string().contains("cycle"), "expected a cycle-flavoured error, got: {err}");
}

/// Scenario 5: a crashing replica is restarted after crossing the
/// failure threshold, and recovers once it reports alive again.
#[tokio::test]
async fn health_driven_restart_recovers_a_crashed_replica() {
    let mut phase = host_phase("b", &[], &[]);
    phase.health = HealthSpec { interval: Some(Duration::from_millis(15)), failure_threshold: Some(2) };
    let topology = Topology::build(vec![phase], vec![], vec![]).unwrap();

    let launcher = Arc::new(MockLauncher::default());
    let mut options = fast_options();
    options.max_restarts = 5;
    options.restart_window = Duration::from_secs(60);
    options.backoff_initial = Duration::from_millis(5);
    options.backoff_max = Duration::from_millis(20);

    let orchestrator = Orchestrator::new(topology, launcher.clone(), options, vec![]);
    orchestrator.start_pipeline().await.unwrap();

    assert_eq!(launcher.spawn_count(), 1);

    let instance = InstanceRef::new("b", 0);
    launcher.set_alive(&instance, false);

    // Two health ticks at the 15ms interval should cross the threshold of
    // 2 and trigger a restart; allow generous slack for scheduling.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(launcher.spawn_count() >= 2, "expected a restart spawn, got {} spawns", launcher.spawn_count());

    let status = orchestrator.status().await;
    let b = status.phases.iter().find(|p| p.name == "b").unwrap();
    assert_ne!(b.state, PhaseState::Failed, "phase should have recovered, not failed");

    orchestrator.stop_pipeline().await.unwrap();
}
