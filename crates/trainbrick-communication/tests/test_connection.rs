use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use trainbrick_communication::communication::{
    command_queue, spawn_adapter_task, spawn_router, Connector, ListenerTable, SimulationLog,
};
use trainbrick_communication::{ConnectionState, Hub, HubLogic, ScanPolicy, SimulatedAdapter};
use trainbrick_core::{
    ConnectionError, DeviceHandle, DiscoveredDevice, Error, EventBus, HubIdentity, IoType,
    Peripheral, TxTarget, LEGO_HUB_CHARACTERISTIC_UUID, LEGO_HUB_SERVICE_UUID,
};

struct Idle;

#[async_trait::async_trait]
impl HubLogic for Idle {
    async fn run(&self, _hub: Arc<Hub>) -> anyhow::Result<()> {
        Ok(())
    }
}

fn lego_hub(name: &str, address: &str, system_id: u8) -> DiscoveredDevice {
    DiscoveredDevice::new(name, address)
        .with_service(LEGO_HUB_SERVICE_UUID)
        .with_manufacturer_data(0x0397, vec![0x00, system_id, 0x03, 0x00])
}

fn train(identity: HubIdentity) -> Arc<Hub> {
    Hub::builder(identity)
        .attach(Peripheral::duplo_train_motor("motor"))
        .logic(Idle)
        .build()
        .unwrap()
}

fn connector(adapter: SimulatedAdapter, policy: ScanPolicy) -> (Connector, SimulationLog) {
    let log = adapter.log();
    let (handle, _adapter) = spawn_adapter_task(adapter);
    let listeners = ListenerTable::new();
    let (responses, _router) = spawn_router(handle.events, listeners.clone());
    let (queue, _requests) = command_queue();
    let connector = Connector::new(
        handle.commands,
        responses,
        listeners,
        queue,
        Arc::new(EventBus::new()),
        policy,
    );
    (connector, log)
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_connects_on_first_round() {
    let adapter = SimulatedAdapter::new().with_scan(vec![lego_hub("Train", "aa", 0x20)]);
    let (mut connector, log) = connector(adapter, ScanPolicy::default());
    let hub = train(HubIdentity::new("My train", "Train", 0x20));

    let connected = connector.connect(&hub).await.unwrap();

    assert_eq!(connected.session.rounds(), 1);
    assert_eq!(connected.session.state(), ConnectionState::Connected);
    assert_eq!(
        connected.session.history(),
        &[
            ConnectionState::Idle,
            ConnectionState::Scanning,
            ConnectionState::Matched,
            ConnectionState::Connecting,
            ConnectionState::Subscribing,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(
        hub.tx_target(),
        Some(TxTarget {
            device: DeviceHandle(1),
            characteristic: LEGO_HUB_CHARACTERISTIC_UUID,
        })
    );
    assert_eq!(hub.address(), Some("aa"));
    assert_eq!(log.discover_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exactly_the_budget() {
    let adapter = SimulatedAdapter::new().with_scan(vec![lego_hub("Remote", "aa", 0x42)]);
    let policy = ScanPolicy {
        max_rounds: 5,
        backoff: Duration::from_secs(1),
    };
    let (mut connector, log) = connector(adapter, policy);
    let hub = train(HubIdentity::new("My train", "Train", 0x20));

    let started = Instant::now();
    let err = connector.connect(&hub).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::DeviceNotFound { rounds: 5, .. })
    ));
    assert_eq!(log.discover_count(), 5);
    // No sleep after the last round
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(5));
    assert!(!hub.is_connected());
}

#[tokio::test]
async fn test_zero_budget_never_scans() {
    let adapter = SimulatedAdapter::new().with_scan(vec![lego_hub("Train", "aa", 0x20)]);
    let policy = ScanPolicy {
        max_rounds: 0,
        backoff: Duration::from_secs(1),
    };
    let (mut connector, log) = connector(adapter, policy);
    let hub = train(HubIdentity::new("My train", "Train", 0x20));

    let err = connector.connect(&hub).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Connection(ConnectionError::DeviceNotFound { rounds: 0, .. })
    ));
    settle().await;
    assert_eq!(log.discover_count(), 0);
    assert!(!hub.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_matches_after_rescans() {
    let adapter = SimulatedAdapter::new()
        .with_scan(vec![])
        .with_scan(vec![lego_hub("Remote", "bb", 0x42)])
        .with_scan(vec![lego_hub("Remote", "bb", 0x42), lego_hub("Train Base", "aa", 0x20)]);
    let (mut connector, log) = connector(adapter, ScanPolicy::default());
    let hub = train(HubIdentity::new("My train", "Train", 0x20));

    let connected = connector.connect(&hub).await.unwrap();

    assert_eq!(connected.session.rounds(), 3);
    assert_eq!(connected.session.remaining(), 58);
    assert_eq!(connected.session.matched().map(|d| d.address.as_str()), Some("aa"));
    assert_eq!(log.discover_count(), 3);
}

#[tokio::test]
async fn test_ambiguous_advertisement_is_fatal() {
    let beacon = lego_hub("Train", "aa", 0x20).with_manufacturer_data(0x004c, vec![0x02, 0x15]);
    let adapter = SimulatedAdapter::new().with_scan(vec![beacon]);
    let (mut connector, log) = connector(adapter, ScanPolicy::default());
    let hub = train(HubIdentity::new("My train", "Train", 0x20));

    let err = connector.connect(&hub).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Connection(ConnectionError::AmbiguousAdvertisement { entries: 2, .. })
    ));
    assert_eq!(log.discover_count(), 1);
}

#[tokio::test]
async fn test_identifier_picks_the_right_hub() {
    let adapter = SimulatedAdapter::new().with_scan(vec![
        lego_hub("Train Base", "90:84:2B:00:00:01", 0x20),
        lego_hub("Train Base", "90:84:2B:00:00:02", 0x20),
    ]);
    let (mut connector, _log) = connector(adapter, ScanPolicy::default());
    let identity = HubIdentity::new("Second train", "Train Base", 0x20).with_ble_id("90:84:2b:00:00:02");
    let hub = train(identity);

    connector.connect(&hub).await.unwrap();

    assert_eq!(hub.address(), Some("90:84:2B:00:00:02"));
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let adapter = SimulatedAdapter::new().with_scan(vec![lego_hub("Train", "aa", 0x20)]);
    let (mut connector, log) = connector(adapter, ScanPolicy::default());
    let hub = train(HubIdentity::new("My train", "Train", 0x20));

    connector.connect(&hub).await.unwrap();
    let err = connector.connect(&hub).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Connection(ConnectionError::AlreadyConnected { .. })
    ));
    assert_eq!(log.discover_count(), 1);
}

#[tokio::test]
async fn test_attached_io_assigns_ports() {
    let adapter = SimulatedAdapter::new()
        .with_scan(vec![lego_hub("Train", "aa", 0x20)])
        .with_attached_io("aa", 0, IoType::DuploTrainMotor)
        .with_attached_io("aa", 0x11, IoType::RgbLight);
    let (mut connector, _log) = connector(adapter, ScanPolicy::default());
    let hub = Hub::builder(HubIdentity::new("My train", "Train", 0x20))
        .attach(Peripheral::duplo_train_motor("motor"))
        .attach(Peripheral::rgb_light("light"))
        .logic(Idle)
        .build()
        .unwrap();

    connector.connect(&hub).await.unwrap();
    settle().await;

    assert_eq!(hub.peripheral("motor").unwrap().port(), Some(0));
    assert_eq!(hub.peripheral("light").unwrap().port(), Some(0x11));
    assert_eq!(
        hub.port_details(0x11).and_then(|d| d.io_type),
        Some(IoType::RgbLight)
    );
    assert!(hub.all_attached());
}
