//! Glue between the configuration file and a running [`System`]
//!
//! Builds hubs from the configured profiles, maps timing settings onto the
//! system options and, for dry runs, assembles a simulated adapter that
//! advertises every configured hub.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use trainbrick_communication::{
    Color, DuploSound, Hub, HubLogic, ScanPolicy, SimulatedAdapter, System, SystemOptions,
};
use trainbrick_core::{
    DiscoveredDevice, EventCategory, EventFilter, IoType, PeripheralEvent, SystemEvent,
    LEGO_COMPANY_ID, LEGO_HUB_SERVICE_UUID,
};
use trainbrick_settings::{Config, HubProfile};

/// First port number handed out to peripherals without a fixed port
const FIRST_FREE_PORT: u8 = 0x11;

/// Map configured timing onto system options
pub fn system_options(config: &Config) -> SystemOptions {
    SystemOptions {
        scan: ScanPolicy {
            max_rounds: config.scan.max_rounds,
            backoff: Duration::from_millis(config.scan.backoff_ms),
        },
        first_port_poll: Duration::from_millis(config.startup.first_port_poll_ms),
        port_poll: Duration::from_millis(config.startup.port_poll_ms),
    }
}

/// Demonstration program: drive every output for a while, then stop
#[derive(Debug, Clone)]
pub struct DemoProgram {
    /// How long outputs stay on
    pub run_time: Duration,
}

impl Default for DemoProgram {
    fn default() -> Self {
        Self {
            run_time: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl HubLogic for DemoProgram {
    async fn run(&self, hub: Arc<Hub>) -> anyhow::Result<()> {
        tracing::info!("Starting demo on {}", hub.name());

        for peripheral in hub.peripherals() {
            let name = peripheral.name();
            match peripheral.io_type() {
                IoType::DuploTrainMotor | IoType::TrainMotor | IoType::Motor => {
                    hub.set_power(name, 50)?
                }
                IoType::DuploTrainSpeaker => hub.play_sound(name, DuploSound::StationDeparture)?,
                IoType::RgbLight => hub.set_color(name, Color::Green)?,
                _ => {
                    if let Some(capability) = peripheral.capabilities().iter().find(|c| c.sensing) {
                        hub.activate_updates(name, &capability.name, 1)?;
                    }
                }
            }
        }
        hub.flush().await?;

        tokio::time::sleep(self.run_time).await;

        for peripheral in hub.peripherals() {
            let name = peripheral.name();
            match peripheral.io_type() {
                IoType::DuploTrainMotor | IoType::TrainMotor | IoType::Motor => {
                    hub.set_power(name, 0)?
                }
                IoType::DuploTrainSpeaker => hub.play_sound(name, DuploSound::Brake)?,
                IoType::RgbLight => hub.set_color(name, Color::Red)?,
                _ => {}
            }
        }
        hub.flush().await?;

        tracing::info!("Demo on {} finished", hub.name());
        Ok(())
    }
}

/// Build a hub from its profile, logging every sensor update
pub fn build_hub(profile: &HubProfile, program: DemoProgram) -> anyhow::Result<Arc<Hub>> {
    let mut builder = Hub::builder(profile.identity());
    for peripheral in profile.build_peripherals() {
        if peripheral.needs_handler() {
            let hub_name = profile.name.clone();
            builder = builder.on_change(peripheral.name().to_string(), move |update| {
                tracing::info!(
                    "{}: {} on port {} reported {:?}",
                    hub_name,
                    update.peripheral,
                    update.port,
                    update.value
                );
            });
        }
        builder = builder.attach(peripheral);
    }
    Ok(builder.logic(program).build()?)
}

/// Build a system holding every configured hub
pub fn build_system(config: &Config, program: DemoProgram) -> anyhow::Result<System> {
    let mut system = System::new(system_options(config));
    for profile in &config.hubs {
        system.register(build_hub(profile, program.clone())?);
    }

    let filter = EventFilter::Categories(vec![EventCategory::Peripheral]);
    system.events().subscribe(filter, |event| {
        if let SystemEvent::Peripheral(PeripheralEvent::Detached { hub, port }) = event {
            tracing::warn!("{}: port {} detached", hub, port);
        }
    });

    Ok(system)
}

/// Address a simulated hub advertises
fn simulated_address(profile: &HubProfile, index: usize) -> String {
    profile
        .ble_id
        .clone()
        .unwrap_or_else(|| format!("90:84:2B:00:00:{:02X}", index + 1))
}

/// A simulated radio where every configured hub is in range with all of its
/// peripherals plugged in
pub fn simulated_adapter(config: &Config) -> SimulatedAdapter {
    let devices: Vec<DiscoveredDevice> = config
        .hubs
        .iter()
        .enumerate()
        .map(|(index, profile)| {
            let identity = profile.identity();
            DiscoveredDevice::new(identity.ble_name, simulated_address(profile, index))
                .with_service(LEGO_HUB_SERVICE_UUID)
                .with_manufacturer_data(
                    LEGO_COMPANY_ID,
                    vec![0x00, identity.manufacturer_id, 0x03, 0x00],
                )
        })
        .collect();

    let mut adapter = SimulatedAdapter::new().with_scan(devices);
    for (index, profile) in config.hubs.iter().enumerate() {
        let address = simulated_address(profile, index);
        let mut next_port = FIRST_FREE_PORT;
        for peripheral in profile.build_peripherals() {
            if peripheral.is_builtin() {
                continue;
            }
            let port = match peripheral.declared_port() {
                Some(port) => port,
                None => {
                    let port = next_port;
                    next_port += 1;
                    port
                }
            };
            adapter = adapter.with_attached_io(address.clone(), port, peripheral.io_type());
        }
    }
    adapter
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainbrick_communication::spawn_adapter_task;
    use trainbrick_core::HubKind;
    use trainbrick_settings::{PeripheralKind, PeripheralProfile};

    #[test]
    fn test_system_options_from_config() {
        let mut config = Config::default();
        config.scan.max_rounds = 7;
        config.scan.backoff_ms = 250;

        let options = system_options(&config);
        assert_eq!(options.scan.max_rounds, 7);
        assert_eq!(options.scan.backoff, Duration::from_millis(250));
        assert_eq!(options.first_port_poll, Duration::from_millis(100));
        assert_eq!(options.port_poll, Duration::from_secs(1));
    }

    #[test]
    fn test_sensors_get_logging_handlers() {
        let mut profile = HubProfile::duplo_train("train");
        profile
            .peripherals
            .push(PeripheralProfile::new("speed", PeripheralKind::DuploSpeedometer));
        profile
            .peripherals
            .push(PeripheralProfile::new("button", PeripheralKind::HubButton));

        let hub = build_hub(&profile, DemoProgram::default()).unwrap();
        assert_eq!(hub.peripherals().len(), 5);
        assert_eq!(hub.peripheral("button").unwrap().port(), Some(255));
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_runs_against_simulated_hubs() {
        let mut config = Config::default();
        config.startup.first_port_poll_ms = 10;
        let mut remote = HubProfile::new("remote", HubKind::PoweredUpRemote);
        remote
            .peripherals
            .push(PeripheralProfile::new("button", PeripheralKind::HubButton));
        config.hubs.push(remote);

        let adapter = simulated_adapter(&config);
        let log = adapter.log();
        let (handle, worker) = spawn_adapter_task(adapter);

        let program = DemoProgram {
            run_time: Duration::from_millis(100),
        };
        let system = build_system(&config, program).unwrap();
        system.run(handle).await.unwrap();
        worker.await.unwrap();

        assert!(system.hubs().iter().all(|hub| hub.is_connected()));
        // motor, speaker and light on, then off; the remote only subscribes
        assert_eq!(log.writes().len(), 7);
        assert!(log.was_shut_down());
    }
}
