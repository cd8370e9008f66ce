use super::{ChangeHandler, Hub, HubLogic, PeripheralUpdate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use trainbrick_core::{HubError, HubIdentity, Peripheral};

/// Declares a hub and checks the declaration before the system starts.
///
/// Every sensing peripheral needs a change handler, every handler needs a
/// peripheral, names are unique and the hub has program logic.
pub struct HubBuilder {
    identity: HubIdentity,
    peripherals: Vec<Peripheral>,
    handlers: HashMap<String, ChangeHandler>,
    logic: Option<Arc<dyn HubLogic>>,
}

impl HubBuilder {
    pub fn new(identity: HubIdentity) -> Self {
        Self {
            identity,
            peripherals: Vec::new(),
            handlers: HashMap::new(),
            logic: None,
        }
    }

    /// Attach a peripheral
    pub fn attach(mut self, peripheral: Peripheral) -> Self {
        self.peripherals.push(peripheral);
        self
    }

    /// Handle value updates of the named peripheral
    pub fn on_change<F>(mut self, peripheral: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&PeripheralUpdate) + Send + Sync + 'static,
    {
        self.handlers.insert(peripheral.into(), Arc::new(handler));
        self
    }

    /// Program logic run once all peripherals are attached
    pub fn logic(mut self, logic: impl HubLogic) -> Self {
        self.logic = Some(Arc::new(logic));
        self
    }

    /// Validate and build the hub
    pub fn build(self) -> Result<Arc<Hub>, HubError> {
        let hub = self.identity.name.clone();

        let mut seen = HashSet::new();
        for peripheral in &self.peripherals {
            if !seen.insert(peripheral.name()) {
                return Err(HubError::DuplicatePeripheral {
                    hub,
                    peripheral: peripheral.name().to_string(),
                });
            }
            if peripheral.needs_handler() && !self.handlers.contains_key(peripheral.name()) {
                return Err(HubError::MissingHandler {
                    hub,
                    peripheral: peripheral.name().to_string(),
                });
            }
        }

        if let Some(orphan) = self.handlers.keys().find(|name| !seen.contains(name.as_str())) {
            return Err(HubError::OrphanHandler {
                hub,
                peripheral: orphan.clone(),
            });
        }

        let logic = self.logic.ok_or(HubError::MissingLogic { hub })?;

        for peripheral in self.peripherals.iter().filter(|p| p.is_builtin()) {
            if let Some(port) = peripheral.declared_port() {
                peripheral.assign_port(port);
            }
        }

        Ok(Arc::new(Hub::new(
            self.identity,
            self.peripherals,
            self.handlers,
            logic,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use trainbrick_core::HubKind;

    struct Idle;

    #[async_trait]
    impl HubLogic for Idle {
        async fn run(&self, _hub: Arc<Hub>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn train() -> HubBuilder {
        HubBuilder::new(HubIdentity::for_kind("train", HubKind::DuploTrain))
    }

    #[test]
    fn test_build_valid_hub() {
        let hub = train()
            .attach(Peripheral::duplo_train_motor("motor"))
            .attach(Peripheral::duplo_speedometer("speed"))
            .on_change("speed", |_| {})
            .logic(Idle)
            .build()
            .unwrap();

        assert_eq!(hub.name(), "train");
        assert_eq!(hub.peripherals().len(), 2);
        assert!(!hub.is_connected());
        assert!(hub.peripheral("motor").is_ok());
        assert!(matches!(
            hub.peripheral("light"),
            Err(HubError::UnknownPeripheral { .. })
        ));
    }

    #[test]
    fn test_sensing_peripheral_needs_handler() {
        let err = train()
            .attach(Peripheral::duplo_speedometer("speed"))
            .logic(Idle)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            HubError::MissingHandler {
                hub: "train".to_string(),
                peripheral: "speed".to_string()
            }
        );
    }

    #[test]
    fn test_handler_needs_peripheral() {
        let err = train()
            .attach(Peripheral::duplo_train_motor("motor"))
            .on_change("speed", |_| {})
            .logic(Idle)
            .build()
            .unwrap_err();
        assert!(matches!(err, HubError::OrphanHandler { .. }));
    }

    #[test]
    fn test_duplicate_and_missing_logic() {
        let err = train()
            .attach(Peripheral::duplo_train_motor("motor"))
            .attach(Peripheral::duplo_train_motor("motor"))
            .logic(Idle)
            .build()
            .unwrap_err();
        assert!(matches!(err, HubError::DuplicatePeripheral { .. }));

        let err = train().build().unwrap_err();
        assert!(matches!(err, HubError::MissingLogic { .. }));
    }

    #[test]
    fn test_builtin_button_is_attached() {
        let hub = train()
            .attach(Peripheral::hub_button("button"))
            .on_change("button", |_| {})
            .logic(Idle)
            .build()
            .unwrap();
        assert!(hub.all_attached());
    }
}
