use proptest::prelude::*;
use trainbrick_communication::communication::framing::{decode, encode, MAX_PAYLOAD_LEN};
use trainbrick_communication::communication::{select_device, MatchTarget};
use trainbrick_core::{BleIdentifier, ConnectionError, DiscoveredDevice, ProtocolError, LEGO_HUB_SERVICE_UUID};

fn advertised(name: String, address: String, system_id: u8) -> DiscoveredDevice {
    DiscoveredDevice::new(name, address)
        .with_service(LEGO_HUB_SERVICE_UUID)
        .with_manufacturer_data(0x0397, vec![0x00, system_id])
}

proptest! {
    #[test]
    fn encode_prefixes_total_length(payload in prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_LEN)) {
        let frame = encode(&payload).unwrap();
        prop_assert_eq!(frame.len(), payload.len() + 1);
        prop_assert_eq!(frame[0] as usize, payload.len() + 1);
        prop_assert_eq!(decode(&frame).unwrap(), &payload[..]);
    }

    #[test]
    fn encode_rejects_long_payloads(len in (MAX_PAYLOAD_LEN + 1)..1024usize) {
        let payload = vec![0u8; len];
        let rejected = matches!(encode(&payload), Err(ProtocolError::PayloadTooLong { .. }));
        prop_assert!(rejected);
    }

    #[test]
    fn manufacturer_id_takes_priority_over_name(
        name in "[A-Za-z ]{1,12}",
        other in "[A-Za-z ]{1,12}",
        id in any::<u8>(),
    ) {
        prop_assume!(name != other);
        let devices = vec![
            advertised(other.clone(), "by-id".to_string(), id),
            advertised(name.clone(), "by-name".to_string(), id.wrapping_add(1)),
        ];
        let target = MatchTarget { name, manufacturer_id: id, identifier: None };

        let found = select_device(&devices, &target).unwrap();
        prop_assert_eq!(found.map(|d| d.address.as_str()), Some("by-id"));
    }

    #[test]
    fn nothing_qualifies_means_no_match(id in 0u8..0x7f, names in prop::collection::vec("[a-z]{1,8}", 0..6)) {
        let devices: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| advertised(n.clone(), format!("dev-{}", i), id + 0x80))
            .collect();
        let target = MatchTarget {
            name: "Train Base".to_string(),
            manufacturer_id: id,
            identifier: None,
        };
        prop_assert_eq!(select_device(&devices, &target), Ok(None));
    }

    #[test]
    fn several_manufacturer_entries_are_fatal(extra in 2usize..5, position in 0usize..3) {
        let mut devices: Vec<_> = (0..3)
            .map(|i| advertised("Train".to_string(), format!("dev-{}", i), 0x20))
            .collect();
        for company in 0..extra as u16 {
            devices[position] = devices[position]
                .clone()
                .with_manufacturer_data(0x1000 + company, vec![0x00, 0x01]);
        }
        let target = MatchTarget {
            name: "Train".to_string(),
            manufacturer_id: 0x20,
            identifier: None,
        };
        let ambiguous = matches!(
            select_device(&devices, &target),
            Err(ConnectionError::AmbiguousAdvertisement { .. })
        );
        prop_assert!(ambiguous);
    }

    #[test]
    fn identifier_selects_only_its_address(count in 2usize..6, pick in 0usize..6) {
        let pick = pick % count;
        let devices: Vec<_> = (0..count)
            .map(|i| advertised("Train".to_string(), format!("90:84:2B:00:00:{:02X}", i), 0x20))
            .collect();
        let target = MatchTarget {
            name: "Train".to_string(),
            manufacturer_id: 0x20,
            identifier: Some(BleIdentifier::parse(&format!("90:84:2b:00:00:{:02x}", pick))),
        };
        let found = select_device(&devices, &target).unwrap();
        prop_assert_eq!(found, Some(&devices[pick]));
    }
}
