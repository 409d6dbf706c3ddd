//! Save/restore of endpoint state.
mod common;

use std::path::PathBuf;

use common::{BDF, Harness, fake_host};
use proptest::prelude::*;
use vcnet::{
    Endpoint, EndpointState, EndpointStore, EndpointType, IpvlanEndpoint, MacvtapEndpoint,
    NetworkInfo, PhysicalEndpoint, TapEndpoint, VethEndpoint, VhostUserEndpoint, VlanEndpoint,
    restore_endpoint,
};
use vcnet_common::VcnetPaths;
use vcnet_network::InterworkingModel;

fn model() -> impl Strategy<Value = InterworkingModel> {
    prop_oneof![
        Just(InterworkingModel::Bridged),
        Just(InterworkingModel::MacVtap),
        Just(InterworkingModel::TcFilter),
        Just(InterworkingModel::None),
    ]
}

fn sample_endpoints(h: &Harness) -> Vec<Box<dyn Endpoint>> {
    let info = NetworkInfo::for_link("mvt0", "macvtap");
    vec![
        Box::new(VethEndpoint::create(h.host.clone(), 0, "eth0", InterworkingModel::TcFilter).unwrap()),
        Box::new(VlanEndpoint::create(h.host.clone(), 1, "eth0.10", InterworkingModel::Bridged).unwrap()),
        Box::new(IpvlanEndpoint::create(h.host.clone(), 2, "").unwrap()),
        Box::new(TapEndpoint::create(h.host.clone(), 3, "").unwrap()),
        Box::new(MacvtapEndpoint::create(h.host.clone(), info)),
        Box::new(VhostUserEndpoint::create(
            NetworkInfo::for_link("eth5", "veth"),
            PathBuf::from("/tmp/vhostuser_10.0.0.5/vhu.sock"),
        )),
    ]
}

#[test]
fn store_round_trips_mixed_endpoints() {
    let temp = tempfile::tempdir().unwrap();
    let h = Harness::new();
    let store = EndpointStore::new(VcnetPaths::with_root(temp.path()));
    let endpoints = sample_endpoints(&h);

    store.save("sandbox-a", &endpoints).unwrap();
    assert!(store.exists("sandbox-a"));
    assert_eq!(
        store.state_path("sandbox-a"),
        temp.path().join("sandboxes/sandbox-a/network.json")
    );

    let restored = store.restore("sandbox-a", &h.host).unwrap();
    assert_eq!(restored.len(), endpoints.len());
    for (before, after) in endpoints.iter().zip(&restored) {
        assert_eq!(after.endpoint_type(), before.endpoint_type());
        assert_eq!(after.save(), before.save());
        assert_eq!(after.network_pair(), before.network_pair());
        assert!(after.pci_addr().is_empty());
    }
    assert_eq!(restored[0].name(), "eth0");
    assert_eq!(restored[1].name(), "eth0.10");
    assert_eq!(restored[3].name(), "tap3_vc");

    store.delete("sandbox-a").unwrap();
    assert!(!store.exists("sandbox-a"));
}

#[test]
fn saving_replaces_earlier_state() {
    let temp = tempfile::tempdir().unwrap();
    let h = Harness::new();
    let store = EndpointStore::new(VcnetPaths::with_root(temp.path()));

    store.save("sb", &sample_endpoints(&h)).unwrap();
    store.save_states("sb", &[EndpointState::Macvtap]).unwrap();

    assert_eq!(store.load_states("sb").unwrap(), vec![EndpointState::Macvtap]);
    assert!(!temp.path().join("sandboxes/sb/network.json.tmp").exists());
}

#[test]
fn records_are_keyed_by_type_tag() {
    let temp = tempfile::tempdir().unwrap();
    let h = Harness::new();
    let store = EndpointStore::new(VcnetPaths::with_root(temp.path()));
    store.save("sb", &sample_endpoints(&h)).unwrap();

    let raw = std::fs::read_to_string(store.state_path("sb")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let tags: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["type"].as_str().unwrap())
        .collect();
    assert_eq!(tags, ["veth", "vlan", "ipvlan", "tap", "macvtap", "vhost-user"]);
}

#[test]
fn physical_endpoint_survives_restore() {
    let (dir, config) = fake_host();
    let h = Harness::with_config(config);
    let mut info = NetworkInfo::for_link("ens3", "device");
    info.iface.hard_addr = "3c:fd:fe:00:00:01".to_string();
    let ep = PhysicalEndpoint::from_netdev(h.host.clone(), info).unwrap();

    let json = serde_json::to_string(&ep.save()).unwrap();
    let state: EndpointState = serde_json::from_str(&json).unwrap();
    assert_eq!(state.endpoint_type(), EndpointType::Physical);

    let mut loaded = PhysicalEndpoint::blank(h.host.clone());
    loaded.load(state.clone());
    assert_eq!(loaded.device(), ep.device());
    assert_eq!(loaded.device().bdf, BDF);
    assert_eq!(loaded.name(), "ens3");
    assert_eq!(loaded.hardware_addr(), "3c:fd:fe:00:00:01");

    let restored = restore_endpoint(state, &h.host);
    assert_eq!(restored.endpoint_type(), EndpointType::Physical);
    assert_eq!(restored.name(), "ens3");
    assert_eq!(restored.hardware_addr(), "3c:fd:fe:00:00:01");
    assert_eq!(restored.network_pair(), None);

    let store = EndpointStore::new(VcnetPaths::with_root(dir.path().join("store")));
    store.save("sb", &[Box::new(ep) as Box<dyn Endpoint>]).unwrap();
    let from_disk = store.restore("sb", &h.host).unwrap();
    assert_eq!(from_disk.len(), 1);
    assert_eq!(from_disk[0].save(), loaded.save());
}

#[test]
fn load_resets_type_tag_for_foreign_state() {
    let h = Harness::new();
    let veth = VethEndpoint::create(h.host.clone(), 0, "", InterworkingModel::TcFilter).unwrap();

    let mut vlan = VlanEndpoint::blank(h.host.clone());
    vlan.load(veth.save());

    assert_eq!(vlan.endpoint_type(), EndpointType::Vlan);
    assert_eq!(vlan.network_pair(), Some(&Default::default()));
}

proptest! {
    #[test]
    fn pair_variants_round_trip(idx in 0i64..1024, name in "[a-z]{1,8}[0-9]{0,3}", model in model()) {
        let h = Harness::new();
        let endpoints: Vec<Box<dyn Endpoint>> = vec![
            Box::new(VethEndpoint::create(h.host.clone(), idx, &name, model).unwrap()),
            Box::new(VlanEndpoint::create(h.host.clone(), idx, &name, model).unwrap()),
            Box::new(IpvlanEndpoint::create(h.host.clone(), idx, &name).unwrap()),
        ];

        for ep in &endpoints {
            let json = serde_json::to_string(&ep.save()).unwrap();
            let state: EndpointState = serde_json::from_str(&json).unwrap();
            let restored = restore_endpoint(state, &h.host);

            prop_assert_eq!(restored.endpoint_type(), ep.endpoint_type());
            prop_assert_eq!(restored.network_pair(), ep.network_pair());
            prop_assert_eq!(restored.name(), name.as_str());
        }
    }
}
