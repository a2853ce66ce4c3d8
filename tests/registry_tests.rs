mod common;

use common::{harness, harness_with_keys, FailingKeys};
use std::sync::atomic::Ordering;
use vpn_registry::{PeerUpdate, RegistryError};

#[test]
fn created_peers_get_unique_host_ids_in_range() {
    let h = harness();
    for i in 0..20 {
        h.registry.create_peer(&format!("peer{}", i), None, None).unwrap();
    }
    let peers = h.registry.list_peers().unwrap();
    let mut ids: Vec<i64> = peers.iter().map(|p| p.host_id.unwrap()).collect();
    assert!(ids.iter().all(|h| (2..=254).contains(h)));
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}

#[test]
fn allocation_fills_first_gap() {
    let h = harness();
    for (name, id) in [("a", 2), ("b", 3), ("c", 4)] {
        h.registry.create_peer(name, Some(id), None).unwrap();
    }
    let p = h.registry.create_peer("d", None, None).unwrap();
    assert_eq!(p.host_id, Some(5));
}

#[test]
fn explicit_duplicate_host_id_is_rejected_without_change() {
    let h = harness();
    h.registry.create_peer("a", Some(10), None).unwrap();
    let before = h.store_text();
    let activations = h.activations.load(Ordering::SeqCst);
    let err = h.registry.create_peer("b", Some(10), None).unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert_eq!(h.store_text(), before);
    assert_eq!(h.activations.load(Ordering::SeqCst), activations);
}

#[test]
fn empty_name_is_rejected() {
    let h = harness();
    match h.registry.create_peer("", None, None) {
        Err(RegistryError::Validation(msg)) => assert_eq!(msg, "username cannot be empty"),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(h.registry.list_peers().unwrap().is_empty());
}

#[test]
fn out_of_range_host_ids_are_rejected() {
    let h = harness();
    for bad in [0, 1, 255, -3] {
        assert!(matches!(h.registry.create_peer("x", Some(bad), None), Err(RegistryError::Validation(_))));
    }
}

#[test]
fn explicit_254_is_accepted_even_though_allocation_stops_at_253() {
    let h = harness();
    let p = h.registry.create_peer("edge", Some(254), None).unwrap();
    assert_eq!(p.host_id, Some(254));
}

#[test]
fn capacity_exhausted_when_2_to_253_taken() {
    let h = harness();
    for i in 2..=253 {
        h.registry.create_peer(&format!("p{}", i), Some(i), None).unwrap();
    }
    let before = h.registry.list_peers().unwrap();
    assert!(matches!(h.registry.create_peer("overflow", None, None), Err(RegistryError::CapacityExhausted)));
    assert_eq!(h.registry.list_peers().unwrap(), before);
}

#[test]
fn rename_to_taken_name_fails_but_own_name_is_fine() {
    let h = harness();
    let a = h.registry.create_peer("alice", None, None).unwrap();
    h.registry.create_peer("bob", None, None).unwrap();
    let err = h
        .registry
        .update_peer(&a.id, PeerUpdate { name: Some("bob".into()), ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    let same = h
        .registry
        .update_peer(&a.id, PeerUpdate { name: Some("alice".into()), ..Default::default() })
        .unwrap();
    assert_eq!(same, a);
}

#[test]
fn update_merges_and_rewrites_config() {
    let h = harness();
    let a = h.registry.create_peer("alice", None, None).unwrap();
    let updated = h
        .registry
        .update_peer(&a.id, PeerUpdate { name: Some("alicia".into()), host_id: Some(40), ..Default::default() })
        .unwrap();
    assert_eq!(updated.public_key, a.public_key);
    assert_eq!(updated.host_id, Some(40));
    let text = h.config_text();
    assert!(text.contains("### begin alicia ###"));
    assert!(text.contains("AllowedIPs = 10.8.0.40/32"));
    assert!(!text.contains("alice ###"));
}

#[test]
fn update_unknown_id_is_not_found() {
    let h = harness();
    let err = h.registry.update_peer("missing", PeerUpdate::default()).unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[test]
fn delete_unknown_id_leaves_collection_unchanged() {
    let h = harness();
    h.registry.create_peer("alice", None, None).unwrap();
    let before = h.store_text();
    assert!(matches!(h.registry.delete_peer("missing"), Err(RegistryError::NotFound(_))));
    assert_eq!(h.store_text(), before);
}

#[test]
fn create_then_delete_restores_collection() {
    let h = harness();
    h.registry.create_peer("base", None, None).unwrap();
    let before = h.registry.list_peers().unwrap();
    let a = h.registry.create_peer("a", None, None).unwrap();
    let removed = h.registry.delete_peer(&a.id).unwrap();
    assert_eq!(removed, a);
    assert_eq!(h.registry.list_peers().unwrap(), before);
}

#[test]
fn get_peer_distinguishes_absent() {
    let h = harness();
    let a = h.registry.create_peer("alice", None, None).unwrap();
    assert_eq!(h.registry.get_peer(&a.id).unwrap(), Some(a));
    assert_eq!(h.registry.get_peer("nope").unwrap(), None);
}

#[test]
fn config_has_one_block_per_peer_after_each_mutation() {
    let h = harness();
    let a = h.registry.create_peer("alice", None, None).unwrap();
    let b = h.registry.create_peer("bob", None, None).unwrap();
    h.registry.create_peer("carol", None, None).unwrap();
    h.registry.delete_peer(&b.id).unwrap();
    h.registry.regenerate_keys(&a.id).unwrap();

    let text = h.config_text();
    let peers = h.registry.list_peers().unwrap();
    assert_eq!(text.matches("[Peer]").count(), peers.len());
    for p in &peers {
        assert_eq!(text.matches(&format!("### begin {} ###", p.name)).count(), 1);
        assert_eq!(text.matches(&format!("### end {} ###", p.name)).count(), 1);
        assert!(text.contains(&format!("PublicKey = {}", p.public_key)));
    }
    assert!(!text.contains("bob"));
    assert_eq!(h.activations.load(Ordering::SeqCst), 5);
}

#[test]
fn regenerate_keys_replaces_both_keys_only() {
    let h = harness();
    let a = h.registry.create_peer("alice", Some(9), None).unwrap();
    let r = h.registry.regenerate_keys(&a.id).unwrap();
    assert_ne!(r.public_key, a.public_key);
    assert_ne!(r.private_key, a.private_key);
    assert_eq!(r.name, a.name);
    assert_eq!(r.host_id, a.host_id);
    assert_eq!(h.key_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn regenerate_keys_unknown_id_is_not_found() {
    let h = harness();
    assert!(matches!(h.registry.regenerate_keys("missing"), Err(RegistryError::NotFound(_))));
}

#[test]
fn activation_failure_keeps_the_mutation() {
    let h = harness();
    h.fail_activation.store(true, Ordering::SeqCst);
    let err = h.registry.create_peer("alice", None, None).unwrap_err();
    assert!(matches!(err, RegistryError::ExternalPrimitive(_)));
    let peers = h.registry.list_peers().unwrap();
    assert_eq!(peers.len(), 1);
    assert!(h.config_text().contains("### begin alice ###"));
}

#[test]
fn key_generation_failure_stores_nothing() {
    let h = harness_with_keys(Some(Box::new(FailingKeys)));
    let err = h.registry.create_peer("alice", None, None).unwrap_err();
    assert!(matches!(err, RegistryError::ExternalPrimitive(_)));
    assert!(h.registry.list_peers().unwrap().is_empty());
    assert_eq!(h.activations.load(Ordering::SeqCst), 0);
}

#[test]
fn keep_alive_flows_into_client_config() {
    let h = harness();
    let a = h.registry.create_peer("phone", Some(12), Some(25)).unwrap();
    let txt = h.registry.client_config(&a.id).unwrap();
    assert!(txt.starts_with(&format!("[Interface]\nPrivateKey = {}\nAddress = 10.8.0.12/32", a.private_key)));
    assert!(txt.contains("Endpoint = vpn.example.org:51820"));
    assert!(txt.ends_with("PersistentKeepalive = 25"));
    assert!(h.store_text().contains("\"persistentKeepalive\": 25"));
    assert!(matches!(h.registry.client_config("missing"), Err(RegistryError::NotFound(_))));
}

#[test]
fn concurrent_creates_do_not_lose_updates() {
    let h = harness();
    std::thread::scope(|s| {
        for t in 0..4 {
            let reg = &h.registry;
            s.spawn(move || {
                for i in 0..5 {
                    reg.create_peer(&format!("t{}-{}", t, i), None, None).unwrap();
                }
            });
        }
    });
    let peers = h.registry.list_peers().unwrap();
    assert_eq!(peers.len(), 20);
    let mut ids: Vec<i64> = peers.iter().filter_map(|p| p.host_id).collect();
    ids.sort();
    assert_eq!(ids, (2..22).collect::<Vec<i64>>());
}

#[test]
fn update_to_host_id_held_by_another_peer_is_rejected() {
    let h = harness();
    let a = h.registry.create_peer("alice", Some(2), None).unwrap();
    h.registry.create_peer("bob", Some(3), None).unwrap();
    let before = h.store_text();
    let activations = h.activations.load(Ordering::SeqCst);
    match h.registry.update_peer(&a.id, PeerUpdate { host_id: Some(3), ..Default::default() }) {
        Err(RegistryError::Validation(msg)) => assert_eq!(msg, "User cannot have same hostID as another user"),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(h.store_text(), before);
    assert_eq!(h.activations.load(Ordering::SeqCst), activations);
}

#[test]
fn update_to_out_of_range_host_id_is_rejected() {
    let h = harness();
    let a = h.registry.create_peer("alice", None, None).unwrap();
    let before = h.store_text();
    for bad in [1, 255] {
        let err = h
            .registry
            .update_peer(&a.id, PeerUpdate { host_id: Some(bad), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert_eq!(h.store_text(), before);
    }
    let kept = h
        .registry
        .update_peer(&a.id, PeerUpdate { host_id: Some(254), ..Default::default() })
        .unwrap();
    assert_eq!(kept.host_id, Some(254));
}
