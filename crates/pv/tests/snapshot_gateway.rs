//! A captured snapshot drives the same queries as a live instrument.

use std::sync::Arc;

use instcheck_pv::decode::compress_and_hex;
use instcheck_pv::{PvGateway, SnapshotSource};
use serde_json::json;

#[test]
fn snapshot_answers_block_server_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("larmor.json");
    let snapshot = json!({
        "CS:INSTLIST": compress_and_hex(&json!([
            {"name": "LARMOR", "hostName": "NDXLARMOR", "pvPrefix": "IN:LARMOR:"}
        ])).unwrap(),
        "IN:LARMOR:CS:BLOCKSERVER:IOCS": compress_and_hex(&json!({"SIMPLE": {}, "INSTETC_01": {}})).unwrap(),
        "IN:LARMOR:CS:BLOCKSERVER:IOCS_NOT_TO_STOP": compress_and_hex(&json!(["INSTETC_01"])).unwrap(),
        "IN:LARMOR:CS:BLOCKSERVER:PVS:INTEREST:MEDIUM": compress_and_hex(&json!([["IN:LARMOR:SIMPLE:VALUE1"]])).unwrap(),
        "IN:LARMOR:CS:VERSION:SVN:REV": "15.0.0.a1b2c3",
    });
    std::fs::write(&path, snapshot.to_string()).unwrap();

    let root = PvGateway::new(Arc::new(SnapshotSource::load(&path).unwrap()));
    let instruments = root.get_inst_list();
    assert_eq!(instruments.len(), 1);

    let larmor = root.for_instrument(instruments[0].pv_prefix.clone());
    assert_eq!(larmor.get_valid_iocs().unwrap().len(), 2);
    assert!(larmor.get_protected_iocs().unwrap().contains("INSTETC_01"));
    assert!(larmor.get_interesting_pvs().contains("IN:LARMOR:SIMPLE:VALUE1"));
    assert_eq!(larmor.get_version_string().as_deref(), Some("15.0.0.a1b2c3"));
}
