use super::*;
use chrono::{TimeZone, Utc};
use shared::domain::{Address, Location, PurifierId};
use storage::MEMORY_DATABASE_URL;

fn records() -> Vec<PurifierRecord> {
    vec![
        PurifierRecord {
            id: PurifierId::parse("PWR-001").expect("id"),
            name: "Office Purifier".to_string(),
            location: Location::site("Main Office"),
            status: false,
            last_updated: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        },
        PurifierRecord {
            id: PurifierId::parse("cust_17").expect("id"),
            name: "Home unit".to_string(),
            location: Location::Address(Address {
                house_no_street: "12 MG Road".to_string(),
                area: "Indiranagar".to_string(),
                pincode: Some("560038".to_string()),
                phone_number: None,
            }),
            status: true,
            last_updated: Utc.with_ymd_and_hms(2024, 3, 2, 18, 0, 0).unwrap(),
        },
    ]
}

#[test]
fn snapshot_is_a_json_array_in_collection_order() {
    let payload = encode_snapshot(&records()).expect("encode");
    let value: serde_json::Value = serde_json::from_str(&payload).expect("json");

    let entries = value.as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "PWR-001");
    assert_eq!(entries[0]["location"], "Main Office");
    assert_eq!(entries[1]["location"]["houseNoStreet"], "12 MG Road");
    assert!(entries[1]["location"].get("phoneNumber").is_none());
    assert_eq!(entries[1]["lastUpdated"], "2024-03-02T18:00:00Z");

    assert_eq!(decode_snapshot(&payload).expect("decode"), records());
}

#[test]
fn decode_rejects_garbage() {
    assert!(decode_snapshot("{\"id\": 1}").is_err());
    assert!(decode_snapshot("").is_err());
}

#[tokio::test]
async fn memory_store_holds_last_write() {
    let store = MemorySnapshotStore::default();
    assert_eq!(store.load().await.expect("load"), None);

    store.save("[]").await.expect("save");
    store.save("[1]").await.expect("save");
    assert_eq!(store.load().await.expect("load").as_deref(), Some("[1]"));
    assert_eq!(store.payload().await.as_deref(), Some("[1]"));
}

#[tokio::test]
async fn sqlite_store_keeps_slots_apart() {
    let storage = Storage::new(MEMORY_DATABASE_URL).await.expect("storage");
    let primary = SqliteSnapshotStore::new(storage.clone(), DEFAULT_SNAPSHOT_SLOT);
    let scratch = SqliteSnapshotStore::new(storage, "scratch");

    assert_eq!(primary.load().await.expect("load"), None);
    let payload = encode_snapshot(&records()).expect("encode");
    primary.save(&payload).await.expect("save");

    assert_eq!(primary.load().await.expect("load"), Some(payload));
    assert_eq!(scratch.load().await.expect("load"), None);
}

#[tokio::test]
async fn sqlite_store_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("purifier-snapshot-{}", std::process::id()));
    let url = format!("sqlite://{}", dir.join("cache.db").display());

    {
        let store = SqliteSnapshotStore::open(&url, DEFAULT_SNAPSHOT_SLOT)
            .await
            .expect("open");
        store.save("[]").await.expect("save");
    }
    let reopened = SqliteSnapshotStore::open(&url, DEFAULT_SNAPSHOT_SLOT)
        .await
        .expect("reopen");
    assert_eq!(reopened.load().await.expect("load").as_deref(), Some("[]"));

    let _ = std::fs::remove_dir_all(dir);
}
