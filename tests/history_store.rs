use image::{Rgb, RgbImage};
use tempfile::TempDir;

use melon_leaf::shared_memory_uri;
use melon_leaf::storage::{
    encode_image, hash_password, HistoryStore, InMemoryStore, SqliteStore, UserStore,
    TIMESTAMP_FORMAT,
};

fn sqlite() -> SqliteStore {
    SqliteStore::open(&shared_memory_uri(), 7).expect("open memory store")
}

fn exercise_users(store: &mut dyn UserStore) {
    assert!(store.add_user("petani", "rahasia").unwrap());
    assert!(!store.add_user("petani", "lain").unwrap());
    assert!(store.verify_user("petani", "rahasia").unwrap());
    assert!(!store.verify_user("petani", "lain").unwrap());
    assert!(!store.verify_user("tamu", "rahasia").unwrap());
}

fn exercise_history(store: &mut dyn HistoryStore) {
    let a = store
        .add_detection_record("petani", "downy mildew", 0.82, None)
        .unwrap();
    let b = store
        .add_detection_record("petani", "daun sehat", 0.91, None)
        .unwrap();
    store
        .add_detection_record("tetangga", "cucumber mosaic virus", 0.6, None)
        .unwrap();
    assert!(b > a);

    let mine = store.detection_history("petani").unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, b, "most recent first");
    assert_eq!(mine[1].disease_name, "downy mildew");
    assert!(mine.iter().all(|r| r.username == "petani"));
    assert!(chrono::NaiveDateTime::parse_from_str(&mine[0].timestamp, TIMESTAMP_FORMAT).is_ok());

    assert!(store.delete_detection_record(a).unwrap());
    assert!(!store.delete_detection_record(a).unwrap());
    assert_eq!(store.detection_history("petani").unwrap().len(), 1);
    assert!(store.detection_history("orang lain").unwrap().is_empty());

    let foreign = store
        .add_detection_record("tetangga", "downy mildew", 0.7, None)
        .unwrap();
    assert!(!store.delete_user_record("petani", foreign).unwrap());
    assert_eq!(store.detection_history("tetangga").unwrap().len(), 2);
    assert!(store.delete_user_record("tetangga", foreign).unwrap());
    assert!(!store.delete_user_record("petani", a).unwrap());
    assert!(store.delete_user_record("petani", b).unwrap());
    assert!(store.detection_history("petani").unwrap().is_empty());
}

#[test]
fn sqlite_users() {
    exercise_users(&mut sqlite());
}

#[test]
fn sqlite_history() {
    exercise_history(&mut sqlite());
}

#[test]
fn in_memory_users() {
    exercise_users(&mut InMemoryStore::default());
}

#[test]
fn in_memory_history() {
    exercise_history(&mut InMemoryStore::default());
}

#[test]
fn passwords_are_stored_as_digests() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("melon.db");
    let path = path.to_str().unwrap();
    {
        let mut store = SqliteStore::open(path, 7).unwrap();
        store.add_user("petani", "rahasia").unwrap();
    }
    let conn = rusqlite::Connection::open(path).unwrap();
    let stored: String = conn
        .query_row(
            "SELECT password_hashed FROM users WHERE username = 'petani'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stored, hash_password("rahasia"));
    assert_eq!(stored.len(), 64);
}

#[test]
fn file_store_survives_reopen_with_images() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("riwayat.db");
    let path = path.to_str().unwrap();

    let mut leaf = RgbImage::from_pixel(16, 12, Rgb([30, 160, 40]));
    leaf.put_pixel(3, 4, Rgb([0, 255, 0]));
    let encoded = encode_image(&leaf).unwrap();

    let id = {
        let mut store = SqliteStore::open(path, 7).unwrap();
        store.add_user("petani", "rahasia").unwrap();
        store
            .add_detection_record("petani", "downy mildew", 0.75, Some(&encoded))
            .unwrap()
    };

    let mut store = SqliteStore::open(path, 7).unwrap();
    assert!(store.verify_user("petani", "rahasia").unwrap());
    let history = store.detection_history("petani").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
    assert!((history[0].confidence - 0.75).abs() < 1e-6);
    assert_eq!(history[0].decode_image().unwrap(), Some(leaf));
}

#[test]
fn corrupt_stored_image_is_reported_not_panicking() {
    let mut store = InMemoryStore::default();
    store
        .add_detection_record("petani", "downy mildew", 0.5, Some("bukan-base64!"))
        .unwrap();
    let record = &store.detection_history("petani").unwrap()[0];
    assert!(record.decode_image().is_err());
}

#[test]
fn out_of_range_offset_is_rejected() {
    assert!(SqliteStore::open(&shared_memory_uri(), 30).is_err());
    assert!(InMemoryStore::with_offset_hours(-30).is_err());
}
