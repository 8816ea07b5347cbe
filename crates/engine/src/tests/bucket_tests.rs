use super::helpers::open_store;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn fresh_directory_gets_default_bucket() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path());

    assert!(dir.path().join("0").is_dir());
    assert_eq!(store.buckets(), vec!["0".to_string()]);
    assert_eq!(store.active_bucket(), "0");
    Ok(())
}

#[test]
fn change_bucket_creates_directory_on_first_reference() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_store(dir.path());

    store.change_bucket("logs")?;
    assert!(dir.path().join("logs").is_dir());
    assert_eq!(store.active_bucket(), "logs");
    assert_eq!(
        store.buckets(),
        vec!["0".to_string(), "logs".to_string()]
    );
    Ok(())
}

#[test]
fn writes_route_to_the_active_bucket() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_store(dir.path());

    store.change_bucket("logs")?;
    store.set(b"k", b"v")?;

    assert!(dir.path().join("logs").join("0000000000.dat").exists());
    assert!(!dir.path().join("0").join("0000000000.dat").exists());
    Ok(())
}

#[test]
fn keys_stay_visible_across_bucket_switches() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_store(dir.path());

    store.set(b"a", b"1")?;
    store.change_bucket("other")?;

    // the index is global: switching buckets only moves the write target
    assert_eq!(store.get(b"a")?.unwrap(), b"1");
    store.set(b"b", b"2")?;

    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    Ok(())
}

#[test]
fn invalid_bucket_names_are_rejected() {
    let dir = tempdir().unwrap();
    let mut store = open_store(dir.path());

    assert!(store.change_bucket("").is_err());
    assert!(store.change_bucket(".hidden").is_err());
    assert!(store.change_bucket("a/b").is_err());
    assert_eq!(store.active_bucket(), "0");
}

#[test]
fn reopen_discovers_existing_buckets() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut store = open_store(dir.path());
        store.change_bucket("sessions")?;
        store.set(b"s", b"1")?;
    }

    let store = open_store(dir.path());
    assert_eq!(
        store.buckets(),
        vec!["0".to_string(), "sessions".to_string()]
    );
    // "0" is the active bucket after open when present
    assert_eq!(store.active_bucket(), "0");
    assert_eq!(store.get(b"s")?.unwrap(), b"1");
    Ok(())
}

#[test]
fn hidden_directories_are_not_buckets() -> Result<()> {
    let dir = tempdir()?;
    std::fs::create_dir_all(dir.path().join(".snapshots"))?;

    let store = open_store(dir.path());
    assert_eq!(store.buckets(), vec!["0".to_string()]);
    Ok(())
}
