use core::time::Duration;

use bustlink_network_primitives::config::DEFAULT_PORT;
use tempdir::TempDir;

use super::*;

fn new_config() -> ConfigFile {
    ConfigFile::new(
        Keypair::generate_ed25519(),
        SwarmConfig::new(SwarmConfig::default_listen("0.0.0.0", DEFAULT_PORT)),
        LinkConfig::default(),
        StoreConfig::default(),
    )
}

#[test]
fn test_save_then_load_keeps_identity() {
    let dir = TempDir::new("bustlink-config").unwrap();
    let path = Utf8Path::from_path(dir.path()).unwrap();

    assert!(!ConfigFile::exists(path));

    let config = new_config();
    config.save(path).unwrap();

    assert!(ConfigFile::exists(path));

    let loaded = ConfigFile::load(path).unwrap();

    assert_eq!(
        loaded.identity.public().to_peer_id(),
        config.identity.public().to_peer_id()
    );
    assert_eq!(loaded.swarm.listen, config.swarm.listen);
    assert_eq!(loaded.link.max_attempts, config.link.max_attempts);
    assert_eq!(loaded.store.api.as_str(), "http://127.0.0.1:5001/");
}

#[test]
fn test_optional_sections_take_defaults() {
    let identity = Keypair::generate_ed25519();
    let content = format!(
        r#"
[identity]
peer_id = "{}"
keypair = "{}"

[swarm]
listen = ["/ip4/0.0.0.0/tcp/4101"]
"#,
        identity.public().to_peer_id().to_base58(),
        bs58::encode(identity.to_protobuf_encoding().unwrap()).into_string(),
    );

    let config: ConfigFile = toml::from_str(&content).unwrap();

    assert_eq!(config.link.max_attempts, 5);
    assert_eq!(config.link.bootstrap.timeout, Duration::from_secs(5));
    assert_eq!(config.link.sync.interval, Duration::from_secs(30));
    assert_eq!(config.link.pinning.harvest_after, Duration::from_secs(60));
    assert!(config.link.pinning.wait);
    assert_eq!(config.swarm.idle_timeout, Duration::from_secs(300));
    assert_eq!(config.store.api.as_str(), "http://127.0.0.1:5001/");
}

#[test]
fn test_mismatched_peer_id_rejected() {
    let identity = Keypair::generate_ed25519();
    let other = Keypair::generate_ed25519();
    let content = format!(
        r#"
[identity]
peer_id = "{}"
keypair = "{}"

[swarm]
listen = []
"#,
        other.public().to_peer_id().to_base58(),
        bs58::encode(identity.to_protobuf_encoding().unwrap()).into_string(),
    );

    assert!(toml::from_str::<ConfigFile>(&content).is_err());
}

#[test]
fn test_missing_identity_rejected() {
    let dir = TempDir::new("bustlink-config").unwrap();
    let path = Utf8Path::from_path(dir.path()).unwrap();

    write(
        path.join(CONFIG_FILE),
        "[swarm]\nlisten = [\"/ip4/0.0.0.0/tcp/4101\"]\n",
    )
    .unwrap();

    let err = ConfigFile::load(path).unwrap_err();

    assert!(format!("{err:?}").contains("identity"), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_file_source_rereads_link_section() {
    let dir = TempDir::new("bustlink-config").unwrap();
    let path = Utf8Path::from_path(dir.path()).unwrap();
    let source = FileConfigSource::new(path);

    assert!(source.snapshot().await.is_err());

    new_config().save(path).unwrap();
    assert_eq!(source.snapshot().await.unwrap().max_attempts, 5);

    let content = read_to_string(path.join(CONFIG_FILE)).unwrap();
    write(
        path.join(CONFIG_FILE),
        content.replace("max_attempts = 5", "max_attempts = 9"),
    )
    .unwrap();

    assert_eq!(source.snapshot().await.unwrap().max_attempts, 9);
}
