use super::config::DaemonConfig;
use groupd::account::{validate_account_id, AccountData, AccountStore, FileAccountStore, StoreError};
use groupd::address::Address;
use groupd::trust::identity_key::DJB_KEY_TYPE;
use groupd::trust::IdentityKey;
use rand::RngCore;
use uuid::Uuid;

/// Write a fresh local snapshot for an account
///
/// The account gets a new identity key and, unless one is given, a new
/// stable id. Refuses to overwrite an existing snapshot.
pub async fn execute(
    config_path: Option<String>,
    data_dir: Option<String>,
    number: String,
    uuid: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    validate_account_id(&number)?;
    let uuid = match uuid {
        Some(uuid) => {
            Uuid::parse_str(&uuid).map_err(|e| format!("Invalid uuid '{}': {}", uuid, e))?
        }
        None => Uuid::new_v4(),
    };

    let (config, _, _) = DaemonConfig::resolve(config_path, data_dir)?;
    let store = FileAccountStore::new(&config.store.data_dir);

    match store.load(&number).await {
        Ok(_) => {
            return Err(format!(
                "Account {} already exists in {}",
                number,
                store.dir().display()
            )
            .into())
        }
        Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let mut key = [0u8; IdentityKey::LEN];
    key[0] = DJB_KEY_TYPE;
    rand::thread_rng().fill_bytes(&mut key[1..]);
    let identity_key = IdentityKey::from_bytes(&key)?;

    let address = Address {
        uuid: Some(uuid),
        number: Some(number.clone()),
    };
    store
        .save(&AccountData::new(number.clone(), address, identity_key))
        .await?;

    println!("Account {} ({}) created in {}", number, uuid, store.dir().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_account_writes_snapshot_once() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("config.toml");
        let data_dir = temp_dir.path().join("accounts");
        let args = || {
            (
                Some(config.to_string_lossy().to_string()),
                Some(data_dir.to_string_lossy().to_string()),
            )
        };

        let (c, d) = args();
        execute(c, d, "+15550001234".into(), None).await.unwrap();

        let data = FileAccountStore::new(&data_dir)
            .load("+15550001234")
            .await
            .unwrap();
        assert_eq!(data.address.number.as_deref(), Some("+15550001234"));
        assert!(data.address.uuid.is_some());

        let (c, d) = args();
        assert!(execute(c, d, "+15550001234".into(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_init_account_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let config = Some(temp_dir.path().join("c.toml").to_string_lossy().to_string());

        assert!(execute(config.clone(), None, "../evil".into(), None)
            .await
            .is_err());
        assert!(execute(config, None, "+1555".into(), Some("nope".into()))
            .await
            .is_err());
    }
}
