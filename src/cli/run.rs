use super::config::{DaemonConfig, LoggingConfig};
use groupd::account::{Account, AccountRegistry, AccountStore, FileAccountStore, LoopbackAccount};
use groupd::authority::LoopbackAuthority;
use groupd::crypto::GroupSecretParams;
use groupd::daemon::Daemon;
use groupd::group::{EncryptedGroupState, GroupsManager};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run the daemon
///
/// Loads every stored account from the data directory and serves
/// newline-delimited JSON requests on stdin, answering on stdout.
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided
/// 2. `config.toml` next to `--data-dir` if provided
/// 3. Default config at `~/.local/share/groupd/config.toml`
///
/// If the config file doesn't exist, a default one is generated.
///
/// ## Collaborators
///
/// Accounts are backed by in-process contexts and groups by an in-process
/// authority seeded from the cached snapshots.
pub async fn execute(
    config_path: Option<String>,
    data_dir: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, config_path, created) = DaemonConfig::resolve(config_path, data_dir)?;
    init_logging(&config.logging)?;

    if created {
        info!(path = %config_path.display(), "created default configuration");
    }
    let commit_timeout = config.authority.commit_timeout()?;
    let delivery_timeout = config.delivery.timeout()?;

    let store = Arc::new(FileAccountStore::new(&config.store.data_dir));
    let authority = Arc::new(LoopbackAuthority::new());
    let accounts = AccountRegistry::new();

    for account_id in store.list().await? {
        let data = store.load(&account_id).await?;
        for group in data.groups.values() {
            let params = GroupSecretParams::derive_from_master_key(&group.master_key)?;
            authority.insert_group(group.id, EncryptedGroupState::encrypt(&params, &group.state)?);
        }

        info!(account = %account_id, groups = data.groups.len(), "account loaded");
        let context = LoopbackAccount::new(data.address.clone(), data.identity_key);
        accounts.register(Account::new(data, Arc::new(context), store.clone()));
    }

    if accounts.is_empty() {
        warn!(
            data_dir = %config.store.data_dir.display(),
            "no accounts found; add one with `groupd init-account`"
        );
    }

    let daemon = Arc::new(Daemon::new(
        accounts,
        GroupsManager::new(authority, commit_timeout, delivery_timeout),
    ));

    info!(
        accounts = daemon.accounts().len(),
        commit_timeout = %humantime::format_duration(commit_timeout),
        "serving requests on stdin"
    );
    daemon
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;
    info!("input closed, shutting down");

    Ok(())
}

/// Install the tracing subscriber. Stdout carries responses, so logs go to
/// stderr or the configured file.
fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            subscriber
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
                .map_err(|e| e.to_string())?;
        }
        None => subscriber
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| e.to_string())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_an_error() {
        let logging = LoggingConfig {
            level: "warn".to_string(),
            file: None,
        };
        // The first call may lose to another subscriber; the second never wins.
        let _ = init_logging(&logging);
        assert!(init_logging(&logging).is_err());
    }
}
