//! Bootstrap: first-start checks.

use std::net::SocketAddr;

use crate::config::ServerConfig;

/// Verify server configuration is ready for use.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.storage.data_dir.trim().is_empty() {
        anyhow::bail!(
            "Storage data_dir is empty in configuration.\n\
             Set [storage] data_dir to the directory holding the database."
        );
    }
    if let Some(ref listen) = config.server.listen {
        if listen.parse::<SocketAddr>().is_err() {
            anyhow::bail!("server.listen {listen:?} is not a socket address");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListenConfig, StorageConfig};

    fn config(data_dir: &str, listen: Option<&str>) -> ServerConfig {
        ServerConfig {
            server: ListenConfig {
                listen: listen.map(Into::into),
            },
            storage: StorageConfig {
                data_dir: data_dir.into(),
                sqlite_path: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_verify_config_empty_data_dir() {
        assert!(verify_config(&config("", None)).is_err());
        assert!(verify_config(&config("  ", None)).is_err());
    }

    #[test]
    fn test_verify_config_listen() {
        assert!(verify_config(&config("/tmp", Some("0.0.0.0:8080"))).is_ok());
        assert!(verify_config(&config("/tmp", Some("localhost"))).is_err());
        assert!(verify_config(&config("/tmp", None)).is_ok());
    }
}
