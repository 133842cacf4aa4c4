//! CLI command handling
//!
//! Builds a provider from flags and configuration, runs the command and
//! prints results as JSON.

use std::io::Read;
use std::time::Duration;

use serde_json::Value;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::provider::{ClientRegistry, Eip1193Provider, IpcProvider};
use crate::rpc::{BatchRequest, RequestArguments, SequentialIds};

/// Connection flags shared by all commands
#[derive(Debug, Default)]
pub struct Connection {
    pub path: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Dispatch a CLI command
pub async fn dispatch(connection: Connection, command: Commands) -> Result<()> {
    let config = Config::load()?;
    let path = config.socket_path(connection.path);
    let timeout = config.timeout(connection.timeout_ms);

    match command {
        Commands::Url => {
            println!("{}", path);
            Ok(())
        }

        Commands::Request { method, params } => {
            let params = parse_params(params.as_deref())?;
            let provider = build_provider(&config, path, timeout);

            let result = provider
                .request(RequestArguments::with_params(method, params))
                .await?;
            print_json(&result)
        }

        Commands::Batch { calls } => {
            let calls = if calls == "-" {
                let mut input = String::new();
                std::io::stdin().read_to_string(&mut input)?;
                input
            } else {
                calls
            };
            let batch = parse_batch(&calls)?;
            let provider = build_provider(&config, path, timeout);

            let results = provider.send_batch(batch).await?;
            print_json(&Value::Array(results))
        }
    }
}

fn build_provider(config: &Config, path: String, timeout: Duration) -> IpcProvider {
    let registry = ClientRegistry::ipc(config.client_options());
    tracing::debug!("Using IPC socket {} with {:?} timeout", path, timeout);
    IpcProvider::with_registry(path, timeout, &registry, SequentialIds::shared())
}

/// Parse a JSON array of parameters; absent means no parameters
pub fn parse_params(raw: Option<&str>) -> Result<Vec<Value>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(params)) => Ok(params),
        Ok(other) => Err(Error::InvalidParams(format!(
            "expected a JSON array, got {}",
            other
        ))),
        Err(e) => Err(Error::InvalidParams(e.to_string())),
    }
}

/// Parse a JSON array of batch entries
pub fn parse_batch(raw: &str) -> Result<Vec<BatchRequest>> {
    serde_json::from_str(raw).map_err(|e| Error::InvalidParams(format!("invalid batch: {}", e)))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_params() {
        assert!(parse_params(None).unwrap().is_empty());
        assert_eq!(
            parse_params(Some(r#"["latest", false]"#)).unwrap(),
            vec![json!("latest"), json!(false)]
        );
    }

    #[test]
    fn test_parse_params_rejects_non_array() {
        assert!(matches!(
            parse_params(Some(r#"{"a":1}"#)),
            Err(Error::InvalidParams(_))
        ));
        assert!(matches!(parse_params(Some("[")), Err(Error::InvalidParams(_))));
    }

    #[test]
    fn test_parse_batch() {
        let batch =
            parse_batch(r#"[{"method":"eth_blockNumber"},{"method":"eth_getBalance","params":["0x0","latest"]}]"#)
                .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].method, "eth_blockNumber");
        assert!(batch[0].params.is_empty());
        assert_eq!(batch[1].params, vec![json!("0x0"), json!("latest")]);
    }
}
