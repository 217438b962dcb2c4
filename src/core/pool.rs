/// Endpoint pool: one writer plus an ordered list of readers
use crate::config::EndpointConfig;
use crate::core::{Endpoint, EndpointRole};
use crate::error::ConfigError;
use std::collections::HashSet;
use std::sync::Arc;

/// Shared set of endpoints the router selects from.
///
/// Built once from configuration and replaced wholesale on reconfiguration.
#[derive(Debug)]
pub struct EndpointPool {
    writer: Arc<Endpoint>,
    readers: Vec<Arc<Endpoint>>,
}

impl EndpointPool {
    pub fn new(writer: Arc<Endpoint>, readers: Vec<Arc<Endpoint>>) -> Result<Self, ConfigError> {
        if writer.role != EndpointRole::Writer {
            return Err(ConfigError::ValidationError(format!(
                "endpoint {} is not a writer",
                writer.id
            )));
        }

        let mut ids = HashSet::new();
        ids.insert(writer.id.clone());
        for reader in &readers {
            if reader.role != EndpointRole::Reader {
                return Err(ConfigError::ValidationError(format!(
                    "endpoint {} is not a reader",
                    reader.id
                )));
            }
            if !ids.insert(reader.id.clone()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate endpoint id: {}",
                    reader.id
                )));
            }
        }

        Ok(Self { writer, readers })
    }

    /// Build the pool from configured endpoints. Exactly one writer is required.
    pub fn from_config(endpoints: &[EndpointConfig]) -> Result<Self, ConfigError> {
        let mut writer = None;
        let mut readers = Vec::new();

        for config in endpoints {
            let addr = config.address.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "Invalid address for endpoint {}: {}",
                    config.id, config.address
                ))
            })?;
            let endpoint = Arc::new(Endpoint::new(
                config.id.clone(),
                addr,
                config.role,
                config.pool_size,
            ));

            match config.role {
                EndpointRole::Writer if writer.is_some() => {
                    return Err(ConfigError::ValidationError(
                        "exactly one writer endpoint is required".to_string(),
                    ));
                }
                EndpointRole::Writer => writer = Some(endpoint),
                EndpointRole::Reader => readers.push(endpoint),
            }
        }

        let writer = writer.ok_or_else(|| {
            ConfigError::ValidationError("exactly one writer endpoint is required".to_string())
        })?;

        Self::new(writer, readers)
    }

    pub fn writer(&self) -> &Arc<Endpoint> {
        &self.writer
    }

    pub fn readers(&self) -> &[Arc<Endpoint>] {
        &self.readers
    }

    /// Writer first, then readers in configured order
    pub fn all(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        std::iter::once(&self.writer).chain(self.readers.iter())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Endpoint>> {
        self.all().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        1 + self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
