use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use offer_engine::config::{IntegrationConfig, StorageConfig};
use offer_engine::error::AppError;
use offer_engine::workflows::offers::{
    AuditEntry, ContractGateway, ContractPayload, EngineConfig, HttpContractGateway,
    IntegrationError, JsonFileRecordStore, MemoryRecordStore, OfferError,
    OfferTransactionService, RecordKind, RecordStore, StoreError, TransactionSpaceId,
    UnconfiguredGateway,
};
use serde_json::Value;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiService = OfferTransactionService<EngineStore, EngineGateway>;

/// Record store picked at startup from `OFFER_DATA_DIR`.
pub(crate) enum EngineStore {
    Memory(MemoryRecordStore),
    File(JsonFileRecordStore),
}

impl EngineStore {
    pub(crate) fn from_config(storage: &StorageConfig) -> Result<Self, StoreError> {
        match &storage.data_dir {
            Some(dir) => {
                let store = JsonFileRecordStore::open(dir.clone())?;
                info!(data_dir = %dir.display(), "using json file record store");
                Ok(Self::File(store))
            }
            None => {
                warn!("OFFER_DATA_DIR not set; records are kept in memory only");
                Ok(Self::Memory(MemoryRecordStore::new()))
            }
        }
    }

    pub(crate) fn is_persistent(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl RecordStore for EngineStore {
    fn get_raw(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError> {
        match self {
            Self::Memory(store) => store.get_raw(kind, id),
            Self::File(store) => store.get_raw(kind, id),
        }
    }

    fn list_raw(&self, kind: RecordKind) -> Result<Vec<Value>, StoreError> {
        match self {
            Self::Memory(store) => store.list_raw(kind),
            Self::File(store) => store.list_raw(kind),
        }
    }

    fn upsert_raw(&self, kind: RecordKind, id: &str, record: Value) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.upsert_raw(kind, id, record),
            Self::File(store) => store.upsert_raw(kind, id, record),
        }
    }
}

/// Contract system client picked from `CONTRACT_PUSH_URL`.
pub(crate) enum EngineGateway {
    Http(HttpContractGateway),
    Unconfigured(UnconfiguredGateway),
}

impl EngineGateway {
    pub(crate) fn from_config(integration: &IntegrationConfig) -> Result<Self, IntegrationError> {
        match &integration.push_url {
            Some(url) => {
                let gateway = HttpContractGateway::new(
                    url.clone(),
                    integration.push_token.clone(),
                    integration.push_timeout,
                )?;
                info!(endpoint = %url, "contract pushes go to the configured endpoint");
                Ok(Self::Http(gateway))
            }
            None => {
                warn!("CONTRACT_PUSH_URL not set; accepted contracts stay pending");
                Ok(Self::Unconfigured(UnconfiguredGateway))
            }
        }
    }
}

#[async_trait]
impl ContractGateway for EngineGateway {
    async fn push_contract(
        &self,
        payload: &ContractPayload,
    ) -> Result<TransactionSpaceId, IntegrationError> {
        match self {
            Self::Http(gateway) => gateway.push_contract(payload).await,
            Self::Unconfigured(gateway) => gateway.push_contract(payload).await,
        }
    }
}

pub(crate) fn engine_config(integration: &IntegrationConfig) -> EngineConfig {
    EngineConfig {
        push_timeout: integration.push_timeout,
        retry: integration.retry_policy(),
        ..EngineConfig::default()
    }
}

pub(crate) fn build_service(
    storage: &StorageConfig,
    integration: &IntegrationConfig,
) -> Result<Arc<ApiService>, AppError> {
    let store = EngineStore::from_config(storage)?;
    let gateway = EngineGateway::from_config(integration)
        .map_err(|err| AppError::Workflow(OfferError::from(err)))?;
    let service = OfferTransactionService::new(
        Arc::new(store),
        Arc::new(gateway),
        engine_config(integration),
    )?;
    Ok(Arc::new(service))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ExportFormat {
    Csv,
    Json,
}

const CSV_HEADER: [&str; 9] = [
    "audit_id",
    "created_at",
    "actor_user_id",
    "actor_role",
    "action",
    "entity_type",
    "entity_id",
    "ip_address",
    "metadata",
];

/// Writes audit entries in total order; metadata is embedded as compact JSON.
pub(crate) fn write_audit_export<W: Write>(
    entries: &[AuditEntry],
    format: ExportFormat,
    writer: W,
) -> Result<(), AppError> {
    match format {
        ExportFormat::Json => serde_json::to_writer_pretty(writer, entries)
            .map_err(|err| AppError::Export(err.to_string())),
        ExportFormat::Csv => {
            let mut out = csv::Writer::from_writer(writer);
            out.write_record(CSV_HEADER)
                .map_err(|err| AppError::Export(err.to_string()))?;
            for entry in entries {
                let created_at = entry.created_at.to_rfc3339();
                let metadata = entry.metadata.to_string();
                out.write_record([
                    entry.audit_id.as_str(),
                    created_at.as_str(),
                    entry.actor_user_id.as_str(),
                    entry.actor_role.label(),
                    entry.action.as_str(),
                    entry.entity_type.label(),
                    entry.entity_id.as_str(),
                    entry.ip_address.as_str(),
                    metadata.as_str(),
                ])
                .map_err(|err| AppError::Export(err.to_string()))?;
            }
            out.flush()?;
            Ok(())
        }
    }
}
