//! Offer transaction engine: competing purchase offers on a listing, from
//! submission through review, scoring and the seller's authorized decision.
//!
//! Every state change is checked against the lifecycle table, committed under
//! per-offer locks, and followed by exactly one append-only audit entry.

pub mod audit;
pub mod authorization;
pub mod clock;
pub mod decision;
pub mod domain;
pub mod errors;
pub mod file_store;
pub(crate) mod ids;
pub mod integration;
pub mod lifecycle;
pub(crate) mod locks;
pub mod router;
pub mod scoring;
pub mod service;
pub mod store;
pub mod validation;

#[cfg(test)]
mod tests;

pub use audit::{AuditEntry, AuditQuery, EntityType};
pub use authorization::{Consents, ESignInput, ESignature, SellerAuthorization};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{
    CounterTerms, DecisionCommand, DecisionPayload, DecisionReceipt, DecisionRequest,
    DeclineReason, SellerDecision,
};
pub use domain::{
    Actor, ActorRole, Contingencies, Document, DocumentKind, DocumentUpload, Escalation,
    FinancingType, ListingAgent, NewProperty, Offer, OfferId, OfferRevision, OfferSubmission,
    OfferTerms, OfferVersion, Property, PropertyId, RequestContext, VersionId,
};
pub use errors::OfferError;
pub use file_store::JsonFileRecordStore;
pub use integration::{
    ContractGateway, ContractPayload, ContractPush, HttpContractGateway, IntegrationError,
    IntegrationStatus, PushStatus, RetryPolicy, TransactionSpaceId, UnconfiguredGateway,
};
pub use lifecycle::{next_status, replay_audit_path, OfferEvent, OfferStatus};
pub use router::offer_router;
pub use scoring::{
    compute_score, Criterion, CriterionValues, OfferScore, RankedOffer, ScoreRequest,
    ScoringEngine, ScoringRubric,
};
pub use service::{
    EngineConfig, OfferStatusView, OfferTransactionService, RetrySummary, TransitionRequest,
};
pub use store::{MemoryRecordStore, Record, RecordKind, RecordStore, RecordStoreExt, StoreError};
pub use validation::ValidationError;
