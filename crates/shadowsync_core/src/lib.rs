//! Shadow-label convergence engine.
//! Keeps one derived label per qualifying record in sync with that record
//! across create, update, membership-change, trash and delete events.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ConfigError, SubscriptionConfig, SyncConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::conditions::{ConditionClause, ConditionOperator, ConditionSpecError, Conditions};
pub use model::label::{slugify, LabelId, ShadowLabel};
pub use model::record::{Record, RecordId, RecordStatus};
pub use repo::label_store::{LabelClaim, LabelStore, SqliteLabelStore};
pub use repo::record_store::{RecordStore, SqliteRecordStore};
pub use repo::{StoreError, StoreResult};
pub use service::dispatcher::{
    EventDispatcher, EventReport, ResyncSummary, Subscription, SubscriptionError,
    SubscriptionHandle,
};
pub use service::query_service::ShadowQueryService;
pub use sync::collector::{GarbageCollector, RetractOutcome};
pub use sync::convergence::{is_converged, ConvergenceEngine, ConvergenceOutcome, FreezeReason};
pub use sync::predicate::{qualifies, ClauseEvaluator, MembershipClause, PredicateEvaluator};
pub use sync::reference_index::ReferenceIndex;
pub use sync::resolver::{mirrored_slug, LabelResolver, Resolution};
pub use sync::{SyncError, SyncResult};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
