//! # Survey targeting
//!
//! Decides, for every page view, whether a survey may render for the current
//! visitor, and explains the decision to operators.
//!
//! ## Core Concepts
//!
//! - **Trigger**: an inclusion condition attached to a survey; with `excluded`
//!   set it becomes a suppresser
//! - **VisitorContext**: the signals known about the request (URL, device,
//!   geo, device data, page events)
//! - **TriState**: evaluation outcome; `Indeterminate` when the context
//!   cannot decide
//! - **TargetingEngine**: folds survey checks and trigger terms into a render
//!   decision, or a `DiagnosticReport` listing every condition
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use survey_targeting::{
//!     AccountId, EngineConfig, InMemoryStores, Survey, SurveyId, SurveyStatus, TargetingEngine,
//!     Trigger, VisitorContext,
//! };
//!
//! let stores = Arc::new(InMemoryStores::new());
//! let survey = Survey::new(SurveyId::new(1), AccountId::new(1), "Pricing feedback")
//!     .with_status(SurveyStatus::Live);
//! stores.insert_survey(survey).unwrap();
//! stores
//!     .add_trigger(SurveyId::new(1), Trigger::url_contains("/pricing").unwrap())
//!     .unwrap();
//!
//! let engine = TargetingEngine::in_memory(stores, EngineConfig::default());
//! let ctx = VisitorContext::new().with_url("https://site.com/pricing?ref=ad");
//! assert!(engine.decide(SurveyId::new(1), &ctx));
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod survey;
pub mod time;
pub mod value;

// Triggers and evaluation
pub mod context;
pub mod evaluate;
pub mod trigger;

// Per-device state
pub mod history;
pub mod state;
pub mod storage;

// Decision and diagnostics
pub mod config;
pub mod engine;

// Re-export primary types at crate root for convenience
pub use config::{DomQueryPolicy, EngineConfig};
pub use context::{DomObservation, DomProbe, DomQuery, GeoLocation, VisitorContext};
pub use engine::{
    combinator_term, CancellationToken, ConditionReport, ConditionRole, DiagnosticReport, TargetingEngine,
};
pub use error::{ExecutionError, TargetingError, TargetingResult, ValidationError};
pub use evaluate::{evaluate, evaluate_kind, EvaluationResult, TriState};
pub use history::DeviceHistory;
pub use state::{FrequencyCapState, RefireState};
pub use storage::{
    AnalyticsStore, DeviceHistoryStore, ImpressionLog, InMemoryStores, StorageError, SurveyRepository,
    TriggerRepository,
};
pub use survey::{
    AccountId, CapScope, DeviceId, DeviceTargeting, DeviceType, FrequencyCapConfig, PossibleAnswerId, Survey,
    SurveyId, SurveyStatus, TriggerId,
};
pub use time::{Interval, Schedule, TimeUnit};
pub use trigger::{DeviceDataMatcher, Trigger, TriggerKind, TriggerRecord, VisitorType};
pub use value::DeviceValue;
