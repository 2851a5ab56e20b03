//! Client for the InterLex ontology-term registry (the SciCrunch API).
//!
//! InterLex assigns every entity a stable `ilx_`-prefixed fragment and
//! tracks the external identifiers (curies and IRIs) the entity is known by
//! elsewhere. This crate covers the write path and the lookups it needs:
//! registering entities, reconciling edits against the current remote
//! state, annotation and relationship facts, and full-text search.
//!
//! ```no_run
//! use interlex_client::{AddEntity, EntityKind, InterlexClient, SessionConfig};
//!
//! # async fn run() -> interlex_client::Result<()> {
//! let client = InterlexClient::connect("my-api-key", SessionConfig::default()).await?;
//! let mut request = AddEntity::new("brain", EntityKind::Term);
//! request.definition = Some("The part of the CNS inside the cranium".to_string());
//! let outcome = client.add_entity(request).await?;
//! println!("{} (existed: {})", outcome.entity.ilx, outcome.already_existed);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod ids;
pub mod normalize;
pub mod reconcile;
pub mod session;
pub mod types;

pub use client::{
    AddEntity, AddOutcome, ElasticSearch, InterlexClient, PartialUpdate, UpdateEntity,
};
pub use error::{InterlexError, Result, ValidationError};
pub use normalize::SynonymInput;
pub use session::{
    ApiResponse, HttpTransport, Method, Session, SessionConfig, Transport, TransportFailure,
    WireRequest, WireResponse, DEFAULT_BASE_URL,
};
pub use types::{
    AnnotationRecord, EntityKind, EntityRecord, ExistingId, RelationshipRecord, Superclass, Synonym,
};
