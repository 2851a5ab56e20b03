//! High-level entity operations against the InterLex registry.
//!
//! Everything here is idempotent by reconciliation: adds that hit an
//! existing record resolve to that record instead of failing, edits merge
//! into the current remote state, and deletes of absent facts are no-ops.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{InterlexError, Result, ValidationError};
use crate::ids;
use crate::normalize::{self, SynonymInput};
use crate::reconcile;
use crate::session::{Session, SessionConfig, Transport};
use crate::types::{AnnotationRecord, EntityKind, EntityRecord, RelationshipRecord, Superclass};

/// The InterLex term that marks an entity deprecated.
const DEPRECATED_ANNOTATION_ILX: &str = "ilx_0383241";

const ENV_API_KEY: &str = "INTERLEX_API_KEY";

/// A new entity to register.
#[derive(Debug, Clone)]
pub struct AddEntity {
    pub label: String,
    pub kind: EntityKind,
    pub definition: Option<String>,
    pub comment: Option<String>,
    /// ILX reference of the parent entity, in any accepted spelling.
    pub superclass: Option<String>,
    pub synonyms: Vec<SynonymInput>,
    /// Raw existing-id objects; validated and ranked before submission.
    pub existing_ids: Vec<Value>,
    /// Community id to file the entity under.
    pub cid: Option<String>,
}

impl AddEntity {
    pub fn new(label: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            label: label.into(),
            kind,
            definition: None,
            comment: None,
            superclass: None,
            synonyms: Vec::new(),
            existing_ids: Vec::new(),
            cid: None,
        }
    }
}

/// Result of an add: the authoritative server record plus whether the
/// registry already had it.
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub entity: EntityRecord,
    pub already_existed: bool,
}

/// An edit against an existing entity. Scalar fields overwrite when set;
/// list fields reconcile against the current remote state.
#[derive(Debug, Clone, Default)]
pub struct UpdateEntity {
    pub ilx_id: String,
    pub label: Option<String>,
    pub kind: Option<EntityKind>,
    pub definition: Option<String>,
    pub comment: Option<String>,
    pub superclass: Option<String>,
    pub cid: Option<String>,
    pub status: Option<String>,
    pub add_synonyms: Vec<SynonymInput>,
    pub delete_synonyms: Vec<SynonymInput>,
    pub add_existing_ids: Vec<Value>,
    pub delete_existing_ids: Vec<Value>,
}

impl UpdateEntity {
    pub fn new(ilx_id: impl Into<String>) -> Self {
        Self {
            ilx_id: ilx_id.into(),
            ..Self::default()
        }
    }
}

/// Fill-in-the-blanks edit keyed by an external curie: scalar fields only
/// land where the remote record is empty, list fields merge additively.
#[derive(Debug, Clone, Default)]
pub struct PartialUpdate {
    pub curie: String,
    pub definition: Option<String>,
    pub comment: Option<String>,
    pub superclass: Option<String>,
    pub synonyms: Vec<SynonymInput>,
    pub existing_ids: Vec<Value>,
}

impl PartialUpdate {
    pub fn new(curie: impl Into<String>) -> Self {
        Self {
            curie: curie.into(),
            ..Self::default()
        }
    }
}

/// A full-text search request.
#[derive(Debug, Clone)]
pub enum ElasticSearch {
    /// Raw term query string, passed through unchanged.
    Term(String),
    /// Label lookup: fuzzy (fuzziness 1) OR'd with an exact match boosted
    /// 100x, over the lowercased trimmed label.
    Label(String),
    /// Caller-supplied inner Elasticsearch query object: the value the
    /// search body would put under its top-level `query` key (for example
    /// `{"bool": {...}}`), not the wrapper itself.
    Raw(Value),
}

/// Authenticated client over one registry session. Validates the API key
/// at construction and remembers the caller's user id for ownership checks.
pub struct InterlexClient {
    session: Session,
    user_id: String,
}

impl std::fmt::Debug for InterlexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterlexClient")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl InterlexClient {
    pub async fn connect(key: impl Into<String>, config: SessionConfig) -> Result<Self> {
        let session = Session::new(key, config)?;
        Self::from_session(session).await
    }

    /// Construct over an explicit transport (the test seam).
    pub async fn connect_with_transport(
        key: impl Into<String>,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let session = Session::with_transport(key, config, transport)?;
        Self::from_session(session).await
    }

    /// Read the API key from `INTERLEX_API_KEY` and connect with defaults.
    pub async fn from_env() -> Result<Self> {
        let key = std::env::var(ENV_API_KEY).map_err(|_| ValidationError::NoApiKey)?;
        Self::connect(key, SessionConfig::default()).await
    }

    async fn from_session(session: Session) -> Result<Self> {
        let user_id = session.validate_key().await?;
        debug!(user_id, "api key validated");
        Ok(Self { session, user_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Fetch an entity by any accepted ILX reference spelling. `role` names
    /// the caller argument for the not-found message.
    pub async fn get_entity(&self, reference: &str, role: &str) -> Result<EntityRecord> {
        let fragment = ids::to_fragment(reference).map_err(InterlexError::from)?;
        let response = self
            .session
            .get(&format!("ilx/search/identifier/{fragment}"), None)
            .await?;
        let data = response.into_data();
        if data.get("id").map_or(true, Value::is_null) {
            return Err(InterlexError::EntityNotFound {
                role: role.to_string(),
                reference: fragment,
            });
        }
        Ok(serde_json::from_value(data)?)
    }

    /// Fetch an entity by one of its external curies.
    pub async fn get_entity_from_curie(&self, curie: &str) -> Result<EntityRecord> {
        let response = self.session.get(&format!("term/curie/{curie}"), None).await?;
        let data = response.into_data();
        if data.get("id").map_or(true, Value::is_null) {
            return Err(InterlexError::EntityNotFound {
                role: "curie".to_string(),
                reference: curie.to_string(),
            });
        }
        Ok(serde_json::from_value(data)?)
    }

    /// Register a new entity. If the registry already has a matching record
    /// the existing one is returned with `already_existed` set.
    pub async fn add_entity(&self, request: AddEntity) -> Result<AddOutcome> {
        if request.label.trim().is_empty() {
            return Err(ValidationError::EmptyLabel.into());
        }
        let synonyms = normalize::normalize_synonyms(&request.synonyms)?;
        let existing_ids = reconcile::rank_existing_ids(
            normalize::normalize_existing_ids(&request.existing_ids)?,
            None,
        );
        let superclasses = match request.superclass.as_deref() {
            Some(reference) => {
                // verify the parent resolves before submitting
                self.resolve_superclass(reference).await?;
                normalize::normalize_superclass(reference)?
            }
            None => Vec::new(),
        };
        let mut payload = json!({
            "label": request.label,
            "type": request.kind,
            "definition": request.definition.unwrap_or_default(),
            "comment": request.comment.unwrap_or_default(),
            "superclasses": superclasses,
            "synonyms": synonyms,
            "existing_ids": existing_ids,
        });
        if let Some(cid) = request.cid {
            payload["cid"] = Value::String(cid);
        }
        let response = match self.session.post("term/add-simplified", Some(payload)).await {
            Ok(response) => response,
            Err(InterlexError::ServerRejected { message, .. })
                if message.to_lowercase().contains("already exists") =>
            {
                let entity = self.find_own_entity(&request.label).await?;
                warn!(label = %request.label, ilx = %entity.ilx, "entity already exists");
                return Ok(AddOutcome {
                    entity,
                    already_existed: true,
                });
            }
            Err(other) => return Err(other),
        };
        // a 200 echo instead of 201 means the registry deduplicated the add
        let already_existed = response.status == 200;
        let entity: EntityRecord = serde_json::from_value(response.into_data())?;
        if already_existed {
            warn!(label = %entity.label, ilx = %entity.ilx, "entity already exists");
        }
        Ok(AddOutcome {
            entity,
            already_existed,
        })
    }

    /// Edit an existing entity: fetch, reconcile the edit into the current
    /// record, submit the whole record back.
    pub async fn update_entity(&self, update: UpdateEntity) -> Result<EntityRecord> {
        let mut entity = self.get_entity(&update.ilx_id, "ilx_id").await?;
        if let Some(label) = update.label {
            entity.label = label;
        }
        if let Some(kind) = update.kind {
            entity.kind = kind;
        }
        if update.definition.is_some() {
            entity.definition = update.definition;
        }
        if update.comment.is_some() {
            entity.comment = update.comment;
        }
        if update.cid.is_some() {
            entity.cid = update.cid;
        }
        if update.status.is_some() {
            entity.status = update.status;
        }
        // the edit endpoint wants only the parent's row id back
        entity.superclasses = match update.superclass.as_deref() {
            Some(reference) => {
                let parent = self.resolve_superclass(reference).await?;
                vec![Superclass {
                    superclass_tid: parent.id.clone(),
                    ..Superclass::default()
                }]
            }
            None => match entity.superclasses.first() {
                Some(first) => vec![Superclass {
                    superclass_tid: first.id.clone(),
                    ..Superclass::default()
                }],
                None => Vec::new(),
            },
        };
        if !update.add_synonyms.is_empty() {
            let new = normalize::normalize_synonyms(&update.add_synonyms)?;
            entity.synonyms =
                reconcile::merge_records(entity.synonyms, new, &["literal"], &["type"], false);
        }
        if !update.delete_synonyms.is_empty() {
            let doomed = normalize::normalize_synonyms(&update.delete_synonyms)?;
            entity.synonyms =
                reconcile::remove_records(entity.synonyms, &doomed, &["literal", "type"]);
        }
        if !update.add_existing_ids.is_empty() {
            let new = normalize::normalize_existing_ids(&update.add_existing_ids)?;
            entity.existing_ids =
                reconcile::merge_records(entity.existing_ids, new, &["curie", "iri"], &[], false);
        }
        if !update.delete_existing_ids.is_empty() {
            let doomed = normalize::normalize_existing_ids(&update.delete_existing_ids)?;
            entity.existing_ids =
                reconcile::remove_records(entity.existing_ids, &doomed, &["curie", "iri"]);
        }
        entity.existing_ids =
            reconcile::rank_existing_ids(std::mem::take(&mut entity.existing_ids), None);
        let id = entity.id.clone().ok_or_else(|| {
            InterlexError::UnexpectedResponse(format!("{} record has no id", entity.ilx))
        })?;
        let payload = serde_json::to_value(&entity)?;
        let response = self
            .session
            .post(&format!("term/edit/{id}"), Some(payload))
            .await?;
        Ok(serde_json::from_value(response.into_data())?)
    }

    /// Fill empty fields of the entity behind an external curie. Fields the
    /// remote record already has keep their remote values.
    pub async fn partial_update(&self, partial: PartialUpdate) -> Result<EntityRecord> {
        let entity = self.get_entity_from_curie(&partial.curie).await?;
        let mut update = UpdateEntity::new(&entity.ilx);
        update.definition = partial
            .definition
            .filter(|_| entity.definition.as_deref().map_or(true, |d| d.trim().is_empty()));
        update.comment = partial
            .comment
            .filter(|_| entity.comment.as_deref().map_or(true, |c| c.trim().is_empty()));
        update.superclass = partial.superclass.filter(|_| entity.superclasses.is_empty());
        update.add_synonyms = partial.synonyms;
        update.add_existing_ids = partial.existing_ids;
        self.update_entity(update).await
    }

    /// Mark an entity deprecated: attach the deprecation annotation, then
    /// drop its status to -2.
    pub async fn deprecate_entity(&self, ilx_id: &str) -> Result<EntityRecord> {
        let marker = self
            .get_entity(DEPRECATED_ANNOTATION_ILX, "deprecated annotation")
            .await?;
        if !marker.label.eq_ignore_ascii_case("deprecated")
            || marker.kind != EntityKind::Annotation
        {
            return Err(InterlexError::UnexpectedResponse(format!(
                "{DEPRECATED_ANNOTATION_ILX} is not the deprecated annotation (label {:?}, type {:?})",
                marker.label, marker.kind
            )));
        }
        self.add_annotation(ilx_id, DEPRECATED_ANNOTATION_ILX, "True")
            .await?;
        let mut update = UpdateEntity::new(ilx_id);
        update.status = Some("-2".to_string());
        self.update_entity(update).await
    }

    pub async fn get_annotations(&self, term_ilx_id: &str) -> Result<Vec<AnnotationRecord>> {
        let entity = self.get_entity(term_ilx_id, "term_ilx_id").await?;
        let tid = require_id(&entity)?;
        let response = self
            .session
            .get(&format!("term/get-annotations/{tid}"), None)
            .await?;
        Ok(serde_json::from_value(response.into_data())?)
    }

    /// Attach an annotation fact to a term. Re-adding an identical fact
    /// resolves to the existing record.
    pub async fn add_annotation(
        &self,
        term_ilx_id: &str,
        annotation_type_ilx_id: &str,
        value: &str,
    ) -> Result<AnnotationRecord> {
        let entity = self.get_entity(term_ilx_id, "term_ilx_id").await?;
        let annotation = self
            .get_entity(annotation_type_ilx_id, "annotation_type_ilx_id")
            .await?;
        let payload = json!({
            "tid": require_id(&entity)?,
            "annotation_tid": require_id(&annotation)?,
            "value": value,
            "term_version": entity.version.clone().unwrap_or_default(),
            "annotation_term_version": annotation.version.clone().unwrap_or_default(),
            "orig_uid": self.user_id,
        });
        match self.session.post("term/add-annotation", Some(payload)).await {
            Ok(response) => Ok(serde_json::from_value(response.into_data())?),
            Err(InterlexError::ServerRejected { message, .. })
                if message.to_lowercase().contains("already exists") =>
            {
                let annotation_tid = require_id(&annotation)?;
                let existing = self
                    .get_annotations(term_ilx_id)
                    .await?
                    .into_iter()
                    .find(|record| {
                        record.annotation_tid.as_deref() == Some(annotation_tid.as_str())
                            && record.value == value
                    });
                match existing {
                    Some(record) => {
                        warn!(
                            term = term_ilx_id,
                            annotation = annotation_type_ilx_id,
                            value,
                            "annotation already exists"
                        );
                        Ok(record)
                    }
                    None => Err(InterlexError::AlreadyExists(format!(
                        "annotation {annotation_type_ilx_id}={value} on {term_ilx_id}"
                    ))),
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Remove an annotation fact. Absent facts are a logged no-op.
    pub async fn delete_annotation(
        &self,
        term_ilx_id: &str,
        annotation_type_ilx_id: &str,
        value: &str,
    ) -> Result<Option<AnnotationRecord>> {
        let annotation = self
            .get_entity(annotation_type_ilx_id, "annotation_type_ilx_id")
            .await?;
        let annotation_tid = require_id(&annotation)?;
        let target = self
            .get_annotations(term_ilx_id)
            .await?
            .into_iter()
            .find(|record| {
                record.annotation_tid.as_deref() == Some(annotation_tid.as_str())
                    && record.value == value
            });
        let Some(target) = target else {
            warn!(
                term = term_ilx_id,
                annotation = annotation_type_ilx_id,
                value,
                "annotation not found, nothing to delete"
            );
            return Ok(None);
        };
        let id = target.id.clone().ok_or_else(|| {
            InterlexError::UnexpectedResponse("annotation record has no id".to_string())
        })?;
        // the registry treats an all-blank annotation row as deleted
        let payload = json!({
            "tid": " ",
            "annotation_tid": " ",
            "value": " ",
            "term_version": " ",
            "annotation_term_version": " ",
        });
        let response = self
            .session
            .post(&format!("term/edit-annotation/{id}"), Some(payload))
            .await?;
        Ok(Some(serde_json::from_value(response.into_data())?))
    }

    pub async fn get_relationships(&self, term_ilx_id: &str) -> Result<Vec<RelationshipRecord>> {
        let entity = self.get_entity(term_ilx_id, "term_ilx_id").await?;
        let tid = require_id(&entity)?;
        let response = self
            .session
            .get(&format!("term/get-relationships/{tid}"), None)
            .await?;
        Ok(serde_json::from_value(response.into_data())?)
    }

    /// Link two entities through a relationship term. Re-adding an existing
    /// triple resolves to the existing record.
    pub async fn add_relationship(
        &self,
        entity1_ilx: &str,
        relationship_ilx: &str,
        entity2_ilx: &str,
    ) -> Result<RelationshipRecord> {
        let entity1 = self.get_entity(entity1_ilx, "entity1_ilx").await?;
        let relationship = self.get_entity(relationship_ilx, "relationship_ilx").await?;
        let entity2 = self.get_entity(entity2_ilx, "entity2_ilx").await?;
        let payload = json!({
            "term1_id": require_id(&entity1)?,
            "relationship_tid": require_id(&relationship)?,
            "term2_id": require_id(&entity2)?,
            "term1_version": entity1.version.clone().unwrap_or_default(),
            "term2_version": entity2.version.clone().unwrap_or_default(),
            "relationship_term_version": relationship.version.clone().unwrap_or_default(),
            "orig_uid": self.user_id,
        });
        match self
            .session
            .post("term/add-relationship", Some(payload))
            .await
        {
            Ok(response) => Ok(serde_json::from_value(response.into_data())?),
            Err(InterlexError::ServerRejected { message, .. })
                if message.to_lowercase().contains("already exists") =>
            {
                let relationship_tid = require_id(&relationship)?;
                let term2_id = require_id(&entity2)?;
                let existing = self
                    .get_relationships(entity1_ilx)
                    .await?
                    .into_iter()
                    .find(|record| {
                        record.relationship_tid.as_deref() == Some(relationship_tid.as_str())
                            && record.term2_id.as_deref() == Some(term2_id.as_str())
                    });
                match existing {
                    Some(record) => {
                        warn!(
                            entity1 = entity1_ilx,
                            relationship = relationship_ilx,
                            entity2 = entity2_ilx,
                            "relationship already exists"
                        );
                        Ok(record)
                    }
                    None => Err(InterlexError::AlreadyExists(format!(
                        "relationship {entity1_ilx} {relationship_ilx} {entity2_ilx}"
                    ))),
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Remove a relationship triple. Absent triples are a logged no-op.
    pub async fn delete_relationship(
        &self,
        entity1_ilx: &str,
        relationship_ilx: &str,
        entity2_ilx: &str,
    ) -> Result<Option<RelationshipRecord>> {
        let entity1 = self.get_entity(entity1_ilx, "entity1_ilx").await?;
        let relationship = self.get_entity(relationship_ilx, "relationship_ilx").await?;
        let entity2 = self.get_entity(entity2_ilx, "entity2_ilx").await?;
        let term1_id = require_id(&entity1)?;
        let relationship_tid = require_id(&relationship)?;
        let term2_id = require_id(&entity2)?;
        let target = self
            .get_relationships(entity1_ilx)
            .await?
            .into_iter()
            .find(|record| {
                record.term1_id.as_deref() == Some(term1_id.as_str())
                    && record.relationship_tid.as_deref() == Some(relationship_tid.as_str())
                    && record.term2_id.as_deref() == Some(term2_id.as_str())
            });
        let Some(target) = target else {
            warn!(
                entity1 = entity1_ilx,
                relationship = relationship_ilx,
                entity2 = entity2_ilx,
                "relationship not found, nothing to delete"
            );
            return Ok(None);
        };
        let id = target.id.clone().ok_or_else(|| {
            InterlexError::UnexpectedResponse("relationship record has no id".to_string())
        })?;
        // ids go blank, versions stay real so the edit passes the
        // server's concurrency check
        let payload = json!({
            "term1_id": " ",
            "relationship_tid": " ",
            "term2_id": " ",
            "term1_version": entity1.version.clone().unwrap_or_default(),
            "term2_version": entity2.version.clone().unwrap_or_default(),
            "relationship_term_version": relationship.version.clone().unwrap_or_default(),
        });
        let response = self
            .session
            .post(&format!("term/edit-relationship/{id}"), Some(payload))
            .await?;
        Ok(Some(serde_json::from_value(response.into_data())?))
    }

    /// Full-text search through the registry's Elasticsearch index.
    pub async fn query_elastic(
        &self,
        query: ElasticSearch,
        size: usize,
        from: usize,
    ) -> Result<Vec<EntityRecord>> {
        let mut params = json!({
            "size": size.to_string(),
            "from": from.to_string(),
        });
        match query {
            ElasticSearch::Term(term) => {
                params["term"] = Value::String(term);
            }
            ElasticSearch::Label(label) => {
                let label = label.trim().to_lowercase();
                // the query param carries the inner query object only, not
                // a {"query": ...} wrapper
                let query = json!({
                    "bool": {
                        "should": [
                            {"fuzzy": {"label": {"value": label, "fuzziness": 1}}},
                            {"match": {"label": {"query": label, "boost": 100}}},
                        ]
                    }
                });
                params["query"] = Value::String(serde_json::to_string(&query)?);
            }
            ElasticSearch::Raw(query) => {
                params["query"] = Value::String(serde_json::to_string(&query)?);
            }
        }
        let response = self
            .session
            .get("term/elastic/search", Some(params))
            .await?;
        let data = response.into_data();
        let hits = data
            .get("hits")
            .and_then(|hits| hits.get("hits"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut entities = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(source) = hit.get("_source") {
                entities.push(serde_json::from_value(source.clone())?);
            }
        }
        Ok(entities)
    }

    async fn resolve_superclass(&self, reference: &str) -> Result<EntityRecord> {
        self.get_entity(reference, "superclass")
            .await
            .map_err(|err| match err {
                InterlexError::EntityNotFound { reference, .. } => {
                    InterlexError::SuperclassNotFound { reference }
                }
                other => other,
            })
    }

    /// Find the caller's own record for a label after a duplicate
    /// rejection: the label listing includes other users' records, so
    /// filter by owner and exact (case-insensitive) label.
    async fn find_own_entity(&self, label: &str) -> Result<EntityRecord> {
        let response = self.session.get(&format!("term/{label}"), None).await?;
        let records: Vec<EntityRecord> = match response.into_data() {
            Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<std::result::Result<_, _>>()?,
            Value::Object(map) => vec![serde_json::from_value(Value::Object(map))?],
            _ => Vec::new(),
        };
        let own = records.into_iter().find(|record| {
            record.uid.as_deref() == Some(self.user_id.as_str())
                && record.label.eq_ignore_ascii_case(label)
        });
        match own {
            Some(record) => self.get_entity(&record.ilx, "entity").await,
            None => Err(InterlexError::AlreadyExists(format!(
                "label {label:?} exists but none of the records belong to this user"
            ))),
        }
    }
}

fn require_id(entity: &EntityRecord) -> Result<String> {
    entity.id.clone().ok_or_else(|| {
        InterlexError::UnexpectedResponse(format!("{} record has no id", entity.ilx))
    })
}
