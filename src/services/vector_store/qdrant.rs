//! Qdrant backend for [`RetrievalIndex`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CollectionInfo, Condition, CountPointsBuilder, CreateCollectionBuilder, DatetimeRange, DeletePointsBuilder,
    Distance, Filter, ListValue, PointStruct, PointsIdsList, Range, SearchPointsBuilder, Struct,
    Timestamp, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use serde_json::{Map, Value};

use super::RetrievalIndex;
use crate::error::IndexError;
use crate::models::{Document, FieldCondition, PayloadFilter, Predicate, QdrantConfig, SearchResult};

const PAYLOAD_DOC_ID: &str = "docId";
const PAYLOAD_CONTENT: &str = "content";
const PAYLOAD_METADATA: &str = "metadata";

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// The client connects lazily; building it does not touch the network.
    pub fn new(config: &QdrantConfig, timeout: Duration) -> Result<Self, IndexError> {
        reqwest::Url::parse(&config.url)
            .map_err(|e| IndexError::new("connect", format!("invalid url {}: {e}", config.url)))?;

        let mut builder = Qdrant::from_url(&config.url).timeout(timeout);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| IndexError::new("connect", e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection_name.clone(),
        })
    }
}

#[async_trait]
impl RetrievalIndex for QdrantIndex {
    async fn initialize(&self, vector_size: u64, recreate: bool) -> Result<(), IndexError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| IndexError::new("initialize", e.to_string()))?;

        if exists {
            if !recreate {
                let info = self
                    .client
                    .collection_info(&self.collection)
                    .await
                    .map_err(|e| IndexError::new("initialize", e.to_string()))?;
                let size = info.result.as_ref().and_then(collection_vector_size);
                return check_vector_size(&self.collection, size, vector_size);
            }
            tracing::info!(collection = %self.collection, "recreating collection");
            self.client
                .delete_collection(&self.collection)
                .await
                .map_err(|e| IndexError::new("initialize", e.to_string()))?;
        }

        let create = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine));

        self.client
            .create_collection(create)
            .await
            .map_err(|e| IndexError::new("initialize", e.to_string()))?;

        tracing::info!(collection = %self.collection, vector_size, "created collection");
        Ok(())
    }

    async fn upsert(&self, document: &Document, vector: Vec<f32>) -> Result<(), IndexError> {
        let point = PointStruct::new(
            Document::point_id(&document.id),
            vector,
            document_payload(document),
        );
        let upsert = UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| IndexError::new("upsert", e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<SearchResult>, IndexError> {
        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, vector, limit).with_payload(true);

        if let Some(f) = filter.map(to_qdrant_filter).transpose()?.flatten() {
            search_builder = search_builder.filter(f);
        }

        let response = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| IndexError::new("search", e.to_string()))?;

        let results = response
            .result
            .into_iter()
            .map(|point| {
                let mut payload = point.payload;

                let id = match payload.remove(PAYLOAD_DOC_ID).map(qdrant_to_json) {
                    Some(Value::String(id)) => id,
                    _ => point_id_string(point.id),
                };

                let content = match payload.remove(PAYLOAD_CONTENT).map(qdrant_to_json) {
                    Some(Value::String(content)) => content,
                    _ => String::new(),
                };

                let metadata = match payload.remove(PAYLOAD_METADATA).map(qdrant_to_json) {
                    Some(Value::Object(map)) => Some(map),
                    _ => None,
                };

                SearchResult {
                    id,
                    score: f64::from(point.score),
                    content,
                    metadata,
                }
            })
            .collect();

        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<(), IndexError> {
        let delete = DeletePointsBuilder::new(&self.collection)
            .points(PointsIdsList {
                ids: vec![Document::point_id(id).into()],
            })
            .wait(true);

        self.client
            .delete_points(delete)
            .await
            .map_err(|e| IndexError::new("delete", e.to_string()))?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, IndexError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| IndexError::new("count", e.to_string()))?;

        Ok(response.result.map_or(0, |r| r.count))
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

fn point_id_string(id: Option<qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;

    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn document_payload(document: &Document) -> HashMap<String, QdrantValue> {
    let mut payload = HashMap::new();
    payload.insert(PAYLOAD_DOC_ID.to_string(), document.id.clone().into());
    payload.insert(PAYLOAD_CONTENT.to_string(), document.content.clone().into());

    let optional = [
        ("title", &document.title),
        ("source", &document.source),
        ("createdAt", &document.created_at),
        ("updatedAt", &document.updated_at),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            payload.insert(key.to_string(), value.clone().into());
        }
    }

    if let Some(metadata) = &document.metadata {
        payload.insert(
            PAYLOAD_METADATA.to_string(),
            json_to_qdrant(Value::Object(metadata.clone())),
        );
    }

    payload
}

pub(crate) fn json_to_qdrant(value: Value) -> QdrantValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s),
        Value::Array(values) => Kind::ListValue(ListValue {
            values: values.into_iter().map(json_to_qdrant).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, json_to_qdrant(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

pub(crate) fn qdrant_to_json(value: QdrantValue) -> Value {
    match value.kind {
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(d).map_or(Value::Null, Value::Number)
        }
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

/// Translate to a Qdrant filter. A condition Qdrant cannot express is an error rather
/// than being dropped, since dropping it would widen the result set.
pub(crate) fn to_qdrant_filter(filter: &PayloadFilter) -> Result<Option<Filter>, IndexError> {
    let conditions = filter
        .must
        .iter()
        .map(to_condition)
        .collect::<Result<Vec<_>, _>>()?;

    if conditions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Filter::must(conditions)))
    }
}

fn to_condition(condition: &FieldCondition) -> Result<Condition, IndexError> {
    let key = condition.key.as_str();
    let translated = match &condition.predicate {
        Predicate::Match(value) => match_condition(key, value)?,
        Predicate::MatchAny(values) => match_any_condition(key, values)?,
        Predicate::Text(text) => Condition::matches_text(key, text.clone()),
        Predicate::Range { gte, lte } => Condition::range(
            key,
            Range {
                gte: *gte,
                lte: *lte,
                ..Default::default()
            },
        ),
        Predicate::DatetimeRange { gte, lte } => Condition::datetime_range(
            key,
            DatetimeRange {
                gte: gte.map(|ts| timestamp(&ts)),
                lte: lte.map(|ts| timestamp(&ts)),
                ..Default::default()
            },
        ),
    };
    Ok(translated)
}

fn unsupported(key: &str, reason: &str) -> IndexError {
    IndexError::new(
        "search",
        format!("unsupported filter condition on {key}: {reason}"),
    )
}

fn match_condition(key: &str, value: &Value) -> Result<Condition, IndexError> {
    match value {
        Value::String(s) => Ok(Condition::matches(key, s.clone())),
        Value::Bool(b) => Ok(Condition::matches(key, *b)),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Condition::matches(key, i)),
            (None, Some(f)) => Ok(Condition::range(
                key,
                Range {
                    gte: Some(f),
                    lte: Some(f),
                    ..Default::default()
                },
            )),
            (None, None) => Err(unsupported(key, "number out of range")),
        },
        Value::Null => Ok(Condition::is_null(key)),
        Value::Array(_) | Value::Object(_) => Err(unsupported(key, "structured match value")),
    }
}

fn match_any_condition(key: &str, values: &[Value]) -> Result<Condition, IndexError> {
    if values.is_empty() {
        return Err(unsupported(key, "empty value list"));
    }

    if let Some(strings) = values
        .iter()
        .map(|v| v.as_str().map(String::from))
        .collect::<Option<Vec<_>>>()
    {
        return Ok(Condition::matches(key, strings));
    }

    if let Some(integers) = values.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
        return Ok(Condition::matches(key, integers));
    }

    let alternatives = values
        .iter()
        .map(|v| match_condition(key, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Filter::should(alternatives).into())
}

fn timestamp(ts: &chrono::DateTime<chrono::Utc>) -> Timestamp {
    Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

/// Size of the unnamed vector, if the collection has one.
fn collection_vector_size(info: &CollectionInfo) -> Option<u64> {
    let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        VectorsConfigKind::Params(params) => Some(params.size),
        VectorsConfigKind::ParamsMap(_) => None,
    }
}

/// An existing collection is only reused when its vectors have the configured size.
fn check_vector_size(
    collection: &str,
    existing: Option<u64>,
    expected: u64,
) -> Result<(), IndexError> {
    match existing {
        Some(size) if size != expected => Err(IndexError::new(
            "initialize",
            format!(
                "collection {collection} has vector size {size}, expected {expected}; \
                 set qdrant.recreateCollection to rebuild it"
            ),
        )),
        _ => Ok(()),
    }
}
