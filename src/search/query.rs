//! Structured queries as authored by the search UI, and their encoded form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};
use sha2::{Digest, Sha256};

use super::encoder::encode_query;
use crate::error::EncodeError;

/// Option map passed through to the remote index.
pub type Options = Map<String, Value>;

/// A persisted query record, read by id and never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub submitted_by: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Client-authored description, validated when encoded.
    pub data: Value,
}

impl StructuredQuery {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            submitted_by: None,
            submitted_at: None,
            data,
        }
    }

    pub fn query_data(&self) -> Result<QueryData, EncodeError> {
        QueryData::from_value(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Simple(SimpleQuery),
    Advanced { clauses: Vec<Clause> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleQuery {
    pub text_query_type: String,
    pub text: String,
    pub image_query_type: Option<String>,
    pub query_images: Vec<QueryImage>,
}

impl SimpleQuery {
    pub fn is_magic(&self) -> bool {
        self.text_query_type == MAGIC_QUERY_TYPE
    }
}

/// One clause of an advanced query. Types ending in `-i` reference images.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryImage {
    pub image_url: String,
    pub selection: Option<Selection>,
}

/// Rectangular region of a query image. Coordinates keep their JSON form.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub x1: Number,
    pub y1: Number,
    pub x2: Number,
    pub y2: Number,
}

pub const ADVANCED_QUERY_TYPE: &str = "advanced";
pub const MAGIC_QUERY_TYPE: &str = "magic";

impl QueryData {
    pub fn from_value(value: &Value) -> Result<Self, EncodeError> {
        let obj = value.as_object().ok_or(EncodeError::InvalidField {
            field: "data",
            expected: "an object",
        })?;

        if obj.get("type").and_then(Value::as_str) == Some(ADVANCED_QUERY_TYPE) {
            let clauses = obj
                .get("clauses")
                .ok_or(EncodeError::MissingField("clauses"))?
                .as_array()
                .ok_or(EncodeError::InvalidField {
                    field: "clauses",
                    expected: "an array",
                })?
                .iter()
                .map(parse_clause)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Advanced { clauses });
        }

        let images = match obj.get("queryImages") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_image)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(EncodeError::InvalidField {
                    field: "queryImages",
                    expected: "an array",
                });
            }
        };

        Ok(Self::Simple(SimpleQuery {
            text_query_type: required_str(obj, "textQueryType")?,
            text: required_str(obj, "text")?,
            image_query_type: optional_str(obj, "imageQueryType")?,
            query_images: images,
        }))
    }
}

fn optional_str(obj: &Map<String, Value>, field: &'static str) -> Result<Option<String>, EncodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(EncodeError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

fn required_str(obj: &Map<String, Value>, field: &'static str) -> Result<String, EncodeError> {
    optional_str(obj, field)?.ok_or(EncodeError::MissingField(field))
}

fn parse_clause(value: &Value) -> Result<Clause, EncodeError> {
    let obj = value.as_object().ok_or(EncodeError::InvalidField {
        field: "clauses",
        expected: "an array of objects",
    })?;
    Ok(Clause {
        kind: required_str(obj, "type")?,
        text: required_str(obj, "text")?,
    })
}

fn parse_image(value: &Value) -> Result<QueryImage, EncodeError> {
    let obj = value.as_object().ok_or(EncodeError::InvalidField {
        field: "queryImages",
        expected: "an array of objects",
    })?;
    let selection = match obj.get("selection") {
        Some(Value::Object(sel)) if !sel.is_empty() => Some(Selection {
            x1: coordinate(sel, "x1")?,
            y1: coordinate(sel, "y1")?,
            x2: coordinate(sel, "x2")?,
            y2: coordinate(sel, "y2")?,
        }),
        _ => None,
    };
    Ok(QueryImage {
        image_url: required_str(obj, "imageUrl")?,
        selection,
    })
}

fn coordinate(sel: &Map<String, Value>, field: &'static str) -> Result<Number, EncodeError> {
    match sel.get(field) {
        Some(Value::Number(n)) => Ok(n.clone()),
        Some(_) => Err(EncodeError::InvalidField {
            field,
            expected: "a number",
        }),
        None => Err(EncodeError::MissingField(field)),
    }
}

/// Derived, non-persisted form of a query ready for the remote index.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedQuery {
    pub query_id: String,
    pub id_token: String,
    pub options: Options,
    pub encoded_text: String,
    pub display_text: String,
    pub is_magic: bool,
    /// Unmodified user text, sent verbatim for magic queries.
    pub raw_text: Option<String>,
}

impl EncodedQuery {
    pub fn new(query: &StructuredQuery, options: Options) -> Result<Self, EncodeError> {
        let data = query.query_data()?;
        let encoder = encode_query(&data);
        let raw_text = match &data {
            QueryData::Simple(simple) if simple.is_magic() => Some(simple.text.clone()),
            _ => None,
        };
        Ok(Self {
            query_id: query.id.clone(),
            id_token: query_id_token(&query.id),
            options,
            encoded_text: encoder.encoded_query(),
            display_text: encoder.query_text(),
            is_magic: raw_text.is_some(),
            raw_text,
        })
    }

    /// Cache key for this query. Queries encoding to the same text share it.
    pub fn cache_key(&self) -> String {
        cache_key_for(&self.encoded_text)
    }

    /// The `queryObject` argument of `search` and `suggestEntities`.
    pub fn to_query_object(&self) -> Value {
        match (&self.raw_text, self.is_magic) {
            (Some(raw), true) => json!({
                "id": self.id_token,
                "options": self.options,
                "text": raw,
                "queryString": raw,
                "magic": true,
            }),
            _ => json!({
                "id": self.id_token,
                "options": self.options,
                "text": self.encoded_text,
                "queryString": self.display_text,
            }),
        }
    }
}

pub fn query_id_token(id: &str) -> String {
    format!("urn:query:{id}")
}

pub fn cache_key_for(encoded_text: &str) -> String {
    hex::encode(Sha256::digest(encoded_text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_query_with_images() {
        let data = json!({
            "textQueryType": "meta",
            "text": "dogs",
            "imageQueryType": "face-i",
            "queryImages": [
                {"imageUrl": "http://img/1.jpg", "selection": {"x1": 1, "y1": 2, "x2": 3, "y2": 4}},
                {"imageUrl": "http://img/2.jpg"}
            ]
        });
        let QueryData::Simple(simple) = QueryData::from_value(&data).unwrap() else {
            panic!("expected simple query");
        };
        assert_eq!(simple.text_query_type, "meta");
        assert_eq!(simple.image_query_type.as_deref(), Some("face-i"));
        assert_eq!(simple.query_images.len(), 2);
        assert!(simple.query_images[0].selection.is_some());
        assert!(simple.query_images[1].selection.is_none());
    }

    #[test]
    fn advanced_query_requires_clauses() {
        let err = QueryData::from_value(&json!({"type": "advanced"})).unwrap_err();
        assert_eq!(err, EncodeError::MissingField("clauses"));
    }

    #[test]
    fn clause_without_type_is_rejected() {
        let data = json!({"type": "advanced", "clauses": [{"text": "x"}]});
        assert_eq!(
            QueryData::from_value(&data).unwrap_err(),
            EncodeError::MissingField("type")
        );
    }

    #[test]
    fn non_object_data_is_rejected() {
        assert!(matches!(
            QueryData::from_value(&json!("cats")),
            Err(EncodeError::InvalidField { field: "data", .. })
        ));
    }

    #[test]
    fn deserializes_mongo_style_id() {
        let q: StructuredQuery = serde_json::from_value(json!({
            "_id": "5150",
            "submittedBy": "kevin",
            "submittedAt": "2013-05-01T10:00:00Z",
            "data": {"textQueryType": "meta", "text": "cats"}
        }))
        .unwrap();
        assert_eq!(q.id, "5150");
        assert_eq!(q.submitted_by.as_deref(), Some("kevin"));
        assert!(q.submitted_at.is_some());
    }

    #[test]
    fn query_object_uses_encoded_text() {
        let q = StructuredQuery::new("42", json!({"textQueryType": "meta", "text": "cats"}));
        let encoded = EncodedQuery::new(&q, Options::new()).unwrap();
        let obj = encoded.to_query_object();
        assert_eq!(obj["id"], "urn:query:42");
        assert_eq!(obj["text"], "#meta(cats)");
        assert_eq!(obj["queryString"], "cats");
        assert!(obj.get("magic").is_none());
    }

    #[test]
    fn magic_query_sends_raw_text() {
        let q = StructuredQuery::new("7", json!({"textQueryType": "magic", "text": "a+b #tag"}));
        let encoded = EncodedQuery::new(&q, Options::new()).unwrap();
        assert!(encoded.is_magic);
        let obj = encoded.to_query_object();
        assert_eq!(obj["text"], "a+b #tag");
        assert_eq!(obj["queryString"], "a+b #tag");
        assert_eq!(obj["magic"], true);
        // The cache key still follows the encoder output.
        assert_eq!(encoded.encoded_text, "#magic(a b tag)");
    }

    #[test]
    fn identical_encodings_share_cache_key() {
        let a = StructuredQuery::new("1", json!({"textQueryType": "meta", "text": "cats"}));
        let b = StructuredQuery::new(
            "2",
            json!({"type": "advanced", "clauses": [{"type": "meta", "text": "cats"}]}),
        );
        let ka = EncodedQuery::new(&a, Options::new()).unwrap().cache_key();
        let kb = EncodedQuery::new(&b, Options::new()).unwrap().cache_key();
        assert_eq!(ka, kb);
        assert_eq!(ka.len(), 64);
    }
}
