use std::sync::Arc;

use docbench_value::{DateTimeMillis, DocId, Document, Value};
use mongodb::bson::{self, Bson};

pub fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(v) => Bson::Boolean(*v),
        Value::I64(v) => Bson::Int64(*v),
        Value::F64(v) => Bson::Double(*v),
        Value::String(v) => Bson::String(v.to_string()),
        Value::DateTime(v) => Bson::DateTime(bson::DateTime::from_millis(v.0)),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        Value::Document(doc) => Bson::Document(to_bson_document(doc)),
    }
}

pub fn to_bson_document(doc: &Document) -> bson::Document {
    let mut out = bson::Document::new();
    for (k, v) in doc.iter() {
        out.insert(k, to_bson(v));
    }
    out
}

pub fn doc_id_to_bson(id: &DocId) -> Bson {
    match id {
        DocId::I64(v) => Bson::Int64(*v),
        DocId::String(v) => Bson::String(v.to_string()),
    }
}

fn from_bson(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(v) => Value::Bool(*v),
        Bson::Int32(v) => Value::I64(i64::from(*v)),
        Bson::Int64(v) => Value::I64(*v),
        Bson::Double(v) => Value::F64(*v),
        Bson::String(v) => Value::String(Arc::from(v.as_str())),
        Bson::ObjectId(oid) => Value::String(Arc::from(oid.to_hex())),
        Bson::DateTime(dt) => Value::DateTime(DateTimeMillis(dt.timestamp_millis())),
        Bson::Array(items) => Value::Array(items.iter().map(from_bson).collect()),
        Bson::Document(doc) => Value::Document(from_bson_document(doc)),
        other => Value::String(Arc::from(other.to_string())),
    }
}

pub fn from_bson_document(doc: &bson::Document) -> Document {
    let mut out = Document::with_capacity(doc.len());
    for (k, v) in doc {
        out.insert(k, from_bson(v));
    }
    out
}

/// Reads a numeric reply field regardless of the integer width the server chose.
pub(crate) fn reply_u64(doc: &bson::Document, key: &str) -> u64 {
    match doc.get(key) {
        Some(Bson::Int32(v)) => u64::try_from(*v).unwrap_or(0),
        Some(Bson::Int64(v)) => u64::try_from(*v).unwrap_or(0),
        Some(Bson::Double(v)) if *v >= 0.0 => *v as u64,
        _ => 0,
    }
}
