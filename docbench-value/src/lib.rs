use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Field name every document uses as its primary key.
pub const ID_FIELD: &str = "_id";

/// Primary key of a document. Only the key shapes the workloads generate are supported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocId {
    I64(i64),
    String(Arc<str>),
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I64(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for DocId {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<&str> for DocId {
    fn from(v: &str) -> Self {
        Self::String(Arc::from(v))
    }
}

impl From<String> for DocId {
    fn from(v: String) -> Self {
        Self::String(Arc::from(v))
    }
}

impl From<DocId> for Value {
    fn from(id: DocId) -> Self {
        match id {
            DocId::I64(v) => Value::I64(v),
            DocId::String(v) => Value::String(v),
        }
    }
}

/// Milliseconds since the Unix epoch, the resolution document databases store dates at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTimeMillis(pub i64);

impl DateTimeMillis {
    #[must_use]
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>),
    DateTime(DateTimeMillis),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Interprets the value as a primary key, if it has a key shape.
    #[must_use]
    pub fn as_doc_id(&self) -> Option<DocId> {
        match self {
            Self::I64(v) => Some(DocId::I64(*v)),
            Self::String(v) => Some(DocId::String(v.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(Arc::from(v))
    }
}

impl From<DateTimeMillis> for Value {
    fn from(v: DateTimeMillis) -> Self {
        Self::DateTime(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Self::Document(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

/// An ordered set of named fields. Field order is preserved as inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(Arc<str>, Value)>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n),
        }
    }

    /// Builder-style [`Document::insert`].
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| k.as_ref() == key) {
            slot.1 = value;
            return;
        }
        self.fields.push((Arc::from(key), value));
    }

    /// Applies every field of `changes` onto this document (`$set` semantics).
    pub fn merge(&mut self, changes: &Document) {
        for (k, v) in changes.iter() {
            self.insert(k, v.clone());
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn id(&self) -> Option<DocId> {
        self.get(ID_FIELD).and_then(Value::as_doc_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_ref(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::I64(v) => serializer.serialize_i64(*v),
            Self::F64(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::DateTime(v) => serializer.serialize_i64(v.0),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Document(doc) => doc.serialize(serializer),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k.as_ref(), v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing_field_in_place() {
        let mut doc = Document::new()
            .with(ID_FIELD, "doc-1")
            .with("status", "draft")
            .with("n", 1i64);
        doc.insert("status", "published");

        let keys: Vec<&str> = doc.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![ID_FIELD, "status", "n"]);
        assert_eq!(doc.get("status").and_then(Value::as_str), Some("published"));
    }

    #[test]
    fn merge_applies_set_semantics() {
        let mut doc = Document::new().with(ID_FIELD, 7i64).with("status", "draft");
        let changes = Document::new()
            .with("status", "published")
            .with("updated_at", DateTimeMillis(42));
        doc.merge(&changes);

        assert_eq!(doc.len(), 3);
        assert_eq!(doc.get("updated_at"), Some(&Value::DateTime(DateTimeMillis(42))));
        assert_eq!(doc.id(), Some(DocId::I64(7)));
    }

    #[test]
    fn id_rejects_non_key_shapes() {
        let doc = Document::new().with(ID_FIELD, 1.5f64);
        assert_eq!(doc.id(), None);
    }
}
