/*!
The [`Attribute`] and [`Attributes`] types.

Attributes are the typed key-value pairs carried by every item. Each value is encoded alongside its type, like:

```text
{"value":"checkout","type":"string"}
```
*/

use std::collections::{btree_map, BTreeMap};

use crate::{
    encode::stream_f64,
    well_known::{
        ATTRIBUTE_TYPE_BOOLEAN, ATTRIBUTE_TYPE_DOUBLE, ATTRIBUTE_TYPE_INTEGER,
        ATTRIBUTE_TYPE_STRING,
    },
};

/**
A single attribute value.
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    String(String),
    Integer(i64),
    Boolean(bool),
    Double(f64),
}

impl Attribute {
    /**
    The name of this attribute's type, as it appears in the encoded `type` field.
    */
    pub fn type_name(&self) -> &'static str {
        match self {
            Attribute::String(_) => ATTRIBUTE_TYPE_STRING,
            Attribute::Integer(_) => ATTRIBUTE_TYPE_INTEGER,
            Attribute::Boolean(_) => ATTRIBUTE_TYPE_BOOLEAN,
            Attribute::Double(_) => ATTRIBUTE_TYPE_DOUBLE,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<String> for Attribute {
    fn from(value: String) -> Self {
        Attribute::String(value)
    }
}

impl<'a> From<&'a str> for Attribute {
    fn from(value: &'a str) -> Self {
        Attribute::String(value.to_owned())
    }
}

impl From<i64> for Attribute {
    fn from(value: i64) -> Self {
        Attribute::Integer(value)
    }
}

impl From<bool> for Attribute {
    fn from(value: bool) -> Self {
        Attribute::Boolean(value)
    }
}

impl From<f64> for Attribute {
    fn from(value: f64) -> Self {
        Attribute::Double(value)
    }
}

const VALUE_LABEL: sval::Label = sval::Label::new("value");
const TYPE_LABEL: sval::Label = sval::Label::new("type");

impl sval::Value for Attribute {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        stream.record_begin(None, None, None, Some(2))?;

        stream.record_value_begin(None, &VALUE_LABEL)?;
        match self {
            Attribute::String(v) => stream.value(&**v)?,
            Attribute::Integer(v) => stream.i64(*v)?,
            Attribute::Boolean(v) => stream.bool(*v)?,
            Attribute::Double(v) => stream_f64(&mut *stream, *v)?,
        }
        stream.record_value_end(None, &VALUE_LABEL)?;

        stream.record_value_begin(None, &TYPE_LABEL)?;
        stream.value(self.type_name())?;
        stream.record_value_end(None, &TYPE_LABEL)?;

        stream.record_end(None, None, None)
    }
}

/**
A set of uniquely keyed [`Attribute`]s.

Keys are kept sorted so encoding is deterministic.
*/
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(BTreeMap<String, Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Attributes(BTreeMap::new())
    }

    /**
    Set an attribute, returning any value it replaced.
    */
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Attribute>) -> Option<Attribute> {
        self.0.insert(key.into(), value.into())
    }

    /**
    Set an attribute only if `key` isn't already present.

    Returns `true` if the attribute was set.
    */
    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<Attribute>) -> bool {
        if self.0.contains_key(key) {
            return false;
        }

        self.0.insert(key.to_owned(), value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Attribute> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.0.iter().map(|(k, v)| (&**k, v))
    }
}

impl<K: Into<String>, V: Into<Attribute>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Attributes(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Attribute>> Extend<(K, V)> for Attributes {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Attribute);
    type IntoIter = btree_map::IntoIter<String, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl sval::Value for Attributes {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        stream.map_begin(Some(self.0.len()))?;

        for (k, v) in &self.0 {
            stream.map_key_begin()?;
            stream.value(&**k)?;
            stream.map_key_end()?;

            stream.map_value_begin()?;
            stream.value(v)?;
            stream.map_value_end()?;
        }

        stream.map_end()
    }
}
