use std::collections::HashMap;

use crate::error::{Error, Result};

/// An ordered string table: labels or observation symbols mapped to dense ids
/// in order of insertion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Quark {
    v: Vec<String>,
    m: HashMap<String, usize>,
}

impl Quark {
    pub fn find_or_insert(&mut self, key: &str) -> usize {
        if let Some(&id) = self.m.get(key) {
            return id;
        }
        let id = self.v.len();
        self.m.insert(key.to_string(), id);
        self.v.push(key.to_string());
        id
    }

    pub fn to_id(&self, s: &str) -> Option<usize> {
        self.m.get(s).copied()
    }

    pub fn to_str(&self, id: usize) -> Option<&str> {
        self.v.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.v.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.v.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.v
    }
}

/// Builds a table from names that must already be distinct.
impl TryFrom<Vec<String>> for Quark {
    type Error = Error;

    fn try_from(value: Vec<String>) -> Result<Self> {
        let mut m = HashMap::with_capacity(value.len());
        for (i, s) in value.iter().enumerate() {
            if let Some(prev) = m.insert(s.clone(), i) {
                return Err(Error::InvalidModel(format!(
                    "duplicate name {s:?} at positions {prev} and {i}"
                )));
            }
        }
        Ok(Self { v: value, m })
    }
}

impl From<Quark> for Vec<String> {
    fn from(value: Quark) -> Self {
        value.v
    }
}
