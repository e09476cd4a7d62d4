use std::sync::Arc;

use swarmr_value::Value;

use crate::error::{Error, Result};

/// One parsed dataset line. Field names are shared with every other record of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    names: Arc<[Arc<str>]>,
    values: Box<[Value]>,
    line: usize,
}

impl Record {
    pub(crate) fn new(names: Arc<[Arc<str>]>, values: Box<[Value]>, line: usize) -> Self {
        Self {
            names,
            values,
            line,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.names.iter().position(|n| n.as_ref() == name)?;
        self.values.get(idx)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// 1-based source line.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names.iter().map(AsRef::as_ref).zip(self.values.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub line: usize,
    pub reason: String,
}

/// Immutable, shareable dataset. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct SharedDataset {
    source: Arc<str>,
    records: Arc<[Record]>,
    skipped: Arc<[MalformedLine]>,
}

impl SharedDataset {
    pub(crate) fn new(
        source: &str,
        records: Vec<Record>,
        skipped: Vec<MalformedLine>,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Empty {
                source_name: source.to_string(),
                skipped: skipped.len(),
            });
        }

        Ok(Self {
            source: Arc::from(source),
            records: Arc::from(records),
            skipped: Arc::from(skipped),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false: an empty dataset can't be constructed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Record> {
        self.records.get(idx)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Malformed lines skipped in lenient mode.
    pub fn skipped(&self) -> &[MalformedLine] {
        &self.skipped
    }

    /// Index used for ordinal `n`: `n mod len`.
    pub fn index_for(&self, n: u64) -> usize {
        let len = self.records.len() as u64;
        if len == 0 {
            return 0;
        }
        (n % len) as usize
    }

    pub fn select(&self, n: u64) -> Option<&Record> {
        self.records.get(self.index_for(n))
    }
}
