// src/source/mod.rs
//! Where fresh records come from.
//!
//! A [`SourceAdapter`] yields a finite, lazily produced sequence. Each call to
//! `fetch_all` starts over from the beginning. Per-unit parse problems are
//! `SourceError::Format` items inside the stream; a transport failure is a
//! `SourceError::Unavailable` item after which the stream ends.

pub mod http;

pub use http::HttpSource;

use crate::{error::SourceError, record::AgreementRecord};

pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<AgreementRecord, SourceError>> + 'a>;

pub trait SourceAdapter {
    /// Short human-readable origin, for logs.
    fn describe(&self) -> String;

    fn fetch_all(&mut self) -> RecordStream<'_>;
}

impl<S: SourceAdapter + ?Sized> SourceAdapter for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn fetch_all(&mut self) -> RecordStream<'_> {
        (**self).fetch_all()
    }
}

/// Replays a fixed list of items. Tests and captured data.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    items: Vec<Result<AgreementRecord, SourceError>>,
    fetches: usize,
}

impl VecSource {
    pub fn new(records: Vec<AgreementRecord>) -> Self {
        Self::with_items(records.into_iter().map(Ok).collect())
    }

    /// Mix in errors to exercise the tolerant paths.
    pub fn with_items(items: Vec<Result<AgreementRecord, SourceError>>) -> Self {
        Self { items, fetches: 0 }
    }

    pub fn set_records(&mut self, records: Vec<AgreementRecord>) {
        self.items = records.into_iter().map(Ok).collect();
    }

    /// How many times `fetch_all` was called.
    pub fn fetches(&self) -> usize {
        self.fetches
    }
}

impl SourceAdapter for VecSource {
    fn describe(&self) -> String {
        format!("{} in-memory items", self.items.len())
    }

    fn fetch_all(&mut self) -> RecordStream<'_> {
        self.fetches += 1;
        Box::new(self.items.iter().cloned())
    }
}
