//! Shared test helpers for controller tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use medchat_core::error::{ProviderError, RetrievalError};
use medchat_core::provider::{FragmentStream, Provider, ProviderRequest, StreamChunk};
use medchat_core::retriever::{RetrievedPassage, Retriever};
use tokio::sync::mpsc;

/// How a scripted generation ends.
#[derive(Debug, Clone)]
pub enum Ending {
    /// Stream closes normally after all fragments.
    Clean,
    /// Stream yields an error after all fragments.
    FailMidStream,
    /// `stream()` itself fails; no fragments are produced.
    FailToStart,
}

/// A provider that replays fixed fragments and records the request it got.
pub struct ScriptedProvider {
    fragments: Vec<String>,
    ending: Ending,
    captured: Mutex<Option<ProviderRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(fragments: &[&str], ending: Ending) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ending,
            captured: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn clean(fragments: &[&str]) -> Self {
        Self::new(fragments, Ending::Clean)
    }

    pub fn captured(&self) -> Option<ProviderRequest> {
        self.captured.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<FragmentStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.captured.lock().unwrap() = Some(request);

        if matches!(self.ending, Ending::FailToStart) {
            return Err(ProviderError::Network("connection refused".into()));
        }

        let (tx, rx) = mpsc::channel(self.fragments.len() + 2);
        for fragment in &self.fragments {
            tx.send(Ok(StreamChunk::text(fragment.clone()))).await.unwrap();
        }
        if matches!(self.ending, Ending::FailMidStream) {
            tx.send(Err(ProviderError::StreamInterrupted("backend went away".into())))
                .await
                .unwrap();
        }
        Ok(rx)
    }
}

/// A retriever with a canned answer.
pub struct ScriptedRetriever {
    result: Result<Vec<RetrievedPassage>, RetrievalError>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedRetriever {
    pub fn passages(texts: &[&str]) -> Self {
        Self {
            result: Ok(texts.iter().map(|t| RetrievedPassage::new(*t)).collect()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::passages(&[])
    }

    pub fn failing() -> Self {
        Self {
            result: Err(RetrievalError::IndexUnavailable("index not loaded".into())),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.result.clone()
    }
}
