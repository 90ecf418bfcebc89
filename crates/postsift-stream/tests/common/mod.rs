//! Test doubles for sources, connectors and classifiers

#![allow(dead_code)]

use async_trait::async_trait;
use postsift_classifiers::{ClassificationResult, Classifier};
use postsift_core::{Error, Event, Result};
use postsift_stream::{EventSource, SourceConnector};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted step of a source
#[derive(Debug, Clone)]
pub enum Step {
    Deliver(Event),
    Fail(String),
}

pub fn post(n: usize, text: &str) -> Event {
    Event::new(format!("did:plc:{}", n), text)
        .with_cid(format!("cid{}", n))
        .with_created_at(format!("2024-11-20T10:00:{:02}Z", n % 60))
}

pub fn deliver_all(events: impl IntoIterator<Item = Event>) -> Vec<Step> {
    events.into_iter().map(Step::Deliver).collect()
}

/// Source that plays back a fixed script, then ends cleanly
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    pulled: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            pulled: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of events handed out so far
    pub fn pulled(&self) -> Arc<AtomicUsize> {
        self.pulled.clone()
    }

    pub fn closed(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn next_event(&mut self) -> Result<Option<Event>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.steps.pop_front() {
            Some(Step::Deliver(event)) => {
                self.pulled.fetch_add(1, Ordering::SeqCst);
                Ok(Some(event))
            }
            Some(Step::Fail(reason)) => {
                self.steps.clear();
                Err(Error::source_error(reason))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out one scripted source per connection
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    pub connects: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct CountingSource {
    inner: ScriptedSource,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl EventSource for CountingSource {
    async fn next_event(&mut self) -> Result<Option<Event>> {
        self.inner.next_event().await
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await;
    }
}

#[async_trait]
impl SourceConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn EventSource>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(steps) => Ok(Box::new(CountingSource {
                inner: ScriptedSource::new(steps),
                closes: self.closes.clone(),
            })),
            None => Err(Error::source_error("connection refused")),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Classifier keyed on text content
///
/// - contains "rust": `__label__programming 0.9`
/// - contains "maybe": `__label__programming 0.4`
/// - contains "garbage": malformed response
/// - contains "die": classifier process exits
/// - anything else: `__label__other 0.8`
#[derive(Default)]
pub struct MockClassifier {
    pub seen: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.seen.lock().unwrap().push(text.to_string());

        if text.contains("garbage") {
            Err(Error::parse("onlylabel", "missing confidence"))
        } else if text.contains("die") {
            Err(Error::subprocess_exit("stdout closed"))
        } else if text.contains("rust") {
            Ok(ClassificationResult::new("__label__programming", 0.9))
        } else if text.contains("maybe") {
            Ok(ClassificationResult::new("__label__programming", 0.4))
        } else {
            Ok(ClassificationResult::new("__label__other", 0.8))
        }
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
