//! In-crate fakes for collaborator traits.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use grantscout_inference::{InferenceRequest, StructuredInference};
use grantscout_pages::PageFetcher;
use grantscout_retrieval::{FeedEntry, FeedReader, ProviderKind, SearchProvider};
use grantscout_shared::{GrantScoutError, ModelChoice, Result};
use serde_json::Value;
use tokio::time::Instant;

use crate::pacing::Clock;

/// Clock whose sleeps return immediately and advance virtual time.
pub struct FakeClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

/// One scripted inference reply.
pub enum Reply {
    Value(Value),
    Fail(String),
    /// Never answers (exercises per-item timeouts).
    Hang,
}

/// Inference fake answering each task from its own queue, in order.
///
/// An exhausted queue is an inference error.
#[derive(Default)]
pub struct ScriptedInference {
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, task: &'static str, value: Value) -> Self {
        self.push(task, Reply::Value(value))
    }

    pub fn fail(self, task: &'static str, message: &str) -> Self {
        self.push(task, Reply::Fail(message.to_string()))
    }

    pub fn hang(self, task: &'static str) -> Self {
        self.push(task, Reply::Hang)
    }

    fn push(self, task: &'static str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self, task: &str) -> Vec<InferenceRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StructuredInference for ScriptedInference {
    async fn infer(&self, request: InferenceRequest) -> Result<Value> {
        let task = request.task;
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(task)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(Reply::Value(value)) => Ok(value),
            Some(Reply::Fail(message)) => Err(GrantScoutError::Inference(message)),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(GrantScoutError::Inference(format!("no scripted reply for {task}"))),
        }
    }
}

/// Page fetcher serving fixed text per URL; unknown URLs fail.
#[derive(Default)]
pub struct ScriptedPages {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), text.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedPages {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| GrantScoutError::fetch(url, "HTTP 404 Not Found"))
    }
}

/// Search provider returning fixed Tavily-shaped hits for every query.
pub struct ScriptedSearch {
    hits: Value,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn hits(hits: Value) -> Self {
        Self {
            hits,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            hits: Value::Null,
            fail: true,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tavily
    }

    async fn search(&self, query: &str, _max_results: u32) -> Result<Value> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(GrantScoutError::search("tavily", "scripted outage"));
        }
        Ok(self.hits.clone())
    }
}

/// Feed reader with the same entries for every URL.
#[derive(Default)]
pub struct ScriptedFeeds(pub Vec<FeedEntry>);

#[async_trait]
impl FeedReader for ScriptedFeeds {
    async fn read(&self, _url: &str) -> Result<Vec<FeedEntry>> {
        Ok(self.0.clone())
    }
}

pub fn model() -> ModelChoice {
    ModelChoice {
        model: "test/model".into(),
        temperature: 0.0,
    }
}
