//! Scripted [`Fetch`] implementation for tests.

use crate::error::FeedError;
use crate::scraper::http::{Fetch, Page};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub const FIXTURE_BASE: &str = "https://fixtures.test";

/// One scripted reaction to a request.
#[derive(Debug, Clone)]
pub enum Reply {
    Page(Page),
    /// Simulated connection failure.
    Refused,
    /// Answer only after the given delay.
    Slow(Duration, Page),
}

/// Serves fixture pages by URL.
///
/// Each URL owns a queue of replies; the last reply repeats once the queue
/// is down to one element. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct FixtureFetcher {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
    user_agents: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 at `FIXTURE_BASE + path`.
    pub fn page(self, path: &str, body: &str) -> Self {
        self.script(path, vec![Reply::Page(Page::ok(body))])
    }

    pub fn script(self, path: &str, replies: Vec<Reply>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(format!("{FIXTURE_BASE}{path}"), replies.into());
        self
    }

    /// Number of requests made to `FIXTURE_BASE + path`.
    pub fn calls(&self, path: &str) -> usize {
        let url = format!("{FIXTURE_BASE}{path}");
        self.calls.lock().unwrap().get(&url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Fetch for FixtureFetcher {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<Page, FeedError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.user_agents.lock().unwrap().push(user_agent.to_string());

        match self.next_reply(url) {
            None => Ok(Page { status: 404, body: "not found".into() }),
            Some(Reply::Page(page)) => Ok(page),
            Some(Reply::Refused) => Err(FeedError::Status { url: url.to_string(), status: 0 }),
            Some(Reply::Slow(delay, page)) => {
                tokio::time::sleep(delay).await;
                Ok(page)
            }
        }
    }
}

pub fn fixture(name: &str) -> &'static str {
    match name {
        "example_01.html" => include_str!("testdata/example_01.html"),
        "example_02.html" => include_str!("testdata/example_02.html"),
        "example_03.xml" => include_str!("testdata/example_03.xml"),
        "example_04.html" => include_str!("testdata/example_04.html"),
        "example_05.xml" => include_str!("testdata/example_05.xml"),
        "example_06.html" => include_str!("testdata/example_06.html"),
        "example_07.html" => include_str!("testdata/example_07.html"),
        "example.json" => include_str!("testdata/example.json"),
        "challenge.html" => include_str!("testdata/challenge.html"),
        other => panic!("unknown fixture {other}"),
    }
}

/// Parse a YAML source definition, defaulting `base_url` to the fixture host.
pub fn parse_source(yaml: &str) -> crate::scraper::SourceDefinition {
    let mut source: crate::scraper::SourceDefinition =
        serde_yaml::from_str(yaml).expect("valid source yaml");
    if source.base_url.is_empty() {
        source.base_url = FIXTURE_BASE.to_string();
    }
    source
}
