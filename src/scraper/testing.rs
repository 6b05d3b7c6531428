//! In-memory session serving canned markup.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::http_client::{HttpResponse, Session};
use crate::error::Result;

/// Serves GETs by URL and postbacks by their `__EVENTTARGET` value. Unknown
/// routes answer 404.
#[derive(Default)]
pub struct FakeSession {
    pages: HashMap<String, String>,
    postbacks: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    chunk_size: usize,
    pub gets: Mutex<Vec<String>>,
    pub posts: Mutex<Vec<(String, Vec<(String, String)>)>>,
    pub headers: Mutex<Vec<(String, String)>>,
    pub chunks_served: std::sync::Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            chunk_size: 64,
            ..Default::default()
        }
    }

    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    pub fn postback(mut self, event_target: &str, body: impl Into<String>) -> Self {
        self.postbacks.insert(event_target.to_string(), body.into());
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n.max(1);
        self
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().map(|p| p.len()).unwrap_or_default()
    }

    pub fn get_count(&self) -> usize {
        self.gets.lock().map(|g| g.len()).unwrap_or_default()
    }

    fn respond(&self, url: &str, body: Option<&String>) -> Box<dyn HttpResponse> {
        let status = self
            .statuses
            .get(url)
            .copied()
            .unwrap_or(if body.is_some() { 200 } else { 404 });
        let chunks = body
            .map(|b| {
                b.as_bytes()
                    .chunks(self.chunk_size)
                    .map(Bytes::copy_from_slice)
                    .collect::<VecDeque<_>>()
            })
            .unwrap_or_default();
        Box::new(FakeResponse {
            url: url.to_string(),
            status,
            chunks,
            served: self.chunks_served.clone(),
        })
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>> {
        self.gets.lock().unwrap().push(url.to_string());
        Ok(self.respond(url, self.pages.get(url)))
    }

    async fn post(&self, url: &str, form: &[(&str, &str)]) -> Result<Box<dyn HttpResponse>> {
        let owned: Vec<(String, String)> = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let target = owned
            .iter()
            .find(|(k, _)| k == "__EVENTTARGET")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        self.posts.lock().unwrap().push((url.to_string(), owned));
        Ok(self.respond(url, self.postbacks.get(&target)))
    }

    fn set_header(&self, name: &str, value: &str) -> Result<()> {
        self.headers
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        Ok(())
    }
}

struct FakeResponse {
    url: String,
    status: u16,
    chunks: VecDeque<Bytes>,
    served: std::sync::Arc<AtomicUsize>,
}

#[async_trait]
impl HttpResponse for FakeResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let chunk = self.chunks.pop_front();
        if chunk.is_some() {
            self.served.fetch_add(1, Ordering::SeqCst);
        }
        Ok(chunk)
    }
}
