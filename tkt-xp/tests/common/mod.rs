//! Shared test doubles for tkt-xp integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tkt_common::{Error, Result};
use tkt_xp::sync::DatafileSource;
use tokio::sync::Notify;

/// One scripted datafile response
pub enum Step {
    Body(String),
    Fail(String),
    /// Signal `entered`, then wait for `release` before answering
    Gated {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        body: String,
    },
    Hang(Duration),
}

/// Datafile source that replays a script; repeats the last body when exhausted
#[derive(Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    last_body: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatafileSource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        let body = match step {
            Some(Step::Body(body)) => body,
            Some(Step::Fail(reason)) => return Err(Error::Fetch(reason)),
            Some(Step::Gated {
                entered,
                release,
                body,
            }) => {
                entered.notify_one();
                release.notified().await;
                body
            }
            Some(Step::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                return Err(Error::Fetch("hung fetch finished".to_string()));
            }
            None => self
                .last_body
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::Fetch("script exhausted".to_string()))?,
        };
        *self.last_body.lock().unwrap() = Some(body.clone());
        Ok(body.into_bytes())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Minimal datafile at `revision` with no experiments
pub fn datafile_json(revision: &str) -> String {
    format!(r#"{{"revision":"{}","experiments":{{}}}}"#, revision)
}
