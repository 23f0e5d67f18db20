//! A scripted driver for testing that plays back configured outcomes
//! and records connect/retrieve/close counts.
//! Available for use in external test crates.

#![allow(dead_code)]

use super::{DeviceDriver, DriverError, Session};
use crate::config::{Credential, DeviceDescriptor};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of one scripted attempt.
#[derive(Clone, Debug)]
pub enum Step {
    /// `connect` succeeds and `retrieve_config` returns this text.
    Ok(String),
    /// `connect` fails with a connect error.
    ConnectFail(String),
    /// `connect` succeeds, `retrieve_config` fails.
    RetrieveFail(String),
    /// `connect` succeeds, `retrieve_config` blocks for the given duration
    /// before returning the text (for timeout tests).
    SlowRetrieve(Duration, String),
}

/// Scripted driver: attempts consume steps in order; once the script is
/// exhausted the last step repeats.
pub struct ScriptedDriver {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    /// Step chosen at connect time, keyed by device id, so the matching
    /// retrieval on that session sees the same step.
    pending: Mutex<HashMap<String, Step>>,
    pub connects: AtomicU32,
    pub retrievals: AtomicU32,
    pub closes: Arc<AtomicU32>,
}

impl ScriptedDriver {
    /// A driver that always succeeds with the given configuration text.
    pub fn always_ok(config_text: &str) -> Arc<Self> {
        Self::with_script(vec![Step::Ok(config_text.to_string())])
    }

    /// A driver that fails `connect` on every attempt.
    pub fn always_connect_fail(reason: &str) -> Arc<Self> {
        Self::with_script(vec![Step::ConnectFail(reason.to_string())])
    }

    pub fn with_script(steps: Vec<Step>) -> Arc<Self> {
        let last = steps
            .last()
            .cloned()
            .unwrap_or_else(|| Step::Ok(String::new()));
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(last),
            pending: Mutex::new(HashMap::new()),
            connects: AtomicU32::new(0),
            retrievals: AtomicU32::new(0),
            closes: Arc::new(AtomicU32::new(0)),
        })
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(step) => step,
            None => self.last.lock().unwrap().clone(),
        }
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn retrieval_count(&self) -> u32 {
        self.retrievals.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceDriver for ScriptedDriver {
    async fn connect(
        &self,
        desc: &DeviceDescriptor,
        _cred: &Credential,
    ) -> Result<Session, DriverError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step();

        if let Step::ConnectFail(reason) = step {
            return Err(DriverError::Connect(reason));
        }

        self.pending
            .lock()
            .unwrap()
            .insert(desc.id.clone(), step);

        let closes = Arc::clone(&self.closes);
        Ok(Session::new(&desc.id).with_close_hook(move || {
            closes.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn retrieve_config(&self, session: &mut Session) -> Result<String, DriverError> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        let step = self
            .pending
            .lock()
            .unwrap()
            .remove(session.device_id())
            .unwrap_or_else(|| self.next_step());

        match step {
            Step::Ok(text) => Ok(text),
            Step::RetrieveFail(reason) => Err(DriverError::Retrieval(reason)),
            Step::SlowRetrieve(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Step::ConnectFail(reason) => Err(DriverError::Retrieval(reason)),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
