#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use db_builder::prelude::*;

/// Everything a scripted connection was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Batch(String),
    Procedure(String, Vec<ProcArg>),
    Close,
}

/// Shared state between a test and the connections its dialect hands out.
#[derive(Clone, Default)]
pub struct Script {
    calls: Arc<Mutex<Vec<Call>>>,
    connects: Arc<AtomicUsize>,
    fail_when_contains: Option<String>,
    delay: Option<Duration>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any batch or procedure whose text contains `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_when_contains = Some(needle.to_string());
        self
    }

    /// Sleep before answering every batch or procedure.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.calls().last() == Some(&Call::Close)
    }

    pub fn dialect(&self) -> Arc<ScriptedDialect> {
        Arc::new(ScriptedDialect {
            script: self.clone(),
        })
    }

    pub fn registry(&self) -> DialectRegistry {
        let mut registry = DialectRegistry::empty();
        registry.register(self.dialect());
        registry
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.connects.fetch_add(1, Ordering::SeqCst);
        ConnectionHandle::from_parts(
            "scripted",
            "c1",
            Box::new(ScriptedConnection {
                script: self.clone(),
            }),
        )
    }

    async fn answer(&self, call: Call, text: &str) -> Result<(), DbBuilderError> {
        self.calls.lock().unwrap().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_when_contains {
            Some(needle) if text.contains(needle.as_str()) => {
                Err(DbBuilderError::execution_in("scripted failure", text))
            }
            _ => Ok(()),
        }
    }
}

pub struct ScriptedDialect {
    script: Script,
}

#[async_trait]
impl Dialect for ScriptedDialect {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn build_connection_string(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<String, DbBuilderError> {
        Ok(format!("scripted://{}/{}", profile.host, profile.schema))
    }

    async fn connect(
        &self,
        _profile: &ConnectionProfile,
    ) -> Result<Box<dyn DialectConnection>, DbBuilderError> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            script: self.script.clone(),
        }))
    }
}

pub struct ScriptedConnection {
    script: Script,
}

#[async_trait]
impl DialectConnection for ScriptedConnection {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbBuilderError> {
        self.script.answer(Call::Batch(sql.to_string()), sql).await
    }

    async fn call_procedure(
        &mut self,
        name: &str,
        args: &[ProcArg],
    ) -> Result<(), DbBuilderError> {
        self.script
            .answer(Call::Procedure(name.to_string(), args.to_vec()), name)
            .await
    }

    async fn close(self: Box<Self>) -> Result<(), DbBuilderError> {
        self.script.calls.lock().unwrap().push(Call::Close);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Started(StepKind, Option<String>),
    Finished(ExecutionEvent),
    Completed(BuildSummary),
}

/// Keeps every record the executor emits.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Record>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<ExecutionEvent> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Finished(event) => Some(event),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn step_started(&self, kind: StepKind, identifier: Option<&str>) {
        self.records
            .lock()
            .unwrap()
            .push(Record::Started(kind, identifier.map(str::to_string)));
    }

    fn step_finished(&self, event: &ExecutionEvent) {
        self.records
            .lock()
            .unwrap()
            .push(Record::Finished(event.clone()));
    }

    fn build_completed(&self, summary: &BuildSummary) {
        self.records
            .lock()
            .unwrap()
            .push(Record::Completed(summary.clone()));
    }
}

pub fn profile(name: &str, dialect: &str) -> ConnectionProfile {
    ConnectionProfile {
        name: name.to_string(),
        dialect: dialect.to_string(),
        host: "localhost".into(),
        port: 3306,
        schema: "reporting".into(),
        username: "builder".into(),
        password: "secret".into(),
    }
}
