//! Engine lifecycle behavior: sequential execution, short-circuiting and
//! reverse-order finalize.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use clusterctl::error::OpError;
use clusterctl::net::TlsBundle;
use clusterctl::ops::{ClusterOp, Engine, ExecContext, OpBase};
use common::{test_logger, ScriptedDispatcher};

/// Records every lifecycle call into a shared journal; fails where told to.
struct JournalingOp {
    base: OpBase,
    journal: Arc<Mutex<Vec<String>>>,
    fail_prepare: bool,
    fail_execute: bool,
}

impl JournalingOp {
    fn new(
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        fail_prepare: bool,
        fail_execute: bool,
    ) -> Self {
        Self {
            base: OpBase::new(name, "test operation", &test_logger(), Vec::new()),
            journal,
            fail_prepare,
            fail_execute,
        }
    }

    fn record(&self, phase: &str) {
        self.journal
            .lock()
            .expect("journal lock")
            .push(format!("{}:{}", self.base.name, phase));
    }
}

#[async_trait]
impl ClusterOp for JournalingOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        self.record("prepare");
        if self.fail_prepare {
            return Err(OpError::Precondition {
                op: self.base.name.to_string(),
                detail: "prepare failed on purpose".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        self.record("execute");
        if self.fail_execute {
            return Err(OpError::Application {
                host: "10.0.0.1".to_string(),
                detail: "execute failed on purpose".to_string(),
            });
        }
        Ok(())
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        Ok(())
    }

    async fn finalize(&mut self, _ctx: &mut ExecContext) {
        self.record("finalize");
    }
}

fn engine() -> Engine {
    let dispatcher = Arc::new(ScriptedDispatcher::new(Vec::new()));
    Engine::new(dispatcher, TlsBundle::default(), &test_logger())
}

#[tokio::test]
async fn test_all_ops_run_and_finalize_in_reverse_order() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(JournalingOp::new("P1", journal.clone(), false, false)),
        Box::new(JournalingOp::new("P2", journal.clone(), false, false)),
    ];

    engine().run(&mut instructions).await.expect("run succeeds");

    let entries = journal.lock().expect("journal lock").clone();
    assert_eq!(
        entries,
        vec![
            "P1:prepare",
            "P1:execute",
            "P2:prepare",
            "P2:execute",
            "P2:finalize",
            "P1:finalize",
        ]
    );
}

#[tokio::test]
async fn test_execute_failure_finalizes_prepared_ops_only() {
    // S6: P1 runs fully, P2's execute fails, P3 never runs; finalize hits
    // P2 then P1 and the engine returns P2's error
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(JournalingOp::new("P1", journal.clone(), false, false)),
        Box::new(JournalingOp::new("P2", journal.clone(), false, true)),
        Box::new(JournalingOp::new("P3", journal.clone(), false, false)),
    ];

    let err = engine()
        .run(&mut instructions)
        .await
        .expect_err("run must fail");
    assert!(matches!(err, OpError::Application { .. }));
    assert!(err.to_string().contains("execute failed on purpose"));

    let entries = journal.lock().expect("journal lock").clone();
    assert_eq!(
        entries,
        vec![
            "P1:prepare",
            "P1:execute",
            "P2:prepare",
            "P2:execute",
            "P2:finalize",
            "P1:finalize",
        ]
    );
}

#[tokio::test]
async fn test_prepare_failure_skips_execute_and_own_finalize() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(JournalingOp::new("P1", journal.clone(), false, false)),
        Box::new(JournalingOp::new("P2", journal.clone(), true, false)),
    ];

    let err = engine()
        .run(&mut instructions)
        .await
        .expect_err("run must fail");
    assert!(matches!(err, OpError::Precondition { .. }));

    let entries = journal.lock().expect("journal lock").clone();
    assert_eq!(
        entries,
        vec!["P1:prepare", "P1:execute", "P2:prepare", "P1:finalize"]
    );
}
