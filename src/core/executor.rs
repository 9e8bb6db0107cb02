//! SF-012: Dependency-driven dispatch of plan steps to tools.
//!
//! load → filter unregistered tools → parse → reject unknown deps / cycles →
//! repeat { frontier → activation → resolve placeholders → invoke → bind }.
//!
//! `run` dispatches one ready step at a time. `async_run` dispatches the whole
//! frontier to a bounded pool and drains it before computing the next one, so
//! a step's output becomes visible only once its wavefront has finished.
//! All bookkeeping happens on the coordinator; workers get an immutable
//! [`PendingAction`] and hand back a [`CompletedAction`].

use super::error::ExecutorError;
use super::expr::expression_engine;
use super::loader;
use super::parser;
use super::placeholder::{sub_placeholder, sub_placeholder_args};
use super::resolver;
use super::sop::SopHandler;
use super::state::ExecutorState;
use super::types::*;
use crate::history::{hasher, RunEvent, RunLog};
use crate::tools::{LanguageModel, ToolManager};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs plans against a tool manager.
pub struct AgentExecutor {
    handler: SopHandler,
    tool_manager: Arc<dyn ToolManager>,
    config: ExecutorConfig,
    event_log: Option<PathBuf>,
}

impl AgentExecutor {
    pub fn new(tool_manager: Arc<dyn ToolManager>) -> Self {
        Self {
            handler: SopHandler::new(Arc::clone(&tool_manager)),
            tool_manager,
            config: ExecutorConfig::default(),
            event_log: None,
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Append run events as JSONL to `path`.
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = Some(path.into());
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Load and validate a plan. Returns `(valid, report)`.
    pub fn check_valid(&self, content: &str) -> (bool, String) {
        match loader::load_plan(content) {
            Ok(raw) => {
                let report = self.handler.check_valid_sop(&raw);
                (report.is_empty(), report)
            }
            Err(e) => (false, e.to_string()),
        }
    }

    /// Load a plan and build the initial run state.
    ///
    /// Steps whose tool is not registered are dropped. Unknown dependencies
    /// and cycles among the remaining steps are rejected.
    pub fn init_state(&self, content: &str) -> Result<ExecutorState, ExecutorError> {
        let raw = loader::load_plan(content)?;

        let kept: Vec<RawStep> = raw
            .into_iter()
            .filter(|op| {
                let tool = op.get("toolname").map(value_to_string).unwrap_or_default();
                let registered = self.tool_manager.get_api_by_name(&tool).is_some();
                if !registered {
                    tracing::warn!(
                        "dropping step {}: tool '{}' is not registered",
                        op.get("name").map(value_to_string).unwrap_or_default(),
                        tool
                    );
                }
                registered
            })
            .collect();

        let graph = parser::parse(&kept)?;

        if let Some((node, dependency)) = resolver::find_unknown_dependency(&graph) {
            return Err(ExecutorError::UnknownDependency { node, dependency });
        }
        let members = resolver::find_cycle_members(&graph);
        if !members.is_empty() {
            return Err(ExecutorError::Cycle { members });
        }

        Ok(ExecutorState::new(graph))
    }

    /// Compute the ready frontier.
    ///
    /// Steps whose activation evaluates false are moved to done (skipped) on
    /// the spot. Steps already handed to a worker are not returned again.
    pub fn get_executable_actions(&self, state: &mut ExecutorState) -> Vec<PendingAction> {
        frontier(state, None)
    }

    /// Resolve a step's placeholders into a dispatchable snapshot.
    ///
    /// Fails while any dependency is still outstanding.
    pub fn process_action_args(
        node: &Node,
        state: &ExecutorState,
    ) -> Result<PendingAction, String> {
        if let Some(dep) = node
            .dependency
            .iter()
            .find(|d| !state.done_tasks.contains(d.as_str()))
        {
            return Err(format!("dependency action {} hasn't executed", dep));
        }

        let ws = &state.workspace;
        let input = sub_placeholder_args(&node.input, ws);
        let prompt = node.render_prompt(&input).unwrap_or_else(|e| {
            tracing::warn!("step {}: {}; keeping the prompt unrendered", node.name, e);
            node.prompt.clone()
        });
        Ok(PendingAction {
            name: node.name.clone(),
            step: node.step.clone(),
            toolname: node.toolname.clone(),
            input,
            dependency: node.dependency.iter().cloned().collect(),
            activate: node.activate.as_deref().map(|a| sub_placeholder(a, ws)),
            prompt,
        })
    }

    /// Normalize a tool's output and build its history entry.
    ///
    /// String output is decoded as JSON when it parses, so an encoded string
    /// and the decoded value produce the same stored output.
    pub fn parser_output(output: Value, action: &PendingAction) -> (Value, HistoryEntry) {
        let content = match output {
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(decoded) => decoded,
                Err(_) => Value::String(s),
            },
            other => other,
        };
        let history = HistoryEntry {
            operation_name: action.name.clone(),
            dependency: action.dependency.clone(),
            input: action.input.clone(),
            output: content.clone(),
            activate: action.activate.clone(),
            prompt: action.prompt.clone(),
        };
        (content, history)
    }

    /// Invoke one step's tool and package the result.
    pub fn run_task(
        &self,
        action: &PendingAction,
        llm: Option<&dyn LanguageModel>,
    ) -> Result<CompletedAction, ExecutorError> {
        run_task(&self.handler, action, llm)
    }

    /// Execute a plan one step at a time and return the finished state.
    pub fn execute(&self, content: &str) -> Result<ExecutorState, ExecutorError> {
        let mut state = self.init_state(content)?;
        let log = self.open_log(content, RunMode::Sequential, &state);
        let started = Instant::now();

        let outcome = self.drive_sequential(&mut state, log.as_ref());
        close_log(log.as_ref(), &state, started, &outcome);
        outcome.map(|()| state)
    }

    /// Execute a plan sequentially and return its final result.
    pub fn run(&self, content: &str) -> Result<String, ExecutorError> {
        let state = self.execute(content)?;
        Ok(state.final_result(self.config.result_node.as_deref()))
    }

    /// Execute a plan wavefront by wavefront on a bounded worker pool.
    pub async fn execute_concurrent(
        &self,
        content: &str,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Result<ExecutorState, ExecutorError> {
        let mut state = self.init_state(content)?;
        let log = self.open_log(content, RunMode::Concurrent, &state);
        let started = Instant::now();

        let outcome = self.drive_concurrent(&mut state, log.as_ref(), llm).await;
        close_log(log.as_ref(), &state, started, &outcome);
        outcome.map(|()| state)
    }

    /// Execute a plan concurrently and return its final result.
    pub async fn async_run(
        &self,
        content: &str,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Result<String, ExecutorError> {
        let state = self.execute_concurrent(content, llm).await?;
        Ok(state.final_result(self.config.result_node.as_deref()))
    }

    fn drive_sequential(
        &self,
        state: &mut ExecutorState,
        log: Option<&RunLog>,
    ) -> Result<(), ExecutorError> {
        loop {
            let done_before = state.done_tasks.len();
            let ready = frontier(state, log);

            let Some(action) = ready.into_iter().next() else {
                if state.is_finished() {
                    return Ok(());
                }
                if state.done_tasks.len() > done_before {
                    // skips may have unblocked new steps
                    continue;
                }
                return Err(stalled(state));
            };

            state.mark_activated(&action.name);
            let done = run_task(&self.handler, &action, None)?;
            record_completion(log, state, &done);
            state.complete(done)?;
        }
    }

    async fn drive_concurrent(
        &self,
        state: &mut ExecutorState,
        log: Option<&RunLog>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Result<(), ExecutorError> {
        let permits = Arc::new(Semaphore::new(self.config.max_workers.max(1)));

        while !state.is_finished() {
            let done_before = state.done_tasks.len();
            let wave = frontier(state, log);

            if wave.is_empty() {
                if state.done_tasks.len() > done_before {
                    continue;
                }
                return Err(stalled(state));
            }
            tracing::debug!("dispatching wavefront of {} step(s)", wave.len());

            let mut tasks = JoinSet::new();
            for action in wave {
                state.mark_activated(&action.name);
                let handler = self.handler.clone();
                let permits = Arc::clone(&permits);
                let llm = llm.clone();
                tasks.spawn(async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return Err(ExecutorError::Worker(e.to_string())),
                    };
                    let job = move || run_task(&handler, &action, llm.as_deref());
                    match tokio::task::spawn_blocking(job).await {
                        Ok(result) => result,
                        Err(e) => Err(ExecutorError::Worker(e.to_string())),
                    }
                });
            }

            // barrier: the next frontier sees every output of this one
            while let Some(joined) = tasks.join_next().await {
                let done = joined.map_err(|e| ExecutorError::Worker(e.to_string()))??;
                record_completion(log, state, &done);
                state.complete(done)?;
            }
        }
        Ok(())
    }

    fn open_log(&self, content: &str, mode: RunMode, state: &ExecutorState) -> Option<RunLog> {
        let log = RunLog::new(self.event_log.as_deref()?);
        tracing::info!(
            "run {} started ({}, {} step(s))",
            log.run_id(),
            mode,
            state.sop_graph.len()
        );
        log.record(RunEvent::RunStarted {
            run_id: log.run_id().to_string(),
            plan_hash: hasher::hash_string(content),
            mode,
            steps: state.sop_graph.len(),
            sopflow_version: env!("CARGO_PKG_VERSION").to_string(),
        });
        Some(log)
    }
}

/// Frontier pass shared by both modes; records skips when a log is open.
fn frontier(state: &mut ExecutorState, log: Option<&RunLog>) -> Vec<PendingAction> {
    let ready: Vec<String> = state
        .remaining_tasks
        .iter()
        .filter(|name| {
            state.sop_graph.get(name).is_some_and(|node| {
                node.dependency
                    .iter()
                    .all(|d| state.done_tasks.contains(d.as_str()))
            })
        })
        .cloned()
        .collect();
    tracing::debug!(
        "frontier pass: {} ready of {} remaining",
        ready.len(),
        state.remaining_tasks.len()
    );

    let mut pending = Vec::new();
    for name in ready {
        let Some(node) = state.sop_graph.get(&name) else {
            continue;
        };

        if let Some(activate) = &node.activate {
            let expression = sub_placeholder(activate, &state.workspace);
            if !expression_engine(&expression) {
                tracing::debug!("skipping {}: activation '{}' is false", name, expression);
                if let Some(log) = log {
                    log.record(RunEvent::StepSkipped {
                        run_id: log.run_id().to_string(),
                        step: name.clone(),
                        activate: expression,
                    });
                }
                state.mark_skipped(&name);
                continue;
            }
        }

        if state.activated_tasks.contains(&name) {
            continue;
        }
        match AgentExecutor::process_action_args(node, state) {
            Ok(action) => pending.push(action),
            Err(reason) => tracing::debug!("deferring {}: {}", name, reason),
        }
    }
    pending
}

fn run_task(
    handler: &SopHandler,
    action: &PendingAction,
    llm: Option<&dyn LanguageModel>,
) -> Result<CompletedAction, ExecutorError> {
    let start = Instant::now();
    tracing::info!(
        "running step {} [{}] with tool {}",
        action.step.as_ref().map(value_to_string).unwrap_or_default(),
        action.name,
        action.toolname
    );
    tracing::debug!("step {} prompt: {}", action.name, action.prompt);

    let output = handler
        .invoke(action, llm)
        .map_err(|source| ExecutorError::Tool {
            node: action.name.clone(),
            tool: action.toolname.clone(),
            source,
        })?;
    let (output, history) = AgentExecutor::parser_output(output, action);

    let elapsed = start.elapsed();
    tracing::info!("step {} finished in {:.3}s", action.name, elapsed.as_secs_f64());
    Ok(CompletedAction {
        name: action.name.clone(),
        output,
        history,
        elapsed,
    })
}

fn stalled(state: &ExecutorState) -> ExecutorError {
    ExecutorError::Stalled {
        remaining: state.remaining_tasks.iter().cloned().collect(),
    }
}

fn record_completion(log: Option<&RunLog>, state: &ExecutorState, done: &CompletedAction) {
    let Some(log) = log else { return };
    let tool = state
        .sop_graph
        .get(&done.name)
        .map(|n| n.toolname.clone())
        .unwrap_or_default();
    log.record(RunEvent::StepCompleted {
        run_id: log.run_id().to_string(),
        step: done.name.clone(),
        tool,
        duration_seconds: done.elapsed.as_secs_f64(),
        output_hash: hasher::hash_value(&done.output),
    });
}

fn close_log(
    log: Option<&RunLog>,
    state: &ExecutorState,
    started: Instant,
    outcome: &Result<(), ExecutorError>,
) {
    let Some(log) = log else { return };
    let run_id = log.run_id().to_string();
    match outcome {
        Ok(()) => log.record(RunEvent::RunCompleted {
            run_id,
            steps_executed: state.executed_tasks().count(),
            steps_skipped: state.skipped_tasks.len(),
            total_seconds: started.elapsed().as_secs_f64(),
        }),
        Err(e) => {
            tracing::error!("run {} failed: {}", log.run_id(), e);
            log.record(RunEvent::RunFailed {
                run_id,
                error: e.to_string(),
            })
        }
    }
}
