//! Bounded, ordered fan-out of analysis calls.
//!
//! Calls run on at most `concurrency` slots. Results land in index-addressed
//! slots, so callers see them in input order regardless of completion order.
//! Cancellation is raced against every in-flight call.

use super::stage::StageContext;
use super::state::StageWarning;
use super::StageId;
use crate::analysis::{AnalysisOutput, AnalysisTask, TaskInput};
use crate::errors::{AnalysisError, PipelineError};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::warn;

/// Outcome of one fan-out: successes and failures, each in input order.
#[derive(Debug)]
pub struct ChunkResults<T> {
    pub outputs: Vec<(usize, T)>,
    pub failures: Vec<(usize, AnalysisError)>,
}

impl<T> ChunkResults<T> {
    pub fn len(&self) -> usize {
        self.outputs.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when there was at least one call and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.outputs.is_empty() && !self.failures.is_empty()
    }

    pub fn values(self) -> impl Iterator<Item = T> {
        self.outputs.into_iter().map(|(_, value)| value)
    }

    /// One warning per failed call, naming what the call was for.
    pub fn warnings(&self, stage: StageId, what: &str) -> Vec<StageWarning> {
        self.failures
            .iter()
            .map(|(index, e)| StageWarning::for_chunk(stage, *index, format!("{} analysis failed: {}", what, e)))
            .collect()
    }
}

async fn call_with_timeout(
    analysis: &dyn AnalysisTask,
    input: TaskInput,
    timeout: Duration,
) -> Result<AnalysisOutput, AnalysisError> {
    let task = input.task;
    match tokio::time::timeout(timeout, analysis.invoke(input)).await {
        Ok(result) => result,
        Err(_) => Err(AnalysisError::Unavailable(format!(
            "{} timed out after {:?}",
            task, timeout
        ))),
    }
}

impl StageContext {
    /// Run one call per input and decode each output.
    ///
    /// Only cancellation is an error; analysis failures are collected.
    pub async fn fan_out<T, F>(
        &self,
        stage: StageId,
        inputs: Vec<TaskInput>,
        decode: F,
    ) -> Result<ChunkResults<T>, PipelineError>
    where
        T: Send,
        F: Fn(AnalysisOutput) -> Result<T, AnalysisError> + Sync,
    {
        let analysis = self.analysis.as_ref();
        let timeout = self.settings.call_timeout;
        let decode = &decode;

        let mut slots: Vec<Option<Result<T, AnalysisError>>> = inputs.iter().map(|_| None).collect();
        let mut pending = stream::iter(inputs.into_iter().enumerate())
            .map(|(index, input)| async move {
                let result = call_with_timeout(analysis, input, timeout).await.and_then(decode);
                (index, result)
            })
            .buffer_unordered(self.settings.concurrency.max(1));

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                next = pending.next() => match next {
                    Some((index, result)) => slots[index] = Some(result),
                    None => break,
                },
            }
        }

        let mut results = ChunkResults {
            outputs: Vec::new(),
            failures: Vec::new(),
        };
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(value)) => results.outputs.push((index, value)),
                Some(Err(e)) => {
                    warn!("[{}] call {} failed: {}", stage, index, e);
                    results.failures.push((index, e));
                }
                None => results.failures.push((
                    index,
                    AnalysisError::Unavailable("call did not complete".to_string()),
                )),
            }
        }
        Ok(results)
    }

    /// Run a single document-level call.
    ///
    /// The outer error is cancellation, the inner one the call's own failure.
    pub async fn invoke<T, F>(
        &self,
        stage: StageId,
        input: TaskInput,
        decode: F,
    ) -> Result<Result<T, AnalysisError>, PipelineError>
    where
        T: Send,
        F: Fn(AnalysisOutput) -> Result<T, AnalysisError> + Sync,
    {
        let call = call_with_timeout(self.analysis.as_ref(), input, self.settings.call_timeout);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            result = call => {
                let result = result.and_then(decode);
                if let Err(e) = &result {
                    warn!("[{}] document-level call failed: {}", stage, e);
                }
                Ok(result)
            }
        }
    }
}
