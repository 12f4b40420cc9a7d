//! Fan-out/collapse coordination
//!
//! Sends one request to every node concurrently, retries each leg on its own,
//! waits for all of them and reduces the per-node replies to a single result.

use super::invoker::NodeInvoker;
use super::requests::PerNodeRequest;
use crate::operation::{Lifecycle, OperationState};
use futures::future::join_all;
use nilvm_core::effects::RetryPolicy;
use nilvm_core::{NilError, PartyId, Result};
use std::fmt::Debug;

/// Reduce per-node results to one, requiring every node to agree
pub fn collapse<T: PartialEq + Debug>(results: Vec<T>) -> Result<T> {
    let mut results = results.into_iter();
    let first = results.next().ok_or(NilError::EmptyResult)?;
    for other in results {
        if other != first {
            return Err(NilError::disagreement(format!("{first:?} != {other:?}")));
        }
    }
    Ok(first)
}

/// Runs a request against the whole cluster under a retry policy
#[derive(Debug, Clone)]
pub struct Coordinator {
    label: &'static str,
    retry: RetryPolicy,
}

impl Coordinator {
    /// Create a coordinator; `label` names the operation in logs
    pub fn new(label: &'static str, retry: RetryPolicy) -> Self {
        Self { label, retry }
    }

    /// Operation label
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Call every node and return each node's result, in request order
    ///
    /// All legs run to completion before the outcome is decided. If any leg
    /// failed, the error of the first failed leg is returned.
    pub async fn gather<R, I>(
        &self,
        invoker: &I,
        requests: &[PerNodeRequest<R>],
    ) -> Result<Vec<(PartyId, I::Output)>>
    where
        R: Send + Sync,
        I: NodeInvoker<R>,
    {
        let legs = requests.iter().map(|request| async move {
            let party = request.party();
            let label = format!("{}@{party}", self.label);
            let output = self
                .retry
                .retry_if_recoverable(&label, || invoker.invoke(request))
                .await;
            (party, output)
        });

        let mut results = Vec::with_capacity(requests.len());
        let mut failure = None;
        for (party, outcome) in join_all(legs).await {
            match outcome {
                Ok(output) => results.push((party, output)),
                Err(err) => {
                    tracing::debug!(
                        operation = self.label,
                        node = %party,
                        error = %err,
                        "Node leg failed"
                    );
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }

    /// Call every node and collapse the replies into one agreed result
    ///
    /// `lifecycle` enters [`OperationState::Collapsing`] once every leg has
    /// answered, so a disagreement is reported from that stage.
    pub async fn execute<R, I>(
        &self,
        invoker: &I,
        requests: &[PerNodeRequest<R>],
        lifecycle: &mut Lifecycle,
    ) -> Result<I::Output>
    where
        R: Send + Sync,
        I: NodeInvoker<R>,
        I::Output: PartialEq + Debug,
    {
        let outcome = match self.gather(invoker, requests).await {
            Ok(results) => {
                lifecycle.advance(OperationState::Collapsing);
                collapse(results.into_iter().map(|(_, output)| output).collect())
            }
            Err(err) => Err(err),
        };

        match &outcome {
            Ok(_) => tracing::info!(
                operation = self.label,
                nodes = requests.len(),
                "Operation succeeded"
            ),
            Err(err) => tracing::error!(
                operation = self.label,
                nodes = requests.len(),
                error = %err,
                "Operation failed"
            ),
        }
        outcome
    }
}
