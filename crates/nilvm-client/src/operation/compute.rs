//! Invoke programs and collect their results

use super::state::{Lifecycle, OperationState};
use super::Operation;
use crate::client::VmClient;
use crate::fanout::{Coordinator, NodeInvoker, PerNodeRequest};
use async_trait::async_trait;
use futures::StreamExt;
use nilvm_core::effects::{ComputeRpc, SecretMasker};
use nilvm_core::messages::{ComputeResultState, InvokeComputeRequest, RetrieveResultsRequest};
use nilvm_core::{
    ComputeId, EncodedValues, InputBinding, NadaValue, NadaValues, NetworkFailure, NilError,
    OutputBinding, PartyShares, PriceQuoteRequest, ProgramId, Result, TransportError, UserId,
    ValuesId,
};
use std::collections::BTreeSet;
use std::sync::Arc;

const INVOKE_COMPUTE: &str = "invoke_compute";
const RETRIEVE_COMPUTE_RESULT: &str = "retrieve_compute_result";

/// Program run request
#[derive(Debug, Clone, Default)]
pub struct InvokeComputeConfig {
    /// Program to run
    pub program_id: Option<ProgramId>,
    /// Stored value sets used as inputs
    pub value_ids: Vec<ValuesId>,
    /// Inputs supplied with the invocation
    pub compute_time_values: NadaValues,
    /// Which user provides each input party
    pub input_bindings: Vec<InputBinding>,
    /// Which users receive each output party
    pub output_bindings: Vec<OutputBinding>,
}

impl InvokeComputeConfig {
    /// Run `id`
    pub fn program(mut self, id: ProgramId) -> Self {
        self.program_id = Some(id);
        self
    }

    /// Use stored value sets as inputs
    pub fn value_ids(mut self, ids: impl IntoIterator<Item = ValuesId>) -> Self {
        self.value_ids.extend(ids);
        self
    }

    /// Supply an input with the invocation
    pub fn compute_time_value(mut self, name: impl Into<String>, value: NadaValue) -> Self {
        self.compute_time_values.insert(name, value);
        self
    }

    /// Bind an input party to a user
    pub fn input_party(mut self, party: impl Into<String>, user: UserId) -> Self {
        self.input_bindings.push(InputBinding {
            party: party.into(),
            user,
        });
        self
    }

    /// Bind an output party to its readers
    pub fn output_party(mut self, party: impl Into<String>, users: Vec<UserId>) -> Self {
        self.output_bindings.push(OutputBinding {
            party: party.into(),
            users,
        });
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<InvokeCompute> {
        let program_id = self
            .program_id
            .ok_or_else(|| NilError::invalid("program id is required"))?;

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = self.value_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(NilError::invalid(format!("values id {duplicate} given twice")));
        }
        let party_names = self
            .input_bindings
            .iter()
            .map(|b| b.party.as_str())
            .chain(self.output_bindings.iter().map(|b| b.party.as_str()));
        for name in party_names {
            if name.is_empty() {
                return Err(NilError::invalid("party name cannot be empty"));
            }
        }

        Ok(InvokeCompute {
            client: client.clone(),
            program_id,
            value_ids: self.value_ids,
            compute_time_values: self.compute_time_values,
            input_bindings: self.input_bindings,
            output_bindings: self.output_bindings,
        })
    }
}

/// Starts a computation on every node
#[derive(Debug)]
pub struct InvokeCompute {
    client: VmClient,
    program_id: ProgramId,
    value_ids: Vec<ValuesId>,
    compute_time_values: NadaValues,
    input_bindings: Vec<InputBinding>,
    output_bindings: Vec<OutputBinding>,
}

impl InvokeCompute {
    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<ComputeId> {
        let masker = self.client.masker();
        let shares = masker.mask(&self.compute_time_values)?;
        let price = PriceQuoteRequest::InvokeCompute {
            program_id: self.program_id.clone(),
            values_payload_size: masker.values_size(&self.compute_time_values)?,
        };

        lifecycle.advance(OperationState::Paying);
        let receipt = Arc::new(self.client.payer().pay_for_operation(price).await?);

        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::sharded(self.client.nodes(), shares, |bincode_values| {
            InvokeComputeRequest {
                signed_receipt: Arc::clone(&receipt),
                value_ids: self.value_ids.clone(),
                bincode_values,
                input_bindings: self.input_bindings.clone(),
                output_bindings: self.output_bindings.clone(),
            }
        })?;

        Coordinator::new(INVOKE_COMPUTE, self.client.retry_policy())
            .execute(&InvokeComputeInvoker, &requests, lifecycle)
            .await
    }
}

#[async_trait]
impl Operation for InvokeCompute {
    type Output = ComputeId;

    fn name(&self) -> &'static str {
        INVOKE_COMPUTE
    }

    async fn invoke(&self) -> Result<ComputeId> {
        let mut lifecycle = Lifecycle::new(INVOKE_COMPUTE);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct InvokeComputeInvoker;

#[async_trait]
impl NodeInvoker<InvokeComputeRequest> for InvokeComputeInvoker {
    type Output = ComputeId;

    async fn invoke(&self, request: &PerNodeRequest<InvokeComputeRequest>) -> Result<ComputeId> {
        let response = request
            .node
            .transport
            .invoke_compute(&request.payload)
            .await?;
        let id = ComputeId::from_slice(&response.compute_id)?;
        tracing::debug!(node = %request.party(), compute_id = %id, "Computation started");
        Ok(id)
    }
}

/// Identifies the computation whose result to collect
#[derive(Debug, Clone, Default)]
pub struct RetrieveComputeResultConfig {
    /// Computation to follow
    pub compute_id: Option<ComputeId>,
}

impl RetrieveComputeResultConfig {
    /// Follow `id`
    pub fn id(mut self, id: ComputeId) -> Self {
        self.compute_id = Some(id);
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<RetrieveComputeResult> {
        let compute_id = self
            .compute_id
            .ok_or_else(|| NilError::invalid("compute id is required"))?;
        Ok(RetrieveComputeResult {
            client: client.clone(),
            compute_id,
        })
    }
}

/// Waits for a computation on every node and unmasks its outputs; not priced
#[derive(Debug)]
pub struct RetrieveComputeResult {
    client: VmClient,
    compute_id: ComputeId,
}

impl RetrieveComputeResult {
    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<NadaValues> {
        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::uniform(
            self.client.nodes(),
            RetrieveResultsRequest {
                compute_id: self.compute_id.to_bytes(),
            },
        );
        let shares = Coordinator::new(RETRIEVE_COMPUTE_RESULT, self.client.retry_policy())
            .gather(&ComputeResultInvoker, &requests)
            .await?;

        lifecycle.advance(OperationState::Collapsing);
        let shares = shares
            .into_iter()
            .map(|(party, shares)| PartyShares { party, shares })
            .collect();
        let values = self.client.masker().unmask(shares)?;
        tracing::info!(compute_id = %self.compute_id, outputs = values.len(), "Retrieved compute result");
        Ok(values)
    }
}

#[async_trait]
impl Operation for RetrieveComputeResult {
    type Output = NadaValues;

    fn name(&self) -> &'static str {
        RETRIEVE_COMPUTE_RESULT
    }

    async fn invoke(&self) -> Result<NadaValues> {
        let mut lifecycle = Lifecycle::new(RETRIEVE_COMPUTE_RESULT);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct ComputeResultInvoker;

#[async_trait]
impl NodeInvoker<RetrieveResultsRequest> for ComputeResultInvoker {
    type Output = EncodedValues;

    /// Follows the result stream until the node reports success
    async fn invoke(
        &self,
        request: &PerNodeRequest<RetrieveResultsRequest>,
    ) -> Result<EncodedValues> {
        let mut stream = request
            .node
            .transport
            .retrieve_results(&request.payload)
            .await?;

        while let Some(state) = stream.next().await {
            match state? {
                ComputeResultState::WaitingComputation => {
                    tracing::debug!(node = %request.party(), "Waiting for computation");
                }
                ComputeResultState::Success { bincode_values } => {
                    tracing::debug!(
                        node = %request.party(),
                        size = bincode_values.len(),
                        "Computation finished"
                    );
                    return Ok(bincode_values);
                }
                ComputeResultState::Error { message } => {
                    return Err(NilError::compute(message));
                }
            }
        }

        Err(TransportError::network(
            NetworkFailure::Aborted,
            "result stream closed before the computation finished",
        )
        .into())
    }
}
