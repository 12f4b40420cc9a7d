//! Upload compiled programs

use super::state::{Lifecycle, OperationState};
use super::Operation;
use crate::client::VmClient;
use crate::fanout::{Coordinator, NodeInvoker, PerNodeRequest};
use async_trait::async_trait;
use nilvm_core::effects::{ProgramsRpc, SecretMasker};
use nilvm_core::messages::StoreProgramRequest;
use nilvm_core::{NilError, PriceQuoteRequest, ProgramId, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const STORE_PROGRAM: &str = "store_program";

/// Longest accepted program name, in characters
pub const MAX_PROGRAM_NAME_LEN: usize = 100;

/// Program to upload
#[derive(Debug, Clone, Default)]
pub struct StoreProgramConfig {
    /// Program name
    pub name: String,
    /// Compiled program bytes
    pub program: Vec<u8>,
}

impl StoreProgramConfig {
    /// Set the program name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the compiled program
    pub fn program(mut self, program: Vec<u8>) -> Self {
        self.program = program;
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<StoreProgram> {
        let length = self.name.chars().count();
        if length == 0 || length > MAX_PROGRAM_NAME_LEN {
            return Err(NilError::invalid(format!(
                "program name must be 1 to {MAX_PROGRAM_NAME_LEN} characters, got {length}"
            )));
        }
        if self.program.is_empty() {
            return Err(NilError::invalid("program is empty"));
        }
        Ok(StoreProgram {
            client: client.clone(),
            name: self.name,
            program: self.program,
        })
    }
}

/// Uploads a program to every node
#[derive(Debug)]
pub struct StoreProgram {
    client: VmClient,
    name: String,
    program: Vec<u8>,
}

impl StoreProgram {
    fn price(&self) -> Result<PriceQuoteRequest> {
        let metadata = self.client.masker().program_metadata(&self.program)?;
        Ok(PriceQuoteRequest::StoreProgram {
            name: self.name.clone(),
            contents_sha256: Sha256::digest(&self.program).to_vec(),
            metadata,
        })
    }

    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<ProgramId> {
        let price = self.price()?;

        lifecycle.advance(OperationState::Paying);
        let receipt = self.client.payer().pay_for_operation(price).await?;

        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::uniform(
            self.client.nodes(),
            StoreProgramRequest {
                signed_receipt: Arc::new(receipt),
                program: self.program.clone(),
            },
        );
        let id = Coordinator::new(STORE_PROGRAM, self.client.retry_policy())
            .execute(&StoreProgramInvoker, &requests, lifecycle)
            .await?;
        ProgramId::new(id)
    }
}

#[async_trait]
impl Operation for StoreProgram {
    type Output = ProgramId;

    fn name(&self) -> &'static str {
        STORE_PROGRAM
    }

    async fn invoke(&self) -> Result<ProgramId> {
        let mut lifecycle = Lifecycle::new(STORE_PROGRAM);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct StoreProgramInvoker;

#[async_trait]
impl NodeInvoker<StoreProgramRequest> for StoreProgramInvoker {
    type Output = String;

    async fn invoke(&self, request: &PerNodeRequest<StoreProgramRequest>) -> Result<String> {
        let response = request.node.transport.store_program(&request.payload).await?;
        tracing::debug!(node = %request.party(), program_id = %response.program_id, "Stored program");
        Ok(response.program_id)
    }
}
