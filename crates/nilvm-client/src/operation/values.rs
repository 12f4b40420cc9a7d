//! Store, retrieve and delete values

use super::state::{Lifecycle, OperationState};
use super::Operation;
use crate::client::VmClient;
use crate::fanout::{Coordinator, NodeInvoker, PerNodeRequest};
use async_trait::async_trait;
use nilvm_core::effects::{SecretMasker, ValuesRpc};
use nilvm_core::messages::{DeleteValuesRequest, RetrieveValuesRequest, StoreValuesRequest};
use nilvm_core::{
    EncodedValues, NadaValue, NadaValues, NilError, PartyShares, PriceQuoteRequest, Result,
    TtlDays, ValuesId, ValuesPermissions,
};
use std::sync::Arc;

const STORE_VALUES: &str = "store_values";
const RETRIEVE_VALUES: &str = "retrieve_values";
const DELETE_VALUES: &str = "delete_values";

/// Values to store, or to write over an existing value set
#[derive(Debug, Clone, Default)]
pub struct StoreValuesConfig {
    /// Named values to store
    pub values: NadaValues,
    /// Retention period in days
    pub ttl_days: u32,
    /// Permissions to attach; nodes apply their defaults when absent
    pub permissions: Option<ValuesPermissions>,
    /// Existing value set to update instead of creating a new one
    pub update_id: Option<ValuesId>,
}

impl StoreValuesConfig {
    /// Add a named value
    pub fn value(mut self, name: impl Into<String>, value: NadaValue) -> Self {
        self.values.insert(name, value);
        self
    }

    /// Set the retention period
    pub fn ttl(mut self, days: u32) -> Self {
        self.ttl_days = days;
        self
    }

    /// Attach permissions
    pub fn permissions(mut self, permissions: ValuesPermissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Update an existing value set
    pub fn update(mut self, id: ValuesId) -> Self {
        self.update_id = Some(id);
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<StoreValues> {
        if self.values.is_empty() {
            return Err(NilError::invalid("no values to store"));
        }
        let ttl = TtlDays::new(self.ttl_days)?;
        Ok(StoreValues {
            client: client.clone(),
            values: self.values,
            ttl,
            permissions: self.permissions,
            update_id: self.update_id,
        })
    }
}

/// Masks values and stores one share set on every node
#[derive(Debug)]
pub struct StoreValues {
    client: VmClient,
    values: NadaValues,
    ttl: TtlDays,
    permissions: Option<ValuesPermissions>,
    update_id: Option<ValuesId>,
}

impl StoreValues {
    fn price(&self) -> Result<PriceQuoteRequest> {
        let masker = self.client.masker();
        let classification = masker.classify(&self.values)?;
        Ok(PriceQuoteRequest::StoreValues {
            particles_count: classification.particles,
            secret_shared_count: classification.shares,
            public_values_count: classification.public,
            ttl_days: self.ttl.days(),
            payload_size: masker.values_size(&self.values)?,
        })
    }

    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<ValuesId> {
        let shares = self.client.masker().mask(&self.values)?;
        let price = self.price()?;

        lifecycle.advance(OperationState::Paying);
        let receipt = Arc::new(self.client.payer().pay_for_operation(price).await?);

        lifecycle.advance(OperationState::Requesting);
        let update_identifier = self.update_id.map(|id| id.to_bytes());
        let requests = PerNodeRequest::sharded(self.client.nodes(), shares, |bincode_values| {
            StoreValuesRequest {
                signed_receipt: Arc::clone(&receipt),
                bincode_values,
                permissions: self.permissions.clone(),
                update_identifier: update_identifier.clone(),
            }
        })?;

        Coordinator::new(STORE_VALUES, self.client.retry_policy())
            .execute(&StoreValuesInvoker, &requests, lifecycle)
            .await
    }
}

#[async_trait]
impl Operation for StoreValues {
    type Output = ValuesId;

    fn name(&self) -> &'static str {
        STORE_VALUES
    }

    async fn invoke(&self) -> Result<ValuesId> {
        let mut lifecycle = Lifecycle::new(STORE_VALUES);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct StoreValuesInvoker;

#[async_trait]
impl NodeInvoker<StoreValuesRequest> for StoreValuesInvoker {
    type Output = ValuesId;

    async fn invoke(&self, request: &PerNodeRequest<StoreValuesRequest>) -> Result<ValuesId> {
        let response = request.node.transport.store_values(&request.payload).await?;
        let id = ValuesId::from_slice(&response.values_id)?;
        tracing::debug!(node = %request.party(), values_id = %id, "Stored values");
        Ok(id)
    }
}

/// Identifies the value set to retrieve
#[derive(Debug, Clone, Default)]
pub struct RetrieveValuesConfig {
    /// Value set to retrieve
    pub values_id: Option<ValuesId>,
}

impl RetrieveValuesConfig {
    /// Retrieve `id`
    pub fn id(mut self, id: ValuesId) -> Self {
        self.values_id = Some(id);
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<RetrieveValues> {
        let values_id = self
            .values_id
            .ok_or_else(|| NilError::invalid("values id is required"))?;
        Ok(RetrieveValues {
            client: client.clone(),
            values_id,
        })
    }
}

/// Fetches every node's shares and unmasks them
#[derive(Debug)]
pub struct RetrieveValues {
    client: VmClient,
    values_id: ValuesId,
}

impl RetrieveValues {
    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<NadaValues> {
        lifecycle.advance(OperationState::Paying);
        let receipt = self
            .client
            .payer()
            .pay_for_operation(PriceQuoteRequest::RetrieveValues {
                values_id: self.values_id,
            })
            .await?;

        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::uniform(
            self.client.nodes(),
            RetrieveValuesRequest {
                signed_receipt: Arc::new(receipt),
            },
        );
        let shares = Coordinator::new(RETRIEVE_VALUES, self.client.retry_policy())
            .gather(&RetrieveValuesInvoker, &requests)
            .await?;

        lifecycle.advance(OperationState::Collapsing);
        let shares = shares
            .into_iter()
            .map(|(party, shares)| PartyShares { party, shares })
            .collect();
        let values = self.client.masker().unmask(shares)?;
        tracing::info!(values_id = %self.values_id, count = values.len(), "Retrieved values");
        Ok(values)
    }
}

#[async_trait]
impl Operation for RetrieveValues {
    type Output = NadaValues;

    fn name(&self) -> &'static str {
        RETRIEVE_VALUES
    }

    async fn invoke(&self) -> Result<NadaValues> {
        let mut lifecycle = Lifecycle::new(RETRIEVE_VALUES);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct RetrieveValuesInvoker;

#[async_trait]
impl NodeInvoker<RetrieveValuesRequest> for RetrieveValuesInvoker {
    type Output = EncodedValues;

    async fn invoke(
        &self,
        request: &PerNodeRequest<RetrieveValuesRequest>,
    ) -> Result<EncodedValues> {
        let response = request
            .node
            .transport
            .retrieve_values(&request.payload)
            .await?;
        tracing::debug!(
            node = %request.party(),
            size = response.bincode_values.len(),
            "Retrieved shares"
        );
        Ok(response.bincode_values)
    }
}

/// Identifies the value set to delete
#[derive(Debug, Clone, Default)]
pub struct DeleteValuesConfig {
    /// Value set to delete
    pub values_id: Option<ValuesId>,
}

impl DeleteValuesConfig {
    /// Delete `id`
    pub fn id(mut self, id: ValuesId) -> Self {
        self.values_id = Some(id);
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<DeleteValues> {
        let values_id = self
            .values_id
            .ok_or_else(|| NilError::invalid("values id is required"))?;
        Ok(DeleteValues {
            client: client.clone(),
            values_id,
        })
    }
}

/// Deletes a value set from every node; not priced
#[derive(Debug)]
pub struct DeleteValues {
    client: VmClient,
    values_id: ValuesId,
}

impl DeleteValues {
    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<ValuesId> {
        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::uniform(
            self.client.nodes(),
            DeleteValuesRequest {
                values_id: self.values_id.to_bytes(),
            },
        );
        Coordinator::new(DELETE_VALUES, self.client.retry_policy())
            .execute(&DeleteValuesInvoker, &requests, lifecycle)
            .await?;
        Ok(self.values_id)
    }
}

#[async_trait]
impl Operation for DeleteValues {
    type Output = ValuesId;

    fn name(&self) -> &'static str {
        DELETE_VALUES
    }

    async fn invoke(&self) -> Result<ValuesId> {
        let mut lifecycle = Lifecycle::new(DELETE_VALUES);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct DeleteValuesInvoker;

#[async_trait]
impl NodeInvoker<DeleteValuesRequest> for DeleteValuesInvoker {
    type Output = ();

    async fn invoke(&self, request: &PerNodeRequest<DeleteValuesRequest>) -> Result<()> {
        request.node.transport.delete_values(&request.payload).await?;
        tracing::debug!(node = %request.party(), "Deleted values");
        Ok(())
    }
}
