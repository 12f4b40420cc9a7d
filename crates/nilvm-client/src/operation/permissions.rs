//! Read, amend and replace value set permissions

use super::state::{Lifecycle, OperationState};
use super::Operation;
use crate::client::VmClient;
use crate::fanout::{Coordinator, NodeInvoker, PerNodeRequest};
use async_trait::async_trait;
use nilvm_core::effects::PermissionsRpc;
use nilvm_core::messages::{
    OverwritePermissionsRequest, RetrievePermissionsRequest, UpdatePermissionsRequest,
};
use nilvm_core::{
    ComputePermissionCommand, NilError, PermissionCommand, PriceQuoteRequest, Result, ValuesId,
    ValuesPermissions,
};
use std::sync::Arc;

const RETRIEVE_PERMISSIONS: &str = "retrieve_permissions";
const UPDATE_PERMISSIONS: &str = "update_permissions";
const OVERWRITE_PERMISSIONS: &str = "overwrite_permissions";

fn required(values_id: Option<ValuesId>) -> Result<ValuesId> {
    values_id.ok_or_else(|| NilError::invalid("values id is required"))
}

/// Identifies the value set whose permissions to read
#[derive(Debug, Clone, Default)]
pub struct RetrievePermissionsConfig {
    /// Value set
    pub values_id: Option<ValuesId>,
}

impl RetrievePermissionsConfig {
    /// Read the permissions of `id`
    pub fn id(mut self, id: ValuesId) -> Self {
        self.values_id = Some(id);
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<RetrievePermissions> {
        Ok(RetrievePermissions {
            client: client.clone(),
            values_id: required(self.values_id)?,
        })
    }
}

/// Reads permissions from every node; all nodes must agree
#[derive(Debug)]
pub struct RetrievePermissions {
    client: VmClient,
    values_id: ValuesId,
}

impl RetrievePermissions {
    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<ValuesPermissions> {
        lifecycle.advance(OperationState::Paying);
        let receipt = self
            .client
            .payer()
            .pay_for_operation(PriceQuoteRequest::RetrievePermissions {
                values_id: self.values_id,
            })
            .await?;

        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::uniform(
            self.client.nodes(),
            RetrievePermissionsRequest {
                signed_receipt: Arc::new(receipt),
            },
        );
        Coordinator::new(RETRIEVE_PERMISSIONS, self.client.retry_policy())
            .execute(&RetrievePermissionsInvoker, &requests, lifecycle)
            .await
    }
}

#[async_trait]
impl Operation for RetrievePermissions {
    type Output = ValuesPermissions;

    fn name(&self) -> &'static str {
        RETRIEVE_PERMISSIONS
    }

    async fn invoke(&self) -> Result<ValuesPermissions> {
        let mut lifecycle = Lifecycle::new(RETRIEVE_PERMISSIONS);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct RetrievePermissionsInvoker;

#[async_trait]
impl NodeInvoker<RetrievePermissionsRequest> for RetrievePermissionsInvoker {
    type Output = ValuesPermissions;

    async fn invoke(
        &self,
        request: &PerNodeRequest<RetrievePermissionsRequest>,
    ) -> Result<ValuesPermissions> {
        let permissions = request
            .node
            .transport
            .retrieve_permissions(&request.payload)
            .await?;
        tracing::debug!(node = %request.party(), owner = %permissions.owner, "Retrieved permissions");
        Ok(permissions)
    }
}

/// Grants and revocations to apply to a value set
#[derive(Debug, Clone, Default)]
pub struct UpdatePermissionsConfig {
    /// Value set
    pub values_id: Option<ValuesId>,
    /// Changes to the retrieve list
    pub retrieve: PermissionCommand,
    /// Changes to the update list
    pub update: PermissionCommand,
    /// Changes to the delete list
    pub delete: PermissionCommand,
    /// Changes to compute grants
    pub compute: ComputePermissionCommand,
}

impl UpdatePermissionsConfig {
    /// Amend the permissions of `id`
    pub fn id(mut self, id: ValuesId) -> Self {
        self.values_id = Some(id);
        self
    }

    /// Change who may retrieve
    pub fn retrieve(mut self, command: PermissionCommand) -> Self {
        self.retrieve = command;
        self
    }

    /// Change who may update
    pub fn update(mut self, command: PermissionCommand) -> Self {
        self.update = command;
        self
    }

    /// Change who may delete
    pub fn delete(mut self, command: PermissionCommand) -> Self {
        self.delete = command;
        self
    }

    /// Change which programs users may run
    pub fn compute(mut self, command: ComputePermissionCommand) -> Self {
        self.compute = command;
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<UpdatePermissions> {
        let values_id = required(self.values_id)?;
        self.retrieve.validate()?;
        self.update.validate()?;
        self.delete.validate()?;
        self.compute.validate()?;
        if self.retrieve.is_empty()
            && self.update.is_empty()
            && self.delete.is_empty()
            && self.compute.is_empty()
        {
            return Err(NilError::invalid("no permission changes given"));
        }

        Ok(UpdatePermissions {
            client: client.clone(),
            values_id,
            retrieve: self.retrieve,
            update: self.update,
            delete: self.delete,
            compute: self.compute,
        })
    }
}

/// Applies grants and revocations on every node
#[derive(Debug)]
pub struct UpdatePermissions {
    client: VmClient,
    values_id: ValuesId,
    retrieve: PermissionCommand,
    update: PermissionCommand,
    delete: PermissionCommand,
    compute: ComputePermissionCommand,
}

impl UpdatePermissions {
    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<ValuesId> {
        lifecycle.advance(OperationState::Paying);
        let receipt = self
            .client
            .payer()
            .pay_for_operation(PriceQuoteRequest::UpdatePermissions {
                values_id: self.values_id,
            })
            .await?;

        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::uniform(
            self.client.nodes(),
            UpdatePermissionsRequest {
                signed_receipt: Arc::new(receipt),
                retrieve: self.retrieve.clone(),
                update: self.update.clone(),
                delete: self.delete.clone(),
                compute: self.compute.clone(),
            },
        );
        Coordinator::new(UPDATE_PERMISSIONS, self.client.retry_policy())
            .execute(&UpdatePermissionsInvoker, &requests, lifecycle)
            .await?;
        Ok(self.values_id)
    }
}

#[async_trait]
impl Operation for UpdatePermissions {
    type Output = ValuesId;

    fn name(&self) -> &'static str {
        UPDATE_PERMISSIONS
    }

    async fn invoke(&self) -> Result<ValuesId> {
        let mut lifecycle = Lifecycle::new(UPDATE_PERMISSIONS);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct UpdatePermissionsInvoker;

#[async_trait]
impl NodeInvoker<UpdatePermissionsRequest> for UpdatePermissionsInvoker {
    type Output = ();

    async fn invoke(&self, request: &PerNodeRequest<UpdatePermissionsRequest>) -> Result<()> {
        request
            .node
            .transport
            .update_permissions(&request.payload)
            .await?;
        tracing::debug!(node = %request.party(), "Updated permissions");
        Ok(())
    }
}

/// Complete permissions replacing those of a value set
#[derive(Debug, Clone, Default)]
pub struct OverwritePermissionsConfig {
    /// Value set
    pub values_id: Option<ValuesId>,
    /// New permissions
    pub permissions: Option<ValuesPermissions>,
}

impl OverwritePermissionsConfig {
    /// Replace the permissions of `id`
    pub fn id(mut self, id: ValuesId) -> Self {
        self.values_id = Some(id);
        self
    }

    /// Set the new permissions
    pub fn permissions(mut self, permissions: ValuesPermissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Validate into a runnable operation
    pub fn build(self, client: &VmClient) -> Result<OverwritePermissions> {
        let values_id = required(self.values_id)?;
        let permissions = self
            .permissions
            .ok_or_else(|| NilError::invalid("permissions are required"))?;
        Ok(OverwritePermissions {
            client: client.clone(),
            values_id,
            permissions,
        })
    }
}

/// Replaces permissions on every node
#[derive(Debug)]
pub struct OverwritePermissions {
    client: VmClient,
    values_id: ValuesId,
    permissions: ValuesPermissions,
}

impl OverwritePermissions {
    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<ValuesPermissions> {
        lifecycle.advance(OperationState::Paying);
        let receipt = self
            .client
            .payer()
            .pay_for_operation(PriceQuoteRequest::OverwritePermissions {
                values_id: self.values_id,
            })
            .await?;

        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::uniform(
            self.client.nodes(),
            OverwritePermissionsRequest {
                signed_receipt: Arc::new(receipt),
                permissions: self.permissions.clone(),
            },
        );
        Coordinator::new(OVERWRITE_PERMISSIONS, self.client.retry_policy())
            .execute(&OverwritePermissionsInvoker, &requests, lifecycle)
            .await?;
        Ok(self.permissions.clone())
    }
}

#[async_trait]
impl Operation for OverwritePermissions {
    type Output = ValuesPermissions;

    fn name(&self) -> &'static str {
        OVERWRITE_PERMISSIONS
    }

    async fn invoke(&self) -> Result<ValuesPermissions> {
        let mut lifecycle = Lifecycle::new(OVERWRITE_PERMISSIONS);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct OverwritePermissionsInvoker;

#[async_trait]
impl NodeInvoker<OverwritePermissionsRequest> for OverwritePermissionsInvoker {
    type Output = ();

    async fn invoke(&self, request: &PerNodeRequest<OverwritePermissionsRequest>) -> Result<()> {
        request
            .node
            .transport
            .overwrite_permissions(&request.payload)
            .await?;
        tracing::debug!(node = %request.party(), "Overwrote permissions");
        Ok(())
    }
}
