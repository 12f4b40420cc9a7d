//! JSON-over-HTTP node transport
//!
//! Each RPC is a `POST` to `<endpoint>/nillion.<service>.v1.<Service>/<Method>`
//! with a JSON body. Failed calls carry a `{"code", "message"}` body; when it
//! is missing the HTTP status picks the code. The compute result stream is
//! returned as newline-delimited JSON.

use crate::auth::{TokenAuthManager, AUTH_HEADER};
use crate::cluster::TransportFactory;
use async_trait::async_trait;
use nilvm_core::effects::rpc::*;
use nilvm_core::messages::*;
use nilvm_core::types::*;
use nilvm_core::{ClientConfig, NetworkFailure, NilError, Result, RpcCode, TransportError};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Error body returned by a node
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: RpcCode,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct Empty {}

/// Transport bound to one node endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    auth: Option<(Arc<TokenAuthManager>, PartyId)>,
}

impl HttpTransport {
    /// Unauthenticated transport, as used for the bootnode
    pub fn new(client: reqwest::Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| NilError::invalid(format!("Invalid node endpoint '{endpoint}': {e}")))?;
        Ok(Self {
            client,
            endpoint,
            auth: None,
        })
    }

    /// Attach a fresh token for `target` to every call
    pub fn with_auth(mut self, auth: Arc<TokenAuthManager>, target: PartyId) -> Self {
        self.auth = Some((auth, target));
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.endpoint.as_str().trim_end_matches('/'))
    }

    async fn send<Req: Serialize + Sync>(
        &self,
        method: &str,
        request: &Req,
    ) -> RpcResult<reqwest::Response> {
        let mut builder = self.client.post(self.url(method)).json(request);
        if let Some((auth, target)) = &self.auth {
            let token = auth.header_value(*target).map_err(|e| {
                TransportError::status(RpcCode::Unauthenticated, format!("token: {e}"))
            })?;
            builder = builder.header(AUTH_HEADER, token);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        tracing::debug!(endpoint = %self.endpoint, method, %status, "Node rejected call");
        Err(rejection(status, response.text().await))
    }

    async fn unary<Req, Resp>(&self, method: &str, request: &Req) -> RpcResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self.send(method, request).await?;
        let body = response.bytes().await.map_err(network_error)?;
        decode(&body)
    }

    async fn unary_empty<Req: Serialize + Sync>(&self, method: &str, request: &Req) -> RpcResult<()> {
        self.send(method, request).await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        NetworkFailure::Timeout
    } else if err.is_connect() {
        NetworkFailure::ConnectionRefused
    } else {
        NetworkFailure::Network
    };
    TransportError::network(kind, err.to_string())
}

fn rejection<E: std::fmt::Display>(
    status: StatusCode,
    body: std::result::Result<String, E>,
) -> TransportError {
    match body {
        Ok(body) => status_error(status, &body),
        Err(e) => {
            tracing::debug!(%status, error = %e, "Could not read error body");
            TransportError::status(code_for_status(status), format!("unreadable error body: {e}"))
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> TransportError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(error) => TransportError::status(error.code, error.message),
        Err(_) => TransportError::status(code_for_status(status), body.trim().to_string()),
    }
}

fn code_for_status(status: StatusCode) -> RpcCode {
    match status.as_u16() {
        400 => RpcCode::InvalidArgument,
        401 => RpcCode::Unauthenticated,
        403 => RpcCode::PermissionDenied,
        404 => RpcCode::NotFound,
        408 | 504 => RpcCode::DeadlineExceeded,
        409 => RpcCode::Aborted,
        412 => RpcCode::FailedPrecondition,
        429 => RpcCode::ResourceExhausted,
        499 => RpcCode::Canceled,
        500 => RpcCode::Internal,
        501 => RpcCode::Unimplemented,
        502 | 503 => RpcCode::Unavailable,
        _ => RpcCode::Unknown,
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> RpcResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        TransportError::status(RpcCode::Internal, format!("malformed response: {e}"))
    })
}

fn decode_lines(body: &str) -> Vec<RpcResult<ComputeResultState>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| decode(line.as_bytes()))
        .collect()
}

#[async_trait]
impl ValuesRpc for HttpTransport {
    async fn store_values(&self, request: &StoreValuesRequest) -> RpcResult<StoreValuesResponse> {
        self.unary("nillion.values.v1.Values/StoreValues", request)
            .await
    }

    async fn retrieve_values(
        &self,
        request: &RetrieveValuesRequest,
    ) -> RpcResult<RetrieveValuesResponse> {
        self.unary("nillion.values.v1.Values/RetrieveValues", request)
            .await
    }

    async fn delete_values(&self, request: &DeleteValuesRequest) -> RpcResult<()> {
        self.unary_empty("nillion.values.v1.Values/DeleteValues", request)
            .await
    }
}

#[async_trait]
impl ComputeRpc for HttpTransport {
    async fn invoke_compute(
        &self,
        request: &InvokeComputeRequest,
    ) -> RpcResult<InvokeComputeResponse> {
        self.unary("nillion.compute.v1.Compute/InvokeCompute", request)
            .await
    }

    async fn retrieve_results(
        &self,
        request: &RetrieveResultsRequest,
    ) -> RpcResult<ComputeResultStream> {
        let response = self
            .send("nillion.compute.v1.Compute/StreamResult", request)
            .await?;
        let body = response.text().await.map_err(network_error)?;
        Ok(Box::pin(futures::stream::iter(decode_lines(&body))))
    }
}

#[async_trait]
impl PermissionsRpc for HttpTransport {
    async fn retrieve_permissions(
        &self,
        request: &RetrievePermissionsRequest,
    ) -> RpcResult<ValuesPermissions> {
        self.unary("nillion.permissions.v1.Permissions/RetrievePermissions", request)
            .await
    }

    async fn update_permissions(&self, request: &UpdatePermissionsRequest) -> RpcResult<()> {
        self.unary_empty("nillion.permissions.v1.Permissions/UpdatePermissions", request)
            .await
    }

    async fn overwrite_permissions(
        &self,
        request: &OverwritePermissionsRequest,
    ) -> RpcResult<()> {
        self.unary_empty(
            "nillion.permissions.v1.Permissions/OverwritePermissions",
            request,
        )
        .await
    }
}

#[async_trait]
impl ProgramsRpc for HttpTransport {
    async fn store_program(
        &self,
        request: &StoreProgramRequest,
    ) -> RpcResult<StoreProgramResponse> {
        self.unary("nillion.programs.v1.Programs/StoreProgram", request)
            .await
    }
}

#[async_trait]
impl LeaderQueriesRpc for HttpTransport {
    async fn pool_status(&self, request: &PoolStatusRequest) -> RpcResult<PoolStatusResponse> {
        self.unary("nillion.leader_queries.v1.LeaderQueries/PoolStatus", request)
            .await
    }
}

#[async_trait]
impl PaymentsRpc for HttpTransport {
    async fn price_quote(&self, request: &PriceQuoteRequest) -> RpcResult<SignedQuote> {
        self.unary("nillion.payments.v1.Payments/PriceQuote", request)
            .await
    }

    async fn payment_receipt(&self, request: &PaymentReceiptRequest) -> RpcResult<SignedReceipt> {
        self.unary("nillion.payments.v1.Payments/PaymentReceipt", request)
            .await
    }

    async fn account_balance(&self) -> RpcResult<AccountBalance> {
        self.unary("nillion.payments.v1.Payments/AccountBalance", &Empty {})
            .await
    }

    async fn payments_config(&self) -> RpcResult<PaymentsConfig> {
        self.unary("nillion.payments.v1.Payments/PaymentsConfig", &Empty {})
            .await
    }

    async fn add_funds(&self, request: &AddFundsRequest) -> RpcResult<()> {
        self.unary_empty("nillion.payments.v1.Payments/AddFunds", request)
            .await
    }
}

#[async_trait]
impl MembershipRpc for HttpTransport {
    async fn cluster(&self) -> RpcResult<Cluster> {
        self.unary("nillion.membership.v1.Membership/Cluster", &Empty {})
            .await
    }
}

/// Creates [`HttpTransport`]s sharing one connection pool
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    client: reqwest::Client,
}

impl HttpTransportFactory {
    /// Factory whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NilError::internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Factory using the configured request timeout
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.request_timeout())
    }
}

impl TransportFactory for HttpTransportFactory {
    fn bootnode(&self, url: &str) -> Result<Arc<dyn NodeTransport>> {
        Ok(Arc::new(HttpTransport::new(self.client.clone(), url)?))
    }

    fn connect(
        &self,
        member: &ClusterMember,
        auth: Arc<TokenAuthManager>,
    ) -> Result<Arc<dyn NodeTransport>> {
        let transport = HttpTransport::new(self.client.clone(), &member.grpc_endpoint)?
            .with_auth(auth, member.identity);
        Ok(Arc::new(transport))
    }
}
