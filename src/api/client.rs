//! Typed client for the analytics server's REST API
//!
//! Thin endpoint wrappers over [`HttpClient`]. Data-plane calls (formula
//! runs, sample/capsule writes) report the response body size so callers can
//! account bytes in the status ledger; metadata calls return the parsed body
//! alone.

use super::types::{
    CapsulesInput, CleanupInput, ConditionBatchInput, DatasourceOutput, FormulaCompileInput,
    FormulaCompileOutput, FormulaRunInput, FormulaRunOutput, ItemBatchOutput,
    ItemDependencyOutput, ItemOutput, SamplesInput, SignalInput, SignalOutput,
    StatusMessageOutput, SwapInput, TreeChildrenOutput,
};
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use reqwest::Method;
use tracing::debug;

/// Typed API client
#[derive(Debug)]
pub struct ApiClient {
    http: HttpClient,
}

impl ApiClient {
    /// Wrap an HTTP client
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Access the underlying HTTP client
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    // ========================================================================
    // Formula execution
    // ========================================================================

    /// Run a formula, returning one page of results and the body size in bytes
    pub async fn run_formula(&self, input: &FormulaRunInput) -> Result<(FormulaRunOutput, u64)> {
        debug!(
            formula = %input.formula,
            parameters = ?input.parameters,
            "running formula"
        );
        self.http
            .request_json_metered(
                Method::POST,
                "/formulas/run",
                RequestConfig::new().json(serde_json::to_value(input)?),
            )
            .await
    }

    /// Compile a formula to discover its return type without evaluating it
    pub async fn compile_formula(
        &self,
        formula: &str,
        parameters: &[String],
    ) -> Result<FormulaCompileOutput> {
        let input = FormulaCompileInput {
            formula: formula.to_string(),
            parameters: parameters.to_vec(),
        };
        self.http
            .request_json(
                Method::POST,
                "/formulas/compile",
                RequestConfig::new().json(serde_json::to_value(&input)?),
            )
            .await
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Fetch an item's name, type and properties
    pub async fn get_item(&self, id: &str) -> Result<ItemOutput> {
        let result: Result<ItemOutput> = self.http.get_json(&format!("/items/{id}")).await;
        match result {
            Err(Error::HttpStatus { status: 404, .. }) => Err(Error::item_not_found(id)),
            other => other,
        }
    }

    /// List the items a calculated item's formula depends on
    pub async fn get_dependencies(&self, id: &str) -> Result<ItemDependencyOutput> {
        self.http
            .get_json(&format!("/items/{id}/dependencies"))
            .await
    }

    /// Swap a calculation onto a different asset, returning the swapped item
    pub async fn swap_item(&self, id: &str, asset_id: &str) -> Result<ItemOutput> {
        let input = SwapInput {
            asset_id: asset_id.to_string(),
        };
        self.http
            .request_json(
                Method::POST,
                &format!("/items/{id}/swap"),
                RequestConfig::new().json(serde_json::to_value(&input)?),
            )
            .await
    }

    /// Archive an item
    pub async fn archive_item(&self, id: &str) -> Result<()> {
        let _: StatusMessageOutput = self
            .http
            .request_json(
                Method::POST,
                &format!("/items/{id}/archive"),
                RequestConfig::new().json(serde_json::json!({})),
            )
            .await?;
        Ok(())
    }

    // ========================================================================
    // Signal ingestion
    // ========================================================================

    /// Create or update a signal by datasource identity
    pub async fn put_signal(&self, input: &SignalInput) -> Result<SignalOutput> {
        self.http
            .request_json(
                Method::PUT,
                "/signals",
                RequestConfig::new().json(serde_json::to_value(input)?),
            )
            .await
    }

    /// Append samples to a signal
    pub async fn add_samples(&self, id: &str, input: &SamplesInput) -> Result<u64> {
        let (_, size): (StatusMessageOutput, u64) = self
            .http
            .request_json_metered(
                Method::POST,
                &format!("/signals/{id}/samples"),
                RequestConfig::new().json(serde_json::to_value(input)?),
            )
            .await?;
        Ok(size)
    }

    /// Replace all samples within `input.interval` with the given samples
    pub async fn overwrite_samples(&self, id: &str, input: &SamplesInput) -> Result<u64> {
        let (_, size): (StatusMessageOutput, u64) = self
            .http
            .request_json_metered(
                Method::PUT,
                &format!("/signals/{id}/samples"),
                RequestConfig::new().json(serde_json::to_value(input)?),
            )
            .await?;
        Ok(size)
    }

    // ========================================================================
    // Condition ingestion
    // ========================================================================

    /// Create or update conditions in bulk by datasource identity
    pub async fn batch_conditions(&self, input: &ConditionBatchInput) -> Result<ItemBatchOutput> {
        self.http
            .request_json(
                Method::POST,
                "/conditions/batch",
                RequestConfig::new().json(serde_json::to_value(input)?),
            )
            .await
    }

    /// Append capsules to a condition
    pub async fn add_capsules(&self, id: &str, input: &CapsulesInput) -> Result<u64> {
        let (_, size): (StatusMessageOutput, u64) = self
            .http
            .request_json_metered(
                Method::POST,
                &format!("/conditions/{id}/capsules"),
                RequestConfig::new().json(serde_json::to_value(input)?),
            )
            .await?;
        Ok(size)
    }

    /// Replace all capsules within `input.interval` with the given capsules
    pub async fn overwrite_capsules(&self, id: &str, input: &CapsulesInput) -> Result<u64> {
        let (_, size): (StatusMessageOutput, u64) = self
            .http
            .request_json_metered(
                Method::PUT,
                &format!("/conditions/{id}/capsules"),
                RequestConfig::new().json(serde_json::to_value(input)?),
            )
            .await?;
        Ok(size)
    }

    // ========================================================================
    // Trees & datasources
    // ========================================================================

    /// List one page of an asset tree node's children
    pub async fn get_tree_children(
        &self,
        id: &str,
        offset: usize,
        limit: usize,
        scope: Option<&str>,
    ) -> Result<TreeChildrenOutput> {
        let mut config = RequestConfig::new()
            .query("offset", offset.to_string())
            .query("limit", limit.to_string());
        if let Some(scope) = scope {
            config = config.query("scope", scope);
        }
        self.http
            .get_with_config(&format!("/trees/{id}/children"), config)
            .await?
            .json()
            .await
            .map_err(Error::Http)
    }

    /// Fetch a datasource's identity and item count
    pub async fn get_datasource(&self, id: &str) -> Result<DatasourceOutput> {
        self.http.get_json(&format!("/datasources/{id}")).await
    }

    /// Archive every item under the datasource whose sync token differs
    pub async fn cleanup_datasource(&self, id: &str, sync_token: &str) -> Result<()> {
        let input = CleanupInput {
            sync_token: sync_token.to_string(),
        };
        let _: StatusMessageOutput = self
            .http
            .request_json(
                Method::POST,
                &format!("/datasources/{id}/cleanup"),
                RequestConfig::new().json(serde_json::to_value(&input)?),
            )
            .await?;
        Ok(())
    }
}
