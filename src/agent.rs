//! Question-answering pipeline
//!
//! Coordinates translation, cached execution and explanation for one
//! department. The translator lives in `civic-agentic` and never touches the
//! store; this module supplies it a [`SchemaSource`] backed by the executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use civic_agentic::prompt::{MAX_CATEGORICAL_VALUES, PROMPT_SAMPLE_ROWS};
use civic_agentic::{
    create_llm_client_with_key, sample_questions, QueryTranslator, SchemaSnapshot, SchemaSource,
    TranslationTier,
};

use crate::cache::CacheClient;
use crate::config::{AppConfig, DEFAULT_RESPONSE_THRESHOLD};
use crate::database::{ResultSet, TableSchema, TableStore};
use crate::error::{IngestionError, MetricsError, StoreError};
use crate::execution::{bind_table, QueryExecutor};
use crate::explain::explain;
use crate::ingest::{MetadataRecord, SourceCatalog, SourceDescriptor};
use crate::loader::{DatasetLoader, LoadOutcome};
use crate::metrics::{kpi_metrics, KpiMetrics};
use crate::schema::naming::table_name_for;
use crate::schema::CanonicalField;

/// A question that was translated, executed and explained
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub success: bool,
    pub query: String,
    #[serde(flatten)]
    pub result: ResultSet,
    pub explanation: String,
    pub total_latency_seconds: f64,
    pub generation_latency_seconds: f64,
    pub within_threshold: bool,
    /// `pattern:<rule>`, `generative` or `fallback:<reason>`
    pub tier: String,
}

/// A question whose query could not be executed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFailure {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Answered(QueryAnswer),
    Failed(QueryFailure),
}

impl QueryResponse {
    pub fn failure(error: impl Into<String>, query: Option<String>) -> Self {
        QueryResponse::Failed(QueryFailure {
            success: false,
            error: error.into(),
            query,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResponse::Answered(_))
    }

    /// The query that was run or attempted
    pub fn query(&self) -> Option<&str> {
        match self {
            QueryResponse::Answered(answer) => Some(&answer.query),
            QueryResponse::Failed(failure) => failure.query.as_deref(),
        }
    }

    pub fn answer(&self) -> Option<&QueryAnswer> {
        match self {
            QueryResponse::Answered(answer) => Some(answer),
            QueryResponse::Failed(_) => None,
        }
    }
}

/// Schema snapshot for one department, read through the cache
struct TableSchemaSource<'a> {
    executor: &'a QueryExecutor,
    department: &'a str,
    table: &'a str,
}

#[async_trait]
impl SchemaSource for TableSchemaSource<'_> {
    async fn snapshot(&self) -> Result<SchemaSnapshot> {
        let schema = self.executor.table_schema(self.department).await?;
        let sample = self
            .executor
            .sample_rows(self.department, PROMPT_SAMPLE_ROWS)
            .await?;

        let mut snapshot =
            SchemaSnapshot::new(self.table, schema.column_names()).with_sample_rows(sample.pairs());

        let categorical = CanonicalField::ALL
            .into_iter()
            .filter(|f| f.is_categorical() && schema.has_column(f.name()));
        for field in categorical {
            match self
                .executor
                .distinct_values(self.table, field.name(), MAX_CATEGORICAL_VALUES)
                .await
            {
                Ok(values) => snapshot = snapshot.with_categorical(field.name(), values),
                Err(e) => debug!("No values for {} in {}: {}", field, self.table, e),
            }
        }
        Ok(snapshot)
    }
}

/// Answers natural-language questions about loaded departments
pub struct QueryAgent {
    executor: Arc<QueryExecutor>,
    translator: QueryTranslator,
    loader: DatasetLoader,
    threshold: Duration,
}

impl QueryAgent {
    pub fn new(executor: Arc<QueryExecutor>, translator: QueryTranslator) -> Self {
        Self {
            loader: DatasetLoader::new(executor.clone()),
            executor,
            translator,
            threshold: DEFAULT_RESPONSE_THRESHOLD,
        }
    }

    /// Latency budget reported through `withinThreshold`
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Connect the store and cache and build the translator from `config`
    pub async fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        let store = TableStore::connect(&config.database).await?;
        let cache = CacheClient::from_config(&config.cache).await;
        info!("Query cache backend: {}", cache.backend_name());

        let client = config.llm.api_key.clone().map(|key| {
            create_llm_client_with_key(config.llm.backend, key, config.llm.model.as_deref())
        });
        match &client {
            Some(client) => info!(
                "Generative tier enabled: {} ({})",
                client.provider_name(),
                client.model_name()
            ),
            None => warn!(
                "No {} provided. Generative query fallback will be disabled.",
                config.llm.backend.api_key_var()
            ),
        }
        let translator = QueryTranslator::new(client).with_timeout(config.llm.response_threshold);

        Ok(Self::new(Arc::new(QueryExecutor::new(store, cache)), translator)
            .with_threshold(config.llm.response_threshold))
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn loader(&self) -> &DatasetLoader {
        &self.loader
    }

    /// Decode and load a department payload
    pub async fn load(
        &self,
        department: &str,
        bytes: &[u8],
        descriptor: &SourceDescriptor,
    ) -> Result<LoadOutcome, IngestionError> {
        self.loader.load(department, bytes, descriptor).await
    }

    /// Translate, execute and explain `question` for `department`
    pub async fn ask(&self, question: &str, department: &str) -> QueryResponse {
        let start = Instant::now();
        let table = table_name_for(department);
        info!("Processing question for {}: {}", table, question);

        let source = TableSchemaSource {
            executor: &self.executor,
            department,
            table: &table,
        };
        let translation = self.translator.translate(question, &table, &source).await;
        if let TranslationTier::Fallback(reason) = translation.tier {
            debug!("Answering with fallback query ({:?})", reason);
        }

        let result = match self
            .executor
            .execute_on_table(&translation.query, &table)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Question failed for {}: {}", table, e);
                return QueryResponse::failure(e.to_string(), Some(e.query));
            }
        };

        let query = bind_table(&translation.query, &table);
        let explanation = explain(question, &result, &query);
        let total = start.elapsed();
        let within_threshold = total <= self.threshold;
        if !within_threshold {
            warn!(
                "Question took {:.2}s, over the {:.2}s threshold",
                total.as_secs_f64(),
                self.threshold.as_secs_f64()
            );
        }

        QueryResponse::Answered(QueryAnswer {
            success: true,
            query,
            result,
            explanation,
            total_latency_seconds: total.as_secs_f64(),
            generation_latency_seconds: translation.elapsed.as_secs_f64(),
            within_threshold,
            tier: translation.tier.to_string(),
        })
    }

    pub async fn table_schema(&self, department: &str) -> Result<TableSchema, StoreError> {
        self.executor.table_schema(department).await
    }

    pub async fn sample_rows(&self, department: &str, limit: usize) -> Result<ResultSet, StoreError> {
        self.executor.sample_rows(department, limit).await
    }

    /// Metadata stored with the department's last load
    pub async fn load_metadata(&self, department: &str) -> Result<Option<MetadataRecord>, StoreError> {
        self.executor
            .store()
            .load_metadata(&table_name_for(department))
            .await
    }

    pub async fn metrics(&self, department: &str) -> Result<KpiMetrics, MetricsError> {
        kpi_metrics(&self.executor, department).await
    }

    pub fn sample_questions(&self) -> Vec<&'static str> {
        sample_questions()
    }

    pub fn available_departments(&self) -> Vec<&'static str> {
        SourceCatalog::available_departments()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_response_shape() {
        let response = QueryResponse::failure(
            "Query execution failed: no such table",
            Some("SELECT * FROM police_data_x".to_string()),
        );
        assert!(!response.is_success());
        assert_eq!(
            serde_json::to_value(&response).expect("serialize"),
            json!({
                "success": false,
                "error": "Query execution failed: no such table",
                "query": "SELECT * FROM police_data_x"
            })
        );

        let response = QueryResponse::failure("boom", None);
        assert_eq!(
            serde_json::to_value(&response).expect("serialize"),
            json!({ "success": false, "error": "boom" })
        );
    }

    #[test]
    fn test_answer_response_shape() {
        let response = QueryResponse::Answered(QueryAnswer {
            success: true,
            query: "SELECT COUNT(*) as total_stops FROM police_data_seattle".to_string(),
            result: ResultSet {
                columns: vec!["total_stops".to_string()],
                rows: vec![vec![json!(3)]],
            },
            explanation: "The dataset contains **3** total stops.".to_string(),
            total_latency_seconds: 0.5,
            generation_latency_seconds: 0.25,
            within_threshold: true,
            tier: "pattern:total_stops".to_string(),
        });
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["columns"], json!(["total_stops"]));
        assert_eq!(value["rows"], json!([[3]]));
        assert_eq!(value["totalLatencySeconds"], json!(0.5));
        assert_eq!(value["generationLatencySeconds"], json!(0.25));
        assert_eq!(value["withinThreshold"], json!(true));
    }
}
