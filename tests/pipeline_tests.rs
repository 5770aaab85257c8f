//! End-to-end tests: load, ask, cache, reload

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use civic_agentic::QueryTranslator;
use civic_query::config::CacheConfig;
use civic_query::{
    CacheClient, IngestionError, QueryAgent, QueryExecutor, QueryResponse, SourceDescriptor,
    TableStore,
};
use serde_json::json;

use helpers::{descriptor, memory_agent, stops_csv, table};

#[tokio::test]
async fn test_seattle_load_maps_canonical_columns() {
    let agent = memory_agent().await;
    let csv = "race,sex,arrest,date\nwhite,M,true,2019-01-02\nblack,F,false,2019-03-04\n";

    let outcome = agent
        .load("Seattle Police Department", csv.as_bytes(), &descriptor())
        .await
        .expect("load");
    assert_eq!(outcome.table_name, "police_data_seattle");

    let schema = agent.table_schema("Seattle Police Department").await.expect("schema");
    for column in ["driver_race", "driver_gender", "arrest_made", "stop_date"] {
        assert!(schema.has_column(column), "missing {}", column);
    }

    let metadata = agent
        .load_metadata("seattle")
        .await
        .expect("metadata query")
        .expect("metadata stored");
    assert_eq!(metadata.rows, 2);
    assert!(metadata.real_data);
}

#[tokio::test]
async fn test_total_stops_on_ten_thousand_rows() {
    let agent = memory_agent().await;
    let csv = stops_csv(10_000, &["white", "black", "asian"], 7);
    agent.load("seattle", csv.as_bytes(), &descriptor()).await.expect("load");

    let response = agent.ask("How many total stops?", "seattle").await;
    let answer = response.answer().expect("answered");
    assert_eq!(answer.result.columns, vec!["total_stops"]);
    assert_eq!(answer.result.rows, vec![vec![json!(10000)]]);
    assert_eq!(answer.tier, "pattern:total_stops");
    assert!(answer.explanation.contains("10,000"));
    assert!(answer.query.contains("police_data_seattle"));
}

#[tokio::test]
async fn test_comparative_arrest_rate_returns_two_ordered_rows() {
    let agent = memory_agent().await;
    let csv = stops_csv(300, &["white", "black", "asian"], 4);
    agent.load("seattle", csv.as_bytes(), &descriptor()).await.expect("load");

    let response = agent.ask("arrest rate for black vs white", "seattle").await;
    let answer = response.answer().expect("answered");
    let result = &answer.result;
    assert_eq!(result.len(), 2);
    for column in ["total_stops", "arrests", "arrest_rate"] {
        assert!(result.has_column(column), "missing {}", column);
    }

    let races: Vec<&str> = result
        .column("driver_race")
        .into_iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(races.iter().all(|r| *r == "black" || *r == "white"));

    let rates: Vec<f64> = result
        .column("arrest_rate")
        .into_iter()
        .filter_map(|v| v.as_f64())
        .collect();
    assert_eq!(rates.len(), 2);
    assert!(rates[0] >= rates[1]);
    assert!(answer.explanation.contains("highest arrest rate"));
}

#[tokio::test]
async fn test_same_query_executes_once() {
    let agent = memory_agent().await;
    let csv = stops_csv(50, &["white", "black"], 5);
    agent.load("seattle", csv.as_bytes(), &descriptor()).await.expect("load");
    let executor = agent.executor();

    let before = executor.execution_count();
    let first = agent.ask("How many total stops?", "seattle").await;
    let second = agent.ask("What is the total number of stops?", "seattle").await;
    assert_eq!(first.query(), second.query());
    assert_eq!(executor.execution_count() - before, 1);

    let before = executor.execution_count();
    for _ in 0..3 {
        assert!(agent.ask("How many total stops?", "seattle").await.is_success());
    }
    assert_eq!(executor.execution_count(), before);
}

#[tokio::test]
async fn test_resolved_table_names_are_not_rewritten() {
    let agent = memory_agent().await;
    let csv = stops_csv(12, &["white"], 0);
    agent.load("seattle", csv.as_bytes(), &descriptor()).await.expect("load");

    let result = agent
        .executor()
        .execute("SELECT COUNT(*) AS n FROM police_data_seattle", "chicago")
        .await
        .expect("execute");
    assert_eq!(result.rows, vec![vec![json!(12)]]);
}

#[tokio::test]
async fn test_reload_invalidates_queries_run_for_other_departments() {
    let agent = memory_agent().await;
    let executor = agent.executor();
    let query = "SELECT COUNT(*) AS n FROM police_data_seattle";
    agent
        .load("seattle", stops_csv(10, &["white"], 0).as_bytes(), &descriptor())
        .await
        .expect("first load");

    let result = executor.execute(query, "chicago").await.expect("execute");
    assert_eq!(result.rows, vec![vec![json!(10)]]);

    agent
        .load("seattle", stops_csv(25, &["white"], 0).as_bytes(), &descriptor())
        .await
        .expect("reload");

    for department in ["seattle", "chicago"] {
        let result = executor.execute(query, department).await.expect("execute");
        assert_eq!(result.rows, vec![vec![json!(25)]], "stale for {}", department);
    }
}

#[tokio::test]
async fn test_reload_invalidates_cached_answers() {
    let agent = memory_agent().await;
    agent
        .load("seattle", stops_csv(10, &["white"], 0).as_bytes(), &descriptor())
        .await
        .expect("first load");
    let first = agent.ask("How many total stops?", "seattle").await;
    assert_eq!(first.answer().expect("answered").result.rows, vec![vec![json!(10)]]);

    let outcome = agent
        .load("seattle", stops_csv(25, &["white"], 0).as_bytes(), &descriptor())
        .await
        .expect("reload");
    assert!(outcome.invalidated >= 1);

    let second = agent.ask("How many total stops?", "seattle").await;
    assert_eq!(second.answer().expect("answered").result.rows, vec![vec![json!(25)]]);
}

#[tokio::test]
async fn test_shared_cache_serves_other_clients() {
    helpers::init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = CacheConfig {
        shared_url: Some(format!("sqlite://{}", dir.path().join("cache.db").display())),
        expiry: Duration::from_secs(60),
    };

    let writer = QueryAgent::new(
        Arc::new(QueryExecutor::new(
            TableStore::in_memory().await.expect("store"),
            CacheClient::from_config(&config).await,
        )),
        QueryTranslator::patterns_only(),
    );
    assert_eq!(writer.executor().cache().backend_name(), "shared");
    writer
        .load("seattle", stops_csv(40, &["white"], 0).as_bytes(), &descriptor())
        .await
        .expect("load");
    assert!(writer.ask("How many total stops?", "seattle").await.is_success());

    // Second client has an empty store: only the shared cache can answer
    let reader = QueryAgent::new(
        Arc::new(QueryExecutor::new(
            TableStore::in_memory().await.expect("store"),
            CacheClient::from_config(&config).await,
        )),
        QueryTranslator::patterns_only(),
    );
    let response = reader.ask("How many total stops?", "seattle").await;
    assert_eq!(response.answer().expect("answered").result.rows, vec![vec![json!(40)]]);
    assert_eq!(reader.executor().execution_count(), 0);
}

#[tokio::test]
async fn test_failure_carries_attempted_query() {
    let agent = memory_agent().await;
    let response = agent.ask("How many total stops?", "Boston Police").await;
    assert!(!response.is_success());
    match &response {
        QueryResponse::Failed(failure) => {
            assert!(failure
                .query
                .as_deref()
                .is_some_and(|q| q.contains("police_data_boston")));
        }
        QueryResponse::Answered(_) => panic!("expected failure"),
    }
    let value = serde_json::to_value(&response).expect("serialize");
    assert_eq!(value["success"], json!(false));
}

#[tokio::test]
async fn test_unmatched_question_without_model_counts_rows() {
    let agent = memory_agent().await;
    agent
        .load("seattle", stops_csv(9, &["white"], 0).as_bytes(), &descriptor())
        .await
        .expect("load");
    let response = agent.ask("tell me something interesting", "seattle").await;
    let answer = response.answer().expect("answered");
    assert_eq!(answer.tier, "fallback:no_credential");
    assert_eq!(answer.result.rows, vec![vec![json!(9)]]);
}

#[tokio::test]
async fn test_group_arrest_explanation() {
    let agent = memory_agent().await;
    let data = table(
        &["subject_race", "gender", "arrested", "stop_date"],
        vec![
            vec!["black", "M", "true", "2020-01-01"],
            vec!["black", "F", "true", "2020-01-02"],
            vec!["white", "M", "false", "2020-01-03"],
        ],
    );
    agent
        .loader()
        .load_table("philadelphia", data, &descriptor())
        .await
        .expect("load");

    let response = agent.ask("How many blacks were arrested?", "philadelphia").await;
    let answer = response.answer().expect("answered");
    assert_eq!(
        answer.explanation,
        "According to the data, **2** Black individuals were arrested."
    );
}

#[tokio::test]
async fn test_metrics_through_cached_executor() {
    let agent = memory_agent().await;
    let data = table(
        &["race", "sex", "arrest", "outcome", "age", "date"],
        vec![
            vec!["white", "M", "true", "Arrest", "34", "2019-01-02"],
            vec!["black", "F", "false", "Citation", "28", "01/15/2018"],
            vec!["white", "F", "false", "Citation", "150", "2020-06-30"],
            vec!["asian", "M", "false", "Warning", "", "2019-07-04"],
        ],
    );
    agent
        .loader()
        .load_table("seattle", data, &descriptor())
        .await
        .expect("load");

    let metrics = agent.metrics("seattle").await.expect("metrics");
    assert_eq!(metrics.total_stops, 4);
    assert_eq!(metrics.arrests.count, Some(1));
    assert_eq!(metrics.arrests.rate, Some(25.0));
    assert_eq!(metrics.citations.count, Some(2));
    assert_eq!(metrics.warnings.count, Some(1));
    assert_eq!(metrics.average_age, Some(31.0));
    let range = metrics.date_range.expect("date range");
    assert_eq!(range.start_date, chrono::NaiveDate::from_ymd_opt(2018, 1, 15));
    assert_eq!(range.end_date, chrono::NaiveDate::from_ymd_opt(2020, 6, 30));
    assert_eq!(metrics.race_distribution[0].value, "white");
    assert_eq!(metrics.race_distribution[0].count, 2);

    let executions = agent.executor().execution_count();
    agent.metrics("seattle").await.expect("metrics");
    assert_eq!(agent.executor().execution_count(), executions);
}

#[tokio::test]
async fn test_synthetic_sources_are_rejected() {
    let agent = memory_agent().await;
    let fake = SourceDescriptor::new("Synthetic demo data", "CSV", "https://example.org/x.csv");
    let err = agent
        .load("seattle", stops_csv(3, &["white"], 0).as_bytes(), &fake)
        .await
        .expect_err("synthetic");
    assert!(matches!(err, IngestionError::SyntheticSource(_)));
}
