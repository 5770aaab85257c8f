//! Shared setup for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use civic_agentic::QueryTranslator;
use civic_query::{CacheClient, DataTable, QueryAgent, QueryExecutor, SourceDescriptor, TableStore};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Agent over a private in-memory store and cache, pattern tier only
pub async fn memory_agent() -> QueryAgent {
    init_tracing();
    let store = TableStore::in_memory().await.expect("in-memory store");
    let cache = CacheClient::in_memory(Duration::from_secs(3600));
    QueryAgent::new(
        Arc::new(QueryExecutor::new(store, cache)),
        QueryTranslator::patterns_only(),
    )
}

pub fn descriptor() -> SourceDescriptor {
    SourceDescriptor::new(
        "Stanford Open Policing Project",
        "CSV",
        "https://openpolicing.stanford.edu/data/",
    )
    .with_description("Traffic stop records")
}

pub fn table(columns: &[&str], rows: Vec<Vec<&str>>) -> DataTable {
    DataTable::new(
        columns.iter().map(|c| c.to_string()).collect(),
        rows.into_iter()
            .map(|r| {
                r.into_iter()
                    .map(|v| (!v.is_empty()).then(|| v.to_string()))
                    .collect()
            })
            .collect(),
    )
}

/// `n` stops cycling through races, with every `arrest_every`-th stop an arrest
pub fn stops_csv(n: usize, races: &[&str], arrest_every: usize) -> String {
    let mut csv = String::from("race,sex,arrest,date\n");
    for i in 0..n {
        let race = races[i % races.len()];
        let sex = if i % 2 == 0 { "M" } else { "F" };
        let arrest = if arrest_every > 0 && i % arrest_every == 0 {
            "true"
        } else {
            "false"
        };
        csv.push_str(&format!("{},{},{},2019-01-{:02}\n", race, sex, arrest, i % 28 + 1));
    }
    csv
}
