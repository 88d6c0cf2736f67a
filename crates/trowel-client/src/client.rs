//! The Open Context client: cache-backed fetching, facet attribute
//! discovery, the pagination walker, and table building.

use serde_json::Value;

use trowel_core::facets::{self, Attribute};
use trowel_core::normalize::Normalizer;
use trowel_core::pace::PacedFetcher;
use trowel_core::table::Table;
use trowel_core::traits::Fetcher;
use trowel_core::{AppError, ClientConfig};

use crate::cache::{effective_params, ResponseCache};
use crate::fetcher::ReqwestFetcher;

/// Client for the Open Context search API.
///
/// Generic over the [`Fetcher`] so tests can inject a mock; every live
/// request goes through the disk cache first, and the pacing delay is
/// only paid on cache misses.
pub struct OpenContextClient<F: Fetcher> {
    fetcher: F,
    cache: ResponseCache,
    config: ClientConfig,
}

impl OpenContextClient<PacedFetcher<ReqwestFetcher>> {
    /// Build a client with the paced reqwest fetcher.
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let fetcher = PacedFetcher::new(ReqwestFetcher::new()?, config.pace);
        Ok(Self::with_fetcher(fetcher, config))
    }
}

impl<F: Fetcher> OpenContextClient<F> {
    pub fn with_fetcher(fetcher: F, config: ClientConfig) -> Self {
        let cache = ResponseCache::new(&config.cache_dir, config.cache_prefix.clone());
        Self {
            fetcher,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get JSON for a URL, from the cache when possible, live otherwise.
    /// Live responses are cached before being returned.
    pub async fn get_cached(
        &self,
        url: &str,
        extra_params: &[(String, String)],
    ) -> Result<Value, AppError> {
        let name = self.cache.file_name(url, extra_params);
        if let Some(payload) = self.cache.read(&name) {
            tracing::debug!(url, entry = %name, "Cache hit");
            return Ok(payload);
        }

        let effective = effective_params(url, extra_params);
        let payload = self.fetcher.fetch(url, &effective).await?;
        self.cache.write(&name, &payload)?;
        Ok(payload)
    }

    /// Standard attributes discovered from a search URL's facets.
    ///
    /// `include_bone_measures` adds the repeatable `prop` parameter that
    /// surfaces the Von den Driesch bone measurement attributes. A fetch
    /// failure is an `Err`, distinct from `Ok` with zero matches.
    pub async fn standard_attributes(
        &self,
        url: &str,
        include_bone_measures: bool,
    ) -> Result<Vec<Attribute>, AppError> {
        let mut extra_params = Vec::new();
        if include_bone_measures {
            extra_params.push((
                "prop".to_string(),
                facets::VON_DEN_DRIESCH_PROP.to_string(),
            ));
        }
        let payload = self.get_cached(url, &extra_params).await?;
        Ok(facets::standard_attributes(&payload))
    }

    /// Attributes used in at least `min_portion` of the matched records
    /// (the configured portion when `None`).
    pub async fn common_attributes(
        &self,
        url: &str,
        min_portion: Option<f64>,
    ) -> Result<Vec<Attribute>, AppError> {
        let payload = self.get_cached(url, &[]).await?;
        let min_portion = min_portion.unwrap_or(self.config.min_portion);
        Ok(facets::common_attributes(&payload, min_portion))
    }

    /// Retrieve every page of raw result records for a search URL,
    /// following `next` links until exhausted.
    ///
    /// Records are concatenated in page order, no deduplication. A
    /// failure on any page fails the whole walk — no partial results.
    pub async fn fetch_all_pages(
        &self,
        url: &str,
        attribute_slugs: &[String],
        paginate: bool,
    ) -> Result<Vec<Value>, AppError> {
        let mut params: Vec<(String, String)> = vec![(
            "rows".to_string(),
            self.config.rows_per_page.to_string(),
        )];
        if !attribute_slugs.is_empty() {
            params.push(("attributes".to_string(), attribute_slugs.join(",")));
        }
        if !self.config.response_types.is_empty() {
            params.push(("response".to_string(), self.config.response_types.join(",")));
        }
        if self.config.flatten_attributes {
            params.push(("flatten-attributes".to_string(), "1".to_string()));
        }

        let mut records = Vec::new();
        let mut next_url = Some(url.to_string());
        while let Some(current) = next_url.take() {
            let page = self.get_cached(&current, &params).await?;
            log_page_progress(&page);

            if let Some(results) = page.get(facets::RESULTS_KEY).and_then(Value::as_array) {
                records.extend(results.iter().cloned());
            }
            if paginate {
                // The server only provides `next` while more pages
                // remain; its absence terminates the walk.
                next_url = page.get("next").and_then(Value::as_str).map(String::from);
            }
        }
        Ok(records)
    }

    /// Build a table from every record matched by a search URL: walk all
    /// pages, normalize each record, infer column types, order columns.
    pub async fn build_table(
        &self,
        url: &str,
        attribute_slugs: &[String],
    ) -> Result<Table, AppError> {
        let raw_records = self.fetch_all_pages(url, attribute_slugs, true).await?;

        let mut normalizer = Normalizer::new(&self.config);
        let mut records = Vec::with_capacity(raw_records.len());
        for raw in &raw_records {
            if let Some(map) = raw.as_object() {
                records.push(normalizer.normalize(map));
            }
        }
        Ok(Table::from_records(records, normalizer.max_context_depth()))
    }
}

fn log_page_progress(page: &Value) {
    let start = page.get("startIndex").and_then(Value::as_u64).unwrap_or(0);
    let per_page = page.get("itemsPerPage").and_then(Value::as_u64).unwrap_or(0);
    let total = page.get("totalResults").and_then(Value::as_u64).unwrap_or(0);
    tracing::debug!(
        first = start + 1,
        last = (start + per_page).min(total),
        total,
        id = page.get("id").and_then(serde_json::Value::as_str).unwrap_or(""),
        "Retrieved result page"
    );
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    use trowel_core::table::ColumnType;
    use trowel_core::testutil::MockFetcher;

    use super::*;

    fn test_client(fetcher: MockFetcher) -> (OpenContextClient<MockFetcher>, TempDir) {
        let dir = tempdir().unwrap();
        let config = ClientConfig::default()
            .with_cache_dir(dir.path())
            .with_cache_prefix("test");
        (OpenContextClient::with_fetcher(fetcher, config), dir)
    }

    fn page(records: Vec<Value>, next: Option<&str>) -> Value {
        let mut page = json!({
            "totalResults": 5,
            "startIndex": 0,
            "itemsPerPage": records.len(),
            "id": "http://opencontext.org/query/",
            "oc-api:has-results": records,
        });
        if let Some(next_url) = next {
            page["next"] = json!(next_url);
        }
        page
    }

    #[tokio::test]
    async fn pagination_concatenates_pages_in_order() {
        let fetcher = MockFetcher::with_responses(vec![
            Ok(page(
                vec![json!({"label": "r1"}), json!({"label": "r2"})],
                Some("http://opencontext.org/query/?start=2"),
            )),
            Ok(page(
                vec![json!({"label": "r3"})],
                Some("http://opencontext.org/query/?start=3"),
            )),
            Ok(page(vec![json!({"label": "r4"})], None)),
        ]);
        let (client, _dir) = test_client(fetcher.clone());

        let records = client
            .fetch_all_pages("http://opencontext.org/query/", &[], true)
            .await
            .unwrap();

        let labels: Vec<&str> = records
            .iter()
            .map(|r| r["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels, vec!["r1", "r2", "r3", "r4"]);
        assert_eq!(fetcher.request_count(), 3);
    }

    #[tokio::test]
    async fn paginate_false_stops_after_the_first_page() {
        let fetcher = MockFetcher::with_responses(vec![Ok(page(
            vec![json!({"label": "r1"})],
            Some("http://opencontext.org/query/?start=1"),
        ))]);
        let (client, _dir) = test_client(fetcher.clone());

        let records = client
            .fetch_all_pages("http://opencontext.org/query/", &[], false)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn page_failure_aborts_the_whole_walk() {
        let fetcher = MockFetcher::with_responses(vec![
            Ok(page(
                vec![json!({"label": "r1"})],
                Some("http://opencontext.org/query/?start=1"),
            )),
            Err(AppError::FetchFailure {
                url: "http://opencontext.org/query/?start=1".into(),
                reason: "HTTP 500".into(),
            }),
        ]);
        let (client, _dir) = test_client(fetcher);

        let err = client
            .fetch_all_pages("http://opencontext.org/query/", &[], true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FetchFailure { .. }));
    }

    #[tokio::test]
    async fn request_params_include_rows_attributes_and_response() {
        let fetcher = MockFetcher::with_responses(vec![Ok(page(vec![], None))]);
        let (client, _dir) = test_client(fetcher.clone());

        client
            .fetch_all_pages(
                "http://opencontext.org/query/",
                &["oc-zoo-gl".to_string(), "aat-material".to_string()],
                true,
            )
            .await
            .unwrap();

        let requests = fetcher.requests.lock().unwrap();
        let (_, params) = &requests[0];
        assert!(params.contains(&("rows".to_string(), "200".to_string())));
        assert!(params.contains(&("attributes".to_string(), "oc-zoo-gl,aat-material".to_string())));
        assert!(params.contains(&("response".to_string(), "metadata,uri-meta".to_string())));
    }

    #[tokio::test]
    async fn second_request_is_served_from_the_cache() {
        let fetcher = MockFetcher::new(json!({"totalResults": 1}));
        let (client, _dir) = test_client(fetcher.clone());

        let first = client
            .get_cached("http://opencontext.org/query/", &[])
            .await
            .unwrap();
        let second = client
            .get_cached("http://opencontext.org/query/", &[])
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn live_responses_are_written_to_the_cache() {
        let fetcher = MockFetcher::new(json!({"totalResults": 2}));
        let (client, _dir) = test_client(fetcher);

        client
            .get_cached("http://opencontext.org/query/", &[])
            .await
            .unwrap();

        let name = client.cache().file_name("http://opencontext.org/query/", &[]);
        assert_eq!(client.cache().read(&name), Some(json!({"totalResults": 2})));
    }

    #[tokio::test]
    async fn fetch_failure_propagates_from_get_cached() {
        let fetcher = MockFetcher::with_error(AppError::FetchFailure {
            url: "http://opencontext.org/query/".into(),
            reason: "HTTP 503".into(),
        });
        let (client, _dir) = test_client(fetcher);

        let err = client
            .get_cached("http://opencontext.org/query/", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn standard_attributes_pass_the_bone_measures_prop() {
        let fetcher = MockFetcher::new(json!({"totalResults": 0}));
        let (client, _dir) = test_client(fetcher.clone());

        let attrs = client
            .standard_attributes("http://opencontext.org/query/", true)
            .await
            .unwrap();
        assert!(attrs.is_empty());

        let requests = fetcher.requests.lock().unwrap();
        let (_, params) = &requests[0];
        assert!(params.contains(&(
            "prop".to_string(),
            facets::VON_DEN_DRIESCH_PROP.to_string()
        )));
    }

    #[tokio::test]
    async fn common_attributes_use_the_configured_portion() {
        let payload = json!({
            "totalResults": 10,
            "oc-api:has-facets": [{
                "rdfs:isDefinedBy": "oc-api:facet-prop-var",
                "oc-api:has-id-options": [{
                    "slug": "taxon",
                    "label": "Taxon",
                    "rdfs:isDefinedBy": "http://opencontext.org/predicates/taxon",
                    "count": 5,
                }],
            }],
        });
        let fetcher = MockFetcher::new(payload);
        let (client, _dir) = test_client(fetcher);

        // 5 of 10 records: passes at 0.5, fails at 0.6. The second call
        // reuses the cached response.
        let at_half = client
            .common_attributes("http://opencontext.org/query/", Some(0.5))
            .await
            .unwrap();
        assert_eq!(at_half.len(), 1);
        let above = client
            .common_attributes("http://opencontext.org/query/", Some(0.6))
            .await
            .unwrap();
        assert!(above.is_empty());
    }

    #[tokio::test]
    async fn build_table_normalizes_and_orders_records() {
        let fetcher = MockFetcher::with_responses(vec![Ok(page(
            vec![
                json!({
                    "uri": "http://opencontext.org/subjects/1",
                    "label": "Bone 1",
                    "context label": "Site/Trench/Locus",
                    "material": ["bone", "shell"],
                }),
                json!({
                    "uri": "http://opencontext.org/subjects/2",
                    "label": "Bone 2",
                    "context label": "Site/Trench",
                    "material": "bone",
                }),
            ],
            None,
        ))]);
        let (client, _dir) = test_client(fetcher);

        let table = client
            .build_table("http://opencontext.org/query/", &[])
            .await
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            &table.columns()[..5],
            &["uri", "label", "Context (1)", "Context (2)", "Context (3)"]
        );
        assert_eq!(table.rows()[0]["material"], json!("bone; shell"));
        assert_eq!(table.rows()[1]["material"], json!("bone"));
        assert_eq!(table.column_type("material"), Some(ColumnType::Text));
    }
}
