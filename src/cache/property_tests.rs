//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check key derivation, the cache client and the
//! aggregation engine against simple models.

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    generate_key, CacheBackend, CacheClient, ClientOptions, MemoryBackend, QueryCache,
};
use crate::error::MarketError;
use crate::market::{
    expected_page_len, total_pages, AggregationEngine, InMemoryCatalog, Listing, ListingFilters,
};

const TTL: Duration = Duration::from_secs(60);

// == Strategies ==
fn param_map_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z_]{1,12}", "[a-zA-Z0-9 ]{0,24}", 1..8)
}

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,48}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,128}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    // Small key space so operations collide
    let key = "[a-d]";
    prop_oneof![
        (key, value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key.prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::Delete { key }),
    ]
}

fn listings_strategy() -> impl Strategy<Value = Vec<Listing>> {
    prop::collection::vec((0u32..50, 0u8..6, prop::bool::ANY), 0..120).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (price, seller, tools))| Listing {
                id: i as i64 + 1,
                name: format!("Item {}", i + 1),
                price: f64::from(price),
                seller_id: format!("seller-{}", seller),
                category: if tools { "tools" } else { "books" }.to_string(),
                description: None,
                created_at: None,
            })
            .collect()
    })
}

async fn connected_client() -> (CacheClient, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let client = CacheClient::new(backend.clone(), ClientOptions::default());
    client.connect().await.unwrap();
    (client, backend)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Set-equal parameter mappings derive the same key regardless of
    // insertion order or map type.
    #[test]
    fn prop_key_ignores_parameter_order(params in param_map_strategy()) {
        let forward = generate_key("listings", &params).unwrap();

        let reversed: HashMap<&String, &String> = params.iter().rev().collect();
        let mut object = serde_json::Map::new();
        for (k, v) in params.iter().rev() {
            object.insert(k.clone(), serde_json::Value::String(v.clone()));
        }

        prop_assert_eq!(&forward, &generate_key("listings", &reversed).unwrap());
        prop_assert_eq!(&forward, &generate_key("listings", &object).unwrap());
        prop_assert_eq!(forward.namespace(), "listings");
    }

    #[test]
    fn prop_distinct_parameters_distinct_keys(
        a in param_map_strategy(),
        b in param_map_strategy()
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(generate_key("listings", &a).unwrap(), generate_key("listings", &b).unwrap());
    }

    #[test]
    fn prop_total_pages_is_ceiling(total in 0u64..1_000_000, page_size in 1u32..500) {
        let expected = (total + u64::from(page_size) - 1) / u64::from(page_size);
        prop_assert_eq!(total_pages(total, page_size), expected);
    }

    // Page lengths over 1..=total_pages add up to the total, and the page
    // after the last one is empty.
    #[test]
    fn prop_page_lengths_cover_total(total in 0u64..2_000, page_size in 1u32..100) {
        let pages = total_pages(total, page_size) as u32;
        let covered: u64 = (1..=pages)
            .map(|page| expected_page_len(total, page, page_size) as u64)
            .sum();

        prop_assert_eq!(covered, total);
        prop_assert_eq!(expected_page_len(total, pages + 1, page_size), 0);
    }

    #[test]
    fn prop_roundtrip_through_client(key in key_strategy(), value in value_strategy()) {
        tokio_test::block_on(async {
            let (client, _) = connected_client().await;
            client.set(&key, &value, TTL).await;
            prop_assert_eq!(client.get(&key).await, Some(value));
            Ok(())
        })?;
    }

    // Client counters match a model of the same operation sequence.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        tokio_test::block_on(async {
            let (client, _) = connected_client().await;
            let mut model: HashMap<String, String> = HashMap::new();
            let (mut hits, mut misses, mut sets) = (0u64, 0u64, 0u64);

            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        client.set(&key, &value, TTL).await;
                        model.insert(key, value);
                        sets += 1;
                    }
                    CacheOp::Get { key } => {
                        let got = client.get(&key).await;
                        prop_assert_eq!(got.as_ref(), model.get(&key));
                        if got.is_some() { hits += 1 } else { misses += 1 }
                    }
                    CacheOp::Delete { key } => {
                        prop_assert_eq!(client.delete(&key).await, model.remove(&key).is_some());
                    }
                }
            }

            let info = client.info().await;
            prop_assert_eq!((info.hits, info.misses, info.sets, info.errors), (hits, misses, sets, 0));
            prop_assert_eq!(info.key_count, model.len() as u64);
            Ok(())
        })?;
    }

    // With the cache unavailable, get_or_fetch is the producer.
    #[test]
    fn prop_degraded_equivalence(key in key_strategy(), values in prop::collection::vec(any::<i64>(), 1..5)) {
        tokio_test::block_on(async {
            let (client, backend) = connected_client().await;
            backend.set_available(false);
            let cache = QueryCache::new(client.clone());

            for value in values {
                let got = cache
                    .get_or_fetch(&key, || async move { Ok::<_, MarketError>(value) }, TTL)
                    .await
                    .unwrap();
                prop_assert_eq!(got, value);
            }

            client.disconnect().await;
            backend.set_available(true);
            prop_assert_eq!(backend.key_count().await.unwrap(), 0);
            Ok(())
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // Every page agrees with the reported total, stats match the page total,
    // and the pages concatenate into the full ordered result.
    #[test]
    fn prop_engine_pages_agree_with_counts(
        listings in listings_strategy(),
        page_size in 1u32..30,
        tools_only in prop::bool::ANY
    ) {
        tokio_test::block_on(async {
            let filters = if tools_only {
                ListingFilters::default().with_category("tools")
            } else {
                ListingFilters::default()
            };
            let matching = listings.iter().filter(|l| filters.matches(l)).count() as u64;

            let (client, _) = connected_client().await;
            let engine = AggregationEngine::new(
                Arc::new(InMemoryCatalog::new(listings)),
                QueryCache::new(client),
            );

            let pages = total_pages(matching, page_size) as u32;
            let mut seen = Vec::new();
            for page in 1..=pages + 1 {
                let view = engine
                    .get_marketplace_view(filters.clone(), page, Some(page_size))
                    .await
                    .unwrap();

                prop_assert_eq!(view.stats.total_items, view.result.total_items);
                prop_assert_eq!(view.result.total_items, matching);
                prop_assert_eq!(view.result.items.len(), expected_page_len(matching, page, page_size));
                seen.extend(view.result.items);
            }

            prop_assert_eq!(seen.len() as u64, matching);
            prop_assert!(seen
                .windows(2)
                .all(|w| w[0].price > w[1].price || (w[0].price == w[1].price && w[0].id < w[1].id)));
            Ok(())
        })?;
    }
}
