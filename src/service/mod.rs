//! Named, remotely callable query functions
//!
//! A [`ServiceRegistrar`] accepts `(name, description, handler)` triples. The
//! in-process [`ServiceRegistry`] stores them and dispatches calls by name;
//! a remote deployment target only has to implement the same trait.
//!
//! Handlers never fail: query errors are turned into an error payload of the
//! endpoint's shape (`[{"error": ..}]`, `{"error": ..}` or `-1`).

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SupplyError};
use crate::similarity::{QueryError, SimilarityEngine, UNKNOWN_CLUSTER};

/// A deployed function: free-text query in, JSON out
pub type ServiceHandler = Box<dyn Fn(&str) -> Value + Send + Sync>;

/// Deployment target for named functions
pub trait ServiceRegistrar {
    /// Register `handler` under `name`, replacing any previous registration
    fn register(&mut self, name: &str, description: &str, handler: ServiceHandler);
}

/// Host and account a registry was deployed for
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    pub host: String,
    pub username: Option<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self
    }
}

struct Registration {
    description: String,
    handler: ServiceHandler,
}

/// Catalog entry of one registered function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
}

/// In-process registry of named functions
#[derive(Default)]
pub struct ServiceRegistry {
    endpoint: Endpoint,
    services: BTreeMap<String, Registration>,
}

impl ServiceRegistry {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            services: BTreeMap::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Invoke the function registered under `name`
    pub fn call(&self, name: &str, query: &str) -> Result<Value> {
        let registration =
            self.services
                .get(name)
                .ok_or_else(|| SupplyError::ServiceNotFound {
                    name: name.to_string(),
                })?;

        debug!("Calling {} with {:?}", name, query);
        Ok((registration.handler)(query))
    }

    /// Registered functions, ordered by name
    pub fn catalog(&self) -> Vec<ServiceInfo> {
        self.services
            .iter()
            .map(|(name, registration)| ServiceInfo {
                name: name.clone(),
                description: registration.description.clone(),
            })
            .collect()
    }
}

impl ServiceRegistrar for ServiceRegistry {
    fn register(&mut self, name: &str, description: &str, handler: ServiceHandler) {
        let registration = Registration {
            description: description.to_string(),
            handler,
        };
        if self.services.insert(name.to_string(), registration).is_some() {
            info!("Replaced service {} on {}", name, self.endpoint.host);
        } else {
            info!("Registered service {} on {}", name, self.endpoint.host);
        }
    }
}

pub const TOP_MATCHES: &str = "get_top_matches";
pub const COMPETITORS: &str = "get_competitors";
pub const CLUSTER_ID: &str = "get_cluster_id";
pub const PRICING_STATS: &str = "get_pricing_stats";
pub const SUPPLIER_SUMMARY: &str = "get_supplier_summary";
pub const BUYER_SUMMARY: &str = "get_buyer_summary";

/// Register the six similarity functions backed by `engine`.
///
/// `top_n` is the row count of the display endpoints.
pub fn register_similarity_services(
    registrar: &mut dyn ServiceRegistrar,
    engine: Arc<SimilarityEngine>,
    top_n: usize,
) {
    let e = Arc::clone(&engine);
    registrar.register(
        TOP_MATCHES,
        "Top matching transactions for a product description",
        Box::new(move |query: &str| list_payload(TOP_MATCHES, e.rank(query, top_n, None))),
    );

    let e = Arc::clone(&engine);
    registrar.register(
        COMPETITORS,
        "Alternative suppliers for the best matching product",
        Box::new(move |query: &str| list_payload(COMPETITORS, e.find_competitors(query, top_n))),
    );

    let e = Arc::clone(&engine);
    registrar.register(
        CLUSTER_ID,
        "Product cluster of the closest transaction",
        Box::new(move |query: &str| match e.try_cluster_of(query) {
            Ok(cluster) => json!(cluster),
            Err(err) => {
                warn!("{} failed: {}", CLUSTER_ID, err);
                json!(UNKNOWN_CLUSTER)
            }
        }),
    );

    let e = Arc::clone(&engine);
    registrar.register(
        PRICING_STATS,
        "Unit price distribution across similar transactions",
        Box::new(move |query: &str| match e.pricing_stats(query) {
            Ok(Some(stats)) => to_payload(&stats),
            Ok(None) => json!({}),
            Err(err) => {
                warn!("{} failed: {}", PRICING_STATS, err);
                json!({ "error": err.to_string() })
            }
        }),
    );

    let e = Arc::clone(&engine);
    registrar.register(
        SUPPLIER_SUMMARY,
        "Order count and mean unit price per supplier",
        Box::new(move |query: &str| list_payload(SUPPLIER_SUMMARY, e.supplier_summary(query))),
    );

    registrar.register(
        BUYER_SUMMARY,
        "Order count and mean unit price per buyer",
        Box::new(move |query: &str| list_payload(BUYER_SUMMARY, engine.buyer_summary(query))),
    );
}

fn list_payload<T: Serialize>(name: &str, result: std::result::Result<T, QueryError>) -> Value {
    match result {
        Ok(value) => to_payload(&value),
        Err(err) => {
            warn!("{} failed: {}", name, err);
            json!([{ "error": err.to_string() }])
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}
