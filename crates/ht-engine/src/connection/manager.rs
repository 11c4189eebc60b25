//! Chain resolution over a shared prefix cache

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use ht_core::error::{ConfigError, ConnectionError};
use ht_core::traits::{RemoteClient, Transport};
use ht_core::types::{ChainSpec, CHAIN_SEPARATOR};

/// One cache slot. Concurrent resolvers of the same new prefix wait on the
/// same cell, so only one of them dials; a failed dial leaves the cell empty
/// and the next waiter dials in its place.
type Slot<C> = Arc<OnceCell<Arc<C>>>;

/// Resolves chain specifications into authenticated clients for their last hop.
///
/// Every prefix of a resolved chain (`a`, `a/b`, `a/b/c`) is cached, so chains
/// sharing a prefix share the already-established hops. Entries live as long
/// as the manager; there is no eviction.
pub struct ConnectionManager<T: Transport> {
    /// Dials and tunnels hops
    transport: T,
    /// Clients keyed by prefix-joined chain string
    cache: DashMap<String, Slot<T::Client>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager with an empty cache
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cache: DashMap::new(),
        }
    }

    /// Resolve `chain`, dialing only the hops whose prefix is not cached yet.
    ///
    /// Hops are walked strictly left to right: the first hop is dialed
    /// directly, every later hop is tunneled through the client of the
    /// prefix before it. Failure at any hop fails the whole resolution and
    /// names the hop; prefixes established before it stay cached.
    pub async fn resolve(&self, chain: &ChainSpec) -> Result<Arc<T::Client>, ConnectionError> {
        let mut current: Option<Arc<T::Client>> = None;

        for (hop, prefix) in chain.hops().iter().zip(chain.prefixes()) {
            let slot = self.slot(&prefix);

            if let Some(client) = slot.get() {
                tracing::debug!("Reusing cached connection for {}", prefix);
                current = Some(Arc::clone(client));
                continue;
            }

            let via = current.take();
            let client = slot
                .get_or_try_init(|| async {
                    let client = match via.as_deref() {
                        None => {
                            tracing::info!("Dialing {}", hop);
                            self.transport.dial(hop).await
                        }
                        Some(via) => {
                            tracing::info!("Tunneling to {} through {}", hop, via.hop());
                            self.transport.tunnel(via, hop).await
                        }
                    }
                    .map_err(|e| e.at_hop(prefix.as_str()))?;

                    tracing::info!("Connected {}", prefix);
                    Ok::<_, ConnectionError>(Arc::new(client))
                })
                .await?;

            current = Some(Arc::clone(client));
        }

        current.ok_or_else(|| {
            ConfigError::InvalidChain("chain specification has no hops".to_string()).into()
        })
    }

    /// Parse and resolve a chain string
    pub async fn resolve_str(&self, chain: &str) -> Result<Arc<T::Client>, ConnectionError> {
        let chain = ChainSpec::parse(chain)?;
        self.resolve(&chain).await
    }

    /// Whether `prefix` has an established client
    pub fn is_cached(&self, prefix: &str) -> bool {
        self.cache
            .get(prefix)
            .map(|slot| slot.initialized())
            .unwrap_or(false)
    }

    /// All established prefixes, sorted
    pub fn cached_prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self
            .cache
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        prefixes.sort();
        prefixes
    }

    /// Number of established prefixes
    pub fn len(&self) -> usize {
        self.cache
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    /// Check if nothing is established
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every cached client, deepest prefixes first, and empty the cache
    pub async fn shutdown(&self) {
        let mut clients: Vec<(String, Arc<T::Client>)> = self
            .cache
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .get()
                    .map(|client| (entry.key().clone(), Arc::clone(client)))
            })
            .collect();
        self.cache.clear();

        clients.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.matches(CHAIN_SEPARATOR).count()));

        for (prefix, client) in clients {
            tracing::debug!("Disconnecting {}", prefix);
            client.disconnect().await;
        }
    }

    fn slot(&self, prefix: &str) -> Slot<T::Client> {
        // clone the Arc out so no map guard is held across an await
        Arc::clone(
            self.cache
                .entry(prefix.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        )
    }
}
