//! russh client handler for one hop

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use russh::client;
use russh_keys::key::PublicKey;

use ht_core::config::HostKeyPolicy;
use ht_core::types::HopAddress;

use super::host_keys::{self, HostKeyDecision};

/// Why the handler refused a host key, readable after the handshake fails
pub(crate) type RejectionSlot = Arc<Mutex<Option<String>>>;

/// Verifies the server key of a single hop against the configured policy
pub(crate) struct HopHandler {
    hop: HopAddress,
    policy: HostKeyPolicy,
    known_hosts: PathBuf,
    rejection: RejectionSlot,
}

impl HopHandler {
    pub(crate) fn new(hop: HopAddress, policy: HostKeyPolicy, known_hosts: PathBuf) -> Self {
        Self {
            hop,
            policy,
            known_hosts,
            rejection: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn rejection(&self) -> RejectionSlot {
        Arc::clone(&self.rejection)
    }
}

#[async_trait]
impl client::Handler for HopHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Host key for {}: {}", self.hop, fingerprint);

        if self.policy == HostKeyPolicy::AcceptAny {
            tracing::warn!(
                "Accepting host key for {} without verification ({})",
                self.hop,
                fingerprint
            );
            return Ok(true);
        }

        let lookup = host_keys::lookup(
            &self.hop.host,
            self.hop.port,
            server_public_key,
            &self.known_hosts,
        )
        .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", self.known_hosts, e))?;

        match host_keys::decide(self.policy, &lookup) {
            HostKeyDecision::Accept => Ok(true),
            HostKeyDecision::Learn => {
                tracing::info!("Learning new host key for {} ({})", self.hop, fingerprint);
                if let Err(e) = host_keys::learn(
                    &self.hop.host,
                    self.hop.port,
                    server_public_key,
                    &self.known_hosts,
                ) {
                    tracing::warn!("Failed to record host key for {}: {}", self.hop, e);
                }
                Ok(true)
            }
            HostKeyDecision::Reject(reason) => {
                tracing::warn!("Rejecting host key for {}: {}", self.hop, reason);
                *self.rejection.lock() = Some(reason);
                Ok(false)
            }
        }
    }
}
