//! Ownership lease over the shared store.
//!
//! Only one orchestrator instance may drive agent turns. The lease is a
//! compare-and-swap on [`paths::LEASE`]; losing it stops further turns.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::TurnError;
use crate::io::store::SharedStore;
use crate::io::world::paths;

#[derive(Clone)]
pub struct Lease {
    store: Arc<dyn SharedStore>,
    instance: String,
}

impl Lease {
    /// Claim the lease for `instance`. Re-claiming by the same instance (a
    /// reconnect) succeeds; any other holder yields [`TurnError::LeaseHeld`].
    pub async fn acquire(store: Arc<dyn SharedStore>, instance: &str) -> Result<Self> {
        let mine = Value::from(instance);
        let current = store.read(paths::LEASE).await?;
        match current {
            Some(ref holder) if *holder == mine => {}
            None | Some(Value::Null) => {
                if !store
                    .compare_and_swap(paths::LEASE, current.as_ref(), mine)
                    .await?
                {
                    let holder = store.read(paths::LEASE).await?;
                    return Err(held_by(holder.as_ref()));
                }
                info!(instance, "orchestrator lease acquired");
            }
            Some(ref holder) => return Err(held_by(Some(holder))),
        }
        Ok(Self {
            store,
            instance: instance.to_string(),
        })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Fails with [`TurnError::LeaseLost`] unless this instance still holds it.
    pub async fn verify(&self) -> Result<()> {
        let holder = self.store.read(paths::LEASE).await?;
        if holder.as_ref().and_then(Value::as_str) == Some(self.instance.as_str()) {
            return Ok(());
        }
        warn!(instance = %self.instance, holder = ?holder, "orchestrator lease lost");
        Err(TurnError::LeaseLost {
            instance: self.instance.clone(),
        }
        .into())
    }

    pub async fn release(self) -> Result<bool> {
        let mine = Value::from(self.instance.as_str());
        self.store
            .compare_and_swap(paths::LEASE, Some(&mine), Value::Null)
            .await
    }
}

fn held_by(holder: Option<&Value>) -> anyhow::Error {
    TurnError::LeaseHeld {
        holder: holder
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
    }
    .into()
}
