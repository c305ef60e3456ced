/*!
 * Dynamic config distribution
 *
 * Components read the current [`DynamicClusterConfig`] as a cheap `Arc`
 * snapshot and subscribe to be woken when an operator installs a new one.
 */

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::DynamicClusterConfig;
use crate::error::Result;

pub struct ConfigManager {
    sender: watch::Sender<Arc<DynamicClusterConfig>>,
}

/// Receives every config installed after it was created
pub struct ConfigSubscription {
    receiver: watch::Receiver<Arc<DynamicClusterConfig>>,
}

impl ConfigSubscription {
    /// Wait for the next config; `None` once the manager is gone
    pub async fn changed(&mut self) -> Option<Arc<DynamicClusterConfig>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn current(&self) -> Arc<DynamicClusterConfig> {
        self.receiver.borrow().clone()
    }
}

impl ConfigManager {
    pub fn new(config: DynamicClusterConfig) -> Self {
        let (sender, _) = watch::channel(Arc::new(config));
        Self { sender }
    }

    pub fn config(&self) -> Arc<DynamicClusterConfig> {
        self.sender.borrow().clone()
    }

    /// Validate and install a new config
    ///
    /// Subscribers are only woken if the config actually differs.
    pub fn set_config(&self, config: DynamicClusterConfig) -> Result<()> {
        config.validate()?;

        let changed = self.sender.send_if_modified(|current| {
            if **current == config {
                return false;
            }
            *current = Arc::new(config);
            true
        });

        if changed {
            info!(subscribers = self.sender.receiver_count(), "Dynamic config updated");
        }
        Ok(())
    }

    pub fn subscribe_config_changed(&self) -> ConfigSubscription {
        ConfigSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn unsubscribe_config_changed(&self, subscription: ConfigSubscription) {
        drop(subscription);
        debug!(
            subscribers = self.sender.receiver_count(),
            "Config subscription dropped"
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
