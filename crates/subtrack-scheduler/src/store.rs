//! JSON file import/export for subscriptions.
//! Files are human-readable and accept either a bare array or
//! `{"subscriptions": [...]}`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use subtrack_core::{Result, Subscription, SubscriptionStore};

#[derive(Deserialize)]
#[serde(untagged)]
enum FileLayout {
    Bare(Vec<Subscription>),
    Wrapped { subscriptions: Vec<Subscription> },
}

#[derive(Serialize)]
struct Export<'a> {
    subscriptions: &'a [Subscription],
}

/// Subscriptions stored in a JSON file.
pub struct SubscriptionFile;

impl SubscriptionFile {
    /// Parse subscriptions from JSON text.
    pub fn parse(json: &str) -> Result<Vec<Subscription>> {
        let layout: FileLayout = serde_json::from_str(json)?;
        Ok(match layout {
            FileLayout::Bare(subs) | FileLayout::Wrapped { subscriptions: subs } => subs,
        })
    }

    /// Load subscriptions from disk.
    pub fn load(path: &Path) -> Result<Vec<Subscription>> {
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json)
    }

    /// Save subscriptions to disk.
    pub fn save(path: &Path, subs: &[Subscription]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&Export { subscriptions: subs })?;
        std::fs::write(path, json)?;
        tracing::debug!("💾 Saved {} subscriptions to {}", subs.len(), path.display());
        Ok(())
    }

    /// Write every subscription in `path` into `store`. Entries without an
    /// id get a fresh one.
    pub async fn import(path: &Path, store: &dyn SubscriptionStore) -> Result<usize> {
        let mut subs = Self::load(path)?;
        for sub in &mut subs {
            if sub.id.trim().is_empty() {
                sub.id = uuid::Uuid::new_v4().to_string();
                tracing::debug!("🆔 Assigned id {} to '{}'", sub.id, sub.name);
            }
            store.put(&sub.id, sub).await?;
        }
        tracing::info!("📥 Imported {} subscriptions from {}", subs.len(), path.display());
        Ok(subs.len())
    }
}
