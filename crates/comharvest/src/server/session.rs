//! Storage for completed harvests.

use super::types::HarvestSummary;
use crate::harvest::HarvestedComponent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A completed harvest.
pub struct HarvestRecord {
    pub id: String,
    /// File path, or "entries" for classified input.
    pub source: String,
    pub component: HarvestedComponent,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl HarvestRecord {
    pub fn summary(&self) -> HarvestSummary {
        HarvestSummary {
            harvest_id: self.id.clone(),
            component_id: self.component.id.clone(),
            source: self.source.clone(),
            entities: self.component.entity_count(),
            entries: self.component.entries.len(),
            warnings: self
                .component
                .diagnostics
                .iter()
                .filter(|d| d.severity == crate::harvest::Severity::Warning)
                .count(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

/// Global harvest store.
#[derive(Clone, Default)]
pub struct HarvestStore {
    harvests: Arc<RwLock<HashMap<String, Arc<HarvestRecord>>>>,
}

impl HarvestStore {
    pub fn new() -> Self {
        HarvestStore::default()
    }

    /// Store a harvest and return its ID.
    pub async fn insert(&self, source: String, component: HarvestedComponent) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let record = HarvestRecord {
            id: id.clone(),
            source,
            component,
            created_at: chrono::Utc::now(),
        };
        let mut harvests = self.harvests.write().await;
        harvests.insert(id.clone(), Arc::new(record));
        id
    }

    pub async fn get(&self, id: &str) -> Option<Arc<HarvestRecord>> {
        let harvests = self.harvests.read().await;
        harvests.get(id).cloned()
    }

    /// Summaries, oldest first.
    pub async fn list(&self) -> Vec<HarvestSummary> {
        let harvests = self.harvests.read().await;
        let mut records: Vec<&Arc<HarvestRecord>> = harvests.values().collect();
        records.sort_by_key(|r| r.created_at);
        records.iter().map(|r| r.summary()).collect()
    }

    pub async fn count(&self) -> usize {
        let harvests = self.harvests.read().await;
        harvests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: &str) -> HarvestedComponent {
        HarvestedComponent {
            id: id.to_string(),
            entities: Vec::new(),
            entries: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = HarvestStore::new();
        let id = store.insert("C:\\a.dll".into(), component("a")).await;
        let record = store.get(&id).await.unwrap();
        assert_eq!(record.component.id, "a");
        assert_eq!(store.count().await, 1);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_list_summaries() {
        let store = HarvestStore::new();
        store.insert("entries".into(), component("c1")).await;
        let list = store.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].component_id, "c1");
        assert_eq!(list[0].entities, 0);
    }
}
