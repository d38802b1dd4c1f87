use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;

use crate::{
    content::{ContentStore, keys, parse_bool},
    error::Result,
};

/// Editing surface for the content store.
#[derive(Clone)]
pub struct ContentAdmin {
    store: Arc<dyn ContentStore>,
}

fn clean(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => parse_bool(Some(s.trim()), false),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl ContentAdmin {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn all(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.store.load().await?.into_iter().collect())
    }

    /// Store every given key as-is; `null` becomes an empty value.
    pub async fn put_all(&self, data: Map<String, Value>) -> Result<usize> {
        let items: Vec<(String, String)> = data.iter().map(|(k, v)| (k.clone(), clean(v))).collect();
        self.save(items).await
    }

    pub async fn texts(&self) -> Result<BTreeMap<String, String>> {
        let values = self.store.load().await?;
        Ok(keys::TEXT_KEYS
            .iter()
            .map(|k| (k.to_string(), values.get(*k).cloned().unwrap_or_default()))
            .collect())
    }

    /// Only known text keys are written; anything else in `data` is ignored.
    pub async fn put_texts(&self, data: Map<String, Value>) -> Result<usize> {
        let items = keys::TEXT_KEYS
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), clean(v))))
            .collect();
        self.save(items).await
    }

    /// Settings and photo references; toggles are reported as booleans.
    pub async fn settings(&self) -> Result<BTreeMap<String, Value>> {
        let values = self.store.load().await?;
        Ok(settings_keys()
            .map(|k| {
                let raw = values.get(k).map(String::as_str);
                let value = if keys::TOGGLE_KEYS.contains(&k) {
                    Value::Bool(parse_bool(raw, true))
                } else {
                    Value::String(raw.unwrap_or_default().to_string())
                };
                (k.to_string(), value)
            })
            .collect())
    }

    /// Toggles are stored as `"true"`/`"false"`.
    pub async fn put_settings(&self, data: Map<String, Value>) -> Result<usize> {
        let items = settings_keys()
            .filter_map(|k| {
                let value = data.get(k)?;
                let stored = if keys::TOGGLE_KEYS.contains(&k) {
                    truthy(value).to_string()
                } else {
                    clean(value)
                };
                Some((k.to_string(), stored))
            })
            .collect();
        self.save(items).await
    }

    async fn save(&self, items: Vec<(String, String)>) -> Result<usize> {
        let count = items.len();
        if count > 0 {
            self.store.save_many(items).await?;
        }
        info!(count, "content updated");
        Ok(count)
    }
}

fn settings_keys() -> impl Iterator<Item = &'static str> {
    keys::SETTINGS_KEYS
        .iter()
        .chain(keys::TOGGLE_KEYS)
        .chain(keys::PHOTO_KEYS)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemoryContentStore;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn toggles_round_trip_as_booleans() {
        let store = Arc::new(InMemoryContentStore::new());
        let admin = ContentAdmin::new(store.clone());

        let settings = admin.settings().await.unwrap();
        assert_eq!(settings["enabled_menu_scan"], Value::Bool(true));
        assert_eq!(settings[keys::ORDERS_CHAT_ID], Value::String(String::new()));

        admin
            .put_settings(object(json!({
                "enabled_menu_scan": false,
                "enabled_menu_idea": "no",
                "orders_chat_id": -100123,
                "unrelated": "x"
            })))
            .await
            .unwrap();

        let raw = store.load().await.unwrap();
        assert_eq!(raw["enabled_menu_scan"], "false");
        assert_eq!(raw["enabled_menu_idea"], "false");
        assert_eq!(raw[keys::ORDERS_CHAT_ID], "-100123");
        assert!(!raw.contains_key("unrelated"));

        let settings = admin.settings().await.unwrap();
        assert_eq!(settings["enabled_menu_scan"], Value::Bool(false));
    }

    #[tokio::test]
    async fn texts_only_touch_known_keys() {
        let store = Arc::new(InMemoryContentStore::new());
        let admin = ContentAdmin::new(store.clone());
        let saved = admin
            .put_texts(object(json!({
                "welcome_menu_msg": "Здравствуйте!",
                "photo_main_menu": "https://img"
            })))
            .await
            .unwrap();
        assert_eq!(saved, 1);

        let texts = admin.texts().await.unwrap();
        assert_eq!(texts["welcome_menu_msg"], "Здравствуйте!");
        assert_eq!(texts.len(), keys::TEXT_KEYS.len());

        admin
            .put_all(object(json!({"photo_main_menu": null, "custom": 5})))
            .await
            .unwrap();
        let all = admin.all().await.unwrap();
        assert_eq!(all["photo_main_menu"], "");
        assert_eq!(all["custom"], "5");
    }
}
