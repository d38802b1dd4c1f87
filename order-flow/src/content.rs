use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;

/// Key/value configuration edited by staff: texts, button labels, image
/// references and feature toggles.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn load(&self) -> Result<HashMap<String, String>>;
    async fn save_many(&self, items: Vec<(String, String)>) -> Result<()>;
}

/// Known configuration keys, grouped the way the admin panel edits them.
pub mod keys {
    pub const ORDERS_CHAT_ID: &str = "orders_chat_id";
    pub const MANAGER_USERNAME: &str = "manager_username";
    pub const PLACEHOLDER_PHOTO: &str = "placeholder_photo_path";

    pub const TEXT_KEYS: &[&str] = &[
        "welcome_menu_msg",
        "text_submit_ok",
        "text_submit_fail",
        "text_result_prefix",
        "text_price_note",
        "btn_menu_print",
        "btn_menu_scan",
        "btn_menu_idea",
        "btn_menu_about",
        "text_print_tech",
        "btn_print_fdm",
        "btn_print_resin",
        "btn_print_unknown",
        "text_select_material",
        "text_select_material_fdm",
        "text_select_material_resin",
        "text_select_material_unknown",
        "btn_mat_petg",
        "btn_mat_pla",
        "btn_mat_petg_carbon",
        "btn_mat_tpu",
        "btn_mat_nylon",
        "btn_mat_other",
        "btn_resin_standard",
        "btn_resin_abs",
        "btn_resin_tpu",
        "btn_resin_nylon",
        "btn_resin_other",
        "text_describe_material",
        "text_attach_file",
        "text_describe_task",
        "text_scan_type",
        "btn_scan_human",
        "btn_scan_object",
        "btn_scan_industrial",
        "btn_scan_other",
        "text_idea_type",
        "btn_idea_photo",
        "btn_idea_award",
        "btn_idea_master",
        "btn_idea_sign",
        "btn_idea_other",
        "about_text",
        "btn_about_equipment",
        "btn_about_projects",
        "btn_about_contacts",
        "btn_about_map",
        "about_equipment_text",
        "about_projects_text",
        "about_contacts_text",
        "about_map_text",
    ];

    pub const PHOTO_KEYS: &[&str] = &[
        "photo_main_menu",
        "photo_print",
        "photo_print_fdm",
        "photo_print_resin",
        "photo_scan",
        "photo_idea",
        "photo_about",
        "photo_about_equipment",
        "photo_about_projects",
        "photo_about_contacts",
        "photo_about_map",
    ];

    pub const TOGGLE_KEYS: &[&str] = &[
        "enabled_menu_print",
        "enabled_menu_scan",
        "enabled_menu_idea",
        "enabled_menu_about",
        "enabled_print_fdm",
        "enabled_print_resin",
        "enabled_print_unknown",
        "enabled_scan_human",
        "enabled_scan_object",
        "enabled_scan_industrial",
        "enabled_scan_other",
        "enabled_idea_photo",
        "enabled_idea_award",
        "enabled_idea_master",
        "enabled_idea_sign",
        "enabled_idea_other",
        "enabled_about_equipment",
        "enabled_about_projects",
        "enabled_about_contacts",
        "enabled_about_map",
    ];

    pub const SETTINGS_KEYS: &[&str] = &[ORDERS_CHAT_ID, MANAGER_USERNAME, PLACEHOLDER_PHOTO];
}

/// `""`/missing → `default`, otherwise one of `1/true/yes/on` (any case).
pub fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim) {
        None | Some("") => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    }
}

/// Snapshot of the content store taken once per event.
#[derive(Debug, Clone, Default)]
pub struct Content {
    values: HashMap<String, String>,
    placeholder_photo: String,
}

impl Content {
    pub fn new(values: HashMap<String, String>, placeholder_photo: impl Into<String>) -> Self {
        Self {
            values,
            placeholder_photo: placeholder_photo.into(),
        }
    }

    /// Reads the store; an unreachable store behaves like an empty one.
    pub async fn fetch(store: &dyn ContentStore, placeholder_photo: &str) -> Self {
        let values = store.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "content store unavailable, using built-in texts");
            HashMap::new()
        });
        Self::new(values, placeholder_photo)
    }

    /// Raw value; empty when unset.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    /// Configured text or the built-in fallback.
    pub fn text(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            "" => default.to_string(),
            value => value.to_string(),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        parse_bool(self.values.get(key).map(String::as_str), default)
    }

    /// Image for `key`, else the configured placeholder, else the built-in one.
    pub fn photo(&self, key: &str) -> Option<String> {
        [self.get(key), self.get(keys::PLACEHOLDER_PHOTO)]
            .into_iter()
            .find(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| self.placeholder())
    }

    pub fn placeholder(&self) -> Option<String> {
        match self.get(keys::PLACEHOLDER_PHOTO) {
            "" if self.placeholder_photo.is_empty() => None,
            "" => Some(self.placeholder_photo.clone()),
            configured => Some(configured.to_string()),
        }
    }
}

/// In-memory implementation of ContentStore
#[derive(Clone, Default)]
pub struct InMemoryContentStore {
    values: Arc<DashMap<String, String>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<K: Into<String>, V: Into<String>>(
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let store = Self::new();
        for (k, v) in values {
            store.values.insert(k.into(), v.into());
        }
        store
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn save_many(&self, items: Vec<(String, String)>) -> Result<()> {
        for (k, v) in items {
            self.values.insert(k, v);
        }
        Ok(())
    }
}
