use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{i18n::Translations, wait::RetryPolicy};

/// Where the synchronizer finds the fields it keeps in step.
///
/// Panel-relative paths (`entries`, `image`, `metadata_title`, `alt`,
/// `panel_title`) are resolved against each panel item; `property_label`
/// against each property item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldPaths {
    pub properties: String,
    pub panels: String,
    pub property_label: String,
    pub entries: String,
    pub image: String,
    pub metadata_form: String,
    pub metadata_title: String,
    pub alt: String,
    pub panel_title: String,
}

impl Default for FieldPaths {
    fn default() -> Self {
        Self {
            properties: "propertiesGroup/properties".to_string(),
            panels: "panels".to_string(),
            property_label: "label".to_string(),
            entries: "entries".to_string(),
            image: "image".to_string(),
            metadata_form: "metadataForm".to_string(),
            metadata_title: "image/metadataForm/title".to_string(),
            alt: "image/alt".to_string(),
            panel_title: "panelTitle".to_string(),
        }
    }
}

/// Translation key used for the "untitled" placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UntitledKey {
    pub namespace: String,
    pub key: String,
    pub variable: String,
}

impl Default for UntitledKey {
    fn default() -> Self {
        Self {
            namespace: "core".to_string(),
            key: "untitled".to_string(),
            variable: ":libraryTitle".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncOptions {
    pub paths: FieldPaths,
    pub reorder_delay_ms: u64,
    pub wait_interval_ms: u64,
    pub wait_retries: u32,
    pub image_kind: String,
    pub panel_kind: String,
    pub untitled: UntitledKey,
    pub translations: Translations,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            paths: FieldPaths::default(),
            reorder_delay_ms: 100,
            wait_interval_ms: 200,
            wait_retries: 50,
            image_kind: "Image".to_string(),
            panel_kind: "Panel".to_string(),
            untitled: UntitledKey::default(),
            translations: Translations::default(),
        }
    }
}

impl SyncOptions {
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn with_paths(mut self, paths: FieldPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_reorder_delay(mut self, delay: Duration) -> Self {
        self.reorder_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_wait_retries(mut self, retries: u32) -> Self {
        self.wait_retries = retries;
        self
    }

    pub fn with_kinds(mut self, image: impl Into<String>, panel: impl Into<String>) -> Self {
        self.image_kind = image.into();
        self.panel_kind = panel.into();
        self
    }

    pub fn with_translations(mut self, translations: Translations) -> Self {
        self.translations = translations;
        self
    }

    pub fn reorder_delay(&self) -> Duration {
        Duration::from_millis(self.reorder_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.wait_interval_ms), self.wait_retries)
    }
}
