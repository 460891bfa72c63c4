use crate::config::AppConfig;
use std::sync::Arc;

/// Read access to configuration for code that should not see `AppConfig`.
pub trait ConfigProvider: Send + Sync {
    /// Configuration bag of one module.
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;

    /// A whole global section as JSON: "app", "logging" or "registry".
    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value>;
}

/// Implementation of ConfigProvider that uses AppConfig
#[derive(Clone)]
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<AppConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }
}

impl ConfigProvider for AppConfigProvider {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.modules.get(module_name)
    }

    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "app" => serde_json::to_value(&self.0.app).ok(),
            "registry" => serde_json::to_value(&self.0.registry).ok(),
            "logging" => self
                .0
                .logging
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exposes_module_bags_and_sections() {
        let mut config = AppConfig::default();
        config.modules.insert("blog".into(), json!({"per_page": 10}));
        config.registry.theme = Some("dark".into());
        let provider = AppConfigProvider::new(config);

        assert_eq!(provider.get_module_config("blog"), Some(&json!({"per_page": 10})));
        assert!(provider.get_module_config("shop").is_none());

        let registry = provider.get_config_raw("registry").unwrap();
        assert_eq!(registry["theme"], "dark");
        assert_eq!(registry["paths"], json!(["modules"]));
        assert!(provider.get_config_raw("logging").is_some());
        assert!(provider.get_config_raw("server").is_none());
    }
}
