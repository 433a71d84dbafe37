//! Load — config loading from file and environment variables.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use logtypes::Finder;

use super::model::ProcessorConfig;

const DEFAULT_CONFIG_FILE: &str = "/etc/log-processor/processor.toml";

impl ProcessorConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = std::env::var("PROCESSOR_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using environment variables", config_path);
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: ProcessorConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Environment variables override file config for deployment settings
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(queue_id) = var("PROCESSOR_QUEUE_ID") {
            self.queue_id = queue_id;
        }
        if let Some(dir) = var("PROCESSOR_SPOOL_DIR") {
            self.spool_dir = dir;
        }
        if let Some(output) = var("PROCESSOR_OUTPUT") {
            self.output = Some(output).filter(|o| !o.is_empty());
        }
        if let Some(threshold) = var("PROCESSOR_SCALE_THRESHOLD") {
            self.scale_threshold = threshold
                .parse()
                .map_err(|_| format!("PROCESSOR_SCALE_THRESHOLD must be a number, got {:?}", threshold))?;
        }
        if let Some(budget) = var("PROCESSOR_BUDGET_SECS") {
            self.invocation_budget_secs = budget
                .parse()
                .map_err(|_| format!("PROCESSOR_BUDGET_SECS must be a number, got {:?}", budget))?;
        }
        Ok(())
    }

    /// Validate that configuration values are sane
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_id.is_empty() {
            return Err("queue_id must not be empty".to_string());
        }
        if self.spool_dir.is_empty() {
            return Err("spool_dir must not be empty".to_string());
        }
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be > 0".to_string());
        }
        if self.processing_time_divisor < 1 {
            return Err("processing_time_divisor must be >= 1".to_string());
        }
        if self.invocation_budget_secs == 0 {
            return Err("invocation_budget_secs must be > 0".to_string());
        }
        if self.visibility_timeout_secs == 0 {
            return Err("visibility_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }

    /// Every `parsers` key must name a known log type
    pub fn validate_parsers(&self, log_types: &dyn Finder) -> Result<(), String> {
        match self.parsers.keys().find(|name| log_types.find(name).is_none()) {
            Some(name) => Err(format!("parser options for unknown log type {:?}", name)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.scale_threshold, 100);
        assert_eq!(config.processing_time_divisor, 2);
    }

    #[test]
    fn test_from_file_with_parser_options() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
queue_id = "ingest"
spool_dir = "/tmp/spool"
max_batch_size = 5

[parsers."Syslog.RFC5424"]
keep_structured_data = false
"#
        )
        .unwrap();

        let config = ProcessorConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.queue_id, "ingest");
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.scale_threshold, 100, "unset keys keep defaults");
        assert_eq!(
            config.parsers["Syslog.RFC5424"],
            serde_json::json!({"keep_structured_data": false})
        );

        let registry = logtypes::native::registry().unwrap();
        assert!(config.validate_parsers(&registry).is_ok());
    }

    #[test]
    fn test_unknown_parser_options_rejected() {
        let mut config = ProcessorConfig::default();
        config.parsers.insert("Nope.Missing".into(), serde_json::json!({}));
        let registry = logtypes::native::registry().unwrap();
        let err = config.validate_parsers(&registry).unwrap_err();
        assert!(err.contains("Nope.Missing"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PROCESSOR_QUEUE_ID", "overridden"),
            ("PROCESSOR_SCALE_THRESHOLD", "7"),
            ("PROCESSOR_OUTPUT", "/tmp/out.jsonl"),
        ]
        .into_iter()
        .collect();
        let mut config = ProcessorConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.queue_id, "overridden");
        assert_eq!(config.scale_threshold, 7);
        assert_eq!(config.output.as_deref(), Some("/tmp/out.jsonl"));
        assert_eq!(config.invocation_budget_secs, 300);

        let err = config
            .apply_overrides(|key| (key == "PROCESSOR_BUDGET_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.contains("PROCESSOR_BUDGET_SECS"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: [fn(&mut ProcessorConfig); 4] = [
            |c| c.max_batch_size = 0,
            |c| c.processing_time_divisor = 0,
            |c| c.invocation_budget_secs = 0,
            |c| c.queue_id.clear(),
        ];
        for mutate in cases {
            let mut config = ProcessorConfig::default();
            mutate(&mut config);
            assert!(config.validate().is_err());
        }
    }
}
