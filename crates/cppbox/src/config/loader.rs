//! Configuration file loading for cppbox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.compiler.command.is_empty() {
            return Err(ConfigError::Invalid("empty compiler command".to_owned()));
        }
        if self.compiler.source_name.is_empty() {
            return Err(ConfigError::Invalid("empty source file name".to_owned()));
        }
        if self.compiler.output_name.is_empty() {
            return Err(ConfigError::Invalid("empty output binary name".to_owned()));
        }
        if self.compiler.source_name.contains('/') || self.compiler.output_name.contains('/') {
            return Err(ConfigError::Invalid(
                "source and output names must be bare file names".to_owned(),
            ));
        }
        if self.request.max_source_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_source_bytes must be nonzero".to_owned(),
            ));
        }

        Ok(())
    }
}
