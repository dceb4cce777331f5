//! Active stream configuration.
//!
//! The model holds at most one [`StreamConfiguration`] and only ever holds a
//! complete one: [`ConfigurationModel::replace`] validates before swapping, so
//! a rejected configuration leaves the previous one in place.

use crate::error::{C37118Error, Result};
use crate::types::{StationConfig, StreamConfiguration};

/// Holder of the configuration data frames are decoded against.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationModel {
    active: Option<StreamConfiguration>,
}

impl ConfigurationModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model holding `config`, validating it first.
    pub fn with_configuration(config: StreamConfiguration) -> Result<Self> {
        let mut model = Self::new();
        model.replace(config)?;
        Ok(model)
    }

    /// Current configuration, if any.
    #[inline]
    pub fn active(&self) -> Option<&StreamConfiguration> {
        self.active.as_ref()
    }

    /// Whether a configuration is loaded.
    #[inline]
    pub fn is_configured(&self) -> bool {
        self.active.is_some()
    }

    /// Look up a station of the active configuration by IDCODE.
    pub fn lookup_station(&self, id_code: u16) -> Result<&StationConfig> {
        match &self.active {
            Some(config) => config.lookup_station(id_code),
            None => Err(C37118Error::StationNotFound(id_code)),
        }
    }

    /// Validate `config` and make it the active configuration.
    ///
    /// On error the previous configuration is kept.
    pub fn replace(&mut self, config: StreamConfiguration) -> Result<()> {
        config.validate()?;
        tracing::debug!(
            id_code = config.identity.id_code,
            stations = config.stations.len(),
            "configuration replaced"
        );
        self.active = Some(config);
        Ok(())
    }

    /// Drop the active configuration.
    pub fn clear(&mut self) -> Option<StreamConfiguration> {
        self.active.take()
    }
}
