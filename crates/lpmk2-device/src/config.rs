use lpmk2_frame::MAX_PAYLOAD;
use serde::Deserialize;

use crate::error::AttachError;

/// Default number of OUT transfers allowed in flight per device.
pub const DEFAULT_WRITES_IN_FLIGHT: usize = 8;

/// Controls per-device channel behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Capacity of the write admission gate.
    pub writes_in_flight: usize,
    /// Longest payload accepted per write; longer payloads are truncated.
    pub max_out_len: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            writes_in_flight: DEFAULT_WRITES_IN_FLIGHT,
            max_out_len: MAX_PAYLOAD,
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), AttachError> {
        if self.writes_in_flight == 0 {
            return Err(AttachError::InvalidConfig("writes_in_flight must be at least 1"));
        }
        if self.max_out_len == 0 || self.max_out_len > MAX_PAYLOAD {
            return Err(AttachError::InvalidConfig(
                "max_out_len must be between 1 and 407",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DeviceConfig::default();
        assert_eq!(config.writes_in_flight, 8);
        assert_eq!(config.max_out_len, 407);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DeviceConfig = serde_json::from_str(r#"{ "writes_in_flight": 2 }"#).unwrap();
        assert_eq!(config.writes_in_flight, 2);
        assert_eq!(config.max_out_len, MAX_PAYLOAD);
    }

    #[test]
    fn rejects_unusable_values() {
        let zero_gate = DeviceConfig {
            writes_in_flight: 0,
            ..DeviceConfig::default()
        };
        assert!(matches!(
            zero_gate.validate(),
            Err(AttachError::InvalidConfig(_))
        ));

        let oversized = DeviceConfig {
            max_out_len: MAX_PAYLOAD + 1,
            ..DeviceConfig::default()
        };
        assert!(oversized.validate().is_err());
    }
}
