//! Bridge configuration

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::{CStr, CString};

/// Attachment tag used when none is configured.
pub const DEFAULT_ATTACHMENT_TAG: &str = "rs_obj";

pub(crate) const DEFAULT_ATTACHMENT_TAG_C: &CStr = c"rs_obj";

/// Environment variable overriding [`BridgeOptions::attachment_tag`].
pub const ATTACHMENT_TAG_ENV: &str = "LINPHONE_BRIDGE_TAG";

/// Options for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Key of the per-object attachment slot holding the identity marker.
    ///
    /// Must be unique among bindings loaded into the same process: two
    /// bindings sharing a tag overwrite each other's markers.
    pub attachment_tag: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            attachment_tag: DEFAULT_ATTACHMENT_TAG.to_string(),
        }
    }
}

impl BridgeOptions {
    /// Defaults, overridden by `LINPHONE_BRIDGE_TAG` when set.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(tag) = lookup(ATTACHMENT_TAG_ENV) {
            options.attachment_tag = tag;
        }
        options.validate()?;
        Ok(options)
    }

    /// Replace the attachment tag.
    pub fn with_attachment_tag(mut self, tag: impl Into<String>) -> Self {
        self.attachment_tag = tag.into();
        self
    }

    /// Check that every option can be handed to the native side.
    pub fn validate(&self) -> Result<()> {
        self.tag_cstring().map(|_| ())
    }

    pub(crate) fn tag_cstring(&self) -> Result<CString> {
        if self.attachment_tag.is_empty() {
            return Err(BridgeError::InvalidOption {
                name: "attachment_tag",
                reason: "must not be empty".into(),
            });
        }
        CString::new(self.attachment_tag.as_str()).map_err(|_| BridgeError::InvalidOption {
            name: "attachment_tag",
            reason: "must not contain NUL bytes".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tag() {
        let options = BridgeOptions::default();
        assert_eq!(options.attachment_tag, "rs_obj");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_default_tag_constants_agree() {
        assert_eq!(DEFAULT_ATTACHMENT_TAG_C.to_str().unwrap(), DEFAULT_ATTACHMENT_TAG);
        assert_eq!(BridgeOptions::default().tag_cstring().unwrap().as_c_str(), DEFAULT_ATTACHMENT_TAG_C);
    }

    #[test]
    fn test_from_vars_override() {
        let options = BridgeOptions::from_vars(|name| {
            (name == ATTACHMENT_TAG_ENV).then(|| "app_obj".to_string())
        })
        .unwrap();
        assert_eq!(options.attachment_tag, "app_obj");
    }

    #[test]
    fn test_from_vars_unset_keeps_default() {
        let options = BridgeOptions::from_vars(|_| None).unwrap();
        assert_eq!(options, BridgeOptions::default());
    }

    #[test]
    fn test_rejects_empty_tag() {
        let err = BridgeOptions::from_vars(|_| Some(String::new())).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidOption { name: "attachment_tag", .. }));
    }

    #[test]
    fn test_rejects_nul_in_tag() {
        let options = BridgeOptions::default().with_attachment_tag("rs\0obj");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let options: BridgeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, BridgeOptions::default());

        let options: BridgeOptions = serde_json::from_str(r#"{"attachment_tag":"x"}"#).unwrap();
        assert_eq!(options.attachment_tag, "x");
    }
}
