//! Activation context passed by the host on initialization.

use serde::{Deserialize, Serialize};

/// Where the context menu was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationSite {
    /// Empty area of the desktop.
    DesktopBackground,
    /// Empty area of a folder window.
    FolderBackground,
    /// One or more selected items.
    Selection,
    /// Host gave nothing recognizable.
    Unknown,
}

impl InvocationSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DesktopBackground => "desktop_background",
            Self::FolderBackground => "folder_background",
            Self::Selection => "selection",
            Self::Unknown => "unknown",
        }
    }
}

/// Sites where the menu is offered unless configured otherwise.
pub const DEFAULT_QUALIFYING_SITES: &[InvocationSite] = &[InvocationSite::DesktopBackground];

/// Descriptor the host supplies on activation.
///
/// The host's auxiliary data object and key are opaque to this extension;
/// only their presence is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationContext {
    pub site: InvocationSite,
    pub has_data_object: bool,
    pub has_class_key: bool,
}

impl ActivationContext {
    pub fn new(site: InvocationSite) -> Self {
        Self {
            site,
            has_data_object: false,
            has_class_key: false,
        }
    }

    pub fn desktop_background() -> Self {
        Self::new(InvocationSite::DesktopBackground)
    }

    /// Whether this context is one of `qualifying` sites.
    pub fn qualifies(&self, qualifying: &[InvocationSite]) -> bool {
        qualifying.contains(&self.site)
    }
}

#[cfg(test)]
mod tests {
    use super::{ActivationContext, InvocationSite, DEFAULT_QUALIFYING_SITES};

    #[test]
    fn only_desktop_background_qualifies_by_default() {
        assert!(ActivationContext::desktop_background().qualifies(DEFAULT_QUALIFYING_SITES));
        for site in [
            InvocationSite::FolderBackground,
            InvocationSite::Selection,
            InvocationSite::Unknown,
        ] {
            assert!(!ActivationContext::new(site).qualifies(DEFAULT_QUALIFYING_SITES));
        }
    }

    #[test]
    fn site_serializes_as_snake_case() {
        let json = serde_json::to_string(&InvocationSite::FolderBackground).expect("serialize");
        assert_eq!(json, "\"folder_background\"");
        assert_eq!(InvocationSite::FolderBackground.as_str(), "folder_background");
    }
}
