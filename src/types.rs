use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The deployment stage a snapshot was fetched for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Reference from a feature to the release that gates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureState {
    #[serde(default, alias = "featureEnabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseRef>,
}

impl FeatureState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            release: None,
        }
    }

    pub fn with_release(mut self, release_id: impl Into<String>) -> Self {
        self.release = Some(ReleaseRef {
            id: release_id.into(),
        });
        self
    }

    pub fn release_id(&self) -> Option<&str> {
        self.release.as_ref().map(|r| r.id.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseState {
    #[serde(default)]
    pub enabled: bool,
}

impl ReleaseState {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

/// Every feature and release state for one stage, as returned by a single fetch.
///
/// Snapshots are never patched: a refresh replaces the whole value. Unknown
/// JSON fields are ignored so newer services stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub features: HashMap<String, FeatureState>,
    #[serde(default)]
    pub releases: HashMap<String, ReleaseState>,
}

impl FlagSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, name: impl Into<String>) -> Self {
        self.stage = Some(Stage {
            id: None,
            name: Some(name.into()),
        });
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, state: FeatureState) -> Self {
        self.features.insert(name.into(), state);
        self
    }

    pub fn with_release(mut self, id: impl Into<String>, state: ReleaseState) -> Self {
        self.releases.insert(id.into(), state);
        self
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureState> {
        self.features.get(name)
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    /// Evaluate `name` against this snapshot.
    ///
    /// A feature is on when its own flag is on, or when the release it belongs
    /// to is on. Returns `None` for a feature this snapshot doesn't know, so the
    /// caller can apply its own default.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        let feature = self.features.get(name)?;

        if feature.enabled {
            return Some(true);
        }

        let release_enabled = feature
            .release_id()
            .and_then(|id| self.releases.get(id))
            .map(|release| release.enabled)
            .unwrap_or(false);

        Some(release_enabled)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
