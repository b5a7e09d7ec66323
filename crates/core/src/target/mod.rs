use serde::{Deserialize, Serialize};

/// Light as described by the bridge. Only `uniqueid` matters for control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightDescriptor {
    #[serde(alias = "uniqueId", alias = "unique_id")]
    pub uniqueid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Group as described by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lights: Vec<String>,
}

/// A configured light: either a bare id or a full descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LightRef {
    Id(String),
    Descriptor(LightDescriptor),
}

impl LightRef {
    pub fn id(&self) -> &str {
        match self {
            LightRef::Id(id) => id,
            LightRef::Descriptor(light) => &light.uniqueid,
        }
    }
}

impl From<&str> for LightRef {
    fn from(value: &str) -> Self {
        LightRef::Id(value.to_string())
    }
}

impl From<String> for LightRef {
    fn from(value: String) -> Self {
        LightRef::Id(value)
    }
}

/// A configured group: either a bare id or a full descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Id(String),
    Descriptor(GroupDescriptor),
}

impl GroupRef {
    pub fn id(&self) -> &str {
        match self {
            GroupRef::Id(id) => id,
            GroupRef::Descriptor(group) => &group.id,
        }
    }
}

impl From<&str> for GroupRef {
    fn from(value: &str) -> Self {
        GroupRef::Id(value.to_string())
    }
}

impl From<String> for GroupRef {
    fn from(value: String) -> Self {
        GroupRef::Id(value)
    }
}

/// Lights and groups a scene was configured with. Either list may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSet {
    #[serde(default)]
    pub lights: Vec<LightRef>,
    #[serde(default)]
    pub groups: Vec<GroupRef>,
}

impl TargetSet {
    pub fn new<L, G>(lights: impl IntoIterator<Item = L>, groups: impl IntoIterator<Item = G>) -> Self
    where
        L: Into<LightRef>,
        G: Into<GroupRef>,
    {
        Self {
            lights: lights.into_iter().map(Into::into).collect(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty() && self.groups.is_empty()
    }

    pub fn resolve(&self) -> ResolvedTargets {
        ResolvedTargets {
            lights: resolve_lights(&self.lights),
            groups: resolve_groups(&self.groups),
        }
    }
}

/// Canonical ids, ready to hand to the device client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub lights: Vec<String>,
    pub groups: Vec<String>,
}

impl ResolvedTargets {
    pub fn only_lights(lights: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lights: lights.into_iter().map(Into::into).collect(),
            groups: Vec::new(),
        }
    }

    pub fn only_groups(groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lights: Vec::new(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty() && self.groups.is_empty()
    }

    /// Number of device calls a dispatch to these targets issues.
    pub fn len(&self) -> usize {
        self.lights.len() + self.groups.len()
    }
}

pub fn resolve_lights(configured: &[LightRef]) -> Vec<String> {
    configured.iter().map(|light| light.id().to_string()).collect()
}

pub fn resolve_groups(configured: &[GroupRef]) -> Vec<String> {
    configured.iter().map(|group| group.id().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_reduce_to_ids() {
        let targets: TargetSet = serde_json::from_str(
            r#"{
                "lights": ["1", {"uniqueid": "00:17:88:01", "name": "Desk"}],
                "groups": [{"id": "8", "lights": ["1", "2"]}, "0"]
            }"#,
        )
        .unwrap();

        let resolved = targets.resolve();
        assert_eq!(resolved.lights, vec!["1", "00:17:88:01"]);
        assert_eq!(resolved.groups, vec!["8", "0"]);
        assert_eq!(resolved.len(), 4);
    }

    #[test]
    fn empty_sets_are_legal() {
        let targets: TargetSet = serde_json::from_str("{}").unwrap();
        assert!(targets.is_empty());
        assert!(targets.resolve().is_empty());
    }

    #[test]
    fn bare_ids_pass_through() {
        let targets = TargetSet::new(["3", "4"], Vec::<GroupRef>::new());
        assert_eq!(resolve_lights(&targets.lights), vec!["3", "4"]);
    }
}
