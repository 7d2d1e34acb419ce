use std::fmt;

pub const CHAOS_MESH_GROUP: &str = "chaos-mesh.org";
pub const CHAOS_MESH_VERSION: &str = "v1alpha1";

/// Remote schema coordinates of a resource type.
///
/// The lifecycle controller treats this as an opaque, comparable key: it never
/// branches on a particular kind, it only forwards it to the control plane.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind {
    group: String,
    version: String,
    kind: String,
    plural: String,
}

impl ResourceKind {
    #[must_use]
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
        }
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn plural(&self) -> &str {
        &self.plural
    }

    /// `group/version`, or just `version` for the core group.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)
    }
}

/// Fault kinds served by the Chaos Mesh `v1alpha1` API group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChaosKind {
    AwsChaos,
    AzureChaos,
    BlockChaos,
    DnsChaos,
    GcpChaos,
    HttpChaos,
    IoChaos,
    JvmChaos,
    KernelChaos,
    NetworkChaos,
    PhysicalMachineChaos,
    PodChaos,
    PodHttpChaos,
    PodIoChaos,
    PodNetworkChaos,
    StressChaos,
    TimeChaos,
    Workflow,
}

impl ChaosKind {
    pub const ALL: [Self; 18] = [
        Self::AwsChaos,
        Self::AzureChaos,
        Self::BlockChaos,
        Self::DnsChaos,
        Self::GcpChaos,
        Self::HttpChaos,
        Self::IoChaos,
        Self::JvmChaos,
        Self::KernelChaos,
        Self::NetworkChaos,
        Self::PhysicalMachineChaos,
        Self::PodChaos,
        Self::PodHttpChaos,
        Self::PodIoChaos,
        Self::PodNetworkChaos,
        Self::StressChaos,
        Self::TimeChaos,
        Self::Workflow,
    ];

    /// (kind, plural) as registered by the Chaos Mesh CRDs.
    const fn names(self) -> (&'static str, &'static str) {
        match self {
            Self::AwsChaos => ("AWSChaos", "awschaos"),
            Self::AzureChaos => ("AzureChaos", "azurechaos"),
            Self::BlockChaos => ("BlockChaos", "blockchaos"),
            Self::DnsChaos => ("DNSChaos", "dnschaos"),
            Self::GcpChaos => ("GCPChaos", "gcpchaos"),
            Self::HttpChaos => ("HTTPChaos", "httpchaos"),
            Self::IoChaos => ("IOChaos", "iochaos"),
            Self::JvmChaos => ("JVMChaos", "jvmchaos"),
            Self::KernelChaos => ("KernelChaos", "kernelchaos"),
            Self::NetworkChaos => ("NetworkChaos", "networkchaos"),
            Self::PhysicalMachineChaos => ("PhysicalMachineChaos", "physicalmachinechaos"),
            Self::PodChaos => ("PodChaos", "podchaos"),
            Self::PodHttpChaos => ("PodHttpChaos", "podhttpchaos"),
            Self::PodIoChaos => ("PodIOChaos", "podiochaos"),
            Self::PodNetworkChaos => ("PodNetworkChaos", "podnetworkchaos"),
            Self::StressChaos => ("StressChaos", "stresschaos"),
            Self::TimeChaos => ("TimeChaos", "timechaos"),
            Self::Workflow => ("Workflow", "workflows"),
        }
    }

    #[must_use]
    pub const fn kind_name(self) -> &'static str {
        self.names().0
    }

    #[must_use]
    pub const fn plural(self) -> &'static str {
        self.names().1
    }

    #[must_use]
    pub fn resource_kind(self) -> ResourceKind {
        let (kind, plural) = self.names();
        ResourceKind::new(CHAOS_MESH_GROUP, CHAOS_MESH_VERSION, kind, plural)
    }

    #[must_use]
    pub fn from_kind_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.kind_name() == name)
    }
}

impl From<ChaosKind> for ResourceKind {
    fn from(kind: ChaosKind) -> Self {
        kind.resource_kind()
    }
}

impl fmt::Display for ChaosKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chaos_kinds_map_to_chaos_mesh_group() {
        let kind = ChaosKind::NetworkChaos.resource_kind();
        assert_eq!(kind.api_version(), "chaos-mesh.org/v1alpha1");
        assert_eq!(kind.kind(), "NetworkChaos");
        assert_eq!(kind.plural(), "networkchaos");
        assert_eq!(ChaosKind::Workflow.plural(), "workflows");
    }

    #[test]
    fn kind_names_are_unique_and_reversible() {
        for kind in ChaosKind::ALL {
            assert_eq!(ChaosKind::from_kind_name(kind.kind_name()), Some(kind));
        }
        assert_eq!(ChaosKind::from_kind_name("Deployment"), None);
    }

    #[test]
    fn core_group_api_version_has_no_prefix() {
        let kind = ResourceKind::new("", "v1", "ConfigMap", "configmaps");
        assert_eq!(kind.api_version(), "v1");
        assert_eq!(kind.to_string(), "ConfigMap");
    }
}
