use std::{collections::HashMap, path::Path};

use serde::Serialize;

use super::{
    document::{CanonicalDocument, ExperimentName, ResourceIdentity},
    kind::{ChaosKind, ResourceKind},
    resolve::{DefinitionSource, ResolutionError, resolve},
};

/// A pre-existing resource the run activates and later pauses, never deletes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BorrowedReference {
    kind: ResourceKind,
    identity: ResourceIdentity,
}

impl BorrowedReference {
    #[must_use]
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            identity: ResourceIdentity::new(namespace, name),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    #[must_use]
    pub const fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn experiment_name(&self) -> ExperimentName {
        ExperimentName::new(&self.kind, &self.identity)
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ExperimentDefinition<'a> {
    /// Created by the run and deleted on teardown.
    Owned(&'a CanonicalDocument),
    /// Activated by the run and paused again on teardown.
    Borrowed(&'a BorrowedReference),
}

impl ExperimentDefinition<'_> {
    #[must_use]
    pub const fn kind(&self) -> &ResourceKind {
        match self {
            Self::Owned(document) => document.kind(),
            Self::Borrowed(reference) => reference.kind(),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &ResourceIdentity {
        match self {
            Self::Owned(document) => document.identity(),
            Self::Borrowed(reference) => reference.identity(),
        }
    }
}

/// Frozen set of experiments for one scenario run.
///
/// Order is preserved within a kind. Iteration order across kinds follows
/// the underlying hash map and is unspecified; callers must not
/// depend on one kind being set up before another.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    owned: HashMap<ResourceKind, Vec<CanonicalDocument>>,
    borrowed: HashMap<ResourceKind, Vec<BorrowedReference>>,
    workflows: Vec<CanonicalDocument>,
}

impl Registry {
    /// Owned experiments, kind by kind, each kind in registration order.
    pub fn owned(&self) -> impl Iterator<Item = &CanonicalDocument> {
        self.owned.values().flatten()
    }

    #[must_use]
    pub fn owned_of(&self, kind: &ResourceKind) -> &[CanonicalDocument] {
        self.owned.get(kind).map_or(&[], Vec::as_slice)
    }

    pub fn borrowed(&self) -> impl Iterator<Item = &BorrowedReference> {
        self.borrowed.values().flatten()
    }

    #[must_use]
    pub fn borrowed_of(&self, kind: &ResourceKind) -> &[BorrowedReference] {
        self.borrowed.get(kind).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn workflows(&self) -> &[CanonicalDocument] {
        &self.workflows
    }

    /// Every definition, in the order the lifecycle controller visits them.
    pub fn definitions(&self) -> impl Iterator<Item = ExperimentDefinition<'_>> {
        self.owned()
            .map(ExperimentDefinition::Owned)
            .chain(self.borrowed().map(ExperimentDefinition::Borrowed))
            .chain(self.workflows.iter().map(ExperimentDefinition::Owned))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owned.values().map(Vec::len).sum::<usize>()
            + self.borrowed.values().map(Vec::len).sum::<usize>()
            + self.workflows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fluent accumulator for the experiments of a scenario.
///
/// Registration never touches the cluster. The first resolution failure is
/// kept and returned by [`ExperimentsBuilder::build`]; anything registered
/// after it is ignored.
#[derive(Debug, Default)]
pub struct ExperimentsBuilder {
    registry: Registry,
    error: Option<ResolutionError>,
}

impl ExperimentsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_struct<T>(self, kind: impl Into<ResourceKind>, experiment: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        let kind = kind.into();
        match DefinitionSource::inline(experiment) {
            Ok(source) => self.with_source(kind, source),
            Err(err) => self.fail(err),
        }
    }

    #[must_use]
    pub fn with_file(self, kind: impl Into<ResourceKind>, path: impl AsRef<Path>) -> Self {
        self.with_source(
            kind.into(),
            DefinitionSource::File(path.as_ref().to_owned()),
        )
    }

    #[must_use]
    pub fn with_text(self, kind: impl Into<ResourceKind>, text: &str) -> Self {
        self.with_source(kind.into(), DefinitionSource::Text(text.to_owned()))
    }

    #[must_use]
    pub fn with_existing(
        mut self,
        kind: impl Into<ResourceKind>,
        namespace: &str,
        name: &str,
    ) -> Self {
        if self.error.is_none() {
            let reference = BorrowedReference::new(kind.into(), namespace, name);
            self.registry
                .borrowed
                .entry(reference.kind().clone())
                .or_default()
                .push(reference);
        }
        self
    }

    #[must_use]
    pub fn with_workflow<T>(self, workflow: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        self.with_struct(ChaosKind::Workflow, workflow)
    }

    #[must_use]
    pub fn with_workflow_from_file(self, path: impl AsRef<Path>) -> Self {
        self.with_file(ChaosKind::Workflow, path)
    }

    #[must_use]
    pub fn with_workflow_from_yaml(self, text: &str) -> Self {
        self.with_text(ChaosKind::Workflow, text)
    }

    pub fn build(self) -> Result<Registry, ResolutionError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.registry),
        }
    }

    fn with_source(mut self, kind: ResourceKind, source: DefinitionSource) -> Self {
        if self.error.is_some() {
            return self;
        }
        match resolve(&kind, source) {
            Ok(document) => self.push_owned(document),
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Workflows confirm readiness through their own condition, so they are
    /// kept apart from single experiments.
    fn push_owned(&mut self, document: CanonicalDocument) {
        if *document.kind() == ChaosKind::Workflow.resource_kind() {
            self.registry.workflows.push(document);
        } else {
            self.registry
                .owned
                .entry(document.kind().clone())
                .or_default()
                .push(document);
        }
    }

    fn fail(mut self, err: ResolutionError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }
}

macro_rules! chaos_kind_registrations {
    ($($kind:ident => $with:ident, $from_file:ident, $from_yaml:ident, $existing:ident;)+) => {
        impl ExperimentsBuilder {
            $(
                #[doc = concat!(
                    "Registers an owned `",
                    stringify!($kind),
                    "` from a serializable value."
                )]
                #[must_use]
                pub fn $with<T>(self, experiment: &T) -> Self
                where
                    T: Serialize + ?Sized,
                {
                    self.with_struct(ChaosKind::$kind, experiment)
                }

                #[doc = concat!(
                    "Registers an owned `",
                    stringify!($kind),
                    "` from a YAML or JSON file."
                )]
                #[must_use]
                pub fn $from_file(self, path: impl AsRef<Path>) -> Self {
                    self.with_file(ChaosKind::$kind, path)
                }

                #[doc = concat!(
                    "Registers an owned `",
                    stringify!($kind),
                    "` from embedded YAML or JSON."
                )]
                #[must_use]
                pub fn $from_yaml(self, text: &str) -> Self {
                    self.with_text(ChaosKind::$kind, text)
                }

                #[doc = concat!(
                    "Activates a paused `",
                    stringify!($kind),
                    "` that already exists."
                )]
                #[must_use]
                pub fn $existing(self, namespace: &str, name: &str) -> Self {
                    self.with_existing(ChaosKind::$kind, namespace, name)
                }
            )+
        }
    };
}

chaos_kind_registrations! {
    AwsChaos =>
        with_aws_chaos,
        with_aws_chaos_from_file,
        with_aws_chaos_from_yaml,
        with_existing_aws_chaos;
    AzureChaos =>
        with_azure_chaos,
        with_azure_chaos_from_file,
        with_azure_chaos_from_yaml,
        with_existing_azure_chaos;
    BlockChaos =>
        with_block_chaos,
        with_block_chaos_from_file,
        with_block_chaos_from_yaml,
        with_existing_block_chaos;
    DnsChaos =>
        with_dns_chaos,
        with_dns_chaos_from_file,
        with_dns_chaos_from_yaml,
        with_existing_dns_chaos;
    GcpChaos =>
        with_gcp_chaos,
        with_gcp_chaos_from_file,
        with_gcp_chaos_from_yaml,
        with_existing_gcp_chaos;
    HttpChaos =>
        with_http_chaos,
        with_http_chaos_from_file,
        with_http_chaos_from_yaml,
        with_existing_http_chaos;
    IoChaos =>
        with_io_chaos,
        with_io_chaos_from_file,
        with_io_chaos_from_yaml,
        with_existing_io_chaos;
    JvmChaos =>
        with_jvm_chaos,
        with_jvm_chaos_from_file,
        with_jvm_chaos_from_yaml,
        with_existing_jvm_chaos;
    KernelChaos =>
        with_kernel_chaos,
        with_kernel_chaos_from_file,
        with_kernel_chaos_from_yaml,
        with_existing_kernel_chaos;
    NetworkChaos =>
        with_network_chaos,
        with_network_chaos_from_file,
        with_network_chaos_from_yaml,
        with_existing_network_chaos;
    PhysicalMachineChaos =>
        with_physical_machine_chaos,
        with_physical_machine_chaos_from_file,
        with_physical_machine_chaos_from_yaml,
        with_existing_physical_machine_chaos;
    PodChaos =>
        with_pod_chaos,
        with_pod_chaos_from_file,
        with_pod_chaos_from_yaml,
        with_existing_pod_chaos;
    PodHttpChaos =>
        with_pod_http_chaos,
        with_pod_http_chaos_from_file,
        with_pod_http_chaos_from_yaml,
        with_existing_pod_http_chaos;
    PodIoChaos =>
        with_pod_io_chaos,
        with_pod_io_chaos_from_file,
        with_pod_io_chaos_from_yaml,
        with_existing_pod_io_chaos;
    PodNetworkChaos =>
        with_pod_network_chaos,
        with_pod_network_chaos_from_file,
        with_pod_network_chaos_from_yaml,
        with_existing_pod_network_chaos;
    StressChaos =>
        with_stress_chaos,
        with_stress_chaos_from_file,
        with_stress_chaos_from_yaml,
        with_existing_stress_chaos;
    TimeChaos =>
        with_time_chaos,
        with_time_chaos_from_file,
        with_time_chaos_from_yaml,
        with_existing_time_chaos;
}
