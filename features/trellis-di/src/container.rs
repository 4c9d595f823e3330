use std::{collections::HashMap, rc::Rc};

use crate::{
    bind_info::InvalidBindResponse,
    context::{BindingCondition, InjectContext},
    errors::{BindError, InstallError, ResolveError},
    finalize::BindingFinalizer,
    instantiate::Instantiator,
    provider::Provider,
    singleton::{SingletonKey, SingletonRegistry},
    subcontainer::{CachedSubContainerCreator, SubContainerCreator},
    types::{BindingId, Instance, ScopeToken},
};

/// Handle into the container arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub(crate) usize);

/// One registered provider plus its activation metadata
#[derive(Clone)]
pub struct ProviderEntry {
    pub condition: Option<BindingCondition>,
    pub provider: Rc<dyn Provider>,
    pub non_lazy: bool,
    pub copy_into_sub_containers: bool,
}

/// Tunables threaded through the whole graph
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    /// Default policy for bindings that don't pick one explicitly
    pub invalid_bind_response: InvalidBindResponse,
    /// Backstop against runaway recursive resolution
    pub max_resolve_depth: usize,
}
impl Default for ContainerSettings {
    fn default() -> Self {
        ContainerSettings {
            invalid_bind_response: InvalidBindResponse::Assert,
            max_resolve_depth: 64,
        }
    }
}

struct ContainerRecord {
    providers: HashMap<BindingId, Vec<ProviderEntry>>,
    /// Delegated to in declaration order on local miss
    parents: Vec<ContainerId>,
    /// Owned sub-containers, torn down with this record
    children: Vec<ContainerId>,
    singletons: SingletonRegistry,
    pending: Vec<BindingFinalizer>,
    inject_queue: Vec<Instance>,
    /// Shared caching creators for singleton sub-container bindings
    cached_sub_creators: HashMap<ScopeToken, Rc<CachedSubContainerCreator>>,
    installing: bool,
    broken: bool,
    torn_down: bool,
}

impl ContainerRecord {
    fn new(providers: HashMap<BindingId, Vec<ProviderEntry>>, parents: Vec<ContainerId>) -> Self {
        ContainerRecord {
            providers,
            parents,
            children: Vec::new(),
            singletons: SingletonRegistry::new(),
            pending: Vec::new(),
            inject_queue: Vec::new(),
            cached_sub_creators: HashMap::new(),
            installing: false,
            broken: false,
            torn_down: false,
        }
    }
}

/// Arena of container records plus the shared resolution state.
///
/// Containers are addressed by [ContainerId] handles with explicit parent
/// links, so nested container graphs carry no ownership cycles.
pub struct ContainerGraph {
    containers: Vec<ContainerRecord>,
    instantiator: Rc<dyn Instantiator>,
    settings: ContainerSettings,
    /// Lookup chain of in-flight resolutions, for cycle detection
    resolving: Vec<(ContainerId, BindingId)>,
    next_token: u64,
    interned_tokens: HashMap<String, ScopeToken>,
}

impl ContainerGraph {
    pub fn new(instantiator: Rc<dyn Instantiator>) -> Self {
        Self::with_settings(instantiator, ContainerSettings::default())
    }

    pub fn with_settings(instantiator: Rc<dyn Instantiator>, settings: ContainerSettings) -> Self {
        ContainerGraph {
            containers: Vec::new(),
            instantiator,
            settings,
            resolving: Vec::new(),
            next_token: 0,
            interned_tokens: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    pub fn instantiator(&self) -> Rc<dyn Instantiator> {
        self.instantiator.clone()
    }

    fn record(&self, id: ContainerId) -> &ContainerRecord {
        &self.containers[id.0]
    }

    fn record_mut(&mut self, id: ContainerId) -> &mut ContainerRecord {
        &mut self.containers[id.0]
    }

    fn ensure_alive(&self, id: ContainerId) -> Result<(), ResolveError> {
        let record = self.record(id);
        if record.torn_down {
            return Err(ResolveError::TornDown);
        }
        if record.broken {
            return Err(ResolveError::ContainerBroken);
        }
        Ok(())
    }

    pub fn new_root(&mut self) -> ContainerId {
        let id = ContainerId(self.containers.len());
        self.containers.push(ContainerRecord::new(HashMap::new(), Vec::new()));
        tracing::debug!("Created root container #{}", id.0);
        id
    }

    pub fn new_child(&mut self, parent: ContainerId) -> Result<ContainerId, ResolveError> {
        self.new_child_of(vec![parent])
    }

    /// Child delegating to several parents, in declaration order
    pub fn new_child_of(&mut self, parents: Vec<ContainerId>) -> Result<ContainerId, ResolveError> {
        for &parent in &parents {
            self.ensure_alive(parent)?;
        }

        // Registrations flagged for propagation follow the child down
        let mut providers: HashMap<BindingId, Vec<ProviderEntry>> = HashMap::new();
        for &parent in &parents {
            for (id, entries) in &self.record(parent).providers {
                let copied: Vec<ProviderEntry> = entries
                    .iter()
                    .filter(|entry| entry.copy_into_sub_containers)
                    .cloned()
                    .collect();
                if !copied.is_empty() {
                    providers.entry(id.clone()).or_default().extend(copied);
                }
            }
        }

        let id = ContainerId(self.containers.len());
        self.containers
            .push(ContainerRecord::new(providers, parents.clone()));
        for parent in parents {
            self.record_mut(parent).children.push(id);
        }
        tracing::debug!("Created container #{}", id.0);
        Ok(id)
    }

    /// Fresh scope handle, unique within this graph
    pub fn new_scope_token(&mut self) -> ScopeToken {
        let token = ScopeToken(self.next_token);
        self.next_token += 1;
        token
    }

    /// Stable handle for a string key - same key, same token
    pub(crate) fn intern_scope_token(&mut self, key: &str) -> ScopeToken {
        if let Some(token) = self.interned_tokens.get(key) {
            return *token;
        }
        let token = self.new_scope_token();
        self.interned_tokens.insert(key.to_string(), token);
        token
    }

    pub(crate) fn singleton_mark(
        &mut self,
        container: ContainerId,
        key: SingletonKey,
        build: impl FnOnce() -> Rc<dyn Provider>,
    ) -> Rc<dyn Provider> {
        self.record_mut(container).singletons.mark(key, build)
    }

    pub(crate) fn cached_sub_creator(
        &mut self,
        container: ContainerId,
        token: ScopeToken,
        inner: Rc<dyn SubContainerCreator>,
    ) -> Rc<CachedSubContainerCreator> {
        self.record_mut(container)
            .cached_sub_creators
            .entry(token)
            .or_insert_with(|| Rc::new(CachedSubContainerCreator::new(inner)))
            .clone()
    }

    /// Queues a finalizer for the container's next install phase
    pub fn add_binding(&mut self, container: ContainerId, finalizer: BindingFinalizer) {
        self.record_mut(container).pending.push(finalizer);
    }

    /// Appends an entry; value-type contracts also get their optional shadow
    /// so optional-typed dependency sites are satisfied transparently
    pub fn register_provider(&mut self, container: ContainerId, id: BindingId, entry: ProviderEntry) {
        tracing::debug!("Registering provider for '{id}' in container #{}", container.0);
        if id.contract.value_type && !id.optional {
            self.record_mut(container)
                .providers
                .entry(id.optional_shadow())
                .or_default()
                .push(entry.clone());
        }
        self.record_mut(container)
            .providers
            .entry(id)
            .or_default()
            .push(entry);
    }

    /// Total registered entries, shadows included
    pub fn provider_count(&self, container: ContainerId) -> usize {
        self.record(container).providers.values().map(Vec::len).sum()
    }

    /// Queues an object for the member-injection pass at install completion
    pub fn queue_for_injection(&mut self, container: ContainerId, instance: Instance) {
        self.record_mut(container).inject_queue.push(instance);
    }

    /// Runs every pending finalizer exactly once, then the eager non-lazy
    /// pass, then the member-injection queue.
    ///
    /// Any fatal error leaves the container terminally broken.
    pub fn install(&mut self, container: ContainerId) -> Result<(), InstallError> {
        self.ensure_alive(container).map_err(InstallError::from)?;
        if self.record(container).installing {
            return Err(BindError::InstallInProgress.into());
        }

        tracing::debug!("Installing container #{}", container.0);
        self.record_mut(container).installing = true;
        let result = self.run_install(container);
        self.record_mut(container).installing = false;

        if let Err(error) = &result {
            tracing::error!("Install of container #{} failed: {error}", container.0);
            self.record_mut(container).broken = true;
        }
        result
    }

    fn run_install(&mut self, container: ContainerId) -> Result<(), InstallError> {
        // Finalizers may queue further bindings; drain until quiet
        loop {
            let pending = std::mem::take(&mut self.record_mut(container).pending);
            if pending.is_empty() {
                break;
            }
            tracing::debug!("Finalizing {} pending bindings", pending.len());
            for finalizer in pending {
                finalizer.finalize(self, container)?;
            }
        }

        self.resolve_dependency_roots(container)?;

        let queue = std::mem::take(&mut self.record_mut(container).inject_queue);
        let instantiator = self.instantiator();
        for instance in queue {
            instantiator.inject_members(self, container, &instance)?;
        }

        Ok(())
    }

    /// Eager pass: every non-lazy entry is realized once, referenced or not.
    ///
    /// Conditioned non-lazy entries are eager only when their condition
    /// accepts the install-time root context; otherwise they stay lazy.
    pub fn resolve_dependency_roots(&mut self, container: ContainerId) -> Result<(), ResolveError> {
        let mut roots = Vec::new();
        for (id, entries) in &self.record(container).providers {
            // The optional shadow shares its provider with the real entry
            if id.optional {
                continue;
            }
            for entry in entries {
                if entry.non_lazy {
                    roots.push((id.clone(), entry.condition.clone(), entry.provider.clone()));
                }
            }
        }

        for (id, condition, provider) in roots {
            let ctx = InjectContext::root(container, id.clone());
            if let Some(condition) = &condition {
                if !condition(&ctx) {
                    continue;
                }
            }
            tracing::debug!("Eagerly resolving non-lazy binding '{id}'");
            provider.get_instance(self, &ctx)?;
        }

        Ok(())
    }

    pub fn resolve(&mut self, container: ContainerId, id: &BindingId) -> Result<Instance, ResolveError> {
        let ctx = InjectContext::root(container, id.clone());
        self.resolve_with_context(container, id, &ctx)
    }

    pub fn resolve_with_context(
        &mut self,
        container: ContainerId,
        id: &BindingId,
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError> {
        match self.try_resolve_with_context(container, id, ctx)? {
            Some(instance) => Ok(instance),
            None => Err(ResolveError::NoBinding(id.clone())),
        }
    }

    /// Like [resolve](Self::resolve) but a miss is `Ok(None)`, for optional
    /// dependency sites
    pub fn try_resolve(
        &mut self,
        container: ContainerId,
        id: &BindingId,
    ) -> Result<Option<Instance>, ResolveError> {
        let ctx = InjectContext::root(container, id.clone());
        self.try_resolve_with_context(container, id, &ctx)
    }

    pub fn try_resolve_with_context(
        &mut self,
        container: ContainerId,
        id: &BindingId,
        ctx: &InjectContext,
    ) -> Result<Option<Instance>, ResolveError> {
        self.ensure_alive(container)?;
        self.enter_resolve(container, id)?;

        let result = match self.lookup_provider(container, id, ctx) {
            Ok(Some(provider)) => provider.get_instance(self, ctx).map(Some),
            Ok(None) => Ok(None),
            Err(error) => Err(error),
        };

        self.resolving.pop();
        result
    }

    /// Collection-typed resolution: every satisfied entry, registration order,
    /// local table first and then the parent chain
    pub fn resolve_all(
        &mut self,
        container: ContainerId,
        id: &BindingId,
    ) -> Result<Vec<Instance>, ResolveError> {
        self.ensure_alive(container)?;
        let ctx = InjectContext::root(container, id.clone());
        self.enter_resolve(container, id)?;

        let result = match self.collect_providers(container, id, &ctx) {
            Ok(providers) => {
                let mut instances = Vec::with_capacity(providers.len());
                let mut failure = None;
                for provider in providers {
                    match provider.get_instance(self, &ctx) {
                        Ok(instance) => instances.push(instance),
                        Err(error) => {
                            failure = Some(error);
                            break;
                        }
                    }
                }
                match failure {
                    Some(error) => Err(error),
                    None => Ok(instances),
                }
            }
            Err(error) => Err(error),
        };

        self.resolving.pop();
        result
    }

    /// Typed convenience for contracts bound to themselves
    pub fn resolve_type<T: 'static>(&mut self, container: ContainerId) -> Result<Rc<T>, ResolveError> {
        let instance = self.resolve(container, &BindingId::of::<T>())?;
        instance.downcast().map_err(|actual| ResolveError::Downcast {
            required: std::any::type_name::<T>(),
            actual,
        })
    }

    /// Resolves the optional shadow of a value-type contract
    pub fn resolve_optional<T: Copy + 'static>(
        &mut self,
        container: ContainerId,
    ) -> Result<Option<Rc<T>>, ResolveError> {
        let id = BindingId::new(crate::types::TypeInfo::of_value::<T>()).optional_shadow();
        match self.try_resolve(container, &id)? {
            Some(instance) => instance
                .downcast()
                .map(Some)
                .map_err(|actual| ResolveError::Downcast {
                    required: std::any::type_name::<T>(),
                    actual,
                }),
            None => Ok(None),
        }
    }

    /// Tears down the container and, transitively, every owned sub-container
    pub fn teardown(&mut self, container: ContainerId) {
        let record = self.record_mut(container);
        if record.torn_down {
            return;
        }
        tracing::debug!("Tearing down container #{}", container.0);
        record.torn_down = true;
        record.providers.clear();
        record.pending.clear();
        record.inject_queue.clear();
        record.cached_sub_creators.clear();
        record.singletons.clear();

        let children = std::mem::take(&mut record.children);
        for child in children {
            self.teardown(child);
        }
    }

    fn enter_resolve(&mut self, container: ContainerId, id: &BindingId) -> Result<(), ResolveError> {
        if self.resolving.len() >= self.settings.max_resolve_depth {
            return Err(ResolveError::DepthExceeded(self.settings.max_resolve_depth));
        }
        if self
            .resolving
            .iter()
            .any(|(entry_container, entry_id)| *entry_container == container && entry_id == id)
        {
            let mut chain: Vec<BindingId> =
                self.resolving.iter().map(|(_, entry_id)| entry_id.clone()).collect();
            chain.push(id.clone());
            tracing::error!("Circular dependency on '{id}'");
            return Err(ResolveError::CircularDependency {
                id: id.clone(),
                chain,
            });
        }
        self.resolving.push((container, id.clone()));
        Ok(())
    }

    /// Single-value selection: conditioned matches outrank the unconditioned
    /// fallback; more than one winner is ambiguous. Misses delegate to the
    /// parent chain in declaration order.
    fn lookup_provider(
        &self,
        container: ContainerId,
        id: &BindingId,
        ctx: &InjectContext,
    ) -> Result<Option<Rc<dyn Provider>>, ResolveError> {
        let record = self.record(container);
        if record.torn_down {
            return Err(ResolveError::TornDown);
        }
        if record.broken {
            return Err(ResolveError::ContainerBroken);
        }

        if let Some(entries) = record.providers.get(id) {
            let mut conditioned = Vec::new();
            let mut fallback = Vec::new();
            for entry in entries {
                match &entry.condition {
                    Some(condition) => {
                        if condition(ctx) {
                            conditioned.push(entry);
                        }
                    }
                    None => fallback.push(entry),
                }
            }

            let winners = if conditioned.is_empty() {
                &fallback
            } else {
                &conditioned
            };
            match winners.len() {
                0 => {}
                1 => return Ok(Some(winners[0].provider.clone())),
                count => {
                    return Err(ResolveError::Ambiguous {
                        id: id.clone(),
                        count,
                    })
                }
            }
        }

        for &parent in &record.parents {
            if let Some(provider) = self.lookup_provider(parent, id, ctx)? {
                return Ok(Some(provider));
            }
        }

        Ok(None)
    }

    fn collect_providers(
        &self,
        container: ContainerId,
        id: &BindingId,
        ctx: &InjectContext,
    ) -> Result<Vec<Rc<dyn Provider>>, ResolveError> {
        let record = self.record(container);
        if record.torn_down {
            return Err(ResolveError::TornDown);
        }
        if record.broken {
            return Err(ResolveError::ContainerBroken);
        }

        let mut providers = Vec::new();
        if let Some(entries) = record.providers.get(id) {
            for entry in entries {
                let satisfied = match &entry.condition {
                    Some(condition) => condition(ctx),
                    None => true,
                };
                if satisfied {
                    providers.push(entry.provider.clone());
                }
            }
        }

        for &parent in &record.parents {
            providers.extend(self.collect_providers(parent, id, ctx)?);
        }

        Ok(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        finalize::{BindingFinalizer, DeferredFinalizer},
        instantiate::FactoryInstantiator,
        provider::InstanceProvider,
        types::{Instance, TypeInfo},
    };

    fn graph() -> ContainerGraph {
        ContainerGraph::new(Rc::new(FactoryInstantiator::new()))
    }

    fn entry_of(value: u32) -> ProviderEntry {
        ProviderEntry {
            condition: None,
            provider: Rc::new(InstanceProvider::new(Instance::new(value))),
            non_lazy: false,
            copy_into_sub_containers: false,
        }
    }

    #[test]
    fn register_then_resolve() {
        let mut graph = graph();
        let root = graph.new_root();
        graph.register_provider(root, BindingId::of::<u32>(), entry_of(7));

        let resolved = graph.resolve_type::<u32>(root).unwrap();
        assert_eq!(*resolved, 7);
    }

    #[test]
    fn miss_is_no_binding_and_try_resolve_is_none() {
        let mut graph = graph();
        let root = graph.new_root();

        assert!(matches!(
            graph.resolve(root, &BindingId::of::<u32>()),
            Err(ResolveError::NoBinding(_))
        ));
        assert!(graph.try_resolve(root, &BindingId::of::<u32>()).unwrap().is_none());
    }

    #[test]
    fn parent_chain_is_walked_on_local_miss() {
        let mut graph = graph();
        let root = graph.new_root();
        let child = graph.new_child(root).unwrap();
        graph.register_provider(root, BindingId::of::<u32>(), entry_of(3));

        let resolved = graph.resolve_type::<u32>(child).unwrap();
        assert_eq!(*resolved, 3);
    }

    #[test]
    fn local_entry_shadows_parent() {
        let mut graph = graph();
        let root = graph.new_root();
        let child = graph.new_child(root).unwrap();
        graph.register_provider(root, BindingId::of::<u32>(), entry_of(1));
        graph.register_provider(child, BindingId::of::<u32>(), entry_of(2));

        assert_eq!(*graph.resolve_type::<u32>(child).unwrap(), 2);
        assert_eq!(*graph.resolve_type::<u32>(root).unwrap(), 1);
    }

    #[test]
    fn duplicate_unconditioned_entries_are_ambiguous() {
        let mut graph = graph();
        let root = graph.new_root();
        graph.register_provider(root, BindingId::of::<u32>(), entry_of(1));
        graph.register_provider(root, BindingId::of::<u32>(), entry_of(2));

        assert!(matches!(
            graph.resolve(root, &BindingId::of::<u32>()),
            Err(ResolveError::Ambiguous { count: 2, .. })
        ));

        // Collection resolution returns all of them instead
        let all = graph.resolve_all(root, &BindingId::of::<u32>()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn value_type_contract_registers_optional_shadow() {
        let mut graph = graph();
        let root = graph.new_root();
        graph.register_provider(root, BindingId::new(TypeInfo::of_value::<u32>()), entry_of(9));

        assert_eq!(graph.provider_count(root), 2);
        let resolved = graph.resolve_optional::<u32>(root).unwrap();
        assert_eq!(*resolved.unwrap(), 9);
    }

    #[test]
    fn multi_parent_delegation_follows_declaration_order() {
        let mut graph = graph();
        let first = graph.new_root();
        let second = graph.new_root();
        graph.register_provider(first, BindingId::of::<u32>(), entry_of(1));
        graph.register_provider(second, BindingId::of::<u32>(), entry_of(2));

        let child = graph.new_child_of(vec![first, second]).unwrap();

        // Single-value lookup stops at the first parent that answers
        assert_eq!(*graph.resolve_type::<u32>(child).unwrap(), 1);

        // Collection lookup walks every parent, in declaration order
        let all = graph.resolve_all(child, &BindingId::of::<u32>()).unwrap();
        let values: Vec<u32> = all
            .iter()
            .map(|instance| *instance.downcast::<u32>().unwrap())
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn injection_queue_is_flushed_exactly_once_at_install() {
        use std::cell::RefCell;

        use crate::{
            context::InjectContext,
            instantiate::Instantiator,
            types::{Argument, TypeInfo},
        };

        struct RecordingInstantiator {
            injected: Rc<RefCell<Vec<&'static str>>>,
        }
        impl Instantiator for RecordingInstantiator {
            fn instantiate(
                &self,
                _graph: &mut ContainerGraph,
                _container: ContainerId,
                concrete: TypeInfo,
                _args: &[Argument],
                _ctx: &InjectContext,
            ) -> Result<Instance, ResolveError> {
                Err(ResolveError::NoFactory {
                    type_name: concrete.type_name,
                })
            }

            fn inject_members(
                &self,
                _graph: &mut ContainerGraph,
                _container: ContainerId,
                instance: &Instance,
            ) -> Result<(), ResolveError> {
                self.injected.borrow_mut().push(instance.info.type_name);
                Ok(())
            }
        }

        let injected = Rc::new(RefCell::new(Vec::new()));
        let mut graph = ContainerGraph::new(Rc::new(RecordingInstantiator {
            injected: injected.clone(),
        }));
        let root = graph.new_root();

        graph.queue_for_injection(root, Instance::new("hud".to_string()));
        graph.install(root).unwrap();
        assert_eq!(injected.borrow().len(), 1);

        // The queue was drained - a later install must not replay it
        graph.install(root).unwrap();
        assert_eq!(injected.borrow().len(), 1);
    }

    #[test]
    fn depth_guard_stops_runaway_recursion() {
        let settings = ContainerSettings {
            max_resolve_depth: 0,
            ..ContainerSettings::default()
        };
        let mut graph =
            ContainerGraph::with_settings(Rc::new(FactoryInstantiator::new()), settings);
        let root = graph.new_root();
        graph.register_provider(root, BindingId::of::<u32>(), entry_of(1));

        assert!(matches!(
            graph.resolve(root, &BindingId::of::<u32>()),
            Err(ResolveError::DepthExceeded(0))
        ));
    }

    #[test]
    fn failed_install_breaks_the_container() {
        let mut graph = graph();
        let root = graph.new_root();
        graph.register_provider(root, BindingId::of::<u32>(), entry_of(1));
        graph.add_binding(root, BindingFinalizer::Deferred(DeferredFinalizer::new()));

        assert!(graph.install(root).is_err());

        // Even previously good bindings refuse to resolve now
        assert!(matches!(
            graph.resolve(root, &BindingId::of::<u32>()),
            Err(ResolveError::ContainerBroken)
        ));
    }

    #[test]
    fn teardown_cascades_to_children() {
        let mut graph = graph();
        let root = graph.new_root();
        let child = graph.new_child(root).unwrap();
        graph.register_provider(child, BindingId::of::<u32>(), entry_of(1));

        graph.teardown(root);
        assert!(matches!(
            graph.resolve(child, &BindingId::of::<u32>()),
            Err(ResolveError::TornDown)
        ));
    }

    #[test]
    fn copy_flagged_entries_propagate_to_new_children() {
        let mut graph = graph();
        let root = graph.new_root();
        let mut entry = entry_of(5);
        entry.copy_into_sub_containers = true;
        graph.register_provider(root, BindingId::of::<u32>(), entry);

        let child = graph.new_child(root).unwrap();
        // The child holds its own copy, not just a parent delegation
        assert_eq!(graph.provider_count(child), 1);

        let grandchild = graph.new_child(child).unwrap();
        assert_eq!(graph.provider_count(grandchild), 1);
    }
}
