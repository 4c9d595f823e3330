use std::{cell::RefCell, rc::Rc};

use crate::{
    bind_info::{BindInfo, InvalidBindResponse, Scope},
    container::{ContainerGraph, ContainerId, ProviderEntry},
    errors::{BindError, InstallError},
    instantiate::{AssetMaterializer, AssetRef},
    provider::{AssetProvider, CachedProvider, Provider},
    singleton::SingletonKey,
    subcontainer::{
        CachedSubContainerCreator, InstallFn, Installer, InstallerSubContainerCreator,
        MethodSubContainerCreator, SubContainerCreator, SubContainerDependencyProvider,
    },
    types::{BindingId, Ident, TypeInfo},
};

/// Builds one provider for a concrete type, to be registered into `container`
pub type ProviderFactory = Rc<dyn Fn(ContainerId, TypeInfo) -> Rc<dyn Provider>>;

/// Turns a binding declaration into registered providers.
///
/// One finalizer kind per way of building providers, dispatched by matching
/// rather than a class hierarchy.
pub enum BindingFinalizer {
    /// No-op for builder paths that route their registration elsewhere
    Null,
    /// Settable placeholder kept live across a fluent chain
    Deferred(DeferredFinalizer),
    ProviderBacked(ProviderFinalizer),
}

/// Holds a settable reference to the real finalizer so a fluent builder can
/// substitute the final behavior after the chain has been queued
#[derive(Clone, Default)]
pub struct DeferredFinalizer {
    slot: Rc<RefCell<Option<BindingFinalizer>>>,
}

impl DeferredFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, finalizer: BindingFinalizer) {
        *self.slot.borrow_mut() = Some(finalizer);
    }

    fn take(&self) -> Option<BindingFinalizer> {
        self.slot.borrow_mut().take()
    }

    fn copy_into_all_sub_containers(&self) -> bool {
        self.slot
            .borrow()
            .as_ref()
            .map(BindingFinalizer::copy_into_all_sub_containers)
            .unwrap_or(false)
    }
}

impl BindingFinalizer {
    pub fn copy_into_all_sub_containers(&self) -> bool {
        match self {
            BindingFinalizer::Null => false,
            BindingFinalizer::Deferred(deferred) => deferred.copy_into_all_sub_containers(),
            BindingFinalizer::ProviderBacked(finalizer) => {
                finalizer.info.copy_into_all_sub_containers
            }
        }
    }

    /// Consumed exactly once, during the owning container's install phase
    pub fn finalize(
        self,
        graph: &mut ContainerGraph,
        container: ContainerId,
    ) -> Result<(), InstallError> {
        match self {
            BindingFinalizer::Null => Ok(()),
            BindingFinalizer::Deferred(deferred) => match deferred.take() {
                Some(inner) => inner.finalize(graph, container),
                None => {
                    tracing::error!("Deferred finalizer was never given a real finalizer");
                    Err(BindError::UnfinishedBinding.into())
                }
            },
            BindingFinalizer::ProviderBacked(finalizer) => finalizer.finalize(graph, container),
        }
    }
}

/// How a provider-backed finalizer builds its providers
pub enum ProviderKind {
    /// Scope-dispatched provider construction from a factory callback
    Scopable { factory: ProviderFactory },
    /// Resolve against a nested container built by an installer type
    SubContainerByInstaller {
        installer: Rc<dyn Installer>,
        sub_ident: Option<Ident>,
    },
    /// Resolve against a nested container built by a closure
    SubContainerByMethod {
        install_fn: InstallFn,
        sub_ident: Option<Ident>,
    },
    /// Instance creation delegated to the asset collaborator
    External {
        asset: AssetRef,
        materializer: Rc<dyn AssetMaterializer>,
    },
}

/// Owns a [BindInfo] and registers providers for it according to scope
pub struct ProviderFinalizer {
    pub info: BindInfo,
    pub kind: ProviderKind,
}

impl ProviderFinalizer {
    pub fn new(info: BindInfo, kind: ProviderKind) -> Self {
        ProviderFinalizer { info, kind }
    }

    pub fn finalize(
        self,
        graph: &mut ContainerGraph,
        container: ContainerId,
    ) -> Result<(), InstallError> {
        // Additive multi-step builder chains may leave contracts empty
        if self.info.contracts.is_empty() {
            tracing::debug!("Binding has no contract types - nothing to register");
            return Ok(());
        }

        let scope = self.info.resolved_scope()?;
        let ProviderFinalizer { info, kind } = self;

        match kind {
            ProviderKind::Scopable { factory } => {
                finalize_scopable(graph, container, &info, scope, factory)
            }
            ProviderKind::SubContainerByInstaller {
                installer,
                sub_ident,
            } => {
                let token = graph.intern_scope_token(installer.installer_type().type_name);
                let creator: Rc<dyn SubContainerCreator> =
                    Rc::new(InstallerSubContainerCreator::new(container, installer));
                finalize_sub_container(graph, container, &info, scope, creator, sub_ident, token)
            }
            ProviderKind::SubContainerByMethod {
                install_fn,
                sub_ident,
            } => {
                // Closures have no value-comparable identity, so every
                // statement gets its own token
                let token = graph.new_scope_token();
                let creator: Rc<dyn SubContainerCreator> =
                    Rc::new(MethodSubContainerCreator::new(container, install_fn));
                finalize_sub_container(graph, container, &info, scope, creator, sub_ident, token)
            }
            ProviderKind::External {
                asset,
                materializer,
            } => finalize_external(graph, container, &info, scope, asset, materializer),
        }
    }
}

/// Rejects (contract, concrete) pairs the contract cannot be satisfied by.
///
/// Returns `Ok(false)` for the Skip policy, so convention-style binds can
/// silently omit the one registration.
fn validate_bind_types(
    graph: &ContainerGraph,
    contract: TypeInfo,
    concrete: TypeInfo,
    response: InvalidBindResponse,
) -> Result<bool, BindError> {
    let compatible = if contract.type_id == concrete.type_id {
        true
    } else if contract.generic != concrete.generic {
        // A parameterized shape never pairs with a plain type
        false
    } else {
        graph.instantiator().is_assignable(&contract, &concrete)
    };

    if compatible {
        return Ok(true);
    }

    match response {
        InvalidBindResponse::Assert => {
            tracing::error!("'{concrete}' cannot satisfy '{contract}'");
            Err(BindError::IncompatibleTypes { contract, concrete })
        }
        InvalidBindResponse::Skip => {
            tracing::warn!("Skipping registration of '{concrete}' for '{contract}'");
            Ok(false)
        }
    }
}

fn entry_for(info: &BindInfo, provider: Rc<dyn Provider>) -> ProviderEntry {
    ProviderEntry {
        condition: info.condition.clone(),
        provider,
        non_lazy: info.non_lazy,
        copy_into_sub_containers: info.copy_into_all_sub_containers,
    }
}

fn finalize_scopable(
    graph: &mut ContainerGraph,
    container: ContainerId,
    info: &BindInfo,
    scope: Scope,
    factory: ProviderFactory,
) -> Result<(), InstallError> {
    let concretes = info.concrete_types();
    if concretes.is_empty() {
        // Convention scans can legitimately come up empty
        tracing::warn!("Binding resolved to zero concrete types - nothing to register");
        return Ok(());
    }

    if !info.arguments.is_empty() && concretes.len() > 1 {
        return Err(BindError::AmbiguousArguments {
            contract: info.contracts[0],
            count: concretes.len(),
        }
        .into());
    }

    match scope {
        Scope::Unset => unreachable!("scope is resolved before dispatch"),
        Scope::Transient => {
            // A fresh provider for every pair - no sharing anywhere
            for &contract in &info.contracts {
                for &concrete in &concretes {
                    if !validate_bind_types(graph, contract, concrete, info.invalid_bind_response)?
                    {
                        continue;
                    }
                    let provider = factory(container, concrete);
                    graph.register_provider(container, info.binding_id(contract), entry_for(info, provider));
                }
            }
        }
        Scope::Cached => {
            // One memoizing wrapper per concrete type, shared across all of
            // that type's contracts
            for &concrete in &concretes {
                let provider: Rc<dyn Provider> =
                    Rc::new(CachedProvider::new(factory(container, concrete)));
                register_shared(graph, container, info, concrete, provider)?;
            }
        }
        Scope::Singleton => {
            // Shared even across separate bind statements targeting the same
            // concrete type and identifier
            for &concrete in &concretes {
                let key = SingletonKey::new(concrete, info.ident.clone());
                let factory = factory.clone();
                let provider = graph.singleton_mark(container, key, || {
                    Rc::new(CachedProvider::new(factory(container, concrete)))
                });
                register_shared(graph, container, info, concrete, provider)?;
            }
        }
    }

    Ok(())
}

/// Registers one provider under every contract that accepts `concrete`
fn register_shared(
    graph: &mut ContainerGraph,
    container: ContainerId,
    info: &BindInfo,
    concrete: TypeInfo,
    provider: Rc<dyn Provider>,
) -> Result<(), InstallError> {
    for &contract in &info.contracts {
        if !validate_bind_types(graph, contract, concrete, info.invalid_bind_response)? {
            continue;
        }
        graph.register_provider(
            container,
            info.binding_id(contract),
            entry_for(info, provider.clone()),
        );
    }
    Ok(())
}

fn finalize_sub_container(
    graph: &mut ContainerGraph,
    container: ContainerId,
    info: &BindInfo,
    scope: Scope,
    creator: Rc<dyn SubContainerCreator>,
    sub_ident: Option<Ident>,
    token: crate::types::ScopeToken,
) -> Result<(), InstallError> {
    // Transient keeps the bare creator: a new child container (and a fresh
    // run of its installer) on every resolve. Cached/Singleton build exactly
    // one child and reuse it forever.
    let creator: Rc<dyn SubContainerCreator> = match scope {
        Scope::Unset => unreachable!("scope is resolved before dispatch"),
        Scope::Transient => creator,
        Scope::Cached => Rc::new(CachedSubContainerCreator::new(creator)),
        Scope::Singleton => graph.cached_sub_creator(container, token, creator),
    };

    for &contract in &info.contracts {
        let lookup = BindingId {
            contract,
            ident: sub_ident.clone(),
            optional: false,
        };
        let provider: Rc<dyn Provider> = match scope {
            Scope::Singleton => {
                let creator = creator.clone();
                let lookup = lookup.clone();
                let key = SingletonKey::scoped(contract, token, info.ident.clone());
                graph.singleton_mark(container, key, move || {
                    Rc::new(SubContainerDependencyProvider::new(creator, lookup))
                })
            }
            _ => Rc::new(SubContainerDependencyProvider::new(creator.clone(), lookup)),
        };
        graph.register_provider(container, info.binding_id(contract), entry_for(info, provider));
    }

    Ok(())
}

fn finalize_external(
    graph: &mut ContainerGraph,
    container: ContainerId,
    info: &BindInfo,
    scope: Scope,
    asset: AssetRef,
    materializer: Rc<dyn AssetMaterializer>,
) -> Result<(), InstallError> {
    let token = graph.intern_scope_token(&asset.path);

    for &contract in &info.contracts {
        let make = || -> Rc<dyn Provider> {
            Rc::new(AssetProvider::new(
                container,
                contract,
                asset.clone(),
                materializer.clone(),
                info.arguments.clone(),
            ))
        };
        let provider: Rc<dyn Provider> = match scope {
            Scope::Unset => unreachable!("scope is resolved before dispatch"),
            Scope::Transient => make(),
            Scope::Cached => Rc::new(CachedProvider::new(make())),
            Scope::Singleton => {
                // The declared id splits the singleton exactly as it does for
                // scopable bindings; only id-less statements share on the path
                let key = SingletonKey::scoped(contract, token, info.ident.clone());
                graph.singleton_mark(container, key, || Rc::new(CachedProvider::new(make())))
            }
        };
        graph.register_provider(container, info.binding_id(contract), entry_for(info, provider));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        container::ContainerGraph,
        instantiate::FactoryInstantiator,
        provider::InstanceProvider,
        types::Instance,
    };

    fn graph() -> ContainerGraph {
        ContainerGraph::new(Rc::new(FactoryInstantiator::new()))
    }

    fn instance_factory(value: u32) -> ProviderFactory {
        Rc::new(move |_, _| Rc::new(InstanceProvider::new(Instance::new(value))))
    }

    #[test]
    fn empty_contracts_is_a_silent_no_op() {
        let mut graph = graph();
        let root = graph.new_root();

        let finalizer = ProviderFinalizer::new(
            BindInfo::new(Vec::new()),
            ProviderKind::Scopable {
                factory: instance_factory(1),
            },
        );
        finalizer.finalize(&mut graph, root).unwrap();
        assert_eq!(graph.provider_count(root), 0);
    }

    #[test]
    fn unset_scope_fails_finalization() {
        let mut graph = graph();
        let root = graph.new_root();

        let finalizer = ProviderFinalizer::new(
            BindInfo::new(vec![TypeInfo::of::<u32>()]),
            ProviderKind::Scopable {
                factory: instance_factory(1),
            },
        );
        let err = finalizer.finalize(&mut graph, root).unwrap_err();
        assert!(matches!(
            err,
            InstallError::Bind(BindError::UnsetScope { .. })
        ));
    }

    #[test]
    fn unfinished_deferred_finalizer_is_fatal() {
        let mut graph = graph();
        let root = graph.new_root();

        let deferred = BindingFinalizer::Deferred(DeferredFinalizer::new());
        let err = deferred.finalize(&mut graph, root).unwrap_err();
        assert!(matches!(
            err,
            InstallError::Bind(BindError::UnfinishedBinding)
        ));
    }

    #[test]
    fn null_finalizer_does_nothing() {
        let mut graph = graph();
        let root = graph.new_root();
        BindingFinalizer::Null.finalize(&mut graph, root).unwrap();
        assert_eq!(graph.provider_count(root), 0);
    }

    #[test]
    fn incompatible_types_assert_policy_fails() {
        let mut graph = graph();
        let root = graph.new_root();

        let mut info = BindInfo::new(vec![TypeInfo::of::<String>()]);
        info.to = crate::bind_info::ToChoice::Concrete(vec![TypeInfo::of::<u32>()]);
        info.scope = Scope::Transient;

        let finalizer = ProviderFinalizer::new(
            info,
            ProviderKind::Scopable {
                factory: instance_factory(1),
            },
        );
        let err = finalizer.finalize(&mut graph, root).unwrap_err();
        assert!(matches!(
            err,
            InstallError::Bind(BindError::IncompatibleTypes { .. })
        ));
    }

    #[tracing_test::traced_test]
    #[test]
    fn incompatible_types_skip_policy_registers_nothing() {
        let mut graph = graph();
        let root = graph.new_root();

        let mut info = BindInfo::new(vec![TypeInfo::of::<String>()]);
        info.to = crate::bind_info::ToChoice::Concrete(vec![TypeInfo::of::<u32>()]);
        info.scope = Scope::Transient;
        info.invalid_bind_response = InvalidBindResponse::Skip;

        let finalizer = ProviderFinalizer::new(
            info,
            ProviderKind::Scopable {
                factory: instance_factory(1),
            },
        );
        finalizer.finalize(&mut graph, root).unwrap();
        assert_eq!(graph.provider_count(root), 0);
        assert!(logs_contain("Skipping registration"));
    }

    #[test]
    fn arguments_with_multiple_concrete_types_are_ambiguous() {
        let mut graph = graph();
        let root = graph.new_root();

        let mut info = BindInfo::new(vec![TypeInfo::of::<String>()]);
        info.to = crate::bind_info::ToChoice::Concrete(vec![
            TypeInfo::of::<u32>(),
            TypeInfo::of::<u64>(),
        ]);
        info.scope = Scope::Transient;
        info.arguments = vec![crate::types::Argument::new(5_u8)];

        let finalizer = ProviderFinalizer::new(
            info,
            ProviderKind::Scopable {
                factory: instance_factory(1),
            },
        );
        let err = finalizer.finalize(&mut graph, root).unwrap_err();
        assert!(matches!(
            err,
            InstallError::Bind(BindError::AmbiguousArguments { .. })
        ));
    }
}
