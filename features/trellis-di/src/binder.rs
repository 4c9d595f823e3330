use std::rc::Rc;

use crate::{
    bind_info::{BindInfo, InvalidBindResponse, Scope, ToChoice},
    container::{ContainerGraph, ContainerId},
    context::InjectContext,
    errors::InstallError,
    finalize::{
        BindingFinalizer, DeferredFinalizer, ProviderFactory, ProviderFinalizer, ProviderKind,
    },
    instantiate::{AssetMaterializer, AssetRef},
    provider::{InstanceProvider, InstantiatorProvider},
    subcontainer::{InstallFn, Installer},
    types::{Argument, Ident, Instance, TypeInfo},
};

impl ContainerGraph {
    /// Opens a fluent bind statement for one contract type.
    ///
    /// The statement queues itself immediately; dropping it commits whatever
    /// was configured, and the container's install phase turns it into
    /// registered providers.
    pub fn bind<T: 'static + ?Sized>(&mut self, container: ContainerId) -> BindStatement {
        self.bind_contracts(container, vec![TypeInfo::of::<T>()])
    }

    /// Bind statement for a value-semantics contract; registration will also
    /// produce the optional shadow entry
    pub fn bind_value<T: Copy + 'static>(&mut self, container: ContainerId) -> BindStatement {
        self.bind_contracts(container, vec![TypeInfo::of_value::<T>()])
    }

    /// Bind statement covering several contract types at once
    pub fn bind_contracts(
        &mut self,
        container: ContainerId,
        contracts: Vec<TypeInfo>,
    ) -> BindStatement {
        let slot = DeferredFinalizer::new();
        self.add_binding(container, BindingFinalizer::Deferred(slot.clone()));

        let mut info = BindInfo::new(contracts);
        info.invalid_bind_response = self.settings().invalid_bind_response;

        BindStatement {
            slot,
            info,
            kind: StatementKind::Default,
            sub_ident: None,
        }
    }
}

enum StatementKind {
    /// Construct through the instantiation collaborator
    Default,
    Instance(Instance),
    Factory(ProviderFactory),
    SubInstaller(Rc<dyn Installer>),
    SubMethod(InstallFn),
    Asset {
        asset: AssetRef,
        materializer: Rc<dyn AssetMaterializer>,
    },
}

/// One fluent binding declaration.
///
/// Every method consumes and returns the statement, so a chain reads as a
/// single expression; the [Drop] impl commits the accumulated configuration
/// into the finalizer slot already queued on the container.
pub struct BindStatement {
    slot: DeferredFinalizer,
    info: BindInfo,
    kind: StatementKind,
    sub_ident: Option<Ident>,
}

impl BindStatement {
    /// Directs the contracts at a concrete type
    pub fn to<C: 'static>(self) -> Self {
        self.to_type(TypeInfo::of::<C>())
    }

    pub fn to_type(mut self, concrete: TypeInfo) -> Self {
        match &mut self.info.to {
            ToChoice::Concrete(types) => types.push(concrete),
            to => *to = ToChoice::Concrete(vec![concrete]),
        }
        self
    }

    pub fn with_id(mut self, ident: impl Into<Ident>) -> Self {
        self.info.ident = Some(ident.into());
        self
    }

    pub fn as_transient(mut self) -> Self {
        self.info.scope = Scope::Transient;
        self
    }

    pub fn as_cached(mut self) -> Self {
        self.info.scope = Scope::Cached;
        self
    }

    pub fn as_singleton(mut self) -> Self {
        self.info.scope = Scope::Singleton;
        self
    }

    /// Restricts the binding to injection contexts the predicate accepts
    pub fn when(mut self, condition: impl Fn(&InjectContext) -> bool + 'static) -> Self {
        self.info.condition = Some(Rc::new(condition));
        self
    }

    /// Restricts the binding to requests made while constructing `T`
    pub fn when_injected_into<T: 'static>(self) -> Self {
        let target = TypeInfo::of::<T>().type_id;
        self.when(move |ctx| {
            ctx.object_type
                .map(|object| object.type_id == target)
                .unwrap_or(false)
        })
    }

    /// Extra constructor argument forwarded to instantiation
    pub fn with_argument<T: 'static>(mut self, value: T) -> Self {
        self.info.arguments.push(Argument::new(value));
        self
    }

    /// Realize eagerly when the container finishes installing
    pub fn non_lazy(mut self) -> Self {
        self.info.non_lazy = true;
        self
    }

    pub fn on_invalid(mut self, response: InvalidBindResponse) -> Self {
        self.info.invalid_bind_response = response;
        self
    }

    /// Copy this registration into every sub-container created later
    pub fn copy_into_all_sub_containers(mut self) -> Self {
        self.info.copy_into_all_sub_containers = true;
        self
    }

    /// Binds the contracts to a pre-built instance.
    ///
    /// Scope defaults to Cached when not chosen explicitly - a single given
    /// object is inherently shared.
    pub fn from_instance<T: 'static>(mut self, value: T) -> Self {
        self.kind = StatementKind::Instance(Instance::new(value));
        self
    }

    /// Binds the contracts to providers built by a caller-supplied factory
    pub fn from_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.kind = StatementKind::Factory(factory);
        self
    }

    /// Resolve the contracts from a nested container built by an installer
    /// type. Singleton-scoped statements naming the same installer type share
    /// one nested container.
    pub fn from_sub_container_installer(mut self, installer: Rc<dyn Installer>) -> Self {
        self.kind = StatementKind::SubInstaller(installer);
        self
    }

    /// Resolve the contracts from a nested container set up by a closure
    pub fn from_sub_container_method(
        mut self,
        install_fn: impl Fn(&mut ContainerGraph, ContainerId) -> Result<(), InstallError> + 'static,
    ) -> Self {
        self.kind = StatementKind::SubMethod(Rc::new(install_fn));
        self
    }

    /// Identifier used when resolving the contract inside the nested container
    pub fn with_sub_id(mut self, ident: impl Into<Ident>) -> Self {
        self.sub_ident = Some(ident.into());
        self
    }

    /// Instance creation delegated to the asset collaborator for `asset`
    pub fn from_asset(
        mut self,
        asset: AssetRef,
        materializer: Rc<dyn AssetMaterializer>,
    ) -> Self {
        self.kind = StatementKind::Asset {
            asset,
            materializer,
        };
        self
    }
}

impl Drop for BindStatement {
    fn drop(&mut self) {
        let mut info = std::mem::take(&mut self.info);
        let kind = std::mem::replace(&mut self.kind, StatementKind::Default);
        let sub_ident = self.sub_ident.take();

        let provider_kind = match kind {
            StatementKind::Default => {
                let arguments = info.arguments.clone();
                let factory: ProviderFactory = Rc::new(move |container, concrete| {
                    Rc::new(InstantiatorProvider::new(
                        container,
                        concrete,
                        arguments.clone(),
                    ))
                });
                ProviderKind::Scopable { factory }
            }
            StatementKind::Instance(instance) => {
                if info.scope == Scope::Unset && info.condition.is_none() {
                    info.scope = Scope::Cached;
                }
                // Validation runs against the instance's actual type
                info.to = ToChoice::Concrete(vec![instance.info]);
                let factory: ProviderFactory = Rc::new(move |_, _| {
                    Rc::new(InstanceProvider::new(instance.clone()))
                });
                ProviderKind::Scopable { factory }
            }
            StatementKind::Factory(factory) => ProviderKind::Scopable { factory },
            StatementKind::SubInstaller(installer) => ProviderKind::SubContainerByInstaller {
                installer,
                sub_ident,
            },
            StatementKind::SubMethod(install_fn) => ProviderKind::SubContainerByMethod {
                install_fn,
                sub_ident,
            },
            StatementKind::Asset {
                asset,
                materializer,
            } => ProviderKind::External {
                asset,
                materializer,
            },
        };

        self.slot
            .attach(BindingFinalizer::ProviderBacked(ProviderFinalizer::new(
                info,
                provider_kind,
            )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{BindError, ResolveError},
        instantiate::FactoryInstantiator,
        types::BindingId,
    };

    fn graph() -> ContainerGraph {
        ContainerGraph::new(Rc::new(FactoryInstantiator::new()))
    }

    #[test]
    fn instance_binding_installs_and_resolves() {
        let mut graph = graph();
        let root = graph.new_root();

        graph.bind::<String>(root).from_instance("hello".to_string());
        graph.install(root).unwrap();

        let resolved = graph.resolve_type::<String>(root).unwrap();
        assert_eq!(*resolved, "hello");
    }

    #[test]
    fn instance_binding_defaults_to_cached_sharing() {
        let mut graph = graph();
        let root = graph.new_root();

        graph.bind::<String>(root).from_instance("shared".to_string());
        graph.install(root).unwrap();

        let first = graph.resolve(root, &BindingId::of::<String>()).unwrap();
        let second = graph.resolve(root, &BindingId::of::<String>()).unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn unscoped_default_binding_fails_install() {
        let mut graph = graph();
        let root = graph.new_root();

        graph.bind::<String>(root);
        let err = graph.install(root).unwrap_err();
        assert!(matches!(err, InstallError::Bind(BindError::UnsetScope { .. })));
    }

    #[test]
    fn identifier_separates_bindings_on_one_contract() {
        let mut graph = graph();
        let root = graph.new_root();

        graph
            .bind::<String>(root)
            .with_id("first")
            .from_instance("a".to_string());
        graph
            .bind::<String>(root)
            .with_id("second")
            .from_instance("b".to_string());
        graph.install(root).unwrap();

        let first = graph
            .resolve(root, &BindingId::of::<String>().with_ident("first"))
            .unwrap();
        let second = graph
            .resolve(root, &BindingId::of::<String>().with_ident("second"))
            .unwrap();
        assert_eq!(*first.downcast::<String>().unwrap(), "a");
        assert_eq!(*second.downcast::<String>().unwrap(), "b");

        // The bare contract has no binding at all
        assert!(matches!(
            graph.resolve(root, &BindingId::of::<String>()),
            Err(ResolveError::NoBinding(_))
        ));
    }

    #[test]
    fn conditioned_binding_outranks_unconditioned_fallback() {
        let mut graph = graph();
        let root = graph.new_root();

        graph.bind::<String>(root).from_instance("fallback".to_string());
        graph
            .bind::<String>(root)
            .when(|_| true)
            .from_instance("chosen".to_string());
        graph.install(root).unwrap();

        let resolved = graph.resolve_type::<String>(root).unwrap();
        assert_eq!(*resolved, "chosen");
    }

    #[test]
    fn false_condition_falls_back_to_unconditioned() {
        let mut graph = graph();
        let root = graph.new_root();

        graph.bind::<String>(root).from_instance("fallback".to_string());
        graph
            .bind::<String>(root)
            .when(|_| false)
            .from_instance("never".to_string());
        graph.install(root).unwrap();

        let resolved = graph.resolve_type::<String>(root).unwrap();
        assert_eq!(*resolved, "fallback");
    }

    #[test]
    fn default_kind_without_registered_factory_is_no_factory() {
        let mut graph = graph();
        let root = graph.new_root();

        graph.bind::<u32>(root).as_transient();
        graph.install(root).unwrap();

        assert!(matches!(
            graph.resolve(root, &BindingId::of::<u32>()),
            Err(ResolveError::NoFactory { .. })
        ));
    }

    #[test]
    fn non_lazy_binding_is_realized_during_install() {
        use std::cell::Cell;

        let built = Rc::new(Cell::new(0_u32));
        let counter = built.clone();

        let mut instantiator = FactoryInstantiator::new();
        instantiator.register::<u32, _>(move |_, _, _, _| {
            counter.set(counter.get() + 1);
            Ok(11)
        });

        let mut graph = ContainerGraph::new(Rc::new(instantiator));
        let root = graph.new_root();

        graph.bind::<u32>(root).as_cached().non_lazy();
        graph.install(root).unwrap();

        assert_eq!(built.get(), 1);
        // Lazy resolution replays the cached instance
        assert_eq!(*graph.resolve_type::<u32>(root).unwrap(), 11);
        assert_eq!(built.get(), 1);
    }

    #[test]
    fn conditioned_non_lazy_binding_stays_lazy_when_condition_rejects_install() {
        use std::cell::Cell;

        let built = Rc::new(Cell::new(0_u32));
        let counter = built.clone();

        let mut instantiator = FactoryInstantiator::new();
        instantiator.register::<u32, _>(move |_, _, _, _| {
            counter.set(counter.get() + 1);
            Ok(3)
        });

        let mut graph = ContainerGraph::new(Rc::new(instantiator));
        let root = graph.new_root();

        graph
            .bind::<u32>(root)
            .as_cached()
            .non_lazy()
            .when(|ctx| ctx.object_type.is_some());
        graph.install(root).unwrap();

        // The install-time root context has no requesting type
        assert_eq!(built.get(), 0);
    }

    #[test]
    fn value_contract_gets_optional_shadow() {
        let mut graph = graph();
        let root = graph.new_root();

        graph.bind_value::<u32>(root).from_instance(42_u32);
        graph.install(root).unwrap();

        let shadow = graph.resolve_optional::<u32>(root).unwrap();
        assert_eq!(*shadow.unwrap(), 42);
    }
}
