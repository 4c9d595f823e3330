use std::{any::TypeId, collections::HashMap, collections::HashSet, rc::Rc};

use crate::{
    container::{ContainerGraph, ContainerId},
    context::InjectContext,
    errors::ResolveError,
    types::{Argument, DynError, Instance, TypeInfo},
};

/// Instantiation collaborator: given a concrete type token and extra
/// arguments, produce an instance.
///
/// How construction discovers its dependencies (reflection, codegen, explicit
/// factories) is the collaborator's business; the engine is agnostic.
pub trait Instantiator {
    fn instantiate(
        &self,
        graph: &mut ContainerGraph,
        container: ContainerId,
        concrete: TypeInfo,
        args: &[Argument],
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError>;

    /// Whether `concrete` can stand in for `contract`
    fn is_assignable(&self, contract: &TypeInfo, concrete: &TypeInfo) -> bool {
        contract.type_id == concrete.type_id
    }

    /// Field/method injection pass for objects queued on the container
    fn inject_members(
        &self,
        graph: &mut ContainerGraph,
        container: ContainerId,
        instance: &Instance,
    ) -> Result<(), ResolveError> {
        let _ = (graph, container, instance);
        Ok(())
    }
}

type FactoryFn = Rc<
    dyn Fn(&mut ContainerGraph, ContainerId, &[Argument], &InjectContext) -> Result<Instance, ResolveError>,
>;

/// Closure-registry instantiator: the host registers one factory per concrete
/// type, plus the contract/concrete pairs it considers assignable.
#[derive(Default)]
pub struct FactoryInstantiator {
    factories: HashMap<TypeId, FactoryFn>,
    upcasts: HashSet<(TypeId, TypeId)>,
}

impl FactoryInstantiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T, F>(&mut self, factory: F)
    where
        T: 'static,
        F: Fn(&mut ContainerGraph, ContainerId, &[Argument], &InjectContext) -> Result<T, DynError>
            + 'static,
    {
        let info = TypeInfo::of::<T>();
        self.factories.insert(
            info.type_id,
            Rc::new(move |graph, container, args, ctx| {
                factory(graph, container, args, ctx)
                    .map(Instance::new)
                    .map_err(|error| ResolveError::Instantiation {
                        type_name: info.type_name,
                        error: Rc::new(error),
                    })
            }),
        );
    }

    /// Declares that `concrete` satisfies `contract`
    pub fn allow_upcast(&mut self, contract: TypeInfo, concrete: TypeInfo) {
        self.upcasts.insert((contract.type_id, concrete.type_id));
    }
}

impl Instantiator for FactoryInstantiator {
    fn instantiate(
        &self,
        graph: &mut ContainerGraph,
        container: ContainerId,
        concrete: TypeInfo,
        args: &[Argument],
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError> {
        let factory = self
            .factories
            .get(&concrete.type_id)
            .ok_or(ResolveError::NoFactory {
                type_name: concrete.type_name,
            })?
            .clone();

        tracing::debug!("Instantiating {}", concrete.type_name);
        factory(graph, container, args, ctx)
    }

    fn is_assignable(&self, contract: &TypeInfo, concrete: &TypeInfo) -> bool {
        contract.type_id == concrete.type_id
            || self.upcasts.contains(&(contract.type_id, concrete.type_id))
    }
}

/// Reference to an external asset/prefab the host knows how to materialize
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetRef {
    pub path: String,
}
impl AssetRef {
    pub fn new(path: impl Into<String>) -> Self {
        AssetRef { path: path.into() }
    }
}

/// Asset/prefab collaborator: produce an object from an asset reference.
/// The engine only wraps scope and sharing semantics around this call.
pub trait AssetMaterializer {
    fn materialize(
        &self,
        graph: &mut ContainerGraph,
        container: ContainerId,
        asset: &AssetRef,
        args: &[Argument],
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError>;
}
