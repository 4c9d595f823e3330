use std::{cell::RefCell, rc::Rc};

use crate::{
    container::{ContainerGraph, ContainerId},
    context::InjectContext,
    errors::ResolveError,
    instantiate::{AssetMaterializer, AssetRef},
    types::{Argument, Instance, TypeInfo},
};

/// A capability producing instances for an injection context.
///
/// Scope is a property of which provider object gets registered where, not of
/// the instances themselves: a transient binding registers a fresh provider
/// per pair, a cached binding registers one memoizing wrapper shared across
/// contracts, and a singleton binding registers the one provider the
/// singleton registry hands out for its declaration key.
pub trait Provider {
    /// The type this provider hands out
    fn provided_type(&self) -> TypeInfo;

    fn get_instance(
        &self,
        graph: &mut ContainerGraph,
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError>;
}

/// Hands out one pre-built instance
pub struct InstanceProvider {
    instance: Instance,
}
impl InstanceProvider {
    pub fn new(instance: Instance) -> Self {
        InstanceProvider { instance }
    }
}
impl Provider for InstanceProvider {
    fn provided_type(&self) -> TypeInfo {
        self.instance.info
    }

    fn get_instance(
        &self,
        _graph: &mut ContainerGraph,
        _ctx: &InjectContext,
    ) -> Result<Instance, ResolveError> {
        Ok(self.instance.clone())
    }
}

/// Builds a fresh instance through the instantiation collaborator on every call
pub struct InstantiatorProvider {
    container: ContainerId,
    concrete: TypeInfo,
    arguments: Vec<Argument>,
}
impl InstantiatorProvider {
    pub fn new(container: ContainerId, concrete: TypeInfo, arguments: Vec<Argument>) -> Self {
        InstantiatorProvider {
            container,
            concrete,
            arguments,
        }
    }
}
impl Provider for InstantiatorProvider {
    fn provided_type(&self) -> TypeInfo {
        self.concrete
    }

    fn get_instance(
        &self,
        graph: &mut ContainerGraph,
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError> {
        let instantiator = graph.instantiator();
        instantiator.instantiate(graph, self.container, self.concrete, &self.arguments, ctx)
    }
}

/// Memoizing wrapper - the first call creates, every later call replays
pub struct CachedProvider {
    inner: Rc<dyn Provider>,
    cached: RefCell<Option<Instance>>,
}
impl CachedProvider {
    pub fn new(inner: Rc<dyn Provider>) -> Self {
        CachedProvider {
            inner,
            cached: RefCell::new(None),
        }
    }
}
impl Provider for CachedProvider {
    fn provided_type(&self) -> TypeInfo {
        self.inner.provided_type()
    }

    fn get_instance(
        &self,
        graph: &mut ContainerGraph,
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError> {
        if let Some(instance) = self.cached.borrow().clone() {
            return Ok(instance);
        }

        // Must not hold the borrow across the inner call - construction may
        // recursively resolve through this graph
        let instance = self.inner.get_instance(graph, ctx)?;

        let mut cached = self.cached.borrow_mut();
        match &*cached {
            // The first stored instance wins if construction re-entered
            Some(existing) => Ok(existing.clone()),
            None => {
                tracing::debug!("Caching instance of {}", instance.info.type_name);
                *cached = Some(instance.clone());
                Ok(instance)
            }
        }
    }
}

/// Delegates instance creation to the asset/prefab collaborator; the engine
/// only supplies scope and sharing semantics around the call
pub struct AssetProvider {
    container: ContainerId,
    contract: TypeInfo,
    asset: AssetRef,
    materializer: Rc<dyn AssetMaterializer>,
    arguments: Vec<Argument>,
}
impl AssetProvider {
    pub fn new(
        container: ContainerId,
        contract: TypeInfo,
        asset: AssetRef,
        materializer: Rc<dyn AssetMaterializer>,
        arguments: Vec<Argument>,
    ) -> Self {
        AssetProvider {
            container,
            contract,
            asset,
            materializer,
            arguments,
        }
    }
}
impl Provider for AssetProvider {
    fn provided_type(&self) -> TypeInfo {
        self.contract
    }

    fn get_instance(
        &self,
        graph: &mut ContainerGraph,
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError> {
        let materializer = self.materializer.clone();
        materializer.materialize(graph, self.container, &self.asset, &self.arguments, ctx)
    }
}
