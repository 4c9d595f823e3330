use std::{cell::RefCell, rc::Rc};

use crate::{
    container::{ContainerGraph, ContainerId},
    context::InjectContext,
    errors::{InstallError, ResolveError},
    provider::Provider,
    types::{BindingId, Instance, TypeInfo},
};

/// Install routine run against a freshly created child container
pub trait Installer {
    /// Token identifying this installer; singleton sub-container bindings
    /// de-duplicate on it across bind statements
    fn installer_type(&self) -> TypeInfo;

    fn install(&self, graph: &mut ContainerGraph, container: ContainerId)
        -> Result<(), InstallError>;
}

/// Caller-supplied install closure for by-method sub-containers
pub type InstallFn = Rc<dyn Fn(&mut ContainerGraph, ContainerId) -> Result<(), InstallError>>;

/// Builds child containers on demand
pub trait SubContainerCreator {
    fn create(&self, graph: &mut ContainerGraph) -> Result<ContainerId, ResolveError>;
}

fn install_child(
    graph: &mut ContainerGraph,
    parent: ContainerId,
    run: impl FnOnce(&mut ContainerGraph, ContainerId) -> Result<(), InstallError>,
) -> Result<ContainerId, ResolveError> {
    let child = graph.new_child(parent)?;
    run(graph, child)
        .and_then(|()| graph.install(child))
        .map_err(|error| ResolveError::SubContainerInstall(Box::new(error)))?;
    Ok(child)
}

/// Creates a child, runs an installer type's routine in it, finishes the
/// child's install phase
pub struct InstallerSubContainerCreator {
    parent: ContainerId,
    installer: Rc<dyn Installer>,
}
impl InstallerSubContainerCreator {
    pub fn new(parent: ContainerId, installer: Rc<dyn Installer>) -> Self {
        InstallerSubContainerCreator { parent, installer }
    }
}
impl SubContainerCreator for InstallerSubContainerCreator {
    fn create(&self, graph: &mut ContainerGraph) -> Result<ContainerId, ResolveError> {
        tracing::debug!(
            "Creating sub-container via installer {}",
            self.installer.installer_type()
        );
        let installer = self.installer.clone();
        install_child(graph, self.parent, |graph, child| {
            installer.install(graph, child)
        })
    }
}

/// Creates a child and runs a caller-supplied closure against it
pub struct MethodSubContainerCreator {
    parent: ContainerId,
    install_fn: InstallFn,
}
impl MethodSubContainerCreator {
    pub fn new(parent: ContainerId, install_fn: InstallFn) -> Self {
        MethodSubContainerCreator { parent, install_fn }
    }
}
impl SubContainerCreator for MethodSubContainerCreator {
    fn create(&self, graph: &mut ContainerGraph) -> Result<ContainerId, ResolveError> {
        tracing::debug!("Creating sub-container via install method");
        let install_fn = self.install_fn.clone();
        install_child(graph, self.parent, |graph, child| install_fn(graph, child))
    }
}

/// Memoizes the first created child container and returns it on every later
/// call - this is what backs Cached/Singleton sub-container bindings
pub struct CachedSubContainerCreator {
    inner: Rc<dyn SubContainerCreator>,
    cell: RefCell<Option<ContainerId>>,
}
impl CachedSubContainerCreator {
    pub fn new(inner: Rc<dyn SubContainerCreator>) -> Self {
        CachedSubContainerCreator {
            inner,
            cell: RefCell::new(None),
        }
    }
}
impl SubContainerCreator for CachedSubContainerCreator {
    fn create(&self, graph: &mut ContainerGraph) -> Result<ContainerId, ResolveError> {
        if let Some(child) = *self.cell.borrow() {
            return Ok(child);
        }

        // Borrow dropped before creating - the installer resolves through the graph
        let child = self.inner.create(graph)?;

        let mut cell = self.cell.borrow_mut();
        match *cell {
            Some(existing) => Ok(existing),
            None => {
                *cell = Some(child);
                Ok(child)
            }
        }
    }
}

/// Bridges binding scope to nested-container semantics: asks its creator for
/// a container, then resolves a contract (with optional sub-identifier) from it
pub struct SubContainerDependencyProvider {
    creator: Rc<dyn SubContainerCreator>,
    lookup: BindingId,
}
impl SubContainerDependencyProvider {
    pub fn new(creator: Rc<dyn SubContainerCreator>, lookup: BindingId) -> Self {
        SubContainerDependencyProvider { creator, lookup }
    }
}
impl Provider for SubContainerDependencyProvider {
    fn provided_type(&self) -> TypeInfo {
        self.lookup.contract
    }

    fn get_instance(
        &self,
        graph: &mut ContainerGraph,
        ctx: &InjectContext,
    ) -> Result<Instance, ResolveError> {
        let child = self.creator.create(graph)?;
        graph.resolve_with_context(child, &self.lookup, ctx)
    }
}
