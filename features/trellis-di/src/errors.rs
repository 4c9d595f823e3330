use std::rc::Rc;

use thiserror::Error;

use crate::types::{BindingId, DynError, TypeInfo};

/// Binding-configuration errors, caught at finalize time
#[derive(Error, Debug, Clone)]
pub enum BindError {
    /// Scope must always be explicit unless the binding is conditional
    #[error("Scope for '{contract}' was never set - unconditioned bindings must pick a scope explicitly")]
    UnsetScope { contract: TypeInfo },

    /// A deferred finalizer was run before a real finalizer was attached
    #[error("A binding was started but never finished")]
    UnfinishedBinding,

    #[error("'{concrete}' cannot satisfy the contract '{contract}'")]
    IncompatibleTypes {
        contract: TypeInfo,
        concrete: TypeInfo,
    },

    /// Per-binding arguments cannot pick a target among several concrete types
    #[error("Arguments were supplied for '{contract}' but {count} concrete types are bound - ambiguous target")]
    AmbiguousArguments { contract: TypeInfo, count: usize },

    #[error("Container is already installing - nested installs must go through a sub-container")]
    InstallInProgress,
}

/// Errors while resolving a dependency
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// Nothing registered for the id anywhere in the container chain
    #[error("No binding found for '{0}'")]
    NoBinding(BindingId),

    /// More than one entry survived condition filtering for a single-value lookup
    #[error("{count} providers match '{id}' - conditions must disambiguate single-value lookups")]
    Ambiguous { id: BindingId, count: usize },

    #[error("A circular dependency exists on '{id}' through {chain:?}")]
    CircularDependency {
        id: BindingId,
        chain: Vec<BindingId>,
    },

    #[error("Resolve recursion exceeded {0} levels")]
    DepthExceeded(usize),

    /// A failed install leaves the container terminally broken
    #[error("Container install failed earlier - the container can no longer resolve")]
    ContainerBroken,

    #[error("Container was torn down")]
    TornDown,

    /// The instantiation collaborator has no recipe for the concrete type
    #[error("No factory registered for '{type_name}'")]
    NoFactory { type_name: &'static str },

    #[error("Instantiation of '{type_name}' failed - error: {error:?}")]
    Instantiation {
        type_name: &'static str,
        error: Rc<DynError>,
    },

    #[error("Installing a sub-container failed: {0}")]
    SubContainerInstall(Box<InstallError>),

    #[error("Failed to downcast, required: '{required}' actual: '{actual}'")]
    Downcast {
        required: &'static str,
        actual: &'static str,
    },
}

/// Errors during a container's install phase
#[derive(Error, Debug, Clone)]
pub enum InstallError {
    #[error(transparent)]
    Bind(#[from] BindError),
    /// The eager non-lazy pass resolves like anything else and can fail like it
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}
