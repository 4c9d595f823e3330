//! Binding, provider and scope resolution engine for nested dependency
//! injection containers.
//!
//! A [ContainerGraph](container::ContainerGraph) owns an arena of containers.
//! Fluent [bind](container::ContainerGraph::bind) statements queue binding
//! declarations; [install](container::ContainerGraph::install) turns them
//! into registered providers; resolution walks the local provider table and
//! then the parent chain, with conditions, identifiers, and the three scopes
//! (transient, cached, singleton) deciding which provider answers and how
//! instances are shared.
//!
//! Object construction itself is delegated to an
//! [Instantiator](instantiate::Instantiator) collaborator, and asset-backed
//! bindings to an [AssetMaterializer](instantiate::AssetMaterializer); the
//! engine only supplies lookup, scoping and sharing semantics around them.

pub mod bind_info;
pub mod binder;
pub mod container;
pub mod context;
pub mod errors;
pub mod finalize;
pub mod instantiate;
pub mod provider;
pub mod singleton;
pub mod subcontainer;
pub mod types;

pub use bind_info::{BindInfo, InvalidBindResponse, Scope, ToChoice};
pub use binder::BindStatement;
pub use container::{ContainerGraph, ContainerId, ContainerSettings, ProviderEntry};
pub use context::{BindingCondition, InjectContext};
pub use errors::{BindError, InstallError, ResolveError};
pub use finalize::{BindingFinalizer, DeferredFinalizer, ProviderFactory, ProviderFinalizer};
pub use instantiate::{AssetMaterializer, AssetRef, FactoryInstantiator, Instantiator};
pub use provider::Provider;
pub use singleton::{SingletonKey, SingletonKind, SingletonRegistry};
pub use subcontainer::{InstallFn, Installer, SubContainerCreator};
pub use types::{Argument, BindingId, DynError, Ident, Instance, ScopeToken, TypeInfo};
