use crate::{
    context::BindingCondition,
    errors::BindError,
    types::{Argument, BindingId, Ident, TypeInfo},
};

/// Lifetime/sharing policy of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Not chosen yet - must be resolved before any provider is built
    Unset,
    /// Always a new instance
    Transient,
    /// One instance per owning container
    Cached,
    /// One instance per declared identity, shared across bindings and contracts
    Singleton,
}

/// What the contract types resolve to
#[derive(Debug, Clone)]
pub enum ToChoice {
    /// The contract types are their own concrete types
    SelfType,
    Concrete(Vec<TypeInfo>),
}

/// Policy when a concrete type does not satisfy a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidBindResponse {
    /// Fail the install with a descriptive error
    Assert,
    /// Silently omit the one registration - used by convention-based bulk binds
    Skip,
}

/// Full configuration of one binding request.
///
/// Mutated only during the fluent chain; read-only from finalization onward.
#[derive(Clone)]
pub struct BindInfo {
    pub contracts: Vec<TypeInfo>,
    pub to: ToChoice,
    pub scope: Scope,
    pub ident: Option<Ident>,
    pub condition: Option<BindingCondition>,
    pub arguments: Vec<Argument>,
    /// Eagerly realized once the container finishes installing
    pub non_lazy: bool,
    pub invalid_bind_response: InvalidBindResponse,
    pub copy_into_all_sub_containers: bool,
}

impl BindInfo {
    pub fn new(contracts: Vec<TypeInfo>) -> Self {
        BindInfo {
            contracts,
            to: ToChoice::SelfType,
            scope: Scope::Unset,
            ident: None,
            condition: None,
            arguments: Vec::new(),
            non_lazy: false,
            invalid_bind_response: InvalidBindResponse::Assert,
            copy_into_all_sub_containers: false,
        }
    }

    /// The concrete types providers will be built for
    pub fn concrete_types(&self) -> Vec<TypeInfo> {
        match &self.to {
            ToChoice::SelfType => self.contracts.clone(),
            ToChoice::Concrete(types) => types.clone(),
        }
    }

    /// Resolves the declared scope to a concrete value.
    ///
    /// Conditional bindings default to Transient; anything else must be explicit.
    pub fn resolved_scope(&self) -> Result<Scope, BindError> {
        match self.scope {
            Scope::Unset if self.condition.is_some() => Ok(Scope::Transient),
            Scope::Unset => Err(BindError::UnsetScope {
                // Contracts are checked non-empty before scope resolution
                contract: self.contracts[0],
            }),
            scope => Ok(scope),
        }
    }

    pub fn binding_id(&self, contract: TypeInfo) -> BindingId {
        BindingId {
            contract,
            ident: self.ident.clone(),
            optional: false,
        }
    }
}

impl Default for BindInfo {
    fn default() -> Self {
        BindInfo::new(Vec::new())
    }
}
