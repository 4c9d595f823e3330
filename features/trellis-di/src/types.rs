use std::{
    any::{Any, TypeId},
    rc::Rc,
};

/// Boxed error produced by external collaborators (factories, materializers)
pub type DynError = Box<dyn std::error::Error>;

/// Type Name and Type Id, plus the traits of the token the resolver cares about
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
    /// Value-semantics contract - participates in the optional shadow registration
    pub value_type: bool,
    /// Token denotes a parameterized type shape
    pub generic: bool,
}

// Identity is the TypeId alone; the flags only steer registration behavior,
// so a flagged token and its plain counterpart name the same contract
impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}
impl Eq for TypeInfo {}
impl std::hash::Hash for TypeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            value_type: false,
            generic: false,
        }
    }

    /// Token for a contract with value semantics
    pub fn of_value<T: Copy + 'static>() -> TypeInfo {
        TypeInfo {
            value_type: true,
            ..TypeInfo::of::<T>()
        }
    }

    /// Token standing in for a parameterized type shape
    pub fn of_generic<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            generic: true,
            ..TypeInfo::of::<T>()
        }
    }
}

/// Opaque, value-comparable handle distinguishing custom singleton scopes.
///
/// Tokens are issued by a [ContainerGraph](crate::container::ContainerGraph),
/// never constructed out of thin air, so two equal tokens always originate
/// from the same declaration site.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct ScopeToken(pub(crate) u64);

/// Value distinguishing multiple bindings that share a contract type
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Ident {
    Str(String),
    Int(i64),
    Token(ScopeToken),
}
impl From<&str> for Ident {
    fn from(value: &str) -> Self {
        Ident::Str(value.to_string())
    }
}
impl From<String> for Ident {
    fn from(value: String) -> Self {
        Ident::Str(value)
    }
}
impl From<i64> for Ident {
    fn from(value: i64) -> Self {
        Ident::Int(value)
    }
}
impl From<ScopeToken> for Ident {
    fn from(value: ScopeToken) -> Self {
        Ident::Token(value)
    }
}
impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ident::Str(s) => write!(f, "'{s}'"),
            Ident::Int(i) => write!(f, "{i}"),
            Ident::Token(t) => write!(f, "token#{}", t.0),
        }
    }
}

/// Lookup key of the provider table: contract type plus optional identifier.
///
/// The `optional` flag is the shadow form registered for value-type contracts,
/// so optional-typed dependency sites can be satisfied transparently.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BindingId {
    pub contract: TypeInfo,
    pub ident: Option<Ident>,
    pub optional: bool,
}
impl BindingId {
    pub fn new(contract: TypeInfo) -> Self {
        BindingId {
            contract,
            ident: None,
            optional: false,
        }
    }

    pub fn of<T: 'static + ?Sized>() -> Self {
        BindingId::new(TypeInfo::of::<T>())
    }

    pub fn with_ident(mut self, ident: impl Into<Ident>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    /// The optional counterpart of this id
    pub fn optional_shadow(&self) -> BindingId {
        BindingId {
            optional: true,
            ..self.clone()
        }
    }
}
impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.optional {
            write!(f, "Option<{}>", self.contract)?;
        } else {
            write!(f, "{}", self.contract)?;
        }
        if let Some(ident) = &self.ident {
            write!(f, " (id: {ident})")?;
        }
        Ok(())
    }
}

/// Instance produced by a Provider
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    payload: Rc<dyn Any>,
}
impl Instance {
    pub fn new<T: 'static>(value: T) -> Self {
        Instance {
            info: TypeInfo::of::<T>(),
            payload: Rc::new(value),
        }
    }

    pub fn downcast<T: 'static>(&self) -> Result<Rc<T>, &'static str> {
        match Rc::downcast::<T>(self.payload.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.info.type_name),
        }
    }

    /// Identity comparison - two resolutions of a shared scope hand out
    /// instances that compare equal here
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.payload, &other.payload)
    }
}
impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

/// Extra constructor-supplied value forwarded to instantiation
#[derive(Debug, Clone)]
pub struct Argument {
    pub info: TypeInfo,
    pub value: Instance,
}
impl Argument {
    pub fn new<T: 'static>(value: T) -> Self {
        Argument {
            info: TypeInfo::of::<T>(),
            value: Instance::new(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_info_flags() {
        let plain = TypeInfo::of::<String>();
        assert!(!plain.value_type);
        assert!(!plain.generic);

        let value = TypeInfo::of_value::<u32>();
        assert!(value.value_type);
        assert_eq!(value.type_id, TypeId::of::<u32>());

        let generic = TypeInfo::of_generic::<Vec<u8>>();
        assert!(generic.generic);
    }

    #[test]
    fn binding_id_shadow_keeps_contract_and_ident() {
        let id = BindingId::new(TypeInfo::of_value::<u32>()).with_ident("left");
        let shadow = id.optional_shadow();
        assert!(shadow.optional);
        assert_eq!(shadow.contract, id.contract);
        assert_eq!(shadow.ident, id.ident);
        assert_ne!(shadow, id);
    }

    #[test]
    fn instance_downcast_and_identity() {
        let a = Instance::new(41_u32);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(*a.downcast::<u32>().unwrap(), 41);
        assert_eq!(a.downcast::<String>().unwrap_err(), a.info.type_name);

        let c = Instance::new(41_u32);
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn ident_conversions() {
        assert_eq!(Ident::from("x"), Ident::Str("x".to_string()));
        assert_eq!(Ident::from(7_i64), Ident::Int(7));
    }
}
