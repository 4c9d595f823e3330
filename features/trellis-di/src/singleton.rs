use std::{collections::HashMap, rc::Rc};

use crate::{
    provider::Provider,
    types::{Ident, ScopeToken, TypeInfo},
};

/// The kind of singleton identity a bind statement declared
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum SingletonKind {
    /// Plain type-based singleton
    ByType,
    /// Id-based singleton
    ByTypeAndId(Ident),
    /// Singleton discriminated by an explicit scope handle
    ByScopeToken(ScopeToken),
    /// Scope handle plus an id - the id splits the scope like it splits types
    ByScopeTokenAndId(ScopeToken, Ident),
}

/// Composite identity de-duplicating singleton providers across separate
/// bind statements
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct SingletonKey {
    pub concrete: TypeInfo,
    pub kind: SingletonKind,
}
impl SingletonKey {
    pub fn new(concrete: TypeInfo, ident: Option<Ident>) -> Self {
        SingletonKey {
            concrete,
            kind: match ident {
                Some(ident) => SingletonKind::ByTypeAndId(ident),
                None => SingletonKind::ByType,
            },
        }
    }

    pub fn scoped(concrete: TypeInfo, token: ScopeToken, ident: Option<Ident>) -> Self {
        SingletonKey {
            concrete,
            kind: match ident {
                Some(ident) => SingletonKind::ByScopeTokenAndId(token, ident),
                None => SingletonKind::ByScopeToken(token),
            },
        }
    }
}

/// Ensures exactly one provider exists per singleton identity.
///
/// Two separate bind statements resolving to the same key get the very same
/// provider back - the central correctness property of the engine.
#[derive(Default)]
pub struct SingletonRegistry {
    providers: HashMap<SingletonKey, Rc<dyn Provider>>,
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the provider for `key`, building it on first sight
    pub fn mark(
        &mut self,
        key: SingletonKey,
        build: impl FnOnce() -> Rc<dyn Provider>,
    ) -> Rc<dyn Provider> {
        if let Some(existing) = self.providers.get(&key) {
            tracing::debug!("Reusing singleton provider for {}", key.concrete);
            return existing.clone();
        }

        let provider = build();
        self.providers.insert(key, provider.clone());
        provider
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.providers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{provider::InstanceProvider, types::Instance};

    fn provider_for(value: u32) -> Rc<dyn Provider> {
        Rc::new(InstanceProvider::new(Instance::new(value)))
    }

    #[test]
    fn same_key_yields_same_provider() {
        let mut registry = SingletonRegistry::new();
        let key = SingletonKey::new(TypeInfo::of::<u32>(), None);

        let first = registry.mark(key.clone(), || provider_for(1));
        let second = registry.mark(key, || provider_for(2));

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn identifier_distinguishes_keys() {
        let mut registry = SingletonRegistry::new();
        let plain = SingletonKey::new(TypeInfo::of::<u32>(), None);
        let named = SingletonKey::new(TypeInfo::of::<u32>(), Some("named".into()));

        let first = registry.mark(plain, || provider_for(1));
        let second = registry.mark(named, || provider_for(2));

        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn scope_token_distinguishes_keys() {
        let mut registry = SingletonRegistry::new();
        let by_type = SingletonKey::new(TypeInfo::of::<u32>(), None);
        let by_token = SingletonKey::scoped(TypeInfo::of::<u32>(), ScopeToken(9), None);

        registry.mark(by_type, || provider_for(1));
        registry.mark(by_token, || provider_for(2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn identifier_splits_a_scope_token_key() {
        let mut registry = SingletonRegistry::new();
        let plain = SingletonKey::scoped(TypeInfo::of::<u32>(), ScopeToken(9), None);
        let named = SingletonKey::scoped(TypeInfo::of::<u32>(), ScopeToken(9), Some("named".into()));

        let first = registry.mark(plain, || provider_for(1));
        let second = registry.mark(named, || provider_for(2));

        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 2);
    }
}
