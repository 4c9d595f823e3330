use std::rc::Rc;

use crate::{
    container::ContainerId,
    types::{BindingId, TypeInfo},
};

/// Predicate deciding at resolve time whether a binding answers a request
pub type BindingCondition = Rc<dyn Fn(&InjectContext) -> bool>;

/// Description of the site requesting a dependency.
///
/// Contexts chain: when a provider's construction resolves further
/// dependencies, each nested request carries the outer one as its parent.
#[derive(Clone)]
pub struct InjectContext {
    /// Container the lookup started in
    pub container: ContainerId,
    pub requested: BindingId,
    /// Type whose construction triggered this request, if any
    pub object_type: Option<TypeInfo>,
    pub optional: bool,
    pub parent: Option<Rc<InjectContext>>,
}

impl InjectContext {
    pub fn root(container: ContainerId, requested: BindingId) -> Self {
        InjectContext {
            container,
            requested,
            object_type: None,
            optional: false,
            parent: None,
        }
    }

    /// A nested request made while constructing `object_type`
    pub fn child(self: &Rc<Self>, requested: BindingId, object_type: Option<TypeInfo>) -> Self {
        InjectContext {
            container: self.container,
            requested,
            object_type,
            optional: false,
            parent: Some(self.clone()),
        }
    }

    /// Walks from this context up to the root request
    pub fn chain(&self) -> impl Iterator<Item = &InjectContext> {
        let mut next = Some(self);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.parent.as_deref();
            Some(current)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeInfo;

    #[test]
    fn chain_walks_to_root() {
        let root = Rc::new(InjectContext::root(
            ContainerId(0),
            BindingId::of::<String>(),
        ));
        let mid = Rc::new(root.child(BindingId::of::<u32>(), Some(TypeInfo::of::<String>())));
        let leaf = mid.child(BindingId::of::<bool>(), Some(TypeInfo::of::<u32>()));

        let requested: Vec<_> = leaf.chain().map(|c| c.requested.contract).collect();
        assert_eq!(
            requested,
            vec![
                TypeInfo::of::<bool>(),
                TypeInfo::of::<u32>(),
                TypeInfo::of::<String>()
            ]
        );
    }
}
