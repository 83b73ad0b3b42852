use std::collections::HashMap;
use std::hash::Hash;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Entry of a nested report: an item, or the children of the item just before it.
///
/// Serialized untagged, so a report reads `["one", ["one2", ["one2-1"]], "two"]`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum NestedItem<T> {
    Item(T),
    Children(Vec<NestedItem<T>>),
}

/// Ordered, parent-aware set of everything touched by a publish or unpublish call.
///
/// Membership is the recursion guard for traversals: an item is registered before any of
/// its dependencies are processed, so a cycle leading back to it stops at the membership
/// check. The parent links are only used to build [`VisitedSet::nested_report`].
#[derive(Clone, Debug)]
pub struct VisitedSet<T> {
    roots: Vec<T>,
    order: Vec<T>,
    children: HashMap<T, Vec<T>>,
}

impl<T> Default for VisitedSet<T> {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            order: Vec::new(),
            children: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> VisitedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `item`, nested under `parent` when the parent is tracked. Returns `false`
    /// when the item was already present; the existing entry is left untouched.
    pub fn add(&mut self, item: T, parent: Option<&T>) -> bool {
        if self.children.contains_key(&item) {
            return false;
        }

        match parent.and_then(|parent| self.children.get_mut(parent)) {
            Some(siblings) => siblings.push(item.clone()),
            None => self.roots.push(item.clone()),
        }
        self.order.push(item.clone());
        self.children.insert(item, Vec::new());
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.children.contains_key(item)
    }

    /// Returns the instance that was originally added when one equal to `item` is tracked,
    /// otherwise `item` itself.
    pub fn original<'a>(&'a self, item: &'a T) -> &'a T {
        self.children
            .get_key_value(item)
            .map(|(original, _)| original)
            .unwrap_or(item)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter()
    }

    pub fn roots(&self) -> &[T] {
        &self.roots
    }

    pub fn children_of(&self, item: &T) -> &[T] {
        self.children.get(item).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tree-shaped view of the set in insertion order.
    pub fn nested_report(&self) -> Vec<NestedItem<T>> {
        let mut nested = Vec::new();
        self.push_nested(&self.roots, &mut nested);
        nested
    }

    fn push_nested(&self, items: &[T], nested: &mut Vec<NestedItem<T>>) {
        for item in items {
            nested.push(NestedItem::Item(item.clone()));
            let children = self.children_of(item);
            if !children.is_empty() {
                let mut sub = Vec::new();
                self.push_nested(children, &mut sub);
                nested.push(NestedItem::Children(sub));
            }
        }
    }
}

impl<'a, T> IntoIterator for &'a VisitedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}
