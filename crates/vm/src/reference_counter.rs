//! Stack-item reference accounting.

use crate::StackItem;
use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

/// Counts references held by stacks, slots and compound items so the engine
/// can bound the total number of live items.
///
/// The count is edge-based and maintained incrementally: pushing an item or
/// nesting it inside a compound adds a reference, popping or removing takes
/// one away. Removing a compound sets the `zero_referred` flag; the engine
/// then runs [`recount`](ReferenceCounter::recount) over its roots, which
/// frees the count from unreachable cycles.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCounter {
    count: Rc<Cell<usize>>,
    zero_referred: Rc<Cell<bool>>,
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reference count.
    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// Records a reference from a stack or slot to `item`, including the
    /// references already inside it when it is a compound.
    pub fn add_stack_reference(&self, item: &StackItem) {
        self.add_references(1);
        if is_compound(item) {
            self.zero_referred.set(false);
        }
    }

    /// Releases a stack or slot reference to `item`.
    pub fn remove_stack_reference(&self, item: &StackItem) {
        self.remove_references(1);
        if is_compound(item) {
            self.zero_referred.set(true);
        }
    }

    /// Records `count` new references from a compound parent to children.
    pub fn add_references(&self, count: usize) {
        self.count.set(self.count.get() + count);
    }

    /// Releases `count` references from a compound parent.
    pub fn remove_references(&self, count: usize) {
        self.count.set(self.count.get().saturating_sub(count));
    }

    /// Whether a compound may have become unreachable since the last sweep.
    pub fn needs_sweep(&self) -> bool {
        self.zero_referred.get()
    }

    /// Recomputes the count by walking the reachable graph from `roots`,
    /// clearing any inflation left behind by unreachable cycles.
    pub fn recount<'a>(&self, roots: impl Iterator<Item = &'a StackItem>) {
        let mut visited: HashSet<*const ()> = HashSet::new();
        let mut total = 0usize;
        for item in roots {
            total += 1;
            count_children(item, &mut visited, &mut total);
        }
        self.count.set(total);
        self.zero_referred.set(false);
    }
}

fn is_compound(item: &StackItem) -> bool {
    matches!(
        item,
        StackItem::Array(_) | StackItem::Struct(_) | StackItem::Map(_)
    )
}

fn count_children(item: &StackItem, visited: &mut HashSet<*const ()>, total: &mut usize) {
    match item {
        StackItem::Array(items) | StackItem::Struct(items) => {
            if !visited.insert(Rc::as_ptr(items) as *const ()) {
                return;
            }
            for child in items.borrow().iter() {
                *total += 1;
                count_children(child, visited, total);
            }
        }
        StackItem::Map(entries) => {
            if !visited.insert(Rc::as_ptr(entries) as *const ()) {
                return;
            }
            for (_, value) in entries.borrow().iter() {
                // Key and value each hold a reference.
                *total += 2;
                count_children(value, visited, total);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_balance() {
        let counter = ReferenceCounter::new();
        let item = StackItem::from_int(1);
        counter.add_stack_reference(&item);
        counter.add_stack_reference(&item);
        assert_eq!(counter.count(), 2);
        counter.remove_stack_reference(&item);
        counter.remove_stack_reference(&item);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn recount_collapses_unreachable_cycle() {
        let counter = ReferenceCounter::new();
        let array = StackItem::from_array(vec![]);
        if let StackItem::Array(items) = &array {
            // Self-referencing cycle.
            items.borrow_mut().push(array.clone());
        }
        counter.add_stack_reference(&array);
        counter.add_references(1);
        assert_eq!(counter.count(), 2);

        counter.remove_stack_reference(&array);
        assert!(counter.needs_sweep());
        counter.recount(std::iter::empty());
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn recount_walks_nested_compounds() {
        let counter = ReferenceCounter::new();
        let inner = StackItem::from_array(vec![StackItem::from_int(1), StackItem::from_int(2)]);
        let outer = StackItem::from_array(vec![inner]);
        let roots = [outer];
        counter.recount(roots.iter());
        // outer + inner + two integers.
        assert_eq!(counter.count(), 4);
    }
}
