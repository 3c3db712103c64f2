// Lexical scope model
//
// `LocalScope` is the compile-time view: which names live in which slot of a
// function's frame. `Frame` is the runtime storage. A `FramePointer` links
// the two: how many parent links to follow, then which slot to read.

use crate::vm::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Reference to a binding: `parent_level` links up the frame chain, then `slot`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramePointer {
    pub parent_level: usize,
    pub slot: usize,
}

impl FramePointer {
    pub fn new(parent_level: usize, slot: usize) -> Self {
        Self { parent_level, slot }
    }
}

/// Names declared by one function body (or one debugger evaluation)
#[derive(Debug, Default)]
pub struct LocalScope {
    parent: Option<Arc<LocalScope>>,
    /// Slot index -> name. A redeclared name gets a fresh slot.
    slots: RwLock<Vec<String>>,
}

impl LocalScope {
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(self.clone()),
            slots: RwLock::new(Vec::new()),
        })
    }

    pub fn parent(&self) -> Option<&Arc<LocalScope>> {
        self.parent.as_ref()
    }

    /// Declare `name` in this scope and return its slot
    pub fn declare(&self, name: &str) -> usize {
        let mut slots = self.slots.write();
        slots.push(name.to_string());
        slots.len() - 1
    }

    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Latest slot declared for `name` in this scope only
    pub fn local_slot(&self, name: &str) -> Option<usize> {
        self.slots.read().iter().rposition(|n| n == name)
    }

    /// Resolve `name` to the nearest enclosing declaration
    pub fn resolve(&self, name: &str) -> Option<FramePointer> {
        let mut level = 0;
        let mut scope = self;
        loop {
            if let Some(slot) = scope.local_slot(name) {
                return Some(FramePointer::new(level, slot));
            }
            scope = scope.parent.as_deref()?;
            level += 1;
        }
    }

    /// Every declaration visible from this scope, innermost first. Within one
    /// scope later declarations come before earlier ones, so the first entry
    /// for a name is the one `resolve` would pick.
    pub fn visible_bindings(&self) -> Vec<(String, FramePointer)> {
        let mut result = Vec::new();
        let mut level = 0;
        let mut scope = Some(self);
        while let Some(current) = scope {
            let slots = current.slots.read();
            for (slot, name) in slots.iter().enumerate().rev() {
                result.push((name.clone(), FramePointer::new(level, slot)));
            }
            scope = current.parent.as_deref();
            level += 1;
        }
        result
    }

    /// Name -> pointer map with shadowing resolved to the innermost declaration
    pub fn flatten_bindings(&self) -> FxHashMap<String, FramePointer> {
        let mut flat = FxHashMap::default();
        for (name, pointer) in self.visible_bindings() {
            flat.entry(name).or_insert(pointer);
        }
        flat
    }
}

/// Runtime storage for one scope's bindings
#[derive(Debug, Default)]
pub struct Frame {
    slots: RwLock<Vec<Option<Value>>>,
    parent: Option<Arc<Frame>>,
}

impl Frame {
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A frame whose first slots are `arguments`
    pub fn with_parent(parent: Arc<Frame>, arguments: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            slots: RwLock::new(arguments.into_iter().map(Some).collect()),
            parent: Some(parent),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Frame>> {
        self.parent.as_ref()
    }

    /// Follow `level` parent links
    pub fn ancestor(&self, level: usize) -> Option<&Frame> {
        let mut frame = self;
        for _ in 0..level {
            frame = frame.parent.as_deref()?;
        }
        Some(frame)
    }

    /// Read the binding `pointer` refers to. `None` if the frame chain is
    /// shorter than expected or the slot has not been assigned yet.
    pub fn read(&self, pointer: FramePointer) -> Option<Value> {
        self.ancestor(pointer.parent_level)?
            .slots
            .read()
            .get(pointer.slot)
            .cloned()
            .flatten()
    }

    pub fn set_local(&self, slot: usize, value: Value) {
        let mut slots = self.slots.write();
        if slots.len() <= slot {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(value);
    }
}

/// The lexical context a halt point was reached in
#[derive(Clone, Debug)]
pub struct CallerInfo {
    pub frame: Arc<Frame>,
    pub scope: Arc<LocalScope>,
}

impl CallerInfo {
    pub fn new(frame: Arc<Frame>, scope: Arc<LocalScope>) -> Self {
        Self { frame, scope }
    }

    /// Same frame and same scope objects
    pub fn same_as(&self, other: &CallerInfo) -> bool {
        Arc::ptr_eq(&self.frame, &other.frame) && Arc::ptr_eq(&self.scope, &other.scope)
    }

    /// Resolve every visible, initialized binding. Shadowed names resolve to
    /// the nearest declaration that has been assigned.
    pub fn bindings(&self) -> FxHashMap<String, Value> {
        let mut result = FxHashMap::default();
        for (name, pointer) in self.scope.visible_bindings() {
            if result.contains_key(&name) {
                continue;
            }
            if let Some(value) = self.frame.read(pointer) {
                result.insert(name, value);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_counts_parent_levels() {
        let outer = LocalScope::root();
        let x = outer.declare("x");
        let inner = outer.child();
        let y = inner.declare("y");

        assert_eq!(inner.resolve("y"), Some(FramePointer::new(0, y)));
        assert_eq!(inner.resolve("x"), Some(FramePointer::new(1, x)));
        assert_eq!(inner.resolve("z"), None);
    }

    #[test]
    fn flatten_prefers_innermost_declaration() {
        let outer = LocalScope::root();
        outer.declare("x");
        outer.declare("only_outer");
        let inner = outer.child();
        let slot = inner.declare("x");

        let flat = inner.flatten_bindings();
        assert_eq!(flat["x"], FramePointer::new(0, slot));
        assert_eq!(flat["only_outer"].parent_level, 1);
    }

    #[test]
    fn redeclaration_in_one_scope_uses_latest_slot() {
        let scope = LocalScope::root();
        scope.declare("x");
        let second = scope.declare("x");
        assert_eq!(scope.resolve("x"), Some(FramePointer::new(0, second)));
    }

    #[test]
    fn bindings_skip_unassigned_shadows() {
        let outer_scope = LocalScope::root();
        let outer_x = outer_scope.declare("x");
        let inner_scope = outer_scope.child();
        inner_scope.declare("x");

        let outer_frame = Frame::root();
        outer_frame.set_local(outer_x, Value::Integer(1));
        let inner_frame = Frame::with_parent(outer_frame, Vec::new());

        let caller = CallerInfo::new(inner_frame.clone(), inner_scope.clone());
        assert_eq!(caller.bindings()["x"], Value::Integer(1));

        inner_frame.set_local(0, Value::Integer(2));
        assert_eq!(caller.bindings()["x"], Value::Integer(2));
    }

    #[test]
    fn read_past_the_root_is_none() {
        let frame = Frame::root();
        assert!(frame.read(FramePointer::new(1, 0)).is_none());
    }
}
