//! One frame of the invocation stack.

use crate::{
    EvaluationStack, ExceptionHandlingContext, Instruction, ReferenceCounter, Script, StackItem,
    VmError, VmResult,
};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A slot array for locals, arguments or static fields.
#[derive(Debug, Clone)]
pub struct Slot {
    items: Vec<StackItem>,
    counter: ReferenceCounter,
}

impl Slot {
    pub fn new(count: usize, counter: ReferenceCounter) -> Self {
        let items = vec![StackItem::Null; count];
        for item in &items {
            counter.add_stack_reference(item);
        }
        Self { items, counter }
    }

    pub fn from_items(items: Vec<StackItem>, counter: ReferenceCounter) -> Self {
        for item in &items {
            counter.add_stack_reference(item);
        }
        Self { items, counter }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> VmResult<StackItem> {
        self.items.get(index).cloned().ok_or_else(|| {
            VmError::OutOfRange(format!("slot index {index} of {}", self.items.len()))
        })
    }

    pub fn set(&mut self, index: usize, item: StackItem) -> VmResult<()> {
        let target = self
            .items
            .get_mut(index)
            .ok_or_else(|| VmError::OutOfRange(format!("slot index {index}")))?;
        self.counter.remove_stack_reference(target);
        self.counter.add_stack_reference(&item);
        *target = item;
        Ok(())
    }

    /// Releases every held reference.
    pub fn clear(&mut self) {
        for item in self.items.drain(..) {
            self.counter.remove_stack_reference(&item);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StackItem> {
        self.items.iter()
    }
}

/// One execution context: a script, its instruction pointer, stack and slots.
///
/// The evaluation stack and static fields are shared between contexts that
/// the `CALL` family clones from one another; contexts created by loading a
/// fresh script get their own.
pub struct ExecutionContext {
    script: Rc<Script>,
    instruction_pointer: usize,
    /// How many result items this context leaves for its caller; -1 for all.
    pub rvcount: i32,
    pub evaluation_stack: Rc<RefCell<EvaluationStack>>,
    pub static_fields: Rc<RefCell<Option<Slot>>>,
    pub local_variables: Option<Slot>,
    pub arguments: Option<Slot>,
    pub try_stack: Vec<ExceptionHandlingContext>,
    /// Host-attached data, keyed by a type tag.
    pub states: HashMap<&'static str, Rc<dyn Any>>,
}

impl ExecutionContext {
    pub fn new(script: Rc<Script>, rvcount: i32, counter: &ReferenceCounter) -> Self {
        Self {
            script,
            instruction_pointer: 0,
            rvcount,
            evaluation_stack: Rc::new(RefCell::new(EvaluationStack::new(counter.clone()))),
            static_fields: Rc::new(RefCell::new(None)),
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
            states: HashMap::new(),
        }
    }

    /// A clone for `CALL`: same script, shared stack and statics, fresh
    /// locals, arguments, try stack and host state.
    pub fn call_clone(&self, position: usize) -> Self {
        Self {
            script: Rc::clone(&self.script),
            instruction_pointer: position,
            rvcount: -1,
            evaluation_stack: Rc::clone(&self.evaluation_stack),
            static_fields: Rc::clone(&self.static_fields),
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
            states: self.states.clone(),
        }
    }

    pub fn script(&self) -> &Rc<Script> {
        &self.script
    }

    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }

    /// Moves the instruction pointer to an instruction boundary.
    pub fn jump_to(&mut self, position: usize) -> VmResult<()> {
        if position > self.script.len() {
            return Err(VmError::OutOfRange(format!(
                "jump to {position} outside script of {}",
                self.script.len()
            )));
        }
        if position < self.script.len() {
            self.script.instruction_at(position)?;
        }
        self.instruction_pointer = position;
        Ok(())
    }

    /// The instruction at the pointer; `None` past the end (implicit RET).
    pub fn current_instruction(&self) -> VmResult<Option<Instruction>> {
        if self.instruction_pointer >= self.script.len() {
            return Ok(None);
        }
        Ok(Some(
            self.script
                .instruction_at(self.instruction_pointer)?
                .clone(),
        ))
    }

    /// Advances past the current instruction.
    pub fn move_next(&mut self) -> VmResult<()> {
        if let Some(instruction) = self.current_instruction()? {
            self.instruction_pointer = instruction.next_position();
        }
        Ok(())
    }

    /// A typed view of host state attached to this context.
    pub fn get_state<T: Any>(&self, key: &'static str) -> Option<Rc<T>> {
        self.states
            .get(key)
            .and_then(|state| Rc::clone(state).downcast::<T>().ok())
    }

    /// Attaches host state to this context.
    pub fn set_state<T: Any>(&mut self, key: &'static str, state: Rc<T>) {
        self.states.insert(key, state);
    }

    /// Clones of everything this context roots for the reference counter.
    pub fn reference_roots(&self) -> Vec<StackItem> {
        let mut roots: Vec<StackItem> = self.evaluation_stack.borrow().iter().cloned().collect();
        if let Some(slot) = self.static_fields.borrow().as_ref() {
            roots.extend(slot.iter().cloned());
        }
        if let Some(slot) = &self.local_variables {
            roots.extend(slot.iter().cloned());
        }
        if let Some(slot) = &self.arguments {
            roots.extend(slot.iter().cloned());
        }
        roots
    }

    /// Releases local and argument references when the context unloads;
    /// statics are released once their last sharer unloads.
    pub fn release(&mut self) {
        if let Some(slot) = &mut self.local_variables {
            slot.clear();
        }
        if let Some(slot) = &mut self.arguments {
            slot.clear();
        }
        if Rc::strong_count(&self.static_fields) == 1 {
            if let Some(slot) = self.static_fields.borrow_mut().as_mut() {
                slot.clear();
            }
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("ip", &self.instruction_pointer)
            .field("stack", &self.evaluation_stack.borrow().len())
            .field("rvcount", &self.rvcount)
            .finish()
    }
}
