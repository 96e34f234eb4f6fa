use super::bytecode::{IndexCount, Indices, Instruction};
use super::program::{ColumnBinding, OutputShape, Program};
use super::registers::{Handle, RegisterKind, RegisterValue};

/// one reusable scratch index buffer
#[derive(Debug, Clone, Copy)]
struct ScratchSlot {
    /// expected number of indices the slot was created for
    size: usize,
    register: Handle<Indices>,
    in_use: bool,
}

/// emits instructions and hands out registers
/// released registers go on a per-kind free list and are reused before new
/// ones are created, which keeps the interpreter's register file small
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    instructions: Vec<Instruction>,
    register_kinds: Vec<RegisterKind>,
    free: Vec<(RegisterKind, Vec<u32>)>,
    scratch: Vec<ScratchSlot>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// get a register of kind T, reusing a released one when possible
    pub fn allocate<T: RegisterValue>(&mut self) -> Handle<T> {
        if let Some(index) = self.free_list(T::KIND).pop() {
            return Handle::new(index);
        }
        let index = self.register_kinds.len() as u32;
        self.register_kinds.push(T::KIND);
        Handle::new(index)
    }

    /// the register's value is dead from here on
    pub fn release<T: RegisterValue>(&mut self, handle: Handle<T>) {
        debug_assert_eq!(self.register_kinds[handle.index as usize], T::KIND);
        let free = self.free_list(T::KIND);
        debug_assert!(!free.contains(&handle.index), "register released twice");
        free.push(handle.index);
    }

    fn free_list(&mut self, kind: RegisterKind) -> &mut Vec<u32> {
        let position = match self.free.iter().position(|(k, _)| *k == kind) {
            Some(p) => p,
            None => {
                self.free.push((kind, Vec::new()));
                self.free.len() - 1
            }
        };
        &mut self.free[position].1
    }

    /// allocate an index buffer sized from `count` and emit the allocation
    pub fn allocate_indices(&mut self, count: IndexCount) -> Handle<Indices> {
        let dest = self.allocate::<Indices>();
        self.emit(Instruction::AllocateIndices { count, dest });
        dest
    }

    /// scratch buffer expected to hold about `size` indices
    /// picks the smallest free slot that fits, else grows the largest free
    /// slot, else creates a new one; the allocation is emitted either way
    pub fn allocate_scratch(&mut self, size: usize, count: IndexCount) -> Handle<Indices> {
        let best = self
            .scratch
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.in_use && slot.size >= size)
            .min_by_key(|(_, slot)| slot.size)
            .map(|(i, _)| i)
            .or_else(|| {
                self.scratch
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| !slot.in_use)
                    .max_by_key(|(_, slot)| slot.size)
                    .map(|(i, _)| i)
            });

        let slot = match best {
            Some(i) => {
                let slot = &mut self.scratch[i];
                slot.size = slot.size.max(size);
                slot.in_use = true;
                *slot
            }
            None => {
                let register = self.allocate::<Indices>();
                let slot = ScratchSlot {
                    size,
                    register,
                    in_use: true,
                };
                self.scratch.push(slot);
                slot
            }
        };
        self.emit(Instruction::AllocateIndices {
            count,
            dest: slot.register,
        });
        slot.register
    }

    pub fn release_scratch(&mut self, register: Handle<Indices>) {
        if let Some(slot) = self.scratch.iter_mut().find(|s| s.register == register) {
            slot.in_use = false;
        }
    }

    pub fn is_scratch_in_use(&self, register: Handle<Indices>) -> bool {
        self.scratch
            .iter()
            .any(|s| s.register == register && s.in_use)
    }

    pub fn register_count(&self) -> usize {
        self.register_kinds.len()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn build(
        self,
        output: Handle<Indices>,
        mut columns: Vec<ColumnBinding>,
        shape: OutputShape,
    ) -> Program {
        columns.sort_by_key(|c| c.column);
        columns.dedup_by(|later, earlier| {
            if later.column == earlier.column {
                earlier.requires_sorted |= later.requires_sorted;
                true
            } else {
                false
            }
        });
        Program {
            instructions: self.instructions,
            register_kinds: self.register_kinds,
            columns,
            output,
            shape,
        }
    }
}
