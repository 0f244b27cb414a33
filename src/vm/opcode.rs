//! Instruction set
//!
//! Every operation is one [`OpCode`] variant whose fields are exactly the
//! operands that operation accepts, so an instruction with the wrong operand
//! shape cannot be constructed. [`OpCode::push_count`] is the declared stack
//! effect table; the interpreter never consults it, the block builder and the
//! verifier do.
//!
//! Branch displacements are relative to the instruction *after* the branch
//! (the PC is advanced before dispatch).

use crate::core::value::{Literal, Name};
use crate::vm::engine::ErrorLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Access intent of a variable, property or index fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// Plain read; missing targets raise a notice and yield null
    R,
    /// Write-prepare; missing targets are created silently
    W,
    /// Read then write-prepare; missing targets raise a notice and are created
    RW,
    /// Isset-prepare; never raises, never creates
    I,
    /// Unset-prepare; yields the container without creating it
    U,
    /// ForEach-prepare; a read that splits copy-on-write sharing
    FE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Identical,
    NotIdentical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastKind {
    Int,
    Float,
    String,
    Bool,
    Array,
    Object,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncDecOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

/// How a prepared argument is handed to the callee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgPassing {
    ByValue,
    /// Temporaries raise a strict notice and degrade to by-value
    ByReference,
    /// Referable values go by reference, temporaries silently by value
    PreferReference,
    /// Follow the resolved callee's declaration for parameter `index`
    Dynamic(u32),
    /// As `Dynamic`, but the argument is a constant expression: a by-reference
    /// parameter is a fatal error
    DynamicNotReferable(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    // Stack
    Push(Literal),
    Dup,
    Drop,
    Swap,
    Reverse(u32), // Reverse the top n entries

    // Locals
    Local { name: Name, intent: Intent },
    Indirect { intent: Intent },                         // [Name] -> [Slot]
    IssetLocal { name: Option<Name>, empty: bool },      // empty() when `empty`
    UnsetLocal(Option<Name>),
    AssignLocal { name: Option<Name>, keep: bool },      // [Val, Name?] -> [Val?]
    AssignRefLocal { name: Option<Name>, keep: bool },   // [Slot, Name?] -> [Slot?]
    LoadStatic { name: Name, init: Literal },            // Bind local to function static
    MakeGlobal(Option<Name>),                            // Bind local to global of same name

    // Globals
    Global { name: Name, intent: Intent },
    IssetGlobal { name: Name, empty: bool },
    UnsetGlobal(Name),
    AssignGlobal { name: Name, keep: bool },
    AssignRefGlobal { name: Name, keep: bool },

    // Constants
    Constant(Name),
    ClassConstant { class: Name, name: Name },

    // Operators
    Arith { op: ArithOp, in_place: bool }, // in_place: [Slot, Val] -> [Val], slot updated
    Compare(CompareOp),
    Logical(LogicalOp),
    Not,
    Neg,
    Plus,
    BitNot,
    Cast(CastKind),
    IncDec { op: IncDecOp, keep: bool }, // [Slot] -> [Val?]
    MultiConcat(NonZeroU32),

    // Control flow
    Branch(i32),
    BrTrue(i32),
    BrFalse(i32),
    Break { loops: u32 }, // [Levels] -> []; followed by `loops` branch instructions
    Return(bool),         // true: pops the return value
    TryEnter(i32),        // Handler displacement
    TryExit,
    CatchEnter { class: Name, skip: i32 },
    Throw,
    Exit(bool), // true: pops the exit status
    Echo,
    Error { level: ErrorLevel, message: String },
    Silence(bool),       // true: begin @-region, false: end it
    Ticks(Option<u32>),  // Some(n): enter declare(ticks=n), None: leave it
    ReturnByRefCheck,

    // Calls
    FindFunction(Option<Name>),                          // [Name?] -> []
    FindMethod(Option<Name>),                            // [Obj, Name?] -> []
    FindStaticMethod { class: Name, method: Option<Name> },
    PrepareArg(ArgPassing),
    ArgContext { index: u32, by_value: i32, by_ref: i32 },
    Invoke { argc: u32, discard: bool },

    // Objects
    ClassNew { class: Option<Name>, no_ctor: i32 },      // [ClassName?] -> [Obj]
    ObjectInitCheck,
    Clone,
    InstanceOf(Option<Name>),                            // [Val, ClassName?] -> [Bool]
    Property { name: Option<Name>, intent: Intent },     // [Obj, Name?] -> [Slot]
    AssignProperty { name: Option<Name>, keep: bool },   // [Val, Obj, Name?] -> [Val?]
    AssignRefProperty { name: Option<Name>, keep: bool },
    IssetProperty { name: Option<Name>, empty: bool },
    UnsetProperty(Option<Name>),
    StaticProperty { class: Name, name: Option<Name> },
    AssignStaticProperty { class: Name, name: Option<Name>, keep: bool },
    AssignRefStaticProperty { class: Name, name: Option<Name>, keep: bool },
    IssetStaticProperty { class: Name, name: Option<Name>, empty: bool },
    UnsetStaticProperty { class: Name, name: Option<Name> },

    // Arrays
    NewArray,
    ArrayInitCheck,
    ArrayAppend { by_ref: bool },                        // [Arr, Val] -> [Arr]
    ArrayInsert { by_ref: bool },                        // [Arr, Key, Val] -> [Arr]
    Index { key: Option<Literal>, intent: Intent },      // [Arr, Key?] -> [Slot]
    IndexAppend,                                         // [Arr] -> [new Slot]
    AssignIndex { key: Option<Literal>, keep: bool },    // [Val, Arr, Key?] -> [Val?]
    AssignRefIndex { key: Option<Literal>, keep: bool },
    AssignAppend { keep: bool },                         // [Val, Arr] -> [Val?]
    AssignRefAppend { keep: bool },
    IssetIndex { key: Option<Literal>, empty: bool },
    UnsetIndex(Option<Literal>),

    // Iteration
    FeInit { arrow: bool, by_ref: bool, empty: i32 },
    FeNext(i32),
    FeFree,
    ListInit { count: NonZeroU32, silent: bool },        // [Src] -> [Val]
    ListNext { silent: bool },
    ListFree { keep: bool },
}

/// Net push when a value may be kept or dropped after an assignment-like op
#[inline]
fn keep_or(keep: bool, kept: i32) -> i32 {
    if keep { kept } else { kept - 1 }
}

#[inline]
fn inline_or_popped<T>(operand: &Option<T>, inlined: i32) -> i32 {
    if operand.is_some() { inlined } else { inlined - 1 }
}

impl OpCode {
    /// Declared net stack effect of the instruction on its fall-through path
    pub fn push_count(&self) -> i32 {
        use OpCode::*;
        match self {
            Push(_) | Dup => 1,
            Drop => -1,
            Swap | Reverse(_) => 0,

            Local { .. } => 1,
            Indirect { .. } => 0,
            IssetLocal { name, .. } => inline_or_popped(name, 1),
            UnsetLocal(name) => inline_or_popped(name, 0),
            AssignLocal { name, keep } | AssignRefLocal { name, keep } => {
                inline_or_popped(name, keep_or(*keep, 0))
            }
            LoadStatic { .. } => 0,
            MakeGlobal(name) => inline_or_popped(name, 0),

            Global { .. } | IssetGlobal { .. } => 1,
            UnsetGlobal(_) => 0,
            AssignGlobal { keep, .. } | AssignRefGlobal { keep, .. } => keep_or(*keep, 0),

            Constant(_) | ClassConstant { .. } => 1,

            Arith { .. } | Compare(_) | Logical(_) => -1,
            Not | Neg | Plus | BitNot | Cast(_) => 0,
            IncDec { keep, .. } => keep_or(*keep, 0),
            MultiConcat(n) => 1 - n.get() as i32,

            Branch(_) => 0,
            BrTrue(_) | BrFalse(_) => -1,
            Break { .. } => -1,
            Return(with_value) => -(*with_value as i32),
            TryEnter(_) | TryExit => 0,
            // Accounts for the caught value the unwinder pushes at the handler
            CatchEnter { .. } => 1,
            Throw | Echo => -1,
            Exit(with_status) => -(*with_status as i32),
            Error { .. } | Silence(_) | ReturnByRefCheck => 0,
            Ticks(_) => 0,

            FindFunction(name) => inline_or_popped(name, 0),
            FindMethod(name) => inline_or_popped(name, -1),
            FindStaticMethod { method, .. } => inline_or_popped(method, 0),
            PrepareArg(_) | ArgContext { .. } => 0,
            Invoke { argc, discard } => {
                let argc = *argc as i32;
                if *discard { -argc } else { 1 - argc }
            }

            ClassNew { class, .. } => inline_or_popped(class, 1),
            ObjectInitCheck | Clone => 0,
            InstanceOf(class) => inline_or_popped(class, 0),
            Property { name, .. } => inline_or_popped(name, 0),
            AssignProperty { name, keep } | AssignRefProperty { name, keep } => {
                inline_or_popped(name, keep_or(*keep, -1))
            }
            IssetProperty { name, .. } => inline_or_popped(name, 0),
            UnsetProperty(name) => inline_or_popped(name, -1),
            StaticProperty { name, .. } | IssetStaticProperty { name, .. } => {
                inline_or_popped(name, 1)
            }
            AssignStaticProperty { name, keep, .. } | AssignRefStaticProperty { name, keep, .. } => {
                inline_or_popped(name, keep_or(*keep, 0))
            }
            UnsetStaticProperty { name, .. } => inline_or_popped(name, 0),

            NewArray => 1,
            ArrayInitCheck => 0,
            ArrayAppend { .. } => -1,
            ArrayInsert { .. } => -2,
            Index { key, .. } => inline_or_popped(key, 0),
            IndexAppend => 0,
            AssignIndex { key, keep } | AssignRefIndex { key, keep } => {
                inline_or_popped(key, keep_or(*keep, -1))
            }
            AssignAppend { keep } | AssignRefAppend { keep } => keep_or(*keep, -1),
            IssetIndex { key, .. } => inline_or_popped(key, 0),
            UnsetIndex(key) => inline_or_popped(key, -1),

            FeInit { arrow, .. } => *arrow as i32,
            FeNext(_) | FeFree => 0,
            ListInit { .. } => 0,
            ListNext { .. } => 1,
            ListFree { keep } => *keep as i32,
        }
    }

    /// Single forward/backward displacement carried by the instruction
    pub fn displacement(&self) -> Option<i32> {
        match self {
            OpCode::Branch(d)
            | OpCode::BrTrue(d)
            | OpCode::BrFalse(d)
            | OpCode::TryEnter(d)
            | OpCode::FeNext(d) => Some(*d),
            OpCode::CatchEnter { skip, .. } => Some(*skip),
            OpCode::FeInit { empty, .. } => Some(*empty),
            OpCode::ClassNew { no_ctor, .. } => Some(*no_ctor),
            _ => None,
        }
    }

    /// Patch the displacement; returns false when the op carries none
    pub fn set_displacement(&mut self, displacement: i32) -> bool {
        match self {
            OpCode::Branch(d)
            | OpCode::BrTrue(d)
            | OpCode::BrFalse(d)
            | OpCode::TryEnter(d)
            | OpCode::FeNext(d) => *d = displacement,
            OpCode::CatchEnter { skip, .. } => *skip = displacement,
            OpCode::FeInit { empty, .. } => *empty = displacement,
            OpCode::ClassNew { no_ctor, .. } => *no_ctor = displacement,
            _ => return false,
        }
        true
    }

    /// Control never reaches the next instruction
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OpCode::Branch(_)
                | OpCode::Return(_)
                | OpCode::Throw
                | OpCode::Exit(_)
                | OpCode::Break { .. }
                | OpCode::ArgContext { .. }
        )
    }

    pub fn mnemonic(&self) -> &'static str {
        use OpCode::*;
        match self {
            Push(_) => "PUSH",
            Dup => "DUP",
            Drop => "DROP",
            Swap => "SWAP",
            Reverse(_) => "REVERSE",
            Local { .. } => "LOCAL",
            Indirect { .. } => "INDIRECT",
            IssetLocal { .. } => "ISSET_LOCAL",
            UnsetLocal(_) => "UNSET_LOCAL",
            AssignLocal { .. } => "ASSIGN_VAL_LOCAL",
            AssignRefLocal { .. } => "ASSIGN_REF_LOCAL",
            LoadStatic { .. } => "LOAD_STATIC",
            MakeGlobal(_) => "MAKE_GLOBAL",
            Global { .. } => "GLOBAL",
            IssetGlobal { .. } => "ISSET_GLOBAL",
            UnsetGlobal(_) => "UNSET_GLOBAL",
            AssignGlobal { .. } => "ASSIGN_VAL_GLOBAL",
            AssignRefGlobal { .. } => "ASSIGN_REF_GLOBAL",
            Constant(_) => "CONSTANT",
            ClassConstant { .. } => "CLASS_CONSTANT",
            Arith { op, .. } => match op {
                ArithOp::Add => "ADD",
                ArithOp::Sub => "SUB",
                ArithOp::Mul => "MUL",
                ArithOp::Div => "DIV",
                ArithOp::Mod => "MOD",
                ArithOp::Pow => "POW",
                ArithOp::BitAnd => "BW_AND",
                ArithOp::BitOr => "BW_OR",
                ArithOp::BitXor => "BW_XOR",
                ArithOp::Shl => "SL",
                ArithOp::Shr => "SR",
                ArithOp::Concat => "CONCAT",
            },
            Compare(op) => match op {
                CompareOp::Lt => "IS_SMALLER",
                CompareOp::Le => "IS_SMALLER_OR_EQUAL",
                CompareOp::Gt => "IS_GREATER",
                CompareOp::Ge => "IS_GREATER_OR_EQUAL",
                CompareOp::Eq => "IS_EQUAL",
                CompareOp::Ne => "IS_NOT_EQUAL",
                CompareOp::Identical => "IS_IDENTICAL",
                CompareOp::NotIdentical => "IS_NOT_IDENTICAL",
            },
            Logical(op) => match op {
                LogicalOp::And => "BOOL_AND",
                LogicalOp::Or => "BOOL_OR",
                LogicalOp::Xor => "BOOL_XOR",
            },
            Not => "BOOL_NOT",
            Neg => "NEG",
            Plus => "PLUS",
            BitNot => "BW_NOT",
            Cast(_) => "CAST",
            IncDec { op, .. } => match op {
                IncDecOp::PreInc => "PRE_INC",
                IncDecOp::PreDec => "PRE_DEC",
                IncDecOp::PostInc => "POST_INC",
                IncDecOp::PostDec => "POST_DEC",
            },
            MultiConcat(_) => "MULTI_CONCAT",
            Branch(_) => "BRANCH",
            BrTrue(_) => "BRTRUE",
            BrFalse(_) => "BRFALSE",
            Break { .. } => "BREAK",
            Return(_) => "RETURN",
            TryEnter(_) => "TRY_ENTER",
            TryExit => "TRY_EXIT",
            CatchEnter { .. } => "CATCH_ENTER",
            Throw => "THROW",
            Exit(_) => "EXIT",
            Echo => "ECHO",
            Error { .. } => "ERROR",
            Silence(_) => "SILENCE",
            Ticks(_) => "TICKS",
            ReturnByRefCheck => "RETURN_BY_REF_CHECK",
            FindFunction(_) => "FIND_FUNCTION",
            FindMethod(_) => "FIND_METHOD",
            FindStaticMethod { .. } => "FIND_STATIC_METHOD",
            PrepareArg(_) => "PREPARE_ARG",
            ArgContext { .. } => "ARG_CONTEXT",
            Invoke { .. } => "INVOKE",
            ClassNew { .. } => "CLASS_NEW",
            ObjectInitCheck => "OBJECT_INIT_CHECK",
            Clone => "CLONE",
            InstanceOf(_) => "INSTANCEOF",
            Property { .. } => "PROPERTY",
            AssignProperty { .. } => "ASSIGN_VAL_PROPERTY",
            AssignRefProperty { .. } => "ASSIGN_REF_PROPERTY",
            IssetProperty { .. } => "ISSET_PROPERTY",
            UnsetProperty(_) => "UNSET_PROPERTY",
            StaticProperty { .. } => "STATIC_PROPERTY",
            AssignStaticProperty { .. } => "ASSIGN_VAL_STATIC_PROPERTY",
            AssignRefStaticProperty { .. } => "ASSIGN_REF_STATIC_PROPERTY",
            IssetStaticProperty { .. } => "ISSET_STATIC_PROPERTY",
            UnsetStaticProperty { .. } => "UNSET_STATIC_PROPERTY",
            NewArray => "NEWARRAY",
            ArrayInitCheck => "ARRAY_INIT_CHECK",
            ArrayAppend { .. } => "ARRAY_APPEND",
            ArrayInsert { .. } => "ARRAY_INSERT",
            Index { .. } => "INDEX",
            IndexAppend => "INDEX_APPEND",
            AssignIndex { .. } => "ASSIGN_VAL_INDEX",
            AssignRefIndex { .. } => "ASSIGN_REF_INDEX",
            AssignAppend { .. } => "ASSIGN_VAL_ARRAY",
            AssignRefAppend { .. } => "ASSIGN_REF_ARRAY",
            IssetIndex { .. } => "ISSET_INDEX",
            UnsetIndex(_) => "UNSET_INDEX",
            FeInit { .. } => "FE_INIT",
            FeNext(_) => "FE_NEXT",
            FeFree => "FE_FREE",
            ListInit { .. } => "LIST_INIT",
            ListNext { .. } => "LIST_NEXT",
            ListFree { .. } => "LIST_FREE",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn opt<T: fmt::Display>(v: &Option<T>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "<stack>".to_string(),
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use OpCode::*;
        let m = self.mnemonic();
        match self {
            Push(lit) => write!(f, "{} {}", m, lit),
            Reverse(n) => write!(f, "{} {}", m, n),
            Local { name, intent } | Global { name, intent } => write!(f, "{}_{} {}", m, intent, name),
            Indirect { intent } => write!(f, "{}_{}", m, intent),
            IssetLocal { name, empty } => write!(f, "{} {}{}", m, opt(name), if *empty { " (empty)" } else { "" }),
            IssetGlobal { name, empty } => write!(f, "{} {}{}", m, name, if *empty { " (empty)" } else { "" }),
            UnsetLocal(name) | MakeGlobal(name) | FindFunction(name) | FindMethod(name)
            | InstanceOf(name) | UnsetProperty(name) => write!(f, "{} {}", m, opt(name)),
            AssignLocal { name, keep } | AssignRefLocal { name, keep }
            | AssignProperty { name, keep } | AssignRefProperty { name, keep } => {
                write!(f, "{} {}{}", m, opt(name), if *keep { " (keep)" } else { "" })
            }
            AssignGlobal { name, keep } | AssignRefGlobal { name, keep } => {
                write!(f, "{} {}{}", m, name, if *keep { " (keep)" } else { "" })
            }
            LoadStatic { name, init } => write!(f, "{} {} = {}", m, name, init),
            UnsetGlobal(name) | Constant(name) => write!(f, "{} {}", m, name),
            ClassConstant { class, name } => write!(f, "{} {}::{}", m, class, name),
            Arith { in_place: true, .. } => write!(f, "{} (in place)", m),
            Cast(kind) => write!(f, "{} {:?}", m, kind),
            IncDec { keep, .. } => write!(f, "{}{}", m, if *keep { "" } else { " (discard)" }),
            MultiConcat(n) => write!(f, "{} {}", m, n),
            Branch(d) | BrTrue(d) | BrFalse(d) | TryEnter(d) | FeNext(d) => write!(f, "{} {:+}", m, d),
            Break { loops } => write!(f, "{} (nest {})", m, loops),
            Return(v) => write!(f, "{}{}", m, if *v { " (value)" } else { "" }),
            CatchEnter { class, skip } => write!(f, "{} {} {:+}", m, class, skip),
            Exit(v) => write!(f, "{}{}", m, if *v { " (status)" } else { "" }),
            Error { level, message } => write!(f, "{} {:?} {:?}", m, level, message),
            Silence(begin) => write!(f, "{} {}", m, if *begin { "begin" } else { "end" }),
            Ticks(n) => write!(f, "{} {}", m, opt(n)),
            FindStaticMethod { class, method } => write!(f, "{} {}::{}", m, class, opt(method)),
            PrepareArg(mode) => write!(f, "{} {:?}", m, mode),
            ArgContext { index, by_value, by_ref } => {
                write!(f, "{} #{} [{:+}, {:+}]", m, index, by_value, by_ref)
            }
            Invoke { argc, discard } => write!(f, "{} {}{}", m, argc, if *discard { " (discard)" } else { "" }),
            ClassNew { class, no_ctor } => write!(f, "{} {} {:+}", m, opt(class), no_ctor),
            Property { name, intent } => write!(f, "{}_{} {}", m, intent, opt(name)),
            IssetProperty { name, empty } => write!(f, "{} {}{}", m, opt(name), if *empty { " (empty)" } else { "" }),
            StaticProperty { class, name } | UnsetStaticProperty { class, name } => {
                write!(f, "{} {}::{}", m, class, opt(name))
            }
            AssignStaticProperty { class, name, keep } | AssignRefStaticProperty { class, name, keep } => {
                write!(f, "{} {}::{}{}", m, class, opt(name), if *keep { " (keep)" } else { "" })
            }
            IssetStaticProperty { class, name, empty } => {
                write!(f, "{} {}::{}{}", m, class, opt(name), if *empty { " (empty)" } else { "" })
            }
            ArrayAppend { by_ref } | ArrayInsert { by_ref } => write!(f, "{}{}", m, if *by_ref { " (ref)" } else { "" }),
            Index { key, intent } => write!(f, "{}_{} {}", m, intent, opt(key)),
            AssignIndex { key, keep } | AssignRefIndex { key, keep } => {
                write!(f, "{} {}{}", m, opt(key), if *keep { " (keep)" } else { "" })
            }
            AssignAppend { keep } | AssignRefAppend { keep } => write!(f, "{}{}", m, if *keep { " (keep)" } else { "" }),
            IssetIndex { key, empty } => write!(f, "{} {}{}", m, opt(key), if *empty { " (empty)" } else { "" }),
            UnsetIndex(key) => write!(f, "{} {}", m, opt(key)),
            FeInit { arrow, by_ref, empty } => write!(
                f,
                "{}{}{} {:+}",
                m,
                if *arrow { " (arrow)" } else { "" },
                if *by_ref { " (ref)" } else { "" },
                empty
            ),
            ListInit { count, silent } => write!(f, "{} {}{}", m, count, if *silent { " (silent)" } else { "" }),
            ListNext { silent } => write!(f, "{}{}", m, if *silent { " (silent)" } else { "" }),
            ListFree { keep } => write!(f, "{}{}", m, if *keep { " (keep)" } else { "" }),
            _ => f.write_str(m),
        }
    }
}

/// One instruction of a code block: an operation plus its source position.
///
/// Only the branch displacement (before first execution) and the tick flag
/// may change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: OpCode,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub file: Option<Arc<str>>,
    #[serde(default)]
    pub tick: bool,
}

impl Instruction {
    pub fn new(op: OpCode) -> Self {
        Self {
            op,
            line: 0,
            file: None,
            tick: false,
        }
    }

    pub fn at(op: OpCode, line: u32) -> Self {
        Self {
            op,
            line,
            file: None,
            tick: false,
        }
    }

    pub fn push_count(&self) -> i32 {
        self.op.push_count()
    }
}

impl From<OpCode> for Instruction {
    fn from(op: OpCode) -> Self {
        Instruction::new(op)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if self.tick {
            f.write_str(" [tick]")?;
        }
        Ok(())
    }
}
