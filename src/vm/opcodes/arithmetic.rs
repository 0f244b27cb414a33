//! Arithmetic, bitwise, string and logical operators
//!
//! Implements PHP operators following Zend engine semantics.
//!
//! ## PHP Semantics
//!
//! - Numeric strings are converted to integers/floats
//! - Booleans: true=1, false=0; null converts to 0
//! - Integer overflow promotes to float
//! - Division or modulo by zero warns and yields `false`
//! - Shift counts wrap modulo 64, so `1 << 65 == 2` and `1 << -1` is the
//!   sign bit
//! - `array + array` is a key union; any other array operand is fatal
//!
//! In-place forms (`$a += 1`) take the target slot below the right operand,
//! write the result into it and push the result as a fresh temporary.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - arithmetic functions

use crate::core::value::{Handle, Numeric, Val, parse_numeric};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::{ArithOp, IncDecOp, LogicalOp, OpCode};
use std::rc::Rc;

fn int_or_float(int: Option<i64>, float: impl FnOnce() -> f64) -> Val {
    match int {
        Some(i) => Val::Int(i),
        None => Val::Float(float()),
    }
}

/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - pow_function_base
fn pow(base: Numeric, exp: Numeric) -> Val {
    if let (Numeric::Int(b), Numeric::Int(e)) = (base, exp) {
        if e >= 0 {
            let checked = u32::try_from(e).ok().and_then(|e| b.checked_pow(e));
            if let Some(i) = checked {
                return Val::Int(i);
            }
        }
    }
    Val::Float(base.as_float().powf(exp.as_float()))
}

fn bytewise(a: &[u8], b: &[u8], op: ArithOp) -> Vec<u8> {
    match op {
        // `|` keeps the longer operand's tail; `&` and `^` truncate
        ArithOp::BitOr => {
            let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
            let mut out = long.to_vec();
            for (o, s) in out.iter_mut().zip(short) {
                *o |= s;
            }
            out
        }
        ArithOp::BitAnd => a.iter().zip(b).map(|(x, y)| x & y).collect(),
        _ => a.iter().zip(b).map(|(x, y)| x ^ y).collect(),
    }
}

/// Perl-style string increment: `"a"` → `"b"`, `"Az"` → `"Ba"`, `"zz"` → `"aaa"`
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - increment_string
pub(crate) fn increment_string(s: &[u8]) -> Vec<u8> {
    let mut out = s.to_vec();
    let mut carry_prefix = None;
    for i in (0..out.len()).rev() {
        match out[i] {
            b'z' => {
                out[i] = b'a';
                carry_prefix = Some(b'a');
            }
            b'Z' => {
                out[i] = b'A';
                carry_prefix = Some(b'A');
            }
            b'9' => {
                out[i] = b'0';
                carry_prefix = Some(b'1');
            }
            c if c.is_ascii_alphanumeric() => {
                out[i] = c + 1;
                return out;
            }
            _ => return out,
        }
    }
    if let Some(prefix) = carry_prefix {
        out.insert(0, prefix);
    }
    out
}

impl VM {
    pub(crate) fn exec_arith(&mut self, op: ArithOp, in_place: bool) -> Result<(), VmError> {
        let right = self.pop_operand_required()?;
        let left = self.pop_operand_required()?;
        let result = self.arith_values(op, left, right)?;
        if in_place {
            self.arena.set_value(left, result.clone());
        }
        self.push_value(result);
        Ok(())
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - add_function etc.
    pub(crate) fn arith_values(&mut self, op: ArithOp, left: Handle, right: Handle) -> Result<Val, VmError> {
        if op == ArithOp::Concat {
            let mut bytes = self.value_to_string_bytes(left)?;
            bytes.extend(self.value_to_string_bytes(right)?);
            return Ok(Val::String(Rc::new(bytes)));
        }

        let a = self.arena.value(left).clone();
        let b = self.arena.value(right).clone();

        match (&a, &b) {
            (Val::Array(x), Val::Array(y)) if op == ArithOp::Add => {
                let mut union = self.arena.duplicate_array(x);
                for (key, &elem) in y.map.iter() {
                    if !union.map.contains_key(key) {
                        let copy = self.arena.copy_of(elem);
                        self.arena.bind(copy);
                        union.insert(key.clone(), copy);
                    }
                }
                return Ok(Val::Array(Rc::new(union)));
            }
            (Val::Array(_), _) | (_, Val::Array(_)) => {
                return Err(VmError::Fatal("Unsupported operand types".into()));
            }
            _ => {}
        }

        let result = match op {
            ArithOp::Add | ArithOp::Sub | ArithOp::Mul => {
                let (x, y) = (a.to_number(), b.to_number());
                match (x, y) {
                    (Numeric::Int(i), Numeric::Int(j)) => {
                        let checked = match op {
                            ArithOp::Add => i.checked_add(j),
                            ArithOp::Sub => i.checked_sub(j),
                            _ => i.checked_mul(j),
                        };
                        int_or_float(checked, || match op {
                            ArithOp::Add => i as f64 + j as f64,
                            ArithOp::Sub => i as f64 - j as f64,
                            _ => i as f64 * j as f64,
                        })
                    }
                    _ => {
                        let (f, g) = (x.as_float(), y.as_float());
                        Val::Float(match op {
                            ArithOp::Add => f + g,
                            ArithOp::Sub => f - g,
                            _ => f * g,
                        })
                    }
                }
            }
            ArithOp::Div => {
                let (x, y) = (a.to_number(), b.to_number());
                if y.as_float() == 0.0 {
                    self.warning("Division by zero");
                    return Ok(Val::Bool(false));
                }
                match (x, y) {
                    (Numeric::Int(i), Numeric::Int(j)) if i.checked_rem(j) == Some(0) => {
                        int_or_float(i.checked_div(j), || i as f64 / j as f64)
                    }
                    _ => Val::Float(x.as_float() / y.as_float()),
                }
            }
            ArithOp::Mod => {
                let (i, j) = (a.to_int(), b.to_int());
                if j == 0 {
                    self.warning("Division by zero");
                    return Ok(Val::Bool(false));
                }
                Val::Int(i.wrapping_rem(j))
            }
            ArithOp::Pow => pow(a.to_number(), b.to_number()),
            ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor => match (&a, &b) {
                (Val::String(x), Val::String(y)) => Val::String(Rc::new(bytewise(x, y, op))),
                _ => {
                    let (i, j) = (a.to_int(), b.to_int());
                    Val::Int(match op {
                        ArithOp::BitAnd => i & j,
                        ArithOp::BitOr => i | j,
                        _ => i ^ j,
                    })
                }
            },
            ArithOp::Shl | ArithOp::Shr => {
                // The count is taken modulo the integer width, negative ones included
                let (i, shift) = (a.to_int(), (b.to_int() & 63) as u32);
                Val::Int(match op {
                    ArithOp::Shl => i.wrapping_shl(shift),
                    _ => i.wrapping_shr(shift),
                })
            }
            ArithOp::Concat => unreachable!("handled above"),
        };
        Ok(result)
    }

    pub(crate) fn exec_unary(&mut self, op: &OpCode) -> Result<(), VmError> {
        let h = self.pop_operand_required()?;
        let val = self.arena.value(h).clone();
        let result = match op {
            OpCode::Not => Val::Bool(!val.to_bool()),
            OpCode::Plus => {
                if matches!(val, Val::Array(_)) {
                    return Err(VmError::Fatal("Unsupported operand types".into()));
                }
                val.to_number().to_val()
            }
            OpCode::Neg => match val {
                Val::Array(_) => return Err(VmError::Fatal("Unsupported operand types".into())),
                other => match other.to_number() {
                    Numeric::Int(i) => int_or_float(i.checked_neg(), || -(i as f64)),
                    Numeric::Float(f) => Val::Float(-f),
                },
            },
            OpCode::BitNot => match val {
                Val::Int(i) => Val::Int(!i),
                Val::Float(f) => Val::Int(!(f as i64)),
                Val::String(s) => Val::String(Rc::new(s.iter().map(|b| !b).collect())),
                _ => return Err(VmError::Fatal("Unsupported operand types".into())),
            },
            _ => unreachable!("Not a unary op"),
        };
        self.push_value(result);
        Ok(())
    }

    pub(crate) fn exec_logical(&mut self, op: LogicalOp) -> Result<(), VmError> {
        let (left, right) = self.pop_binary_operands()?;
        let (a, b) = (self.value_to_bool(left), self.value_to_bool(right));
        self.push_value(Val::Bool(match op {
            LogicalOp::And => a && b,
            LogicalOp::Or => a || b,
            LogicalOp::Xor => a ^ b,
        }));
        Ok(())
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - increment_function
    pub(crate) fn exec_inc_dec(&mut self, op: IncDecOp, keep: bool) -> Result<(), VmError> {
        let slot = self.pop_operand_required()?;
        let old = self.arena.value(slot).clone();
        let increment = matches!(op, IncDecOp::PreInc | IncDecOp::PostInc);

        let new = match &old {
            Val::Null if increment => Val::Int(1),
            Val::Int(i) if increment => int_or_float(i.checked_add(1), || *i as f64 + 1.0),
            Val::Int(i) => int_or_float(i.checked_sub(1), || *i as f64 - 1.0),
            Val::Float(f) => Val::Float(if increment { f + 1.0 } else { f - 1.0 }),
            Val::String(s) if s.is_empty() => {
                if increment {
                    Val::string(b"1")
                } else {
                    Val::Int(-1)
                }
            }
            Val::String(s) => match parse_numeric(s) {
                Some(Numeric::Int(i)) if increment => int_or_float(i.checked_add(1), || i as f64 + 1.0),
                Some(Numeric::Int(i)) => int_or_float(i.checked_sub(1), || i as f64 - 1.0),
                Some(Numeric::Float(f)) => Val::Float(if increment { f + 1.0 } else { f - 1.0 }),
                None if increment => Val::String(Rc::new(increment_string(s))),
                None => old.clone(),
            },
            // null--, booleans, arrays and objects are left alone
            other => other.clone(),
        };

        self.arena.set_value(slot, new.clone());
        if keep {
            let pushed = match op {
                IncDecOp::PreInc | IncDecOp::PreDec => new,
                IncDecOp::PostInc | IncDecOp::PostDec => old,
            };
            self.push_value(pushed);
        }
        Ok(())
    }

    pub(crate) fn exec_multi_concat(&mut self, count: u32) -> Result<(), VmError> {
        let parts = self.pop_n_operands(count as usize)?;
        let mut bytes = Vec::new();
        for h in parts {
            bytes.extend(self.value_to_string_bytes(h)?);
        }
        let h = self.new_string_handle(bytes);
        self.operand_stack.push(h);
        Ok(())
    }
}
