//! Comparison operations
//!
//! Loose comparison follows the PHP 5 rules: numeric strings compare as
//! numbers, non-numeric strings against numbers are converted to numbers,
//! `null`/`bool` against anything compare as booleans (except `null` against
//! a string, which compares with `""`), arrays compare by size and then
//! element-wise, and arrays/objects sort above scalars.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - compare_function, is_identical_function

use crate::core::value::{ArrayData, Numeric, Val, parse_numeric};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::CompareOp;
use std::cmp::Ordering;

fn compare_numbers(a: Numeric, b: Numeric) -> Option<Ordering> {
    match (a, b) {
        (Numeric::Int(x), Numeric::Int(y)) => Some(x.cmp(&y)),
        _ => a.as_float().partial_cmp(&b.as_float()),
    }
}

impl VM {
    pub(crate) fn exec_compare(&mut self, op: CompareOp) -> Result<(), VmError> {
        let (left, right) = self.pop_binary_operands()?;
        let a = self.arena.value(left).clone();
        let b = self.arena.value(right).clone();
        let result = match op {
            CompareOp::Identical => self.is_identical(&a, &b),
            CompareOp::NotIdentical => !self.is_identical(&a, &b),
            CompareOp::Eq => self.loose_compare(&a, &b) == Some(Ordering::Equal),
            CompareOp::Ne => self.loose_compare(&a, &b) != Some(Ordering::Equal),
            CompareOp::Lt => self.loose_compare(&a, &b) == Some(Ordering::Less),
            CompareOp::Le => matches!(self.loose_compare(&a, &b), Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => self.loose_compare(&a, &b) == Some(Ordering::Greater),
            CompareOp::Ge => matches!(
                self.loose_compare(&a, &b),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        };
        self.push_value(Val::Bool(result));
        Ok(())
    }

    /// `None` when the operands are uncomparable (e.g. objects of different
    /// classes)
    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - compare_function
    pub(crate) fn loose_compare(&self, a: &Val, b: &Val) -> Option<Ordering> {
        match (a, b) {
            (Val::Null, Val::String(s)) => Some(b"".as_slice().cmp(s.as_slice())),
            (Val::String(s), Val::Null) => Some(s.as_slice().cmp(b"".as_slice())),
            (Val::Null | Val::Bool(_), _) | (_, Val::Null | Val::Bool(_)) => {
                Some(a.to_bool().cmp(&b.to_bool()))
            }
            (Val::String(x), Val::String(y)) => match (parse_numeric(x), parse_numeric(y)) {
                (Some(m), Some(n)) => compare_numbers(m, n),
                _ => Some(x.as_slice().cmp(y.as_slice())),
            },
            (Val::Int(_) | Val::Float(_) | Val::String(_), Val::Int(_) | Val::Float(_) | Val::String(_)) => {
                compare_numbers(a.to_number(), b.to_number())
            }
            (Val::Array(x), Val::Array(y)) => self.compare_arrays(x, y),
            (Val::Array(_), _) => Some(Ordering::Greater),
            (_, Val::Array(_)) => Some(Ordering::Less),
            (Val::Object(p), Val::Object(q)) => {
                if p == q {
                    return Some(Ordering::Equal);
                }
                let (Some(x), Some(y)) = (self.arena.payload(*p), self.arena.payload(*q)) else {
                    return None;
                };
                if !x.class.eq_ignore_case(y.class.as_str()) {
                    return None;
                }
                match x.properties.len().cmp(&y.properties.len()) {
                    Ordering::Equal => {}
                    other => return Some(other),
                }
                for (name, &slot) in &x.properties {
                    let other = y.properties.get(name)?;
                    match self.loose_compare(self.arena.value(slot), self.arena.value(*other)) {
                        Some(Ordering::Equal) => {}
                        other => return other,
                    }
                }
                Some(Ordering::Equal)
            }
            (Val::Object(_), _) => Some(Ordering::Greater),
            (_, Val::Object(_)) => Some(Ordering::Less),
            _ => None,
        }
    }

    fn compare_arrays(&self, x: &ArrayData, y: &ArrayData) -> Option<Ordering> {
        match x.len().cmp(&y.len()) {
            Ordering::Equal => {}
            other => return Some(other),
        }
        for (key, &elem) in x.map.iter() {
            let other = y.get(key)?;
            match self.loose_compare(self.arena.value(elem), self.arena.value(other)) {
                Some(Ordering::Equal) => {}
                other => return other,
            }
        }
        Some(Ordering::Equal)
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - is_identical_function
    pub(crate) fn is_identical(&self, a: &Val, b: &Val) -> bool {
        match (a, b) {
            (Val::Array(x), Val::Array(y)) => {
                x.len() == y.len()
                    && x.map.iter().zip(y.map.iter()).all(|((k1, v1), (k2, v2))| {
                        k1 == k2 && self.is_identical(self.arena.value(*v1), self.arena.value(*v2))
                    })
            }
            _ => a == b,
        }
    }
}
