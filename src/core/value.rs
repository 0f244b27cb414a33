use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Ordered PHP array storage
/// Reference: $PHP_SRC_PATH/Zend/zend_hash.h - HashTable::nNextFreeElement
#[derive(Debug, Clone, Default)]
pub struct ArrayData {
    pub map: IndexMap<ArrayKey, Handle>,
    pub next_free: i64,
    /// Internal pointer: position of the element `current()` reports; at or
    /// past the end when the pointer is invalid
    pub cursor: usize,
}

impl ArrayData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: IndexMap::with_capacity(capacity),
            next_free: 0,
            cursor: 0,
        }
    }

    /// Insert a key-value pair and bump `next_free` past integer keys
    pub fn insert(&mut self, key: ArrayKey, value: Handle) -> Option<Handle> {
        if let ArrayKey::Int(i) = &key {
            if *i >= self.next_free {
                self.next_free = i.saturating_add(1);
            }
        }
        self.map.insert(key, value)
    }

    pub fn next_index(&self) -> i64 {
        self.next_free
    }

    /// Append with an auto-incremented key, returning the key used
    pub fn push(&mut self, value: Handle) -> ArrayKey {
        let key = ArrayKey::Int(self.next_free);
        self.next_free = self.next_free.saturating_add(1);
        self.map.insert(key.clone(), value);
        key
    }

    /// Order-preserving removal; the internal pointer keeps its element
    pub fn remove(&mut self, key: &ArrayKey) -> Option<Handle> {
        let (index, _, value) = self.map.shift_remove_full(key)?;
        if index < self.cursor {
            self.cursor -= 1;
        }
        Some(value)
    }

    pub fn get(&self, key: &ArrayKey) -> Option<Handle> {
        self.map.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Element under the internal pointer
    pub fn current(&self) -> Option<(&ArrayKey, Handle)> {
        self.map.get_index(self.cursor).map(|(k, &h)| (k, h))
    }

    /// Move the internal pointer one element forward
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1).min(self.map.len());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        })
    }
}

/// Symbolic name carried by instructions and runtime tables.
///
/// Variables and properties compare case-sensitively; functions, classes and
/// methods go through [`Name::lower`] or [`Name::eq_ignore_case`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(s: &str) -> Self {
        Name(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn lower(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Name::new(&String::from_utf8_lossy(bytes))
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Constant operand embedded in an instruction.
///
/// Unlike [`Val`] this is `Send + Sync`, so a built code block can be shared
/// between hosts. Each execution materialises a fresh `Val` from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Literal {
    pub fn to_val(&self) -> Val {
        match self {
            Literal::Null => Val::Null,
            Literal::Bool(b) => Val::Bool(*b),
            Literal::Int(i) => Val::Int(*i),
            Literal::Float(f) => Val::Float(*f),
            Literal::String(s) => Val::String(Rc::new(s.as_bytes().to_vec())),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::String(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<Vec<u8>>),  // PHP strings are byte arrays (COW)
    Array(Rc<ArrayData>), // COW; split with `Arena::separate`
    Object(Handle),       // Points at the ObjPayload slot; identity = handle
    ObjPayload(ObjectData),
}

impl PartialEq for Val {
    /// Structural identity used by tests and `===` on scalars
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::String(a), Val::String(b)) => a == b,
            (Val::Array(a), Val::Array(b)) => Rc::ptr_eq(a, b) || a.map == b.map,
            (Val::Object(a), Val::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Val {
    pub fn string(bytes: &[u8]) -> Val {
        Val::String(Rc::new(bytes.to_vec()))
    }

    pub fn empty_array() -> Val {
        Val::Array(Rc::new(ArrayData::new()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "boolean",
            Val::Int(_) => "integer",
            Val::Float(_) => "double",
            Val::String(_) => "string",
            Val::Array(_) => "array",
            Val::Object(_) | Val::ObjPayload(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Val::Null)
    }

    /// `null`, `false` and `""`: the values PHP silently promotes to an
    /// array or a `stdClass` on write
    pub fn is_empty_for_autovivify(&self) -> bool {
        match self {
            Val::Null => true,
            Val::Bool(b) => !b,
            Val::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_make_printable_zval
    pub fn to_php_string_bytes(&self) -> Vec<u8> {
        match self {
            Val::Null | Val::Bool(false) => Vec::new(),
            Val::Bool(true) => b"1".to_vec(),
            Val::Int(i) => i.to_string().into_bytes(),
            Val::Float(f) => format_float(*f).into_bytes(),
            Val::String(s) => s.to_vec(),
            Val::Array(_) => b"Array".to_vec(),
            Val::Object(_) | Val::ObjPayload(_) => b"Object".to_vec(),
        }
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_is_true
    pub fn to_bool(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0,
            Val::String(s) => !(s.is_empty() || s.as_slice() == b"0"),
            Val::Array(arr) => !arr.is_empty(),
            Val::Object(_) | Val::ObjPayload(_) => true,
        }
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - convert_to_long
    pub fn to_int(&self) -> i64 {
        match self {
            Val::Null => 0,
            Val::Bool(b) => *b as i64,
            Val::Int(i) => *i,
            Val::Float(f) => {
                if f.is_finite() {
                    *f as i64
                } else {
                    0
                }
            }
            Val::String(s) => match parse_numeric_prefix(s) {
                Some(Numeric::Int(i)) => i,
                Some(Numeric::Float(f)) => f as i64,
                None => 0,
            },
            Val::Array(arr) => !arr.is_empty() as i64,
            Val::Object(_) | Val::ObjPayload(_) => 1,
        }
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - convert_to_double
    pub fn to_float(&self) -> f64 {
        match self {
            Val::Float(f) => *f,
            Val::String(s) => match parse_numeric_prefix(s) {
                Some(Numeric::Int(i)) => i as f64,
                Some(Numeric::Float(f)) => f,
                None => 0.0,
            },
            other => other.to_int() as f64,
        }
    }

    /// Numeric view used by arithmetic: ints stay ints, everything else
    /// follows the numeric-string rules
    pub fn to_number(&self) -> Numeric {
        match self {
            Val::Int(i) => Numeric::Int(*i),
            Val::Float(f) => Numeric::Float(*f),
            Val::String(s) => parse_numeric_prefix(s).unwrap_or(Numeric::Int(0)),
            other => Numeric::Int(other.to_int()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn to_val(self) -> Val {
        match self {
            Numeric::Int(i) => Val::Int(i),
            Numeric::Float(f) => Val::Float(f),
        }
    }

    pub fn as_float(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }
}

/// Leading-numeric parse: `"12abc"` is 12, `" 1.5"` is 1.5, `"abc"` is None.
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - is_numeric_string_ex
pub fn parse_numeric_prefix(s: &[u8]) -> Option<Numeric> {
    scan_numeric(s).map(|(n, _)| n)
}

/// Whole-string numeric parse (leading whitespace allowed): `"12"` and
/// `" 1e3"` are numeric, `"12abc"` is not.
pub fn parse_numeric(s: &[u8]) -> Option<Numeric> {
    match scan_numeric(s) {
        Some((n, end)) if end == s.len() => Some(n),
        _ => None,
    }
}

/// Numeric prefix and the index just past it
fn scan_numeric(s: &[u8]) -> Option<(Numeric, usize)> {
    let start = s
        .iter()
        .position(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c'))?;
    let rest = &s[start..];
    let mut end = 0;
    if matches!(rest.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < rest.len() && rest[end].is_ascii_digit() {
        end += 1;
    }
    let int_end = end;
    let mut is_float = false;
    if end < rest.len() && rest[end] == b'.' {
        let mut frac = end + 1;
        while frac < rest.len() && rest[frac].is_ascii_digit() {
            frac += 1;
        }
        if frac > end + 1 || int_end > digits_start {
            is_float = frac > end + 1;
            end = if is_float { frac } else { end };
        }
    }
    if end == digits_start {
        return None;
    }
    if end < rest.len() && matches!(rest[end], b'e' | b'E') {
        let mut exp = end + 1;
        if matches!(rest.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        let exp_digits = exp;
        while exp < rest.len() && rest[exp].is_ascii_digit() {
            exp += 1;
        }
        if exp > exp_digits {
            end = exp;
            is_float = true;
        }
    }
    let text = std::str::from_utf8(&rest[..end]).ok()?;
    if !is_float {
        if let Ok(i) = text.parse::<i64>() {
            return Some((Numeric::Int(i), start + end));
        }
    }
    text.parse::<f64>().ok().map(|f| (Numeric::Float(f), start + end))
}

/// Float formatting close to PHP's `precision=14` echo output
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NAN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF".into() } else { "-INF".into() };
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        return format!("{:.0}", f);
    }
    let formatted = format!("{:.14}", f);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[derive(Debug, Clone)]
pub struct ObjectData {
    pub class: Name,
    pub properties: IndexMap<Name, Handle>,
}

impl PartialEq for ObjectData {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.properties == other.properties
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum ArrayKey {
    Int(i64),
    Str(Rc<Vec<u8>>),
}

impl ArrayKey {
    /// Canonical decimal integer strings become integer keys
    /// Reference: $PHP_SRC_PATH/Zend/zend_hash.c - _zend_handle_numeric_str_ex
    pub fn from_bytes(bytes: &[u8]) -> ArrayKey {
        match canonical_int(bytes) {
            Some(i) => ArrayKey::Int(i),
            None => ArrayKey::Str(Rc::new(bytes.to_vec())),
        }
    }

    /// Array/object offsets are illegal and yield `None`
    pub fn from_val(val: &Val) -> Option<ArrayKey> {
        match val {
            Val::Null => Some(ArrayKey::Str(Rc::new(Vec::new()))),
            Val::Bool(b) => Some(ArrayKey::Int(*b as i64)),
            Val::Int(i) => Some(ArrayKey::Int(*i)),
            Val::Float(f) => Some(ArrayKey::Int(*f as i64)),
            Val::String(s) => Some(ArrayKey::from_bytes(s)),
            Val::Array(_) | Val::Object(_) | Val::ObjPayload(_) => None,
        }
    }

    pub fn to_val(&self) -> Val {
        match self {
            ArrayKey::Int(i) => Val::Int(*i),
            ArrayKey::Str(s) => Val::String(s.clone()),
        }
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{}", i),
            ArrayKey::Str(s) => f.write_str(&String::from_utf8_lossy(s)),
        }
    }
}

fn canonical_int(bytes: &[u8]) -> Option<i64> {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if digits.len() > 1 && digits[0] == b'0' {
        return None;
    }
    if bytes == b"-0" {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// The Container (Zval equivalent)
#[derive(Debug, Clone)]
pub struct Zval {
    pub value: Val,
    /// Explicit reference flag (&$a)
    pub is_ref: bool,
    /// Number of variable/element/property slots bound to this container
    pub refcount: u32,
}
