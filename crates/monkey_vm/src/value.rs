use std::fmt;
use std::rc::Rc;

// ── Compiled functions & closures ───────────────────────────────────────────

/// The result of compiling a function literal's body: raw bytecode plus the
/// frame-sizing metadata the VM needs to reserve a locals window.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A CompiledFunction plus the free variables captured from its defining
/// scope. `OpClosure` builds one of these each time the function literal's
/// enclosing scope runs; `OpGetFree` reads out of `free` at call time.
#[derive(Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure(params={}, free={})", self.func.num_parameters, self.free.len())
    }
}

impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func) && self.free == other.free
    }
}

/// Signature shared by all built-in functions. Builtins never propagate a
/// Rust error: a bad call simply produces a `Value::Error`, same as any
/// other Monkey runtime error.
pub type BuiltinFn = fn(&[Value]) -> Value;

// ── Hashing ──────────────────────────────────────────────────────────────

/// FNV-1a, used to place Integer/Boolean/String keys into `MonkeyHash`
/// buckets. Only these three variants are hashable, matching the reference
/// implementation's `getHashKey`.
fn hash_value(value: &Value) -> Option<u64> {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    fn fnv1a(bytes: &[u8]) -> u64 {
        let mut hash = FNV_OFFSET;
        for b in bytes {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
    match value {
        Value::Integer(n) => Some(fnv1a(&n.to_be_bytes())),
        Value::Boolean(b) => Some(if *b { 1 } else { 0 }),
        Value::String(s) => Some(fnv1a(s.as_bytes())),
        _ => None,
    }
}

const INITIAL_BUCKETS: usize = 16;
const MAX_LOAD_FACTOR: f64 = 0.75;

/// A bucketed hash map keyed by Monkey values (Integer, Boolean, or String).
/// Grows by doubling once the load factor is exceeded, same strategy as a
/// typical open-chaining hash table.
#[derive(Debug, Clone)]
pub struct MonkeyHash {
    buckets: Vec<Vec<(Value, Value)>>,
    len: usize,
}

impl MonkeyHash {
    pub fn new() -> Self {
        MonkeyHash { buckets: vec![Vec::new(); INITIAL_BUCKETS], len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `key => value`. Fails if `key` is not a hashable Monkey type.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), String> {
        let hash = hash_value(&key).ok_or_else(|| format!("unusable as hash key: {}", key.type_name()))?;
        if (self.len + 1) as f64 > self.buckets.len() as f64 * MAX_LOAD_FACTOR {
            self.grow();
        }
        let idx = (hash as usize) % self.buckets.len();
        let bucket = &mut self.buckets[idx];
        if let Some(slot) = bucket.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            bucket.push((key, value));
            self.len += 1;
        }
        Ok(())
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hash = hash_value(key)?;
        let idx = (hash as usize) % self.buckets.len();
        self.buckets[idx].iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.buckets.iter().flat_map(|bucket| bucket.iter())
    }

    fn grow(&mut self) {
        let new_cap = self.buckets.len() * 2;
        let old = std::mem::replace(&mut self.buckets, vec![Vec::new(); new_cap]);
        for bucket in old {
            for (k, v) in bucket {
                let hash = hash_value(&k).expect("key was hashable on insert");
                let idx = (hash as usize) % self.buckets.len();
                self.buckets[idx].push((k, v));
            }
        }
    }
}

impl PartialEq for MonkeyHash {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Default for MonkeyHash {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(Value, Value)> for MonkeyHash {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut h = MonkeyHash::new();
        for (k, v) in iter {
            // Construction from parsed/compiled literals only ever offers
            // hashable keys; a non-hashable key here is a compiler bug.
            h.insert(k, v).expect("hash literal keys are always hashable");
        }
        h
    }
}

// ── Value ────────────────────────────────────────────────────────────────

/// Monkey's runtime value type.
#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Null,
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Hash(Rc<MonkeyHash>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(&'static str, BuiltinFn),
    Error(Rc<str>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({})", n),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Null => write!(f, "Null"),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(a) => write!(f, "Array({:?})", a),
            Value::Hash(h) => write!(f, "Hash(len={})", h.len()),
            Value::CompiledFunction(_) => write!(f, "CompiledFunction"),
            Value::Closure(c) => write!(f, "{:?}", c),
            Value::Builtin(name, _) => write!(f, "Builtin({})", name),
            Value::Error(msg) => write!(f, "Error({:?})", msg),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(a) => {
                let items: Vec<String> = a.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Hash(h) => write!(f, "<hash with {} entries>", h.len()),
            Value::CompiledFunction(_) => write!(f, "CompiledFunction"),
            Value::Closure(_) => write!(f, "<fn>"),
            Value::Builtin(name, _) => write!(f, "<builtin {}>", name),
            Value::Error(msg) => write!(f, "ERROR: {}", msg),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a, _), Value::Builtin(b, _)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Null => "NULL",
            Value::String(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION_OBJ",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_, _) => "BUILTIN",
            Value::Error(_) => "ERROR",
        }
    }

    pub fn is_hashable(&self) -> bool {
        hash_value(self).is_some()
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Value::Error(Rc::from(msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Integer(0).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Boolean(true).is_truthy());
    }

    #[test]
    fn test_hash_insert_and_get() {
        let mut h = MonkeyHash::new();
        h.insert(Value::string("name"), Value::string("Monkey")).unwrap();
        h.insert(Value::Integer(1), Value::Boolean(true)).unwrap();
        assert_eq!(h.get(&Value::string("name")), Some(&Value::string("Monkey")));
        assert_eq!(h.get(&Value::Integer(1)), Some(&Value::Boolean(true)));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn test_hash_rejects_unhashable_key() {
        let mut h = MonkeyHash::new();
        assert!(h.insert(Value::array(vec![]), Value::Null).is_err());
    }

    #[test]
    fn test_hash_grows_past_load_factor() {
        let mut h = MonkeyHash::new();
        for i in 0..100 {
            h.insert(Value::Integer(i), Value::Integer(i * 2)).unwrap();
        }
        assert_eq!(h.len(), 100);
        for i in 0..100 {
            assert_eq!(h.get(&Value::Integer(i)), Some(&Value::Integer(i * 2)));
        }
    }

    #[test]
    fn test_hash_overwrite_existing_key() {
        let mut h = MonkeyHash::new();
        h.insert(Value::Integer(1), Value::Integer(10)).unwrap();
        h.insert(Value::Integer(1), Value::Integer(20)).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(&Value::Integer(1)), Some(&Value::Integer(20)));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(5), Value::Integer(5));
        assert_ne!(Value::Integer(5), Value::Integer(6));
        assert_eq!(Value::string("abc"), Value::string("abc"));
    }
}
