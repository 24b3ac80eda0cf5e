use indexmap::IndexMap;

/// Where a resolved name lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
    Builtin,
    Free,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: Scope,
    pub index: usize,
}

/// Lexically nested symbol table used by the compiler to turn identifiers
/// into Global/Local/Builtin/Free slot references. Each function literal
/// compiles in its own enclosed table; resolving a name that lives in an
/// enclosing function's locals promotes it to a free variable captured by
/// `OpClosure`/`OpGetFree`.
#[derive(Debug)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: IndexMap<String, Symbol>,
    num_definitions: usize,
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { outer: None, store: IndexMap::new(), num_definitions: 0, free_symbols: Vec::new() }
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        SymbolTable { outer: Some(Box::new(outer)), store: IndexMap::new(), num_definitions: 0, free_symbols: Vec::new() }
    }

    /// Unwraps one level of nesting, handing back the enclosing table. Used
    /// by the compiler when it leaves a function-literal scope.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|b| *b)
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_some() { Scope::Local } else { Scope::Global };
        let symbol = Symbol { name: name.to_string(), scope, index: self.num_definitions };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol { name: name.to_string(), scope: Scope::Builtin, index };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let index = self.free_symbols.len();
        self.free_symbols.push(original.clone());
        let symbol = Symbol { name: original.name.clone(), scope: Scope::Free, index };
        self.store.insert(original.name, symbol.clone());
        symbol
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(sym) = self.store.get(name) {
            return Some(sym.clone());
        }
        let outer = self.outer.as_mut()?;
        let resolved = outer.resolve(name)?;
        match resolved.scope {
            Scope::Global | Scope::Builtin => Some(resolved),
            _ => Some(self.define_free(resolved)),
        }
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
