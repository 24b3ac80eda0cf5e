use monkey_parser::{ExprKind, Program, Stmt, StmtKind};

use crate::chunk::Chunk;
use crate::error::{CompileError, CompileResult};
use crate::opcode::Op;
use crate::symbol::{Scope, SymbolTable};
use crate::value::{CompiledFunction, Value};

/// The six built-ins addressed by `OpGetBuiltin`, in index order. The
/// compiler and the VM must agree on this ordering; `stdlib::BUILTINS`
/// mirrors it for dispatch.
pub const BUILTIN_NAMES: [&str; 6] = ["len", "first", "last", "rest", "push", "puts"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedInstruction {
    op: Op,
    position: usize,
}

struct CompilationScope {
    chunk: Chunk,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

impl CompilationScope {
    fn new() -> Self {
        CompilationScope { chunk: Chunk::new(), last_instruction: None, previous_instruction: None }
    }
}

/// The finished output of a compile: a flat instruction stream for the
/// top-level program plus the constant pool every `CompiledFunction`
/// embedded in it indexes into.
pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Value>,
}

pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (i, name) in BUILTIN_NAMES.iter().enumerate() {
            symbol_table.define_builtin(i, name);
        }
        Compiler { constants: Vec::new(), symbol_table, scopes: vec![CompilationScope::new()] }
    }

    /// Resumes compilation against an existing global symbol table and
    /// constant pool, so a REPL can keep `let` bindings alive across lines.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler { constants, symbol_table, scopes: vec![CompilationScope::new()] }
    }

    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    pub fn compile(&mut self, program: &Program) -> CompileResult<Bytecode> {
        for stmt in &program.stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(Bytecode { instructions: self.current_scope().chunk.code.clone(), constants: self.constants.clone() })
    }

    fn current_scope(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("at least one scope is always active")
    }

    // ── Emit helpers ─────────────────────────────────────────────────────

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let scope = self.current_scope();
        let pos = scope.chunk.emit_op(op, operands);
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { op, position: pos });
        pos
    }

    fn last_instruction_is(&mut self, op: Op) -> bool {
        matches!(self.current_scope().last_instruction, Some(e) if e.op == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope();
        if let Some(last) = scope.last_instruction {
            scope.chunk.code.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope();
        if let Some(last) = scope.last_instruction {
            scope.chunk.code[last.position] = Op::ReturnValue as u8;
            scope.last_instruction = Some(EmittedInstruction { op: Op::ReturnValue, position: last.position });
        }
    }

    fn add_constant(&mut self, v: Value) -> u16 {
        let idx = self.constants.len() as u16;
        self.constants.push(v);
        idx
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::new());
        let outer = std::mem::replace(&mut self.symbol_table, SymbolTable::new());
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    /// Leaves the current scope, returning its compiled code and the free
    /// variables the inner symbol table promoted from enclosing locals (in
    /// definition order — this is the order `OpClosure`'s operands expect
    /// them pushed on the stack).
    fn leave_scope(&mut self) -> (Vec<u8>, Vec<crate::symbol::Symbol>) {
        let scope = self.scopes.pop().expect("leave_scope without a matching enter_scope");
        let inner = std::mem::replace(&mut self.symbol_table, SymbolTable::new());
        let free_symbols = inner.free_symbols.clone();
        self.symbol_table = inner.into_outer().expect("leave_scope without a matching enter_scope");
        (scope.chunk.code, free_symbols)
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.inner {
            StmtKind::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop, &[]);
            }
            StmtKind::Let { name, value } => {
                let symbol = self.symbol_table.define(name);
                self.compile_expr(value)?;
                match symbol.scope {
                    Scope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
                    _ => self.emit(Op::SetLocal, &[symbol.index]),
                };
            }
            StmtKind::Return(value) => {
                self.compile_expr(value)?;
                self.emit(Op::ReturnValue, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn compile_expr(&mut self, expr: &monkey_parser::Expr) -> CompileResult<()> {
        match &expr.inner {
            ExprKind::Int(n) => {
                let idx = self.add_constant(Value::Integer(*n));
                self.emit(Op::Const, &[idx as usize]);
            }
            ExprKind::Bool(true) => {
                self.emit(Op::True, &[]);
            }
            ExprKind::Bool(false) => {
                self.emit(Op::False, &[]);
            }
            ExprKind::Str(s) => {
                let idx = self.add_constant(Value::string(s.as_str()));
                self.emit(Op::Const, &[idx as usize]);
            }
            ExprKind::Ident(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(symbol);
            }
            ExprKind::Prefix { op, right } => {
                self.compile_expr(right)?;
                match op.as_str() {
                    "!" => self.emit(Op::Bang, &[]),
                    "-" => self.emit(Op::Minus, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
            }
            ExprKind::Infix { op, left, right } => {
                // `a < b` compiles as `b > a`: one fewer comparison opcode needed.
                if op == "<" {
                    self.compile_expr(right)?;
                    self.compile_expr(left)?;
                    self.emit(Op::GreaterThan, &[]);
                } else {
                    self.compile_expr(left)?;
                    self.compile_expr(right)?;
                    match op.as_str() {
                        "+" => self.emit(Op::Add, &[]),
                        "-" => self.emit(Op::Sub, &[]),
                        "*" => self.emit(Op::Mul, &[]),
                        "/" => self.emit(Op::Div, &[]),
                        ">" => self.emit(Op::GreaterThan, &[]),
                        "==" => self.emit(Op::Equal, &[]),
                        "!=" => self.emit(Op::NotEqual, &[]),
                        other => return Err(CompileError::UnknownOperator(other.to_string())),
                    };
                }
            }
            ExprKind::If { condition, consequence, alternative } => {
                self.compile_expr(condition)?;
                let jump_not_truthy = self.emit(Op::JumpNotTruthy, &[9999]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(Op::Pop) {
                    self.remove_last_pop();
                }

                let jump_end = self.emit(Op::Jump, &[9999]);
                let after_consequence = self.current_scope().chunk.code.len();
                self.current_scope().chunk.change_operand(jump_not_truthy, after_consequence);

                match alternative {
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                    Some(alt) => {
                        self.compile_block(alt)?;
                        if self.last_instruction_is(Op::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }
                let after_alternative = self.current_scope().chunk.code.len();
                self.current_scope().chunk.change_operand(jump_end, after_alternative);
            }
            ExprKind::Array(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Op::Array, &[items.len()]);
            }
            ExprKind::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::Hash, &[pairs.len() * 2]);
            }
            ExprKind::Index { left, index } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(Op::Index, &[]);
            }
            ExprKind::Call { callee, args } => {
                self.compile_expr(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Op::Call, &[args.len()]);
            }
            ExprKind::FunctionLiteral { params, body } => {
                self.enter_scope();
                for param in params {
                    self.symbol_table.define(param);
                }

                self.compile_block(body)?;
                if self.last_instruction_is(Op::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Op::ReturnValue) {
                    self.emit(Op::Return, &[]);
                }

                let num_locals = self.symbol_table.num_definitions();
                let (instructions, free_symbols) = self.leave_scope();

                let num_free = free_symbols.len();
                for free in &free_symbols {
                    self.load_symbol(free.clone());
                }

                let compiled = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: params.len(),
                };
                let idx = self.add_constant(Value::CompiledFunction(std::rc::Rc::new(compiled)));
                self.emit(Op::Closure, &[idx as usize, num_free]);
            }
            ExprKind::Error => {
                // Parser already recorded the syntax error; nothing sound to compile.
            }
        }
        Ok(())
    }

    fn load_symbol(&mut self, symbol: crate::symbol::Symbol) {
        match symbol.scope {
            Scope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            Scope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            Scope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            Scope::Free => self.emit(Op::GetFree, &[symbol.index]),
        };
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::read_u16;

    fn compile_src(src: &str) -> Bytecode {
        let (program, lex_errors, parse_errors) = monkey_parser::parse(src);
        assert!(lex_errors.is_empty(), "{:?}", lex_errors);
        assert!(parse_errors.is_empty(), "{:?}", parse_errors);
        Compiler::new().compile(&program).expect("compile should succeed")
    }

    fn mnemonics(code: &[u8]) -> Vec<Op> {
        let mut ops = Vec::new();
        let mut i = 0;
        while i < code.len() {
            let op = Op::from_u8(code[i]).unwrap();
            ops.push(op);
            i += 1 + op.operand_bytes();
        }
        ops
    }

    #[test]
    fn test_integer_arithmetic_emits_add_and_pop() {
        let bc = compile_src("1 + 2;");
        assert_eq!(mnemonics(&bc.instructions), vec![Op::Const, Op::Const, Op::Add, Op::Pop]);
        assert_eq!(bc.constants, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_less_than_reverses_operands() {
        let bc = compile_src("1 < 2;");
        assert_eq!(mnemonics(&bc.instructions), vec![Op::Const, Op::Const, Op::GreaterThan, Op::Pop]);
        assert_eq!(bc.constants, vec![Value::Integer(2), Value::Integer(1)]);
    }

    #[test]
    fn test_if_without_else_pushes_null_branch() {
        let bc = compile_src("if (true) { 10 }; 3333;");
        let ops = mnemonics(&bc.instructions);
        assert_eq!(ops, vec![
            Op::True, Op::JumpNotTruthy, Op::Const, Op::Jump, Op::Null, Op::Pop, Op::Const, Op::Pop,
        ]);
    }

    #[test]
    fn test_let_global_uses_set_and_get_global() {
        let bc = compile_src("let one = 1; one;");
        let ops = mnemonics(&bc.instructions);
        assert_eq!(ops, vec![Op::Const, Op::SetGlobal, Op::GetGlobal, Op::Pop]);
    }

    #[test]
    fn test_string_constants_are_not_deduplicated_across_literals() {
        let bc = compile_src(r#""mon" + "key";"#);
        assert_eq!(bc.constants, vec![Value::string("mon"), Value::string("key")]);
    }

    #[test]
    fn test_function_literal_emits_closure_with_zero_free() {
        let bc = compile_src("fn() { return 5 + 10 }");
        let ops = mnemonics(&bc.instructions);
        assert_eq!(ops, vec![Op::Closure, Op::Pop]);
        match &bc.constants[2] {
            Value::CompiledFunction(f) => {
                assert_eq!(mnemonics(&f.instructions), vec![Op::Const, Op::Const, Op::Add, Op::ReturnValue]);
            }
            other => panic!("expected CompiledFunction, got {:?}", other),
        }
    }

    #[test]
    fn test_function_body_implicit_return_replaces_trailing_pop() {
        let bc = compile_src("fn() { 5 + 10 }");
        match &bc.constants[2] {
            Value::CompiledFunction(f) => {
                assert_eq!(mnemonics(&f.instructions), vec![Op::Const, Op::Const, Op::Add, Op::ReturnValue]);
            }
            other => panic!("expected CompiledFunction, got {:?}", other),
        }
    }

    #[test]
    fn test_call_expression_emits_call_with_argc() {
        let bc = compile_src("let f = fn() { 24 }; f();");
        let ops = mnemonics(&bc.instructions);
        assert_eq!(ops.last(), Some(&Op::Pop));
        assert!(ops.contains(&Op::Call));
    }

    #[test]
    fn test_let_statement_scoping_inside_function_uses_locals() {
        let bc = compile_src("fn() { let num = 55; num }");
        match &bc.constants[1] {
            Value::CompiledFunction(f) => {
                assert_eq!(mnemonics(&f.instructions), vec![Op::Const, Op::SetLocal, Op::GetLocal, Op::ReturnValue]);
                assert_eq!(f.num_locals, 1);
            }
            other => panic!("expected CompiledFunction, got {:?}", other),
        }
    }

    #[test]
    fn test_closure_captures_free_variable_from_enclosing_function() {
        let bc = compile_src("fn(a) { fn(b) { a + b } }");
        let inner = bc.constants.iter().find_map(|c| match c {
            Value::CompiledFunction(f) if f.num_parameters == 1 && f.instructions.first() == Some(&(Op::GetFree as u8)) => Some(f.clone()),
            _ => None,
        });
        assert!(inner.is_some(), "expected an inner function starting with OpGetFree");
    }

    #[test]
    fn test_builtin_function_resolves_to_get_builtin() {
        let bc = compile_src("len([1, 2, 3]);");
        let ops = mnemonics(&bc.instructions);
        assert!(ops.contains(&Op::GetBuiltin));
    }

    #[test]
    fn test_recursive_function_resolves_self_via_global_let() {
        let bc = compile_src("let countDown = fn(x) { countDown(x - 1) }; countDown(1);");
        match &bc.constants[1] {
            Value::CompiledFunction(f) => {
                assert!(mnemonics(&f.instructions).contains(&Op::GetGlobal));
            }
            other => panic!("expected CompiledFunction, got {:?}", other),
        }
    }

    #[test]
    fn test_undefined_variable_is_a_compile_error() {
        let (program, _, _) = monkey_parser::parse("foobar;");
        let err = Compiler::new().compile(&program).unwrap_err();
        assert_eq!(err, CompileError::UndefinedVariable("foobar".to_string()));
    }

    #[test]
    fn test_jump_operand_is_absolute_position() {
        let bc = compile_src("if (true) { 10 } else { 20 }; 3333;");
        let target = read_u16(&bc.instructions, 1) as usize;
        assert!(target > 1 && target <= bc.instructions.len());
    }
}
