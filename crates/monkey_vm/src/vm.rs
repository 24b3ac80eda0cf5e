use std::rc::Rc;

use crate::chunk::read_u16;
use crate::compiler::Bytecode;
use crate::error::{RuntimeError, RuntimeResult};
use crate::opcode::Op;
use crate::stdlib;
use crate::value::{Closure, CompiledFunction, MonkeyHash, Value};

const STACK_SIZE: usize = 2048;
const GLOBALS_SIZE: usize = 65536;
const MAX_FRAMES: usize = 1024;

struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    base_pointer: usize,
}

impl Frame {
    fn instructions(&self) -> &[u8] {
        &self.closure.func.instructions
    }
}

/// The stack-based bytecode interpreter. One `Vm` runs one `compile()`
/// output; `new_with_global_store` lets a REPL reuse the same globals
/// vector across lines.
pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    globals: Vec<Value>,
    frames: Vec<Frame>,
    last_popped: Value,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        let main_fn = CompiledFunction { instructions: bytecode.instructions, num_locals: 0, num_parameters: 0 };
        let main_closure = Closure { func: Rc::new(main_fn), free: Vec::new() };
        Vm {
            constants: bytecode.constants,
            stack: Vec::with_capacity(64),
            globals: vec![Value::Null; GLOBALS_SIZE],
            frames: vec![Frame { closure: Rc::new(main_closure), ip: 0, base_pointer: 0 }],
            last_popped: Value::Null,
        }
    }

    /// `globals` is padded to `GLOBALS_SIZE` if the caller (the REPL,
    /// between lines) hands back a shorter vector than a fresh `Vm` would
    /// allocate — `OpSetGlobal`/`OpGetGlobal` index into it assuming the
    /// full fixed capacity is there.
    pub fn new_with_global_store(bytecode: Bytecode, mut globals: Vec<Value>) -> Self {
        globals.resize(GLOBALS_SIZE, Value::Null);
        let mut vm = Vm::new(bytecode);
        vm.globals = globals;
        vm
    }

    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value the most recent `OpPop` discarded — how a caller reads
    /// out the result of the last top-level expression statement.
    pub fn last_popped_stack_elem(&self) -> Value {
        self.last_popped.clone()
    }

    fn current_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("at least one frame is always active")
    }

    fn push(&mut self, v: Value) -> RuntimeResult<()> {
        if self.stack.len() >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        let v = self.stack.pop().expect("pop on an empty stack is a compiler bug");
        self.last_popped = v.clone();
        v
    }

    pub fn run(&mut self) -> RuntimeResult<()> {
        loop {
            let ip = self.current_frame().ip;
            if ip >= self.current_frame().instructions().len() {
                if self.frames.len() == 1 {
                    return Ok(());
                }
                // top-level "function" ran off the end without a Return
                self.frames.pop();
                continue;
            }
            let op_byte = self.current_frame().instructions()[ip];
            let op = Op::from_u8(op_byte).ok_or(RuntimeError::BadOpcode(op_byte))?;
            self.current_frame().ip += 1;

            match op {
                Op::Const => {
                    let idx = self.read_operand16();
                    self.push(self.constants[idx as usize].clone())?;
                }
                Op::Pop => {
                    self.pop();
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div => self.execute_binary_op(op)?,
                Op::True => self.push(Value::Boolean(true))?,
                Op::False => self.push(Value::Boolean(false))?,
                Op::Equal | Op::NotEqual | Op::GreaterThan => self.execute_comparison(op)?,
                Op::Minus => self.execute_minus()?,
                Op::Bang => self.execute_bang()?,
                Op::JumpNotTruthy => {
                    let target = self.read_operand16();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame().ip = target as usize;
                    }
                }
                Op::Jump => {
                    let target = self.read_operand16();
                    self.current_frame().ip = target as usize;
                }
                Op::Null => self.push(Value::Null)?,
                Op::GetGlobal => {
                    let idx = self.read_operand16();
                    self.push(self.globals[idx as usize].clone())?;
                }
                Op::SetGlobal => {
                    let idx = self.read_operand16();
                    let v = self.pop();
                    self.globals[idx as usize] = v;
                }
                Op::Array => {
                    let count = self.read_operand16() as usize;
                    let start = self.stack.len() - count;
                    let items = self.stack.split_off(start);
                    self.push(Value::array(items))?;
                }
                Op::Hash => {
                    let count = self.read_operand16() as usize;
                    let start = self.stack.len() - count;
                    let items = self.stack.split_off(start);
                    let mut hash = MonkeyHash::new();
                    for pair in items.chunks(2) {
                        let key = pair[0].clone();
                        if !key.is_hashable() {
                            return Err(RuntimeError::UnhashableKey(key.type_name()));
                        }
                        hash.insert(key, pair[1].clone()).map_err(|_| RuntimeError::UnhashableKey(pair[0].type_name()))?;
                    }
                    self.push(Value::Hash(Rc::new(hash)))?;
                }
                Op::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index(left, index)?;
                }
                Op::Call => {
                    let num_args = self.read_operand8() as usize;
                    self.execute_call(num_args)?;
                }
                Op::ReturnValue => {
                    let value = self.pop();
                    let frame = self.frames.pop().expect("return with no active frame");
                    self.stack.truncate(frame.base_pointer - 1);
                    self.push(value)?;
                }
                Op::Return => {
                    let frame = self.frames.pop().expect("return with no active frame");
                    self.stack.truncate(frame.base_pointer - 1);
                    self.push(Value::Null)?;
                }
                Op::GetLocal => {
                    let idx = self.read_operand8() as usize;
                    let base = self.current_frame().base_pointer;
                    self.push(self.stack[base + idx].clone())?;
                }
                Op::SetLocal => {
                    let idx = self.read_operand8() as usize;
                    let base = self.current_frame().base_pointer;
                    let v = self.pop();
                    self.stack[base + idx] = v;
                }
                Op::GetBuiltin => {
                    let idx = self.read_operand8() as usize;
                    let (name, f) = stdlib::BUILTINS[idx];
                    self.push(Value::Builtin(name, f))?;
                }
                Op::GetFree => {
                    let idx = self.read_operand8() as usize;
                    let v = self.current_frame().closure.free[idx].clone();
                    self.push(v)?;
                }
                Op::Closure => {
                    let const_idx = self.read_operand16() as usize;
                    let num_free = self.read_operand8() as usize;
                    let func = match &self.constants[const_idx] {
                        Value::CompiledFunction(f) => f.clone(),
                        other => panic!("OpClosure constant is not a CompiledFunction: {:?}", other),
                    };
                    let start = self.stack.len() - num_free;
                    let free = self.stack.split_off(start);
                    self.push(Value::Closure(Rc::new(Closure { func, free })))?;
                }
            }
        }
    }

    fn read_operand16(&mut self) -> u16 {
        let frame = self.current_frame();
        let v = read_u16(frame.instructions(), frame.ip);
        frame.ip += 2;
        v
    }

    fn read_operand8(&mut self) -> u8 {
        let frame = self.current_frame();
        let v = frame.instructions()[frame.ip];
        frame.ip += 1;
        v
    }

    fn execute_binary_op(&mut self, op: Op) -> RuntimeResult<()> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if op == Op::Div && *r == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                let result = match op {
                    Op::Add => l + r,
                    Op::Sub => l - r,
                    Op::Mul => l * r,
                    Op::Div => l / r,
                    _ => unreachable!(),
                };
                self.push(Value::Integer(result))
            }
            (Value::String(l), Value::String(r)) if op == Op::Add => {
                self.push(Value::string(format!("{}{}", l, r)))
            }
            _ => Err(RuntimeError::TypeMismatch { op: op.to_string(), left: left.type_name(), right: right.type_name() }),
        }
    }

    fn execute_comparison(&mut self, op: Op) -> RuntimeResult<()> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match op {
                    Op::Equal => l == r,
                    Op::NotEqual => l != r,
                    Op::GreaterThan => l > r,
                    _ => unreachable!(),
                };
                self.push(Value::Boolean(result))
            }
            _ => match op {
                Op::Equal => self.push(Value::Boolean(left == right)),
                Op::NotEqual => self.push(Value::Boolean(left != right)),
                _ => Err(RuntimeError::TypeMismatch { op: op.to_string(), left: left.type_name(), right: right.type_name() }),
            },
        }
    }

    fn execute_minus(&mut self) -> RuntimeResult<()> {
        let operand = self.pop();
        match operand {
            Value::Integer(n) => self.push(Value::Integer(-n)),
            other => Err(RuntimeError::UnknownOperator { op: "-".to_string(), operand: other.type_name() }),
        }
    }

    fn execute_bang(&mut self) -> RuntimeResult<()> {
        let operand = self.pop();
        self.push(Value::Boolean(!operand.is_truthy()))
    }

    fn execute_index(&mut self, left: Value, index: Value) -> RuntimeResult<()> {
        match (&left, &index) {
            (Value::Array(arr), Value::Integer(i)) => {
                let v = if *i < 0 || *i as usize >= arr.len() { Value::Null } else { arr[*i as usize].clone() };
                self.push(v)
            }
            (Value::Hash(hash), key) => {
                if !key.is_hashable() {
                    return Err(RuntimeError::UnhashableKey(key.type_name()));
                }
                self.push(hash.get(key).cloned().unwrap_or(Value::Null))
            }
            _ => Err(RuntimeError::UnknownIndexOperator(left.type_name())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> RuntimeResult<()> {
        let callee = self.stack[self.stack.len() - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(_, f) => {
                let args_start = self.stack.len() - num_args;
                let args = self.stack.split_off(args_start);
                self.pop(); // the builtin itself
                let result = f(&args);
                self.push(result)
            }
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> RuntimeResult<()> {
        if num_args != closure.func.num_parameters {
            return Err(RuntimeError::WrongArgumentCount {
                expected: closure.func.num_parameters.to_string(),
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow);
        }
        let base_pointer = self.stack.len() - num_args;
        let num_locals = closure.func.num_locals;
        self.stack.resize(base_pointer + num_locals, Value::Null);
        self.frames.push(Frame { closure, ip: 0, base_pointer });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_source(src: &str) -> Value {
        let (program, lex_errors, parse_errors) = monkey_parser::parse(src);
        assert!(lex_errors.is_empty(), "{:?}", lex_errors);
        assert!(parse_errors.is_empty(), "{:?}", parse_errors);
        let bytecode = crate::compiler::Compiler::new().compile(&program).expect("compile should succeed");
        let mut vm = Vm::new(bytecode);
        vm.run().expect("run should succeed");
        vm.last_popped_stack_elem()
    }

    // ── Arithmetic ───────────────────────────────────────────────────────
    #[test] fn test_integer_arithmetic() { assert_eq!(run_source("1 + 2 * 3;"), Value::Integer(7)); }
    #[test] fn test_integer_division() { assert_eq!(run_source("10 / 2;"), Value::Integer(5)); }
    #[test] fn test_minus_prefix() { assert_eq!(run_source("-5;"), Value::Integer(-5)); }
    #[test]
    fn test_division_by_zero_is_a_runtime_error() {
        let (program, _, _) = monkey_parser::parse("1 / 0;");
        let bytecode = crate::compiler::Compiler::new().compile(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        assert_eq!(vm.run(), Err(RuntimeError::DivisionByZero));
    }

    // ── Booleans / comparisons ───────────────────────────────────────────
    #[test] fn test_comparisons() {
        assert_eq!(run_source("1 < 2;"), Value::Boolean(true));
        assert_eq!(run_source("1 > 2;"), Value::Boolean(false));
        assert_eq!(run_source("1 == 1;"), Value::Boolean(true));
    }
    #[test] fn test_bang_prefix() {
        assert_eq!(run_source("!true;"), Value::Boolean(false));
        assert_eq!(run_source("!5;"), Value::Boolean(false));
        assert_eq!(run_source("!!5;"), Value::Boolean(true));
    }

    // ── Conditionals ─────────────────────────────────────────────────────
    #[test] fn test_if_else() {
        assert_eq!(run_source("if (true) { 10 } else { 20 };"), Value::Integer(10));
        assert_eq!(run_source("if (false) { 10 } else { 20 };"), Value::Integer(20));
    }
    #[test] fn test_if_without_alternative_is_null_when_falsy() {
        assert_eq!(run_source("if (false) { 10 };"), Value::Null);
    }

    // ── Globals ───────────────────────────────────────────────────────────
    #[test] fn test_let_global() {
        assert_eq!(run_source("let one = 1; let two = 2; one + two;"), Value::Integer(3));
    }

    // ── Strings ──────────────────────────────────────────────────────────
    #[test] fn test_string_concatenation() {
        assert_eq!(run_source(r#""mon" + "key";"#), Value::string("monkey"));
    }

    // ── Arrays / hashes / index ───────────────────────────────────────────
    #[test] fn test_array_literal() {
        assert_eq!(run_source("[1, 2 + 2, 3 * 3];"), Value::array(vec![Value::Integer(1), Value::Integer(4), Value::Integer(9)]));
    }
    #[test] fn test_array_index() {
        assert_eq!(run_source("[1, 2, 3][1];"), Value::Integer(2));
    }
    #[test] fn test_array_index_out_of_bounds_is_null() {
        assert_eq!(run_source("[1, 2, 3][99];"), Value::Null);
    }
    #[test] fn test_hash_literal_and_index() {
        assert_eq!(run_source(r#"{"a": 1, "b": 2}["a"];"#), Value::Integer(1));
    }

    // ── Functions ────────────────────────────────────────────────────────
    #[test] fn test_function_call_no_args() {
        assert_eq!(run_source("let f = fn() { 5 + 10 }; f();"), Value::Integer(15));
    }
    #[test] fn test_function_call_with_args_and_locals() {
        assert_eq!(run_source("let add = fn(a, b) { let c = a + b; c; }; add(1, 2);"), Value::Integer(3));
    }
    #[test] fn test_function_explicit_return() {
        assert_eq!(run_source("let early = fn() { return 99; 100; }; early();"), Value::Integer(99));
    }
    #[test] fn test_recursive_function() {
        assert_eq!(
            run_source("let counter = fn(x) { if (x == 0) { return 0; } else { counter(x - 1); } }; counter(3);"),
            Value::Integer(0)
        );
    }
    #[test] fn test_closures_capture_free_variables() {
        assert_eq!(
            run_source("let newAdder = fn(a) { fn(b) { a + b } }; let addTwo = newAdder(2); addTwo(3);"),
            Value::Integer(5)
        );
    }
    #[test] fn test_wrong_argument_count_is_runtime_error() {
        let (program, _, _) = monkey_parser::parse("let f = fn(a) { a }; f(1, 2);");
        let bytecode = crate::compiler::Compiler::new().compile(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        assert!(vm.run().is_err());
    }

    // ── Builtins ─────────────────────────────────────────────────────────
    #[test] fn test_len_builtin() { assert_eq!(run_source(r#"len("hello");"#), Value::Integer(5)); }
    #[test] fn test_push_builtin() { assert_eq!(run_source("push([1], 2);"), Value::array(vec![Value::Integer(1), Value::Integer(2)])); }

    // ── REPL-style global persistence ─────────────────────────────────────
    #[test] fn test_globals_persist_across_runs() {
        let (program1, _, _) = monkey_parser::parse("let x = 5;");
        let mut compiler = crate::compiler::Compiler::new();
        let bc1 = compiler.compile(&program1).unwrap();
        let (symbols, constants) = compiler.into_state();
        let mut vm = Vm::new(bc1);
        vm.run().unwrap();
        let globals = vm.into_globals();

        let (program2, _, _) = monkey_parser::parse("x + 1;");
        let mut compiler2 = crate::compiler::Compiler::new_with_state(symbols, constants);
        let bc2 = compiler2.compile(&program2).unwrap();
        let mut vm2 = Vm::new_with_global_store(bc2, globals);
        vm2.run().unwrap();
        assert_eq!(vm2.last_popped_stack_elem(), Value::Integer(6));
    }

    #[test]
    fn test_new_with_global_store_pads_an_empty_vec() {
        // This is the path the REPL actually takes on its very first line:
        // no prior VM to hand back a full-size globals vector from, so it
        // seeds with `Vec::new()`. `OpSetGlobal 0` must not index out of
        // bounds against that empty vec.
        let (program, _, _) = monkey_parser::parse("let x = 5; x;");
        let bytecode = crate::compiler::Compiler::new().compile(&program).unwrap();
        let mut vm = Vm::new_with_global_store(bytecode, Vec::new());
        vm.run().unwrap();
        assert_eq!(vm.last_popped_stack_elem(), Value::Integer(5));
    }
}
