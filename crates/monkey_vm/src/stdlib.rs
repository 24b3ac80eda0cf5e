use crate::value::Value;

/// The fixed built-in table, in the exact order `compiler::BUILTIN_NAMES`
/// defines symbols for. `OpGetBuiltin`'s operand is a direct index into
/// this array — no name lookup happens at runtime.
pub const BUILTINS: [(&str, crate::value::BuiltinFn); 6] = [
    ("len", monkey_len),
    ("first", monkey_first),
    ("last", monkey_last),
    ("rest", monkey_rest),
    ("push", monkey_push),
    ("puts", monkey_puts),
];

fn wrong_args(name: &str, expected: &str, got: usize) -> Value {
    Value::error(format!("wrong number of arguments to `{}`. want={}, got={}", name, expected, got))
}

fn monkey_len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_args("len", "1", args.len());
    }
    match &args[0] {
        Value::String(s) => Value::Integer(s.len() as i64),
        Value::Array(a) => Value::Integer(a.len() as i64),
        other => Value::error(format!("argument to `len` not supported, got {}", other.type_name())),
    }
}

fn monkey_first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_args("first", "1", args.len());
    }
    match &args[0] {
        Value::Array(a) => a.first().cloned().unwrap_or(Value::Null),
        other => Value::error(format!("argument to `first` must be ARRAY, got {}", other.type_name())),
    }
}

fn monkey_last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_args("last", "1", args.len());
    }
    match &args[0] {
        Value::Array(a) => a.last().cloned().unwrap_or(Value::Null),
        other => Value::error(format!("argument to `last` must be ARRAY, got {}", other.type_name())),
    }
}

fn monkey_rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_args("rest", "1", args.len());
    }
    match &args[0] {
        Value::Array(a) if a.is_empty() => Value::Null,
        Value::Array(a) => Value::array(a[1..].to_vec()),
        other => Value::error(format!("argument to `rest` must be ARRAY, got {}", other.type_name())),
    }
}

fn monkey_push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_args("push", "2", args.len());
    }
    match &args[0] {
        Value::Array(a) => {
            let mut items = (**a).clone();
            items.push(args[1].clone());
            Value::array(items)
        }
        other => Value::error(format!("argument to `push` must be ARRAY, got {}", other.type_name())),
    }
}

fn monkey_puts(args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_of_string_and_array() {
        assert_eq!(monkey_len(&[Value::string("four")]), Value::Integer(4));
        assert_eq!(monkey_len(&[Value::array(vec![Value::Integer(1), Value::Integer(2)])]), Value::Integer(2));
    }

    #[test]
    fn test_len_wrong_arg_count_is_an_error_value() {
        assert!(matches!(monkey_len(&[]), Value::Error(_)));
    }

    #[test]
    fn test_first_last_rest_on_array() {
        let arr = Value::array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(monkey_first(&[arr.clone()]), Value::Integer(1));
        assert_eq!(monkey_last(&[arr.clone()]), Value::Integer(3));
        assert_eq!(monkey_rest(&[arr]), Value::array(vec![Value::Integer(2), Value::Integer(3)]));
    }

    #[test]
    fn test_rest_of_empty_array_is_null() {
        assert_eq!(monkey_rest(&[Value::array(vec![])]), Value::Null);
    }

    #[test]
    fn test_push_returns_new_array_without_mutating_original() {
        let arr = Value::array(vec![Value::Integer(1)]);
        let pushed = monkey_push(&[arr.clone(), Value::Integer(2)]);
        assert_eq!(pushed, Value::array(vec![Value::Integer(1), Value::Integer(2)]));
        assert_eq!(arr, Value::array(vec![Value::Integer(1)]));
    }

    #[test]
    fn test_builtins_table_order_matches_compiler() {
        assert_eq!(BUILTINS.map(|(name, _)| name), crate::compiler::BUILTIN_NAMES);
    }
}
