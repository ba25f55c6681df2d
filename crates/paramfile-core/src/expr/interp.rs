//! Tree-walking evaluator for the snippet AST.

use std::cmp::Ordering;

use once_cell::sync::Lazy;

use super::parser::{BinOp, CmpOp, Expr, Stmt, UnaryOp};
use crate::exception::{Exception, ExceptionType, BUILTIN_EXCEPTIONS};
use crate::value::{Function, Map, Mock, Value};

static BUILTINS: Lazy<Map> = Lazy::new(builtin_table);

/// Looks a name up in `env`, then in the builtins.
fn lookup(name: &str, env: &Map) -> Result<Value, Exception> {
    env.get(name)
        .or_else(|| BUILTINS.get(name))
        .cloned()
        .ok_or_else(|| Exception::name_error(name))
}

pub(crate) fn exec(stmts: &[Stmt], env: &mut Map) -> Result<(), Exception> {
    for stmt in stmts {
        match stmt {
            Stmt::Pass => {}
            Stmt::Expr(expr) => {
                eval(expr, env)?;
            }
            Stmt::Assert(test, message) => {
                if !eval(test, env)?.is_truthy() {
                    let message = match message {
                        Some(expr) => eval(expr, env)?.to_string(),
                        None => String::new(),
                    };
                    return Err(Exception::assertion_error(message));
                }
            }
            Stmt::Assign(targets, expr) => {
                let value = eval(expr, env)?;
                if let [target] = targets.as_slice() {
                    env.insert(target.clone(), value);
                    continue;
                }
                let items = match value {
                    Value::List(items) => items,
                    other => {
                        return Err(Exception::type_error(format!(
                            "cannot unpack non-iterable {} object",
                            other.type_name()
                        )))
                    }
                };
                match items.len().cmp(&targets.len()) {
                    Ordering::Less => {
                        return Err(Exception::value_error(format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )))
                    }
                    Ordering::Greater => {
                        return Err(Exception::value_error(format!(
                            "too many values to unpack (expected {})",
                            targets.len()
                        )))
                    }
                    Ordering::Equal => {}
                }
                for (target, item) in targets.iter().zip(items) {
                    env.insert(target.clone(), item);
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn eval(expr: &Expr, env: &Map) -> Result<Value, Exception> {
    match expr {
        Expr::Const(value) => Ok(value.clone()),
        Expr::Name(name) => lookup(name, env),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Dict(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                let key = map_key(&eval(key, env)?)?;
                map.insert(key, eval(value, env)?);
            }
            Ok(Value::Map(map))
        }
        Expr::Attr(target, attr) => get_attr(eval(target, env)?, attr),
        Expr::Index(target, index) => get_item(&eval(target, env)?, &eval(index, env)?),
        Expr::Call(callee, args) => {
            let callee = eval(callee, env)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            call(&callee, &args)
        }
        Expr::Unary(op, operand) => unary(*op, eval(operand, env)?),
        Expr::Binary(op, left, right) => binary(*op, &eval(left, env)?, &eval(right, env)?),
        Expr::Compare(first, rest) => {
            let mut left = eval(first, env)?;
            for (op, right) in rest {
                let right = eval(right, env)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(left, right) => {
            let left = eval(left, env)?;
            if left.is_truthy() {
                eval(right, env)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, env)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(right, env)
            }
        }
        Expr::IfElse {
            cond,
            then,
            otherwise,
        } => {
            if eval(cond, env)?.is_truthy() {
                eval(then, env)
            } else {
                eval(otherwise, env)
            }
        }
    }
}

/// Mapping keys are strings; scalar keys are converted with `str()`.
pub(crate) fn map_key(key: &Value) -> Result<String, Exception> {
    match key {
        Value::List(_) | Value::Map(_) => Err(Exception::type_error(format!(
            "unhashable type: '{}'",
            key.type_name()
        ))),
        other => Ok(other.to_string()),
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    #[allow(clippy::cast_precision_loss)]
    fn float(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(x) => x,
        }
    }
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(n) => Some(Num::Int(*n)),
        Value::Float(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

const fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> Exception {
    Exception::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol(op),
        left.type_name(),
        right.type_name()
    ))
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value, Exception> {
    match (op, &operand) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.is_truthy())),
        (_, Value::Mock(_)) => Ok(Value::Mock(Mock::new())),
        (UnaryOp::Neg, _) => match num(&operand) {
            Some(Num::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(Exception::overflow),
            Some(Num::Float(x)) => Ok(Value::Float(-x)),
            None => Err(Exception::type_error(format!(
                "bad operand type for unary -: '{}'",
                operand.type_name()
            ))),
        },
        (UnaryOp::Pos, _) => match num(&operand) {
            Some(Num::Int(n)) => Ok(Value::Int(n)),
            Some(Num::Float(x)) => Ok(Value::Float(x)),
            None => Err(Exception::type_error(format!(
                "bad operand type for unary +: '{}'",
                operand.type_name()
            ))),
        },
    }
}

/// Upper bound on the length of sequences built by repetition or `range`.
const MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Returns how many times to repeat a sequence of `len` items, or
/// `OverflowError` if the result would exceed [`MAX_SEQUENCE_LEN`].
fn repeat_count(len: usize, times: i64, what: &str) -> Result<usize, Exception> {
    let times = usize::try_from(times).unwrap_or(0);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(times),
        _ => Err(Exception::new(
            "OverflowError",
            format!("repeated {what} is too long"),
        )),
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, Exception> {
    if left.is_mock() || right.is_mock() {
        return Ok(Value::Mock(Mock::new()));
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            return Ok(Value::Str(s.repeat(repeat_count(s.len(), *n, "string")?)))
        }
        (BinOp::Mul, Value::List(items), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
            let times = repeat_count(items.len(), *n, "list")?;
            return Ok(Value::List(
                std::iter::repeat(items.iter()).take(times).flatten().cloned().collect(),
            ));
        }
        _ => {}
    }
    let (Some(a), Some(b)) = (num(left), num(right)) else {
        return Err(unsupported(op, left, right));
    };
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => int_op(op, a, b),
        _ => float_op(op, a.float(), b.float()),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, Exception> {
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        #[allow(clippy::cast_precision_loss)]
        BinOp::Div => {
            if b == 0 {
                return Err(Exception::zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv | BinOp::Mod => {
            if b == 0 {
                return Err(Exception::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            let (Some(quotient), Some(remainder)) = (a.checked_div(b), a.checked_rem(b)) else {
                return Err(Exception::overflow());
            };
            // Floor semantics: the remainder takes the sign of the divisor.
            let adjust = remainder != 0 && ((remainder < 0) != (b < 0));
            if op == BinOp::FloorDiv {
                Some(if adjust { quotient - 1 } else { quotient })
            } else {
                Some(if adjust { remainder + b } else { remainder })
            }
        }
        BinOp::Pow => {
            if b < 0 {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                return float_op(op, a as f64, b as f64);
            }
            u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
        }
    };
    result.map(Value::Int).ok_or_else(Exception::overflow)
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value, Exception> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(Exception::zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(Exception::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(Exception::zero_division("float modulo"));
            }
            a - b * (a / b).floor()
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(Exception::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(result))
}

fn order(op: CmpOp, left: &Value, right: &Value) -> Result<Option<Ordering>, Exception> {
    if let (Some(a), Some(b)) = (num(left), num(right)) {
        return Ok(match (a, b) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            _ => a.float().partial_cmp(&b.float()),
        });
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if x != y {
                    return order(op, x, y);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => {
            let symbol = match op {
                CmpOp::Lt => "<",
                CmpOp::Le => "<=",
                CmpOp::Gt => ">",
                _ => ">=",
            };
            Err(Exception::type_error(format!(
                "'{symbol}' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            )))
        }
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, Exception> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(Exception::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.contains(item)),
        Value::Map(map) => Ok(map.contains_key(&map_key(item)?)),
        Value::Namespace(ns) => Ok(item.as_str().is_some_and(|name| ns.contains(name))),
        other => Err(Exception::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, Exception> {
    match op {
        CmpOp::Eq => Ok(left == right),
        CmpOp::NotEq => Ok(left != right),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let Some(ordering) = order(op, left, right)? else {
                return Ok(false);
            };
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

fn get_item(target: &Value, index: &Value) -> Result<Value, Exception> {
    match (target, index) {
        (Value::Mock(_), _) => Ok(Value::Mock(Mock::new())),
        (Value::List(items), Value::Int(i)) => normalize_index(*i, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| Exception::index_error("list index out of range")),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(*i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| Exception::index_error("string index out of range"))
        }
        (Value::Map(map), key) => {
            let key = map_key(key)?;
            map.get(&key)
                .cloned()
                .ok_or_else(|| Exception::key_error(&key))
        }
        (Value::List(_) | Value::Str(_), other) => Err(Exception::type_error(format!(
            "{} indices must be integers, not {}",
            target.type_name(),
            other.type_name()
        ))),
        (other, _) => Err(Exception::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn get_attr(target: Value, attr: &str) -> Result<Value, Exception> {
    if matches!(target, Value::Str(_) | Value::Map(_) | Value::List(_)) {
        return method(target, attr);
    }
    match &target {
        Value::Mock(_) => Ok(Value::Mock(Mock::new())),
        Value::Module(module) => module.get(attr).cloned().ok_or_else(|| {
            Exception::new(
                "AttributeError",
                format!("module '{}' has no attribute '{attr}'", module.name()),
            )
            .with_attr("name", attr)
        }),
        Value::Namespace(ns) => ns
            .get(attr)
            .cloned()
            .ok_or_else(|| Exception::attribute_error("Namespace", attr)),
        Value::Exception(exc) => {
            if let Some(value) = exc.attr(attr) {
                return Ok(value.clone());
            }
            match attr {
                "message" => Ok(Value::Str(exc.message().to_string())),
                "kind" => Ok(Value::Str(exc.kind().to_string())),
                "cause" => Ok(exc.cause().map_or(Value::None, |cause| {
                    Value::from(Exception::capture(cause, None))
                })),
                _ => Err(Exception::attribute_error(exc.kind(), attr)),
            }
        }
        other => Err(Exception::attribute_error(other.type_name(), attr)),
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), Exception> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Exception::type_error(format!(
            "{name}() takes exactly {expected} argument(s) ({} given)",
            args.len()
        )))
    }
}

fn str_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str, Exception> {
    value.as_str().ok_or_else(|| {
        Exception::type_error(format!(
            "{name}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

/// Binds a method of a builtin container to its receiver.
fn method(receiver: Value, attr: &str) -> Result<Value, Exception> {
    let name = attr.to_string();
    let supported = match &receiver {
        Value::Str(_) => matches!(
            attr,
            "upper" | "lower" | "strip" | "split" | "startswith" | "endswith" | "replace" | "join"
        ),
        Value::Map(_) => matches!(attr, "keys" | "values" | "items" | "get"),
        Value::List(_) => matches!(attr, "index" | "count"),
        _ => false,
    };
    if !supported {
        return Err(Exception::attribute_error(receiver.type_name(), attr));
    }
    let label = format!("{}.{attr}", receiver.type_name());
    Ok(Value::Function(Function::new(label, move |args| {
        call_method(&receiver, &name, args)
    })))
}

fn call_method(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, Exception> {
    match (receiver, name) {
        (Value::Str(s), "upper") => Ok(Value::Str(s.to_uppercase())),
        (Value::Str(s), "lower") => Ok(Value::Str(s.to_lowercase())),
        (Value::Str(s), "strip") => Ok(Value::Str(s.trim().to_string())),
        (Value::Str(s), "split") => {
            let parts: Vec<Value> = match args.first() {
                Some(sep) => s.split(str_arg("split", sep)?).map(Value::from).collect(),
                None => s.split_whitespace().map(Value::from).collect(),
            };
            Ok(Value::List(parts))
        }
        (Value::Str(s), "startswith") => {
            arity("startswith", args, 1)?;
            Ok(Value::Bool(s.starts_with(str_arg("startswith", &args[0])?)))
        }
        (Value::Str(s), "endswith") => {
            arity("endswith", args, 1)?;
            Ok(Value::Bool(s.ends_with(str_arg("endswith", &args[0])?)))
        }
        (Value::Str(s), "replace") => {
            arity("replace", args, 2)?;
            let from = str_arg("replace", &args[0])?;
            let to = str_arg("replace", &args[1])?;
            Ok(Value::Str(s.replace(from, to)))
        }
        (Value::Str(sep), "join") => {
            arity("join", args, 1)?;
            let Value::List(items) = &args[0] else {
                return Err(Exception::type_error("can only join a list"));
            };
            let parts = items
                .iter()
                .map(|item| str_arg("join", item).map(ToString::to_string))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Str(parts.join(sep)))
        }
        (Value::Map(map), "keys") => Ok(Value::List(map.keys().cloned().map(Value::Str).collect())),
        (Value::Map(map), "values") => Ok(Value::List(map.values().cloned().collect())),
        (Value::Map(map), "items") => Ok(Value::List(
            map.iter()
                .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
                .collect(),
        )),
        (Value::Map(map), "get") => {
            let Some(key) = args.first() else {
                return Err(Exception::type_error("get() expected at least 1 argument"));
            };
            Ok(map
                .get(&map_key(key)?)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or_default()))
        }
        (Value::List(items), "index") => {
            arity("index", args, 1)?;
            items
                .iter()
                .position(|item| *item == args[0])
                .and_then(|i| i64::try_from(i).ok())
                .map(Value::Int)
                .ok_or_else(|| Exception::value_error(format!("{} is not in list", args[0].repr())))
        }
        (Value::List(items), "count") => {
            arity("count", args, 1)?;
            let count = items.iter().filter(|item| **item == args[0]).count();
            Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        }
        _ => Err(Exception::attribute_error(receiver.type_name(), name)),
    }
}

fn call(callee: &Value, args: &[Value]) -> Result<Value, Exception> {
    match callee {
        Value::Function(func) => func.call(args),
        Value::ExceptionType(ty) => {
            let message = args.first().map(ToString::to_string).unwrap_or_default();
            ty.instantiate(message).map(Value::from)
        }
        Value::Mock(_) => Ok(Value::Mock(Mock::new())),
        Value::Deferred(deferred) if args.is_empty() => deferred.call(),
        other => Err(Exception::type_error(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

/// The single iterable argument of `min`/`max`/`sum`, or all arguments.
fn iterable_args<'a>(name: &str, args: &'a [Value]) -> Result<&'a [Value], Exception> {
    match args {
        [] => Err(Exception::type_error(format!(
            "{name} expected at least 1 argument, got 0"
        ))),
        [Value::List(items)] => Ok(items),
        [other] => Err(Exception::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
        many => Ok(many),
    }
}

fn extreme(name: &str, args: &[Value], keep: Ordering) -> Result<Value, Exception> {
    let items = iterable_args(name, args)?;
    let mut best = items
        .first()
        .ok_or_else(|| Exception::value_error(format!("{name}() arg is an empty sequence")))?;
    for item in &items[1..] {
        if order(CmpOp::Lt, item, best)? == Some(keep) {
            best = item;
        }
    }
    Ok(best.clone())
}

fn builtin(name: &'static str, func: fn(&[Value]) -> Result<Value, Exception>) -> (String, Value) {
    (name.to_string(), Value::Function(Function::new(name, func)))
}

fn builtin_table() -> Map {
    let mut table: Map = [
        builtin("str", |args| {
            Ok(Value::Str(args.first().map(ToString::to_string).unwrap_or_default()))
        }),
        builtin("repr", |args| {
            arity("repr", args, 1)?;
            Ok(Value::Str(args[0].repr()))
        }),
        builtin("int", |args| {
            arity("int", args, 1)?;
            args[0].clone().into_int()
        }),
        builtin("float", |args| {
            arity("float", args, 1)?;
            args[0].clone().into_float()
        }),
        builtin("bool", |args| {
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }),
        builtin("len", |args| {
            arity("len", args, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                other => {
                    return Err(Exception::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        }),
        builtin("abs", |args| {
            arity("abs", args, 1)?;
            match &args[0] {
                Value::Int(n) => n.checked_abs().map(Value::Int).ok_or_else(Exception::overflow),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => Err(Exception::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }),
        builtin("min", |args| extreme("min", args, Ordering::Less)),
        builtin("max", |args| extreme("max", args, Ordering::Greater)),
        builtin("sum", |args| {
            let items = iterable_args("sum", args)?;
            items
                .iter()
                .try_fold(Value::Int(0), |acc, item| binary(BinOp::Add, &acc, item))
        }),
        builtin("sorted", |args| {
            arity("sorted", args, 1)?;
            let mut items = iterable_args("sorted", args)?.to_vec();
            let mut failure = None;
            items.sort_by(|a, b| match order(CmpOp::Lt, a, b) {
                Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
                Err(err) => {
                    failure.get_or_insert(err);
                    Ordering::Equal
                }
            });
            failure.map_or(Ok(Value::List(items)), Err)
        }),
        builtin("list", |args| match args {
            [] => Ok(Value::List(Vec::new())),
            [Value::List(items)] => Ok(Value::List(items.clone())),
            [Value::Str(s)] => Ok(Value::List(s.chars().map(|c| Value::Str(c.to_string())).collect())),
            [Value::Map(map)] => Ok(Value::List(map.keys().cloned().map(Value::Str).collect())),
            [other] => Err(Exception::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
            _ => Err(Exception::type_error("list expected at most 1 argument")),
        }),
        builtin("range", |args| {
            let bounds = args
                .iter()
                .map(|arg| {
                    arg.as_i64().ok_or_else(|| {
                        Exception::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            arg.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop) = match bounds.as_slice() {
                [stop] => (0, *stop),
                [start, stop] => (*start, *stop),
                _ => return Err(Exception::type_error("range expected 1 or 2 arguments")),
            };
            let len = stop.checked_sub(start).map_or(u64::MAX, |len| {
                u64::try_from(len).unwrap_or(0)
            });
            if len > MAX_SEQUENCE_LEN as u64 {
                return Err(Exception::new(
                    "OverflowError",
                    "range() result has too many items",
                ));
            }
            Ok(Value::List((start..stop).map(Value::Int).collect()))
        }),
        builtin("isinstance", |args| {
            arity("isinstance", args, 2)?;
            let Value::Exception(exc) = &args[0] else {
                return Ok(Value::Bool(false));
            };
            let types = match &args[1] {
                Value::List(items) => items.clone(),
                single => vec![single.clone()],
            };
            for ty in &types {
                let Value::ExceptionType(ty) = ty else {
                    return Err(Exception::type_error(
                        "isinstance() arg 2 must be a type or a list of types",
                    ));
                };
                if ty.matches(&**exc) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }),
    ]
    .into_iter()
    .collect();

    for name in BUILTIN_EXCEPTIONS {
        table.insert(
            (*name).to_string(),
            Value::ExceptionType(ExceptionType::named(*name)),
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::{parse_expression, parse_program};

    fn eval_str(src: &str) -> Result<Value, Exception> {
        eval(&parse_expression(src)?, &Map::new())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_str("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval_str("2 ** 10").unwrap(), Value::Int(1024));
        assert_eq!(eval_str("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval_str("-7 // 2").unwrap(), Value::Int(-4));
        assert_eq!(eval_str("-7 % 3").unwrap(), Value::Int(2));
        assert_eq!(eval_str("7 % -3").unwrap(), Value::Int(-2));
        assert_eq!(eval_str("1 + 0.5").unwrap(), Value::Float(1.5));
        assert_eq!(eval_str("'ab' * 2").unwrap(), Value::from("abab"));
    }

    #[test]
    fn test_huge_repetition_raises() {
        let err = eval_str("'ab' * 9223372036854775807").unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
        assert_eq!(err.message(), "repeated string is too long");
        assert!(err.is_a("ArithmeticError"));

        let err = eval_str("[1, 2] * 100000000000").unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
        assert_eq!(eval_str("[0] * -3").unwrap(), Value::List(Vec::new()));
        assert_eq!(eval_str("3 * [0]").unwrap(), Value::List(vec![Value::Int(0); 3]));
    }

    #[test]
    fn test_huge_range_raises() {
        let err = eval_str("range(9223372036854775807)").unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
        let err = eval_str("range(-9223372036854775807, 9223372036854775807)").unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
        assert_eq!(eval_str("range(5, 2)").unwrap(), Value::List(Vec::new()));
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval_str("1 / 0").unwrap_err();
        assert_eq!(err.kind(), "ZeroDivisionError");
        assert_eq!(err.message(), "division by zero");
        assert!(err.is_a("ArithmeticError"));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(eval_str("2 ** 64").unwrap_err().kind(), "OverflowError");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval_str("1 < 2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("1 < 3 < 2").unwrap(), Value::Bool(false));
        assert_eq!(eval_str("'a' in 'cat'").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("2 not in [1, 3]").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("'x' in {'x': 1}").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("'a' < 1").unwrap_err().kind(), "TypeError");
        assert_eq!(eval_str("True == 1").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("1 in [True]").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_boolean_operators_return_operands() {
        assert_eq!(eval_str("0 or 'x'").unwrap(), Value::from("x"));
        assert_eq!(eval_str("[] and 1").unwrap(), Value::List(vec![]));
        assert_eq!(eval_str("'a' if False else 'b'").unwrap(), Value::from("b"));
    }

    #[test]
    fn test_indexing_and_methods() {
        assert_eq!(eval_str("[1, 2, 3][-1]").unwrap(), Value::Int(3));
        assert_eq!(eval_str("{'a': 1}['a']").unwrap(), Value::Int(1));
        assert_eq!(eval_str("{'a': 1}['b']").unwrap_err().kind(), "KeyError");
        assert_eq!(eval_str("[1][5]").unwrap_err().kind(), "IndexError");
        assert_eq!(eval_str("'a,b'.split(',')").unwrap(), Value::from(vec!["a", "b"]));
        assert_eq!(eval_str("{'a': 1}.get('b', 2)").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval_str("int('3') + len([1, 2])").unwrap(), Value::Int(5));
        assert_eq!(eval_str("max(1, 5, 3)").unwrap(), Value::Int(5));
        assert_eq!(eval_str("min([4, 2])").unwrap(), Value::Int(2));
        assert_eq!(eval_str("sum(range(4))").unwrap(), Value::Int(6));
        assert_eq!(eval_str("sorted([3, 1, 2])").unwrap(), Value::from(vec![1, 2, 3]));
        assert_eq!(eval_str("str(1.0)").unwrap(), Value::from("1.0"));
        assert_eq!(eval_str("isinstance(KeyError('x'), LookupError)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_name_error() {
        let err = eval_str("undefined_name").unwrap_err();
        assert_eq!(err.kind(), "NameError");
        assert_eq!(err.attr("name"), Some(&Value::from("undefined_name")));
    }

    #[test]
    fn test_mock_absorbs_operations() {
        let mut env = Map::new();
        env.insert("m".into(), Value::Mock(Mock::new()));
        let expr = parse_expression("m.attr[0](1) + 2").unwrap();
        assert!(eval(&expr, &env).unwrap().is_mock());
    }

    #[test]
    fn test_exec_assignments() {
        let mut env = Map::new();
        exec(&parse_program("a, b = 1, 2\nc = a + b").unwrap(), &mut env).unwrap();
        assert_eq!(env["c"], Value::Int(3));

        let err = exec(&parse_program("a, b = [1]").unwrap(), &mut env).unwrap_err();
        assert_eq!(err.kind(), "ValueError");
    }

    #[test]
    fn test_assert() {
        let mut env = Map::new();
        exec(&parse_program("assert 1 == 1").unwrap(), &mut env).unwrap();
        let err = exec(&parse_program("assert 1 == 2, 'nope'").unwrap(), &mut env).unwrap_err();
        assert_eq!(err.kind(), "AssertionError");
        assert_eq!(err.message(), "nope");
    }
}
