use crate::error::SprigError;
use crate::lexer::Token;
use crate::value::{expand_newlines, NativeFn, NativeKind, Value};
use rand::Rng;
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Valid target names for `input` and `convert`.
const VALID_TYPES: [&str; 5] = ["boolean", "bool", "string", "number", "any"];

/// Globally visible native functions, installed once at startup.
pub static FUNCTIONS: &[NativeFn] = &[
    NativeFn {
        name: "clock",
        kind: NativeKind::Function,
        arity: 0,
        func: native_clock,
    },
    NativeFn {
        name: "generateRandomNumber",
        kind: NativeKind::Function,
        arity: 0,
        func: native_random,
    },
    NativeFn {
        name: "print",
        kind: NativeKind::Function,
        arity: -1,
        func: native_print,
    },
    NativeFn {
        name: "println",
        kind: NativeKind::Function,
        arity: -1,
        func: native_println,
    },
    NativeFn {
        name: "len",
        kind: NativeKind::Function,
        arity: 1,
        func: native_len,
    },
    NativeFn {
        name: "input",
        kind: NativeKind::Function,
        arity: -1,
        func: native_input,
    },
    NativeFn {
        name: "sleep",
        kind: NativeKind::Function,
        arity: 1,
        func: native_sleep,
    },
    NativeFn {
        name: "convert",
        kind: NativeKind::Function,
        arity: 2,
        func: native_convert,
    },
    NativeFn {
        name: "type",
        kind: NativeKind::Function,
        arity: 1,
        func: native_type,
    },
    NativeFn {
        name: "callable",
        kind: NativeKind::Function,
        arity: 1,
        func: native_callable,
    },
    NativeFn {
        name: "inherits",
        kind: NativeKind::Function,
        arity: 2,
        func: native_inherits,
    },
    NativeFn {
        name: "instanceof",
        kind: NativeKind::Function,
        arity: 2,
        func: native_instanceof,
    },
];

/// Set methods, reached through the receiver-method protocol: the bound
/// receiver arrives as the first argument, user arguments follow. Arity
/// counts user arguments only.
pub static SET_METHODS: &[NativeFn] = &[
    NativeFn {
        name: "join",
        kind: NativeKind::SetMethod,
        arity: 1,
        func: set_join,
    },
    NativeFn {
        name: "contains",
        kind: NativeKind::SetMethod,
        arity: 1,
        func: set_contains,
    },
    NativeFn {
        name: "sort",
        kind: NativeKind::SetMethod,
        arity: 0,
        func: set_sort,
    },
    NativeFn {
        name: "reverse",
        kind: NativeKind::SetMethod,
        arity: 0,
        func: set_reverse,
    },
    NativeFn {
        name: "push",
        kind: NativeKind::SetMethod,
        arity: 1,
        func: set_push,
    },
    NativeFn {
        name: "pop",
        kind: NativeKind::SetMethod,
        arity: 0,
        func: set_pop,
    },
];

pub static STRING_METHODS: &[NativeFn] = &[
    NativeFn {
        name: "split",
        kind: NativeKind::StringMethod,
        arity: -1,
        func: string_split,
    },
    NativeFn {
        name: "strip",
        kind: NativeKind::StringMethod,
        arity: 0,
        func: string_strip,
    },
    NativeFn {
        name: "replace",
        kind: NativeKind::StringMethod,
        arity: 2,
        func: string_replace,
    },
    NativeFn {
        name: "contains",
        kind: NativeKind::StringMethod,
        arity: 1,
        func: string_contains,
    },
];

pub fn set_method(name: &str) -> Option<&'static NativeFn> {
    SET_METHODS.iter().find(|method| method.name == name)
}

pub fn string_method(name: &str) -> Option<&'static NativeFn> {
    STRING_METHODS.iter().find(|method| method.name == name)
}

fn runtime_error(location: &Token, message: String) -> SprigError {
    SprigError::runtime_error(location.span.clone(), location.line, message)
}

/* --- Global functions --- */

fn native_clock(_args: &[Value], _location: &Token) -> Result<Value, SprigError> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Number(seconds))
}

fn native_random(_args: &[Value], _location: &Token) -> Result<Value, SprigError> {
    Ok(Value::Number(rand::thread_rng().gen::<f64>()))
}

fn joined(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(Value::stringify).collect();
    expand_newlines(parts.join(" ").trim())
}

fn native_print(args: &[Value], _location: &Token) -> Result<Value, SprigError> {
    print!("{}", joined(args));
    io::stdout().flush().ok();
    Ok(Value::Nil)
}

fn native_println(args: &[Value], _location: &Token) -> Result<Value, SprigError> {
    println!("{}", joined(args));
    Ok(Value::Nil)
}

fn native_len(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    match &args[0] {
        Value::Set(elements) => Ok(Value::Number(elements.borrow().len() as f64)),
        Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
        _ => Err(runtime_error(
            location,
            "Function 'len' expected set or string as argument".to_string(),
        )),
    }
}

fn native_input(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    if args.len() > 1 {
        return Err(runtime_error(
            location,
            format!("Expected 0 or 1 arguments but got {} (in 'input').", args.len()),
        ));
    }

    let target = if let Some(arg) = args.first() {
        let target = arg.stringify().to_lowercase();
        if !VALID_TYPES.contains(&target.as_str()) {
            return Err(runtime_error(
                location,
                format!(
                    "'{}' is not a valid type to convert to. \
                     Must be: 'boolean', 'string', 'number' or 'any'.",
                    target
                ),
            ));
        }
        target
    } else {
        "any".to_string()
    };

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok();
    let given = line.trim_end_matches('\n').trim_end_matches('\r').to_string();

    match target.as_str() {
        "boolean" | "bool" => match parse_bool(&given) {
            Some(b) => Ok(Value::Bool(b)),
            None => Err(runtime_error(
                location,
                format!("Cannot convert '{}' to boolean.", given),
            )),
        },
        "string" => Ok(Value::Str(given)),
        "number" => match given.parse::<f64>() {
            Ok(n) => Ok(Value::Number(n)),
            Err(_) => Err(runtime_error(
                location,
                format!("Cannot convert '{}' to number.", given),
            )),
        },
        // Best-effort: boolean forms, then a number, then the raw string
        _ => Ok(match parse_bool(&given) {
            Some(b) => Value::Bool(b),
            None => match given.parse::<f64>() {
                Ok(n) => Value::Number(n),
                Err(_) => Value::Str(given),
            },
        }),
    }
}

fn parse_bool(given: &str) -> Option<bool> {
    match given.to_lowercase().as_str() {
        "t" | "true" | "yes" | "1" => Some(true),
        "f" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn native_sleep(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    match &args[0] {
        Value::Number(millis) => {
            std::thread::sleep(std::time::Duration::from_millis(millis.max(0.0).round() as u64));
            Ok(Value::Nil)
        }
        _ => Err(runtime_error(
            location,
            "Function 'sleep' expected number as argument".to_string(),
        )),
    }
}

fn native_convert(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let given = &args[0];
    let target = args[1].stringify().to_lowercase();
    if !VALID_TYPES.contains(&target.as_str()) {
        return Err(runtime_error(
            location,
            format!(
                "'{}' is not a valid type to convert to. \
                 Must be: 'boolean', 'string' or 'number'.",
                target
            ),
        ));
    }

    let failed = || {
        runtime_error(
            location,
            format!("Failed to convert '{}' to {}", given.stringify(), target),
        )
    };

    if target == "string" {
        return Ok(Value::Str(given.stringify()));
    }

    match given {
        Value::Str(s) => match target.as_str() {
            // Substring containment, as the language defines it: every
            // prefix/infix of "true" converts to true, of "false" to false
            "boolean" => {
                let lowered = s.to_lowercase();
                if "true".contains(&lowered) {
                    Ok(Value::Bool(true))
                } else if "false".contains(&lowered) {
                    Ok(Value::Bool(false))
                } else {
                    Err(failed())
                }
            }
            "number" => s.parse::<f64>().map(Value::Number).map_err(|_| failed()),
            _ => Ok(Value::Str(s.clone())),
        },
        Value::Number(n) => {
            if target == "boolean" {
                Ok(Value::Bool(*n > 0.0))
            } else {
                Ok(Value::Number(*n))
            }
        }
        Value::Bool(b) => {
            if target == "number" {
                Ok(Value::Number(if *b { 1.0 } else { 0.0 }))
            } else {
                Ok(Value::Bool(*b))
            }
        }
        _ => Err(failed()),
    }
}

fn native_type(args: &[Value], _location: &Token) -> Result<Value, SprigError> {
    match &args[0] {
        Value::Nil => Ok(Value::Nil),
        other => Ok(Value::Str(other.type_name().to_string())),
    }
}

fn native_callable(args: &[Value], _location: &Token) -> Result<Value, SprigError> {
    Ok(Value::Bool(args[0].is_callable()))
}

fn native_inherits(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let superior = match &args[1] {
        Value::Class(c) => Rc::clone(c),
        other => {
            return Err(runtime_error(
                location,
                format!("'{}' is not a valid class", other.stringify()),
            ))
        }
    };

    let result = match &args[0] {
        Value::Class(c) => c
            .superclass
            .as_ref()
            .is_some_and(|parent| Rc::ptr_eq(parent, &superior)),
        Value::Instance(i) => i
            .borrow()
            .class
            .superclass
            .as_ref()
            .is_some_and(|parent| Rc::ptr_eq(parent, &superior)),
        _ => false,
    };
    Ok(Value::Bool(result))
}

fn native_instanceof(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let class = match &args[1] {
        Value::Class(c) => Rc::clone(c),
        other => {
            return Err(runtime_error(
                location,
                format!("'{}' is not a valid class", other.stringify()),
            ))
        }
    };

    if let Value::Instance(instance) = &args[0] {
        let mut current = Some(Rc::clone(&instance.borrow().class));
        while let Some(c) = current {
            if Rc::ptr_eq(&c, &class) {
                return Ok(Value::Bool(true));
            }
            current = c.superclass.as_ref().map(Rc::clone);
        }
    }

    Ok(Value::Bool(false))
}

/* --- Set methods --- */

fn receiver_set(
    args: &[Value],
    location: &Token,
) -> Result<Rc<RefCell<Vec<Value>>>, SprigError> {
    match &args[0] {
        Value::Set(elements) => Ok(Rc::clone(elements)),
        other => Err(runtime_error(
            location,
            format!("'{}' is not a set.", other.stringify()),
        )),
    }
}

fn set_join(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let set = receiver_set(args, location)?;
    let delim = match &args[1] {
        Value::Str(s) => s.clone(),
        _ => {
            return Err(runtime_error(
                location,
                "Expected string as argument.".to_string(),
            ))
        }
    };

    let parts: Vec<String> = set.borrow().iter().map(Value::stringify).collect();
    Ok(Value::Str(parts.join(&delim)))
}

fn set_contains(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let set = receiver_set(args, location)?;
    let found = set.borrow().iter().any(|element| element == &args[1]);
    Ok(Value::Bool(found))
}

fn set_sort(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let set = receiver_set(args, location)?;

    for element in set.borrow().iter() {
        if matches!(
            element,
            Value::Class(_)
                | Value::Instance(_)
                | Value::Function(_)
                | Value::Native(_)
                | Value::BoundNative(_)
        ) {
            return Err(runtime_error(
                location,
                "Can't sort functions or classes.".to_string(),
            ));
        }
    }

    set.borrow_mut().sort_by(|a, b| {
        a.weight()
            .partial_cmp(&b.weight())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(Value::Nil)
}

fn set_reverse(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let set = receiver_set(args, location)?;
    set.borrow_mut().reverse();
    Ok(Value::Nil)
}

fn set_push(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let set = receiver_set(args, location)?;
    set.borrow_mut().push(args[1].clone());
    Ok(Value::Nil)
}

fn set_pop(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let set = receiver_set(args, location)?;
    let popped = set.borrow_mut().pop();
    Ok(popped.unwrap_or(Value::Nil))
}

/* --- String methods --- */

fn receiver_string(args: &[Value], location: &Token) -> Result<String, SprigError> {
    match &args[0] {
        Value::Str(s) => Ok(s.clone()),
        other => Err(runtime_error(
            location,
            format!("'{}' is not a string.", other.stringify()),
        )),
    }
}

fn string_split(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let string = receiver_string(args, location)?;

    if args.len() > 2 {
        return Err(runtime_error(
            location,
            format!(
                "Expected 0 or 1 arguments but got {} (in 'split').",
                args.len() - 1
            ),
        ));
    }

    let delim = if let Some(arg) = args.get(1) {
        match arg {
            Value::Str(s) => s.clone(),
            _ => {
                return Err(runtime_error(
                    location,
                    "Expected string as argument.".to_string(),
                ))
            }
        }
    } else {
        " ".to_string()
    };

    let parts: Vec<Value> = string
        .split(delim.as_str())
        .map(|part| Value::Str(part.to_string()))
        .collect();
    Ok(Value::Set(Rc::new(RefCell::new(parts))))
}

fn string_strip(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let string = receiver_string(args, location)?;
    Ok(Value::Str(string.trim().to_string()))
}

fn string_replace(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let string = receiver_string(args, location)?;

    match (&args[1], &args[2]) {
        (Value::Str(from), Value::Str(to)) => Ok(Value::Str(string.replace(from, to))),
        _ => Err(runtime_error(
            location,
            "Expected strings as argument.".to_string(),
        )),
    }
}

fn string_contains(args: &[Value], location: &Token) -> Result<Value, SprigError> {
    let string = receiver_string(args, location)?;

    match &args[1] {
        Value::Str(sub) => Ok(Value::Bool(string.contains(sub))),
        _ => Err(runtime_error(
            location,
            "Expected string as argument.".to_string(),
        )),
    }
}
