//! Baseline library surface, installed as ordinary bindings.
//!
//! Sandboxed states get pure computation only: `type`, `tostring`,
//! `tonumber`, `assert`, `error`, `math.*`, `string.*`. Unrestricted
//! states add the process-facing bits: `print` and `os.*`. Nothing here
//! has a bypass variant; the surface is decided once, at init.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tarn_lang::{Key, Meter, Table, Value};

use crate::bridge::{wrap_pure, HostError, HostResult};
use crate::state::{Mode, State};

pub(crate) fn globals_for(mode: Mode) -> Table {
    let mut globals = Table::new();

    globals.insert(
        Key::str("type"),
        pure("type", mode, |_, args, _| {
            Ok(Value::str(arg(args, 0).type_name()))
        }),
    );
    globals.insert(
        Key::str("tostring"),
        pure("tostring", mode, |_, args, _| {
            Ok(Value::from(arg(args, 0).to_string()))
        }),
    );
    globals.insert(
        Key::str("tonumber"),
        pure("tonumber", mode, |_, args, _| {
            Ok(match arg(args, 0) {
                Value::Number(n) => Value::Number(n),
                Value::Str(s) => match s.trim().parse::<f64>() {
                    Ok(n) => Value::Number(n),
                    Err(_) => Value::Nil,
                },
                _ => Value::Nil,
            })
        }),
    );
    globals.insert(
        Key::str("assert"),
        pure("assert", mode, |_, args, _| {
            let v = arg(args, 0);
            if v.truthy() {
                Ok(v)
            } else {
                let message = match arg(args, 1) {
                    Value::Nil => "assertion failed!".to_string(),
                    other => other.to_string(),
                };
                Err(HostError::Failed(message))
            }
        }),
    );
    globals.insert(
        Key::str("error"),
        pure("error", mode, |_, args, _| {
            Err::<Value, _>(HostError::Failed(arg(args, 0).to_string()))
        }),
    );

    globals.insert(Key::str("math"), Value::Table(math_table(mode)));
    globals.insert(Key::str("string"), Value::Table(string_table(mode)));

    if mode == Mode::Unrestricted {
        globals.insert(
            Key::str("print"),
            pure("print", mode, |_, args, _| {
                let line: Vec<String> = args.iter().map(Value::to_string).collect();
                println!("{}", line.join("\t"));
                Ok(Value::Nil)
            }),
        );
        globals.insert(Key::str("os"), Value::Table(os_table(mode)));
    }

    globals
}

fn math_table(mode: Mode) -> Table {
    let mut math = Table::new();
    math.insert(Key::str("pi"), Value::Number(std::f64::consts::PI));
    math.insert(Key::str("huge"), Value::Number(f64::INFINITY));
    math.insert(
        Key::str("floor"),
        pure("math.floor", mode, |_, args, _| {
            Ok(Value::Number(num("math.floor", args, 0)?.floor()))
        }),
    );
    math.insert(
        Key::str("ceil"),
        pure("math.ceil", mode, |_, args, _| {
            Ok(Value::Number(num("math.ceil", args, 0)?.ceil()))
        }),
    );
    math.insert(
        Key::str("abs"),
        pure("math.abs", mode, |_, args, _| {
            Ok(Value::Number(num("math.abs", args, 0)?.abs()))
        }),
    );
    math.insert(
        Key::str("sqrt"),
        pure("math.sqrt", mode, |_, args, _| {
            Ok(Value::Number(num("math.sqrt", args, 0)?.sqrt()))
        }),
    );
    math.insert(
        Key::str("min"),
        pure("math.min", mode, |_, args, _| fold("math.min", args, f64::min)),
    );
    math.insert(
        Key::str("max"),
        pure("math.max", mode, |_, args, _| fold("math.max", args, f64::max)),
    );
    math
}

fn string_table(mode: Mode) -> Table {
    let mut string = Table::new();
    string.insert(
        Key::str("upper"),
        pure("string.upper", mode, |_, args, _| {
            Ok(Value::from(text("string.upper", args, 0)?.to_uppercase()))
        }),
    );
    string.insert(
        Key::str("lower"),
        pure("string.lower", mode, |_, args, _| {
            Ok(Value::from(text("string.lower", args, 0)?.to_lowercase()))
        }),
    );
    string.insert(
        Key::str("len"),
        pure("string.len", mode, |_, args, _| {
            Ok(Value::Number(text("string.len", args, 0)?.chars().count() as f64))
        }),
    );
    string.insert(
        Key::str("rep"),
        pure("string.rep", mode, |_, args, _| {
            let s = text("string.rep", args, 0)?;
            let n = num("string.rep", args, 1)?.max(0.0) as usize;
            Ok(Value::from(s.repeat(n)))
        }),
    );
    string.insert(
        Key::str("sub"),
        pure("string.sub", mode, |_, args, _| {
            let s = text("string.sub", args, 0)?;
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let i = match args.get(1) {
                Some(Value::Number(n)) => *n as i64,
                _ => 1,
            };
            let j = match args.get(2) {
                Some(Value::Number(n)) => *n as i64,
                _ => -1,
            };
            // 1-based inclusive bounds; negative indices count from the end.
            let from = if i < 0 { (len + i + 1).max(1) } else { i.max(1) };
            let to = if j < 0 { len + j + 1 } else { j.min(len) };
            if from > to {
                return Ok(Value::str(""));
            }
            let slice: String = chars[(from - 1) as usize..to as usize].iter().collect();
            Ok(Value::from(slice))
        }),
    );
    string
}

fn os_table(mode: Mode) -> Table {
    let mut os = Table::new();
    os.insert(
        Key::str("time"),
        pure("os.time", mode, |_, _, _| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| HostError::Failed(format!("os.time: {e}")))?;
            Ok(Value::Number(now.as_secs_f64().floor()))
        }),
    );
    os.insert(
        Key::str("clock"),
        pure("os.clock", mode, |_, _, _| {
            static START: OnceLock<Instant> = OnceLock::new();
            let start = START.get_or_init(Instant::now);
            Ok(Value::Number(start.elapsed().as_secs_f64()))
        }),
    );
    os.insert(
        Key::str("getenv"),
        pure("os.getenv", mode, |_, args, _| {
            let name = text("os.getenv", args, 0)?;
            Ok(match std::env::var(&name) {
                Ok(v) => Value::from(v),
                Err(_) => Value::Nil,
            })
        }),
    );
    os
}

fn pure<F>(name: &str, mode: Mode, f: F) -> Value
where
    F: Fn(&State, &[Value], &mut Meter) -> HostResult<Value> + Send + Sync + 'static,
{
    Value::Native(wrap_pure(name, mode, f))
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Nil)
}

fn num(name: &str, args: &[Value], i: usize) -> HostResult<f64> {
    match args.get(i) {
        Some(Value::Number(n)) => Ok(*n),
        other => Err(HostError::Failed(format!(
            "{name}: argument {} must be a number, got {}",
            i + 1,
            other.map_or("no value", |v| v.type_name())
        ))),
    }
}

fn text(name: &str, args: &[Value], i: usize) -> HostResult<String> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(Value::Number(n)) => Ok(Value::Number(*n).to_string()),
        other => Err(HostError::Failed(format!(
            "{name}: argument {} must be a string, got {}",
            i + 1,
            other.map_or("no value", |v| v.type_name())
        ))),
    }
}

fn fold(name: &str, args: &[Value], op: fn(f64, f64) -> f64) -> HostResult<Value> {
    let mut acc: Option<f64> = None;
    for i in 0..args.len() {
        let n = num(name, args, i)?;
        acc = Some(match acc {
            Some(a) => op(a, n),
            None => n,
        });
    }
    match acc {
        Some(n) => Ok(Value::Number(n)),
        None => Err(HostError::Failed(format!("{name}: expected at least one number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_lang::Budget;

    fn eval(state: &State, source: &str) -> Value {
        state.evaluate(source, Budget::Unlimited).unwrap()
    }

    #[test]
    fn type_and_tostring() {
        let s = State::sandboxed();
        assert_eq!(eval(&s, "return type(1)"), Value::str("number"));
        assert_eq!(eval(&s, "return type(nil)"), Value::str("nil"));
        assert_eq!(eval(&s, "return type({})"), Value::str("table"));
        assert_eq!(eval(&s, "return tostring(1.5)"), Value::str("1.5"));
        assert_eq!(eval(&s, "return tostring(true)"), Value::str("true"));
    }

    #[test]
    fn tonumber_parses_or_returns_nil() {
        let s = State::sandboxed();
        assert_eq!(eval(&s, "return tonumber('42')"), Value::from(42));
        assert_eq!(eval(&s, "return tonumber(' 2.5 ')"), Value::from(2.5));
        assert_eq!(eval(&s, "return tonumber('nope')"), Value::Nil);
        assert_eq!(eval(&s, "return tonumber({})"), Value::Nil);
    }

    #[test]
    fn assert_passes_through_or_fails() {
        let s = State::sandboxed();
        assert_eq!(eval(&s, "return assert(7)"), Value::from(7));
        let err = s
            .evaluate("assert(false, 'broken invariant')", Budget::Unlimited)
            .unwrap_err();
        assert!(err.to_string().contains("broken invariant"));
    }

    #[test]
    fn error_raises_a_runtime_failure() {
        let s = State::sandboxed();
        let err = s.evaluate("error('oops')", Budget::Unlimited).unwrap_err();
        assert!(err.to_string().contains("oops"));
        assert!(!err.is_resource_exhausted());
    }

    #[test]
    fn math_functions() {
        let s = State::sandboxed();
        assert_eq!(eval(&s, "return math.floor(3.7)"), Value::from(3));
        assert_eq!(eval(&s, "return math.ceil(3.2)"), Value::from(4));
        assert_eq!(eval(&s, "return math.abs(-5)"), Value::from(5));
        assert_eq!(eval(&s, "return math.sqrt(81)"), Value::from(9));
        assert_eq!(eval(&s, "return math.max(1, 9, 4)"), Value::from(9));
        assert_eq!(eval(&s, "return math.min(1, 9, 4)"), Value::from(1));
        assert_eq!(eval(&s, "return math.pi > 3.14"), Value::Bool(true));
    }

    #[test]
    fn string_functions() {
        let s = State::sandboxed();
        assert_eq!(eval(&s, "return string.upper('hello')"), Value::str("HELLO"));
        assert_eq!(eval(&s, "return string.lower('HELLO')"), Value::str("hello"));
        assert_eq!(eval(&s, "return string.len('abc')"), Value::from(3));
        assert_eq!(eval(&s, "return string.rep('ab', 3)"), Value::str("ababab"));
        assert_eq!(eval(&s, "return string.sub('hello', 2, 4)"), Value::str("ell"));
        assert_eq!(eval(&s, "return string.sub('hello', -3)"), Value::str("llo"));
        assert_eq!(eval(&s, "return string.sub('hello', 4, 2)"), Value::str(""));
    }

    #[test]
    fn os_is_only_unrestricted() {
        let sandboxed = State::sandboxed();
        let err = sandboxed
            .evaluate("return os.time()", Budget::Unlimited)
            .unwrap_err();
        assert!(err.to_string().contains("attempt to"), "{err}");

        let unrestricted = State::unrestricted();
        match eval(&unrestricted, "return os.time()") {
            Value::Number(n) => assert!(n > 1.0e9),
            other => panic!("expected a timestamp, got {other:?}"),
        }
    }
}
