use super::expression::{Expression, FunctionDef, Statement};
use crate::error::BehaviorError;
use crate::registry::Arguments;
use crate::value::Value;
use ahash::AHashMap;
use itertools::Itertools;
use std::cmp::Ordering;

// Generates the arithmetic match arm shared by the numeric operators.
macro_rules! eval_op {
    ($self:ident, $l:ident, $r:ident, $op_str:expr, $int_fn:expr, $float_fn:expr) => {{
        let left = $self.evaluate($l)?;
        let right = $self.evaluate($r)?;
        $self.arithmetic(&left, &right, $op_str, $int_fn, $float_fn)
    }};
}

/// Runs one call of a parsed function against its arguments.
pub(super) struct ScriptEngine<'a> {
    function: &'a FunctionDef,
    locals: AHashMap<String, Value>,
}

impl<'a> ScriptEngine<'a> {
    pub(super) fn bind(function: &'a FunctionDef, args: &Arguments) -> Result<Self, BehaviorError> {
        if let Some((unexpected, _)) = args
            .iter()
            .find(|(name, _)| !function.params.iter().any(|p| p.name == *name))
        {
            return Err(BehaviorError::Arity {
                function: function.name.clone(),
                message: format!("got an unexpected keyword argument '{}'", unexpected),
            });
        }

        let mut engine = Self {
            function,
            locals: AHashMap::with_capacity(function.params.len()),
        };
        for param in &function.params {
            let value = match (args.get(&param.name), &param.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => engine.evaluate(default)?,
                (None, None) => {
                    return Err(BehaviorError::Arity {
                        function: function.name.clone(),
                        message: format!("missing required argument '{}'", param.name),
                    });
                }
            };
            engine.locals.insert(param.name.clone(), value);
        }
        Ok(engine)
    }

    /// Executes the body; falling off the end returns `None`.
    pub(super) fn run(mut self) -> Result<Value, BehaviorError> {
        for statement in &self.function.body {
            match statement {
                Statement::Assign(target, expr) => {
                    let value = self.evaluate(expr)?;
                    self.locals.insert(target.clone(), value);
                }
                Statement::Expr(expr) => {
                    self.evaluate(expr)?;
                }
                Statement::Return(expr) => {
                    return match expr {
                        Some(expr) => self.evaluate(expr),
                        None => Ok(Value::Null),
                    };
                }
            }
        }
        Ok(Value::Null)
    }

    fn evaluate(&self, expr: &Expression) -> Result<Value, BehaviorError> {
        match expr {
            // --- Arithmetic ---
            Expression::Sum(l, r) => {
                let left = self.evaluate(l)?;
                let right = self.evaluate(r)?;
                match (&left, &right) {
                    (Value::Text(a), Value::Text(b)) => Ok(Value::Text(format!("{}{}", a, b))),
                    (Value::List(a), Value::List(b)) => {
                        Ok(Value::List(a.iter().chain(b).cloned().collect()))
                    }
                    _ => self.arithmetic(&left, &right, "+", i64::checked_add, |a, b| a + b),
                }
            }
            Expression::Subtract(l, r) => {
                eval_op!(self, l, r, "-", i64::checked_sub, |a, b| a - b)
            }
            Expression::Multiply(l, r) => {
                eval_op!(self, l, r, "*", i64::checked_mul, |a, b| a * b)
            }
            Expression::Divide(l, r) => {
                let left = self.evaluate(l)?;
                let right = self.evaluate(r)?;
                let (a, b) = self.numbers(&left, &right, "/")?;
                if b == 0.0 {
                    return Err(BehaviorError::Custom("division by zero".to_string()));
                }
                Ok(Value::Float(a / b))
            }
            Expression::FloorDivide(l, r) => {
                let left = self.evaluate(l)?;
                let right = self.evaluate(r)?;
                self.check_divisor(&right)?;
                self.arithmetic(&left, &right, "//", floor_div, |a, b| (a / b).floor())
            }
            Expression::Modulo(l, r) => {
                let left = self.evaluate(l)?;
                let right = self.evaluate(r)?;
                self.check_divisor(&right)?;
                self.arithmetic(&left, &right, "%", floor_mod, |a, b| a - b * (a / b).floor())
            }
            Expression::Power(l, r) => {
                let left = self.evaluate(l)?;
                let right = self.evaluate(r)?;
                match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) if *b >= 0 => u32::try_from(*b)
                        .ok()
                        .and_then(|b| a.checked_pow(b))
                        .map(Value::Int)
                        .ok_or_else(|| {
                            BehaviorError::Custom("integer overflow in '**'".to_string())
                        }),
                    _ => {
                        let (a, b) = self.numbers(&left, &right, "**")?;
                        Ok(Value::Float(a.powf(b)))
                    }
                }
            }
            Expression::Negate(v) => match self.evaluate(v)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| {
                        BehaviorError::Custom("integer overflow in unary '-'".to_string())
                    }),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(self.type_mismatch("-", "Number", &other)),
            },

            // --- Logical, Python semantics: the deciding operand is returned ---
            Expression::Not(v) => Ok(Value::Bool(!self.evaluate(v)?.is_truthy())),
            Expression::And(l, r) => {
                let left = self.evaluate(l)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(r)
            }
            Expression::Or(l, r) => {
                let left = self.evaluate(l)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(r)
            }

            // --- Comparison ---
            Expression::Equal(l, r) => Ok(Value::Bool(values_equal(
                &self.evaluate(l)?,
                &self.evaluate(r)?,
            ))),
            Expression::NotEqual(l, r) => Ok(Value::Bool(!values_equal(
                &self.evaluate(l)?,
                &self.evaluate(r)?,
            ))),
            Expression::GreaterThan(l, r) => self.compare(l, r, ">", Ordering::is_gt),
            Expression::GreaterThanOrEqual(l, r) => self.compare(l, r, ">=", Ordering::is_ge),
            Expression::SmallerThan(l, r) => self.compare(l, r, "<", Ordering::is_lt),
            Expression::SmallerThanOrEqual(l, r) => self.compare(l, r, "<=", Ordering::is_le),

            // --- Structure ---
            Expression::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|a| self.evaluate(a))
                    .collect::<Result<Vec<_>, _>>()?;
                call_builtin(name, values)
            }
            Expression::Index(target, index) => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                index_value(&target, &index)
            }
            Expression::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|i| self.evaluate(i))
                    .collect::<Result<_, _>>()?,
            )),
            Expression::Map(entries) => {
                let mut map = std::collections::BTreeMap::new();
                for (k, v) in entries {
                    let key = match self.evaluate(k)? {
                        Value::Text(s) => s,
                        other => return Err(self.type_mismatch("{}", "Text key", &other)),
                    };
                    map.insert(key, self.evaluate(v)?);
                }
                Ok(Value::Map(map))
            }

            // --- Leaves ---
            Expression::Literal(val) => Ok(val.clone()),
            Expression::Variable(name) => self
                .locals
                .get(name)
                .cloned()
                .ok_or_else(|| BehaviorError::UnknownName(name.clone())),
        }
    }

    fn arithmetic<I, F>(
        &self,
        left: &Value,
        right: &Value,
        op: &'static str,
        int_fn: I,
        float_fn: F,
    ) -> Result<Value, BehaviorError>
    where
        I: Fn(i64, i64) -> Option<i64>,
        F: Fn(f64, f64) -> f64,
    {
        if let (Value::Int(a), Value::Int(b)) = (left, right) {
            return int_fn(*a, *b)
                .map(Value::Int)
                .ok_or_else(|| BehaviorError::Custom(format!("integer overflow in '{}'", op)));
        }
        let (a, b) = self.numbers(left, right, op)?;
        Ok(Value::Float(float_fn(a, b)))
    }

    fn numbers(&self, left: &Value, right: &Value, op: &str) -> Result<(f64, f64), BehaviorError> {
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok((a, b)),
            (None, _) => Err(self.type_mismatch(op, "Number", left)),
            (_, None) => Err(self.type_mismatch(op, "Number", right)),
        }
    }

    fn check_divisor(&self, divisor: &Value) -> Result<(), BehaviorError> {
        if divisor.as_f64() == Some(0.0) {
            return Err(BehaviorError::Custom("division by zero".to_string()));
        }
        Ok(())
    }

    fn compare(
        &self,
        l: &Expression,
        r: &Expression,
        op: &str,
        test: fn(Ordering) -> bool,
    ) -> Result<Value, BehaviorError> {
        let left = self.evaluate(l)?;
        let right = self.evaluate(r)?;
        let ordering = match (&left, &right) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => {
                let (a, b) = self.numbers(&left, &right, op)?;
                a.partial_cmp(&b)
                    .ok_or_else(|| self.type_mismatch(op, "comparable Number", &right))?
            }
        };
        Ok(Value::Bool(test(ordering)))
    }

    fn type_mismatch(&self, op: &str, expected: &str, found: &Value) -> BehaviorError {
        BehaviorError::TypeMismatch {
            operation: format!("{} in {}", op, self.function.name),
            expected: expected.to_string(),
            found: format!("{} ({})", found, found.type_name()),
        }
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, BehaviorError> {
    let position = |len: usize, i: i64| -> Result<usize, BehaviorError> {
        let resolved = if i < 0 { i + len as i64 } else { i };
        if resolved < 0 || resolved as usize >= len {
            Err(BehaviorError::Custom(format!("index {} out of range", i)))
        } else {
            Ok(resolved as usize)
        }
    };
    match (target, index) {
        (Value::List(items), Value::Int(i)) => Ok(items[position(items.len(), *i)?].clone()),
        (Value::Text(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Text(chars[position(chars.len(), *i)?].to_string()))
        }
        (Value::Map(fields), Value::Text(key)) => fields
            .get(key)
            .cloned()
            .ok_or_else(|| BehaviorError::Custom(format!("key '{}' not found", key))),
        _ => Err(BehaviorError::TypeMismatch {
            operation: "[]".to_string(),
            expected: "List[Int], Text[Int] or Map[Text]".to_string(),
            found: format!("{}[{}]", target.type_name(), index.type_name()),
        }),
    }
}

fn arity(function: &str, message: &str) -> BehaviorError {
    BehaviorError::Arity {
        function: function.to_string(),
        message: message.to_string(),
    }
}

fn one(name: &str, mut values: Vec<Value>) -> Result<Value, BehaviorError> {
    if values.len() != 1 {
        return Err(arity(name, "takes exactly one argument"));
    }
    Ok(values.remove(0))
}

/// Python-style `str()` rendering.
pub(crate) fn display_text(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

fn call_builtin(name: &str, values: Vec<Value>) -> Result<Value, BehaviorError> {
    let mismatch = |expected: &str, found: &Value| BehaviorError::TypeMismatch {
        operation: name.to_string(),
        expected: expected.to_string(),
        found: format!("{} ({})", found, found.type_name()),
    };

    match name {
        "abs" => match one(name, values)? {
            Value::Int(i) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| BehaviorError::Custom("integer overflow in abs".to_string())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(mismatch("Number", &other)),
        },
        "len" => match one(name, values)? {
            Value::Text(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(l) => Ok(Value::Int(l.len() as i64)),
            Value::Map(m) => Ok(Value::Int(m.len() as i64)),
            other => Err(mismatch("Text, List or Map", &other)),
        },
        "str" => Ok(Value::Text(display_text(&one(name, values)?))),
        "int" => match one(name, values)? {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
            Value::Bool(b) => Ok(Value::Int(b as i64)),
            Value::Text(s) => s
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|_| BehaviorError::Custom(format!("invalid literal for int(): '{}'", s))),
            other => Err(mismatch("Number or Text", &other)),
        },
        "float" => match one(name, values)? {
            Value::Text(s) => s
                .trim()
                .parse()
                .map(Value::Float)
                .map_err(|_| BehaviorError::Custom(format!("could not convert '{}' to float", s))),
            Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
            other => other
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| mismatch("Number or Text", &other)),
        },
        "round" => {
            let mut values = values.into_iter();
            let number = values.next().ok_or_else(|| arity(name, "takes one or two arguments"))?;
            let digits = values.next();
            if values.next().is_some() {
                return Err(arity(name, "takes one or two arguments"));
            }
            let x = number.as_f64().ok_or_else(|| mismatch("Number", &number))?;
            match digits {
                None => Ok(Value::Int(round_half_even(x) as i64)),
                Some(Value::Int(d)) => {
                    let factor = 10f64.powi(d as i32);
                    Ok(Value::Float(round_half_even(x * factor) / factor))
                }
                Some(other) => Err(mismatch("Int", &other)),
            }
        }
        "min" | "max" => {
            let items = if values.len() == 1 {
                match values.into_iter().next() {
                    Some(Value::List(items)) => items,
                    Some(other) => return Err(mismatch("List", &other)),
                    None => Vec::new(),
                }
            } else {
                values
            };
            let mut best: Option<Value> = None;
            for item in items {
                let x = item.as_f64().ok_or_else(|| mismatch("Number", &item))?;
                let better = match &best {
                    None => true,
                    Some(current) => {
                        let c = current.as_f64().unwrap_or(f64::NAN);
                        if name == "min" { x < c } else { x > c }
                    }
                };
                if better {
                    best = Some(item);
                }
            }
            best.ok_or_else(|| arity(name, "arg is an empty sequence"))
        }
        "sum" => match one(name, values)? {
            Value::List(items) => items.iter().try_fold(Value::Int(0), |acc, item| {
                match (&acc, item) {
                    (Value::Int(a), Value::Int(b)) => a
                        .checked_add(*b)
                        .map(Value::Int)
                        .ok_or_else(|| {
                            BehaviorError::Custom("integer overflow in sum".to_string())
                        }),
                    _ => {
                        let a = acc.as_f64().ok_or_else(|| mismatch("Number", &acc))?;
                        let b = item.as_f64().ok_or_else(|| mismatch("Number", item))?;
                        Ok(Value::Float(a + b))
                    }
                }
            }),
            other => Err(mismatch("List", &other)),
        },
        "print" => {
            println!("{}", values.iter().map(display_text).join(" "));
            Ok(Value::Null)
        }
        _ => Err(BehaviorError::UnknownName(name.to_string())),
    }
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}
