//! Tree-walking interpreter over [`Program`]

use serde_json::{Map, Value};

use super::ast::{BinaryOp, Expr, Program, TemplatePart, UnaryOp};
use super::builtins;
use crate::domain::expression::{is_truthy, ExpressionError};

/// Evaluation scope: caller bindings plus script-local declarations
pub struct Interpreter<'a> {
    bindings: &'a Map<String, Value>,
    locals: Map<String, Value>,
}

impl<'a> Interpreter<'a> {
    pub fn new(bindings: &'a Map<String, Value>) -> Self {
        Self {
            bindings,
            locals: Map::new(),
        }
    }

    pub fn run(mut self, program: &Program) -> Result<Value, ExpressionError> {
        for (name, expr) in &program.bindings {
            let value = self.eval(expr)?;
            self.locals.insert(name.clone(), value);
        }
        self.eval(&program.result)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals.get(name).or_else(|| self.bindings.get(name))
    }

    fn eval(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self
                .lookup(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone())),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => out.push_str(&builtins::to_display(&self.eval(expr)?)),
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Array(items) => Ok(Value::Array(
                items.iter().map(|e| self.eval(e)).collect::<Result<_, _>>()?,
            )),
            Expr::Object(fields) => {
                let fields = fields
                    .iter()
                    .map(|(k, e)| Ok((k.clone(), self.eval(e)?)))
                    .collect::<Result<Vec<_>, ExpressionError>>()?;
                Ok(builtins::object(fields))
            }
            Expr::Member(target, name) => builtins::member(&self.eval(target)?, name),
            Expr::Index(target, key) => builtins::index(&self.eval(target)?, &self.eval(key)?),
            Expr::Call(callee, args) => self.call(callee, args),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!is_truthy(&value)),
                    UnaryOp::Neg => builtins::number(-builtins::to_number(&value)),
                    UnaryOp::Plus => builtins::number(builtins::to_number(&value)),
                    UnaryOp::TypeOf => Value::String(builtins::type_of(&value).to_string()),
                })
            }
            Expr::Binary(op, left, right) => self.binary(*op, left, right),
            Expr::Conditional(test, then, otherwise) => {
                if is_truthy(&self.eval(test)?) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn call(&self, callee: &Expr, args: &[Expr]) -> Result<Value, ExpressionError> {
        let args = args
            .iter()
            .map(|a| self.eval(a))
            .collect::<Result<Vec<_>, _>>()?;

        match callee {
            Expr::Member(target, method) => {
                if let Expr::Ident(namespace) = target.as_ref() {
                    if self.lookup(namespace).is_none() {
                        if let Some(result) = builtins::call_namespace(namespace, method, &args) {
                            return result;
                        }
                    }
                }
                builtins::call_method(&self.eval(target)?, method, &args)
            }
            Expr::Ident(name) => builtins::call_function(name, &args),
            _ => Err(ExpressionError::UnsupportedCall(
                "call of a computed value".to_string(),
            )),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, ExpressionError> {
        let lhs = self.eval(left)?;
        match op {
            BinaryOp::And if !is_truthy(&lhs) => return Ok(lhs),
            BinaryOp::Or if is_truthy(&lhs) => return Ok(lhs),
            BinaryOp::Nullish if !lhs.is_null() => return Ok(lhs),
            _ => {}
        }

        let rhs = self.eval(right)?;
        let num = |f: fn(f64, f64) -> f64| {
            builtins::number(f(builtins::to_number(&lhs), builtins::to_number(&rhs)))
        };
        let ordered = |accept: fn(std::cmp::Ordering) -> bool| {
            Value::Bool(builtins::compare(&lhs, &rhs).is_some_and(accept))
        };

        Ok(match op {
            BinaryOp::Add => builtins::add(&lhs, &rhs),
            BinaryOp::Sub => num(|a, b| a - b),
            BinaryOp::Mul => num(|a, b| a * b),
            BinaryOp::Div => num(|a, b| a / b),
            BinaryOp::Rem => num(|a, b| a % b),
            BinaryOp::StrictEq => Value::Bool(builtins::strict_equals(&lhs, &rhs)),
            BinaryOp::StrictNe => Value::Bool(!builtins::strict_equals(&lhs, &rhs)),
            BinaryOp::Eq => Value::Bool(builtins::loose_equals(&lhs, &rhs)),
            BinaryOp::Ne => Value::Bool(!builtins::loose_equals(&lhs, &rhs)),
            BinaryOp::Lt => ordered(|o| o.is_lt()),
            BinaryOp::Le => ordered(|o| o.is_le()),
            BinaryOp::Gt => ordered(|o| o.is_gt()),
            BinaryOp::Ge => ordered(|o| o.is_ge()),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => rhs.clone(),
        })
    }
}
