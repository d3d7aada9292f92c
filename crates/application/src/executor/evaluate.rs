use chrono::FixedOffset;
use querylens_core::{AppError, AppResult};
use querylens_domain::BinaryOperatorKind;
use serde_json::Value;

use super::functions;
use super::values::{aggregate, arithmetic, collection, compare, has_flag, negate, truthy, values_equal};
use crate::expression::Expr;
use crate::wrappers::Row;

/// What a variable is bound to while evaluating.
#[derive(Debug, Clone, Copy)]
pub(super) enum Binding<'a> {
    Row(&'a Row),
    Value(&'a Value),
}

impl Binding<'_> {
    fn property(self, name: &str) -> AppResult<Value> {
        match self {
            Self::Row(row) => Ok(row.property(name).unwrap_or(Value::Null)),
            Self::Value(value) => member_of(value, name),
        }
    }

    fn to_value(self) -> Value {
        match self {
            Self::Row(row) => row.to_value(),
            Self::Value(value) => value.clone(),
        }
    }
}

/// Lexical variable scope; lambdas push a child scope.
pub(super) struct Scope<'a> {
    name: &'a str,
    binding: Binding<'a>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub(super) fn root(name: &'a str, binding: Binding<'a>) -> Self {
        Self {
            name,
            binding,
            parent: None,
        }
    }

    fn child<'c>(&'c self, name: &'c str, binding: Binding<'c>) -> Scope<'c> {
        Scope {
            name,
            binding,
            parent: Some(self),
        }
    }

    fn lookup(&self, name: &str) -> AppResult<Binding<'a>> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.name == name {
                return Ok(current.binding);
            }
            scope = current.parent;
        }

        Err(AppError::Internal(format!("unbound variable '{name}'")))
    }
}

fn member_of(value: &Value, name: &str) -> AppResult<Value> {
    match value {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Null => Err(AppError::Internal(format!(
            "property '{name}' read from a null instance"
        ))),
        other => Err(AppError::Internal(format!(
            "property '{name}' read from non-structured value '{other}'"
        ))),
    }
}

/// Interprets expression trees against rows.
#[derive(Debug, Clone)]
pub(super) struct Evaluator {
    time_zone: FixedOffset,
}

impl Evaluator {
    pub(super) fn new(time_zone: FixedOffset) -> Self {
        Self { time_zone }
    }

    /// Evaluates `expression` with `variable` bound to `row`.
    pub(super) fn evaluate_row(&self, expression: &Expr, variable: &str, row: &Row) -> AppResult<Value> {
        self.evaluate(expression, &Scope::root(variable, Binding::Row(row)))
    }

    pub(super) fn test_row(&self, expression: &Expr, variable: &str, row: &Row) -> AppResult<bool> {
        self.evaluate_row(expression, variable, row)
            .map(|value| truthy(&value))
    }

    pub(super) fn evaluate(&self, expression: &Expr, scope: &Scope<'_>) -> AppResult<Value> {
        match expression {
            Expr::Constant { value } => Ok(value.clone()),
            Expr::Parameter { name } => scope.lookup(name).map(Binding::to_value),
            Expr::Member { source, name } => match source.as_ref() {
                Expr::Parameter { name: variable } => scope.lookup(variable)?.property(name),
                source => member_of(&self.evaluate(source, scope)?, name),
            },
            Expr::Binary {
                operator,
                left,
                right,
                lifted,
            } => self.binary(*operator, left, right, *lifted, scope),
            Expr::Not { operand } => {
                let value = self.evaluate(operand, scope)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Bool(!truthy(&value)))
            }
            Expr::Negate { operand } => negate(&self.evaluate(operand, scope)?),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                if truthy(&self.evaluate(test, scope)?) {
                    self.evaluate(if_true, scope)
                } else {
                    self.evaluate(if_false, scope)
                }
            }
            Expr::IsNull { operand } => Ok(Value::Bool(self.evaluate(operand, scope)?.is_null())),
            Expr::Call {
                function,
                arguments,
            } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.evaluate(argument, scope))
                    .collect::<AppResult<Vec<_>>>()?;
                functions::call(*function, &arguments, self.time_zone)
            }
            Expr::Any {
                source,
                variable,
                body,
            } => {
                let items = collection(self.evaluate(source, scope)?)?;
                let Some(body) = body else {
                    return Ok(Value::Bool(!items.is_empty()));
                };
                for item in &items {
                    let inner = scope.child(variable, Binding::Value(item));
                    if truthy(&self.evaluate(body, &inner)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::All {
                source,
                variable,
                body,
            } => {
                let items = collection(self.evaluate(source, scope)?)?;
                for item in &items {
                    let inner = scope.child(variable, Binding::Value(item));
                    if !truthy(&self.evaluate(body, &inner)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::In { item, collection: candidates } => {
                let item = self.evaluate(item, scope)?;
                let candidates = collection(self.evaluate(candidates, scope)?)?;
                Ok(Value::Bool(
                    candidates
                        .iter()
                        .any(|candidate| values_equal(&item, candidate)),
                ))
            }
            Expr::CollectionCount { source } => match self.evaluate(source, scope)? {
                Value::Null => Ok(Value::Null),
                value => Ok(Value::from(collection(value)?.len())),
            },
            Expr::Aggregate {
                source,
                variable,
                function,
                body,
            } => {
                let items = collection(self.evaluate(source, scope)?)?;
                let values = match body {
                    Some(body) => items
                        .iter()
                        .map(|item| self.evaluate(body, &scope.child(variable, Binding::Value(item))))
                        .collect::<AppResult<Vec<_>>>()?,
                    None => items,
                };
                Ok(aggregate(*function, values))
            }
        }
    }

    fn binary(
        &self,
        operator: BinaryOperatorKind,
        left: &Expr,
        right: &Expr,
        lifted: bool,
        scope: &Scope<'_>,
    ) -> AppResult<Value> {
        match operator {
            BinaryOperatorKind::And => {
                if !truthy(&self.evaluate(left, scope)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&self.evaluate(right, scope)?)))
            }
            BinaryOperatorKind::Or => {
                if truthy(&self.evaluate(left, scope)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&self.evaluate(right, scope)?)))
            }
            BinaryOperatorKind::Has => {
                let value = self.evaluate(left, scope)?;
                let flag = self.evaluate(right, scope)?;
                Ok(Value::Bool(has_flag(&value, &flag)))
            }
            operator if operator.is_arithmetic() => {
                let left = self.evaluate(left, scope)?;
                let right = self.evaluate(right, scope)?;
                arithmetic(operator, &left, &right, lifted)
            }
            operator => {
                let left = self.evaluate(left, scope)?;
                let right = self.evaluate(right, scope)?;
                Ok(Value::Bool(compare(operator, &left, &right)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;
    use querylens_core::AppError;
    use querylens_domain::BinaryOperatorKind;
    use serde_json::{Value, json};

    use super::Evaluator;
    use crate::expression::{AggregateFunction, Expr};
    use crate::wrappers::Row;

    fn evaluator() -> Evaluator {
        Evaluator::new(FixedOffset::east_opt(0).unwrap_or_else(|| unreachable!()))
    }

    fn dave() -> Row {
        Row::Instance(json!({
            "Name": "Dave",
            "Address": null,
            "Orders": [{ "Amount": 7.0 }, { "Amount": 3.0 }],
        }))
    }

    #[test]
    fn null_member_access_fails_without_a_guard() {
        let expression = Expr::member(Expr::member(Expr::parameter("$it"), "Address"), "City");

        assert!(matches!(
            evaluator().evaluate_row(&expression, "$it", &dave()),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn guarded_member_access_yields_null() {
        let address = Expr::member(Expr::parameter("$it"), "Address");
        let expression = Expr::conditional(
            Expr::is_null(address.clone()),
            Expr::constant(Value::Null),
            Expr::member(address, "City"),
        );

        let value = evaluator()
            .evaluate_row(&expression, "$it", &dave())
            .unwrap_or_else(|_| unreachable!());
        assert!(value.is_null());
    }

    #[test]
    fn lambda_variables_shadow_outer_scope() {
        let orders = Expr::member(Expr::parameter("$it"), "Orders");
        let expression = Expr::Any {
            source: Box::new(orders.clone()),
            variable: "o".to_owned(),
            body: Some(Box::new(Expr::binary(
                BinaryOperatorKind::GreaterThan,
                Expr::member(Expr::parameter("o"), "Amount"),
                Expr::constant(json!(5)),
                false,
            ))),
        };
        let total = Expr::Aggregate {
            source: Box::new(orders),
            variable: "o".to_owned(),
            function: AggregateFunction::Sum,
            body: Some(Box::new(Expr::member(Expr::parameter("o"), "Amount"))),
        };

        assert!(
            evaluator()
                .test_row(&expression, "$it", &dave())
                .unwrap_or_else(|_| unreachable!())
        );
        assert_eq!(
            evaluator()
                .evaluate_row(&total, "$it", &dave())
                .unwrap_or_else(|_| unreachable!()),
            json!(10.0)
        );
    }

    #[test]
    fn logical_operators_short_circuit_on_null() {
        let expression = Expr::binary(
            BinaryOperatorKind::And,
            Expr::member(Expr::parameter("$it"), "Address"),
            Expr::member(Expr::member(Expr::parameter("$it"), "Address"), "City"),
            false,
        );

        assert!(
            !evaluator()
                .test_row(&expression, "$it", &dave())
                .unwrap_or_else(|_| unreachable!())
        );
    }
}
