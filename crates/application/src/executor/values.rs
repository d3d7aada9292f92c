use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use querylens_core::{AppError, AppResult};
use querylens_domain::BinaryOperatorKind;
use serde_json::Value;

use crate::expression::AggregateFunction;

pub(super) fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

pub(super) fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

pub(super) fn collection(value: Value) -> AppResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(AppError::Internal(format!(
            "expected a collection but found '{other}'"
        ))),
    }
}

fn timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

pub(super) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => match (left.as_i64(), right.as_i64()) {
            (Some(left), Some(right)) => left == right,
            _ => left.as_f64() == right.as_f64(),
        },
        (Value::String(left), Value::String(right)) => match (timestamp(left), timestamp(right)) {
            (Some(left), Some(right)) => left == right,
            _ => left == right,
        },
        _ => left == right,
    }
}

pub(super) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => match (left.as_i64(), right.as_i64()) {
            (Some(left), Some(right)) => Some(left.cmp(&right)),
            _ => left
                .as_f64()
                .zip(right.as_f64())
                .and_then(|(left, right)| left.partial_cmp(&right)),
        },
        (Value::String(left), Value::String(right)) => match (timestamp(left), timestamp(right)) {
            (Some(left), Some(right)) => Some(left.cmp(&right)),
            _ => Some(left.cmp(right)),
        },
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

/// Total order used for sorting: nulls first, incomparable values equal.
pub(super) fn order_values(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
    }
}

pub(super) fn compare(operator: BinaryOperatorKind, left: &Value, right: &Value) -> bool {
    match operator {
        BinaryOperatorKind::Equal => values_equal(left, right),
        BinaryOperatorKind::NotEqual => !values_equal(left, right),
        _ => {
            if left.is_null() || right.is_null() {
                return false;
            }
            let Some(ordering) = compare_values(left, right) else {
                return false;
            };
            match operator {
                BinaryOperatorKind::GreaterThan => ordering.is_gt(),
                BinaryOperatorKind::GreaterThanOrEqual => ordering.is_ge(),
                BinaryOperatorKind::LessThan => ordering.is_lt(),
                BinaryOperatorKind::LessThanOrEqual => ordering.is_le(),
                _ => false,
            }
        }
    }
}

pub(super) fn has_flag(value: &Value, flag: &Value) -> bool {
    let (Some(value), Some(flag)) = (value.as_str(), flag.as_str()) else {
        return false;
    };

    value
        .split(',')
        .map(str::trim)
        .any(|member| member.eq_ignore_ascii_case(flag.trim()))
}

pub(super) fn arithmetic(
    operator: BinaryOperatorKind,
    left: &Value,
    right: &Value,
    lifted: bool,
) -> AppResult<Value> {
    if left.is_null() || right.is_null() {
        if lifted {
            return Ok(Value::Null);
        }
        return Err(AppError::Internal(format!(
            "operator '{}' applied to a null operand",
            operator.as_str()
        )));
    }

    if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
        let result = match operator {
            BinaryOperatorKind::Add => left.checked_add(right),
            BinaryOperatorKind::Subtract => left.checked_sub(right),
            BinaryOperatorKind::Multiply => left.checked_mul(right),
            BinaryOperatorKind::Divide | BinaryOperatorKind::Modulo if right == 0 => {
                return Err(AppError::Internal("division by zero".to_owned()));
            }
            BinaryOperatorKind::Divide => left.checked_div(right),
            BinaryOperatorKind::Modulo => left.checked_rem(right),
            _ => None,
        };
        if let Some(result) = result {
            return Ok(Value::from(result));
        }
    }

    let (Some(left), Some(right)) = (left.as_f64(), right.as_f64()) else {
        return Err(AppError::Internal(format!(
            "operator '{}' requires numeric operands",
            operator.as_str()
        )));
    };

    let result = match operator {
        BinaryOperatorKind::Add => left + right,
        BinaryOperatorKind::Subtract => left - right,
        BinaryOperatorKind::Multiply => left * right,
        BinaryOperatorKind::Divide => left / right,
        BinaryOperatorKind::Modulo => left % right,
        other => {
            return Err(AppError::Internal(format!(
                "operator '{}' is not arithmetic",
                other.as_str()
            )));
        }
    };

    Ok(number(result))
}

pub(super) fn negate(value: &Value) -> AppResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(integer) = value.as_i64().and_then(i64::checked_neg) {
        return Ok(Value::from(integer));
    }

    value.as_f64().map(|float| number(-float)).ok_or_else(|| {
        AppError::Internal(format!("cannot negate non-numeric value '{value}'"))
    })
}

pub(super) fn aggregate(function: AggregateFunction, values: Vec<Value>) -> Value {
    let present: Vec<Value> = values.into_iter().filter(|value| !value.is_null()).collect();

    match function {
        AggregateFunction::Count => Value::from(present.len()),
        AggregateFunction::CountDistinct => {
            let distinct: HashSet<String> = present.iter().map(Value::to_string).collect();
            Value::from(distinct.len())
        }
        AggregateFunction::Sum => {
            if present.iter().all(Value::is_i64) {
                let total = present
                    .iter()
                    .filter_map(Value::as_i64)
                    .try_fold(0_i64, i64::checked_add);
                if let Some(total) = total {
                    return Value::from(total);
                }
            }
            number(present.iter().filter_map(Value::as_f64).sum())
        }
        AggregateFunction::Average => {
            let numbers: Vec<f64> = present.iter().filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            let count = numbers.len() as f64;
            number(numbers.into_iter().sum::<f64>() / count)
        }
        AggregateFunction::Min => present
            .into_iter()
            .min_by(order_values)
            .unwrap_or(Value::Null),
        AggregateFunction::Max => present
            .into_iter()
            .max_by(order_values)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use querylens_domain::BinaryOperatorKind;
    use serde_json::json;

    use super::{aggregate, arithmetic, compare, has_flag, order_values};
    use crate::expression::AggregateFunction;

    #[test]
    fn timestamps_compare_as_instants() {
        assert!(compare(
            BinaryOperatorKind::Equal,
            &json!("2024-01-01T10:00:00+02:00"),
            &json!("2024-01-01T08:00:00Z")
        ));
        assert!(compare(
            BinaryOperatorKind::LessThan,
            &json!("2024-01-01T10:00:00+05:00"),
            &json!("2024-01-01T08:00:00Z")
        ));
    }

    #[test]
    fn null_sorts_first_and_never_compares_ordered() {
        assert_eq!(order_values(&json!(null), &json!(1)), Ordering::Less);
        assert!(!compare(BinaryOperatorKind::GreaterThan, &json!(null), &json!(1)));
        assert!(compare(BinaryOperatorKind::Equal, &json!(null), &json!(null)));
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let value = arithmetic(BinaryOperatorKind::Divide, &json!(7), &json!(2), false)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(value, json!(3));

        let value = arithmetic(BinaryOperatorKind::Add, &json!(1.5), &json!(2), false)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(value, json!(3.5));
    }

    #[test]
    fn lifted_arithmetic_with_null_yields_null() {
        let value = arithmetic(BinaryOperatorKind::Add, &json!(null), &json!(2), true)
            .unwrap_or_else(|_| unreachable!());
        assert!(value.is_null());
        assert!(arithmetic(BinaryOperatorKind::Add, &json!(null), &json!(2), false).is_err());
    }

    #[test]
    fn aggregates_skip_nulls() {
        let values = vec![json!(2), json!(null), json!(4)];

        assert_eq!(aggregate(AggregateFunction::Sum, values.clone()), json!(6));
        assert_eq!(aggregate(AggregateFunction::Average, values.clone()), json!(3.0));
        assert_eq!(aggregate(AggregateFunction::Max, values.clone()), json!(4));
        assert_eq!(aggregate(AggregateFunction::CountDistinct, values), json!(2));
    }

    #[test]
    fn flags_match_any_member() {
        assert!(has_flag(&json!("Red, Blue"), &json!("blue")));
        assert!(!has_flag(&json!("Red"), &json!("Blue")));
    }
}
