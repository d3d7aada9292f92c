use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use querylens_core::{AppError, AppResult};
use serde_json::Value;

use super::values::number;
use crate::expression::BuiltinFunction;

enum Temporal {
    Timestamp(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

fn temporal(value: &str, time_zone: FixedOffset) -> Option<Temporal> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(Temporal::Timestamp(timestamp.with_timezone(&time_zone)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(Temporal::Date(date));
    }
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .ok()
        .map(Temporal::Time)
}

fn text(function: BuiltinFunction, value: &Value) -> AppResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        other => Err(AppError::Internal(format!(
            "function '{}' expects text but received '{other}'",
            function.as_str()
        ))),
    }
}

fn date_part(function: BuiltinFunction, value: &Value, time_zone: FixedOffset) -> AppResult<Value> {
    let Some(raw) = value.as_str() else {
        return match value {
            Value::Null => Ok(Value::Null),
            other => Err(AppError::Internal(format!(
                "function '{}' expects a temporal value but received '{other}'",
                function.as_str()
            ))),
        };
    };
    let Some(parsed) = temporal(raw, time_zone) else {
        return Err(AppError::Internal(format!(
            "function '{}' could not read '{raw}' as a temporal value",
            function.as_str()
        )));
    };

    let part = match (function, parsed) {
        (BuiltinFunction::Year, Temporal::Timestamp(value)) => i64::from(value.year()),
        (BuiltinFunction::Year, Temporal::Date(value)) => i64::from(value.year()),
        (BuiltinFunction::Month, Temporal::Timestamp(value)) => i64::from(value.month()),
        (BuiltinFunction::Month, Temporal::Date(value)) => i64::from(value.month()),
        (BuiltinFunction::Day, Temporal::Timestamp(value)) => i64::from(value.day()),
        (BuiltinFunction::Day, Temporal::Date(value)) => i64::from(value.day()),
        (BuiltinFunction::Hour, Temporal::Timestamp(value)) => i64::from(value.hour()),
        (BuiltinFunction::Hour, Temporal::Time(value)) => i64::from(value.hour()),
        (BuiltinFunction::Minute, Temporal::Timestamp(value)) => i64::from(value.minute()),
        (BuiltinFunction::Minute, Temporal::Time(value)) => i64::from(value.minute()),
        (BuiltinFunction::Second, Temporal::Timestamp(value)) => i64::from(value.second()),
        (BuiltinFunction::Second, Temporal::Time(value)) => i64::from(value.second()),
        (BuiltinFunction::Date, Temporal::Timestamp(value)) => {
            return Ok(Value::String(value.date_naive().to_string()));
        }
        (BuiltinFunction::Date, Temporal::Date(value)) => {
            return Ok(Value::String(value.to_string()));
        }
        _ => {
            return Err(AppError::Internal(format!(
                "function '{}' does not apply to '{raw}'",
                function.as_str()
            )));
        }
    };

    Ok(Value::from(part))
}

fn rounding(function: BuiltinFunction, value: &Value) -> AppResult<Value> {
    if value.is_null() || value.is_i64() || value.is_u64() {
        return Ok(value.clone());
    }
    let Some(float) = value.as_f64() else {
        return Err(AppError::Internal(format!(
            "function '{}' expects a number but received '{value}'",
            function.as_str()
        )));
    };

    let rounded = match function {
        BuiltinFunction::Round => float.round(),
        BuiltinFunction::Floor => float.floor(),
        _ => float.ceil(),
    };
    Ok(number(rounded))
}

fn substring(value: &str, start: &Value, length: Option<&Value>) -> AppResult<Value> {
    let start = start
        .as_i64()
        .ok_or_else(|| AppError::Internal("substring start must be an integer".to_owned()))?;
    let start = usize::try_from(start.max(0)).unwrap_or(usize::MAX);
    let characters = value.chars().skip(start);

    let result: String = match length {
        None => characters.collect(),
        Some(length) => {
            let length = length.as_i64().ok_or_else(|| {
                AppError::Internal("substring length must be an integer".to_owned())
            })?;
            characters
                .take(usize::try_from(length.max(0)).unwrap_or(usize::MAX))
                .collect()
        }
    };

    Ok(Value::String(result))
}

pub(super) fn call(
    function: BuiltinFunction,
    arguments: &[Value],
    time_zone: FixedOffset,
) -> AppResult<Value> {
    let (minimum, maximum) = function.arity();
    if arguments.len() < minimum || arguments.len() > maximum {
        return Err(AppError::Internal(format!(
            "function '{}' received {} arguments",
            function.as_str(),
            arguments.len()
        )));
    }

    match function {
        BuiltinFunction::Contains | BuiltinFunction::StartsWith | BuiltinFunction::EndsWith => {
            let (Some(value), Some(fragment)) = (
                text(function, &arguments[0])?,
                text(function, &arguments[1])?,
            ) else {
                return Ok(Value::Bool(false));
            };
            let matched = match function {
                BuiltinFunction::Contains => value.contains(fragment.as_str()),
                BuiltinFunction::StartsWith => value.starts_with(fragment.as_str()),
                _ => value.ends_with(fragment.as_str()),
            };
            Ok(Value::Bool(matched))
        }
        BuiltinFunction::IndexOf => {
            let (Some(value), Some(fragment)) = (
                text(function, &arguments[0])?,
                text(function, &arguments[1])?,
            ) else {
                return Ok(Value::Null);
            };
            let index = value
                .find(fragment.as_str())
                .map_or(-1, |byte_index| value[..byte_index].chars().count() as i64);
            Ok(Value::from(index))
        }
        BuiltinFunction::Length => Ok(text(function, &arguments[0])?
            .map_or(Value::Null, |value| Value::from(value.chars().count()))),
        BuiltinFunction::Substring => match text(function, &arguments[0])? {
            Some(value) => substring(value.as_str(), &arguments[1], arguments.get(2)),
            None => Ok(Value::Null),
        },
        BuiltinFunction::ToLower => Ok(text(function, &arguments[0])?
            .map_or(Value::Null, |value| Value::String(value.to_lowercase()))),
        BuiltinFunction::ToUpper => Ok(text(function, &arguments[0])?
            .map_or(Value::Null, |value| Value::String(value.to_uppercase()))),
        BuiltinFunction::Trim => Ok(text(function, &arguments[0])?
            .map_or(Value::Null, |value| Value::String(value.trim().to_owned()))),
        BuiltinFunction::Concat => {
            let left = text(function, &arguments[0])?;
            let right = text(function, &arguments[1])?;
            Ok(match (left, right) {
                (Some(left), Some(right)) => Value::String(left + right.as_str()),
                _ => Value::Null,
            })
        }
        BuiltinFunction::Year
        | BuiltinFunction::Month
        | BuiltinFunction::Day
        | BuiltinFunction::Hour
        | BuiltinFunction::Minute
        | BuiltinFunction::Second
        | BuiltinFunction::Date => date_part(function, &arguments[0], time_zone),
        BuiltinFunction::Now => Ok(Value::String(
            Utc::now().with_timezone(&time_zone).to_rfc3339(),
        )),
        BuiltinFunction::Round | BuiltinFunction::Floor | BuiltinFunction::Ceiling => {
            rounding(function, &arguments[0])
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;
    use serde_json::{Value, json};

    use super::call;
    use crate::expression::BuiltinFunction;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap_or_else(|| unreachable!())
    }

    fn run(function: BuiltinFunction, arguments: &[Value]) -> Value {
        call(function, arguments, utc()).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn string_functions_work_on_characters() {
        assert_eq!(run(BuiltinFunction::Length, &[json!("héllo")]), json!(5));
        assert_eq!(
            run(BuiltinFunction::IndexOf, &[json!("héllo"), json!("llo")]),
            json!(2)
        );
        assert_eq!(
            run(BuiltinFunction::Substring, &[json!("héllo"), json!(1), json!(2)]),
            json!("él")
        );
        assert_eq!(
            run(BuiltinFunction::Contains, &[json!(null), json!("x")]),
            json!(false)
        );
    }

    #[test]
    fn date_parts_use_the_configured_time_zone() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap_or_else(|| unreachable!());
        let value = call(
            BuiltinFunction::Day,
            &[json!("2024-02-01T23:30:00Z")],
            plus_two,
        )
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(value, json!(2));
        assert_eq!(
            run(BuiltinFunction::Hour, &[json!("2024-02-01T23:30:00Z")]),
            json!(23)
        );
        assert_eq!(run(BuiltinFunction::Year, &[json!("2023-07-04")]), json!(2023));
    }

    #[test]
    fn rounding_keeps_integers() {
        assert_eq!(run(BuiltinFunction::Round, &[json!(2.5)]), json!(3.0));
        assert_eq!(run(BuiltinFunction::Ceiling, &[json!(4)]), json!(4));
        assert_eq!(run(BuiltinFunction::Floor, &[json!(-1.5)]), json!(-2.0));
    }

    #[test]
    fn wrong_arity_is_an_internal_error() {
        assert!(call(BuiltinFunction::Trim, &[], utc()).is_err());
    }
}
