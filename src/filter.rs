use std::str::FromStr;

use chrono::{DateTime, Days, Local, NaiveDate};
use serde_json::{Map, Value};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Invalid filter expression {expression:?}: {reason}")]
    Parse { expression: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Operator {
    pub fn compare<T: PartialOrd + ?Sized>(self, actual: &T, expected: &T) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            Self::Gt => actual > expected,
            Self::Lt => actual < expected,
            Self::Ge => actual >= expected,
            Self::Le => actual <= expected,
        }
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            _ => Err(()),
        }
    }
}

/// A parsed `<field> <operator> <value>` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub operator: Operator,
    pub literal: String,
}

impl FromStr for Predicate {
    type Err = FilterError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let parse_error = |reason: String| FilterError::Parse {
            expression: expression.to_owned(),
            reason,
        };

        // Split on whitespace at most twice; the value is the verbatim remainder.
        let trimmed = expression.trim_start();
        let (field, rest) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| parse_error("expected `<field> <operator> <value>`".to_owned()))?;
        let rest = rest.trim_start();
        let (operator, literal) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| parse_error("expected `<field> <operator> <value>`".to_owned()))?;
        let literal = literal.trim_start();
        if literal.trim_end().is_empty() {
            return Err(parse_error("missing value".to_owned()));
        }

        let operator = operator.parse::<Operator>().map_err(|_| {
            parse_error(format!(
                "unsupported operator {operator:?}, expected one of ==, !=, >, <, >=, <="
            ))
        })?;

        Ok(Self {
            field: field.to_owned(),
            operator,
            literal: literal.to_owned(),
        })
    }
}

impl Predicate {
    /// Evaluates against a task, resolving relative date keywords from `today`.
    pub fn matches(&self, task: &Map<String, Value>, today: NaiveDate) -> bool {
        let Some(value) = task.get(&self.field) else {
            return false;
        };

        if self.field.to_lowercase().contains("date") {
            return self.matches_date(value, today);
        }

        if self.field.eq_ignore_ascii_case("priority") {
            return self.matches_priority(value);
        }

        match value {
            Value::Number(number) => self.matches_number(number),
            Value::Bool(flag) => match self.literal.to_lowercase().as_str() {
                "true" => self.operator.compare(flag, &true),
                "false" => self.operator.compare(flag, &false),
                _ => false,
            },
            Value::String(s) => self.operator.compare(s.as_str(), self.literal.as_str()),
            other => self
                .operator
                .compare(other.to_string().as_str(), self.literal.as_str()),
        }
    }

    fn matches_date(&self, value: &Value, today: NaiveDate) -> bool {
        let Some(actual) = value.as_str().and_then(parse_timestamp_date) else {
            return false;
        };
        let Some(expected) = resolve_date_literal(&self.literal, today) else {
            return false;
        };
        self.operator.compare(&actual, &expected)
    }

    fn matches_priority(&self, value: &Value) -> bool {
        let Some(actual) = coerce_integer(value) else {
            return false;
        };
        let literal = self.literal.trim();
        let Some(expected) = priority_level(literal).or_else(|| literal.parse().ok()) else {
            return false;
        };
        self.operator.compare(&actual, &expected)
    }

    fn matches_number(&self, number: &serde_json::Number) -> bool {
        let literal = self.literal.trim();
        if let Some(actual) = number.as_i64() {
            return literal
                .parse::<i64>()
                .is_ok_and(|expected| self.operator.compare(&actual, &expected));
        }
        if let Some(actual) = number.as_u64() {
            return literal
                .parse::<u64>()
                .is_ok_and(|expected| self.operator.compare(&actual, &expected));
        }
        match (number.as_f64(), literal.parse::<f64>()) {
            (Some(actual), Ok(expected)) => self.operator.compare(&actual, &expected),
            _ => false,
        }
    }
}

/// Timestamps must carry a `.` and 1 to 6 fractional digits before the offset.
fn has_microsecond_fraction(s: &str) -> bool {
    let Some(rest) = s.get(19..).and_then(|rest| rest.strip_prefix('.')) else {
        return false;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    (1..=6).contains(&digits) && rest[digits..].starts_with(['+', '-'])
}

fn parse_timestamp_date(s: &str) -> Option<NaiveDate> {
    if !has_microsecond_fraction(s) {
        return None;
    }
    DateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|timestamp| timestamp.date_naive())
}

fn resolve_date_literal(literal: &str, today: NaiveDate) -> Option<NaiveDate> {
    match literal.to_lowercase().as_str() {
        "yesterday" => today.checked_sub_days(Days::new(1)),
        "today" => Some(today),
        "tomorrow" => today.checked_add_days(Days::new(1)),
        _ => NaiveDate::parse_from_str(literal, "%Y-%m-%d").ok(),
    }
}

/// Symbolic priorities as the remote API encodes them.
pub fn priority_level(name: &str) -> Option<i64> {
    match name.to_lowercase().as_str() {
        "none" => Some(0),
        "low" => Some(1),
        "medium" => Some(3),
        "high" => Some(5),
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

/// Keeps the tasks matching every expression, in input order.
///
/// All expressions are parsed up front, so a malformed one fails the call
/// before any task is looked at.
pub fn filter_tasks<S: AsRef<str>>(
    tasks: Vec<Value>,
    expressions: &[S],
) -> Result<Vec<Value>, FilterError> {
    filter_tasks_on(tasks, expressions, Local::now().date_naive())
}

pub fn filter_tasks_on<S: AsRef<str>>(
    tasks: Vec<Value>,
    expressions: &[S],
    today: NaiveDate,
) -> Result<Vec<Value>, FilterError> {
    let predicates = expressions
        .iter()
        .map(|expression| expression.as_ref().parse::<Predicate>())
        .collect::<Result<Vec<_>, _>>()?;

    if predicates.is_empty() {
        return Ok(tasks);
    }

    Ok(tasks
        .into_iter()
        .filter(|task| match task.as_object() {
            Some(record) => predicates.iter().all(|p| p.matches(record, today)),
            None => false,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    fn ids(tasks: &[Value]) -> Vec<&str> {
        tasks.iter().map(|t| t["id"].as_str().unwrap()).collect()
    }

    fn sample_tasks() -> Vec<Value> {
        vec![
            json!({"id": "a", "priority": 0, "dueDate": "2025-06-30T16:00:00.000+0000"}),
            json!({"id": "b", "priority": 1, "dueDate": "2025-07-01T09:30:00.000+0000"}),
            json!({"id": "c", "priority": 3, "dueDate": "2025-07-02T23:59:59.000+0800"}),
            json!({"id": "d", "priority": 5, "dueDate": "2025-07-03T00:00:00.000+0000"}),
            json!({"id": "e", "priority": 5, "dueDate": "not a date"}),
            json!({"id": "f", "title": "no priority or due date"}),
        ]
    }

    #[test]
    fn test_empty_expressions_return_all_tasks_in_order() {
        let tasks = sample_tasks();
        let filtered = filter_tasks_on(tasks.clone(), &[] as &[&str], today()).unwrap();
        assert_eq!(filtered, tasks);
    }

    #[test]
    fn test_missing_field_never_matches() {
        let filtered =
            filter_tasks_on(sample_tasks(), &["title != anything"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["f"]);

        let filtered = filter_tasks_on(sample_tasks(), &["priority != 3"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["a", "b", "d", "e"]);
    }

    #[test]
    fn test_priority_keywords_and_numbers() {
        let filtered = filter_tasks_on(sample_tasks(), &["priority >= high"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["d", "e"]);

        let filtered =
            filter_tasks_on(sample_tasks(), &["priority >= MEDIUM"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["c", "d", "e"]);

        let filtered = filter_tasks_on(sample_tasks(), &["priority >= 2"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["c", "d", "e"]);

        let filtered = filter_tasks_on(sample_tasks(), &["Priority == none"], today()).unwrap();
        assert!(filtered.is_empty());

        let filtered = filter_tasks_on(sample_tasks(), &["priority == urgent"], today()).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_priority_stored_as_string_is_coerced() {
        let tasks = vec![json!({"id": "x", "priority": "5"})];
        let filtered = filter_tasks_on(tasks, &["priority == high"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["x"]);
    }

    #[test]
    fn test_date_keywords() {
        let filtered =
            filter_tasks_on(sample_tasks(), &["dueDate <= tomorrow"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["a", "b", "c"]);

        let filtered = filter_tasks_on(sample_tasks(), &["dueDate == Today"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["b"]);

        let filtered =
            filter_tasks_on(sample_tasks(), &["dueDate < yesterday"], today()).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_exact_date_ignores_time_and_offset() {
        let filtered =
            filter_tasks_on(sample_tasks(), &["dueDate == 2025-07-02"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["c"]);
    }

    #[test]
    fn test_stored_date_needs_one_to_six_fraction_digits() {
        let tasks = vec![
            json!({"id": "whole", "dueDate": "2025-07-02T16:00:00+0000"}),
            json!({"id": "nanos", "dueDate": "2025-07-02T16:00:00.123456789+0000"}),
            json!({"id": "dot", "dueDate": "2025-07-02T16:00:00.+0000"}),
            json!({"id": "tenths", "dueDate": "2025-07-02T16:00:00.1+0000"}),
            json!({"id": "micros", "dueDate": "2025-07-02T16:00:00.123456-0300"}),
        ];
        let filtered = filter_tasks_on(tasks, &["dueDate == 2025-07-02"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["tenths", "micros"]);
    }

    #[test]
    fn test_numeric_values_ignore_trailing_whitespace() {
        let tasks = vec![
            json!({"id": "a", "priority": 5, "sortOrder": 5}),
            json!({"id": "b", "priority": 0, "sortOrder": 7}),
        ];
        let filtered = filter_tasks_on(tasks.clone(), &["priority == high "], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["a"]);

        let filtered = filter_tasks_on(tasks.clone(), &["sortOrder == 5 "], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["a"]);

        let filtered = filter_tasks_on(tasks, &["priority == 0\t"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["b"]);
    }

    #[test]
    fn test_unparsable_date_literal_matches_nothing() {
        let filtered =
            filter_tasks_on(sample_tasks(), &["dueDate >= next week"], today()).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_expressions_are_combined_with_and() {
        let filtered = filter_tasks_on(
            sample_tasks(),
            &["priority >= medium", "dueDate <= tomorrow"],
            today(),
        )
        .unwrap();
        assert_eq!(ids(&filtered), vec!["c"]);
    }

    #[test]
    fn test_numeric_and_string_fields() {
        let tasks = vec![
            json!({"id": "a", "sortOrder": -10, "status": 0, "title": "Buy milk"}),
            json!({"id": "b", "sortOrder": 20, "status": 2, "title": "Write report"}),
            json!({"id": "c", "progress": 0.5, "title": "Call Alice"}),
        ];

        let filtered = filter_tasks_on(tasks.clone(), &["sortOrder < 0"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["a"]);

        let filtered = filter_tasks_on(tasks.clone(), &["status == two"], today()).unwrap();
        assert!(filtered.is_empty());

        let filtered = filter_tasks_on(tasks.clone(), &["progress >= 0.25"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["c"]);

        let filtered = filter_tasks_on(tasks.clone(), &["title == Buy milk"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["a"]);

        let filtered = filter_tasks_on(tasks, &["title > C"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["b", "c"]);
    }

    #[test]
    fn test_boolean_fields() {
        let tasks = vec![
            json!({"id": "a", "isAllDay": true}),
            json!({"id": "b", "isAllDay": false}),
        ];
        let filtered = filter_tasks_on(tasks.clone(), &["isAllDay == True"], today()).unwrap();
        assert_eq!(ids(&filtered), vec!["a"]);

        let filtered = filter_tasks_on(tasks, &["isAllDay == yes"], today()).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let err = filter_tasks_on(sample_tasks(), &["onlytwo tokens"], today()).unwrap_err();
        assert!(matches!(err, FilterError::Parse { .. }));

        let err = filter_tasks_on(sample_tasks(), &["priority ~= high"], today()).unwrap_err();
        assert!(err.to_string().contains("unsupported operator"));

        // A bad expression fails the whole call even when a valid one precedes it.
        let err = filter_tasks_on(sample_tasks(), &["priority >= high", "due"], today());
        assert!(err.is_err());
    }

    #[test]
    fn test_value_keeps_inner_spaces() {
        let predicate: Predicate = "title  ==  Write the  report ".parse().unwrap();
        assert_eq!(predicate.field, "title");
        assert_eq!(predicate.operator, Operator::Eq);
        assert_eq!(predicate.literal, "Write the  report ");
    }
}
