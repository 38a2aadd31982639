use std::cmp::Ordering as CmpOrdering;

use serde_json::Value;

use super::Row;

/// Comparison operator, named after the backend's REST filter syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive pattern; `*` and `%` match any run of characters.
    ILike,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::ILike => "ilike",
        }
    }

    fn matches(self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Eq => compare_values(actual, expected) == Some(CmpOrdering::Equal),
            Self::Neq => compare_values(actual, expected) != Some(CmpOrdering::Equal),
            Self::Gt => compare_values(actual, expected) == Some(CmpOrdering::Greater),
            Self::Gte => matches!(
                compare_values(actual, expected),
                Some(CmpOrdering::Greater | CmpOrdering::Equal)
            ),
            Self::Lt => compare_values(actual, expected) == Some(CmpOrdering::Less),
            Self::Lte => matches!(
                compare_values(actual, expected),
                Some(CmpOrdering::Less | CmpOrdering::Equal)
            ),
            Self::ILike => match (actual.as_str(), expected.as_str()) {
                (Some(text), Some(pattern)) => ilike(pattern, text),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterOp::Eq, value)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a row. A missing column never matches.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| {
            row.get(&c.column)
                .is_some_and(|actual| c.op.matches(actual, &c.value))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }

    /// `column.asc` / `column.desc`
    pub fn to_param(&self) -> String {
        let direction = if self.ascending { "asc" } else { "desc" };
        format!("{}.{direction}", self.column)
    }

    pub(crate) fn compare(&self, a: &Row, b: &Row) -> CmpOrdering {
        let null = Value::Null;
        let left = a.get(&self.column).unwrap_or(&null);
        let right = b.get(&self.column).unwrap_or(&null);
        let ordering = sort_key_cmp(left, right);
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Render a filter value the way the REST interface expects it in a query string.
pub(crate) fn value_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<CmpOrdering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(CmpOrdering::Equal),
        // Numbers stored as text compare numerically.
        (Value::String(s), Value::Number(n)) => s.trim().parse::<f64>().ok()?.partial_cmp(&n.as_f64()?),
        (Value::Number(n), Value::String(s)) => n.as_f64()?.partial_cmp(&s.trim().parse::<f64>().ok()?),
        _ => None,
    }
}

/// Total order for sorting: nulls first, then by value.
fn sort_key_cmp(a: &Value, b: &Value) -> CmpOrdering {
    match (a.is_null(), b.is_null()) {
        (true, true) => CmpOrdering::Equal,
        (true, false) => CmpOrdering::Less,
        (false, true) => CmpOrdering::Greater,
        (false, false) => compare_values(a, b).unwrap_or(CmpOrdering::Equal),
    }
}

fn ilike(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();
    wildcard_match(&pattern, &text)
}

fn wildcard_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '*' || pattern[p] == '%') {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*' || *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&row(json!({"name": "Acme"}))));
    }

    #[test]
    fn conditions_are_conjunctive() {
        let filter = Filter::new()
            .eq("location", "Pune")
            .with("trust_score", FilterOp::Gte, 50);

        assert!(filter.matches(&row(json!({"location": "Pune", "trust_score": 80}))));
        assert!(!filter.matches(&row(json!({"location": "Pune", "trust_score": 20}))));
        assert!(!filter.matches(&row(json!({"location": "Delhi", "trust_score": 80}))));
        assert!(!filter.matches(&row(json!({"location": "Pune"}))));
    }

    #[test]
    fn ilike_is_case_insensitive_with_wildcards() {
        assert!(ilike("*pune*", "Greater PUNE area"));
        assert!(ilike("acme%", "Acme Education"));
        assert!(!ilike("acme", "Acme Education"));
        assert!(ilike("*", ""));
    }

    #[test]
    fn order_param_and_compare() {
        let a = row(json!({"price": 10}));
        let b = row(json!({"price": 20}));
        let missing = row(json!({}));

        assert_eq!(Order::asc("price").to_param(), "price.asc");
        assert_eq!(Order::asc("price").compare(&a, &b), CmpOrdering::Less);
        assert_eq!(Order::desc("price").compare(&a, &b), CmpOrdering::Greater);
        assert_eq!(Order::asc("price").compare(&missing, &a), CmpOrdering::Less);
    }

    #[test]
    fn value_params_render_without_quotes() {
        assert_eq!(value_param(&json!("Pune")), "Pune");
        assert_eq!(value_param(&json!(42)), "42");
        assert_eq!(value_param(&json!(true)), "true");
        assert_eq!(value_param(&Value::Null), "null");
    }
}
