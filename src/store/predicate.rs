//! Parameterized row predicates.
//!
//! Predicates are built as values, never as query strings, and are bound to
//! a table schema before evaluation so unknown columns fail before any row
//! is read.
//!
//! ```rust
//! use resift::store::{col, Predicate};
//!
//! let pass = Predicate::and([
//!     col("QUAL").ge(20.0),
//!     col("FILTER").eq("PASS"),
//!     col("REF_COUNT").add(col("ALT_COUNT")).ge(6i64),
//! ]);
//! assert!(matches!(pass, Predicate::And(_)));
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::schema::{Row, Schema};
use crate::store::value::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,    // ==
    NotEq, // !=
    Lt,    // <
    Gt,    // >
    LtEq,  // <=
    GtEq,  // >=
}

impl CmpOp {
    fn sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "<>",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::LtEq => "<=",
            CmpOp::GtEq => ">=",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::NotEq => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::LtEq => ordering != Ordering::Greater,
            CmpOp::GtEq => ordering != Ordering::Less,
        }
    }
}

/// A scalar expression over one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference by name.
    Column(String),
    /// Bound parameter value.
    Literal(Value),
    /// Numeric sum; null if either side is null or non-numeric.
    Add(Box<Expr>, Box<Expr>),
}

/// Shorthand for [`Expr::Column`].
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

impl Expr {
    /// Numeric sum of two expressions.
    pub fn add(self, other: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(other))
    }

    fn compare(self, op: CmpOp, value: impl Into<Expr>) -> Predicate {
        Predicate::Compare(self, op, value.into())
    }

    /// `self == value`
    pub fn eq(self, value: impl Into<Expr>) -> Predicate {
        self.compare(CmpOp::Eq, value)
    }

    /// `self != value`
    pub fn ne(self, value: impl Into<Expr>) -> Predicate {
        self.compare(CmpOp::NotEq, value)
    }

    /// `self < value`
    pub fn lt(self, value: impl Into<Expr>) -> Predicate {
        self.compare(CmpOp::Lt, value)
    }

    /// `self > value`
    pub fn gt(self, value: impl Into<Expr>) -> Predicate {
        self.compare(CmpOp::Gt, value)
    }

    /// `self <= value`
    pub fn le(self, value: impl Into<Expr>) -> Predicate {
        self.compare(CmpOp::LtEq, value)
    }

    /// `self >= value`
    pub fn ge(self, value: impl Into<Expr>) -> Predicate {
        self.compare(CmpOp::GtEq, value)
    }

    /// `lower <= self <= upper`
    pub fn between(self, lower: impl Into<Expr>, upper: impl Into<Expr>) -> Predicate {
        Predicate::and([self.clone().ge(lower), self.le(upper)])
    }

    fn bind(&self, schema: &Schema) -> Result<BoundExpr, StoreError> {
        Ok(match self {
            Expr::Column(name) => BoundExpr::Column(schema.require_index(name)?),
            Expr::Literal(value) => BoundExpr::Literal(value.clone()),
            Expr::Add(left, right) => {
                BoundExpr::Add(Box::new(left.bind(schema)?), Box::new(right.bind(schema)?))
            }
        })
    }
}

macro_rules! literal_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Expr {
            fn from(value: $t) -> Self {
                Expr::Literal(value.into())
            }
        })*
    };
}

literal_from!(Value, &str, String, f64, i64, u32, char);

/// Row filter. Comparisons involving null never hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// Binary comparison.
    Compare(Expr, CmpOp, Expr),
    /// Column is null.
    IsNull(String),
    /// All sub-predicates hold (empty = true).
    And(Vec<Predicate>),
    /// Any sub-predicate holds (empty = false).
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Conjunction.
    pub fn and(parts: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(parts.into_iter().collect())
    }

    /// Disjunction.
    pub fn or(parts: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(parts.into_iter().collect())
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    /// Null test on a column.
    pub fn is_null(column: &str) -> Self {
        Predicate::IsNull(column.to_string())
    }

    /// Resolve column names against `schema`.
    pub fn bind(&self, schema: &Schema) -> Result<BoundPredicate, StoreError> {
        self.bind_node(schema).map(BoundPredicate)
    }

    fn bind_node(&self, schema: &Schema) -> Result<Node, StoreError> {
        Ok(match self {
            Predicate::True => Node::True,
            Predicate::Compare(left, op, right) => {
                Node::Compare(left.bind(schema)?, *op, right.bind(schema)?)
            }
            Predicate::IsNull(name) => Node::IsNull(schema.require_index(name)?),
            Predicate::And(parts) => Node::And(
                parts.iter().map(|p| p.bind_node(schema)).collect::<Result<_, _>>()?,
            ),
            Predicate::Or(parts) => Node::Or(
                parts.iter().map(|p| p.bind_node(schema)).collect::<Result<_, _>>()?,
            ),
            Predicate::Not(inner) => Node::Not(Box::new(inner.bind_node(schema)?)),
        })
    }
}

#[derive(Debug, Clone)]
enum BoundExpr {
    Column(usize),
    Literal(Value),
    Add(Box<BoundExpr>, Box<BoundExpr>),
}

impl BoundExpr {
    fn evaluate(&self, row: &Row) -> Value {
        match self {
            BoundExpr::Column(idx) => row.get(*idx).cloned().unwrap_or(Value::Null),
            BoundExpr::Literal(value) => value.clone(),
            BoundExpr::Add(left, right) => match (left.evaluate(row), right.evaluate(row)) {
                (Value::Int(a), Value::Int(b)) => Value::Int(a.saturating_add(b)),
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => Value::Float(a + b),
                    _ => Value::Null,
                },
            },
        }
    }
}

/// Double-quoted SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl BoundExpr {
    fn write_sql(&self, schema: &Schema, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            BoundExpr::Column(idx) => match schema.columns().get(*idx) {
                Some(spec) => sql.push_str(&quote_ident(&spec.name)),
                None => sql.push_str("NULL"),
            },
            BoundExpr::Literal(value) => {
                sql.push('?');
                params.push(value.clone());
            }
            BoundExpr::Add(left, right) => {
                sql.push('(');
                left.write_sql(schema, sql, params);
                sql.push_str(" + ");
                right.write_sql(schema, sql, params);
                sql.push(')');
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    True,
    Compare(BoundExpr, CmpOp, BoundExpr),
    IsNull(usize),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

impl Node {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Node::True => true,
            Node::Compare(left, op, right) => left
                .evaluate(row)
                .compare(&right.evaluate(row))
                .is_some_and(|ordering| op.holds(ordering)),
            Node::IsNull(idx) => row.get(*idx).map_or(true, Value::is_null),
            Node::And(parts) => parts.iter().all(|p| p.matches(row)),
            Node::Or(parts) => parts.iter().any(|p| p.matches(row)),
            Node::Not(inner) => !inner.matches(row),
        }
    }

    fn write_sql(&self, schema: &Schema, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Node::True => sql.push('1'),
            // A comparison with NULL is UNKNOWN in SQL; fold it to false so
            // NOT behaves as in `matches`.
            Node::Compare(left, op, right) => {
                sql.push_str("COALESCE(");
                left.write_sql(schema, sql, params);
                sql.push(' ');
                sql.push_str(op.sql());
                sql.push(' ');
                right.write_sql(schema, sql, params);
                sql.push_str(", 0)");
            }
            Node::IsNull(idx) => match schema.columns().get(*idx) {
                Some(spec) => {
                    sql.push_str(&quote_ident(&spec.name));
                    sql.push_str(" IS NULL");
                }
                None => sql.push('1'),
            },
            Node::And(parts) => Self::write_joined(parts, " AND ", '1', schema, sql, params),
            Node::Or(parts) => Self::write_joined(parts, " OR ", '0', schema, sql, params),
            Node::Not(inner) => {
                sql.push_str("NOT (");
                inner.write_sql(schema, sql, params);
                sql.push(')');
            }
        }
    }

    fn write_joined(
        parts: &[Node],
        separator: &str,
        empty: char,
        schema: &Schema,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        if parts.is_empty() {
            sql.push(empty);
            return;
        }
        sql.push('(');
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                sql.push_str(separator);
            }
            part.write_sql(schema, sql, params);
        }
        sql.push(')');
    }
}

/// A predicate whose columns have been resolved to row offsets.
#[derive(Debug, Clone)]
pub struct BoundPredicate(Node);

impl BoundPredicate {
    /// Evaluate against one row.
    pub fn matches(&self, row: &Row) -> bool {
        self.0.matches(row)
    }

    /// SQL condition with `?` placeholders, plus the values for them in
    /// order. `schema` must be the one the predicate was bound to.
    pub fn to_sql(&self, schema: &Schema) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.0.write_sql(schema, &mut sql, &mut params);
        (sql, params)
    }
}
