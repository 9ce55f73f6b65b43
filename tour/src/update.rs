//! Aggregation expressions for pipeline-style updates.
//!
//! An [`Expr`] is sent to the server whole and evaluated there, inside the update,
//! so a conditional write never needs a read on the client first.
//!
//! ```
//! use tour::update::{Expr, SetStage};
//!
//! let stage = SetStage::new().set(
//!     "seats",
//!     Expr::cond(
//!         Expr::field("seats").gte(4),
//!         Expr::field("seats").sub(4),
//!         Expr::field("seats"),
//!     ),
//! );
//!
//! // [{ "$set": { "seats": { "$cond": { "if": { "$gte": ["$seats", 4] }, ... } } } }]
//! let pipeline = stage.pipeline();
//! assert_eq!(pipeline.len(), 1);
//! ```
//!
//! The same stage can be written with [`set!`](crate::set) and [`expr!`](crate::expr):
//!
//! ```
//! let stage = tour::set! {
//!     seats: if seats >= 4 { seats - 4 } else { seats },
//! };
//! ```

use crate::{Error, Result};
use mongodb::{
    bson::{Bson, Document, doc},
    options::UpdateModifications,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }

    fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};

        match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Gt => ordering == Greater,
            Self::Gte => ordering != Less,
            Self::Lt => ordering == Less,
            Self::Lte => ordering != Greater,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
}

impl Arithmetic {
    pub fn operator(self) -> &'static str {
        match self {
            Self::Add => "$add",
            Self::Subtract => "$subtract",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A field of the document being updated, e.g. `"$seats"`.
    Field(String),
    Value(Bson),
    Compare(Comparison, Box<Expr>, Box<Expr>),
    Arithmetic(Arithmetic, Box<Expr>, Box<Expr>),
    Cond {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn value(value: impl Into<Bson>) -> Self {
        Self::Value(value.into())
    }

    pub fn cond(condition: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::Cond {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn compare(self, comparison: Comparison, other: impl Into<Expr>) -> Self {
        Self::Compare(comparison, Box::new(self), Box::new(other.into()))
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.compare(Comparison::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.compare(Comparison::Ne, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.compare(Comparison::Gt, other)
    }

    pub fn gte(self, other: impl Into<Expr>) -> Self {
        self.compare(Comparison::Gte, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.compare(Comparison::Lt, other)
    }

    pub fn lte(self, other: impl Into<Expr>) -> Self {
        self.compare(Comparison::Lte, other)
    }

    pub fn add(self, other: impl Into<Expr>) -> Self {
        Self::Arithmetic(Arithmetic::Add, Box::new(self), Box::new(other.into()))
    }

    pub fn sub(self, other: impl Into<Expr>) -> Self {
        Self::Arithmetic(Arithmetic::Subtract, Box::new(self), Box::new(other.into()))
    }

    /// Renders the expression in aggregation syntax.
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Field(path) => Bson::String(format!("${path}")),
            // Strings starting with `$` would be read as field paths.
            Self::Value(Bson::String(string)) if string.starts_with('$') => {
                Bson::Document(doc! { "$literal": string.as_str() })
            }
            Self::Value(value) => value.clone(),
            Self::Compare(comparison, lhs, rhs) => {
                let operator = comparison.operator();
                Bson::Document(doc! { operator: [lhs.to_bson(), rhs.to_bson()] })
            }
            Self::Arithmetic(arithmetic, lhs, rhs) => {
                let operator = arithmetic.operator();
                Bson::Document(doc! { operator: [lhs.to_bson(), rhs.to_bson()] })
            }
            Self::Cond {
                condition,
                then,
                otherwise,
            } => Bson::Document(doc! {
                "$cond": {
                    "if": condition.to_bson(),
                    "then": then.to_bson(),
                    "else": otherwise.to_bson(),
                }
            }),
        }
    }

    /// Evaluates the expression against a local snapshot of a document.
    ///
    /// Only numbers, strings and booleans are understood. This predicts what the
    /// server will compute; it is never used to write.
    pub fn evaluate(&self, document: &Document) -> Result<Bson> {
        match self {
            Self::Field(path) => Ok(lookup(document, path).cloned().unwrap_or(Bson::Null)),
            Self::Value(value) => Ok(value.clone()),
            Self::Compare(comparison, lhs, rhs) => {
                let lhs = lhs.evaluate(document)?;
                let rhs = rhs.evaluate(document)?;
                let ordering = compare(&lhs, &rhs)?;

                Ok(Bson::Boolean(comparison.holds(ordering)))
            }
            Self::Arithmetic(arithmetic, lhs, rhs) => {
                let lhs = lhs.evaluate(document)?;
                let rhs = rhs.evaluate(document)?;

                apply(*arithmetic, &lhs, &rhs)
            }
            Self::Cond {
                condition,
                then,
                otherwise,
            } => match condition.evaluate(document)? {
                Bson::Boolean(true) => then.evaluate(document),
                Bson::Boolean(false) | Bson::Null => otherwise.evaluate(document),
                other => Err(Error::Evaluation(format!(
                    "condition evaluated to non-boolean {other}"
                ))),
            },
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
    };
}

impl_value_from!(i32, i64, f64, bool, &str, String);

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

enum Number {
    Int(i64),
    Double(f64),
}

fn number(value: &Bson) -> Option<Number> {
    match value {
        Bson::Int32(value) => Some(Number::Int(i64::from(*value))),
        Bson::Int64(value) => Some(Number::Int(*value)),
        Bson::Double(value) => Some(Number::Double(*value)),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn compare(lhs: &Bson, rhs: &Bson) -> Result<std::cmp::Ordering> {
    match (number(lhs), number(rhs)) {
        (Some(Number::Int(lhs)), Some(Number::Int(rhs))) => return Ok(lhs.cmp(&rhs)),
        (Some(lhs), Some(rhs)) => {
            let as_f64 = |number: Number| match number {
                Number::Int(value) => value as f64,
                Number::Double(value) => value,
            };
            return as_f64(lhs)
                .partial_cmp(&as_f64(rhs))
                .ok_or_else(|| Error::Evaluation("cannot compare NaN".into()));
        }
        _ => {}
    }

    match (lhs, rhs) {
        (Bson::String(lhs), Bson::String(rhs)) => Ok(lhs.cmp(rhs)),
        (Bson::Boolean(lhs), Bson::Boolean(rhs)) => Ok(lhs.cmp(rhs)),
        (Bson::Null, Bson::Null) => Ok(std::cmp::Ordering::Equal),
        _ => Err(Error::Evaluation(format!("cannot compare {lhs} with {rhs}"))),
    }
}

/// Integer results keep the narrowest type that fits, like the server does.
#[allow(clippy::cast_precision_loss)]
fn apply(arithmetic: Arithmetic, lhs: &Bson, rhs: &Bson) -> Result<Bson> {
    let both_int32 = matches!((lhs, rhs), (Bson::Int32(_), Bson::Int32(_)));

    match (number(lhs), number(rhs)) {
        (Some(Number::Int(lhs)), Some(Number::Int(rhs))) => {
            let result = match arithmetic {
                Arithmetic::Add => lhs.checked_add(rhs),
                Arithmetic::Subtract => lhs.checked_sub(rhs),
            }
            .ok_or_else(|| Error::Evaluation("integer overflow".into()))?;

            Ok(match i32::try_from(result) {
                Ok(narrow) if both_int32 => Bson::Int32(narrow),
                _ => Bson::Int64(result),
            })
        }
        (Some(lhs), Some(rhs)) => {
            let as_f64 = |number: Number| match number {
                Number::Int(value) => value as f64,
                Number::Double(value) => value,
            };
            let (lhs, rhs) = (as_f64(lhs), as_f64(rhs));

            Ok(Bson::Double(match arithmetic {
                Arithmetic::Add => lhs + rhs,
                Arithmetic::Subtract => lhs - rhs,
            }))
        }
        _ if matches!(lhs, Bson::Null) || matches!(rhs, Bson::Null) => Ok(Bson::Null),
        _ => Err(Error::Evaluation(format!(
            "{} only supports numbers, got {lhs} and {rhs}",
            arithmetic.operator()
        ))),
    }
}

/// An ordered set of field assignments, sent as a single `$set` pipeline stage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetStage {
    fields: Vec<(String, Expr)>,
}

impl SetStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, expr: impl Into<Expr>) -> Self {
        self.fields.push((field.into(), expr.into()));
        self
    }

    pub fn to_document(&self) -> Document {
        let assignments = self
            .fields
            .iter()
            .map(|(field, expr)| (field.clone(), expr.to_bson()))
            .collect::<Document>();

        doc! { "$set": assignments }
    }

    pub fn pipeline(&self) -> Vec<Document> {
        vec![self.to_document()]
    }

    /// Applies the assignments to a copy of `document`, as the server would.
    ///
    /// Every expression sees the original document, not the result of earlier
    /// assignments in the same stage.
    pub fn preview(&self, document: &Document) -> Result<Document> {
        let mut updated = document.clone();

        for (field, expr) in &self.fields {
            updated.insert(field.clone(), expr.evaluate(document)?);
        }

        Ok(updated)
    }
}

impl From<SetStage> for UpdateModifications {
    fn from(value: SetStage) -> Self {
        UpdateModifications::Pipeline(value.pipeline())
    }
}

/// `field = field >= amount ? field - amount : field`, evaluated by the server.
pub fn decrement_if_at_least(field: &str, amount: i32) -> SetStage {
    SetStage::new().set(
        field,
        Expr::cond(
            Expr::field(field).gte(amount),
            Expr::field(field).sub(amount),
            Expr::field(field),
        ),
    )
}
