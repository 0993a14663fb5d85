//! Construction and combination of tenant predicates.

use sqlparser::ast::{BinaryOperator, Expr, Ident};

/// `<qualifier>.<column> = <value>`.
pub fn tenant_predicate(qualifier: Ident, column: &str, value: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(Expr::CompoundIdentifier(vec![qualifier, Ident::new(column)])),
        op: BinaryOperator::Eq,
        right: Box::new(value),
    }
}

/// AND `predicate` onto an existing filter.
///
/// - no filter: `predicate`
/// - filter whose top-level operator binds looser than AND (OR, XOR):
///   `predicate AND (filter)`
/// - anything else: `predicate AND filter`
///
/// The printer emits operators without adding parentheses, so the `Nested`
/// wrapper is what keeps `a OR b` from absorbing the new conjunct.
pub fn and_predicate(existing: Option<Expr>, predicate: Expr) -> Expr {
    match existing {
        None => predicate,
        Some(filter) => {
            let right = if binds_looser_than_and(&filter) {
                Expr::Nested(Box::new(filter))
            } else {
                filter
            };
            Expr::BinaryOp {
                left: Box::new(predicate),
                op: BinaryOperator::And,
                right: Box::new(right),
            }
        }
    }
}

/// Fold predicates left to right into one conjunction.
pub fn conjunction(predicates: Vec<Expr>) -> Option<Expr> {
    predicates.into_iter().reduce(|acc, next| Expr::BinaryOp {
        left: Box::new(acc),
        op: BinaryOperator::And,
        right: Box::new(next),
    })
}

/// AND every predicate in `predicates` onto `filter` in one step.
pub fn and_all(filter: &mut Option<Expr>, predicates: Vec<Expr>) {
    if let Some(predicate) = conjunction(predicates) {
        *filter = Some(and_predicate(filter.take(), predicate));
    }
}

fn binds_looser_than_and(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::BinaryOp {
            op: BinaryOperator::Or | BinaryOperator::Xor,
            ..
        }
    )
}
