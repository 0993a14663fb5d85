//! Tenant predicate injection over parsed statements.
//!
//! [`StatementRewriter`] walks a `sqlparser` statement and scopes every
//! read or write of a tenant-governed table:
//!
//! | Statement | Injection |
//! |-----------|-----------|
//! | `SELECT`  | `<alias>.<column> = <value>` ANDed into WHERE for the FROM table, into ON for joined tables |
//! | `INSERT`  | tenant column appended to the column list, tenant value to every row (or projected by the SELECT) |
//! | `UPDATE`  | predicate ANDed into WHERE; single target table only |
//! | `DELETE`  | predicate ANDed into WHERE; single target table only |
//!
//! Subqueries, set operations, CTE bodies and lateral derived tables are
//! scoped independently wherever they appear. `EXPLAIN` is scoped through
//! to the statement it wraps.

use std::ops::ControlFlow;

use sqlparser::ast::{
    Delete, Expr, FromTable, Ident, Insert, Join, JoinConstraint, JoinOperator, ObjectName,
    ObjectNamePart, Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableObject,
    Update, Value, VisitMut, VisitorMut,
};

use crate::error::ConfigurationError;
use crate::policy::TenantPolicy;
use crate::predicate::{and_all, and_predicate, conjunction, tenant_predicate};
use crate::report::{RewriteReport, UnsupportedConstruct};

/// Rewrites statements so that every tenant-governed table access is
/// scoped to the tenant described by the policy.
///
/// The rewriter keeps no state between calls; one instance can serve any
/// number of threads as long as each call owns its statement.
#[derive(Debug, Clone)]
pub struct StatementRewriter<P> {
    policy: P,
}

impl<P: TenantPolicy> StatementRewriter<P> {
    pub fn new(policy: P) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Scope `statement` in place.
    ///
    /// The rewrite runs on a private copy that replaces `statement` only on
    /// success: when a [`ConfigurationError`] is returned the caller's tree
    /// is exactly as it was passed in.
    ///
    /// Rewriting is not idempotent; a second call adds a second predicate.
    pub fn rewrite(&self, statement: &mut Statement) -> Result<RewriteReport, ConfigurationError> {
        let mut working = statement.clone();
        let mut scope = Scope::new(&self.policy);
        scope.statement(&mut working)?;
        *statement = working;
        Ok(scope.report)
    }
}

/// Scope `statement` with `policy`.
pub fn rewrite(
    statement: &mut Statement,
    policy: &dyn TenantPolicy,
) -> Result<RewriteReport, ConfigurationError> {
    StatementRewriter::new(policy).rewrite(statement)
}

/// How a table factor relates to tenant scoping.
enum Lookup {
    /// A tenant-governed base table.
    Scoped(ScopedTable),
    /// A base table the policy exempts.
    Exempt,
    /// Anything else: subquery, nested join, CTE reference, table function.
    NotATable,
}

struct ScopedTable {
    name: String,
    /// Alias if present, else the unqualified table name.
    qualifier: Ident,
}

/// Per-call traversal state.
struct Scope<'p, P: ?Sized> {
    policy: &'p P,
    /// CTE names visible at the current point of the walk.
    ctes: Vec<String>,
    report: RewriteReport,
}

type Walk<T = ()> = Result<T, ConfigurationError>;

impl<'p, P: TenantPolicy + ?Sized> Scope<'p, P> {
    fn new(policy: &'p P) -> Self {
        Self {
            policy,
            ctes: Vec::new(),
            report: RewriteReport::default(),
        }
    }

    fn statement(&mut self, statement: &mut Statement) -> Walk {
        match statement {
            Statement::Query(query) => self.query(query, false),
            Statement::Insert(insert) => self.insert(insert),
            Statement::Update(update) => self.update(update),
            Statement::Delete(delete) => self.delete(delete),
            // EXPLAIN ANALYZE executes the wrapped statement
            Statement::Explain { statement, .. } => self.statement(statement),
            _ => {
                tracing::debug!("Statement reads no tables, leaving it unscoped");
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// `project` is set when the query feeds an INSERT: every branch must
    /// then produce one extra tenant column.
    fn query(&mut self, query: &mut Query, project: bool) -> Walk {
        let visible = self.ctes.len();
        let result = self.query_in_scope(query, project);
        self.ctes.truncate(visible);
        result
    }

    fn query_in_scope(&mut self, query: &mut Query, project: bool) -> Walk {
        if let Some(with) = query.with.as_mut() {
            // A recursive CTE sees itself and its siblings; otherwise a CTE
            // only sees the ones defined before it.
            if with.recursive {
                self.ctes
                    .extend(with.cte_tables.iter().map(|cte| cte.alias.name.value.clone()));
            }
            for cte in &mut with.cte_tables {
                self.query(&mut cte.query, false)?;
                if !with.recursive {
                    self.ctes.push(cte.alias.name.value.clone());
                }
            }
        }
        self.set_expr(&mut query.body, project)?;
        self.subqueries(&mut query.order_by)
    }

    fn set_expr(&mut self, body: &mut SetExpr, project: bool) -> Walk {
        match body {
            SetExpr::Select(select) => self.select(select, project),
            SetExpr::Query(query) => self.query(query, project),
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left, project)?;
                self.set_expr(right, project)
            }
            SetExpr::Values(values) => {
                // Literal rows hold no table; when feeding an INSERT they carry the value
                if project {
                    let value = self.policy.tenant_id_value();
                    for row in &mut values.rows {
                        row.push(value.clone());
                    }
                }
                Ok(())
            }
            SetExpr::Insert(statement)
            | SetExpr::Update(statement)
            | SetExpr::Delete(statement) => self.statement(statement),
            other => {
                self.unsupported(UnsupportedConstruct::QueryBody {
                    sql: other.to_string(),
                });
                Ok(())
            }
        }
    }

    fn select(&mut self, select: &mut Select, project: bool) -> Walk {
        let mut predicates = Vec::new();
        let mut projected = None;
        let mut from = select.from.iter_mut();

        match from.next() {
            Some(first) => {
                match self.lookup(&first.relation) {
                    // Exempt FROM table: the whole SELECT stays as written
                    Lookup::Exempt => return Ok(()),
                    Lookup::Scoped(table) => {
                        predicates.push(self.predicate(table));
                        if project {
                            projected = Some(Expr::Identifier(Ident::new(
                                self.policy.tenant_id_column(),
                            )));
                        }
                    }
                    Lookup::NotATable => {
                        self.table_factor(&mut first.relation, &mut predicates)?;
                        if project {
                            projected = Some(self.policy.tenant_id_value());
                        }
                    }
                }
                self.joins(&mut first.joins, &mut predicates)?;
            }
            None if project => projected = Some(self.policy.tenant_id_value()),
            None => {}
        }

        // FROM a, b: further entries are implicit cross joins
        for table_with_joins in from {
            self.relation(&mut table_with_joins.relation, &mut predicates)?;
            self.joins(&mut table_with_joins.joins, &mut predicates)?;
        }

        // Projection, WHERE, GROUP BY, HAVING and the rest; FROM is done
        let from_items = std::mem::take(&mut select.from);
        let nested = self.subqueries(select);
        select.from = from_items;
        nested?;

        and_all(&mut select.selection, predicates);
        if let Some(expr) = projected {
            select.projection.push(SelectItem::UnnamedExpr(expr));
        }
        Ok(())
    }

    /// Scope each join's right-hand side.
    ///
    /// Predicates go into the join's ON clause. Joins without one (CROSS,
    /// NATURAL, USING) hand theirs to `enclosing`, which ends up in WHERE.
    fn joins(&mut self, joins: &mut [Join], enclosing: &mut Vec<Expr>) -> Walk {
        for join in joins {
            let mut local = Vec::new();
            if let Lookup::Scoped(table) = self.lookup(&join.relation) {
                local.push(self.predicate(table));
            }
            self.table_factor(&mut join.relation, &mut local)?;

            match join_constraint_mut(&mut join.join_operator) {
                Some(JoinConstraint::On(on)) => {
                    self.subqueries(on)?;
                    if let Some(predicate) = conjunction(local) {
                        let existing = std::mem::replace(on, Expr::Value(Value::Null.into()));
                        *on = and_predicate(Some(existing), predicate);
                    }
                }
                _ => enclosing.extend(local),
            }
        }
        Ok(())
    }

    /// Scope a FROM item whose predicate belongs to an enclosing clause.
    fn relation(&mut self, factor: &mut TableFactor, predicates: &mut Vec<Expr>) -> Walk {
        match self.lookup(factor) {
            Lookup::Scoped(table) => predicates.push(self.predicate(table)),
            Lookup::Exempt => {}
            Lookup::NotATable => self.table_factor(factor, predicates)?,
        }
        Ok(())
    }

    /// Recurse into FROM items that are not base tables.
    fn table_factor(&mut self, factor: &mut TableFactor, predicates: &mut Vec<Expr>) -> Walk {
        match factor {
            // Base tables and CTE references are handled by the caller
            TableFactor::Table { args: None, .. } => Ok(()),
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                if matches!(subquery.body.as_ref(), SetExpr::Values(_)) {
                    self.unsupported(UnsupportedConstruct::ValuesDerivedTable {
                        alias: alias.as_ref().map(|a| a.name.value.clone()),
                    });
                    return Ok(());
                }
                self.query(subquery, false)
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.relation(&mut table_with_joins.relation, predicates)?;
                self.joins(&mut table_with_joins.joins, predicates)
            }
            other => {
                self.unsupported(UnsupportedConstruct::TableFactor {
                    sql: other.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Scope every subquery reachable from `node`.
    ///
    /// Callers pass nodes that hold no FROM items of the current query; those
    /// go through [`Scope::relation`] and [`Scope::joins`].
    fn subqueries<N: VisitMut>(&mut self, node: &mut N) -> Walk {
        let mut visitor = Subqueries {
            scope: self,
            depth: 0,
        };
        match node.visit(&mut visitor) {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    fn insert(&mut self, insert: &mut Insert) -> Walk {
        let TableObject::TableName(name) = &insert.table else {
            return Err(ConfigurationError::UnsupportedTarget {
                statement: "INSERT",
                target: insert.table.to_string(),
            });
        };
        let table = table_name(name);
        if self.is_exempt(&table) {
            return Ok(());
        }

        let Some(source) = insert.source.as_mut() else {
            return Err(ConfigurationError::InsertWithoutSource { table });
        };
        if insert.columns.is_empty() {
            return Err(ConfigurationError::InsertWithoutColumnList { table });
        }

        insert
            .columns
            .push(Ident::new(self.policy.tenant_id_column()));
        tracing::trace!(table = %table, "Injected tenant column into INSERT");
        self.report.tables_scoped.push(table);

        self.query(source, true)?;
        // ON CONFLICT DO UPDATE / ON DUPLICATE KEY UPDATE
        self.subqueries(&mut insert.on)?;
        self.subqueries(&mut insert.returning)
    }

    fn update(&mut self, update: &mut Update) -> Walk {
        if !update.table.joins.is_empty() || update.from.is_some() {
            return Err(ConfigurationError::MultiTableUpdate {
                target: update.table.to_string(),
            });
        }

        let table = match self.lookup(&update.table.relation) {
            Lookup::Scoped(table) => table,
            Lookup::Exempt => return Ok(()),
            Lookup::NotATable => {
                return Err(ConfigurationError::UnsupportedTarget {
                    statement: "UPDATE",
                    target: update.table.relation.to_string(),
                });
            }
        };

        self.subqueries(&mut update.assignments)?;
        self.subqueries(&mut update.selection)?;
        self.subqueries(&mut update.returning)?;

        let predicate = self.predicate(table);
        and_all(&mut update.selection, vec![predicate]);
        Ok(())
    }

    fn delete(&mut self, delete: &mut Delete) -> Walk {
        let from = match &delete.from {
            FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
        };
        let single_target = delete.tables.len() <= 1
            && delete.using.is_none()
            && from.len() == 1
            && from[0].joins.is_empty();
        if !single_target {
            return Err(ConfigurationError::MultiTableDelete {
                target: from
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let table = match self.lookup(&from[0].relation) {
            Lookup::Scoped(table) => table,
            Lookup::Exempt => return Ok(()),
            Lookup::NotATable => {
                return Err(ConfigurationError::UnsupportedTarget {
                    statement: "DELETE",
                    target: from[0].relation.to_string(),
                });
            }
        };

        self.subqueries(&mut delete.selection)?;
        self.subqueries(&mut delete.returning)?;

        let predicate = self.predicate(table);
        and_all(&mut delete.selection, vec![predicate]);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn lookup(&mut self, factor: &TableFactor) -> Lookup {
        let TableFactor::Table {
            name,
            alias,
            args: None,
            ..
        } = factor
        else {
            return Lookup::NotATable;
        };
        let Some(terminal) = name.0.last().and_then(ObjectNamePart::as_ident) else {
            return Lookup::NotATable;
        };
        if name.0.len() == 1 && self.is_cte(&terminal.value) {
            return Lookup::NotATable;
        }

        let table = table_name(name);
        if self.is_exempt(&table) {
            return Lookup::Exempt;
        }

        let qualifier = match alias {
            Some(alias) => alias.name.clone(),
            None => terminal.clone(),
        };
        Lookup::Scoped(ScopedTable {
            name: table,
            qualifier,
        })
    }

    fn is_cte(&self, name: &str) -> bool {
        self.ctes.iter().any(|cte| cte.eq_ignore_ascii_case(name))
    }

    fn is_exempt(&mut self, table: &str) -> bool {
        if self.policy.is_exempt(table) {
            tracing::debug!(table = %table, "Skipping tenant scoping for exempt table");
            self.report.tables_exempt.push(table.to_string());
            true
        } else {
            false
        }
    }

    fn predicate(&mut self, table: ScopedTable) -> Expr {
        let predicate = tenant_predicate(
            table.qualifier,
            self.policy.tenant_id_column(),
            self.policy.tenant_id_value(),
        );
        tracing::trace!(table = %table.name, predicate = %predicate, "Injected tenant predicate");
        self.report.predicates_added.push(predicate.to_string());
        self.report.tables_scoped.push(table.name);
        predicate
    }

    fn unsupported(&mut self, construct: UnsupportedConstruct) {
        tracing::warn!(construct = %construct, "Leaving construct without tenant scoping");
        self.report.warnings.push(construct);
    }
}

/// Scopes the outermost queries found while visiting an AST node.
///
/// [`Scope::query`] already handles everything nested inside such a query,
/// so the visitor only acts at depth zero.
struct Subqueries<'s, 'p, P: ?Sized> {
    scope: &'s mut Scope<'p, P>,
    depth: usize,
}

impl<P: TenantPolicy + ?Sized> VisitorMut for Subqueries<'_, '_, P> {
    type Break = ConfigurationError;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        if self.depth == 0 {
            if let Err(err) = self.scope.query(query, false) {
                return ControlFlow::Break(err);
            }
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<Self::Break> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }
}

/// The constraint of joins that can carry an ON clause.
fn join_constraint_mut(operator: &mut JoinOperator) -> Option<&mut JoinConstraint> {
    match operator {
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint)
        | JoinOperator::CrossJoin(constraint)
        | JoinOperator::Semi(constraint)
        | JoinOperator::LeftSemi(constraint)
        | JoinOperator::RightSemi(constraint)
        | JoinOperator::Anti(constraint)
        | JoinOperator::LeftAnti(constraint)
        | JoinOperator::RightAnti(constraint)
        | JoinOperator::StraightJoin(constraint) => Some(constraint),
        _ => None,
    }
}

/// Dotted table name without quotes, e.g. `public.orders`.
fn table_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|part| match part.as_ident() {
            Some(ident) => ident.value.clone(),
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    /// Scopes everything except `products` to tenant 1.
    struct FakePolicy;

    impl TenantPolicy for FakePolicy {
        fn is_exempt(&self, table_name: &str) -> bool {
            table_name == "products"
        }

        fn tenant_id_column(&self) -> &str {
            "tenant_id"
        }

        fn tenant_id_value(&self) -> Expr {
            Expr::Value(Value::Number("1".to_string(), false).into())
        }
    }

    fn parse(sql: &str) -> Statement {
        let mut statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).unwrap();
        assert_eq!(statements.len(), 1);
        statements.remove(0)
    }

    /// Printed form of `sql`, so expectations do not depend on printer spacing.
    fn normalized(sql: &str) -> String {
        parse(sql).to_string()
    }

    fn scoped(sql: &str) -> (String, RewriteReport) {
        let mut statement = parse(sql);
        let report = StatementRewriter::new(FakePolicy)
            .rewrite(&mut statement)
            .unwrap();
        (statement.to_string(), report)
    }

    fn assert_scoped(sql: &str, expected: &str) {
        assert_eq!(scoped(sql).0, normalized(expected));
    }

    fn assert_unchanged(sql: &str) {
        let original = parse(sql);
        let mut statement = original.clone();
        StatementRewriter::new(FakePolicy)
            .rewrite(&mut statement)
            .unwrap();
        assert_eq!(statement, original);
    }

    fn rewrite_err(sql: &str) -> ConfigurationError {
        let original = parse(sql);
        let mut statement = original.clone();
        let err = StatementRewriter::new(FakePolicy)
            .rewrite(&mut statement)
            .unwrap_err();
        assert_eq!(statement, original, "failed rewrite must not mutate");
        err
    }

    #[test]
    fn test_select_without_where() {
        assert_scoped(
            "SELECT * FROM orders",
            "SELECT * FROM orders WHERE orders.tenant_id = 1",
        );
    }

    #[test]
    fn test_select_qualifies_with_alias() {
        assert_scoped(
            "SELECT o.id FROM orders AS o WHERE o.status = 'open'",
            "SELECT o.id FROM orders AS o WHERE o.tenant_id = 1 AND o.status = 'open'",
        );
    }

    #[test]
    fn test_select_drops_schema_from_qualifier() {
        let (sql, report) = scoped("SELECT * FROM public.orders");
        assert_eq!(
            sql,
            normalized("SELECT * FROM public.orders WHERE orders.tenant_id = 1")
        );
        assert_eq!(report.tables_scoped, vec!["public.orders"]);
    }

    #[test]
    fn test_select_or_filter_is_parenthesized() {
        assert_scoped(
            "SELECT * FROM orders WHERE status = 'open' OR status = 'held'",
            "SELECT * FROM orders WHERE orders.tenant_id = 1 AND (status = 'open' OR status = 'held')",
        );
    }

    #[test]
    fn test_join_predicate_goes_into_on() {
        let (sql, report) = scoped(
            "SELECT * FROM orders AS o JOIN customers AS c ON c.id = o.customer_id",
        );
        assert_eq!(
            sql,
            normalized(
                "SELECT * FROM orders AS o JOIN customers AS c \
                 ON c.tenant_id = 1 AND c.id = o.customer_id WHERE o.tenant_id = 1"
            )
        );
        assert_eq!(report.tables_scoped, vec!["orders", "customers"]);
    }

    #[test]
    fn test_join_on_with_or_is_parenthesized() {
        assert_scoped(
            "SELECT * FROM orders AS o LEFT JOIN customers AS c ON c.id = o.buyer_id OR c.id = o.payer_id",
            "SELECT * FROM orders AS o LEFT JOIN customers AS c \
             ON c.tenant_id = 1 AND (c.id = o.buyer_id OR c.id = o.payer_id) WHERE o.tenant_id = 1",
        );
    }

    #[test]
    fn test_exempt_join_table_keeps_on() {
        let (sql, report) = scoped(
            "SELECT * FROM orders AS o JOIN products AS p ON p.id = o.product_id",
        );
        assert_eq!(
            sql,
            normalized(
                "SELECT * FROM orders AS o JOIN products AS p ON p.id = o.product_id \
                 WHERE o.tenant_id = 1"
            )
        );
        assert_eq!(report.tables_exempt, vec!["products"]);
    }

    #[test]
    fn test_exempt_from_table_short_circuits_joins() {
        assert_unchanged(
            "SELECT * FROM products AS p JOIN orders AS o ON o.product_id = p.id WHERE p.active",
        );
    }

    #[test]
    fn test_comma_join_scopes_through_where() {
        assert_scoped(
            "SELECT * FROM orders AS o, customers AS c WHERE c.id = o.customer_id",
            "SELECT * FROM orders AS o, customers AS c \
             WHERE o.tenant_id = 1 AND c.tenant_id = 1 AND c.id = o.customer_id",
        );
    }

    #[test]
    fn test_joins_without_on_scope_through_where() {
        assert_scoped(
            "SELECT * FROM orders AS o CROSS JOIN customers AS c",
            "SELECT * FROM orders AS o CROSS JOIN customers AS c \
             WHERE o.tenant_id = 1 AND c.tenant_id = 1",
        );
        assert_scoped(
            "SELECT * FROM orders AS o JOIN customers AS c USING (customer_id)",
            "SELECT * FROM orders AS o JOIN customers AS c USING (customer_id) \
             WHERE o.tenant_id = 1 AND c.tenant_id = 1",
        );
    }

    #[test]
    fn test_derived_table_is_scoped_inside() {
        assert_scoped(
            "SELECT t.id FROM (SELECT id FROM orders WHERE total > 10) AS t",
            "SELECT t.id FROM (SELECT id FROM orders WHERE orders.tenant_id = 1 AND total > 10) AS t",
        );
    }

    #[test]
    fn test_nested_join_scopes_left_table() {
        assert_scoped(
            "SELECT * FROM (orders AS o JOIN customers AS c ON c.id = o.customer_id)",
            "SELECT * FROM (orders AS o JOIN customers AS c ON c.tenant_id = 1 AND c.id = o.customer_id) \
             WHERE o.tenant_id = 1",
        );
    }

    #[test]
    fn test_lateral_subquery() {
        assert_scoped(
            "SELECT * FROM orders AS o CROSS JOIN LATERAL \
             (SELECT * FROM order_items AS i WHERE i.order_id = o.id) AS x",
            "SELECT * FROM orders AS o CROSS JOIN LATERAL \
             (SELECT * FROM order_items AS i WHERE i.tenant_id = 1 AND i.order_id = o.id) AS x \
             WHERE o.tenant_id = 1",
        );
    }

    #[test]
    fn test_set_operation_branches_scoped_independently() {
        let (sql, report) = scoped(
            "SELECT id FROM orders UNION SELECT id FROM products UNION ALL SELECT id FROM invoices",
        );
        assert_eq!(
            sql,
            normalized(
                "SELECT id FROM orders WHERE orders.tenant_id = 1 \
                 UNION SELECT id FROM products \
                 UNION ALL SELECT id FROM invoices WHERE invoices.tenant_id = 1"
            )
        );
        assert_eq!(report.tables_scoped, vec!["orders", "invoices"]);
        assert_eq!(report.tables_exempt, vec!["products"]);
    }

    #[test]
    fn test_cte_body_scoped_and_reference_left_alone() {
        assert_scoped(
            "WITH recent AS (SELECT * FROM orders WHERE created_at > '2024-01-01') \
             SELECT * FROM recent",
            "WITH recent AS (SELECT * FROM orders WHERE orders.tenant_id = 1 AND created_at > '2024-01-01') \
             SELECT * FROM recent",
        );
    }

    #[test]
    fn test_cte_shadowing_a_table_name() {
        // Inside its own (non-recursive) body, `orders` is still the base table
        assert_scoped(
            "WITH orders AS (SELECT * FROM orders) SELECT * FROM orders",
            "WITH orders AS (SELECT * FROM orders WHERE orders.tenant_id = 1) SELECT * FROM orders",
        );
    }

    #[test]
    fn test_recursive_cte() {
        assert_scoped(
            "WITH RECURSIVE tree AS (\
               SELECT id, parent_id FROM categories WHERE parent_id IS NULL \
               UNION ALL \
               SELECT c.id, c.parent_id FROM categories AS c JOIN tree AS t ON c.parent_id = t.id) \
             SELECT * FROM tree",
            "WITH RECURSIVE tree AS (\
               SELECT id, parent_id FROM categories WHERE categories.tenant_id = 1 AND parent_id IS NULL \
               UNION ALL \
               SELECT c.id, c.parent_id FROM categories AS c JOIN tree AS t ON c.parent_id = t.id \
               WHERE c.tenant_id = 1) \
             SELECT * FROM tree",
        );
    }

    #[test]
    fn test_subqueries_in_expressions() {
        assert_scoped(
            "SELECT * FROM customers WHERE id IN (SELECT customer_id FROM orders)",
            "SELECT * FROM customers WHERE customers.tenant_id = 1 \
             AND id IN (SELECT customer_id FROM orders WHERE orders.tenant_id = 1)",
        );
        assert_scoped(
            "SELECT * FROM customers AS c WHERE EXISTS (SELECT 1 FROM orders AS o WHERE o.customer_id = c.id)",
            "SELECT * FROM customers AS c WHERE c.tenant_id = 1 AND EXISTS \
             (SELECT 1 FROM orders AS o WHERE o.tenant_id = 1 AND o.customer_id = c.id)",
        );
        assert_scoped(
            "SELECT c.id, (SELECT count(*) FROM orders AS o WHERE o.customer_id = c.id) AS n FROM customers AS c",
            "SELECT c.id, (SELECT count(*) FROM orders AS o WHERE o.tenant_id = 1 AND o.customer_id = c.id) AS n \
             FROM customers AS c WHERE c.tenant_id = 1",
        );
    }

    #[test]
    fn test_subqueries_inside_any_expression_kind() {
        assert_scoped(
            "SELECT * FROM customers WHERE coalesce((SELECT max(total) FROM orders), 0) > 10",
            "SELECT * FROM customers WHERE customers.tenant_id = 1 \
             AND coalesce((SELECT max(total) FROM orders WHERE orders.tenant_id = 1), 0) > 10",
        );
        assert_scoped(
            "SELECT CASE WHEN EXISTS (SELECT 1 FROM orders) THEN 1 ELSE 0 END FROM customers",
            "SELECT CASE WHEN EXISTS (SELECT 1 FROM orders WHERE orders.tenant_id = 1) THEN 1 ELSE 0 END \
             FROM customers WHERE customers.tenant_id = 1",
        );
        assert_scoped(
            "SELECT * FROM customers WHERE name LIKE (SELECT p FROM patterns)",
            "SELECT * FROM customers WHERE customers.tenant_id = 1 \
             AND name LIKE (SELECT p FROM patterns WHERE patterns.tenant_id = 1)",
        );
        assert_scoped(
            "SELECT * FROM customers WHERE region IS DISTINCT FROM (SELECT region FROM offices)",
            "SELECT * FROM customers WHERE customers.tenant_id = 1 \
             AND region IS DISTINCT FROM (SELECT region FROM offices WHERE offices.tenant_id = 1)",
        );
    }

    #[test]
    fn test_order_by_and_group_by_subqueries() {
        assert_scoped(
            "SELECT * FROM customers ORDER BY (SELECT max(id) FROM orders)",
            "SELECT * FROM customers WHERE customers.tenant_id = 1 \
             ORDER BY (SELECT max(id) FROM orders WHERE orders.tenant_id = 1)",
        );
        assert_scoped(
            "SELECT count(*) FROM customers GROUP BY (SELECT min(id) FROM regions)",
            "SELECT count(*) FROM customers WHERE customers.tenant_id = 1 \
             GROUP BY (SELECT min(id) FROM regions WHERE regions.tenant_id = 1)",
        );
    }

    #[test]
    fn test_nested_subquery_scoped_once() {
        let (sql, report) = scoped(
            "SELECT * FROM customers WHERE coalesce((SELECT max(total) FROM orders \
             WHERE id IN (SELECT order_id FROM refunds)), 0) > 10",
        );
        assert_eq!(
            sql,
            normalized(
                "SELECT * FROM customers WHERE customers.tenant_id = 1 \
                 AND coalesce((SELECT max(total) FROM orders WHERE orders.tenant_id = 1 \
                 AND id IN (SELECT order_id FROM refunds WHERE refunds.tenant_id = 1)), 0) > 10"
            )
        );
        assert_eq!(report.tables_scoped, vec!["customers", "orders", "refunds"]);
    }

    #[test]
    fn test_values_derived_table_is_reported() {
        let sql = "SELECT * FROM (VALUES (1), (2)) AS v (id)";
        assert_unchanged(sql);
        let (_, report) = scoped(sql);
        assert_eq!(
            report.warnings,
            vec![UnsupportedConstruct::ValuesDerivedTable {
                alias: Some("v".to_string())
            }]
        );
    }

    #[test]
    fn test_values_join_still_scopes_the_rest() {
        let (sql, report) = scoped(
            "SELECT * FROM orders AS o JOIN (VALUES (1)) AS v (id) ON v.id = o.id",
        );
        assert_eq!(
            sql,
            normalized(
                "SELECT * FROM orders AS o JOIN (VALUES (1)) AS v (id) ON v.id = o.id \
                 WHERE o.tenant_id = 1"
            )
        );
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_table_function_is_reported() {
        let (sql, report) = scoped("SELECT * FROM generate_series(1, 3) AS g");
        assert_eq!(sql, normalized("SELECT * FROM generate_series(1, 3) AS g"));
        assert!(matches!(
            report.warnings.as_slice(),
            [UnsupportedConstruct::TableFactor { .. }]
        ));
    }

    #[test]
    fn test_insert_values() {
        assert_scoped(
            "INSERT INTO orders (id, status) VALUES (1, 'open'), (2, 'closed')",
            "INSERT INTO orders (id, status, tenant_id) VALUES (1, 'open', 1), (2, 'closed', 1)",
        );
        assert_scoped(
            "INSERT INTO orders (id) VALUES (1)",
            "INSERT INTO orders (id, tenant_id) VALUES (1, 1)",
        );
    }

    #[test]
    fn test_insert_into_exempt_table() {
        assert_unchanged("INSERT INTO products (id, name) VALUES (1, 'widget')");
    }

    #[test]
    fn test_insert_select_projects_tenant_column() {
        assert_scoped(
            "INSERT INTO orders (id, status) SELECT id, status FROM staged_orders WHERE ready",
            "INSERT INTO orders (id, status, tenant_id) \
             SELECT id, status, tenant_id FROM staged_orders WHERE staged_orders.tenant_id = 1 AND ready",
        );
    }

    #[test]
    fn test_insert_select_union_projects_every_branch() {
        assert_scoped(
            "INSERT INTO orders (id) SELECT id FROM staged_orders UNION ALL SELECT 7",
            "INSERT INTO orders (id, tenant_id) \
             SELECT id, tenant_id FROM staged_orders WHERE staged_orders.tenant_id = 1 \
             UNION ALL SELECT 7, 1",
        );
    }

    #[test]
    fn test_insert_select_from_derived_projects_value() {
        assert_scoped(
            "INSERT INTO orders (id) SELECT t.id FROM (SELECT id FROM staged_orders) AS t",
            "INSERT INTO orders (id, tenant_id) \
             SELECT t.id, 1 FROM (SELECT id FROM staged_orders WHERE staged_orders.tenant_id = 1) AS t",
        );
    }

    #[test]
    fn test_insert_on_conflict_update_is_scoped() {
        assert_scoped(
            "INSERT INTO orders (id, total) VALUES (1, 2) \
             ON CONFLICT (id) DO UPDATE SET total = (SELECT 1 FROM invoices)",
            "INSERT INTO orders (id, total, tenant_id) VALUES (1, 2, 1) \
             ON CONFLICT (id) DO UPDATE SET total = (SELECT 1 FROM invoices WHERE invoices.tenant_id = 1)",
        );
    }

    #[test]
    fn test_insert_without_source_is_rejected() {
        assert_eq!(
            rewrite_err("INSERT INTO orders DEFAULT VALUES"),
            ConfigurationError::InsertWithoutSource {
                table: "orders".to_string()
            }
        );
    }

    #[test]
    fn test_insert_without_column_list_is_rejected() {
        assert_eq!(
            rewrite_err("INSERT INTO orders VALUES (1, 'open')"),
            ConfigurationError::InsertWithoutColumnList {
                table: "orders".to_string()
            }
        );
    }

    #[test]
    fn test_update() {
        assert_scoped(
            "UPDATE orders SET status = 'shipped' WHERE id = 5 AND status = 'open'",
            "UPDATE orders SET status = 'shipped' WHERE orders.tenant_id = 1 AND id = 5 AND status = 'open'",
        );
        assert_scoped(
            "UPDATE orders SET status = 'shipped'",
            "UPDATE orders SET status = 'shipped' WHERE orders.tenant_id = 1",
        );
    }

    #[test]
    fn test_update_scopes_subqueries() {
        assert_scoped(
            "UPDATE orders SET total = (SELECT sum(amount) FROM order_items WHERE order_items.order_id = orders.id)",
            "UPDATE orders SET total = (SELECT sum(amount) FROM order_items \
             WHERE order_items.tenant_id = 1 AND order_items.order_id = orders.id) \
             WHERE orders.tenant_id = 1",
        );
    }

    #[test]
    fn test_update_scopes_subqueries_inside_function_calls() {
        assert_scoped(
            "UPDATE customers SET balance = coalesce((SELECT sum(total) FROM orders), 0)",
            "UPDATE customers SET balance = coalesce((SELECT sum(total) FROM orders \
             WHERE orders.tenant_id = 1), 0) WHERE customers.tenant_id = 1",
        );
    }

    #[test]
    fn test_update_of_exempt_table() {
        assert_unchanged("UPDATE products SET price = 10 WHERE id = 1");
    }

    #[test]
    fn test_multi_table_update_is_rejected() {
        let err = rewrite_err(
            "UPDATE orders SET status = 'paid' FROM payments WHERE payments.order_id = orders.id",
        );
        assert!(matches!(err, ConfigurationError::MultiTableUpdate { .. }));
    }

    #[test]
    fn test_delete() {
        assert_scoped(
            "DELETE FROM orders WHERE status = 'void' OR total = 0",
            "DELETE FROM orders WHERE orders.tenant_id = 1 AND (status = 'void' OR total = 0)",
        );
        assert_scoped(
            "DELETE FROM orders",
            "DELETE FROM orders WHERE orders.tenant_id = 1",
        );
    }

    #[test]
    fn test_delete_of_exempt_table() {
        assert_unchanged("DELETE FROM products WHERE id = 1");
    }

    #[test]
    fn test_delete_using_is_rejected() {
        let err = rewrite_err(
            "DELETE FROM orders USING customers WHERE customers.id = orders.customer_id",
        );
        assert!(matches!(err, ConfigurationError::MultiTableDelete { .. }));
    }

    #[test]
    fn test_other_statements_pass_through() {
        assert_unchanged("COMMIT");
    }

    #[test]
    fn test_explain_scopes_wrapped_statement() {
        assert_scoped(
            "EXPLAIN ANALYZE DELETE FROM orders",
            "EXPLAIN ANALYZE DELETE FROM orders WHERE orders.tenant_id = 1",
        );
        assert_scoped(
            "EXPLAIN SELECT * FROM orders",
            "EXPLAIN SELECT * FROM orders WHERE orders.tenant_id = 1",
        );
    }

    #[test]
    fn test_rewrite_is_not_idempotent() {
        let mut statement = parse("SELECT * FROM orders");
        let rewriter = StatementRewriter::new(FakePolicy);
        rewriter.rewrite(&mut statement).unwrap();
        rewriter.rewrite(&mut statement).unwrap();
        assert_eq!(
            statement.to_string(),
            normalized(
                "SELECT * FROM orders WHERE orders.tenant_id = 1 AND orders.tenant_id = 1"
            )
        );
    }

    #[test]
    fn test_free_function_with_dyn_policy() {
        let policy: &dyn TenantPolicy = &FakePolicy;
        let mut statement = parse("DELETE FROM orders");
        let report = rewrite(&mut statement, policy).unwrap();
        assert!(report.is_modified());
        assert_eq!(report.predicates_added, vec!["orders.tenant_id = 1"]);
    }
}
