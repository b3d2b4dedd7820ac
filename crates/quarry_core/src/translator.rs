//! Selector to SQL translation.
//!
//! A canonical [`Selector`] is compiled into a [`QueryNode`] tree whose
//! leaves are parameterized `SELECT _id` statements against index tables.
//! The executor evaluates the tree bottom-up: `And` intersects the id sets of
//! its children, `Or` unites them.
//!
//! # Index selection
//!
//! At an `$and` level every field clause must be answered by one JSON index
//! that has a column for each clause field. Under an `$or` each field clause
//! is answered on its own. When several indexes qualify, the first one in
//! catalog order is used. Text indexes only answer `$text` clauses.
//!
//! # Coverage
//!
//! A clause with no usable index leaves the query uncovered. If the query
//! used no index at all, or an `$or` branch lost an index (its union would
//! silently drop documents), the whole tree is replaced by a scan of every
//! document. Uncovered results are re-filtered by the unindexed matcher,
//! which cannot evaluate `$text`, so a text query must be fully covered.

use crate::catalog::{table_name_for_index, IndexDefinition, IndexType};
use crate::error::{CoreError, CoreResult};
use crate::selector::{Clause, Compound, Operator, Predicate, Scalar, Selector};
use crate::value::quote_identifier;
use quarry_sql::rusqlite::types::Value as SqlValue;
use tracing::debug;

/// A parameterized SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParts {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Values bound to the placeholders, in order.
    pub params: Vec<SqlValue>,
}

impl SqlParts {
    /// Creates a statement with its parameters.
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A node of a translated query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Intersection of the children's id sets.
    And(Vec<QueryNode>),
    /// Union of the children's id sets.
    Or(Vec<QueryNode>),
    /// A statement returning `_id`s; `None` stands for every live document.
    Sql(Option<SqlParts>),
}

/// The result of [`translate_query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Root of the node tree.
    pub root: QueryNode,
    /// True when the tree answers the selector exactly.
    pub covered: bool,
}

#[derive(Debug, Default)]
struct TranslationState {
    text_required: bool,
    text_missing: bool,
    index_missing: bool,
    or_index_missing: bool,
    index_used: bool,
}

impl TranslationState {
    fn missing(&mut self, under_or: bool) {
        self.index_missing = true;
        if under_or {
            self.or_index_missing = true;
        }
    }
}

type FieldClause<'a> = (&'a str, &'a Predicate);

/// Compiles a canonical selector against the given indexes.
///
/// # Errors
///
/// Returns `IllegalState` when the selector contains `$text` and there is no
/// text index, or when a text query has clauses no index can answer.
pub fn translate_query(selector: &Selector, indexes: &[IndexDefinition]) -> CoreResult<Translation> {
    let mut state = TranslationState::default();
    let root = translate(selector, indexes, &mut state, false)?;

    if state.text_missing {
        return Err(CoreError::illegal_state(
            "text search requires a text index but none exists",
        ));
    }
    if state.text_required && state.index_missing {
        return Err(CoreError::illegal_state(
            "text search cannot be combined with clauses no index can answer",
        ));
    }

    if !state.text_required && (!state.index_used || state.or_index_missing) {
        return Ok(Translation {
            root: QueryNode::And(vec![QueryNode::Sql(None)]),
            covered: false,
        });
    }

    Ok(Translation {
        root,
        covered: !state.index_missing,
    })
}

fn translate(
    selector: &Selector,
    indexes: &[IndexDefinition],
    state: &mut TranslationState,
    under_or: bool,
) -> CoreResult<QueryNode> {
    let mut basic: Vec<FieldClause<'_>> = Vec::new();
    let mut text: Option<&str> = None;
    let mut ors: Vec<&Selector> = Vec::new();
    let mut ands: Vec<&Selector> = Vec::new();

    for clause in &selector.clauses {
        match clause {
            Clause::Field { field, predicate } => basic.push((field.as_str(), predicate)),
            Clause::Text { search } => text = Some(search.as_str()),
            Clause::Compound(inner) => match inner.op {
                Compound::And => ands.push(inner),
                Compound::Or => ors.push(inner),
            },
        }
    }

    let under_or = under_or || selector.op == Compound::Or;
    let mut children = Vec::new();

    match selector.op {
        Compound::And => {
            if !basic.is_empty() {
                if let Some(node) = sql_for_clauses(&basic, indexes, state, under_or)? {
                    children.push(node);
                }
            }
        }
        Compound::Or => {
            for clause in &basic {
                if let Some(node) = sql_for_clauses(std::slice::from_ref(clause), indexes, state, under_or)? {
                    children.push(node);
                }
            }
        }
    }

    if let Some(search) = text {
        state.text_required = true;
        match indexes.iter().find(|i| i.index_type == IndexType::Text) {
            Some(index) => {
                let table = quote_identifier(&index.table_name());
                children.push(QueryNode::Sql(Some(SqlParts::new(
                    format!("SELECT _id FROM {} WHERE {} MATCH ?", table, table),
                    vec![SqlValue::Text(search.to_string())],
                ))));
            }
            None => state.text_missing = true,
        }
    }

    for inner in ors.into_iter().chain(ands) {
        children.push(translate(inner, indexes, state, under_or)?);
    }

    Ok(match selector.op {
        Compound::And => QueryNode::And(children),
        Compound::Or => QueryNode::Or(children),
    })
}

fn sql_for_clauses(
    clauses: &[FieldClause<'_>],
    indexes: &[IndexDefinition],
    state: &mut TranslationState,
    under_or: bool,
) -> CoreResult<Option<QueryNode>> {
    if clauses
        .iter()
        .any(|(_, p)| matches!(p.operator(), Operator::Size(_)))
    {
        debug!("$size cannot be answered from an index");
        state.missing(under_or);
        return Ok(None);
    }

    let fields: Vec<&str> = clauses.iter().map(|(f, _)| *f).collect();
    match choose_index_for_fields(&fields, indexes) {
        Some(index) => {
            state.index_used = true;
            Ok(Some(QueryNode::Sql(Some(select_statement_for_and_clause(
                clauses,
                &index.name,
            )?))))
        }
        None => {
            debug!(fields = ?fields, "no index covers clause fields");
            state.missing(under_or);
            Ok(None)
        }
    }
}

/// Returns the first JSON index with a column for every field.
fn choose_index_for_fields<'a>(fields: &[&str], indexes: &'a [IndexDefinition]) -> Option<&'a IndexDefinition> {
    if fields.is_empty() {
        return None;
    }
    indexes
        .iter()
        .filter(|i| i.index_type == IndexType::Json)
        .find(|i| i.covers(fields.iter().copied()))
}

/// Builds `SELECT _id FROM <index table> WHERE <clauses>`.
///
/// # Errors
///
/// Returns `InvalidArgument` if `clauses` or `index_name` is empty.
pub fn select_statement_for_and_clause(clauses: &[FieldClause<'_>], index_name: &str) -> CoreResult<SqlParts> {
    let where_clause = where_sql_for_and_clause(clauses, index_name)?;
    Ok(SqlParts::new(
        format!(
            "SELECT _id FROM {} WHERE {}",
            quote_identifier(&table_name_for_index(index_name)),
            where_clause.sql
        ),
        where_clause.params,
    ))
}

/// Builds the `AND`-joined condition for a list of field clauses.
///
/// Negated operators become anti-joins against the index table so that a
/// document is excluded only when none of its exploded rows match.
///
/// # Errors
///
/// Returns `InvalidArgument` if `clauses` or `index_name` is empty.
pub fn where_sql_for_and_clause(clauses: &[FieldClause<'_>], index_name: &str) -> CoreResult<SqlParts> {
    if clauses.is_empty() {
        return Err(CoreError::invalid_argument("clauses must not be empty"));
    }
    if index_name.is_empty() {
        return Err(CoreError::invalid_argument("index name must not be empty"));
    }

    let table = quote_identifier(&table_name_for_index(index_name));
    let mut fragments = Vec::with_capacity(clauses.len());
    let mut params = Vec::new();

    for (field, predicate) in clauses {
        let column = quote_identifier(field);
        let fragment = match predicate {
            Predicate::Op(op) => operator_sql(&column, op, &mut params)?,
            Predicate::Not(Operator::Exists(exists)) => exists_sql(&column, !exists),
            Predicate::Not(op) => {
                let inner = operator_sql(&column, op, &mut params)?;
                format!("_id NOT IN (SELECT _id FROM {} WHERE {})", table, inner)
            }
        };
        fragments.push(fragment);
    }

    Ok(SqlParts::new(fragments.join(" AND "), params))
}

fn exists_sql(column: &str, exists: bool) -> String {
    if exists {
        format!("({} IS NOT NULL)", column)
    } else {
        format!("({} IS NULL)", column)
    }
}

fn operator_sql(column: &str, op: &Operator, params: &mut Vec<SqlValue>) -> CoreResult<String> {
    let comparison = |symbol: &str, value: &Scalar, params: &mut Vec<SqlValue>| {
        params.push(scalar_to_sql(value));
        format!("{} {} ?", column, symbol)
    };

    Ok(match op {
        Operator::Eq(v) => comparison("=", v, params),
        Operator::Gt(v) => comparison(">", v, params),
        Operator::Gte(v) => comparison(">=", v, params),
        Operator::Lt(v) => comparison("<", v, params),
        Operator::Lte(v) => comparison("<=", v, params),
        Operator::Exists(exists) => exists_sql(column, *exists),
        Operator::In(values) => {
            params.extend(values.iter().map(scalar_to_sql));
            format!("{} IN ( {} )", column, vec!["?"; values.len()].join(", "))
        }
        Operator::Mod { divisor, remainder } => {
            params.push(SqlValue::Integer(*divisor));
            params.push(SqlValue::Integer(*remainder));
            // Text would be coerced by `%`; only numbers take part, as in the matcher.
            format!(
                "( typeof({c}) IN ('integer', 'real') AND {c} % ? = CAST(? AS INTEGER) )",
                c = column
            )
        }
        Operator::Size(_) => {
            return Err(CoreError::illegal_state("$size has no SQL translation"));
        }
    })
}

/// Converts a selector operand to the value bound in SQL.
pub(crate) fn scalar_to_sql(value: &Scalar) -> SqlValue {
    match value {
        Scalar::String(s) => SqlValue::Text(s.clone()),
        Scalar::Integer(i) => SqlValue::Integer(*i),
        Scalar::Float(f) => SqlValue::Real(*f),
        Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
    }
}
