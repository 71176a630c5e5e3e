//! Query builder
//!
//! A [`Query`] is immutable: `filter`, `filter_by`, `order_by`, `offset` and
//! `limit` each return a new query, so a partially built query can be reused
//! as the base of several others.
//!
//! ## Resolution
//!
//! Every query orders by exactly one indexed field. The distinct set of the
//! sort field plus all filtered fields picks the physical index:
//! - one field: the base index `model:field`
//! - two fields, one being the meta field: the meta index
//! - otherwise: the unique composite index whose fields are exactly that set
//!
//! Anything else is a query construction error, raised before the store is
//! touched. `in_` filters expand into several logical keys (the cartesian
//! product of their values) which are merged by a cached union.
//!
//! ## Bounds
//!
//! Filters on the sort field become score bounds: `lt`/`gt` exclusive,
//! `lte`/`gte` inclusive, `between` inclusive on both ends. `ne` reads the
//! two segments on either side of the value.

use kvmodel_core::keys::{base_index_key, composite_index_key, meta_index_key};
use kvmodel_core::{Attribute, Error, Result, ValidationErrors, Value};
use kvmodel_storage::ScoreBound;
use tracing::debug;

use crate::heal;
use crate::model::Model;
use crate::record::Record;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Inclusive range
    Between,
    /// Membership
    In,
}

impl Op {
    /// Operator name as used in messages
    pub fn name(&self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Between => "between",
            Op::In => "in_",
        }
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// One value
    Single(Value),
    /// Low and high bound
    Range(Value, Value),
    /// Membership list
    List(Vec<Value>),
}

impl Operand {
    fn values(&self) -> Vec<&Value> {
        match self {
            Operand::Single(v) => vec![v],
            Operand::Range(lo, hi) => vec![lo, hi],
            Operand::List(vs) => vs.iter().collect(),
        }
    }
}

/// One filter: `field op operand`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    field: String,
    op: Op,
    operand: Operand,
}

impl Condition {
    /// Build a condition from its parts
    pub fn new(field: impl Into<String>, op: Op, operand: Operand) -> Self {
        Self {
            field: field.into(),
            op,
            operand,
        }
    }

    /// Filtered field
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Operator
    pub fn op(&self) -> Op {
        self.op
    }

    /// Operand
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    fn shape_ok(&self) -> bool {
        matches!(
            (self.op, &self.operand),
            (Op::Between, Operand::Range(..))
                | (Op::In, Operand::List(_))
                | (Op::Eq | Op::Ne | Op::Lt | Op::Lte | Op::Gt | Op::Gte, Operand::Single(_))
        )
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Lowest score first
    #[default]
    Asc,
    /// Highest score first
    Desc,
}

/// Sort field and direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    direction: Direction,
}

impl OrderBy {
    /// Ascending on `field`
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending on `field`
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Sort field
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Direction
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Expression helper: `field("notice_id").eq(2)`
#[derive(Debug, Clone)]
pub struct Field(String);

/// Start an expression on `name`
pub fn field(name: impl Into<String>) -> Field {
    Field(name.into())
}

impl Field {
    fn single(&self, op: Op, value: impl Into<Value>) -> Condition {
        Condition::new(self.0.clone(), op, Operand::Single(value.into()))
    }

    /// `field == value`
    pub fn eq(&self, value: impl Into<Value>) -> Condition {
        self.single(Op::Eq, value)
    }

    /// `field != value`
    pub fn ne(&self, value: impl Into<Value>) -> Condition {
        self.single(Op::Ne, value)
    }

    /// `field < value`
    pub fn lt(&self, value: impl Into<Value>) -> Condition {
        self.single(Op::Lt, value)
    }

    /// `field <= value`
    pub fn lte(&self, value: impl Into<Value>) -> Condition {
        self.single(Op::Lte, value)
    }

    /// `field > value`
    pub fn gt(&self, value: impl Into<Value>) -> Condition {
        self.single(Op::Gt, value)
    }

    /// `field >= value`
    pub fn gte(&self, value: impl Into<Value>) -> Condition {
        self.single(Op::Gte, value)
    }

    /// `low <= field <= high`
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Condition {
        Condition::new(
            self.0.clone(),
            Op::Between,
            Operand::Range(low.into(), high.into()),
        )
    }

    /// `field` is one of `values`
    pub fn in_<I, V>(&self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::new(
            self.0.clone(),
            Op::In,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Ascending order on this field
    pub fn asc(&self) -> OrderBy {
        OrderBy::asc(self.0.clone())
    }

    /// Descending order on this field
    pub fn desc(&self) -> OrderBy {
        OrderBy::desc(self.0.clone())
    }
}

/// How the sort field's own filter reads the index
enum Scan {
    Rank,
    Score(ScoreBound, ScoreBound),
    Around(f64),
}

/// Immutable query over one model
#[derive(Clone)]
pub struct Query {
    model: Model,
    conditions: Vec<Condition>,
    order: Option<OrderBy>,
    offset: usize,
    limit: Option<usize>,
}

impl Query {
    pub(crate) fn new(model: Model) -> Self {
        Self {
            model,
            conditions: Vec::new(),
            order: None,
            offset: 0,
            limit: None,
        }
    }

    /// Conditions so far
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Ordering, once set
    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order.as_ref()
    }

    fn attribute(&self, name: &str) -> Result<&Attribute> {
        self.model
            .schema()
            .attribute(name)
            .ok_or_else(|| Error::query(format!("unknown field '{}'", name)))
    }

    /// The indexed field this query already uses, if any
    fn indexed_field(&self) -> Option<&str> {
        let schema = self.model.schema();
        self.order
            .as_ref()
            .map(|o| o.field.as_str())
            .or_else(|| {
                self.conditions
                    .iter()
                    .map(|c| c.field.as_str())
                    .find(|f| schema.is_indexed(f))
            })
    }

    /// Add a condition
    ///
    /// A later condition on the same field replaces the earlier one.
    ///
    /// # Errors
    ///
    /// - `Error::Query` for a field that is neither indexed nor index-value,
    ///   a second indexed field, a range operator on an index-value field,
    ///   `in_` on an indexed field, or (once ordered) an unresolvable index
    /// - `Error::Validation` if a value fails the attribute's validation
    pub fn filter(&self, condition: Condition) -> Result<Query> {
        let attr = self.attribute(&condition.field)?;
        let name = attr.name();

        if !attr.is_indexed() && !attr.is_index_value() {
            return Err(Error::query(format!(
                "'{}' is neither indexed nor index_value",
                name
            )));
        }
        if !condition.shape_ok() {
            return Err(Error::query(format!(
                "operand does not fit operator {} on '{}'",
                condition.op.name(),
                name
            )));
        }
        if attr.is_index_value() && !matches!(condition.op, Op::Eq | Op::In) {
            return Err(Error::query(format!(
                "index_value field '{}' only supports eq and in_, not {}",
                name,
                condition.op.name()
            )));
        }
        if attr.is_indexed() {
            if condition.op == Op::In {
                return Err(Error::query(format!(
                    "in_ is not supported on indexed field '{}'",
                    name
                )));
            }
            if let Some(other) = self.indexed_field() {
                if other != name {
                    return Err(Error::query(format!(
                        "only one indexed field per query: '{}' and '{}'",
                        other, name
                    )));
                }
            }
        }
        if let Operand::List(values) = &condition.operand {
            if values.is_empty() {
                return Err(Error::query(format!("in_ on '{}' needs at least one value", name)));
            }
        }

        let mut errors = ValidationErrors::new();
        for value in condition.operand.values() {
            errors.extend(attr.validate(value));
        }
        errors.into_result()?;

        let mut next = self.clone();
        next.conditions.retain(|c| c.field != condition.field);
        next.conditions.push(condition);
        if next.order.is_some() {
            next.resolve_keys()?;
        }
        Ok(next)
    }

    /// Equality filter, `filter(field(name).eq(value))`
    pub fn filter_by(&self, name: &str, value: impl Into<Value>) -> Result<Query> {
        self.filter(field(name).eq(value))
    }

    /// Set the sort field and direction
    ///
    /// # Errors
    ///
    /// `Error::Query` if the field is not indexed, another indexed field is
    /// filtered on, or no index covers the filtered fields.
    pub fn order_by(&self, order: OrderBy) -> Result<Query> {
        let attr = self.attribute(&order.field)?;
        if !attr.is_indexed() {
            return Err(Error::query(format!(
                "cannot order by '{}': not an indexed field",
                order.field
            )));
        }
        let schema = self.model.schema();
        if let Some(other) = self
            .conditions
            .iter()
            .find(|c| c.field != order.field && schema.is_indexed(&c.field))
        {
            return Err(Error::query(format!(
                "only one indexed field per query: '{}' and '{}'",
                other.field, order.field
            )));
        }
        let mut next = self.clone();
        next.order = Some(order);
        next.resolve_keys()?;
        Ok(next)
    }

    /// Skip the first `n` results
    pub fn offset(&self, n: usize) -> Query {
        let mut next = self.clone();
        next.offset = n;
        next
    }

    /// Return at most `n` results
    ///
    /// # Errors
    ///
    /// `Error::Parameter` for a zero limit.
    pub fn limit(&self, n: usize) -> Result<Query> {
        if n == 0 {
            return Err(Error::parameter("limit must be at least 1"));
        }
        let mut next = self.clone();
        next.limit = Some(n);
        Ok(next)
    }

    fn encoded_values(&self, name: &str) -> Result<Vec<String>> {
        let attr = self.attribute(name)?;
        let condition = self
            .conditions
            .iter()
            .find(|c| c.field == name)
            .ok_or_else(|| Error::query(format!("no filter on '{}'", name)))?;
        let mut out: Vec<String> = Vec::new();
        for value in condition.operand.values() {
            let encoded = attr.encode(value)?;
            if !out.contains(&encoded) {
                out.push(encoded);
            }
        }
        Ok(out)
    }

    /// Logical index keys this query reads, before healing and merging
    ///
    /// More than one key means `in_` expansion.
    pub fn resolve_keys(&self) -> Result<Vec<String>> {
        let order = self
            .order
            .as_ref()
            .ok_or_else(|| Error::query("order_by is required"))?;
        let schema = self.model.schema();
        let model = schema.name();
        let sort = order.field.as_str();

        let mut filters: Vec<&str> = Vec::new();
        for c in &self.conditions {
            if c.field != sort && !filters.contains(&c.field.as_str()) {
                filters.push(&c.field);
            }
        }

        if filters.is_empty() {
            return Ok(vec![base_index_key(model, sort)]);
        }

        if let (1, Some(meta)) = (filters.len(), schema.meta_field()) {
            if filters[0] == meta {
                return Ok(self
                    .encoded_values(meta)?
                    .iter()
                    .map(|v| meta_index_key(model, meta, v, sort))
                    .collect());
            }
        }

        let tuple = schema
            .unique_indexes()
            .iter()
            .find(|t| {
                t.last().map(String::as_str) == Some(sort)
                    && t.len() == filters.len() + 1
                    && filters.iter().all(|f| t.iter().any(|name| name.as_str() == *f))
            })
            .ok_or_else(|| {
                let mut fields = filters.clone();
                fields.push(sort);
                Error::query(format!("no unique index covers fields {:?}", fields))
            })?;

        // cartesian product over the tuple's filter fields, in declaration order
        let mut combos: Vec<Vec<(&str, String)>> = vec![Vec::new()];
        for name in &tuple[..tuple.len() - 1] {
            let values = self.encoded_values(name)?;
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in &values {
                    let mut extended = combo.clone();
                    extended.push((name.as_str(), value.clone()));
                    next.push(extended);
                }
            }
            combos = next;
        }

        Ok(combos
            .iter()
            .map(|pairs| composite_index_key(model, pairs.iter().map(|(f, v)| (*f, v.as_str())), sort))
            .collect())
    }

    /// Resolve, heal and merge down to the one key to read
    fn physical_key(&self) -> Result<String> {
        let keys = self.resolve_keys()?;
        let store = self.model.store();
        if let Some(policy) = self.model.policy() {
            let now = self.model.now();
            for key in &keys {
                heal::ensure_rolling(store, &policy, key, now)?;
            }
        }
        heal::union_cache(
            store,
            self.model.name(),
            &keys,
            self.model.config().union_cache_ttl_secs,
        )
    }

    fn scan(&self, sort: &str) -> Result<Scan> {
        let condition = match self.conditions.iter().find(|c| c.field == sort) {
            Some(c) => c,
            None => return Ok(Scan::Rank),
        };
        let attr = self.attribute(sort)?;
        let score = |value: &Value| -> Result<f64> {
            attr.score(value)?
                .ok_or_else(|| Error::query(format!("cannot compare '{}' against null", sort)))
        };
        Ok(match (&condition.op, &condition.operand) {
            (Op::Eq, Operand::Single(v)) => {
                let s = score(v)?;
                Scan::Score(ScoreBound::Inclusive(s), ScoreBound::Inclusive(s))
            }
            (Op::Ne, Operand::Single(v)) => Scan::Around(score(v)?),
            (Op::Lt, Operand::Single(v)) => {
                Scan::Score(ScoreBound::NegInf, ScoreBound::Exclusive(score(v)?))
            }
            (Op::Lte, Operand::Single(v)) => {
                Scan::Score(ScoreBound::NegInf, ScoreBound::Inclusive(score(v)?))
            }
            (Op::Gt, Operand::Single(v)) => {
                Scan::Score(ScoreBound::Exclusive(score(v)?), ScoreBound::PosInf)
            }
            (Op::Gte, Operand::Single(v)) => {
                Scan::Score(ScoreBound::Inclusive(score(v)?), ScoreBound::PosInf)
            }
            (Op::Between, Operand::Range(lo, hi)) => {
                Scan::Score(ScoreBound::Inclusive(score(lo)?), ScoreBound::Inclusive(score(hi)?))
            }
            (op, _) => {
                return Err(Error::query(format!(
                    "operator {} cannot bound '{}'",
                    op.name(),
                    sort
                )))
            }
        })
    }

    /// Record ids in result order, without fetching the records
    pub fn ids(&self) -> Result<Vec<String>> {
        let order = self
            .order
            .as_ref()
            .ok_or_else(|| Error::query("order_by is required"))?;
        let scan = self.scan(&order.field)?;
        let key = self.physical_key()?;
        let store = self.model.store();
        let rev = order.direction == Direction::Desc;
        let offset = self.offset;
        let limit = self.limit.unwrap_or(self.model.config().default_limit);

        let ids = match scan {
            Scan::Rank => {
                let start = i64::try_from(offset).unwrap_or(i64::MAX);
                let stop = i64::try_from(offset.saturating_add(limit) - 1).unwrap_or(i64::MAX);
                store.zrange(&key, start, stop, rev)?
            }
            Scan::Score(min, max) => store.zrangebyscore(&key, min, max, offset, Some(limit), rev)?,
            Scan::Around(s) => {
                let below = (ScoreBound::NegInf, ScoreBound::Exclusive(s));
                let above = (ScoreBound::Exclusive(s), ScoreBound::PosInf);
                let (first, second) = if rev { (above, below) } else { (below, above) };
                let first_len = store.zcount(&key, first.0, first.1)? as usize;
                if offset < first_len {
                    let mut ids =
                        store.zrangebyscore(&key, first.0, first.1, offset, Some(limit), rev)?;
                    let remaining = limit - ids.len();
                    if remaining > 0 {
                        ids.extend(store.zrangebyscore(
                            &key,
                            second.0,
                            second.1,
                            0,
                            Some(remaining),
                            rev,
                        )?);
                    }
                    ids
                } else {
                    store.zrangebyscore(
                        &key,
                        second.0,
                        second.1,
                        offset - first_len,
                        Some(limit),
                        rev,
                    )?
                }
            }
        };

        debug!(
            target: "kvmodel::query",
            model = self.model.name(),
            key = %key,
            offset,
            limit,
            found = ids.len(),
            "Ranged read"
        );
        Ok(ids)
    }

    /// Matching records in result order
    ///
    /// Ids whose record hash is gone (expired or deleted) are skipped.
    pub fn all(&self) -> Result<Vec<Record>> {
        let ids = self.ids()?;
        Ok(self
            .model
            .batch_get_by_ids(&ids)?
            .into_iter()
            .flatten()
            .collect())
    }

    /// First matching record
    pub fn first(&self) -> Result<Option<Record>> {
        Ok(self.limit(1)?.all()?.into_iter().next())
    }

    /// Members of the resolved index with scores in `[min, max]`
    pub fn count(&self, min: ScoreBound, max: ScoreBound) -> Result<u64> {
        let key = self.physical_key()?;
        self.model.store().zcount(&key, min, max)
    }

    /// Members of the resolved index
    pub fn count_all(&self) -> Result<u64> {
        let key = self.physical_key()?;
        self.model.store().zcard(&key)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model.name())
            .field("conditions", &self.conditions)
            .field("order", &self.order)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}
