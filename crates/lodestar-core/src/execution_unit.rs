//! Relational-algebra execution units
//!
//! An execution unit is the flattened, compiler-facing description of one
//! query step (scan, filter, join, aggregate, sort). The code generator only
//! reads it: it walks the expression lists to find constant leaves, and the
//! executor uses [`RelAlgExecutionUnit::desc_for_caching`] to key compiled
//! kernels.
//!
//! Predicate, join and group-by lists are owned by the unit. Target
//! expressions are shared with the rest of the plan through [`Arc`].

use crate::types::{Constant, TypeInfo};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

impl fmt::Display for SqlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
        };
        f.write_str(s)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `NOT`
    Not,
    /// Arithmetic negation
    UMinus,
    /// `IS NULL`
    IsNull,
    /// Type cast
    Cast,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Not => "NOT",
            Self::UMinus => "-",
            Self::IsNull => "IS NULL",
            Self::Cast => "CAST",
        };
        f.write_str(s)
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggKind {
    /// `COUNT`
    Count,
    /// `SUM`
    Sum,
    /// `MIN`
    Min,
    /// `MAX`
    Max,
    /// `AVG`
    Avg,
    /// `APPROX_COUNT_DISTINCT`
    ApproxCountDistinct,
}

impl fmt::Display for AggKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
            Self::ApproxCountDistinct => "APPROX_COUNT_DISTINCT",
        };
        f.write_str(s)
    }
}

/// Column reference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnVar {
    /// Table id
    pub table_id: i32,
    /// Column id within the table
    pub column_id: i32,
    /// Range table entry (nesting level) the column is read from
    pub rte_idx: usize,
    /// Column type
    pub type_info: TypeInfo,
}

impl fmt::Display for ColumnVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(ColumnVar table: {} column: {} rte: {} {})",
            self.table_id, self.column_id, self.rte_idx, self.type_info
        )
    }
}

/// Analyzed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant leaf
    Constant(Constant),
    /// Column reference
    ColumnVar(ColumnVar),
    /// Binary operation
    BinOper {
        /// Result type
        type_info: TypeInfo,
        /// Operator
        op: SqlOp,
        /// Left operand
        left: Arc<Expr>,
        /// Right operand
        right: Arc<Expr>,
    },
    /// Unary operation
    UOper {
        /// Result type
        type_info: TypeInfo,
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Arc<Expr>,
    },
    /// Aggregate
    AggExpr {
        /// Result type
        type_info: TypeInfo,
        /// Aggregate function
        kind: AggKind,
        /// Argument; `None` for `COUNT(*)`
        arg: Option<Arc<Expr>>,
        /// `DISTINCT` modifier
        is_distinct: bool,
    },
}

impl Expr {
    /// Result type of the expression
    pub fn type_info(&self) -> &TypeInfo {
        match self {
            Self::Constant(c) => c.type_info(),
            Self::ColumnVar(col) => &col.type_info,
            Self::BinOper { type_info, .. }
            | Self::UOper { type_info, .. }
            | Self::AggExpr { type_info, .. } => type_info,
        }
    }

    /// Binary operation node
    pub fn bin_oper(type_info: TypeInfo, op: SqlOp, left: Arc<Expr>, right: Arc<Expr>) -> Arc<Self> {
        Arc::new(Self::BinOper {
            type_info,
            op,
            left,
            right,
        })
    }

    /// Constant leaf node
    pub fn constant(constant: Constant) -> Arc<Self> {
        Arc::new(Self::Constant(constant))
    }

    /// Column reference node
    pub fn column(table_id: i32, column_id: i32, rte_idx: usize, type_info: TypeInfo) -> Arc<Self> {
        Arc::new(Self::ColumnVar(ColumnVar {
            table_id,
            column_id,
            rte_idx,
            type_info,
        }))
    }

    /// Append the constant leaves of this tree to `out`, left to right
    pub fn collect_constants<'a>(&'a self, out: &mut Vec<&'a Constant>) {
        match self {
            Self::Constant(c) => out.push(c),
            Self::ColumnVar(_) => {}
            Self::BinOper { left, right, .. } => {
                left.collect_constants(out);
                right.collect_constants(out);
            }
            Self::UOper { operand, .. } => operand.collect_constants(out),
            Self::AggExpr { arg, .. } => {
                if let Some(arg) = arg {
                    arg.collect_constants(out);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(c) => write!(f, "{c}"),
            Self::ColumnVar(col) => write!(f, "{col}"),
            Self::BinOper {
                op, left, right, ..
            } => write!(f, "(BinOper {op} {left} {right})"),
            Self::UOper { op, operand, .. } => write!(f, "(UOper {op} {operand})"),
            Self::AggExpr {
                kind,
                arg,
                is_distinct,
                ..
            } => {
                write!(f, "({kind} ")?;
                if *is_distinct {
                    f.write_str("DISTINCT ")?;
                }
                match arg {
                    Some(arg) => write!(f, "{arg})"),
                    None => f.write_str("*)"),
                }
            }
        }
    }
}

/// Where an input comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSourceType {
    /// Physical table
    Table,
    /// Result of an earlier step
    Result,
}

/// Input table of an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Table id (negative for intermediate results)
    pub table_id: i32,
    /// Join nesting level
    pub nest_level: usize,
}

impl InputDescriptor {
    /// Create a descriptor
    pub fn new(table_id: i32, nest_level: usize) -> Self {
        Self {
            table_id,
            nest_level,
        }
    }

    /// Whether this reads a table or an intermediate result
    pub fn source_type(&self) -> InputSourceType {
        if self.table_id > 0 {
            InputSourceType::Table
        } else {
            InputSourceType::Result
        }
    }
}

/// Column read from one of the inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputColDescriptor {
    /// Column id
    pub col_id: i32,
    /// Input the column belongs to
    pub scan_desc: InputDescriptor,
}

impl InputColDescriptor {
    /// Create a descriptor
    pub fn new(col_id: i32, table_id: i32, nest_level: usize) -> Self {
        Self {
            col_id,
            scan_desc: InputDescriptor::new(table_id, nest_level),
        }
    }
}

/// Join kind of one nesting level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JoinType {
    /// Inner join
    Inner,
    /// Left outer join
    Left,
    /// Semi join
    Semi,
    /// Anti join
    Anti,
    /// Not a join
    #[default]
    Invalid,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Semi => "SEMI",
            Self::Anti => "ANTI",
            Self::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

/// Join predicates of one nesting level
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    /// Predicates
    pub quals: Vec<Arc<Expr>>,
    /// Join kind
    pub join_type: JoinType,
}

/// Approximate cardinality estimator attached to a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimator {
    /// Estimator name
    pub name: String,
    /// Size in bytes of the estimator buffer
    pub buffer_size: usize,
}

/// One `ORDER BY` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderEntry {
    /// 1-based target list entry
    pub tle_no: usize,
    /// Descending order
    pub is_desc: bool,
    /// `NULLS FIRST`
    pub nulls_first: bool,
}

impl fmt::Display for OrderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.tle_no,
            if self.is_desc { "desc" } else { "asc" },
            if self.nulls_first { "nulls first" } else { "nulls last" }
        )
    }
}

/// How the sort step is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortAlgorithm {
    /// Exact sort
    #[default]
    Default,
    /// Speculative top-N
    SpeculativeTopN,
    /// Streaming top-N
    StreamingTopN,
}

impl fmt::Display for SortAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Default => "Default",
            Self::SpeculativeTopN => "Speculative Top N",
            Self::StreamingTopN => "Streaming Top N",
        };
        f.write_str(s)
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortInfo {
    /// Order entries
    pub order_entries: Vec<OrderEntry>,
    /// Algorithm
    pub algorithm: SortAlgorithm,
    /// `LIMIT` (0 = none)
    pub limit: usize,
    /// `OFFSET`
    pub offset: usize,
}

/// Planner hints attached to a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RegisteredQueryHint {
    /// Run on CPU regardless of available devices
    pub cpu_mode: bool,
    /// Prefer columnar output
    pub columnar_output: bool,
    /// Prefer row-wise output
    pub rowwise_output: bool,
}

impl RegisteredQueryHint {
    /// Whether any hint is set
    pub fn is_any_registered(&self) -> bool {
        self.cpu_mode || self.columnar_output || self.rowwise_output
    }
}

/// Execution state of the query that owns a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryState {
    /// Query id
    pub id: u64,
    /// Session the query runs in
    pub session_id: String,
    /// Query text
    pub query_str: String,
}

/// One compiled query step
#[derive(Debug, Clone, Default)]
pub struct RelAlgExecutionUnit {
    /// Input tables in nesting order
    pub input_descs: Vec<InputDescriptor>,
    /// Columns read from the inputs
    pub input_col_descs: Vec<Arc<InputColDescriptor>>,
    /// Single-table predicates
    pub simple_quals: Vec<Arc<Expr>>,
    /// General predicates
    pub quals: Vec<Arc<Expr>>,
    /// Join predicates per nesting level
    pub join_quals: Vec<JoinCondition>,
    /// Group-by expressions
    pub groupby_exprs: Vec<Arc<Expr>>,
    /// Projected or aggregated targets, shared with the plan
    pub target_exprs: Vec<Arc<Expr>>,
    /// Optional cardinality estimator
    pub estimator: Option<Arc<Estimator>>,
    /// Sort specification
    pub sort_info: SortInfo,
    /// Scan limit (0 = none)
    pub scan_limit: usize,
    /// Planner hints
    pub query_hint: RegisteredQueryHint,
    /// Allocate output buffers with the bump allocator
    pub use_bump_allocator: bool,
    /// `None` if not a union, `Some(true)` for UNION ALL, `Some(false)` for UNION
    pub union_all: Option<bool>,
    /// Owning query
    pub query_state: Option<Arc<QueryState>>,
}

impl RelAlgExecutionUnit {
    /// Rendering of the fields that determine generated code. Query state,
    /// the estimator and hints are left out.
    pub fn desc_for_caching(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write_desc(&mut out, true);
        out
    }

    /// 64-bit hash of [`RelAlgExecutionUnit::desc_for_caching`]
    pub fn cache_key(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(self.desc_for_caching().as_bytes())
    }

    /// Constant leaves of simple quals, quals, join quals, group-by and
    /// target expressions, in that order
    pub fn constant_leaves(&self) -> Vec<&Constant> {
        let mut leaves = Vec::new();
        let join_quals = self.join_quals.iter().flat_map(|cond| cond.quals.iter());
        for expr in self
            .simple_quals
            .iter()
            .chain(self.quals.iter())
            .chain(join_quals)
            .chain(self.groupby_exprs.iter())
            .chain(self.target_exprs.iter())
        {
            expr.collect_constants(&mut leaves);
        }
        leaves
    }

    fn write_desc(&self, f: &mut impl fmt::Write, for_caching: bool) -> fmt::Result {
        write!(f, "\n\tTable/Col/Levels: ")?;
        for col in &self.input_col_descs {
            write!(
                f,
                "({}, {}, {}) ",
                col.scan_desc.table_id, col.col_id, col.scan_desc.nest_level
            )?;
        }
        if !self.simple_quals.is_empty() {
            write!(f, "\n\tSimple Quals: {}", join_exprs(&self.simple_quals))?;
        }
        if !self.quals.is_empty() {
            write!(f, "\n\tQuals: {}", join_exprs(&self.quals))?;
        }
        if !self.join_quals.is_empty() {
            write!(f, "\n\tJoin Quals: ")?;
            for (level, cond) in self.join_quals.iter().enumerate() {
                write!(
                    f,
                    "\t\t{level} {} {}",
                    cond.join_type,
                    join_exprs(&cond.quals)
                )?;
            }
        }
        if !self.groupby_exprs.is_empty() {
            write!(f, "\n\tGroup By: {}", join_exprs(&self.groupby_exprs))?;
        }
        write!(f, "\n\tProjected targets: {}", join_exprs(&self.target_exprs))?;
        if !for_caching {
            write!(f, "\n\tHas Estimator: {}", self.estimator.is_some())?;
        }
        write!(f, "\n\tSort Info: ")?;
        for entry in &self.sort_info.order_entries {
            write!(f, "\n\t  {entry}")?;
        }
        write!(f, "\n\t  Algorithm: {}", self.sort_info.algorithm)?;
        write!(f, "\n\t  Limit: {}", self.sort_info.limit)?;
        write!(f, "\n\t  Offset: {}", self.sort_info.offset)?;
        write!(f, "\n\tScan Limit: {}", self.scan_limit)?;
        write!(f, "\n\tBump Allocator: {}", self.use_bump_allocator)?;
        if let Some(union_all) = self.union_all {
            write!(
                f,
                "\n\tUnion: {}",
                if union_all { "UNION ALL" } else { "UNION" }
            )?;
        }
        if !for_caching && self.query_hint.is_any_registered() {
            write!(f, "\n\tHints: {:?}", self.query_hint)?;
        }
        Ok(())
    }
}

impl fmt::Display for RelAlgExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_desc(f, false)
    }
}

fn join_exprs(exprs: &[Arc<Expr>]) -> String {
    exprs
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn list<T: fmt::Display>(items: &[T]) -> String {
    format!(
        "[{}]",
        items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// How a table function sizes its output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputBufferSizeType {
    /// Row count given as a constant argument
    UserSpecifiedConstantParameter,
    /// Row count is the input row count times an argument
    UserSpecifiedRowMultiplier,
    /// Row count fixed by the function
    Constant,
}

/// Table function signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableFunction {
    /// Function name
    pub name: String,
    /// Output sizing
    pub output_sizer: OutputBufferSizeType,
    /// Argument types
    pub input_args: Vec<TypeInfo>,
    /// Output column types
    pub output_args: Vec<TypeInfo>,
}

impl fmt::Display for TableFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TableFunction(name={}, output_sizer={:?}, input_args={}, output_args={})",
            self.name,
            self.output_sizer,
            list(&self.input_args),
            list(&self.output_args)
        )
    }
}

/// Invocation of a table function
#[derive(Debug, Clone)]
pub struct TableFunctionExecutionUnit {
    /// Input tables
    pub input_descs: Vec<InputDescriptor>,
    /// Columns read from the inputs
    pub input_col_descs: Vec<Arc<InputColDescriptor>>,
    /// Argument expressions
    pub input_exprs: Vec<Arc<Expr>>,
    /// Arguments that are plain column references
    pub table_func_inputs: Vec<ColumnVar>,
    /// Output targets
    pub target_exprs: Vec<Arc<Expr>>,
    /// Output buffer sizing argument
    pub output_buffer_size_param: usize,
    /// Function being invoked
    pub table_func: TableFunction,
}

impl TableFunctionExecutionUnit {
    /// Check argument types against the function signature
    pub fn validate(&self) -> Result<()> {
        if self.input_exprs.len() != self.table_func.input_args.len() {
            return Err(Error::invariant(format!(
                "table function {} takes {} arguments, got {}",
                self.table_func.name,
                self.table_func.input_args.len(),
                self.input_exprs.len()
            )));
        }
        for (expr, expected) in self.input_exprs.iter().zip(&self.table_func.input_args) {
            let actual = expr.type_info();
            if actual.sql_type != expected.sql_type {
                return Err(Error::TypeMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Constant leaves of the argument expressions
    pub fn constant_leaves(&self) -> Vec<&Constant> {
        let mut leaves = Vec::new();
        for expr in &self.input_exprs {
            expr.collect_constants(&mut leaves);
        }
        leaves
    }
}

impl fmt::Display for TableFunctionExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input_exprs: Vec<&Expr> = self.input_exprs.iter().map(Arc::as_ref).collect();
        let target_exprs: Vec<&Expr> = self.target_exprs.iter().map(Arc::as_ref).collect();
        write!(
            f,
            "TableFunctionExecutionUnit(input_exprs={}, table_func_inputs={}, target_exprs={}, output_buffer_size_param={}, table_func={})",
            list(&input_exprs),
            list(&self.table_func_inputs),
            list(&target_exprs),
            self.output_buffer_size_param,
            self.table_func
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlType;

    fn int_ti() -> TypeInfo {
        TypeInfo::new(SqlType::Int)
    }

    fn sample_unit() -> RelAlgExecutionUnit {
        let col = Expr::column(1, 2, 0, int_ti());
        let filter = Expr::bin_oper(
            TypeInfo::new(SqlType::Boolean),
            SqlOp::Gt,
            col.clone(),
            Expr::constant(Constant::int(42)),
        );
        let join = Expr::bin_oper(
            TypeInfo::new(SqlType::Boolean),
            SqlOp::Eq,
            col.clone(),
            Expr::column(2, 1, 1, int_ti()),
        );
        let target = Arc::new(Expr::AggExpr {
            type_info: TypeInfo::new(SqlType::BigInt),
            kind: AggKind::Sum,
            arg: Some(Expr::bin_oper(
                int_ti(),
                SqlOp::Plus,
                col.clone(),
                Expr::constant(Constant::int(1)),
            )),
            is_distinct: false,
        });

        RelAlgExecutionUnit {
            input_descs: vec![InputDescriptor::new(1, 0), InputDescriptor::new(2, 1)],
            input_col_descs: vec![
                Arc::new(InputColDescriptor::new(2, 1, 0)),
                Arc::new(InputColDescriptor::new(1, 2, 1)),
            ],
            simple_quals: vec![filter],
            join_quals: vec![JoinCondition {
                quals: vec![join],
                join_type: JoinType::Inner,
            }],
            groupby_exprs: vec![Expr::constant(Constant::text("g"))],
            target_exprs: vec![target],
            sort_info: SortInfo {
                order_entries: vec![OrderEntry {
                    tle_no: 1,
                    is_desc: true,
                    nulls_first: false,
                }],
                algorithm: SortAlgorithm::StreamingTopN,
                limit: 10,
                offset: 0,
            },
            union_all: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn test_constant_leaves_order() {
        let unit = sample_unit();
        let leaves: Vec<String> = unit.constant_leaves().iter().map(|c| c.to_string()).collect();
        assert_eq!(leaves.len(), 3);
        assert!(leaves[0].contains("42"));
        assert!(leaves[1].contains("'g'"));
        assert!(leaves[2].contains(" 1 "));
    }

    #[test]
    fn test_display_renders_structure() {
        let text = sample_unit().to_string();
        assert!(text.contains("Table/Col/Levels: (1, 2, 0) (2, 1, 1) "));
        assert!(text.contains("Simple Quals: (BinOper > (ColumnVar table: 1 column: 2 rte: 0"));
        assert!(text.contains("0 INNER (BinOper ="));
        assert!(text.contains("Algorithm: Streaming Top N"));
        assert!(text.contains("1 desc nulls last"));
        assert!(text.contains("Union: UNION ALL"));
        assert!(text.contains("Has Estimator: false"));
    }

    #[test]
    fn test_cache_desc_ignores_session_fields() {
        let base = sample_unit();
        let mut other = sample_unit();
        other.query_state = Some(Arc::new(QueryState {
            id: 7,
            session_id: "s1".to_string(),
            query_str: "SELECT 1".to_string(),
        }));
        other.estimator = Some(Arc::new(Estimator {
            name: "ndv".to_string(),
            buffer_size: 1024,
        }));
        other.query_hint.cpu_mode = true;

        assert_eq!(base.desc_for_caching(), other.desc_for_caching());
        assert_eq!(base.cache_key(), other.cache_key());
        assert_ne!(base.to_string(), other.to_string());
    }

    #[test]
    fn test_cache_key_tracks_plan_shape() {
        let base = sample_unit();
        let mut limited = sample_unit();
        limited.sort_info.limit = 11;
        assert_ne!(base.cache_key(), limited.cache_key());

        let mut distinct = sample_unit();
        distinct.union_all = Some(false);
        assert!(distinct.desc_for_caching().ends_with("Union: UNION"));
        assert_ne!(base.cache_key(), distinct.cache_key());
    }

    #[test]
    fn test_input_source_type() {
        assert_eq!(InputDescriptor::new(5, 0).source_type(), InputSourceType::Table);
        assert_eq!(InputDescriptor::new(-3, 0).source_type(), InputSourceType::Result);
    }

    fn table_function_unit(arg: Arc<Expr>) -> TableFunctionExecutionUnit {
        let col = ColumnVar {
            table_id: 1,
            column_id: 1,
            rte_idx: 0,
            type_info: int_ti(),
        };
        TableFunctionExecutionUnit {
            input_descs: vec![InputDescriptor::new(1, 0)],
            input_col_descs: vec![Arc::new(InputColDescriptor::new(1, 1, 0))],
            input_exprs: vec![Arc::new(Expr::ColumnVar(col)), arg],
            table_func_inputs: vec![col],
            target_exprs: vec![Expr::column(-1, 0, 0, int_ti())],
            output_buffer_size_param: 2,
            table_func: TableFunction {
                name: "row_copier".to_string(),
                output_sizer: OutputBufferSizeType::UserSpecifiedRowMultiplier,
                input_args: vec![int_ti(), int_ti()],
                output_args: vec![int_ti()],
            },
        }
    }

    #[test]
    fn test_table_function_display() {
        let unit = table_function_unit(Expr::constant(Constant::int(2)));
        let text = unit.to_string();
        assert!(text.starts_with("TableFunctionExecutionUnit(input_exprs=[(ColumnVar"));
        assert!(text.contains("output_buffer_size_param=2"));
        assert!(text.contains("table_func=TableFunction(name=row_copier"));
        assert!(text.ends_with("))"));
        assert_eq!(unit.constant_leaves().len(), 1);
        unit.validate().unwrap();
    }

    #[test]
    fn test_table_function_argument_type_mismatch() {
        let unit = table_function_unit(Expr::constant(Constant::text("x")));
        assert!(matches!(unit.validate(), Err(Error::TypeMismatch { .. })));
    }
}
