//! Rule AST data structures.
//!
//! - `Indicator`: a named indicator with positional parameters
//! - `CompositeIndicator`: an element-wise function over operands
//! - `Operand`: what a rule compares (indicator, composite, or constant)
//! - `Rule`: a single comparison
//! - `CompositeRule`: a left-to-right chain of rules joined by `and` / `or`
//!
//! Indicators have value identity: two structurally equal nodes compare
//! equal and hash the same, so they can key an indicator cache.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A literal number with bitwise identity, so it can sit inside hashed keys.
#[derive(Debug, Clone, Copy)]
pub struct Number(pub f64);

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    Number(Number),
    Column(String),
    Nested(Box<Operand>),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Number(n) => write!(f, "{}", n),
            Param::Column(c) => write!(f, "{}", c),
            Param::Nested(op) => write!(f, "{}", op),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Indicator {
    pub name: String,
    pub params: Vec<Param>,
}

impl Indicator {
    /// A bare column reference such as `Close`.
    pub fn column(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn new(name: &str, params: Vec<Param>) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }

    pub fn is_bare(&self) -> bool {
        self.params.is_empty()
    }
}

/// Canonical name, also used as the materialized column name.
impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            return write!(f, "{}", self.name);
        }
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeFunction {
    Max,
    Min,
    Mean,
    Add,
    Subtract,
    Multiply,
    Divide,
    Shift,
}

impl CompositeFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "mean" => Some(Self::Mean),
            "add" => Some(Self::Add),
            "subtract" => Some(Self::Subtract),
            "multiply" => Some(Self::Multiply),
            "divide" => Some(Self::Divide),
            "shift" => Some(Self::Shift),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Min => "min",
            Self::Mean => "mean",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Shift => "shift",
        }
    }

    /// Functions that take exactly two operands.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Subtract | Self::Divide | Self::Shift)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeIndicator {
    pub function: CompositeFunction,
    pub operands: Vec<Operand>,
}

impl fmt::Display for CompositeIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function.name())?;
        for (i, op) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", op)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Indicator(Indicator),
    Composite(CompositeIndicator),
    Constant(Number),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Indicator(ind) => write!(f, "{}", ind),
            Operand::Composite(c) => write!(f, "{}", c),
            Operand::Constant(n) => write!(f, "{}", n),
        }
    }
}

impl Operand {
    /// Every indicator node reachable from this operand, children first.
    pub fn collect_indicators(&self, out: &mut Vec<Indicator>) {
        match self {
            Operand::Indicator(ind) => {
                for p in &ind.params {
                    if let Param::Nested(inner) = p {
                        inner.collect_indicators(out);
                    }
                }
                if !out.contains(ind) {
                    out.push(ind.clone());
                }
            }
            Operand::Composite(c) => {
                for op in &c.operands {
                    op.collect_indicators(out);
                }
            }
            Operand::Constant(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    /// Operators in matching order; two-character operators come first so
    /// `<=` is never read as `<`.
    pub const PRIORITY: [Comparison; 6] = [
        Comparison::Le,
        Comparison::Ge,
        Comparison::Eq,
        Comparison::Ne,
        Comparison::Lt,
        Comparison::Gt,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub left: Operand,
    pub operator: Comparison,
    pub right: Operand,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator.symbol(), self.right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    pub fn keyword(self) -> &'static str {
        match self {
            Logic::And => "and",
            Logic::Or => "or",
        }
    }
}

/// A chain `rule (logic next)?`, folded strictly left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeRule {
    pub rule: Rule,
    pub next: Option<(Logic, Box<CompositeRule>)>,
}

impl CompositeRule {
    pub fn single(rule: Rule) -> Self {
        Self { rule, next: None }
    }

    /// Builds a chain from `first` followed by `(logic, rule)` links.
    pub fn chain(first: Rule, rest: Vec<(Logic, Rule)>) -> Self {
        let mut tail: Option<(Logic, Box<CompositeRule>)> = None;
        for (logic, rule) in rest.into_iter().rev() {
            let node = CompositeRule { rule, next: tail };
            tail = Some((logic, Box::new(node)));
        }
        CompositeRule { rule: first, next: tail }
    }

    /// Rules in chain order, each paired with the logic joining it to the
    /// previous rule.
    pub fn links(&self) -> Vec<(Option<Logic>, &Rule)> {
        let mut out = vec![(None, &self.rule)];
        let mut cursor = &self.next;
        while let Some((logic, node)) = cursor {
            out.push((Some(*logic), &node.rule));
            cursor = &node.next;
        }
        out
    }

    /// Distinct indicators referenced anywhere in the chain.
    pub fn extract_indicators(&self) -> Vec<Indicator> {
        let mut out = Vec::new();
        for (_, rule) in self.links() {
            rule.left.collect_indicators(&mut out);
            rule.right.collect_indicators(&mut out);
        }
        out
    }
}

impl fmt::Display for CompositeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (logic, rule) in self.links() {
            if let Some(logic) = logic {
                write!(f, " {} ", logic.keyword())?;
            }
            write!(f, "{}", rule)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sma(window: f64) -> Indicator {
        Indicator::new(
            "SMA",
            vec![
                Param::Column("Close".into()),
                Param::Number(Number(window)),
            ],
        )
    }

    fn close_above(ind: Indicator) -> Rule {
        Rule {
            left: Operand::Indicator(Indicator::column("Close")),
            operator: Comparison::Gt,
            right: Operand::Indicator(ind),
        }
    }

    #[test]
    fn indicator_display_canonical() {
        assert_eq!(sma(20.0).to_string(), "SMA(Close, 20)");
        assert_eq!(Indicator::column("Close").to_string(), "Close");
    }

    #[test]
    fn fractional_number_display() {
        assert_eq!(Number(0.25).to_string(), "0.25");
        assert_eq!(Number(-3.0).to_string(), "-3");
    }

    #[test]
    fn indicator_value_identity() {
        let mut map = HashMap::new();
        map.insert(sma(20.0), "sma20");
        map.insert(sma(50.0), "sma50");
        assert_eq!(map.get(&sma(20.0)), Some(&"sma20"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn composite_display() {
        let c = CompositeIndicator {
            function: CompositeFunction::Divide,
            operands: vec![
                Operand::Indicator(sma(20.0)),
                Operand::Indicator(Indicator::column("Close")),
            ],
        };
        assert_eq!(c.to_string(), "divide(SMA(Close, 20), Close)");
    }

    #[test]
    fn binary_functions() {
        assert!(CompositeFunction::Shift.is_binary());
        assert!(CompositeFunction::Subtract.is_binary());
        assert!(!CompositeFunction::Max.is_binary());
        assert_eq!(CompositeFunction::from_name("mean"), Some(CompositeFunction::Mean));
        assert_eq!(CompositeFunction::from_name("median"), None);
    }

    #[test]
    fn chain_links_in_order() {
        let chain = CompositeRule::chain(
            close_above(sma(20.0)),
            vec![
                (Logic::And, close_above(sma(50.0))),
                (Logic::Or, close_above(sma(100.0))),
            ],
        );
        let links = chain.links();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].0, None);
        assert_eq!(links[1].0, Some(Logic::And));
        assert_eq!(links[2].0, Some(Logic::Or));
        assert_eq!(
            chain.to_string(),
            "Close > SMA(Close, 20) and Close > SMA(Close, 50) or Close > SMA(Close, 100)"
        );
    }

    #[test]
    fn extract_indicators_dedups() {
        let chain = CompositeRule::chain(
            close_above(sma(20.0)),
            vec![(Logic::Or, close_above(sma(20.0)))],
        );
        let inds = chain.extract_indicators();
        assert_eq!(inds, vec![Indicator::column("Close"), sma(20.0)]);
    }

    #[test]
    fn extract_indicators_includes_nested_params() {
        let inner = Indicator::new(
            "EMA",
            vec![Param::Column("Close".into()), Param::Number(Number(10.0))],
        );
        let outer = Indicator::new(
            "SMA",
            vec![
                Param::Nested(Box::new(Operand::Indicator(inner.clone()))),
                Param::Number(Number(5.0)),
            ],
        );
        let rule = Rule {
            left: Operand::Indicator(outer.clone()),
            operator: Comparison::Lt,
            right: Operand::Constant(Number(1.0)),
        };
        let inds = CompositeRule::single(rule).extract_indicators();
        assert_eq!(inds, vec![inner, outer]);
    }
}
