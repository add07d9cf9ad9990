use std::fmt::{Display, Formatter};

use crate::functions::{Arity, Function};
use crate::value::PrimitiveValue;

#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    // Logical
    And,
    Or,
    // Comparison
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    DivBy,
    Mod,
}

impl BinaryOp {
    #[inline]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    #[inline]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Gt | Self::Ge | Self::Lt | Self::Le | Self::In
        )
    }

    #[inline]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::DivBy | Self::Mod
        )
    }
}

#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "-")]
    Negate,
}

#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum Quantifier {
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Declared,
    Navigation,
    /// An alias introduced by `$compute`
    Computed,
    /// `variable/name` inside a lambda predicate
    LambdaVariable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub kind: PropertyKind,
    pub name: String,
}

impl PropertyKind {
    /// The lambda variable a path starts from, if any
    pub fn variable(&self) -> Option<&str> {
        match self {
            Self::LambdaVariable(variable) => Some(variable),
            _ => None,
        }
    }
}

impl Property {
    pub fn declared(name: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::Declared,
            name: name.into(),
        }
    }

    pub fn navigation(name: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::Navigation,
            name: name.into(),
        }
    }

    pub fn computed(name: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::Computed,
            name: name.into(),
        }
    }

    pub fn variable(variable: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::LambdaVariable(variable.into()),
            name: name.into(),
        }
    }
}

/// `navigation/any(variable: predicate)`. `any()` without a predicate tests
///  for a non-empty collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub quantifier: Quantifier,
    /// Either a [PropertyKind::Navigation] on the root entity, or a
    ///  [PropertyKind::LambdaVariable] naming a navigation of an enclosing
    ///  lambda's element
    pub navigation: Property,
    pub variable: String,
    pub predicate: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{function} requires {arity} arguments, got {got}")]
pub struct ArityError {
    pub function: Function,
    pub arity: Arity,
    pub got: usize,
}

/// A function call whose argument count has already been checked against
///  [Function::arity], so back ends may index the required arguments
///  directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    function: Function,
    args: Vec<Node>,
}

impl Call {
    pub fn new(function: Function, args: Vec<Node>) -> Result<Self, ArityError> {
        let arity = function.arity();
        if !arity.accepts(args.len()) {
            return Err(ArityError {
                function,
                arity,
                got: args.len(),
            });
        }
        Ok(Self { function, args })
    }

    #[inline]
    pub fn function(&self) -> Function {
        self.function
    }

    #[inline]
    pub fn args(&self) -> &[Node] {
        &self.args
    }

    /// A required argument. Panics only if [i] is past the function's
    ///  minimum arity, which is a programming error.
    #[inline]
    pub fn arg(&self, i: usize) -> &Node {
        &self.args[i]
    }

    /// An optional trailing argument.
    #[inline]
    pub fn optional_arg(&self, i: usize) -> Option<&Node> {
        self.args.get(i)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(PrimitiveValue),
    Property(Property),
    UnaryOperator(UnaryOp, Box<Node>),
    BinaryOperator(Box<Node>, BinaryOp, Box<Node>),
    FunctionCall(Call),
    Lambda(Lambda),
    /// Only ever the right operand of `in`
    List(Vec<Node>),
}

impl Node {
    pub fn literal(value: impl Into<PrimitiveValue>) -> Self {
        Self::Literal(value.into())
    }

    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(Property::declared(name))
    }

    pub fn binary(l: Node, op: BinaryOp, r: Node) -> Self {
        Self::BinaryOperator(Box::new(l), op, Box::new(r))
    }

    pub fn unary(op: UnaryOp, child: Node) -> Self {
        Self::UnaryOperator(op, Box::new(child))
    }

    pub fn call(function: Function, args: Vec<Node>) -> Result<Self, ArityError> {
        Call::new(function, args).map(Self::FunctionCall)
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Self::Literal(PrimitiveValue::Null))
    }

    pub fn as_bool_literal(&self) -> Option<bool> {
        match self {
            Self::Literal(PrimitiveValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// If this node is a contains, startswith or endswith call.
    pub fn as_string_predicate(&self) -> Option<&Call> {
        match self {
            Self::FunctionCall(call) if call.function().is_string_predicate() => Some(call),
            _ => None,
        }
    }

    /// Nested concat calls `concat(concat(a, b), c)` flattened to `[a, b, c]`
    ///  so back ends can emit a single variadic concatenation.
    pub fn concat_operands(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        fn walk<'n>(node: &'n Node, out: &mut Vec<&'n Node>) {
            match node {
                Node::FunctionCall(call) if call.function() == Function::Concat => {
                    for arg in call.args() {
                        walk(arg, out);
                    }
                }
                other => out.push(other),
            }
        }
        walk(self, &mut out);
        out
    }

    /// Names of the declared properties of the queried entity this tree
    ///  reads, each once in order of first use.
    pub fn root_properties(&self) -> Vec<&str> {
        let mut out = Vec::new();
        fn walk<'n>(node: &'n Node, out: &mut Vec<&'n str>) {
            match node {
                Node::Property(Property {
                    kind: PropertyKind::Declared,
                    name,
                }) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Node::Literal(_) | Node::Property(_) => {}
                Node::UnaryOperator(_, child) => walk(child, out),
                Node::BinaryOperator(l, _, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                Node::FunctionCall(call) => call.args().iter().for_each(|arg| walk(arg, out)),
                Node::List(items) => items.iter().for_each(|item| walk(item, out)),
                Node::Lambda(lambda) => {
                    if let Some(predicate) = &lambda.predicate {
                        walk(predicate, out);
                    }
                }
            }
        }
        walk(self, &mut out);
        out
    }
}

/// Canonical filter text. Every binary operator is parenthesized so the
///  output re-parses to an equal tree.
impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Property(property) => write!(f, "{property}"),
            Self::UnaryOperator(UnaryOp::Not, child) => write!(f, "not ({child})"),
            Self::UnaryOperator(UnaryOp::Negate, child) => write!(f, "-({child})"),
            Self::BinaryOperator(l, op, r) => write!(f, "({l} {op} {r})"),
            Self::FunctionCall(call) => {
                write!(f, "{}(", call.function())?;
                write_list(f, call.args())?;
                write!(f, ")")
            }
            Self::Lambda(lambda) => {
                write!(f, "{}/{}(", lambda.navigation, lambda.quantifier)?;
                if let Some(predicate) = &lambda.predicate {
                    write!(f, "{}:{predicate}", lambda.variable)?;
                }
                write!(f, ")")
            }
            Self::List(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}

fn write_list(f: &mut Formatter<'_>, items: &[Node]) -> std::fmt::Result {
    let mut first = true;
    for item in items {
        if first {
            first = false;
        } else {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Property {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PropertyKind::LambdaVariable(variable) => write!(f, "{variable}/{}", self.name),
            _ => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One `$orderby` item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expression: Node,
    pub direction: SortDirection,
}

/// One `$compute` item: `expression as alias`
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeItem {
    pub expression: Node,
    pub alias: String,
}

impl Display for OrderItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "{} asc", self.expression),
            SortDirection::Descending => write!(f, "{} desc", self.expression),
        }
    }
}

impl Display for ComputeItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} as {}", self.expression, self.alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_is_checked_on_construction() {
        let err = Node::call(
            Function::Concat,
            vec![Node::property("a"), Node::literal("b"), Node::literal(4.0)],
        )
        .expect_err("too many arguments");
        assert_eq!(err.to_string(), "concat requires exactly 2 arguments, got 3");
    }

    #[test]
    fn concat_flattens() {
        let inner = Node::call(Function::Concat, vec![Node::property("a"), Node::property("b")])
            .expect("call");
        let outer = Node::call(Function::Concat, vec![inner, Node::literal("c")]).expect("call");
        let operands = outer.concat_operands();
        assert_eq!(
            operands,
            vec![&Node::property("a"), &Node::property("b"), &Node::literal("c")]
        );
    }

    #[test]
    fn root_properties_skip_lambda_variables() {
        let node = Node::binary(
            Node::binary(Node::property("a"), BinaryOp::Add, Node::property("b")),
            BinaryOp::Gt,
            Node::Lambda(Lambda {
                quantifier: Quantifier::All,
                navigation: Property::navigation("items"),
                variable: "i".into(),
                predicate: Some(Box::new(Node::binary(
                    Node::Property(Property::variable("i", "qty")),
                    BinaryOp::Lt,
                    Node::property("a"),
                ))),
            }),
        );
        assert_eq!(node.root_properties(), vec!["a", "b"]);
    }

    #[test]
    fn display_is_canonical() {
        let node = Node::binary(
            Node::unary(UnaryOp::Not, Node::property("done")),
            BinaryOp::And,
            Node::binary(
                Node::property("id"),
                BinaryOp::In,
                Node::List(vec![Node::literal(1), Node::literal(2)]),
            ),
        );
        assert_eq!(node.to_string(), "(not (done) and (id in (1, 2)))");

        let lambda = Node::Lambda(Lambda {
            quantifier: Quantifier::Any,
            navigation: Property::navigation("airports"),
            variable: "a".into(),
            predicate: Some(Box::new(Node::binary(
                Node::Property(Property::variable("a", "name")),
                BinaryOp::Eq,
                Node::literal("Kennedy"),
            ))),
        });
        assert_eq!(lambda.to_string(), "airports/any(a:(a/name eq 'Kennedy'))");
    }
}
