use std::str::FromStr;

use crate::ast::{
    BinaryOp, Call, ComputeItem, Lambda, Node, OrderItem, Property, Quantifier, SortDirection,
    UnaryOp,
};
use crate::config::ParserConfig;
use crate::functions::{Arity, Function};
use crate::lex::{Error as LexerError, Keyword, LiteralKind, Lexer, Mode, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Returned when the input is empty (or just whitespace)
    #[error("empty input")]
    NoExpression,
    #[error(transparent)]
    Lexical(#[from] LexerError),
    #[error("unbalanced parenthesis at {position}")]
    UnbalancedParentheses { position: usize },
    #[error("unexpected '{lexeme}' at {position}")]
    UnexpectedToken { position: usize, lexeme: String },
    #[error("missing operand at {position}")]
    MissingOperand { position: usize },
    #[error("unknown function '{name}' at {position}")]
    UnknownFunction { position: usize, name: String },
    #[error("{function} requires {arity} arguments, got {got}")]
    WrongArgumentCount {
        position: usize,
        function: Function,
        arity: Arity,
        got: usize,
    },
    #[error("expression is nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

impl Error {
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::NoExpression | Self::TooDeep { .. } => None,
            Self::Lexical(e) => Some(e.position()),
            Self::UnbalancedParentheses { position }
            | Self::UnexpectedToken { position, .. }
            | Self::MissingOperand { position }
            | Self::UnknownFunction { position, .. }
            | Self::WrongArgumentCount { position, .. } => Some(*position),
        }
    }
}

fn unexpected(token: &Token) -> Error {
    Error::UnexpectedToken {
        position: token.position,
        lexeme: token.lexeme.to_string(),
    }
}

/// Parses a `$filter` expression.
pub fn parse_filter(input: &str) -> Result<Node, Error> {
    parse_filter_with(input, &ParserConfig::default())
}

pub fn parse_filter_with(input: &str, config: &ParserConfig) -> Result<Node, Error> {
    let mut parser = Parser::new(input, Mode::Expression, config);
    parser.require_input()?;
    let root = parser.expression(0)?;
    parser.finish()?;
    tracing::debug!(input, tree = %root, "parsed filter");
    Ok(root)
}

/// Parses a `$search` expression. Terms become string literals combined
///  with `and`, `or` and `not`.
pub fn parse_search(input: &str) -> Result<Node, Error> {
    let config = ParserConfig::default();
    let mut parser = Parser::new(input, Mode::Search, &config);
    parser.require_input()?;
    let root = parser.search_expression(0)?;
    parser.finish()?;
    tracing::debug!(input, tree = %root, "parsed search");
    Ok(root)
}

/// Parses `$compute`: a comma separated list of `expression as alias`.
pub fn parse_compute(input: &str) -> Result<Vec<ComputeItem>, Error> {
    parse_compute_with(input, &ParserConfig::default())
}

pub fn parse_compute_with(input: &str, config: &ParserConfig) -> Result<Vec<ComputeItem>, Error> {
    let mut parser = Parser::new(input, Mode::Expression, config);
    parser.require_input()?;
    let mut items = Vec::new();
    loop {
        let expression = parser.expression(0)?;
        let as_token = parser.expect_identifier()?;
        if as_token.lexeme != "as" {
            return Err(unexpected(&as_token));
        }
        let alias = parser.expect_identifier()?;
        items.push(ComputeItem {
            expression,
            alias: alias.lexeme.to_string(),
        });
        if !parser.list_continues()? {
            break;
        }
    }
    tracing::debug!(input, items = items.len(), "parsed compute");
    Ok(items)
}

/// Parses `$orderby`: a comma separated list of `expression [asc|desc]`.
pub fn parse_orderby(input: &str) -> Result<Vec<OrderItem>, Error> {
    parse_orderby_with(input, &ParserConfig::default())
}

pub fn parse_orderby_with(input: &str, config: &ParserConfig) -> Result<Vec<OrderItem>, Error> {
    let mut parser = Parser::new(input, Mode::Expression, config);
    parser.require_input()?;
    let mut items = Vec::new();
    loop {
        let expression = parser.expression(0)?;
        let mut direction = SortDirection::Ascending;
        if let Some(tok) = parser.lexer.peek_token()?
            && tok.kind == TokenKind::Identifier
        {
            direction = match tok.lexeme {
                "asc" => SortDirection::Ascending,
                "desc" => SortDirection::Descending,
                _ => return Err(unexpected(&tok)),
            };
            parser.lexer.next_token()?;
        }
        items.push(OrderItem {
            expression,
            direction,
        });
        if !parser.list_continues()? {
            break;
        }
    }
    tracing::debug!(input, items = items.len(), "parsed orderby");
    Ok(items)
}

/// Hand written Pratt parser. Lambda variables currently in scope are kept
///  on a stack so `v/name` can be told apart from an unsupported path.
struct Parser<'input, 'c> {
    lexer: Lexer<'input>,
    config: &'c ParserConfig,
    variables: Vec<&'input str>,
    depth: usize,
}

impl<'input, 'c> Parser<'input, 'c> {
    fn new(input: &'input str, mode: Mode, config: &'c ParserConfig) -> Self {
        Self {
            lexer: Lexer::with_mode(input, mode),
            config,
            variables: Vec::new(),
            depth: 0,
        }
    }

    fn require_input(&self) -> Result<(), Error> {
        match self.lexer.peek_token()? {
            None => Err(Error::NoExpression),
            Some(_) => Ok(()),
        }
    }

    /// Make sure we've completely parsed the input
    fn finish(&mut self) -> Result<(), Error> {
        match self.lexer.next_token()? {
            None => Ok(()),
            Some(tok) if tok.kind == TokenKind::ParenRight => Err(Error::UnbalancedParentheses {
                position: tok.position,
            }),
            Some(tok) => Err(unexpected(&tok)),
        }
    }

    /// After a list item: true on a comma, false at the end of input.
    fn list_continues(&mut self) -> Result<bool, Error> {
        match self.lexer.next_token()? {
            None => Ok(false),
            Some(tok) if tok.kind == TokenKind::Comma => Ok(true),
            Some(tok) if tok.kind == TokenKind::ParenRight => Err(Error::UnbalancedParentheses {
                position: tok.position,
            }),
            Some(tok) => Err(unexpected(&tok)),
        }
    }

    fn end_of_input(&self) -> usize {
        self.lexer.source().len()
    }

    fn expect_identifier(&mut self) -> Result<Token<'input>, Error> {
        match self.lexer.next_token()? {
            Some(tok) if tok.kind == TokenKind::Identifier => Ok(tok),
            Some(tok) => Err(unexpected(&tok)),
            None => Err(Error::MissingOperand {
                position: self.end_of_input(),
            }),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'input>, Error> {
        match self.lexer.next_token()? {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(unexpected(&tok)),
            None => Err(Error::MissingOperand {
                position: self.end_of_input(),
            }),
        }
    }

    /// Expects the `)` matching [open].
    fn close(&mut self, open: &Token) -> Result<(), Error> {
        match self.lexer.next_token()? {
            Some(tok) if tok.kind == TokenKind::ParenRight => Ok(()),
            Some(tok) => Err(unexpected(&tok)),
            None => Err(Error::UnbalancedParentheses {
                position: open.position,
            }),
        }
    }

    fn descend(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > self.config.max_depth {
            return Err(Error::TooDeep {
                limit: self.config.max_depth,
            });
        }
        Ok(())
    }

    fn expression(&mut self, min_binding_power: u8) -> Result<Node, Error> {
        self.descend()?;
        let res = self.expression_inner(min_binding_power);
        self.depth -= 1;
        res
    }

    fn expression_inner(&mut self, min_binding_power: u8) -> Result<Node, Error> {
        let Some(tok) = self.lexer.next_token()? else {
            return Err(Error::MissingOperand {
                position: self.end_of_input(),
            });
        };

        let mut lhs = match &tok.kind {
            // Open paren: parse the internal expression and expect a closing paren
            TokenKind::ParenLeft => {
                let inner = self.expression(0)?;
                self.close(&tok)?;
                inner
            }
            TokenKind::Operator(Keyword::Not) => {
                let ((), pow) = prefix_binding(UnaryOp::Not);
                Node::unary(UnaryOp::Not, self.expression(pow)?)
            }
            TokenKind::Minus => {
                let ((), pow) = prefix_binding(UnaryOp::Negate);
                Node::unary(UnaryOp::Negate, self.expression(pow)?)
            }
            TokenKind::Literal(_, value) => Node::Literal(value.clone()),
            TokenKind::Identifier => self.identifier(&tok)?,
            TokenKind::Operator(_) | TokenKind::ParenRight | TokenKind::Comma => {
                return Err(Error::MissingOperand {
                    position: tok.position,
                });
            }
            TokenKind::Slash | TokenKind::Colon => return Err(unexpected(&tok)),
        };

        // Now that we have our left side, expect a series of operators. Anything
        //  else ends this expression and is left for the caller.
        loop {
            let Some(op_tok) = self.lexer.peek_token()? else {
                break;
            };
            let TokenKind::Operator(keyword) = op_tok.kind else {
                break;
            };
            let Some(op) = binary_op(keyword) else {
                break;
            };
            let (l_pow, r_pow) = infix_binding(op);
            if l_pow < min_binding_power {
                break;
            }

            // Consume the operator token
            self.lexer.next_token()?;

            let rhs = if op == BinaryOp::In {
                self.in_list()?
            } else {
                self.expression(r_pow)?
            };
            lhs = Node::binary(lhs, op, rhs);
        }

        Ok(lhs)
    }

    /// The parenthesized right side of `in`
    fn in_list(&mut self) -> Result<Node, Error> {
        let open = self.expect(TokenKind::ParenLeft)?;
        let mut items = Vec::new();
        if self.lexer.consume(&TokenKind::ParenRight)? {
            return Ok(Node::List(items));
        }
        loop {
            items.push(self.expression(0)?);
            match self.lexer.next_token()? {
                Some(tok) if tok.kind == TokenKind::Comma => continue,
                Some(tok) if tok.kind == TokenKind::ParenRight => break,
                Some(tok) => return Err(unexpected(&tok)),
                None => {
                    return Err(Error::UnbalancedParentheses {
                        position: open.position,
                    });
                }
            }
        }
        Ok(Node::List(items))
    }

    /// A function call, a property, a lambda variable path or a lambda.
    fn identifier(&mut self, tok: &Token<'input>) -> Result<Node, Error> {
        match self.lexer.peek_token()? {
            Some(next) if next.kind == TokenKind::ParenLeft => self.call(tok),
            Some(next) if next.kind == TokenKind::Slash => {
                self.lexer.next_token()?;
                self.path(tok, &next)
            }
            _ => {
                if self.variables.contains(&tok.lexeme) {
                    // A bare lambda variable would need a collection of
                    //  primitives, which has no catalog representation
                    return Err(unexpected(tok));
                }
                let property = if self.config.computed.iter().any(|c| c == tok.lexeme) {
                    Property::computed(tok.lexeme)
                } else {
                    Property::declared(tok.lexeme)
                };
                Ok(Node::Property(property))
            }
        }
    }

    fn call(&mut self, name: &Token<'input>) -> Result<Node, Error> {
        let function = Function::from_str(name.lexeme).map_err(|_| Error::UnknownFunction {
            position: name.position,
            name: name.lexeme.to_string(),
        })?;
        let open = self.expect(TokenKind::ParenLeft)?;

        let mut args = Vec::new();
        if !self.lexer.consume(&TokenKind::ParenRight)? {
            loop {
                args.push(self.expression(0)?);
                match self.lexer.next_token()? {
                    Some(tok) if tok.kind == TokenKind::Comma => continue,
                    Some(tok) if tok.kind == TokenKind::ParenRight => break,
                    Some(tok) => return Err(unexpected(&tok)),
                    None => {
                        return Err(Error::UnbalancedParentheses {
                            position: open.position,
                        });
                    }
                }
            }
        }

        let call = Call::new(function, args).map_err(|e| Error::WrongArgumentCount {
            position: name.position,
            function: e.function,
            arity: e.arity,
            got: e.got,
        })?;
        Ok(Node::FunctionCall(call))
    }

    /// [head] has been consumed along with the [slash] after it. Supported
    ///  shapes are `nav/any(..)`, `variable/property` and
    ///  `variable/nav/any(..)`.
    fn path(&mut self, head: &Token<'input>, slash: &Token<'input>) -> Result<Node, Error> {
        let segment = self.expect_identifier()?;

        if self.variables.contains(&head.lexeme) {
            let Some(next) = self.lexer.peek_token()? else {
                return Ok(Node::Property(Property::variable(head.lexeme, segment.lexeme)));
            };
            if next.kind != TokenKind::Slash {
                return Ok(Node::Property(Property::variable(head.lexeme, segment.lexeme)));
            }
            self.lexer.next_token()?;
            let quantifier_tok = self.expect_identifier()?;
            let Some(quantifier) = quantifier(quantifier_tok.lexeme) else {
                return Err(unexpected(&next));
            };
            return self.lambda(Property::variable(head.lexeme, segment.lexeme), quantifier);
        }

        match quantifier(segment.lexeme) {
            Some(q) => self.lambda(Property::navigation(head.lexeme), q),
            // Multi-segment member paths are not supported
            None => Err(unexpected(slash)),
        }
    }

    /// `(variable: predicate)` or `()` after the any/all keyword
    fn lambda(&mut self, navigation: Property, quantifier: Quantifier) -> Result<Node, Error> {
        let open = self.expect(TokenKind::ParenLeft)?;
        if let Some(tok) = self.lexer.peek_token()?
            && tok.kind == TokenKind::ParenRight
        {
            if quantifier == Quantifier::All {
                return Err(Error::MissingOperand {
                    position: tok.position,
                });
            }
            self.lexer.next_token()?;
            return Ok(Node::Lambda(Lambda {
                quantifier,
                navigation,
                variable: String::new(),
                predicate: None,
            }));
        }

        let variable = self.expect_identifier()?;
        self.expect(TokenKind::Colon)?;

        self.variables.push(variable.lexeme);
        let predicate = self.expression(0);
        self.variables.pop();
        let predicate = predicate?;
        self.close(&open)?;

        Ok(Node::Lambda(Lambda {
            quantifier,
            navigation,
            variable: variable.lexeme.to_string(),
            predicate: Some(Box::new(predicate)),
        }))
    }

    fn search_expression(&mut self, min_binding_power: u8) -> Result<Node, Error> {
        self.descend()?;
        let res = self.search_expression_inner(min_binding_power);
        self.depth -= 1;
        res
    }

    fn search_expression_inner(&mut self, min_binding_power: u8) -> Result<Node, Error> {
        let Some(tok) = self.lexer.next_token()? else {
            return Err(Error::MissingOperand {
                position: self.end_of_input(),
            });
        };

        let mut lhs = match &tok.kind {
            TokenKind::ParenLeft => {
                let inner = self.search_expression(0)?;
                self.close(&tok)?;
                inner
            }
            TokenKind::Operator(Keyword::Not) => {
                let ((), pow) = prefix_binding(UnaryOp::Not);
                Node::unary(UnaryOp::Not, self.search_expression(pow)?)
            }
            TokenKind::Literal(LiteralKind::String, value) => Node::Literal(value.clone()),
            TokenKind::Operator(_) | TokenKind::ParenRight => {
                return Err(Error::MissingOperand {
                    position: tok.position,
                });
            }
            _ => return Err(unexpected(&tok)),
        };

        loop {
            let Some(next) = self.lexer.peek_token()? else {
                break;
            };
            // Juxtaposed terms are an implicit AND
            let (op, explicit) = match next.kind {
                TokenKind::ParenRight => break,
                TokenKind::Operator(Keyword::Or) => (BinaryOp::Or, true),
                TokenKind::Operator(Keyword::And) => (BinaryOp::And, true),
                _ => (BinaryOp::And, false),
            };
            let (l_pow, r_pow) = infix_binding(op);
            if l_pow < min_binding_power {
                break;
            }
            if explicit {
                self.lexer.next_token()?;
            }
            let rhs = self.search_expression(r_pow)?;
            lhs = Node::binary(lhs, op, rhs);
        }

        Ok(lhs)
    }
}

fn quantifier(word: &str) -> Option<Quantifier> {
    match word {
        "any" => Some(Quantifier::Any),
        "all" => Some(Quantifier::All),
        _ => None,
    }
}

fn binary_op(keyword: Keyword) -> Option<BinaryOp> {
    Some(match keyword {
        Keyword::Eq => BinaryOp::Eq,
        Keyword::Ne => BinaryOp::Ne,
        Keyword::Gt => BinaryOp::Gt,
        Keyword::Ge => BinaryOp::Ge,
        Keyword::Lt => BinaryOp::Lt,
        Keyword::Le => BinaryOp::Le,
        Keyword::In => BinaryOp::In,
        Keyword::And => BinaryOp::And,
        Keyword::Or => BinaryOp::Or,
        Keyword::Add => BinaryOp::Add,
        Keyword::Sub => BinaryOp::Sub,
        Keyword::Mul => BinaryOp::Mul,
        Keyword::Div => BinaryOp::Div,
        Keyword::DivBy => BinaryOp::DivBy,
        Keyword::Mod => BinaryOp::Mod,
        Keyword::Not => return None,
    })
}

// NOTE prefix_binding and infix_binding specify the "binding power" of the
//  various prefix and infix operators. Higher binding power means the
//  operator binds more tightly. `not` sits below the comparisons so that
//  `not a eq b` negates the comparison.
fn prefix_binding(op: UnaryOp) -> ((), u8) {
    match op {
        UnaryOp::Negate => ((), 90),
        UnaryOp::Not => ((), 30),
    }
}

// NOTE for infix bindings the right side is one higher than the left, which
//  makes every binary operator left associative.
fn infix_binding(op: BinaryOp) -> (u8, u8) {
    match op {
        BinaryOp::Or => (10, 11),
        BinaryOp::And => (20, 21),
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::In => (40, 41),
        BinaryOp::Add | BinaryOp::Sub => (50, 51),
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::DivBy | BinaryOp::Mod => (60, 61),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PropertyKind;
    use crate::value::PrimitiveValue;

    fn prop(name: &str) -> Node {
        Node::property(name)
    }

    fn lit(value: impl Into<PrimitiveValue>) -> Node {
        Node::literal(value)
    }

    #[test]
    fn basic() {
        let root = parse_filter("origin eq 'lax'").expect("a valid parse");
        assert_eq!(root, Node::binary(prop("origin"), BinaryOp::Eq, lit("lax")));
    }

    #[test]
    fn precedence() {
        let root = parse_filter("a add b mul c eq 7 and not d").expect("a valid parse");
        let expected = Node::binary(
            Node::binary(
                Node::binary(
                    prop("a"),
                    BinaryOp::Add,
                    Node::binary(prop("b"), BinaryOp::Mul, prop("c")),
                ),
                BinaryOp::Eq,
                lit(7),
            ),
            BinaryOp::And,
            Node::unary(UnaryOp::Not, prop("d")),
        );
        assert_eq!(root, expected);
    }

    #[test]
    fn or_binds_loosest() {
        let root = parse_filter("a eq 1 or b eq 2 and c eq 3").expect("a valid parse");
        let Node::BinaryOperator(_, BinaryOp::Or, rhs) = root else {
            panic!("Expected an Or, got {root:?}");
        };
        assert!(matches!(*rhs, Node::BinaryOperator(_, BinaryOp::And, _)));
    }

    #[test]
    fn not_negates_comparison() {
        let root = parse_filter("not price gt 5").expect("a valid parse");
        let Node::UnaryOperator(UnaryOp::Not, child) = root else {
            panic!("Expected a Not, got {root:?}");
        };
        assert!(matches!(*child, Node::BinaryOperator(_, BinaryOp::Gt, _)));
    }

    #[test]
    fn negation() {
        assert_eq!(
            parse_filter("-price lt -3").expect("a valid parse"),
            Node::binary(
                Node::unary(UnaryOp::Negate, prop("price")),
                BinaryOp::Lt,
                lit(-3),
            )
        );
    }

    #[test]
    fn unbalanced_parentheses() {
        assert_eq!(
            parse_filter("(id lt 4 and (id ge 7 or id gt 3)"),
            Err(Error::UnbalancedParentheses { position: 0 })
        );
        assert_eq!(
            parse_filter("id lt 4)"),
            Err(Error::UnbalancedParentheses { position: 7 })
        );
    }

    #[test]
    fn unexpected_token() {
        assert_eq!(
            parse_filter("(id lt 4 a"),
            Err(Error::UnexpectedToken {
                position: 9,
                lexeme: "a".into()
            })
        );
        assert_eq!(
            parse_filter("id eq 1 2"),
            Err(Error::UnexpectedToken {
                position: 8,
                lexeme: "2".into()
            })
        );
    }

    #[test]
    fn missing_operand() {
        assert_eq!(parse_filter("id eq"), Err(Error::MissingOperand { position: 5 }));
        assert_eq!(parse_filter("eq 4"), Err(Error::MissingOperand { position: 0 }));
        assert_eq!(parse_filter(""), Err(Error::NoExpression));
        assert_eq!(parse_filter("   "), Err(Error::NoExpression));
    }

    #[test]
    fn lexical_errors_surface() {
        assert!(matches!(
            parse_filter("name eq 'abc"),
            Err(Error::Lexical(LexerError::UnterminatedString { position: 8, .. }))
        ));
    }

    #[test]
    fn wrong_argument_count() {
        let err = parse_filter("concat(title,'abc',4.0)").expect_err("arity");
        assert!(matches!(
            err,
            Error::WrongArgumentCount {
                position: 0,
                function: Function::Concat,
                got: 3,
                ..
            }
        ));
        assert!(err.to_string().contains("concat requires exactly 2 arguments"));
        assert!(parse_filter("substring(name, 1)").is_ok());
        assert!(parse_filter("substring(name, 1, 2)").is_ok());
        assert!(parse_filter("now()").is_ok());
    }

    #[test]
    fn unknown_function() {
        assert_eq!(
            parse_filter("frobnicate(name) eq 1"),
            Err(Error::UnknownFunction {
                position: 0,
                name: "frobnicate".into()
            })
        );
    }

    #[test]
    fn in_list() {
        let root = parse_filter("id in (1, 2, 3)").expect("a valid parse");
        assert_eq!(
            root,
            Node::binary(
                prop("id"),
                BinaryOp::In,
                Node::List(vec![lit(1), lit(2), lit(3)])
            )
        );
        assert_eq!(
            parse_filter("id in (1, 2"),
            Err(Error::UnbalancedParentheses { position: 6 })
        );
    }

    #[test]
    fn lambda_any() {
        let root = parse_filter("airports/any(a:a/name eq 'Kennedy')").expect("a valid parse");
        let Node::Lambda(lambda) = root else {
            panic!("Expected a lambda, got {root:?}");
        };
        assert_eq!(lambda.quantifier, Quantifier::Any);
        assert_eq!(lambda.navigation, Property::navigation("airports"));
        assert_eq!(lambda.variable, "a");
        assert_eq!(
            lambda.predicate.as_deref(),
            Some(&Node::binary(
                Node::Property(Property::variable("a", "name")),
                BinaryOp::Eq,
                lit("Kennedy")
            ))
        );
    }

    #[test]
    fn nested_lambda() {
        let root = parse_filter("airports/any(a:a/runways/all(r:r/length gt 3000))")
            .expect("a valid parse");
        let Node::Lambda(outer) = root else {
            panic!("Expected a lambda, got {root:?}");
        };
        let Some(Node::Lambda(inner)) = outer.predicate.as_deref() else {
            panic!("Expected a nested lambda, got {:?}", outer.predicate);
        };
        assert_eq!(inner.quantifier, Quantifier::All);
        assert_eq!(inner.navigation.kind, PropertyKind::LambdaVariable("a".into()));
        assert_eq!(inner.navigation.name, "runways");
    }

    #[test]
    fn empty_any() {
        let root = parse_filter("airports/any()").expect("a valid parse");
        assert!(matches!(root, Node::Lambda(Lambda { predicate: None, .. })));
        assert!(matches!(
            parse_filter("airports/all()"),
            Err(Error::MissingOperand { position: 13 })
        ));
    }

    #[test]
    fn member_paths_are_rejected() {
        assert_eq!(
            parse_filter("address/city eq 'Oslo'"),
            Err(Error::UnexpectedToken {
                position: 7,
                lexeme: "/".into()
            })
        );
    }

    #[test]
    fn variables_go_out_of_scope() {
        assert!(parse_filter("airports/any(a:a/name eq 'x') and a/name eq 'y'").is_err());
    }

    #[test]
    fn computed_properties() {
        let config = ParserConfig {
            computed: vec!["total".into()],
            ..Default::default()
        };
        let root = parse_filter_with("total gt 100", &config).expect("a valid parse");
        assert_eq!(
            root,
            Node::binary(Node::Property(Property::computed("total")), BinaryOp::Gt, lit(100))
        );
    }

    #[test]
    fn too_deep() {
        let config = ParserConfig {
            max_depth: 20,
            ..Default::default()
        };
        let input = format!("{}1{}", "(".repeat(30), ")".repeat(30));
        assert_eq!(
            parse_filter_with(&input, &config),
            Err(Error::TooDeep { limit: 20 })
        );
        let input = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert!(parse_filter_with(&input, &config).is_ok());
    }

    #[test]
    fn display_reparses() {
        for input in [
            "origin eq 'lax' and not (price sub 2 gt 10 or id in (1, 2))",
            "airports/any(a:a/runways/any(r:r/length ge -3))",
            "contains(tolower(name), 'x') eq false",
            "duration'PT5M' lt flight_time",
            "airports/any()",
        ] {
            let tree = parse_filter(input).expect("a valid parse");
            let reparsed = parse_filter(&tree.to_string()).expect("canonical text parses");
            assert_eq!(tree, reparsed, "{input}");
        }
    }

    #[test]
    fn search() {
        let root = parse_search("blue OR red \"dark green\"").expect("a valid parse");
        assert_eq!(
            root,
            Node::binary(
                lit("blue"),
                BinaryOp::Or,
                Node::binary(lit("red"), BinaryOp::And, lit("dark green"))
            )
        );
        let root = parse_search("NOT (a AND b)").expect("a valid parse");
        assert_eq!(
            root,
            Node::unary(
                UnaryOp::Not,
                Node::binary(lit("a"), BinaryOp::And, lit("b"))
            )
        );
        assert_eq!(parse_search("a OR"), Err(Error::MissingOperand { position: 4 }));
    }

    #[test]
    fn compute() {
        let items = parse_compute("price mul 2 as double, tolower(name) as lname").expect("compute");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].alias, "double");
        assert_eq!(
            items[0].expression,
            Node::binary(prop("price"), BinaryOp::Mul, lit(2))
        );
        assert_eq!(items[1].alias, "lname");
        assert!(matches!(
            parse_compute("price mul 2"),
            Err(Error::MissingOperand { .. })
        ));
    }

    #[test]
    fn orderby() {
        let items = parse_orderby("price desc, name").expect("orderby");
        assert_eq!(
            items,
            vec![
                OrderItem {
                    expression: prop("price"),
                    direction: SortDirection::Descending
                },
                OrderItem {
                    expression: prop("name"),
                    direction: SortDirection::Ascending
                },
            ]
        );
        assert!(matches!(
            parse_orderby("price sideways"),
            Err(Error::UnexpectedToken { position: 6, .. })
        ));
    }
}
