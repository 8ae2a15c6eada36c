//! Recursive-descent parser over the token stream.
//!
//! Covers the subset of JavaScript that automation snippets use in practice:
//! expressions with optional chaining and template literals, arrow and
//! classic functions, declarations, loops, `try/catch` and `throw`.
//! `async`/`await` are accepted and ignored since evaluation is synchronous.

use std::rc::Rc;

use super::ast::*;
use super::error::ExprError;
use super::lexer::{TemplatePart, Tok, Token, tokenize_at};

/// Deepest syntax nesting accepted. Operator chains count one level per
/// operator since they build left-nested trees.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parse a whole program (script body or function source).
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, ExprError> {
    let mut p = Parser::new(src, 0)?;
    let mut body = Vec::new();
    while !p.at_eof() {
        body.push(p.statement()?);
    }
    Ok(body)
}

/// Parse a single expression; trailing tokens are an error.
pub fn parse_expression(src: &str) -> Result<Expr, ExprError> {
    parse_expression_at(src, 0)
}

pub(crate) fn parse_expression_at(src: &str, base: usize) -> Result<Expr, ExprError> {
    parse_nested(src, base, 0)
}

fn parse_nested(src: &str, base: usize, depth: usize) -> Result<Expr, ExprError> {
    let mut p = Parser::new(src, base)?;
    p.depth = depth;
    let expr = p.expression()?;
    p.eat(";");
    if !p.at_eof() {
        return Err(p.unexpected());
    }
    Ok(expr)
}

struct Parser {
    toks: Vec<Token>,
    i: usize,
    depth: usize,
}

impl Parser {
    fn new(src: &str, base: usize) -> Result<Self, ExprError> {
        Ok(Self {
            toks: tokenize_at(src, base)?,
            i: 0,
            depth: 0,
        })
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.i.min(self.toks.len() - 1)].tok
    }

    fn peek_n(&self, n: usize) -> &Tok {
        &self.toks[(self.i + n).min(self.toks.len() - 1)].tok
    }

    fn pos(&self) -> usize {
        self.toks[self.i.min(self.toks.len() - 1)].pos
    }

    fn newline_before(&self) -> bool {
        self.toks[self.i.min(self.toks.len() - 1)].newline_before
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.i < self.toks.len() - 1 {
            self.i += 1;
        }
        tok
    }

    fn is(&self, p: &str) -> bool {
        matches!(self.peek(), Tok::Punct(q) if *q == p)
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Ident(s) if s == kw)
    }

    fn nest(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ExprError::syntax(self.pos(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.is(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> Result<(), ExprError> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(ExprError::syntax(
                self.pos(),
                format!("expected '{p}' but found {}", describe(self.peek())),
            ))
        }
    }

    fn unexpected(&self) -> ExprError {
        ExprError::syntax(self.pos(), format!("unexpected {}", describe(self.peek())))
    }

    fn ident(&mut self) -> Result<String, ExprError> {
        match self.peek().clone() {
            Tok::Ident(name) if !is_reserved(&name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(ExprError::syntax(
                self.pos(),
                format!("expected identifier but found {}", describe(self.peek())),
            )),
        }
    }

    /// Optional semicolon after a statement.
    fn end_statement(&mut self) -> Result<(), ExprError> {
        if self.eat(";") || self.is("}") || self.at_eof() || self.newline_before() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, ExprError> {
        self.nest()?;
        let stmt = self.statement_inner();
        self.depth -= 1;
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt, ExprError> {
        if self.eat(";") {
            return Ok(Stmt::Empty);
        }
        if self.is("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if let Tok::Ident(kw) = self.peek().clone() {
            match kw.as_str() {
                "const" | "let" | "var" => {
                    let stmt = self.declaration()?;
                    self.end_statement()?;
                    return Ok(stmt);
                }
                "async" if matches!(self.peek_n(1), Tok::Ident(f) if f == "function") => {
                    self.advance();
                    return self.function_declaration();
                }
                "function" => return self.function_declaration(),
                "return" => {
                    self.advance();
                    let arg = if self.is(";") || self.is("}") || self.at_eof() || self.newline_before() {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.end_statement()?;
                    return Ok(Stmt::Return(arg));
                }
                "if" => return self.if_statement(),
                "for" => return self.for_statement(),
                "while" => {
                    self.advance();
                    self.expect("(")?;
                    let test = self.expression()?;
                    self.expect(")")?;
                    let body = Box::new(self.statement()?);
                    return Ok(Stmt::While { test, body });
                }
                "break" => {
                    self.advance();
                    self.end_statement()?;
                    return Ok(Stmt::Break);
                }
                "continue" => {
                    self.advance();
                    self.end_statement()?;
                    return Ok(Stmt::Continue);
                }
                "throw" => {
                    self.advance();
                    let arg = self.expression()?;
                    self.end_statement()?;
                    return Ok(Stmt::Throw(arg));
                }
                "try" => return self.try_statement(),
                _ => {}
            }
        }
        let expr = self.expression()?;
        self.end_statement()?;
        Ok(Stmt::Expr(expr))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ExprError> {
        self.expect("{")?;
        let mut body = Vec::new();
        while !self.is("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn decl_kind(&mut self) -> Result<DeclKind, ExprError> {
        let kind = match self.peek() {
            Tok::Ident(k) if k == "const" => DeclKind::Const,
            Tok::Ident(k) if k == "let" => DeclKind::Let,
            Tok::Ident(k) if k == "var" => DeclKind::Var,
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(kind)
    }

    fn declaration(&mut self) -> Result<Stmt, ExprError> {
        let kind = self.decl_kind()?;
        let mut decls = Vec::new();
        loop {
            let pos = self.pos();
            let name = self.ident()?;
            let init = if self.eat("=") {
                Some(self.assignment()?)
            } else {
                if kind == DeclKind::Const {
                    return Err(ExprError::syntax(pos, "missing initializer in const declaration"));
                }
                None
            };
            decls.push((name, init));
            if !self.eat(",") {
                break;
            }
        }
        Ok(Stmt::Decl { kind, decls })
    }

    fn function_declaration(&mut self) -> Result<Stmt, ExprError> {
        self.advance(); // `function`
        let name = self.ident()?;
        let def = self.function_rest(Some(name))?;
        Ok(Stmt::Function(Rc::new(def)))
    }

    /// Parameters and block body following `function name`.
    fn function_rest(&mut self, name: Option<String>) -> Result<FunctionDef, ExprError> {
        self.expect("(")?;
        let params = self.params()?;
        let body = FnBody::Block(self.block()?);
        Ok(FunctionDef {
            name,
            params,
            body,
            is_arrow: false,
        })
    }

    /// Parameter list after the opening `(`, consuming the closing `)`.
    fn params(&mut self) -> Result<Vec<Param>, ExprError> {
        let mut params = Vec::new();
        while !self.eat(")") {
            let rest = self.eat("...");
            let name = self.ident()?;
            let default = if !rest && self.eat("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            params.push(Param { name, default, rest });
            if !self.eat(",") {
                self.expect(")")?;
                break;
            }
        }
        Ok(params)
    }

    fn if_statement(&mut self) -> Result<Stmt, ExprError> {
        self.advance();
        self.expect("(")?;
        let test = self.expression()?;
        self.expect(")")?;
        let then = Box::new(self.statement()?);
        let otherwise = if self.eat_kw("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, ExprError> {
        self.advance();
        self.expect("(")?;

        let is_decl = matches!(self.peek(), Tok::Ident(k) if k == "const" || k == "let" || k == "var");
        if is_decl
            && matches!(self.peek_n(1), Tok::Ident(_))
            && matches!(self.peek_n(2), Tok::Ident(k) if k == "of" || k == "in")
        {
            let kind = self.decl_kind()?;
            let name = self.ident()?;
            let keys = matches!(self.advance(), Tok::Ident(k) if k == "in");
            let source = self.expression()?;
            self.expect(")")?;
            let body = Box::new(self.statement()?);
            // `for (k in obj)` iterates the keys.
            let iterable = if keys {
                Expr::Call {
                    callee: Box::new(Expr::Member {
                        object: Box::new(Expr::Ident("Object".into())),
                        property: MemberKey::Static("keys".into()),
                        optional: false,
                    }),
                    args: vec![ArrayItem::Item(source)],
                    optional: false,
                }
            } else {
                source
            };
            return Ok(Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
            });
        }

        let init = if self.is(";") {
            None
        } else if is_decl {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect(";")?;
        let test = if self.is(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(";")?;
        let update = if self.is(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn try_statement(&mut self) -> Result<Stmt, ExprError> {
        self.advance();
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_kw("catch") {
            if self.eat("(") {
                param = Some(self.ident()?);
                self.expect(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_kw("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(ExprError::syntax(self.pos(), "missing catch or finally after try"));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ExprError> {
        let first = self.assignment()?;
        if !self.is(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn assignment(&mut self) -> Result<Expr, ExprError> {
        self.nest()?;
        let expr = self.assignment_inner();
        self.depth -= 1;
        expr
    }

    fn assignment_inner(&mut self) -> Result<Expr, ExprError> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let pos = self.pos();
        let target = self.conditional()?;
        let op = match self.peek() {
            Tok::Punct("=") => AssignOp::Assign,
            Tok::Punct("+=") => AssignOp::Add,
            Tok::Punct("-=") => AssignOp::Sub,
            Tok::Punct("*=") => AssignOp::Mul,
            Tok::Punct("/=") => AssignOp::Div,
            _ => return Ok(target),
        };
        if !is_assignable(&target) {
            return Err(ExprError::syntax(pos, "invalid assignment target"));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// Arrow function starting at the current token, if there is one.
    fn try_arrow(&mut self) -> Result<Option<Expr>, ExprError> {
        let start = self.i;
        if self.is_kw("async")
            && (matches!(self.peek_n(1), Tok::Punct("("))
                || matches!(self.peek_n(1), Tok::Ident(_)) && matches!(self.peek_n(2), Tok::Punct("=>")))
        {
            self.advance();
        }
        let params = match self.peek().clone() {
            Tok::Ident(name) if !is_reserved(&name) && matches!(self.peek_n(1), Tok::Punct("=>")) => {
                self.advance();
                vec![Param {
                    name,
                    default: None,
                    rest: false,
                }]
            }
            Tok::Punct("(") if self.paren_followed_by_arrow() => {
                self.advance();
                self.params()?
            }
            _ => {
                self.i = start;
                return Ok(None);
            }
        };
        self.expect("=>")?;
        let body = if self.is("{") {
            FnBody::Block(self.block()?)
        } else {
            FnBody::Expr(Box::new(self.assignment()?))
        };
        Ok(Some(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_arrow: true,
        }))))
    }

    fn paren_followed_by_arrow(&self) -> bool {
        let mut depth = 0usize;
        let mut j = self.i;
        while j < self.toks.len() {
            match &self.toks[j].tok {
                Tok::Punct("(") | Tok::Punct("[") | Tok::Punct("{") => depth += 1,
                Tok::Punct(")") | Tok::Punct("]") | Tok::Punct("}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(self.toks.get(j + 1).map(|t| &t.tok), Some(Tok::Punct("=>")));
                    }
                }
                Tok::Eof => return false,
                _ => {}
            }
            j += 1;
        }
        false
    }

    fn conditional(&mut self) -> Result<Expr, ExprError> {
        let test = self.nullish()?;
        if !self.eat("?") {
            return Ok(test);
        }
        let then = self.assignment()?;
        self.expect(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn nullish(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut left = self.or()?;
        while self.eat("??") {
            self.nest()?;
            let right = self.or()?;
            left = logical(LogicalOp::Nullish, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut left = self.and()?;
        while self.eat("||") {
            self.nest()?;
            let right = self.and()?;
            left = logical(LogicalOp::Or, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut left = self.equality()?;
        while self.eat("&&") {
            self.nest()?;
            let right = self.equality()?;
            left = logical(LogicalOp::And, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("==") => BinaryOp::Eq,
                Tok::Punct("!=") => BinaryOp::NotEq,
                Tok::Punct("===") => BinaryOp::StrictEq,
                Tok::Punct("!==") => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.relational()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("<") => BinaryOp::Lt,
                Tok::Punct(">") => BinaryOp::Gt,
                Tok::Punct("<=") => BinaryOp::LtEq,
                Tok::Punct(">=") => BinaryOp::GtEq,
                Tok::Ident(k) if k == "in" => BinaryOp::In,
                Tok::Ident(k) if k == "instanceof" => BinaryOp::InstanceOf,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("+") => BinaryOp::Add,
                Tok::Punct("-") => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut left = self.exponent()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("*") => BinaryOp::Mul,
                Tok::Punct("/") => BinaryOp::Div,
                Tok::Punct("%") => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.exponent()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn exponent(&mut self) -> Result<Expr, ExprError> {
        let base = self.unary()?;
        if self.eat("**") {
            self.nest()?;
            let exp = self.exponent()?;
            self.depth -= 1;
            return Ok(binary(BinaryOp::Pow, base, exp));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        self.nest()?;
        let expr = self.unary_inner();
        self.depth -= 1;
        expr
    }

    fn unary_inner(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Ident(k) if k == "typeof" => Some(UnaryOp::TypeOf),
            Tok::Ident(k) if k == "void" => Some(UnaryOp::Void),
            Tok::Ident(k) if k == "await" => {
                self.advance();
                return self.unary();
            }
            Tok::Punct("++") | Tok::Punct("--") => {
                let increment = self.is("++");
                let pos = self.pos();
                self.advance();
                let target = self.unary()?;
                if !is_assignable(&target) {
                    return Err(ExprError::syntax(pos, "invalid update target"));
                }
                return Ok(Expr::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                });
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.unary()?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let pos = self.pos();
        let expr = self.call_member()?;
        if (self.is("++") || self.is("--")) && !self.newline_before() {
            if !is_assignable(&expr) {
                return Err(ExprError::syntax(pos, "invalid update target"));
            }
            let increment = self.is("++");
            self.advance();
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn call_member(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut expr = self.primary()?;
        let mut chained = false;
        loop {
            if matches!(self.peek(), Tok::Punct(".") | Tok::Punct("?.") | Tok::Punct("[") | Tok::Punct("(")) {
                self.nest()?;
            }
            if self.eat(".") {
                let name = self.property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberKey::Static(name),
                    optional: false,
                };
            } else if self.eat("?.") {
                chained = true;
                if self.eat("(") {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                    };
                } else if self.eat("[") {
                    let key = self.expression()?;
                    self.expect("]")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberKey::Computed(Box::new(key)),
                        optional: true,
                    };
                } else {
                    let name = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberKey::Static(name),
                        optional: true,
                    };
                }
            } else if self.eat("[") {
                let key = self.expression()?;
                self.expect("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberKey::Computed(Box::new(key)),
                    optional: false,
                };
            } else if self.eat("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                };
            } else {
                break;
            }
        }
        self.depth = base;
        Ok(if chained { Expr::Chain(Box::new(expr)) } else { expr })
    }

    fn property_name(&mut self) -> Result<String, ExprError> {
        match self.advance() {
            Tok::Ident(name) => Ok(name),
            other => Err(ExprError::syntax(
                self.pos(),
                format!("expected property name but found {}", describe(&other)),
            )),
        }
    }

    /// Arguments after `(`, consuming the closing `)`.
    fn arguments(&mut self) -> Result<Vec<ArrayItem>, ExprError> {
        let mut args = Vec::new();
        while !self.eat(")") {
            if self.eat("...") {
                args.push(ArrayItem::Spread(self.assignment()?));
            } else {
                args.push(ArrayItem::Item(self.assignment()?));
            }
            if !self.eat(",") {
                self.expect(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let pos = self.pos();
        match self.advance() {
            Tok::Number(n) => Ok(Expr::Number(n)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::Template(parts) => {
                let mut segments = Vec::with_capacity(parts.len());
                for part in parts {
                    segments.push(match part {
                        TemplatePart::Lit(s) => TemplateSegment::Lit(s),
                        TemplatePart::Expr(src, at) => {
                            TemplateSegment::Expr(parse_nested(&src, at, self.depth)?)
                        }
                    });
                }
                Ok(Expr::Template(segments))
            }
            Tok::Punct("(") => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Tok::Punct("[") => self.array_literal(),
            Tok::Punct("{") => self.object_literal(),
            Tok::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "function" => {
                    let name = match self.peek() {
                        Tok::Ident(_) => Some(self.ident()?),
                        _ => None,
                    };
                    Ok(Expr::Function(Rc::new(self.function_rest(name)?)))
                }
                "async" if self.is_kw("function") => {
                    self.advance();
                    let name = match self.peek() {
                        Tok::Ident(_) => Some(self.ident()?),
                        _ => None,
                    };
                    Ok(Expr::Function(Rc::new(self.function_rest(name)?)))
                }
                "new" => {
                    let callee = self.ident()?;
                    let args = if self.eat("(") {
                        self.arguments()?
                    } else {
                        Vec::new()
                    };
                    Ok(Expr::New { callee, args })
                }
                w if is_reserved(w) => Err(ExprError::syntax(pos, format!("unexpected keyword '{w}'"))),
                _ => Ok(Expr::Ident(word)),
            },
            other => Err(ExprError::syntax(pos, format!("unexpected {}", describe(&other)))),
        }
    }

    fn array_literal(&mut self) -> Result<Expr, ExprError> {
        let mut items = Vec::new();
        loop {
            if self.eat("]") {
                break;
            }
            if self.is(",") {
                self.advance();
                items.push(ArrayItem::Hole);
                continue;
            }
            if self.eat("...") {
                items.push(ArrayItem::Spread(self.assignment()?));
            } else {
                items.push(ArrayItem::Item(self.assignment()?));
            }
            if !self.eat(",") {
                self.expect("]")?;
                break;
            }
        }
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> Result<Expr, ExprError> {
        let mut props = Vec::new();
        while !self.eat("}") {
            if self.eat("...") {
                props.push(Property::Spread(self.assignment()?));
            } else {
                let pos = self.pos();
                let (key, shorthand_name) = match self.advance() {
                    Tok::Ident(name) => (PropKey::Static(name.clone()), Some(name)),
                    Tok::Str(s) => (PropKey::Static(s), None),
                    Tok::Number(n) => (PropKey::Static(super::value::format_number(n)), None),
                    Tok::Punct("[") => {
                        let k = self.assignment()?;
                        self.expect("]")?;
                        (PropKey::Computed(k), None)
                    }
                    other => {
                        return Err(ExprError::syntax(
                            pos,
                            format!("unexpected {} in object literal", describe(&other)),
                        ));
                    }
                };
                if self.eat(":") {
                    props.push(Property::KeyValue(key, self.assignment()?));
                } else if self.is("(") {
                    let name = match &key {
                        PropKey::Static(s) => Some(s.clone()),
                        PropKey::Computed(_) => None,
                    };
                    let def = self.function_rest(name)?;
                    props.push(Property::KeyValue(key, Expr::Function(Rc::new(def))));
                } else if let Some(name) = shorthand_name {
                    props.push(Property::KeyValue(key, Expr::Ident(name)));
                } else {
                    return Err(ExprError::syntax(pos, "expected ':' in object literal"));
                }
            }
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(_) | Expr::Member { optional: false, .. })
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "const"
            | "let"
            | "var"
            | "function"
            | "return"
            | "if"
            | "else"
            | "for"
            | "while"
            | "break"
            | "continue"
            | "throw"
            | "try"
            | "catch"
            | "finally"
            | "new"
            | "typeof"
            | "void"
            | "in"
            | "instanceof"
            | "true"
            | "false"
            | "null"
    )
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Number(n) => format!("number {n}"),
        Tok::Str(_) => "string".to_string(),
        Tok::Template(_) => "template literal".to_string(),
        Tok::Ident(name) => format!("'{name}'"),
        Tok::Punct(p) => format!("'{p}'"),
        Tok::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_chain_is_wrapped() {
        let expr = parse_expression("a?.b.c").unwrap();
        let Expr::Chain(inner) = expr else {
            panic!("expected chain, got {expr:?}");
        };
        assert!(matches!(*inner, Expr::Member { optional: false, .. }));
    }

    #[test]
    fn test_arrow_functions() {
        let expr = parse_expression("(a, b = 2) => a + b").unwrap();
        let Expr::Function(def) = expr else {
            panic!("expected function");
        };
        assert!(def.is_arrow);
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());

        let single = parse_expression("async x => { return x }").unwrap();
        assert!(matches!(single, Expr::Function(_)));
    }

    #[test]
    fn test_parenthesized_expression_is_not_an_arrow() {
        let expr = parse_expression("(a + b) * 2").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_statements_without_semicolons() {
        let prog = parse_program(
            "const a = 1\nlet b = [1, 2]\nfor (const x of b) { a + x }\nreturn\na",
        )
        .unwrap();
        assert_eq!(prog.len(), 5);
        assert!(matches!(prog[3], Stmt::Return(None)));
    }

    #[test]
    fn test_object_literal_forms() {
        let expr = parse_expression("{ a, 'b': 1, [k]: 2, ...rest, m(x) { return x } }").unwrap();
        let Expr::Object(props) = expr else {
            panic!("expected object");
        };
        assert_eq!(props.len(), 5);
        assert!(matches!(props[3], Property::Spread(_)));
    }

    #[test]
    fn test_try_catch_finally() {
        let prog = parse_program("try { x() } catch (e) { y } finally { z }").unwrap();
        assert!(matches!(
            &prog[0],
            Stmt::Try {
                param: Some(_),
                handler: Some(_),
                finalizer: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(matches!(parse_expression("1 = 2"), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse_expression("a b").is_err());
    }

    #[test]
    fn test_const_requires_initializer() {
        assert!(parse_program("const a;").is_err());
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse_expression(&deep).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "{err}");

        let arrays = format!("{}{}", "[".repeat(5000), "]".repeat(5000));
        assert!(matches!(parse_expression(&arrays), Err(ExprError::Syntax { .. })));

        let blocks = format!("{}{}", "{".repeat(500), "}".repeat(500));
        assert!(parse_program(&blocks).is_err());

        let negations = "!".repeat(1000) + "x";
        assert!(parse_expression(&negations).is_err());
    }

    #[test]
    fn test_long_operator_chains_are_bounded() {
        let sum = vec!["1"; 40].join(" + ");
        assert!(parse_expression(&sum).is_ok());
        let sum = vec!["1"; 10_000].join(" + ");
        assert!(parse_expression(&sum).is_err());
        let calls = format!("f{}", "()".repeat(10_000));
        assert!(parse_expression(&calls).is_err());
        let templates = format!("{}x{}", "`${".repeat(100), "}`".repeat(100));
        assert!(parse_expression(&templates).is_err());
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let nested = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(matches!(parse_expression(&nested), Ok(Expr::Number(_))));
        let arrays = format!("{}{}", "[".repeat(20), "]".repeat(20));
        assert!(parse_expression(&arrays).is_ok());
    }
}
