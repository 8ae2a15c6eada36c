//! User-authored code snippets (content functions, scripts, parameter builders).
//!
//! A snippet may be written as an arrow function, a `function` declaration
//! (named or anonymous) or a bare function body. Whatever the shape, it runs
//! against a fresh global scope holding only the pure intrinsics; everything
//! else has to come in through its arguments.

use std::rc::Rc;

use super::ast::{ArrayItem, BinaryOp, Expr, FnBody, FunctionDef, Param, Stmt, UnaryOp};
use super::builtins::install_globals;
use super::error::ExprError;
use super::interpreter::Interpreter;
use super::lexer::{Tok, tokenize};
use super::parser::{parse_expression, parse_program};
use super::value::{Callable, Scope, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeShape {
    Arrow,
    Function,
    Body,
}

/// A parsed snippet, ready to be called.
pub struct UserCode {
    def: Rc<FunctionDef>,
    shape: CodeShape,
}

impl UserCode {
    /// Parse `source`. `params` names the arguments a bare body receives; when
    /// `fallback` is given, a bare body that defines a function of that name and
    /// returns nothing itself ends up calling it with the same arguments.
    pub fn parse(source: &str, params: &[&str], fallback: Option<&str>) -> Result<Self, ExprError> {
        let shape = detect_shape(source)?;
        let def = match shape {
            CodeShape::Arrow => match parse_expression(source)? {
                Expr::Function(def) => def,
                _ => return Err(ExprError::syntax(0, "expected an arrow function")),
            },
            CodeShape::Function => match parse_expression(source) {
                Ok(Expr::Function(def)) => def,
                Ok(_) => return Err(ExprError::syntax(0, "expected a function")),
                Err(expr_err) => {
                    // Declaration followed by other statements: use the first declaration.
                    let program = parse_program(source).map_err(|_| expr_err.clone())?;
                    program
                        .into_iter()
                        .find_map(|stmt| match stmt {
                            Stmt::Function(def) => Some(def),
                            _ => None,
                        })
                        .ok_or(expr_err)?
                }
            },
            CodeShape::Body => {
                let mut body = parse_program(source)?;
                if let Some(name) = fallback {
                    body.push(fallback_call(name, params));
                }
                Rc::new(FunctionDef {
                    name: None,
                    params: params
                        .iter()
                        .map(|p| Param {
                            name: p.to_string(),
                            default: None,
                            rest: false,
                        })
                        .collect(),
                    body: FnBody::Block(body),
                    is_arrow: false,
                })
            }
        };
        Ok(Self { def, shape })
    }

    pub fn shape(&self) -> CodeShape {
        self.shape
    }

    /// Call the snippet in a fresh sandbox with the default step budget.
    pub fn invoke(&self, args: Vec<Value>) -> Result<Value, ExprError> {
        self.invoke_with(&Interpreter::new(), args)
    }

    pub fn invoke_with(&self, interp: &Interpreter, args: Vec<Value>) -> Result<Value, ExprError> {
        let env = Scope::root();
        install_globals(&env);
        let f = Value::Function(Rc::new(Callable::Closure {
            def: self.def.clone(),
            env,
        }));
        interp.call_function(&f, args)
    }
}

fn detect_shape(source: &str) -> Result<CodeShape, ExprError> {
    let tokens = tokenize(source)?;
    let mut i = 0;
    if matches!(&tokens[0].tok, Tok::Ident(w) if w == "async") && tokens.len() > 2 {
        i = 1;
    }
    let at = |j: usize| tokens.get(j).map(|t| &t.tok).unwrap_or(&Tok::Eof);
    match at(i) {
        Tok::Ident(w) if w == "function" => Ok(CodeShape::Function),
        Tok::Ident(_) if matches!(at(i + 1), Tok::Punct("=>")) => Ok(CodeShape::Arrow),
        Tok::Punct("(") => {
            let mut depth = 0usize;
            for j in i..tokens.len() {
                match at(j) {
                    Tok::Punct("(") => depth += 1,
                    Tok::Punct(")") => {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(if matches!(at(j + 1), Tok::Punct("=>")) {
                                CodeShape::Arrow
                            } else {
                                CodeShape::Body
                            });
                        }
                    }
                    _ => {}
                }
            }
            Ok(CodeShape::Body)
        }
        _ => Ok(CodeShape::Body),
    }
}

/// `if (typeof name === 'function') return name(params...)`
fn fallback_call(name: &str, params: &[&str]) -> Stmt {
    Stmt::If {
        test: Expr::Binary {
            op: BinaryOp::StrictEq,
            left: Box::new(Expr::Unary {
                op: UnaryOp::TypeOf,
                operand: Box::new(Expr::Ident(name.to_string())),
            }),
            right: Box::new(Expr::Str("function".into())),
        },
        then: Box::new(Stmt::Return(Some(Expr::Call {
            callee: Box::new(Expr::Ident(name.to_string())),
            args: params
                .iter()
                .map(|p| ArrayItem::Item(Expr::Ident(p.to_string())))
                .collect(),
            optional: false,
        }))),
        otherwise: None,
    }
}
