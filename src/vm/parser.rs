//! Recursive-descent parser producing the evaluator's AST.

use std::rc::Rc;

use crate::vm::EvalError;
use crate::vm::ast::*;
use crate::vm::lexer::{Tok, Token};

pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, EvalError> {
    let mut p = Parser { tokens, pos: 0 };
    let mut program = Vec::new();
    while p.peek() != &Tok::Eof {
        program.push(p.parse_stmt()?);
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn bump(&mut self) -> Tok {
        let t = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Tok, what: &str) -> Result<(), EvalError> {
        if self.peek() == &want {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn err(&self, message: String) -> EvalError {
        EvalError::Parse {
            line: self.line(),
            message,
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, EvalError> {
        match self.bump() {
            Tok::Ident(name) => Ok(name),
            other => Err(self.err(format!("expected {what}, found {other:?}"))),
        }
    }

    // ── statements ─────────────────────────────────────────────────

    fn parse_stmt(&mut self) -> Result<Stmt, EvalError> {
        let line = self.line();
        let kind = match self.peek() {
            Tok::Var => {
                let decls = self.parse_var_decls()?;
                self.expect(Tok::Semi, "`;` after declaration")?;
                StmtKind::Var(decls)
            }
            Tok::Function => StmtKind::Func(Rc::new(self.parse_function(true)?)),
            Tok::Return => {
                self.bump();
                let value = if self.peek() == &Tok::Semi {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(Tok::Semi, "`;` after return")?;
                StmtKind::Return(value)
            }
            Tok::If => self.parse_if()?,
            Tok::For => self.parse_for()?,
            Tok::While => {
                self.bump();
                self.expect(Tok::LParen, "`(` after `while`")?;
                let cond = self.parse_expr()?;
                self.expect(Tok::RParen, "`)` after condition")?;
                StmtKind::While {
                    cond,
                    body: self.parse_body()?,
                }
            }
            Tok::Break => {
                self.bump();
                self.expect(Tok::Semi, "`;` after `break`")?;
                StmtKind::Break
            }
            Tok::Continue => {
                self.bump();
                self.expect(Tok::Semi, "`;` after `continue`")?;
                StmtKind::Continue
            }
            Tok::LBrace => {
                self.bump();
                let mut body = Vec::new();
                while self.peek() != &Tok::RBrace {
                    body.push(self.parse_stmt()?);
                }
                self.bump();
                StmtKind::Block(body)
            }
            Tok::Semi => {
                self.bump();
                StmtKind::Block(Vec::new())
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(Tok::Semi, "`;` after expression")?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, line })
    }

    fn parse_var_decls(&mut self) -> Result<Vec<(String, Option<Expr>)>, EvalError> {
        self.bump(); // var
        let mut decls = Vec::new();
        loop {
            let name = self.ident("binding name")?;
            let init = if self.peek() == &Tok::Assign {
                self.bump();
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if self.peek() == &Tok::Comma {
                self.bump();
            } else {
                return Ok(decls);
            }
        }
    }

    fn parse_function(&mut self, named: bool) -> Result<Function, EvalError> {
        self.bump(); // function
        let name = match self.peek() {
            Tok::Ident(_) => self.ident("function name")?,
            _ if named => return Err(self.err("expected function name".into())),
            _ => String::new(),
        };
        self.expect(Tok::LParen, "`(` after function name")?;
        let mut params = Vec::new();
        while self.peek() != &Tok::RParen {
            params.push(self.ident("parameter name")?);
            if self.peek() == &Tok::Comma {
                self.bump();
            }
        }
        self.bump(); // )
        self.expect(Tok::LBrace, "`{` before function body")?;
        let mut body = Vec::new();
        while self.peek() != &Tok::RBrace {
            body.push(self.parse_stmt()?);
        }
        self.bump(); // }
        Ok(Function { name, params, body })
    }

    fn parse_if(&mut self) -> Result<StmtKind, EvalError> {
        self.bump(); // if
        self.expect(Tok::LParen, "`(` after `if`")?;
        let cond = self.parse_expr()?;
        self.expect(Tok::RParen, "`)` after condition")?;
        let then_body = self.parse_body()?;
        let else_body = if self.peek() == &Tok::Else {
            self.bump();
            Some(self.parse_body()?)
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind, EvalError> {
        self.bump(); // for
        self.expect(Tok::LParen, "`(` after `for`")?;

        // for-in: `for (var k in obj)` or `for (k in obj)`
        let var_form = self.peek() == &Tok::Var && self.peek_at(2) == &Tok::In;
        let bare_form = matches!(self.peek(), Tok::Ident(_)) && self.peek_at(1) == &Tok::In;
        if var_form || bare_form {
            if var_form {
                self.bump();
            }
            let var = self.ident("loop variable")?;
            self.bump(); // in
            let object = self.parse_expr()?;
            self.expect(Tok::RParen, "`)` after for-in")?;
            return Ok(StmtKind::ForIn {
                var,
                object,
                body: self.parse_body()?,
            });
        }

        let init = if self.peek() == &Tok::Semi {
            self.bump();
            None
        } else if self.peek() == &Tok::Var {
            let line = self.line();
            let decls = self.parse_var_decls()?;
            self.expect(Tok::Semi, "`;` after for initializer")?;
            Some(Box::new(Stmt {
                kind: StmtKind::Var(decls),
                line,
            }))
        } else {
            let line = self.line();
            let expr = self.parse_expr()?;
            self.expect(Tok::Semi, "`;` after for initializer")?;
            Some(Box::new(Stmt {
                kind: StmtKind::Expr(expr),
                line,
            }))
        };
        let cond = if self.peek() == &Tok::Semi {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(Tok::Semi, "`;` after for condition")?;
        let update = if self.peek() == &Tok::RParen {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(Tok::RParen, "`)` after for clauses")?;
        Ok(StmtKind::For {
            init,
            cond,
            update,
            body: self.parse_body()?,
        })
    }

    /// A statement or a brace-delimited block, flattened to a list.
    fn parse_body(&mut self) -> Result<Vec<Stmt>, EvalError> {
        if self.peek() == &Tok::LBrace {
            self.bump();
            let mut body = Vec::new();
            while self.peek() != &Tok::RBrace {
                body.push(self.parse_stmt()?);
            }
            self.bump();
            Ok(body)
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    // ── expressions, loosest binding first ─────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, EvalError> {
        let line = self.line();
        let lhs = self.parse_ternary()?;
        let op = match self.peek() {
            Tok::Assign => AssignOp::Set,
            Tok::PlusAssign => AssignOp::Add,
            Tok::MinusAssign => AssignOp::Sub,
            Tok::StarAssign => AssignOp::Mul,
            Tok::SlashAssign => AssignOp::Div,
            _ => return Ok(lhs),
        };
        if !matches!(lhs, Expr::Ident(..) | Expr::Member(..) | Expr::Index(..)) {
            return Err(self.err("invalid assignment target".into()));
        }
        self.bump();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
            line,
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr, EvalError> {
        let cond = self.parse_or()?;
        if self.peek() != &Tok::Question {
            return Ok(cond);
        }
        self.bump();
        let then = self.parse_assignment()?;
        self.expect(Tok::Colon, "`:` in conditional expression")?;
        let other = self.parse_assignment()?;
        Ok(Expr::Cond(Box::new(cond), Box::new(then), Box::new(other)))
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == &Tok::OrOr {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Logical(LogOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == &Tok::AndAnd {
            self.bump();
            let rhs = self.parse_equality()?;
            lhs = Expr::Logical(LogOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Tok::EqEq => BinOp::Eq,
                Tok::NotEq => BinOp::NotEq,
                Tok::EqEqEq => BinOp::StrictEq,
                Tok::NotEqEq => BinOp::StrictNotEq,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Tok::Lt => BinOp::Lt,
                Tok::Gt => BinOp::Gt,
                Tok::Le => BinOp::Le,
                Tok::Ge => BinOp::Ge,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Tok::Minus => {
                self.bump();
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)))
            }
            Tok::Not => {
                self.bump();
                Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Tok::Dot => {
                    let line = self.line();
                    self.bump();
                    let name = self.property_name()?;
                    expr = Expr::Member(Box::new(expr), name, line);
                }
                Tok::LBracket => {
                    let line = self.line();
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(Tok::RBracket, "`]` after index")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index), line);
                }
                Tok::LParen => {
                    let line = self.line();
                    self.bump();
                    let mut args = Vec::new();
                    while self.peek() != &Tok::RParen {
                        args.push(self.parse_assignment()?);
                        if self.peek() == &Tok::Comma {
                            self.bump();
                        }
                    }
                    self.bump();
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        line,
                    };
                }
                Tok::PlusPlus => {
                    let line = self.line();
                    self.bump();
                    expr = Expr::Postfix(PostOp::Inc, Box::new(expr), line);
                }
                Tok::MinusMinus => {
                    let line = self.line();
                    self.bump();
                    expr = Expr::Postfix(PostOp::Dec, Box::new(expr), line);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Member names after `.` may be keywords (`obj.in` never occurs in
    /// the data, but `obj.length` must not collide with anything).
    fn property_name(&mut self) -> Result<String, EvalError> {
        match self.bump() {
            Tok::Ident(name) => Ok(name),
            other => Err(self.err(format!("expected property name, found {other:?}"))),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let line = self.line();
        match self.peek().clone() {
            Tok::Num(n) => {
                self.bump();
                Ok(Expr::Num(n))
            }
            Tok::Str(s) => {
                self.bump();
                Ok(Expr::Str(s))
            }
            Tok::True => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            Tok::False => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            Tok::Null => {
                self.bump();
                Ok(Expr::Null)
            }
            Tok::Undefined => {
                self.bump();
                Ok(Expr::Undefined)
            }
            Tok::Ident(name) => {
                self.bump();
                Ok(Expr::Ident(name, line))
            }
            Tok::Function => {
                let mut func = self.parse_function(false)?;
                if func.name.is_empty() {
                    func.name = "anonymous".into();
                }
                Ok(Expr::Function(Rc::new(func)))
            }
            Tok::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(inner)
            }
            Tok::LBracket => {
                self.bump();
                let mut items = Vec::new();
                while self.peek() != &Tok::RBracket {
                    items.push(self.parse_assignment()?);
                    if self.peek() == &Tok::Comma {
                        self.bump();
                    }
                }
                self.bump();
                Ok(Expr::Array(items))
            }
            Tok::LBrace => {
                self.bump();
                let mut entries = Vec::new();
                while self.peek() != &Tok::RBrace {
                    let key = match self.bump() {
                        Tok::Ident(name) => name,
                        Tok::Str(s) => s,
                        Tok::Num(n) => crate::vm::value::format_num(n),
                        other => {
                            return Err(self.err(format!("bad object key: {other:?}")));
                        }
                    };
                    self.expect(Tok::Colon, "`:` after object key")?;
                    entries.push((key, self.parse_assignment()?));
                    if self.peek() == &Tok::Comma {
                        self.bump();
                    }
                }
                self.bump();
                Ok(Expr::Object(entries))
            }
            other => Err(self.err(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::lexer::tokenize;

    fn parse_src(src: &str) -> Vec<Stmt> {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_var_object() {
        let prog = parse_src("var a = { x: 1, 'y': 'two' };");
        assert_eq!(prog.len(), 1);
        match &prog[0].kind {
            StmtKind::Var(decls) => {
                assert_eq!(decls[0].0, "a");
                match decls[0].1.as_ref().unwrap() {
                    Expr::Object(entries) => {
                        assert_eq!(entries[0].0, "x");
                        assert_eq!(entries[1].0, "y");
                    }
                    other => panic!("expected object, got {other:?}"),
                }
            }
            other => panic!("expected var, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_for_in() {
        let prog = parse_src("for (var k in table) { use(k); }");
        assert!(matches!(
            &prog[0].kind,
            StmtKind::ForIn { var, .. } if var == "k"
        ));
    }

    #[test]
    fn test_parse_classic_for() {
        let prog = parse_src("for (var i = 0; i < 3; i++) { go(i); }");
        match &prog[0].kind {
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                assert!(init.is_some());
                assert!(cond.is_some());
                assert!(matches!(update, Some(Expr::Postfix(PostOp::Inc, ..))));
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_self_invoking_function() {
        let prog = parse_src("(function () { run(); })();");
        match &prog[0].kind {
            StmtKind::Expr(Expr::Call { callee, .. }) => {
                assert!(matches!(**callee, Expr::Function(_)));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_member_chain() {
        let prog = parse_src("a.b[0].c = 1;");
        assert!(matches!(
            &prog[0].kind,
            StmtKind::Expr(Expr::Assign { .. })
        ));
    }

    #[test]
    fn test_parse_error_carries_line() {
        let tokens = tokenize("var a = 1;\nvar = 2;").unwrap();
        match parse(tokens) {
            Err(EvalError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_trailing_commas_tolerated() {
        parse_src("var a = [1, 2,];\nvar b = { x: 1, };");
    }
}
