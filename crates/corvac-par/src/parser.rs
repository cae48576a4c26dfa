//! Recursive-descent parser.
//!
//! Small backtracking is used in exactly one place: `name<` in
//! expression position is tried as a type-argument list and falls back
//! to a comparison when it is not followed by `(` or `{`.

use crate::ast::*;
use crate::lexer::{tokenize, Token};
use corvac_util::{CompileError, Result, Symbol};

/// Parse a full compilation unit.
pub fn parse(src: &str) -> Result<Module> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Token {
        self.tokens.get(self.pos).copied().unwrap_or(Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> Token {
        self.tokens
            .get(self.pos + offset)
            .copied()
            .unwrap_or(Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn eat(&mut self, t: Token) -> bool {
        if self.peek() == t {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: Token) -> Result<()> {
        if self.eat(t) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{:?}", t)))
        }
    }

    fn expect_ident(&mut self) -> Result<Symbol> {
        match self.bump() {
            Token::Ident(s) => Ok(s),
            other => Err(CompileError::internal(format!(
                "parse error: expected identifier, found {:?}",
                other
            ))),
        }
    }

    fn unexpected(&self, wanted: &str) -> CompileError {
        CompileError::internal(format!(
            "parse error: expected {}, found {:?}",
            wanted,
            self.peek()
        ))
    }

    fn parse_module(&mut self) -> Result<Module> {
        let mut type_decls = Vec::new();
        let mut root = Vec::new();
        loop {
            while self.eat(Token::Semi) {}
            if self.peek() == Token::Eof {
                break;
            }
            if self.peek() == Token::KwType {
                type_decls.push(self.parse_type_decl()?);
            } else {
                root.push(self.parse_stmt()?);
            }
        }
        Ok(Module { type_decls, root })
    }

    fn parse_type_decl(&mut self) -> Result<TypeDecl> {
        self.expect(Token::KwType)?;
        let ident = self.expect_ident()?;
        self.expect(Token::Assign)?;
        let tp = self.parse_type()?;
        Ok(TypeDecl { ident, tp })
    }

    /// A statement is just an expression; `let`, `fun` and `for` only
    /// appear in statement position.
    fn parse_stmt(&mut self) -> Result<Expr> {
        match self.peek() {
            Token::KwLet => self.parse_let(),
            Token::KwFun => Ok(Expr::LetRec(self.parse_fun()?)),
            Token::KwFor => self.parse_for(),
            _ => self.parse_expr(),
        }
    }

    fn parse_let(&mut self) -> Result<Expr> {
        self.expect(Token::KwLet)?;
        let sym = self.expect_ident()?;
        let tp = if self.eat(Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::Assign)?;
        let bound = self.parse_expr()?;
        Ok(Expr::Let {
            sym,
            tp,
            bound: Box::new(bound),
        })
    }

    fn parse_fun(&mut self) -> Result<FuncDecl> {
        self.expect(Token::KwFun)?;
        let name = self.expect_ident()?;
        let tp_vars = if self.peek() == Token::Lt {
            self.parse_tp_var_decls()?
        } else {
            Vec::new()
        };
        // one or more parameter groups: fun f(a: int)(b: int)
        let mut params = Vec::new();
        while self.peek() == Token::LParen {
            self.bump();
            while self.peek() != Token::RParen {
                let pname = self.expect_ident()?;
                self.expect(Token::Colon)?;
                let ptp = self.parse_type()?;
                params.push((pname, ptp));
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        self.expect(Token::Colon)?;
        let ret = self.parse_type()?;
        self.expect(Token::Assign)?;
        self.expect(Token::LBrace)?;
        let body = self.parse_stmts_until(Token::RBrace)?;
        self.expect(Token::RBrace)?;
        Ok(FuncDecl {
            name,
            tp_vars,
            params,
            ret,
            body,
        })
    }

    fn parse_for(&mut self) -> Result<Expr> {
        self.expect(Token::KwFor)?;
        let it = self.expect_ident()?;
        self.expect(Token::Assign)?;
        let from = self.parse_expr()?;
        self.expect(Token::DotDot)?;
        let to = self.parse_expr()?;
        self.expect(Token::LBrace)?;
        let body = self.parse_stmts_until(Token::RBrace)?;
        self.expect(Token::RBrace)?;
        Ok(Expr::Loop {
            it,
            from: Box::new(from),
            to: Box::new(to),
            body,
        })
    }

    fn parse_stmts_until(&mut self, end: Token) -> Result<Vec<Expr>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(Token::Semi) {}
            if self.peek() == end || self.peek() == Token::Eof {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let left = self.parse_or()?;
        if self.eat(Token::LArrow) {
            let right = self.parse_expr()?;
            return match left {
                Expr::VarRef(sym) => Ok(Expr::Mutate {
                    sym,
                    right: Box::new(right),
                }),
                Expr::ArrayGet { array, index } => Ok(Expr::ArrayPut {
                    array,
                    index,
                    right: Box::new(right),
                }),
                _ => Err(CompileError::internal(
                    "parse error: left side of `<-` must be a variable or index",
                )),
            };
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(Token::OrOr) {
            let right = self.parse_and()?;
            left = bin(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_cmp()?;
        while self.eat(Token::AndAnd) {
            let right = self.parse_cmp()?;
            left = bin(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let mut left = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Lte => BinOp::Lte,
                Token::Gt => BinOp::Gt,
                Token::Gte => BinOp::Gte,
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::Neq,
                _ => break,
            };
            self.bump();
            let right = self.parse_add()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_mul()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut left = self.parse_postfix()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_postfix()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.bump();
                    let args = self.parse_args()?;
                    expr = Expr::Apply {
                        callee: Box::new(expr),
                        tp_args: Vec::new(),
                        args,
                    };
                }
                Token::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::ArrayGet {
                        array: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Token::Dot => {
                    self.bump();
                    let field = self.expect_ident()?;
                    let args = if self.eat(Token::LParen) {
                        Some(self.parse_args()?)
                    } else {
                        None
                    };
                    expr = Expr::DotAcs {
                        target: Box::new(expr),
                        field,
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Comma-separated arguments; the opening paren is already consumed.
    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        while self.peek() != Token::RParen {
            args.push(self.parse_expr()?);
            if !self.eat(Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Token::Int(v) => {
                self.bump();
                Ok(Expr::Int(v))
            }
            Token::Float(v) => {
                self.bump();
                Ok(Expr::Float(v))
            }
            Token::KwTrue => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            Token::KwFalse => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            Token::LParen => {
                self.bump();
                if self.eat(Token::RParen) {
                    return Ok(Expr::Unit);
                }
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::KwIf => self.parse_if(),
            Token::KwMatch => self.parse_match(),
            Token::Ident(name) => {
                self.bump();
                if name.as_str() == "array" && self.peek() == Token::Lt {
                    return self.parse_array_lit();
                }
                if self.peek() == Token::LBrace && self.looks_like_rec_lit(1) {
                    return self.parse_rec_lit(name, Vec::new());
                }
                if self.peek() == Token::Lt {
                    if let Some(expr) = self.try_generic_suffix(name)? {
                        return Ok(expr);
                    }
                }
                Ok(Expr::VarRef(name))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// After `name`, a `<` may open a type-argument list. Commit only
    /// when the list parses and is followed by `(` or `{`; otherwise it
    /// was a comparison.
    fn try_generic_suffix(&mut self, name: Symbol) -> Result<Option<Expr>> {
        let saved = self.pos;
        self.bump(); // `<`
        let mut tp_args = Vec::new();
        let parsed = loop {
            match self.parse_type() {
                Ok(tp) => tp_args.push(tp),
                Err(_) => break false,
            }
            if self.eat(Token::Comma) {
                continue;
            }
            break self.eat(Token::Gt);
        };
        if parsed && self.peek() == Token::LParen {
            self.bump();
            let args = self.parse_args()?;
            return Ok(Some(Expr::Apply {
                callee: Box::new(Expr::VarRef(name)),
                tp_args,
                args,
            }));
        }
        if parsed && self.peek() == Token::LBrace && self.looks_like_rec_lit(1) {
            return Ok(Some(self.parse_rec_lit(name, tp_args)?));
        }
        self.pos = saved;
        Ok(None)
    }

    /// `{` at `offset` opens a record literal when followed by `}` or
    /// `ident :`.
    fn looks_like_rec_lit(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            Token::RBrace => true,
            Token::Ident(_) => self.peek_at(offset + 1) == Token::Colon,
            _ => false,
        }
    }

    fn parse_array_lit(&mut self) -> Result<Expr> {
        self.expect(Token::Lt)?;
        let ele = self.parse_type()?;
        self.expect(Token::Gt)?;
        self.expect(Token::LParen)?;
        let elems = self.parse_args()?;
        Ok(Expr::ArrayLit { ele, elems })
    }

    fn parse_rec_lit(&mut self, name: Symbol, tp_args: Vec<TypeExpr>) -> Result<Expr> {
        self.expect(Token::LBrace)?;
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        while self.peek() != Token::RBrace {
            let key = self.expect_ident()?;
            self.expect(Token::Colon)?;
            let val = self.parse_expr()?;
            keys.push(key);
            vals.push(val);
            if !self.eat(Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(Expr::RecLit {
            name,
            tp_args,
            keys,
            vals,
        })
    }

    fn parse_if(&mut self) -> Result<Expr> {
        self.expect(Token::KwIf)?;
        let cond = self.parse_or()?;
        self.expect(Token::KwThen)?;
        let then_body = self.parse_branch()?;
        self.expect(Token::KwElse)?;
        let else_body = self.parse_branch()?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    /// A branch is a block or a single expression.
    fn parse_branch(&mut self) -> Result<Vec<Expr>> {
        if self.eat(Token::LBrace) {
            let body = self.parse_stmts_until(Token::RBrace)?;
            self.expect(Token::RBrace)?;
            Ok(body)
        } else {
            Ok(vec![self.parse_expr()?])
        }
    }

    fn parse_match(&mut self) -> Result<Expr> {
        self.expect(Token::KwMatch)?;
        let target = self.parse_or()?;
        self.expect(Token::LBrace)?;
        let mut cases = Vec::new();
        while self.eat(Token::KwCase) {
            let pattern = self.parse_case_pattern()?;
            self.expect(Token::Arrow)?;
            let mut body = Vec::new();
            loop {
                while self.eat(Token::Semi) {}
                if matches!(self.peek(), Token::KwCase | Token::RBrace | Token::Eof) {
                    break;
                }
                body.push(self.parse_stmt()?);
            }
            cases.push(MatchCase { pattern, body });
        }
        self.expect(Token::RBrace)?;
        Ok(Expr::Match {
            target: Box::new(target),
            cases,
        })
    }

    fn parse_case_pattern(&mut self) -> Result<CasePattern> {
        if self.eat(Token::Underscore) {
            return Ok(CasePattern::Default);
        }
        let enum_name = self.expect_ident()?;
        self.expect(Token::Dot)?;
        let token = self.expect_ident()?;
        let mut binds = Vec::new();
        if self.eat(Token::LParen) {
            while self.peek() != Token::RParen {
                binds.push(self.expect_ident()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        Ok(CasePattern::Variant {
            enum_name,
            token,
            binds,
        })
    }

    fn parse_tp_var_decls(&mut self) -> Result<Vec<TypeVarDecl>> {
        self.expect(Token::Lt)?;
        let mut decls = Vec::new();
        while self.peek() != Token::Gt {
            let name = self.expect_ident()?;
            let bound = if self.eat(Token::Colon) {
                Some(self.expect_ident()?)
            } else {
                None
            };
            decls.push(TypeVarDecl { name, bound });
            if !self.eat(Token::Comma) {
                break;
            }
        }
        self.expect(Token::Gt)?;
        Ok(decls)
    }

    fn parse_type(&mut self) -> Result<TypeExpr> {
        let name = match self.bump() {
            Token::Ident(s) => s,
            other => {
                return Err(CompileError::internal(format!(
                    "parse error: expected type, found {:?}",
                    other
                )))
            }
        };
        match name.as_str() {
            "array" => {
                self.expect(Token::Lt)?;
                let ele = self.parse_type()?;
                self.expect(Token::Comma)?;
                let size = match self.bump() {
                    Token::Int(v) => v,
                    other => {
                        return Err(CompileError::internal(format!(
                            "parse error: expected array size, found {:?}",
                            other
                        )))
                    }
                };
                self.expect(Token::Gt)?;
                Ok(TypeExpr::Arr {
                    ele: Box::new(ele),
                    size,
                })
            }
            "rec" => {
                let tp_vars = if self.peek() == Token::Lt {
                    self.parse_tp_var_decls()?
                } else {
                    Vec::new()
                };
                self.expect(Token::LBrace)?;
                let mut keys = Vec::new();
                let mut mem_tps = Vec::new();
                while self.peek() != Token::RBrace {
                    let key = self.expect_ident()?;
                    self.expect(Token::Colon)?;
                    let tp = self.parse_type()?;
                    keys.push(key);
                    mem_tps.push(tp);
                    if !self.eat(Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(TypeExpr::Rec {
                    tp_vars,
                    keys,
                    mem_tps,
                })
            }
            "tup" => {
                self.expect(Token::Lt)?;
                let mut tps = Vec::new();
                while self.peek() != Token::Gt {
                    tps.push(self.parse_type()?);
                    if !self.eat(Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::Gt)?;
                Ok(TypeExpr::Tup(tps))
            }
            "enum" => {
                let tp_vars = if self.peek() == Token::Lt {
                    self.parse_tp_var_decls()?
                } else {
                    Vec::new()
                };
                self.expect(Token::LParen)?;
                let mut tokens = Vec::new();
                let mut payloads = Vec::new();
                while self.peek() != Token::RParen {
                    let token = self.expect_ident()?;
                    let payload = if self.eat(Token::LParen) {
                        let tp = self.parse_type()?;
                        self.expect(Token::RParen)?;
                        Some(tp)
                    } else {
                        None
                    };
                    tokens.push(token);
                    payloads.push(payload);
                    if !self.eat(Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
                Ok(TypeExpr::Enum {
                    tp_vars,
                    tokens,
                    payloads,
                })
            }
            "trait" => {
                let tp_vars = if self.peek() == Token::Lt {
                    self.parse_tp_var_decls()?
                } else {
                    Vec::new()
                };
                self.expect(Token::LBrace)?;
                let mut fns = Vec::new();
                while self.peek() != Token::RBrace {
                    let fn_name = self.expect_ident()?;
                    self.expect(Token::LParen)?;
                    let mut params = Vec::new();
                    while self.peek() != Token::RParen {
                        let pname = self.expect_ident()?;
                        self.expect(Token::Colon)?;
                        let ptp = self.parse_type()?;
                        params.push((pname, ptp));
                        if !self.eat(Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::RParen)?;
                    self.expect(Token::Colon)?;
                    let ret = self.parse_type()?;
                    fns.push(TraitFnSig {
                        name: fn_name,
                        params,
                        ret,
                    });
                    if !(self.eat(Token::Comma) || self.eat(Token::Semi)) {
                        break;
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(TypeExpr::Trait { tp_vars, fns })
            }
            _ => Ok(TypeExpr::Name(name)),
        }
    }
}

fn bin(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::BinOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Expr {
        let module = parse(src).unwrap();
        assert_eq!(module.root.len(), 1, "expected one root expr");
        module.root.into_iter().next().unwrap()
    }

    #[test]
    fn fun_then_call() {
        let module = parse("fun f1(): int = { 1 + 2 }; f1()").unwrap();
        assert_eq!(module.root.len(), 2);
        match &module.root[0] {
            Expr::LetRec(decl) => {
                assert_eq!(decl.name.as_str(), "f1");
                assert!(decl.params.is_empty());
                assert_eq!(decl.body.len(), 1);
            }
            other => panic!("expected fun, got {:?}", other),
        }
        match &module.root[1] {
            Expr::Apply { callee, args, .. } => {
                assert!(matches!(**callee, Expr::VarRef(n) if n.as_str() == "f1"));
                assert!(args.is_empty());
            }
            other => panic!("expected apply, got {:?}", other),
        }
    }

    #[test]
    fn let_with_array_type_and_index() {
        let module =
            parse("fun f(): int = { let a: array<int,3> = array<int>(1,2,3); a[2] }").unwrap();
        match &module.root[0] {
            Expr::LetRec(decl) => {
                assert_eq!(decl.body.len(), 2);
                assert!(matches!(decl.body[0], Expr::Let { .. }));
                assert!(matches!(decl.body[1], Expr::ArrayGet { .. }));
            }
            other => panic!("expected fun, got {:?}", other),
        }
    }

    #[test]
    fn array_put() {
        let expr = parse_one("a[2] <- b");
        assert!(matches!(expr, Expr::ArrayPut { .. }));
    }

    #[test]
    fn if_then_else_precedence() {
        let expr = parse_one("if 2 > 1 then 10 else 20");
        match expr {
            Expr::If {
                cond,
                then_body,
                else_body,
            } => {
                assert!(matches!(*cond, Expr::BinOp { op: BinOp::Gt, .. }));
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.len(), 1);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn for_loop_range() {
        let expr = parse_one("for a = 0 .. 3 { globalarr1[a] <- globalarr[a]*10 }");
        match expr {
            Expr::Loop { it, body, .. } => {
                assert_eq!(it.as_str(), "a");
                assert_eq!(body.len(), 1);
                assert!(matches!(body[0], Expr::ArrayPut { .. }));
            }
            other => panic!("expected loop, got {:?}", other),
        }
    }

    #[test]
    fn type_decls_and_rec_literal() {
        let module = parse(
            "type Counter = rec{c:int}; fun add(self: Counter, x: int): int = { self.c + x }; Counter{c: 2}",
        )
        .unwrap();
        assert_eq!(module.type_decls.len(), 1);
        assert!(matches!(module.type_decls[0].tp, TypeExpr::Rec { .. }));
        match &module.root[1] {
            Expr::RecLit { name, keys, .. } => {
                assert_eq!(name.as_str(), "Counter");
                assert_eq!(keys.len(), 1);
            }
            other => panic!("expected rec literal, got {:?}", other),
        }
    }

    #[test]
    fn trait_decl_and_method_call() {
        let module =
            parse("type Adder = trait { add(x:int): int }; fun m(a: Adder): int = { a.add(5) }")
                .unwrap();
        assert!(matches!(module.type_decls[0].tp, TypeExpr::Trait { .. }));
        match &module.root[0] {
            Expr::LetRec(decl) => match &decl.body[0] {
                Expr::DotAcs { field, args, .. } => {
                    assert_eq!(field.as_str(), "add");
                    assert_eq!(args.as_ref().unwrap().len(), 1);
                }
                other => panic!("expected dot access, got {:?}", other),
            },
            other => panic!("expected fun, got {:?}", other),
        }
    }

    #[test]
    fn match_with_payload_and_default() {
        let module = parse(
            "type Opt = enum<T>(Some(T), None); match v { case Opt.Some(x) -> x+1; case _ -> 0 }",
        )
        .unwrap();
        match &module.type_decls[0].tp {
            TypeExpr::Enum {
                tokens, payloads, ..
            } => {
                assert_eq!(tokens.len(), 2);
                assert!(payloads[0].is_some());
                assert!(payloads[1].is_none());
            }
            other => panic!("expected enum type, got {:?}", other),
        }
        match &module.root[0] {
            Expr::Match { cases, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(matches!(
                    cases[0].pattern,
                    CasePattern::Variant { ref binds, .. } if binds.len() == 1
                ));
                assert!(matches!(cases[1].pattern, CasePattern::Default));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn generic_call_vs_comparison() {
        // explicit type argument list
        let expr = parse_one("id<int>(5)");
        match expr {
            Expr::Apply { tp_args, args, .. } => {
                assert_eq!(tp_args.len(), 1);
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected apply, got {:?}", other),
        }

        // still a pair of comparisons
        let expr = parse_one("let r = a < b");
        match expr {
            Expr::Let { bound, .. } => {
                assert!(matches!(*bound, Expr::BinOp { op: BinOp::Lt, .. }))
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn generic_fun_with_bound() {
        let module = parse("fun m<T: Adder>(a: T): int = { a.add(5) }").unwrap();
        match &module.root[0] {
            Expr::LetRec(decl) => {
                assert_eq!(decl.tp_vars.len(), 1);
                assert_eq!(decl.tp_vars[0].name.as_str(), "T");
                assert_eq!(decl.tp_vars[0].bound.unwrap().as_str(), "Adder");
            }
            other => panic!("expected fun, got {:?}", other),
        }
    }

    #[test]
    fn curried_param_groups_flatten() {
        let module = parse("fun f1(a: int)(b: int): int = { a + b }").unwrap();
        match &module.root[0] {
            Expr::LetRec(decl) => assert_eq!(decl.params.len(), 2),
            other => panic!("expected fun, got {:?}", other),
        }
    }

    #[test]
    fn parse_error_reports_token() {
        let err = parse("let = 3").unwrap_err();
        assert!(err.msg.contains("parse error"));
    }
}
