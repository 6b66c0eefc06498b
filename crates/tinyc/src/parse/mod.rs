//! Recursive-descent parser: one method per grammar production.
//!
//! Declarations and identifier references consult the symbol table as
//! they're parsed, so duplicate-declaration and undefined-variable errors
//! surface immediately and codegen is never reached for an ill-formed
//! program.

use crate::ast::{BinOp, CompoundOp, CoutItem, Expr, IncDecOp, Program, Stmt};
use crate::lex::{Scanner, Token, TokenKind};
use crate::symtab::SymbolTable;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] crate::lex::Error),

    #[error(transparent)]
    Symbol(#[from] crate::symtab::Error),

    #[error("{line}: expected {expected}, found {found}")]
    UnexpectedToken {
        line: u32,
        expected: String,
        found: TokenKind,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Parser<'src> {
    scanner: Scanner<'src>,
    symtab: SymbolTable,
    current: Token,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Result<Self> {
        let mut scanner = Scanner::new(source);
        let current = scanner.next_token()?;
        Ok(Self {
            scanner,
            symtab: SymbolTable::new(),
            current,
        })
    }

    /// `void main() { <statements> }`
    pub fn parse_program(mut self) -> Result<(Program, SymbolTable)> {
        self.expect(&TokenKind::Void)?;
        self.expect(&TokenKind::Main)?;
        self.expect(&TokenKind::LParen)?;
        self.expect(&TokenKind::RParen)?;
        let body = self.block()?;
        self.expect(&TokenKind::Eof)?;
        Ok((Program { body }, self.symtab))
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(&TokenKind::LCurly)?;
        let mut stmts = Vec::new();
        while self.current.kind != TokenKind::RCurly {
            stmts.push(self.statement()?);
        }
        self.expect(&TokenKind::RCurly)?;
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt> {
        match &self.current.kind {
            TokenKind::Semicolon => {
                self.advance()?;
                Ok(Stmt::Empty)
            }
            TokenKind::LCurly => Ok(Stmt::Block(self.block()?)),
            TokenKind::Int => self.declaration(),
            TokenKind::Identifier(_) => self.identifier_led_statement(),
            TokenKind::Cout => self.cout_statement(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Do => self.do_while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Repeat => self.repeat_statement(),
            other => Err(Error::UnexpectedToken {
                line: self.current.line,
                expected: "a statement".to_string(),
                found: other.clone(),
            }),
        }
    }

    fn declaration(&mut self) -> Result<Stmt> {
        let line = self.current.line;
        self.expect(&TokenKind::Int)?;
        let name = self.expect_identifier()?;
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon)?;
        let slot = self.symtab.declare(&name, line)?;
        Ok(Stmt::Decl { slot, init })
    }

    /// Dispatches on what follows an identifier: `=`, `+=`, `-=`, `++`, `--`.
    fn identifier_led_statement(&mut self) -> Result<Stmt> {
        let line = self.current.line;
        let name = self.expect_identifier()?;
        let slot = self.symtab.slot_of(&name, line)?;

        let stmt = match &self.current.kind {
            TokenKind::Assign => {
                self.advance()?;
                let expr = self.expr()?;
                Stmt::Assign { slot, expr }
            }
            TokenKind::PlusEqual => {
                self.advance()?;
                let expr = self.expr()?;
                Stmt::CompoundAssign {
                    slot,
                    op: CompoundOp::Add,
                    expr,
                }
            }
            TokenKind::MinusEqual => {
                self.advance()?;
                let expr = self.expr()?;
                Stmt::CompoundAssign {
                    slot,
                    op: CompoundOp::Sub,
                    expr,
                }
            }
            TokenKind::PlusPlus => {
                self.advance()?;
                Stmt::IncDec {
                    slot,
                    op: IncDecOp::Inc,
                }
            }
            TokenKind::MinusMinus => {
                self.advance()?;
                Stmt::IncDec {
                    slot,
                    op: IncDecOp::Dec,
                }
            }
            other => {
                return Err(Error::UnexpectedToken {
                    line: self.current.line,
                    expected: "'=', '+=', '-=', '++' or '--'".to_string(),
                    found: other.clone(),
                });
            }
        };
        self.expect(&TokenKind::Semicolon)?;
        Ok(stmt)
    }

    fn cout_statement(&mut self) -> Result<Stmt> {
        self.expect(&TokenKind::Cout)?;
        let mut items = Vec::new();
        loop {
            self.expect(&TokenKind::Insertion)?;
            if self.eat(&TokenKind::Endl) {
                items.push(CoutItem::Endl);
            } else {
                items.push(CoutItem::Value(self.expr()?));
            }
            if self.current.kind != TokenKind::Insertion {
                break;
            }
        }
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Cout { items })
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expr()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn do_while_statement(&mut self) -> Result<Stmt> {
        self.expect(&TokenKind::Do)?;
        let body = Box::new(self.statement()?);
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expr()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LParen)?;

        let init = if self.current.kind == TokenKind::Semicolon {
            None
        } else if self.current.kind == TokenKind::Int {
            Some(Box::new(self.declaration()?))
        } else {
            let stmt = self.identifier_led_statement()?;
            Some(Box::new(stmt))
        };
        if init.is_none() {
            self.expect(&TokenKind::Semicolon)?;
        }

        let cond = if self.current.kind == TokenKind::Semicolon {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let step = if self.current.kind == TokenKind::RParen {
            None
        } else {
            Some(Box::new(self.for_step_statement()?))
        };
        self.expect(&TokenKind::RParen)?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    /// Like `identifier_led_statement` but without the trailing `;`, for the
    /// `for (...; ...; step)` clause.
    fn for_step_statement(&mut self) -> Result<Stmt> {
        let line = self.current.line;
        let name = self.expect_identifier()?;
        let slot = self.symtab.slot_of(&name, line)?;
        match &self.current.kind {
            TokenKind::Assign => {
                self.advance()?;
                Ok(Stmt::Assign {
                    slot,
                    expr: self.expr()?,
                })
            }
            TokenKind::PlusEqual => {
                self.advance()?;
                Ok(Stmt::CompoundAssign {
                    slot,
                    op: CompoundOp::Add,
                    expr: self.expr()?,
                })
            }
            TokenKind::MinusEqual => {
                self.advance()?;
                Ok(Stmt::CompoundAssign {
                    slot,
                    op: CompoundOp::Sub,
                    expr: self.expr()?,
                })
            }
            TokenKind::PlusPlus => {
                self.advance()?;
                Ok(Stmt::IncDec {
                    slot,
                    op: IncDecOp::Inc,
                })
            }
            TokenKind::MinusMinus => {
                self.advance()?;
                Ok(Stmt::IncDec {
                    slot,
                    op: IncDecOp::Dec,
                })
            }
            other => Err(Error::UnexpectedToken {
                line: self.current.line,
                expected: "'=', '+=', '-=', '++' or '--'".to_string(),
                found: other.clone(),
            }),
        }
    }

    fn repeat_statement(&mut self) -> Result<Stmt> {
        self.expect(&TokenKind::Repeat)?;
        self.expect(&TokenKind::LParen)?;
        let count = self.expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.block()?;
        Ok(Stmt::Repeat { count, body })
    }

    // ---- expressions, lowest to highest precedence ----

    fn expr(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and_expr()?;
            lhs = fold_or_build(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.relational_expr()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.relational_expr()?;
            lhs = fold_or_build(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn relational_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.additive_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Less => BinOp::Lt,
                TokenKind::LessEqual => BinOp::Le,
                TokenKind::Greater => BinOp::Gt,
                TokenKind::GreaterEqual => BinOp::Ge,
                TokenKind::EqualEqual => BinOp::Eq,
                TokenKind::NotEqual => BinOp::Ne,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance()?;
            let rhs = self.additive_expr()?;
            lhs = fold_or_build(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance()?;
            let rhs = self.multiplicative_expr()?;
            lhs = fold_or_build(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.exponent_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            self.advance()?;
            let rhs = self.exponent_expr()?;
            lhs = fold_or_build(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// Right-associative: `2 ** 3 ** 2 == 2 ** (3 ** 2)`.
    fn exponent_expr(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        if self.eat(&TokenKind::Power) {
            let exp = self.exponent_expr()?;
            return Ok(fold_or_build(BinOp::Pow, base, exp));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.atom()?;
            return Ok(match inner.as_const() {
                Some(v) => Expr::IntLit(v.wrapping_neg()),
                None => Expr::Neg(Box::new(inner)),
            });
        }

        match self.current.kind.clone() {
            TokenKind::Integer(v) => {
                self.advance()?;
                Ok(Expr::IntLit(v))
            }
            TokenKind::Identifier(name) => {
                let line = self.current.line;
                self.advance()?;
                let slot = self.symtab.slot_of(&name, line)?;
                Ok(Expr::Var(slot))
            }
            TokenKind::LParen => {
                self.advance()?;
                let e = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(e)
            }
            other => Err(Error::UnexpectedToken {
                line: self.current.line,
                expected: "an identifier, integer literal or '('".to_string(),
                found: other,
            }),
        }
    }

    // ---- token-stream plumbing ----

    fn advance(&mut self) -> Result<Token> {
        let next = self.scanner.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.current.kind == kind {
            self.advance().expect("lookahead already scanned");
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if &self.current.kind == kind {
            self.advance()
        } else {
            Err(Error::UnexpectedToken {
                line: self.current.line,
                expected: format!("{kind:?}"),
                found: self.current.kind.clone(),
            })
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.current.kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance()?;
                Ok(name)
            }
            other => Err(Error::UnexpectedToken {
                line: self.current.line,
                expected: "an identifier".to_string(),
                found: other,
            }),
        }
    }
}

/// Builds a binary expression node, folding it to a literal immediately
/// when both operands are already compile-time constants. This is the only
/// place constant folding happens, so the emitter can never observe a
/// `Pow` node whose operands aren't both already constant (the original
/// implementation's exponent bug is structurally impossible here).
fn fold_or_build(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    match (lhs.as_const(), rhs.as_const()) {
        (Some(a), Some(b)) => Expr::IntLit(crate::ast::const_eval(op, a, b)),
        _ => Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scenario_one() {
        let src = "void main(){ int x = 3+4*5; cout << x; }";
        let (program, symtab) = Parser::new(src).unwrap().parse_program().unwrap();
        assert_eq!(symtab.len(), 1);
        assert_eq!(program.body.len(), 2);
        match &program.body[0] {
            Stmt::Decl { slot: 0, init: Some(Expr::IntLit(23)) } => {}
            other => panic!("unexpected decl: {other:?}"),
        }
    }

    #[test]
    fn rejects_undefined_variable() {
        let src = "void main(){ cout << x; }";
        let err = Parser::new(src).unwrap().parse_program().unwrap_err();
        assert!(matches!(err, Error::Symbol(crate::symtab::Error::UndefinedVariable { .. })));
    }

    #[test]
    fn rejects_duplicate_declaration() {
        let src = "void main(){ int x; int x; }";
        let err = Parser::new(src).unwrap().parse_program().unwrap_err();
        assert!(matches!(err, Error::Symbol(crate::symtab::Error::DuplicateDeclaration { .. })));
    }

    #[test]
    fn exponent_is_right_associative_and_constant_folded() {
        let src = "void main(){ int x = 2 ** 3 ** 2; }";
        let (program, _) = Parser::new(src).unwrap().parse_program().unwrap();
        match &program.body[0] {
            Stmt::Decl { init: Some(Expr::IntLit(v)), .. } => assert_eq!(*v, 512),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn exponent_with_variable_operand_stays_unfolded() {
        let src = "void main(){ int n; int x = 2 ** n; }";
        let (program, _) = Parser::new(src).unwrap().parse_program().unwrap();
        match &program.body[1] {
            Stmt::Decl { init: Some(Expr::Binary { op: BinOp::Pow, .. }), .. } => {}
            other => panic!("expected unfolded Pow node, got {other:?}"),
        }
    }

    #[test]
    fn division_by_constant_zero_does_not_panic_the_parser() {
        // Parsing must not itself evaluate `4/0` — that fault is deferred
        // to the runtime `idiv`, per the crate's error-handling design.
        let src = "void main(){ int x = 4/0; int y = 4%0; }";
        let (program, _) = Parser::new(src).unwrap().parse_program().unwrap();
        match &program.body[0] {
            Stmt::Decl { init: Some(Expr::Binary { op: BinOp::Div, .. }), .. } => {}
            other => panic!("expected unfolded Div node, got {other:?}"),
        }
        match &program.body[1] {
            Stmt::Decl { init: Some(Expr::Binary { op: BinOp::Mod, .. }), .. } => {}
            other => panic!("expected unfolded Mod node, got {other:?}"),
        }
    }

    #[test]
    fn parses_for_loop_with_compound_step() {
        let src = "void main(){ int s = 0; for (int i = 1; i <= 4; i++) s += i; }";
        let (program, symtab) = Parser::new(src).unwrap().parse_program().unwrap();
        assert_eq!(symtab.len(), 2);
        assert!(matches!(program.body[1], Stmt::For { .. }));
    }
}
