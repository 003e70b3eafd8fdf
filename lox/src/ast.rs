use std::fmt;
use std::rc::Rc;

use crate::token::{Literal, Token};

/// Identity of an expression node that refers to a binding. The resolver keys
/// its side table by these, so the tree itself never changes after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
    },
    Variable {
        id: ExprId,
        name: Token,
    },
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Grouping {
        expression: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    This {
        id: ExprId,
        keyword: Token,
    },
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

/// A named function, method, getter or static method. Shared between the
/// tree and every closure created from it.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
    pub is_static: bool,
    pub is_getter: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expression {
        expression: Expr,
    },
    Print {
        expression: Expr,
    },
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    Block {
        statements: Vec<Stmt>,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Break {
        keyword: Token,
    },
    Function(Rc<FunctionDecl>),
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Class {
        name: Token,
        superclass: Option<Expr>,
        methods: Vec<Rc<FunctionDecl>>,
    },
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!(" {}", item))
        .collect::<String>()
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal {
                value: Literal::String(s),
            } => write!(f, "\"{}\"", s),
            Expr::Literal { value } => write!(f, "{}", value),
            Expr::Variable { name, .. } => write!(f, "{}", name.lexeme),
            Expr::Assign { name, value, .. } => write!(f, "(set {} {})", name.lexeme, value),
            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", operator.lexeme, left, right),
            Expr::Unary { operator, right } => write!(f, "({} {})", operator.lexeme, right),
            Expr::Grouping { expression } => write!(f, "(group {})", expression),
            Expr::Call {
                callee, arguments, ..
            } => write!(f, "(call {}{})", callee, join(arguments)),
            Expr::Get { object, name } => write!(f, "(get {} {})", object, name.lexeme),
            Expr::Set {
                object,
                name,
                value,
            } => write!(f, "(set! {} {} {})", object, name.lexeme, value),
            Expr::This { .. } => write!(f, "this"),
            Expr::Super { method, .. } => write!(f, "(super {})", method.lexeme),
        }
    }
}

/// Postfix rendering of an expression: operands first, then the operator.
/// Grouping is dropped since the order already says it all, and unary
/// minus is written `~` so it can't be mistaken for subtraction.
pub struct Rpn<'a>(pub &'a Expr);

impl fmt::Display for Rpn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => write!(f, "{} {} {}", Rpn(left), Rpn(right), operator.lexeme),
            Expr::Unary { operator, right } if operator.lexeme == "-" => {
                write!(f, "{} ~", Rpn(right))
            }
            Expr::Unary { operator, right } => write!(f, "{} {}", Rpn(right), operator.lexeme),
            Expr::Grouping { expression } => write!(f, "{}", Rpn(expression)),
            Expr::Assign { name, value, .. } => write!(f, "{} {} =", Rpn(value), name.lexeme),
            Expr::Call {
                callee, arguments, ..
            } => {
                write!(f, "{}", Rpn(callee))?;
                for argument in arguments {
                    write!(f, " {}", Rpn(argument))?;
                }
                write!(f, " call/{}", arguments.len())
            }
            Expr::Get { object, name } => write!(f, "{} .{}", Rpn(object), name.lexeme),
            Expr::Set {
                object,
                name,
                value,
            } => write!(f, "{} {} .{} =", Rpn(object), Rpn(value), name.lexeme),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = if self.is_static {
            "class-fun"
        } else if self.is_getter {
            "getter"
        } else {
            "fun"
        };
        let params: Vec<&str> = self.params.iter().map(|p| p.lexeme.as_str()).collect();
        write!(
            f,
            "({} {} ({}){})",
            head,
            self.name.lexeme,
            params.join(" "),
            join(&self.body)
        )
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Expression { expression } => write!(f, "(; {})", expression),
            Stmt::Print { expression } => write!(f, "(print {})", expression),
            Stmt::Var {
                name,
                initializer: Some(init),
            } => write!(f, "(var {} {})", name.lexeme, init),
            Stmt::Var { name, .. } => write!(f, "(var {})", name.lexeme),
            Stmt::Block { statements } => write!(f, "(block{})", join(statements)),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(else_branch) => {
                    write!(f, "(if {} {} {})", condition, then_branch, else_branch)
                }
                None => write!(f, "(if {} {})", condition, then_branch),
            },
            Stmt::While { condition, body } => write!(f, "(while {} {})", condition, body),
            Stmt::Break { .. } => write!(f, "(break)"),
            Stmt::Function(decl) => write!(f, "{}", decl),
            Stmt::Return { value: Some(v), .. } => write!(f, "(return {})", v),
            Stmt::Return { value: None, .. } => write!(f, "(return)"),
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                write!(f, "(class {}", name.lexeme)?;
                if let Some(superclass) = superclass {
                    write!(f, " < {}", superclass)?;
                }
                write!(f, "{})", join(methods))
            }
        }
    }
}
